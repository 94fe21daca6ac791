use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use tracing::{debug, error, info, warn};
use vmcron_core::types::{NewExecutionLog, Resource, Schedule, ScheduleId};

use crate::blackout::{self, BlackoutCheck};
use crate::clock::Clock;
use crate::cron::CronExpr;
use crate::dispatch::ActionDispatcher;
use crate::error::SchedulerError;
use crate::journal::ExecutionJournal;
use crate::resolve::TargetResolver;
use crate::store::{EngineStore, ResourceCatalog};

/// What a single fire did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FireOutcome {
    /// Schedule deleted or disabled since the timer was armed. Nothing logged.
    Vanished,
    /// An enabled blackout window covered the fire instant; one skipped entry written.
    Suppressed { window: String },
    /// The target resolved to no resources. Nothing logged.
    NoTargets,
    /// Every resolved target was attempted and logged.
    Dispatched { succeeded: usize, failed: usize },
    /// A storage error outside the per-target boundary ended this fire early.
    Aborted(String),
}

/// Executes one fire of a schedule: re-read, blackout check, fan-out, bookkeeping.
///
/// Shared by every timer task; holds no per-schedule state.
pub struct FireRunner {
    pub(crate) store: Arc<dyn EngineStore>,
    resolver: TargetResolver,
    dispatcher: ActionDispatcher,
    journal: ExecutionJournal,
    pub(crate) clock: Arc<dyn Clock>,
}

impl FireRunner {
    pub fn new(
        store: Arc<dyn EngineStore>,
        catalog: Arc<dyn ResourceCatalog>,
        dispatcher: ActionDispatcher,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            journal: ExecutionJournal::new(store.clone()),
            resolver: TargetResolver::new(catalog),
            store,
            dispatcher,
            clock,
        }
    }

    pub async fn fire(&self, id: ScheduleId) -> FireOutcome {
        let fired_at = self.clock.now();

        let schedule = match self.store.get_schedule(id) {
            Ok(Some(schedule)) if schedule.enabled => schedule,
            Ok(_) => {
                debug!(schedule_id = id, "schedule gone or disabled; fire dropped");
                return FireOutcome::Vanished;
            }
            Err(e) => return abort(id, "load schedule", e),
        };

        let windows = match self.store.list_enabled_blackouts() {
            Ok(windows) => windows,
            Err(e) => return abort(id, "load blackout windows", e),
        };
        if let BlackoutCheck::Suppressed { window } = blackout::check(fired_at, &windows) {
            info!(schedule_id = id, %window, action = %schedule.action, "fire suppressed by blackout window");
            self.journal.record(NewExecutionLog::skipped(
                id,
                schedule.action,
                fired_at,
                window.clone(),
            ));
            return FireOutcome::Suppressed { window };
        }

        let targets = match self.resolver.resolve(schedule.target) {
            Ok(targets) => targets,
            Err(e) => return abort(id, "resolve targets", e),
        };
        if targets.is_empty() {
            info!(schedule_id = id, target = %schedule.target, "no targets; nothing to do");
            return FireOutcome::NoTargets;
        }

        info!(
            schedule_id = id,
            name = %schedule.name,
            action = %schedule.action,
            targets = targets.len(),
            "schedule fired"
        );

        let results = join_all(
            targets
                .iter()
                .map(|resource| self.dispatch_one(&schedule, resource)),
        )
        .await;
        let succeeded = results.iter().filter(|ok| **ok).count();
        let failed = results.len() - succeeded;

        let next_run = next_after(&schedule, self.clock.now());
        match self.store.record_run(id, fired_at, next_run) {
            Ok(()) => {}
            Err(SchedulerError::NotFound { .. }) => {
                debug!(schedule_id = id, "schedule deleted during fire; run not recorded");
            }
            Err(e) => return abort(id, "record run", e),
        }

        info!(schedule_id = id, succeeded, failed, next_run = ?next_run, "fire complete");
        FireOutcome::Dispatched { succeeded, failed }
    }

    /// Dispatch to one target and log it. Returns whether the remote accepted.
    async fn dispatch_one(&self, schedule: &Schedule, resource: &Resource) -> bool {
        let at = self.clock.now();
        let report = self.dispatcher.dispatch(resource, schedule.action).await;
        self.journal
            .record(report.log_entry(Some(schedule.id), resource, schedule.action, at));
        report.result.is_ok()
    }
}

fn next_after(schedule: &Schedule, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    match CronExpr::parse(&schedule.cron_expression) {
        Ok(expr) => expr.next_after(now),
        Err(e) => {
            warn!(schedule_id = schedule.id, error = %e, "stored cron expression no longer parses");
            None
        }
    }
}

fn abort(id: ScheduleId, stage: &str, e: impl std::fmt::Display) -> FireOutcome {
    error!(schedule_id = id, stage, error = %e, "fire aborted");
    FireOutcome::Aborted(format!("{stage}: {e}"))
}
