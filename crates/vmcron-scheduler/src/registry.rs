use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::{watch, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use vmcron_core::types::ScheduleId;

use crate::clock::Clock;
use crate::cron::CronExpr;
use crate::error::Result;
use crate::fire::{FireOutcome, FireRunner};

/// Longest single sleep while waiting for a fire instant. Bounds how late a
/// timer notices a forward jump of the wall clock.
const MAX_SLEEP: Duration = Duration::from_secs(60);

/// Serialises fires of one schedule. Holds the last slot that fired so a
/// replacement timer never fires the same instant twice.
type FireLane = Arc<AsyncMutex<Option<DateTime<Utc>>>>;

struct Timer {
    expression: String,
    /// Reload epoch current when the timer was armed or last confirmed.
    epoch: u64,
    task: JoinHandle<()>,
}

/// Result of arming one timer.
enum Armed {
    Next(Option<DateTime<Utc>>),
    /// A direct reconcile touched the id after the reload read its snapshot.
    Superseded,
}

/// Counts from a full [`TriggerRegistry::reload_all`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReloadReport {
    pub registered: usize,
    /// Enabled schedules whose cron expression failed to parse.
    pub skipped: usize,
    /// Timers dropped because their schedule is gone or disabled.
    pub removed: usize,
}

/// In-memory map of schedule id → armed timer task.
///
/// Timers are a derived cache of the enabled schedules in storage and can be
/// rebuilt at any time with [`reload_all`](Self::reload_all). Mutating
/// operations must run inside a tokio runtime.
pub struct TriggerRegistry {
    runner: Arc<FireRunner>,
    timers: DashMap<ScheduleId, Timer>,
    lanes: DashMap<ScheduleId, FireLane>,
    /// Bumped at the start of every reload.
    epoch: AtomicU64,
    /// Epoch of the last direct `reconcile_add`/`reconcile_remove` per id. A
    /// reload never overrides an id reconciled after its snapshot was taken.
    touched: DashMap<ScheduleId, u64>,
    running: AtomicBool,
    reload_interval: Duration,
}

impl TriggerRegistry {
    pub fn new(runner: FireRunner) -> Self {
        Self {
            runner: Arc::new(runner),
            timers: DashMap::new(),
            lanes: DashMap::new(),
            epoch: AtomicU64::new(0),
            touched: DashMap::new(),
            running: AtomicBool::new(false),
            reload_interval: Duration::from_secs(
                vmcron_core::config::DEFAULT_RELOAD_INTERVAL_SECS,
            ),
        }
    }

    pub fn with_reload_interval(mut self, interval: Duration) -> Self {
        self.reload_interval = interval;
        self
    }

    /// Arm (or re-arm) the timer for schedule `id`.
    ///
    /// A live timer with the same expression is kept as is. Returns the next
    /// fire instant, which is also stored as the schedule's advisory `next_run`.
    pub fn reconcile_add(
        &self,
        id: ScheduleId,
        expression: &str,
    ) -> Result<Option<DateTime<Utc>>> {
        let cron = CronExpr::parse(expression)?;
        self.touched.insert(id, self.epoch.load(Ordering::SeqCst));
        match self.arm(id, cron, None) {
            Armed::Next(next) => Ok(next),
            Armed::Superseded => Ok(None),
        }
    }

    /// Alias of [`reconcile_add`](Self::reconcile_add).
    pub fn create_or_replace_timer(
        &self,
        id: ScheduleId,
        expression: &str,
    ) -> Result<Option<DateTime<Utc>>> {
        self.reconcile_add(id, expression)
    }

    /// Cancel future fires of `id`. A fire already executing runs to completion.
    ///
    /// Returns whether a timer was registered.
    pub fn reconcile_remove(&self, id: ScheduleId) -> bool {
        self.touched.insert(id, self.epoch.load(Ordering::SeqCst));
        match self.timers.remove(&id) {
            Some((_, timer)) => {
                timer.task.abort();
                info!(schedule_id = id, "timer removed");
                true
            }
            None => false,
        }
    }

    /// Alias of [`reconcile_remove`](Self::reconcile_remove).
    pub fn remove_timer(&self, id: ScheduleId) -> bool {
        self.reconcile_remove(id)
    }

    /// Rebuild the timer set from the enabled schedules in storage.
    ///
    /// Ids reconciled directly while the reload runs keep the state that
    /// reconcile left behind.
    pub fn reload_all(&self) -> Result<ReloadReport> {
        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        let schedules = self.runner.store.list_enabled_schedules()?;
        let mut report = ReloadReport::default();
        let mut live = HashSet::with_capacity(schedules.len());

        for schedule in &schedules {
            let cron = match CronExpr::parse(&schedule.cron_expression) {
                Ok(cron) => cron,
                Err(e) => {
                    warn!(
                        schedule_id = schedule.id,
                        expression = %schedule.cron_expression,
                        error = %e,
                        "skipping schedule"
                    );
                    report.skipped += 1;
                    continue;
                }
            };
            live.insert(schedule.id);
            match self.arm(schedule.id, cron, Some(epoch)) {
                Armed::Next(_) => report.registered += 1,
                Armed::Superseded => {
                    debug!(schedule_id = schedule.id, "reconciled during reload; left as is");
                }
            }
        }

        let stale: Vec<ScheduleId> = self
            .timers
            .iter()
            .map(|entry| *entry.key())
            .filter(|id| !live.contains(id))
            .collect();
        for id in stale {
            // Timers armed after this reload began carry a newer epoch.
            if let Some((_, timer)) = self.timers.remove_if(&id, |_, timer| timer.epoch < epoch) {
                timer.task.abort();
                info!(schedule_id = id, "stale timer removed");
                report.removed += 1;
            }
        }

        info!(
            registered = report.registered,
            skipped = report.skipped,
            removed = report.removed,
            "schedules reloaded"
        );
        Ok(report)
    }

    /// Alias of [`reload_all`](Self::reload_all).
    pub fn reload_all_enabled(&self) -> Result<ReloadReport> {
        self.reload_all()
    }

    /// Mark the registry running and arm timers for every enabled schedule.
    pub fn start(&self) -> Result<ReloadReport> {
        self.running.store(true, Ordering::SeqCst);
        info!("trigger registry started");
        self.reload_all()
    }

    /// Cancel every timer. In-flight fires complete.
    pub fn shutdown(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.abort_all();
        info!("trigger registry stopped");
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Periodically reload from storage until `shutdown` flips to `true`.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let start = tokio::time::Instant::now() + self.reload_interval;
        let mut interval = tokio::time::interval_at(start, self.reload_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.reload_all() {
                        error!(error = %e, "periodic reload failed");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        self.shutdown();
    }

    /// Run the fire callback for `id` now, outside any timer.
    pub async fn fire(&self, id: ScheduleId) -> FireOutcome {
        self.runner.fire(id).await
    }

    /// Registered schedule ids, ascending.
    pub fn registered_ids(&self) -> Vec<ScheduleId> {
        let mut ids: Vec<ScheduleId> = self.timers.iter().map(|e| *e.key()).collect();
        ids.sort_unstable();
        ids
    }

    pub fn is_registered(&self, id: ScheduleId) -> bool {
        self.timers.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.timers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }

    /// Arm `cron` for `id`, keeping a live timer with the same expression.
    ///
    /// `reload_epoch` is set when called from a reload; the id is then skipped
    /// if a direct reconcile touched it during that reload.
    fn arm(&self, id: ScheduleId, cron: CronExpr, reload_epoch: Option<u64>) -> Armed {
        let next = cron.next_after(self.runner.clock.now());
        let stamp = self.epoch.load(Ordering::SeqCst);

        let entry = self.timers.entry(id);
        // Checked under the shard lock so a concurrent remove either lands
        // before this check or removes whatever gets armed here.
        if let Some(epoch) = reload_epoch {
            if self.touched.get(&id).is_some_and(|touched| *touched >= epoch) {
                return Armed::Superseded;
            }
        }
        match entry {
            Entry::Occupied(mut entry)
                if entry.get().expression == cron.as_str() && !entry.get().task.is_finished() =>
            {
                entry.get_mut().epoch = stamp;
                debug!(schedule_id = id, expression = cron.as_str(), "timer unchanged");
            }
            Entry::Occupied(mut entry) => {
                let expression = cron.as_str().to_string();
                let previous = entry.insert(self.spawn_timer(id, cron, stamp));
                previous.task.abort();
                info!(schedule_id = id, %expression, "timer replaced");
            }
            Entry::Vacant(entry) => {
                let expression = cron.as_str().to_string();
                entry.insert(self.spawn_timer(id, cron, stamp));
                info!(schedule_id = id, %expression, "timer registered");
            }
        }

        if let Err(e) = self.runner.store.set_next_run(id, next) {
            warn!(schedule_id = id, error = %e, "failed to persist next run");
        }
        Armed::Next(next)
    }

    fn spawn_timer(&self, id: ScheduleId, cron: CronExpr, epoch: u64) -> Timer {
        let lane = self.lanes.entry(id).or_default().clone();
        let expression = cron.as_str().to_string();
        let task = tokio::spawn(run_timer(self.runner.clone(), lane, id, cron));
        Timer {
            expression,
            epoch,
            task,
        }
    }

    fn abort_all(&self) {
        for entry in self.timers.iter() {
            entry.task.abort();
        }
        self.timers.clear();
    }
}

impl Drop for TriggerRegistry {
    fn drop(&mut self) {
        self.abort_all();
    }
}

/// Timer loop for one schedule: sleep to the next instant, fire, repeat.
async fn run_timer(runner: Arc<FireRunner>, lane: FireLane, id: ScheduleId, cron: CronExpr) {
    loop {
        let Some(due) = cron.next_after(runner.clock.now()) else {
            info!(schedule_id = id, expression = cron.as_str(), "no future fire instant; timer idle");
            return;
        };
        sleep_until(runner.clock.as_ref(), due).await;

        let mut slot = lane.clone().lock_owned().await;
        if matches!(*slot, Some(last) if last >= due) {
            continue;
        }
        *slot = Some(due);

        // The fire owns the lane guard, so aborting this loop (replace/remove)
        // leaves an executing fire untouched while still blocking its successor.
        let fire_runner = runner.clone();
        let fire = tokio::spawn(async move {
            let _slot = slot;
            fire_runner.fire(id).await
        });
        match fire.await {
            Ok(outcome) => debug!(schedule_id = id, ?outcome, "fire finished"),
            Err(e) if e.is_panic() => error!(schedule_id = id, "fire panicked"),
            Err(_) => warn!(schedule_id = id, "fire cancelled"),
        }
    }
}

async fn sleep_until(clock: &dyn Clock, due: DateTime<Utc>) {
    loop {
        match (due - clock.now()).to_std() {
            Ok(remaining) if !remaining.is_zero() => {
                tokio::time::sleep(remaining.min(MAX_SLEEP)).await;
            }
            _ => return,
        }
    }
}
