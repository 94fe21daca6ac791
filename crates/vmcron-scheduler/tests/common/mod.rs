// Shared fixtures for the engine integration tests.
#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use vmcron_core::types::{
    ExecutionLogEntry, GroupId, NewResource, NewSchedule, PowerAction, Resource, ResourceKind,
    Schedule, TargetRef, TaskHandle,
};
use vmcron_core::{ControlError, ControlPlane, TaskStatus};
use vmcron_scheduler::{
    ActionDispatcher, EngineStore, FireRunner, LogQuery, ManualActions, MonotonicClock, ResourceCatalog,
    ScheduleManager, SqliteStore, TriggerRegistry,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub vmid: u32,
    pub op: &'static str,
}

/// Control plane double: records every call, fails chosen vmids and can
/// hold each call open for a fixed delay.
#[derive(Default)]
pub struct FakeControlPlane {
    calls: Mutex<Vec<Call>>,
    failing: Mutex<HashSet<u32>>,
    delay: Mutex<Option<Duration>>,
    seq: AtomicU64,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeControlPlane {
    pub fn fail_vmid(&self, vmid: u32) {
        self.failing.lock().unwrap().insert(vmid);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    async fn handle(&self, resource: &Resource, op: &'static str) -> Result<TaskHandle, ControlError> {
        self.calls.lock().unwrap().push(Call {
            vmid: resource.vmid,
            op,
        });
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let fails = self.failing.lock().unwrap().contains(&resource.vmid);
        if fails {
            return Err(ControlError::Api {
                status: 500,
                message: format!("VM {} is locked (backup)", resource.vmid),
            });
        }
        let n = self.seq.fetch_add(1, Ordering::SeqCst);
        Ok(TaskHandle(format!("UPID:{}:{n:08X}:{op}", resource.node)))
    }
}

#[async_trait]
impl ControlPlane for FakeControlPlane {
    fn name(&self) -> &str {
        "fake"
    }

    async fn start(&self, resource: &Resource) -> Result<TaskHandle, ControlError> {
        self.handle(resource, "start").await
    }

    async fn stop(&self, resource: &Resource) -> Result<TaskHandle, ControlError> {
        self.handle(resource, "stop").await
    }

    async fn reboot(&self, resource: &Resource) -> Result<TaskHandle, ControlError> {
        self.handle(resource, "reboot").await
    }

    async fn shutdown(&self, resource: &Resource) -> Result<TaskHandle, ControlError> {
        self.handle(resource, "shutdown").await
    }

    async fn reset(&self, resource: &Resource) -> Result<TaskHandle, ControlError> {
        self.handle(resource, "reset").await
    }

    async fn task_status(&self, _node: &str, _handle: &TaskHandle) -> Result<TaskStatus, ControlError> {
        Ok(TaskStatus::Stopped {
            exit_status: "OK".to_string(),
        })
    }
}

pub fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
}

/// In-memory store, fake control plane and a registry on a paused-time clock.
pub struct Harness {
    pub store: Arc<SqliteStore>,
    pub control: Arc<FakeControlPlane>,
    pub clock: Arc<MonotonicClock>,
    pub registry: Arc<TriggerRegistry>,
}

impl Harness {
    pub fn new(anchor: DateTime<Utc>) -> Self {
        Self::with_engine_store(anchor, |store| store as Arc<dyn EngineStore>)
    }

    /// Like [`Harness::new`], but the engine sees `wrap(store)` as its
    /// `EngineStore` while the harness keeps direct access to the SQLite store.
    pub fn with_engine_store(
        anchor: DateTime<Utc>,
        wrap: impl FnOnce(Arc<SqliteStore>) -> Arc<dyn EngineStore>,
    ) -> Self {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let control = Arc::new(FakeControlPlane::default());
        let clock = Arc::new(MonotonicClock::anchored_at(anchor));
        let runner = FireRunner::new(
            wrap(store.clone()),
            store.clone(),
            Self::dispatcher_for(&control),
            clock.clone(),
        );
        let registry = Arc::new(TriggerRegistry::new(runner));
        Self {
            store,
            control,
            clock,
            registry,
        }
    }

    fn dispatcher_for(control: &Arc<FakeControlPlane>) -> ActionDispatcher {
        ActionDispatcher::new(control.clone(), Duration::from_secs(3600))
    }

    pub fn guest(&self, vmid: u32, kind: ResourceKind) -> Resource {
        let id = self
            .store
            .upsert_resource(&NewResource {
                vmid,
                name: format!("guest-{vmid}"),
                kind,
                node: "pve1".to_string(),
                status: Some("running".to_string()),
                maxmem: None,
                maxdisk: None,
                uptime: None,
            })
            .unwrap()
            .id();
        self.store.get_resource(id).unwrap().unwrap()
    }

    pub fn group(&self, name: &str, members: &[&Resource]) -> GroupId {
        let group = self.store.create_group(name, None).unwrap();
        for member in members {
            self.store.add_group_member(group.id, member.id).unwrap();
        }
        group.id
    }

    /// Persist an enabled schedule without arming a timer.
    pub fn schedule(&self, target: TargetRef, action: PowerAction, expression: &str) -> Schedule {
        self.store
            .insert_schedule(&NewSchedule {
                name: format!("{action} {target}"),
                target,
                action,
                cron_expression: expression.to_string(),
                enabled: true,
            })
            .unwrap()
    }

    pub fn logs(&self) -> Vec<ExecutionLogEntry> {
        let mut logs = self
            .store
            .list_execution_logs(LogQuery {
                limit: 1000,
                ..Default::default()
            })
            .unwrap();
        logs.reverse();
        logs
    }

    pub fn manager(&self) -> ScheduleManager {
        ScheduleManager::new(self.store.clone(), self.registry.clone())
    }

    pub fn actions(&self) -> ManualActions {
        ManualActions::new(
            self.store.clone(),
            self.store.clone(),
            Self::dispatcher_for(&self.control),
            self.clock.clone(),
        )
    }
}

/// Sleep (in paused test time) until the harness clock reads `target`.
pub async fn advance_to(clock: &MonotonicClock, target: DateTime<Utc>) {
    use vmcron_scheduler::Clock;
    let remaining = (target - clock.now()).to_std().unwrap_or_default();
    tokio::time::sleep(remaining).await;
}
