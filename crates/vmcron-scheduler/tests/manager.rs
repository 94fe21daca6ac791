// Schedule write path and on-demand actions.

mod common;

use common::{at, Call, Harness};
use vmcron_core::types::{
    ExecutionStatus, NewSchedule, PowerAction, ResourceKind, ScheduleUpdate, TargetRef,
};
use vmcron_scheduler::{EngineStore, SchedulerError};

fn new_schedule(target: TargetRef, action: PowerAction, expression: &str) -> NewSchedule {
    NewSchedule {
        name: "maintenance".to_string(),
        target,
        action,
        cron_expression: expression.to_string(),
        enabled: true,
    }
}

#[tokio::test(start_paused = true)]
async fn create_persists_then_arms_the_timer() {
    let h = Harness::new(at(2026, 3, 2, 10, 7));
    let vm = h.guest(100, ResourceKind::Qemu);
    let manager = h.manager();

    let schedule = manager
        .create(new_schedule(TargetRef::vm(vm.id), PowerAction::Stop, "0 22 * * *"))
        .unwrap();
    assert_eq!(schedule.next_run, Some(at(2026, 3, 2, 22, 0)));
    assert!(h.registry.is_registered(schedule.id));
    assert_eq!(
        manager.get(schedule.id).unwrap().unwrap().next_run,
        Some(at(2026, 3, 2, 22, 0))
    );
    assert_eq!(manager.list().unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn create_rejects_invalid_input_before_persisting() {
    let h = Harness::new(at(2026, 3, 2, 10, 7));
    let ct = h.guest(200, ResourceKind::Lxc);
    let manager = h.manager();

    let err = manager
        .create(new_schedule(TargetRef::vm(ct.id), PowerAction::Stop, "0 25 * * *"))
        .unwrap_err();
    assert!(matches!(err, SchedulerError::InvalidCron { .. }));

    let err = manager
        .create(new_schedule(TargetRef::vm(9999), PowerAction::Stop, "0 2 * * *"))
        .unwrap_err();
    assert!(matches!(err, SchedulerError::InvalidTarget(_)));

    let err = manager
        .create(new_schedule(TargetRef::group(9999), PowerAction::Stop, "0 2 * * *"))
        .unwrap_err();
    assert!(matches!(err, SchedulerError::InvalidTarget(_)));

    let err = manager
        .create(new_schedule(TargetRef::vm(ct.id), PowerAction::Reset, "0 2 * * *"))
        .unwrap_err();
    assert!(matches!(err, SchedulerError::Precondition(_)));
    assert!(err.is_validation());

    assert!(manager.list().unwrap().is_empty());
    assert!(h.registry.is_empty());
}

#[tokio::test(start_paused = true)]
async fn reset_on_a_group_is_accepted_at_write_time() {
    let h = Harness::new(at(2026, 3, 2, 10, 7));
    let ct = h.guest(200, ResourceKind::Lxc);
    let group = h.group("containers", &[&ct]);

    let schedule = h
        .manager()
        .create(new_schedule(TargetRef::group(group), PowerAction::Reset, "0 3 * * *"))
        .unwrap();
    assert!(h.registry.is_registered(schedule.id));
}

#[tokio::test(start_paused = true)]
async fn update_toggle_and_delete_reconcile_the_registry() {
    let h = Harness::new(at(2026, 3, 2, 10, 7));
    let vm = h.guest(100, ResourceKind::Qemu);
    let manager = h.manager();
    let schedule = manager
        .create(new_schedule(TargetRef::vm(vm.id), PowerAction::Start, "0 8 * * *"))
        .unwrap();

    let updated = manager
        .update(
            schedule.id,
            ScheduleUpdate {
                cron_expression: Some("30 11 * * *".to_string()),
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(updated.next_run, Some(at(2026, 3, 2, 11, 30)));

    let err = manager
        .update(
            schedule.id,
            ScheduleUpdate {
                cron_expression: Some("bogus".to_string()),
                ..Default::default()
            },
        )
        .unwrap_err();
    assert!(err.is_validation());
    assert_eq!(
        h.store.get_schedule(schedule.id).unwrap().unwrap().cron_expression,
        "30 11 * * *"
    );

    let disabled = manager.toggle(schedule.id).unwrap();
    assert!(!disabled.enabled);
    assert_eq!(disabled.next_run, None);
    assert!(!h.registry.is_registered(schedule.id));

    let enabled = manager.toggle(schedule.id).unwrap();
    assert!(enabled.enabled);
    assert!(h.registry.is_registered(schedule.id));

    manager.delete(schedule.id).unwrap();
    assert!(!h.registry.is_registered(schedule.id));
    assert!(matches!(
        manager.delete(schedule.id),
        Err(SchedulerError::NotFound { .. })
    ));
}

#[tokio::test(start_paused = true)]
async fn manual_action_is_logged_without_a_schedule() {
    let h = Harness::new(at(2026, 3, 2, 23, 30));
    let vm = h.guest(100, ResourceKind::Qemu);
    let actions = h.actions();

    let accepted = actions.run_on_resource(100, PowerAction::Start).await.unwrap();
    assert_eq!(accepted.resource.id, vm.id);
    assert!(accepted.handle.as_str().starts_with("UPID:pve1:"));

    let logs = h.logs();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].schedule_id, None);
    assert_eq!(logs[0].status, ExecutionStatus::Success);
    assert_eq!(logs[0].task_handle.as_ref(), Some(&accepted.handle));
}

#[tokio::test(start_paused = true)]
async fn manual_action_failures_reach_the_caller_and_the_log() {
    let h = Harness::new(at(2026, 3, 2, 12, 0));
    h.guest(100, ResourceKind::Qemu);
    h.guest(200, ResourceKind::Lxc);
    h.control.fail_vmid(100);
    let actions = h.actions();

    let err = actions.run_on_resource(4242, PowerAction::Start).await.unwrap_err();
    assert!(matches!(err, SchedulerError::NotFound { entity: "resource", id: 4242 }));
    assert!(h.logs().is_empty());

    let err = actions.run_on_resource(200, PowerAction::Reset).await.unwrap_err();
    assert!(matches!(err, SchedulerError::Precondition(_)));

    let err = actions.run_on_resource(100, PowerAction::Stop).await.unwrap_err();
    assert!(matches!(err, SchedulerError::Dispatch(_)));

    let logs = h.logs();
    assert_eq!(logs.len(), 2);
    assert!(logs.iter().all(|l| l.status == ExecutionStatus::Failed));
    assert_eq!(h.control.calls(), vec![Call { vmid: 100, op: "stop" }]);
}

#[tokio::test(start_paused = true)]
async fn manual_group_action_reports_each_member() {
    let h = Harness::new(at(2026, 3, 2, 12, 0));
    let a = h.guest(100, ResourceKind::Qemu);
    let b = h.guest(101, ResourceKind::Lxc);
    h.control.fail_vmid(101);
    let group = h.group("pair", &[&a, &b]);
    let empty = h.group("empty", &[]);
    let actions = h.actions();

    let results = actions.run_on_group(group, PowerAction::Shutdown).await.unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].resource.vmid, 100);
    assert!(results[0].result.is_ok());
    assert!(results[1].result.is_err());
    assert_eq!(h.logs().len(), 2);

    let err = actions.run_on_group(empty, PowerAction::Start).await.unwrap_err();
    assert!(matches!(err, SchedulerError::InvalidTarget(_)));

    let err = actions.run_on_group(9999, PowerAction::Start).await.unwrap_err();
    assert!(matches!(err, SchedulerError::NotFound { entity: "group", .. }));
}
