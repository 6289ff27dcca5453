//! Tests for error types

use connector_scheduler::core::SchedulerError;

#[test]
fn test_duplicate_name_error() {
    let err = SchedulerError::DuplicateName("m/c/p".to_string());
    assert_eq!(format!("{}", err), "duplicate scheduler name: m/c/p");
}

#[test]
fn test_rejected_error() {
    let err = SchedulerError::Rejected("m/c/p".to_string());
    assert_eq!(format!("{}", err), "task rejected: scheduler `m/c/p` is stopped");
}

#[test]
fn test_stop_timeout_error() {
    let err = SchedulerError::StopTimeout {
        name: "m/c/p".to_string(),
        abandoned: 3,
    };
    assert_eq!(
        format!("{}", err),
        "scheduler `m/c/p` did not stop in time; 3 task(s) abandoned"
    );
}

#[test]
fn test_pool_busy_error() {
    let err = SchedulerError::PoolBusy("m/c/p".to_string());
    assert_eq!(format!("{}", err), "pool busy: scheduler `m/c/p` has no free worker");
}

#[test]
fn test_task_errors() {
    assert_eq!(format!("{}", SchedulerError::Cancelled), "task cancelled");
    assert_eq!(format!("{}", SchedulerError::Timeout), "operation timed out");
    assert_eq!(
        format!("{}", SchedulerError::TaskFailed("boom".into())),
        "task failed: boom"
    );
}

#[test]
fn test_converts_into_anyhow() {
    fn fails() -> connector_scheduler::core::AppResult<()> {
        Err(SchedulerError::InvalidConfig("worker_count must be greater than 0".into()))?;
        Ok(())
    }
    let err = fails().unwrap_err();
    assert!(matches!(
        err.downcast_ref::<SchedulerError>(),
        Some(SchedulerError::InvalidConfig(_))
    ));
}
