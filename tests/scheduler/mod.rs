use std::thread;
use std::time::Duration;

use attack_sim::scheduler::{Error, Scheduler, SchedulerConfig, TaskEvent, TaskStatus};
use serde_json::json;

use crate::common;

// a Håstad run slow enough to still be going when the test acts on it
fn submit_blocker(scheduler: &Scheduler) -> attack_sim::TaskId {
    let id = scheduler
        .submit("hastad-attack", &json!({ "exponent": 17, "key_size_bits": 2048 }))
        .unwrap();

    while scheduler.get_status(&id).unwrap().status == TaskStatus::Pending {
        thread::sleep(Duration::from_millis(5));
    }
    id
}

#[test]
fn test_status_idempotent() {
    let scheduler = common::scheduler(2);
    let id = scheduler
        .submit("cbc-padding-oracle", &json!({ "message": "idempotent" }))
        .unwrap();

    let first = common::finish(&scheduler, &id);
    assert_eq!(first.status, TaskStatus::Completed);

    for _ in 0..5 {
        assert_eq!(scheduler.get_status(&id).unwrap(), first);
    }
    assert!(first.execution_time_ms.is_some());
    assert!(first.created_at <= first.started_at.unwrap());
    assert!(first.started_at <= first.ended_at);
}

#[test]
fn test_concurrent_submissions() {
    let scheduler = common::scheduler(4);
    let count = 8;

    let ids: Vec<_> = thread::scope(|s| {
        let handles: Vec<_> = (0..count)
            .map(|i| {
                let scheduler = &scheduler;
                s.spawn(move || {
                    let message = format!("message number {}", i);
                    let id = scheduler
                        .submit("cbc-padding-oracle", &json!({ "message": message }))
                        .unwrap();
                    (id, message)
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let mut unique: Vec<_> = ids.iter().map(|(id, _)| id.to_string()).collect();
    unique.sort();
    unique.dedup();
    assert_eq!(unique.len(), count);

    for (id, message) in ids.iter() {
        assert_eq!(common::finish(&scheduler, id).status, TaskStatus::Completed);

        let result = scheduler.get_result(id).unwrap();
        assert_eq!(result.primary_output["original_message"], message.as_str());
        assert_eq!(result.primary_output["recovered_message"], message.as_str());
    }
}

#[test]
fn test_cancel_pending() {
    let scheduler = common::scheduler(1);
    let blocker = submit_blocker(&scheduler);

    let id = scheduler
        .submit("cbc-padding-oracle", &json!({ "message": "never decrypted" }))
        .unwrap();
    assert_eq!(scheduler.get_status(&id).unwrap().status, TaskStatus::Pending);

    scheduler.cancel(&id).unwrap();
    let task = scheduler.get_status(&id).unwrap();
    assert_eq!(task.status, TaskStatus::Cancelled);
    assert_eq!(task.result_ref, None);
    assert!(matches!(
        scheduler.get_result(&id),
        Err(Error::ResultNotReady {
            status: TaskStatus::Cancelled,
            ..
        })
    ));

    // the running blocker stops at its next checkpoint
    scheduler.cancel(&blocker).unwrap();
    assert_eq!(scheduler.get_status(&blocker).unwrap().status, TaskStatus::Cancelled);

    scheduler.shutdown();

    for task_id in [id, blocker] {
        let task = scheduler.get_status(&task_id).unwrap();
        assert_eq!(task.status, TaskStatus::Cancelled);
        assert_eq!(task.started_at.is_some(), task_id == blocker);
        assert!(scheduler.get_result(&task_id).is_err());
        assert!(scheduler.store().result(&task_id).is_none());
    }
}

#[test]
fn test_cancel_finished_is_noop() {
    let scheduler = common::scheduler(1);
    let id = scheduler
        .submit("hastad-attack", &json!({ "key_size_bits": 256, "message": 5 }))
        .unwrap();

    let done = common::finish(&scheduler, &id);
    assert_eq!(done.status, TaskStatus::Completed);

    scheduler.cancel(&id).unwrap();
    assert_eq!(scheduler.get_status(&id).unwrap(), done);
    assert!(scheduler.get_result(&id).is_ok());
}

#[test]
fn test_cancel_events() {
    let scheduler = common::scheduler(1);
    let events = scheduler.subscribe();

    let blocker = submit_blocker(&scheduler);
    scheduler.cancel(&blocker).unwrap();
    scheduler.shutdown();

    let statuses: Vec<TaskStatus> = events
        .try_iter()
        .filter_map(|e| match e {
            TaskEvent::Status { task_id, status, .. } if task_id == blocker => Some(status),
            _ => None,
        })
        .collect();

    // the worker's own cancellation is not reported twice
    assert_eq!(
        statuses,
        vec![TaskStatus::Pending, TaskStatus::Running, TaskStatus::Cancelled]
    );
}

#[test]
fn test_cleanup() {
    let scheduler = common::scheduler(1);

    let done = scheduler
        .submit("cbc-padding-oracle", &json!({ "message": "short" }))
        .unwrap();
    common::finish(&scheduler, &done);

    let blocker = submit_blocker(&scheduler);

    assert_eq!(scheduler.cleanup(Duration::from_secs(3600)), 0);
    assert_eq!(scheduler.cleanup(Duration::ZERO), 1);

    assert!(matches!(scheduler.get_status(&done), Err(Error::TaskNotFound(_))));
    assert!(matches!(scheduler.get_result(&done), Err(Error::TaskNotFound(_))));
    assert_eq!(scheduler.get_status(&blocker).unwrap().status, TaskStatus::Running);

    scheduler.cancel(&blocker).unwrap();
}

#[test]
fn test_evict_expired() {
    let config = SchedulerConfig::new()
        .with_workers(1)
        .with_retention(Duration::ZERO);
    let scheduler = Scheduler::new(config).unwrap();

    let id = scheduler.submit("cbc-padding-oracle", &json!({})).unwrap();
    common::finish(&scheduler, &id);

    assert_eq!(scheduler.evict_expired(), 1);
    assert!(scheduler.store().is_empty());
}

#[test]
fn test_shutdown_drains_queue() {
    let scheduler = common::scheduler(1);

    let ids: Vec<_> = (0..3)
        .map(|i| {
            scheduler
                .submit("cbc-padding-oracle", &json!({ "message": format!("queued {}", i) }))
                .unwrap()
        })
        .collect();

    scheduler.shutdown();

    for id in ids.iter() {
        assert_eq!(scheduler.get_status(id).unwrap().status, TaskStatus::Completed);
    }
    assert!(matches!(
        scheduler.submit("cbc-padding-oracle", &json!({})),
        Err(Error::ShuttingDown)
    ));
}

#[test]
fn test_list_simulators() {
    let scheduler = common::scheduler(1);
    let catalog = scheduler.list_simulators();

    let ids: Vec<&str> = catalog.iter().map(|s| s.id).collect();
    assert_eq!(ids, vec!["hastad-attack", "cbc-padding-oracle"]);

    let hastad = serde_json::to_value(&catalog[0]).unwrap();
    assert_eq!(hastad["complexity"], "Medium");
    assert_eq!(hastad["parameter_schema"][0]["name"], "exponent");
    assert_eq!(hastad["parameter_schema"][0]["default"], 3);

    assert!(matches!(
        scheduler.submit("mitm-visualization", &json!({})),
        Err(Error::UnknownSimulator(_))
    ));
}
