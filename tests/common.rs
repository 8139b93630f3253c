use std::time::Duration;

use attack_sim::scheduler::{Scheduler, SchedulerConfig, Task, TaskId};

/// Generous upper bound for a single simulation in debug builds
#[allow(dead_code)]
pub const TIMEOUT: Duration = Duration::from_secs(300);

#[allow(dead_code)]
pub fn scheduler(workers: usize) -> Scheduler {
    Scheduler::new(SchedulerConfig::new().with_workers(workers)).unwrap()
}

// wait for a task to reach a terminal state
#[allow(dead_code)]
pub fn finish(scheduler: &Scheduler, id: &TaskId) -> Task {
    let task = scheduler.wait(id, TIMEOUT).unwrap();
    assert!(task.is_terminal(), "task {} still {}", id, task.status);
    task
}

#[allow(dead_code)]
pub fn to_hex(hex: &[u8]) -> String {
    hex.iter().map(|x| format!("{:02x}", x)).collect()
}
