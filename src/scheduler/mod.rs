//! Task scheduler running simulations on a worker pool
//!
//! `submit` validates parameters on the caller's thread and queues a pending
//! task. Workers claim tasks by moving them from pending to running under the
//! task lock, so a task id is executed at most once. Cancellation sets the
//! task's flag, which the simulator polls at its checkpoints; a result that
//! arrives after cancellation is discarded.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::simulation::{
    self, FieldErrors, Registry, RunContext, RunObserver, SimulationResult, SimulatorInfo,
    StepRecord,
};

mod config;
mod store;
mod task;

pub use config::*;
pub use store::{TaskSlot, TaskStore};
pub use task::{Task, TaskError, TaskId, TaskStatus, TASK_ID_LEN};

#[derive(Debug, Error)]
pub enum Error {
    #[error("unknown simulator: {0}")]
    UnknownSimulator(String),
    #[error("invalid parameters: {0}")]
    InvalidParameters(FieldErrors),
    #[error("task not found: {0}")]
    TaskNotFound(TaskId),
    #[error("result of task {id} is not ready, status is {status}")]
    ResultNotReady { id: TaskId, status: TaskStatus },
    #[error("scheduler is shutting down")]
    ShuttingDown,
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Notifications pushed to subscribers while tasks run
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TaskEvent {
    Status {
        task_id: TaskId,
        status: TaskStatus,
        message: String,
    },
    Progress {
        task_id: TaskId,
        progress: u8,
        message: String,
    },
    Step {
        task_id: TaskId,
        step: StepRecord,
    },
}

impl TaskEvent {
    pub fn task_id(&self) -> TaskId {
        match self {
            Self::Status { task_id, .. }
            | Self::Progress { task_id, .. }
            | Self::Step { task_id, .. } => *task_id,
        }
    }
}

#[derive(Default)]
struct EventBus {
    subscribers: Mutex<Vec<Sender<TaskEvent>>>,
}

impl EventBus {
    fn subscribe(&self) -> Receiver<TaskEvent> {
        let (tx, rx) = channel::unbounded();
        self.subscribers.lock().push(tx);
        rx
    }

    fn publish(&self, event: TaskEvent) {
        let mut subscribers = self.subscribers.lock();
        if subscribers.is_empty() {
            return;
        }
        // disconnected receivers are dropped
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    fn status(&self, task: &Task) {
        self.publish(TaskEvent::Status {
            task_id: task.id,
            status: task.status,
            message: task.message.clone(),
        });
    }
}

struct Shared {
    registry: Registry,
    store: Arc<TaskStore>,
    events: EventBus,
}

/// Forwards simulator progress and steps into the task record and event bus
struct TaskObserver<'a> {
    shared: &'a Shared,
    slot: &'a TaskSlot,
    id: TaskId,
}

impl RunObserver for TaskObserver<'_> {
    fn progress(&self, percent: u8, message: &str) {
        let mut task = self.slot.lock();
        if task.advance(percent, message) {
            self.shared.events.publish(TaskEvent::Progress {
                task_id: self.id,
                progress: percent.min(100),
                message: message.to_string(),
            });
        }
    }

    fn step(&self, step: &StepRecord) {
        self.shared.events.publish(TaskEvent::Step {
            task_id: self.id,
            step: step.clone(),
        });
    }
}

impl Shared {
    fn run_task(&self, id: TaskId) {
        let slot = match self.store.get(&id) {
            Some(slot) => slot,
            None => {
                debug!(task = %id, "Task evicted before it was claimed");
                return;
            }
        };

        let (simulator_id, params) = {
            let mut task = slot.lock();
            if !task.start(now_ms()) {
                debug!(task = %id, status = %task.status, "Skipping task that is no longer pending");
                return;
            }
            self.events.status(&task);
            (task.simulator_id.clone(), task.parameters.clone())
        };

        info!(task = %id, simulator = %simulator_id, "Task claimed");

        let outcome = match self.registry.get(&simulator_id) {
            Some(simulator) => {
                let observer = TaskObserver {
                    shared: self,
                    slot: &slot,
                    id,
                };
                let mut ctx = RunContext::new(slot.cancel_token().clone(), Some(&observer));
                catch_unwind(AssertUnwindSafe(|| simulator.execute(&params, &mut ctx)))
                    .map_err(|payload| TaskError {
                        kind: "Panic".to_string(),
                        message: panic_message(payload),
                    })
            }
            None => Err(TaskError {
                kind: "UnknownSimulator".to_string(),
                message: format!("simulator {simulator_id} is no longer registered"),
            }),
        };

        self.finish_task(&slot, id, outcome);
    }

    fn finish_task(
        &self,
        slot: &TaskSlot,
        id: TaskId,
        outcome: Result<Result<SimulationResult, simulation::Error>, TaskError>,
    ) {
        let mut task = slot.lock();
        let now = now_ms();

        let changed = match outcome {
            Ok(Ok(result)) => {
                if task.status == TaskStatus::Running {
                    self.store.put_result(id, result);
                    task.complete(now)
                } else {
                    debug!(task = %id, status = %task.status, "Discarding late result");
                    false
                }
            }
            Ok(Err(simulation::Error::Cancelled)) => task.cancel(now),
            Ok(Err(err)) => task.fail(
                now,
                TaskError {
                    kind: err.kind().to_string(),
                    message: err.to_string(),
                },
            ),
            Err(error) => task.fail(now, error),
        };

        if !changed {
            return;
        }

        match task.status {
            TaskStatus::Completed => {
                info!(task = %id, execution_time_ms = ?task.execution_time_ms, "Task completed")
            }
            TaskStatus::Failed => warn!(task = %id, error = ?task.error, "Task failed"),
            _ => info!(task = %id, "Task cancelled while running"),
        }
        self.events.status(&task);
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        format!("simulator panicked: {msg}")
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        format!("simulator panicked: {msg}")
    } else {
        "simulator panicked".to_string()
    }
}

/// Current Unix time in milliseconds
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Runs simulations asynchronously and tracks their lifecycle
pub struct Scheduler {
    config: SchedulerConfig,
    shared: Arc<Shared>,
    queue: Mutex<Option<Sender<TaskId>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl Scheduler {
    /// Scheduler with the built-in simulators and a fresh store
    pub fn new(config: SchedulerConfig) -> Result<Self, Error> {
        Self::with_parts(config, Registry::builtin(), Arc::new(TaskStore::new()))
    }

    /// Scheduler over an explicit registry and store
    pub fn with_parts(
        config: SchedulerConfig,
        registry: Registry,
        store: Arc<TaskStore>,
    ) -> Result<Self, Error> {
        let shared = Arc::new(Shared {
            registry,
            store,
            events: EventBus::default(),
        });

        let (tx, rx) = channel::unbounded::<TaskId>();
        let count = config.workers.max(1);
        let mut workers = Vec::with_capacity(count);

        for n in 0..count {
            let rx = rx.clone();
            let shared = shared.clone();
            let handle = thread::Builder::new()
                .name(format!("{}-{n}", config.thread_name_prefix))
                .spawn(move || {
                    debug!(worker = n, "Worker started");
                    for id in rx.iter() {
                        shared.run_task(id);
                    }
                    debug!(worker = n, "Worker stopped");
                })?;
            workers.push(handle);
        }

        info!(workers = count, retention_secs = config.retention.as_secs(), "Scheduler started");

        Ok(Self {
            config,
            shared,
            queue: Mutex::new(Some(tx)),
            workers: Mutex::new(workers),
        })
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<TaskStore> {
        &self.shared.store
    }

    pub fn list_simulators(&self) -> Vec<SimulatorInfo> {
        self.shared.registry.list()
    }

    /// Validate parameters and queue a new task
    ///
    /// errors: UnknownSimulator, InvalidParameters, ShuttingDown. No task is
    /// created when an error is returned.
    pub fn submit(&self, simulator_id: &str, parameters: &Value) -> Result<TaskId, Error> {
        let simulator = self
            .shared
            .registry
            .get(simulator_id)
            .ok_or_else(|| Error::UnknownSimulator(simulator_id.to_string()))?;

        let params = simulator
            .validate(parameters)
            .map_err(Error::InvalidParameters)?;

        let queue = self.queue.lock();
        let tx = queue.as_ref().ok_or(Error::ShuttingDown)?;

        let id = TaskId::random();
        let slot = self.shared.store.insert(Task::new(id, simulator_id, params, now_ms()));
        self.shared.events.status(&slot.lock());

        if tx.send(id).is_err() {
            return Err(Error::ShuttingDown);
        }

        info!(task = %id, simulator = simulator_id, "Task submitted");
        Ok(id)
    }

    /// Snapshot of a task record
    pub fn get_status(&self, id: &TaskId) -> Result<Task, Error> {
        self.shared
            .store
            .snapshot(id)
            .ok_or(Error::TaskNotFound(*id))
    }

    /// Result of a completed task
    ///
    /// errors: TaskNotFound, ResultNotReady unless the task completed
    pub fn get_result(&self, id: &TaskId) -> Result<Arc<SimulationResult>, Error> {
        let slot = self.shared.store.get(id).ok_or(Error::TaskNotFound(*id))?;
        let status = slot.lock().status;

        if status != TaskStatus::Completed {
            return Err(Error::ResultNotReady { id: *id, status });
        }

        self.shared
            .store
            .result(id)
            .ok_or(Error::TaskNotFound(*id))
    }

    /// Request cancellation; a no-op for finished tasks
    pub fn cancel(&self, id: &TaskId) -> Result<(), Error> {
        let slot = self.shared.store.get(id).ok_or(Error::TaskNotFound(*id))?;

        let mut task = slot.lock();
        if task.cancel(now_ms()) {
            slot.cancel_token().cancel();
            info!(task = %id, "Task cancelled");
            self.shared.events.status(&task);
        } else {
            debug!(task = %id, status = %task.status, "Cancel ignored for finished task");
        }

        Ok(())
    }

    /// Block until the task is finished or `timeout` elapses
    ///
    /// Returns the latest snapshot either way.
    pub fn wait(&self, id: &TaskId, timeout: Duration) -> Result<Task, Error> {
        let deadline = Instant::now() + timeout;
        // subscribed before the first snapshot, so no transition is missed
        let events = self.subscribe();

        loop {
            let task = self.get_status(id)?;
            if task.is_terminal() {
                return Ok(task);
            }

            loop {
                match events.recv_deadline(deadline) {
                    Ok(TaskEvent::Status { task_id, .. }) if task_id == *id => break,
                    Ok(_) => continue,
                    Err(_) => return self.get_status(id),
                }
            }
        }
    }

    /// Receive every task event from now on
    pub fn subscribe(&self) -> Receiver<TaskEvent> {
        self.shared.events.subscribe()
    }

    /// Evict finished tasks that ended at least `max_age` ago
    ///
    /// Returns the number of tasks evicted.
    pub fn cleanup(&self, max_age: Duration) -> usize {
        let cutoff = now_ms().saturating_sub(max_age.as_millis() as u64);
        let evicted = self.shared.store.evict_terminal_before(cutoff);

        if !evicted.is_empty() {
            info!(count = evicted.len(), "Evicted finished tasks");
        }
        evicted.len()
    }

    /// Evict finished tasks older than the configured retention
    pub fn evict_expired(&self) -> usize {
        self.cleanup(self.config.retention)
    }

    /// Stop accepting tasks, let queued ones drain and join the workers
    pub fn shutdown(&self) {
        let sender = self.queue.lock().take();
        if sender.is_none() {
            return;
        }
        drop(sender);

        let workers: Vec<JoinHandle<()>> = self.workers.lock().drain(..).collect();
        for handle in workers {
            if handle.join().is_err() {
                warn!("Worker thread panicked");
            }
        }

        info!("Scheduler stopped");
    }

    pub fn is_shut_down(&self) -> bool {
        self.queue.lock().is_none()
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}
