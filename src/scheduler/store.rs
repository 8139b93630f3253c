use std::sync::Arc;

use hashbrown::HashMap;
use parking_lot::{Mutex, MutexGuard};

use crate::simulation::{CancelToken, SimulationResult};

use super::task::{Task, TaskId};

/// A task record together with its cancellation flag
///
/// Status and progress are only read or written under the task lock.
#[derive(Debug)]
pub struct TaskSlot {
    task: Mutex<Task>,
    cancel: CancelToken,
}

impl TaskSlot {
    fn new(task: Task) -> Self {
        Self {
            task: Mutex::new(task),
            cancel: CancelToken::new(),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, Task> {
        self.task.lock()
    }

    pub fn snapshot(&self) -> Task {
        self.task.lock().clone()
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }
}

/// In-memory task and result store
///
/// Tasks and results live in separate maps keyed by task id. The maps are
/// only locked long enough to look up or swap an entry; per-task state has
/// its own lock.
#[derive(Debug, Default)]
pub struct TaskStore {
    tasks: Mutex<HashMap<TaskId, Arc<TaskSlot>>>,
    results: Mutex<HashMap<TaskId, Arc<SimulationResult>>>,
}

impl TaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, task: Task) -> Arc<TaskSlot> {
        let id = task.id;
        let slot = Arc::new(TaskSlot::new(task));
        self.tasks.lock().insert(id, slot.clone());
        slot
    }

    pub fn get(&self, id: &TaskId) -> Option<Arc<TaskSlot>> {
        self.tasks.lock().get(id).cloned()
    }

    pub fn snapshot(&self, id: &TaskId) -> Option<Task> {
        self.get(id).map(|slot| slot.snapshot())
    }

    pub fn put_result(&self, id: TaskId, result: SimulationResult) {
        self.results.lock().insert(id, Arc::new(result));
    }

    pub fn result(&self, id: &TaskId) -> Option<Arc<SimulationResult>> {
        self.results.lock().get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.tasks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.lock().is_empty()
    }

    /// Remove terminal tasks that ended at or before `cutoff` (Unix ms)
    ///
    /// Returns the evicted ids. Their results are dropped as well.
    pub fn evict_terminal_before(&self, cutoff: u64) -> Vec<TaskId> {
        let mut tasks = self.tasks.lock();

        let expired: Vec<TaskId> = tasks
            .iter()
            .filter(|(_, slot)| {
                let task = slot.lock();
                task.is_terminal() && task.ended_at.map_or(false, |end| end <= cutoff)
            })
            .map(|(id, _)| *id)
            .collect();

        for id in expired.iter() {
            tasks.remove(id);
        }
        drop(tasks);

        let mut results = self.results.lock();
        for id in expired.iter() {
            results.remove(id);
        }

        expired
    }
}
