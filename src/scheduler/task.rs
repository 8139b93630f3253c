use std::fmt;
use std::str::FromStr;

use rand::Rng;
use serde::{Serialize, Serializer};

use crate::encoding;
use crate::simulation::SimulationParameters;

/// Length of a task identifier in bytes
pub const TASK_ID_LEN: usize = 16;

/// Opaque random 128-bit task identifier, rendered as hex
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TaskId([u8; TASK_ID_LEN]);

impl TaskId {
    pub fn random() -> Self {
        Self(rand::thread_rng().gen())
    }

    pub fn as_bytes(&self) -> &[u8; TASK_ID_LEN] {
        &self.0
    }
}

impl From<[u8; TASK_ID_LEN]> for TaskId {
    fn from(bytes: [u8; TASK_ID_LEN]) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&encoding::to_hex(&self.0))
    }
}

impl FromStr for TaskId {
    type Err = encoding::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = encoding::from_hex(s)?;
        let id: [u8; TASK_ID_LEN] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| encoding::Error::HexLength)?;
        Ok(Self(id))
    }
}

impl Serialize for TaskId {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(self)
    }
}

/// Lifecycle state of a task
///
/// `Pending -> Running -> {Completed, Failed, Cancelled}`. Pending tasks may
/// also be cancelled directly. Nothing leaves a terminal state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured failure recorded on a failed task
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TaskError {
    pub kind: String,
    pub message: String,
}

/// Observable record of one submitted simulation
///
/// `result_ref` is set exactly when the task is completed, `error` exactly
/// when it failed. Progress never decreases.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Task {
    pub id: TaskId,
    pub simulator_id: String,
    pub parameters: SimulationParameters,
    pub status: TaskStatus,
    pub progress: u8,
    pub message: String,
    /// Unix time in milliseconds
    pub created_at: u64,
    pub started_at: Option<u64>,
    pub ended_at: Option<u64>,
    pub execution_time_ms: Option<u64>,
    pub error: Option<TaskError>,
    pub result_ref: Option<TaskId>,
}

impl Task {
    pub fn new(id: TaskId, simulator_id: &str, parameters: SimulationParameters, now: u64) -> Self {
        Self {
            id,
            simulator_id: simulator_id.to_string(),
            parameters,
            status: TaskStatus::Pending,
            progress: 0,
            message: "Task initialized".to_string(),
            created_at: now,
            started_at: None,
            ended_at: None,
            execution_time_ms: None,
            error: None,
            result_ref: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Claim a pending task for execution
    ///
    /// Returns false when the task was already claimed or cancelled.
    pub fn start(&mut self, now: u64) -> bool {
        if self.status != TaskStatus::Pending {
            return false;
        }
        self.status = TaskStatus::Running;
        self.started_at = Some(now);
        self.message = "Task started".to_string();
        true
    }

    /// Record progress while running, ignoring updates that go backwards
    pub fn advance(&mut self, progress: u8, message: &str) -> bool {
        let progress = progress.min(100);
        if self.status != TaskStatus::Running || progress < self.progress {
            return false;
        }
        self.progress = progress;
        self.message = message.to_string();
        true
    }

    pub fn complete(&mut self, now: u64) -> bool {
        if self.status != TaskStatus::Running {
            return false;
        }
        self.status = TaskStatus::Completed;
        self.progress = 100;
        self.message = "Simulation completed".to_string();
        self.result_ref = Some(self.id);
        self.finish(now);
        true
    }

    pub fn fail(&mut self, now: u64, error: TaskError) -> bool {
        if self.is_terminal() {
            return false;
        }
        self.status = TaskStatus::Failed;
        self.message = format!("Simulation failed: {}", error.message);
        self.error = Some(error);
        self.finish(now);
        true
    }

    pub fn cancel(&mut self, now: u64) -> bool {
        if self.is_terminal() {
            return false;
        }
        self.status = TaskStatus::Cancelled;
        self.message = "Task cancelled".to_string();
        self.finish(now);
        true
    }

    fn finish(&mut self, now: u64) {
        self.ended_at = Some(now);
        self.execution_time_ms = self.started_at.map(|start| now.saturating_sub(start));
    }
}
