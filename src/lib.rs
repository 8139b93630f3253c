//! Teaching simulations of classic cryptographic attacks.
//!
//! Each attack runs against freshly generated key material and records every
//! intermediate value as a replayable step trace. Simulations run inline
//! through [`simulation::SimulatorKind::run`] or asynchronously through the
//! [`scheduler::Scheduler`].

pub mod bignum;
pub mod bytes;
pub mod cbc;
pub mod encoding;
pub mod oracle;
pub mod pkcs7;
pub mod rsa;
pub mod scheduler;
pub mod simulation;

pub use scheduler::{Scheduler, SchedulerConfig, Task, TaskEvent, TaskId, TaskStatus};
pub use simulation::{Registry, SimulationResult, SimulatorInfo, SimulatorKind, StepRecord};
