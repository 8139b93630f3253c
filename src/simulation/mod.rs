//! Attack simulators and the contract they share.
//!
//! A simulator validates a JSON parameter object into its own typed
//! parameters, then executes against freshly generated key material while
//! appending [`StepRecord`]s to a [`RunContext`]. The context is also where
//! cancellation is polled and progress is reported, so a simulator never
//! needs to know whether it runs inline or under the scheduler.
//!
//! Checkpoint density is part of the contract: a simulator calls
//! [`RunContext::checkpoint`] at least once per outer loop iteration (per
//! key-generation attempt, per encryption, per CRT/root stage, per
//! ciphertext block and per guessed byte).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::info;

use crate::{bignum, cbc, oracle};

pub mod hastad;
pub mod padding_oracle;
mod params;

pub use hastad::{HastadBroadcast, HastadParams, HastadReport};
pub use padding_oracle::{
    CbcPaddingOracleSimulator, CipherBlock, DecryptedBlock, PaddingOracleParams,
    PaddingOracleReport,
};
pub use params::{FieldError, FieldErrors, ParameterKind, ParameterSpec};

/// Errors raised while a simulation executes
#[derive(Debug, Error)]
pub enum Error {
    #[error("could not generate pairwise coprime moduli after {attempts} attempts")]
    ModulusCollision { attempts: usize },
    #[error("could not find primes compatible with the public exponent after {attempts} attempts")]
    KeyGeneration { attempts: usize },
    #[error("CRT value is not an exact {exponent}-th power")]
    RootExtractionFailed { exponent: u32 },
    #[error("recovered plaintext has invalid padding byte {value:#04x}")]
    InvalidPadding { value: u8 },
    #[error("oracle accepted no guess for byte {position} of block {block}")]
    OracleExhausted { block: usize, position: usize },
    #[error("parameters do not belong to simulator {simulator}")]
    ParameterMismatch { simulator: &'static str },
    #[error(transparent)]
    Arithmetic(#[from] bignum::Error),
    #[error(transparent)]
    Cipher(#[from] cbc::Error),
    #[error(transparent)]
    Oracle(#[from] oracle::Error),
    #[error("failed to serialize output: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("simulation cancelled")]
    Cancelled,
}

impl Error {
    /// Stable error code for callers
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ModulusCollision { .. } => "ModulusCollision",
            Self::KeyGeneration { .. } => "KeyGeneration",
            Self::RootExtractionFailed { .. } => "RootExtractionFailed",
            Self::InvalidPadding { .. } => "InvalidPadding",
            Self::OracleExhausted { .. } => "OracleExhausted",
            Self::ParameterMismatch { .. } => "ParameterMismatch",
            Self::Arithmetic(_) => "Arithmetic",
            Self::Cipher(_) => "Cipher",
            Self::Oracle(_) => "Oracle",
            Self::Serialization(_) => "Serialization",
            Self::Cancelled => "Cancelled",
        }
    }
}

/// One named stage of an attack run
///
/// Appended once, never modified afterwards.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StepRecord {
    pub label: String,
    pub description: String,
    pub payload: Value,
}

/// Everything an attack run produces
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SimulationResult {
    pub primary_output: Value,
    pub steps: Vec<StepRecord>,
    pub visualization_data: Value,
}

/// Shared cooperative cancellation flag
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Receives progress and steps while a simulation runs
pub trait RunObserver {
    fn progress(&self, percent: u8, message: &str);

    fn step(&self, step: &StepRecord);
}

/// Per-run state handed to a simulator
pub struct RunContext<'a> {
    cancel: CancelToken,
    observer: Option<&'a dyn RunObserver>,
    steps: Vec<StepRecord>,
}

impl<'a> RunContext<'a> {
    pub fn new(cancel: CancelToken, observer: Option<&'a dyn RunObserver>) -> Self {
        Self {
            cancel,
            observer,
            steps: Vec::new(),
        }
    }

    /// A context nobody observes or cancels
    pub fn detached() -> RunContext<'static> {
        RunContext::new(CancelToken::new(), None)
    }

    /// Fails with `Cancelled` once cancellation was requested
    pub fn checkpoint(&self) -> Result<(), Error> {
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        Ok(())
    }

    pub fn progress(&self, percent: u8, message: &str) {
        if let Some(observer) = self.observer {
            observer.progress(percent.min(100), message);
        }
    }

    /// Append a step to the trace and push it to the observer
    pub fn record(&mut self, label: impl Into<String>, description: impl Into<String>, payload: Value) {
        let step = StepRecord {
            label: label.into(),
            description: description.into(),
            payload,
        };
        if let Some(observer) = self.observer {
            observer.step(&step);
        }
        self.steps.push(step);
    }

    pub fn steps(&self) -> &[StepRecord] {
        &self.steps
    }

    pub fn take_steps(&mut self) -> Vec<StepRecord> {
        std::mem::take(&mut self.steps)
    }
}

/// Catalog entry for one simulator
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SimulatorInfo {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub complexity: &'static str,
    pub tags: Vec<&'static str>,
    pub parameter_schema: Vec<ParameterSpec>,
}

/// Contract every attack simulation implements
pub trait Simulator {
    type Params;

    fn info(&self) -> SimulatorInfo;

    /// Turn raw JSON into typed parameters, reporting every bad field
    fn validate(&self, raw: &Value) -> Result<Self::Params, FieldErrors>;

    fn execute(&self, params: &Self::Params, ctx: &mut RunContext<'_>) -> Result<SimulationResult, Error>;
}

/// Validated, immutable parameters for one of the known simulators
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "simulator", content = "values", rename_all = "kebab-case")]
pub enum SimulationParameters {
    HastadBroadcast(HastadParams),
    CbcPaddingOracle(PaddingOracleParams),
}

/// The closed set of simulators
#[derive(Clone, Debug)]
pub enum SimulatorKind {
    HastadBroadcast(HastadBroadcast),
    CbcPaddingOracle(CbcPaddingOracleSimulator),
}

/// Failure of a direct, unscheduled run
#[derive(Debug, Error)]
pub enum RunError {
    #[error("invalid parameters: {0}")]
    InvalidParameters(FieldErrors),
    #[error(transparent)]
    Simulation(#[from] Error),
}

impl SimulatorKind {
    pub fn id(&self) -> &'static str {
        match self {
            Self::HastadBroadcast(_) => hastad::ID,
            Self::CbcPaddingOracle(_) => padding_oracle::ID,
        }
    }

    pub fn info(&self) -> SimulatorInfo {
        match self {
            Self::HastadBroadcast(s) => s.info(),
            Self::CbcPaddingOracle(s) => s.info(),
        }
    }

    pub fn validate(&self, raw: &Value) -> Result<SimulationParameters, FieldErrors> {
        match self {
            Self::HastadBroadcast(s) => s.validate(raw).map(SimulationParameters::HastadBroadcast),
            Self::CbcPaddingOracle(s) => s.validate(raw).map(SimulationParameters::CbcPaddingOracle),
        }
    }

    pub fn execute(
        &self,
        params: &SimulationParameters,
        ctx: &mut RunContext<'_>,
    ) -> Result<SimulationResult, Error> {
        match (self, params) {
            (Self::HastadBroadcast(s), SimulationParameters::HastadBroadcast(p)) => s.execute(p, ctx),
            (Self::CbcPaddingOracle(s), SimulationParameters::CbcPaddingOracle(p)) => {
                s.execute(p, ctx)
            }
            _ => Err(Error::ParameterMismatch {
                simulator: self.id(),
            }),
        }
    }

    /// Validate and execute inline, without the scheduler
    pub fn run(&self, raw: &Value) -> Result<SimulationResult, RunError> {
        let params = self.validate(raw).map_err(RunError::InvalidParameters)?;
        let mut ctx = RunContext::detached();
        Ok(self.execute(&params, &mut ctx)?)
    }
}

/// Lookup table of simulators, built once at startup
#[derive(Clone, Debug)]
pub struct Registry {
    simulators: Vec<SimulatorKind>,
}

impl Registry {
    /// An empty registry
    pub fn empty() -> Self {
        Self {
            simulators: Vec::new(),
        }
    }

    /// Registry with the built-in simulators
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        registry.register(SimulatorKind::HastadBroadcast(HastadBroadcast::default()));
        registry.register(SimulatorKind::CbcPaddingOracle(
            CbcPaddingOracleSimulator::default(),
        ));
        registry
    }

    /// Add a simulator, replacing any existing one with the same id
    pub fn register(&mut self, simulator: SimulatorKind) {
        let id = simulator.id();
        self.simulators.retain(|s| s.id() != id);
        info!(simulator = id, "Registered simulator");
        self.simulators.push(simulator);
    }

    pub fn get(&self, id: &str) -> Option<&SimulatorKind> {
        self.simulators.iter().find(|s| s.id() == id)
    }

    pub fn list(&self) -> Vec<SimulatorInfo> {
        self.simulators.iter().map(|s| s.info()).collect()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::cell::RefCell;

    #[derive(Default)]
    struct Recorder {
        progress: RefCell<Vec<u8>>,
        steps: RefCell<Vec<String>>,
    }

    impl RunObserver for Recorder {
        fn progress(&self, percent: u8, _message: &str) {
            self.progress.borrow_mut().push(percent);
        }

        fn step(&self, step: &StepRecord) {
            self.steps.borrow_mut().push(step.label.clone());
        }
    }

    #[test]
    fn check_run_context() {
        let recorder = Recorder::default();
        let cancel = CancelToken::new();
        let mut ctx = RunContext::new(cancel.clone(), Some(&recorder));

        ctx.record("first", "first step", json!({ "n": 1 }));
        ctx.progress(150, "clamped");
        assert!(ctx.checkpoint().is_ok());

        cancel.cancel();
        assert!(matches!(ctx.checkpoint(), Err(Error::Cancelled)));

        assert_eq!(ctx.steps().len(), 1);
        assert_eq!(ctx.take_steps()[0].label, "first");
        assert!(ctx.steps().is_empty());
        assert_eq!(*recorder.progress.borrow(), vec![100]);
        assert_eq!(*recorder.steps.borrow(), vec!["first".to_string()]);
    }

    #[test]
    fn check_registry() {
        let registry = Registry::builtin();
        let ids: Vec<&str> = registry.list().iter().map(|i| i.id).collect();
        assert_eq!(ids, vec![hastad::ID, padding_oracle::ID]);

        assert!(registry.get("hastad-attack").is_some());
        assert!(registry.get("mitm-visualization").is_none());

        let mut registry = registry;
        registry.register(SimulatorKind::HastadBroadcast(HastadBroadcast::default()));
        assert_eq!(registry.list().len(), 2);
    }

    #[test]
    fn check_parameter_mismatch() {
        let registry = Registry::builtin();
        let hastad = registry.get(hastad::ID).unwrap();
        let oracle = registry.get(padding_oracle::ID).unwrap();

        let params = oracle.validate(&json!({ "message": "" })).unwrap();
        let res = hastad.execute(&params, &mut RunContext::detached());
        assert!(matches!(res, Err(Error::ParameterMismatch { simulator: "hastad-attack" })));
    }

    #[test]
    fn check_run_inline() {
        let registry = Registry::builtin();
        let oracle = registry.get(padding_oracle::ID).unwrap();

        let result = oracle.run(&json!({ "message": "inline" })).unwrap();
        assert_eq!(result.primary_output["recovered_message"], "inline");

        let err = oracle.run(&json!({ "key_size_bits": 100 })).unwrap_err();
        assert!(matches!(err, RunError::InvalidParameters(_)));
    }
}
