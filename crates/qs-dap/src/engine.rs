//! Contract of the external program-execution engine.
//!
//! The adapter never runs a program itself. It loads the program into an
//! [`Engine`], asks it where execution may stop, drives it one continuation at
//! a time and queries stack, variable and circuit state between steps.

pub mod process;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::RunConfiguration;
use crate::error::EngineError;
use crate::range::Range;

pub use process::ProcessEngine;

/// How far a single engine continuation should run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StepAction {
    Continue,
    Next,
    StepIn,
    StepOut,
}

/// Where a continuation that did not fault came to rest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum StepResult {
    /// Stopped on the armed breakpoint with this engine id.
    BreakpointHit { id: i64 },
    /// The program ran to its normal end.
    Completed,
    /// An ordinary step finished without reaching a breakpoint.
    Progressed,
}

/// An engine-reported location where execution can legally stop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineBreakpoint {
    pub id: i64,
    pub range: Range,
}

/// One call frame. Engines report frames innermost-last.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineFrame {
    pub name: String,
    pub source: String,
    pub range: Range,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineVariable {
    pub name: String,
    pub value: String,
    pub type_name: String,
}

/// One basis state of the captured quantum state and its amplitude.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuantumStateEntry {
    pub name: String,
    pub value: String,
}

/// Receives program output emitted while a continuation is in flight.
pub trait OutputSink {
    fn output(&mut self, text: &str);
}

impl<F: FnMut(&str)> OutputSink for F {
    fn output(&mut self, text: &str) {
        self(text)
    }
}

pub trait Engine {
    /// Loads (or reloads) the program and returns the identifiers of every
    /// source it was built from.
    fn load_program(&mut self, config: &RunConfiguration) -> Result<Vec<Url>, EngineError>;

    fn breakpoints(&mut self, source: &Url) -> Result<Vec<EngineBreakpoint>, EngineError>;

    fn eval(
        &mut self,
        action: StepAction,
        breakpoints: &[i64],
        output: &mut dyn OutputSink,
    ) -> Result<StepResult, EngineError>;

    fn stack_frames(&mut self) -> Result<Vec<EngineFrame>, EngineError>;

    fn local_variables(&mut self) -> Result<Vec<EngineVariable>, EngineError>;

    /// Full state decomposition. Potentially expensive.
    fn capture_quantum_state(&mut self) -> Result<Vec<QuantumStateEntry>, EngineError>;

    fn circuit(&mut self) -> Result<serde_json::Value, EngineError>;

    /// Asks the engine to stop whatever it is running. Does not wait.
    fn terminate(&mut self);
}
