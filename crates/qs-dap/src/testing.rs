//! Scripted engine and recording sinks shared by unit tests.

use dap::events::Event;
use dap::responses::Response;
use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::io;
use std::rc::Rc;
use url::Url;

use crate::config::RunConfiguration;
use crate::engine::{
    Engine, EngineBreakpoint, EngineFrame, EngineVariable, OutputSink, QuantumStateEntry,
    StepAction, StepResult,
};
use crate::error::EngineError;
use crate::protocol::DapClient;
use crate::telemetry::TelemetrySink;
use crate::visualization::{PanelSink, PanelUpdate};

type DynResult<T> = miette::Result<T, Box<dyn std::error::Error>>;

#[derive(Debug, Clone)]
pub enum TraceEntry {
    Response(serde_json::Value),
    Event(serde_json::Value),
    Panel(PanelUpdate),
}

/// Everything the client and the panel observed, in order.
#[derive(Debug, Clone, Default)]
pub struct Trace(Rc<RefCell<Vec<TraceEntry>>>);

impl Trace {
    fn push(&self, entry: TraceEntry) {
        self.0.borrow_mut().push(entry);
    }

    pub fn entries(&self) -> Vec<TraceEntry> {
        self.0.borrow().clone()
    }

    /// `"panel"`, `"response:<command>"` or the event name, per entry.
    pub fn labels(&self) -> Vec<String> {
        self.entries()
            .iter()
            .map(|entry| match entry {
                TraceEntry::Panel(_) => "panel".to_string(),
                TraceEntry::Response(response) => format!(
                    "response:{}",
                    response["command"].as_str().unwrap_or_default()
                ),
                TraceEntry::Event(event) => event["event"].as_str().unwrap_or_default().to_string(),
            })
            .collect()
    }

    pub fn events(&self) -> Vec<serde_json::Value> {
        self.entries()
            .into_iter()
            .filter_map(|entry| match entry {
                TraceEntry::Event(event) => Some(event),
                _ => None,
            })
            .collect()
    }

    pub fn events_named(&self, name: &str) -> Vec<serde_json::Value> {
        self.events()
            .into_iter()
            .filter(|event| event["event"] == name)
            .collect()
    }

    pub fn responses(&self) -> Vec<serde_json::Value> {
        self.entries()
            .into_iter()
            .filter_map(|entry| match entry {
                TraceEntry::Response(response) => Some(response),
                _ => None,
            })
            .collect()
    }

    pub fn outputs(&self) -> Vec<String> {
        self.events_named("output")
            .iter()
            .filter_map(|event| event["body"]["output"].as_str().map(str::to_string))
            .collect()
    }

    pub fn exit_codes(&self) -> Vec<i64> {
        self.events_named("exited")
            .iter()
            .filter_map(|event| event["body"]["exitCode"].as_i64())
            .collect()
    }

    pub fn panel_updates(&self) -> Vec<PanelUpdate> {
        self.entries()
            .into_iter()
            .filter_map(|entry| match entry {
                TraceEntry::Panel(update) => Some(update),
                _ => None,
            })
            .collect()
    }
}

#[derive(Debug)]
pub struct RecordingClient {
    trace: Trace,
}

impl RecordingClient {
    pub fn new(trace: &Trace) -> Self {
        Self {
            trace: trace.clone(),
        }
    }
}

impl DapClient for RecordingClient {
    fn respond(&mut self, response: Response) -> DynResult<()> {
        self.trace.push(TraceEntry::Response(serde_json::to_value(&response)?));
        Ok(())
    }

    fn send(&mut self, event: Event) -> DynResult<()> {
        self.trace.push(TraceEntry::Event(serde_json::to_value(&event)?));
        Ok(())
    }
}

#[derive(Debug)]
pub struct RecordingPanel {
    trace: Trace,
    open: bool,
}

impl RecordingPanel {
    pub fn new(trace: &Trace) -> Self {
        Self {
            trace: trace.clone(),
            open: false,
        }
    }

    pub fn opened(self) -> Self {
        Self { open: true, ..self }
    }
}

impl PanelSink for RecordingPanel {
    fn update_panel(&mut self, update: PanelUpdate) -> io::Result<()> {
        self.trace.push(TraceEntry::Panel(update));
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open
    }
}

#[derive(Debug, Clone, Default)]
pub struct RecordingTelemetry(Rc<RefCell<Vec<(String, serde_json::Value)>>>);

impl RecordingTelemetry {
    pub fn names(&self) -> Vec<String> {
        self.0.borrow().iter().map(|(name, _)| name.clone()).collect()
    }
}

impl TelemetrySink for RecordingTelemetry {
    fn send(&mut self, event: &str, properties: serde_json::Value) {
        self.0.borrow_mut().push((event.to_string(), properties));
    }
}

#[derive(Debug, Default)]
struct Script {
    sources: Vec<Url>,
    load_results: VecDeque<Result<(), String>>,
    breakpoints: HashMap<Url, Vec<EngineBreakpoint>>,
    steps: VecDeque<Result<StepResult, EngineError>>,
    step_output: Vec<String>,
    frames: Vec<EngineFrame>,
    locals: Vec<EngineVariable>,
    quantum_state: Vec<QuantumStateEntry>,
    circuit: serde_json::Value,
    loads: usize,
    breakpoint_queries: usize,
    evals: Vec<(StepAction, Vec<i64>)>,
    terminated: bool,
}

/// An in-memory engine whose answers are set up by the test.
///
/// Clones share the same script, so a test can keep a handle after boxing one
/// into the adapter. Loads succeed and steps complete unless scripted otherwise.
#[derive(Debug, Clone, Default)]
pub struct ScriptedEngine(Rc<RefCell<Script>>);

impl ScriptedEngine {
    pub fn with_sources(self, sources: Vec<Url>) -> Self {
        self.0.borrow_mut().sources = sources;
        self
    }

    pub fn with_breakpoints(self, source: Url, breakpoints: Vec<EngineBreakpoint>) -> Self {
        self.0.borrow_mut().breakpoints.insert(source, breakpoints);
        self
    }

    pub fn with_load_results(self, results: Vec<Result<(), String>>) -> Self {
        self.0.borrow_mut().load_results = results.into();
        self
    }

    pub fn with_steps(self, steps: Vec<Result<StepResult, EngineError>>) -> Self {
        self.0.borrow_mut().steps = steps.into();
        self
    }

    pub fn with_step_output(self, output: Vec<&str>) -> Self {
        self.0.borrow_mut().step_output = output.into_iter().map(str::to_string).collect();
        self
    }

    pub fn with_frames(self, frames: Vec<EngineFrame>) -> Self {
        self.0.borrow_mut().frames = frames;
        self
    }

    pub fn with_locals(self, locals: Vec<EngineVariable>) -> Self {
        self.0.borrow_mut().locals = locals;
        self
    }

    pub fn with_quantum_state(self, state: Vec<QuantumStateEntry>) -> Self {
        self.0.borrow_mut().quantum_state = state;
        self
    }

    pub fn with_circuit(self, circuit: serde_json::Value) -> Self {
        self.0.borrow_mut().circuit = circuit;
        self
    }

    pub fn loads(&self) -> usize {
        self.0.borrow().loads
    }

    pub fn breakpoint_queries(&self) -> usize {
        self.0.borrow().breakpoint_queries
    }

    pub fn evals(&self) -> Vec<(StepAction, Vec<i64>)> {
        self.0.borrow().evals.clone()
    }

    pub fn terminated(&self) -> bool {
        self.0.borrow().terminated
    }
}

impl Engine for ScriptedEngine {
    fn load_program(&mut self, _config: &RunConfiguration) -> Result<Vec<Url>, EngineError> {
        let mut script = self.0.borrow_mut();
        script.loads += 1;
        match script.load_results.pop_front() {
            Some(Err(message)) => Err(EngineError::LoadFailed(message)),
            _ => Ok(script.sources.clone()),
        }
    }

    fn breakpoints(&mut self, source: &Url) -> Result<Vec<EngineBreakpoint>, EngineError> {
        let mut script = self.0.borrow_mut();
        script.breakpoint_queries += 1;
        Ok(script.breakpoints.get(source).cloned().unwrap_or_default())
    }

    fn eval(
        &mut self,
        action: StepAction,
        breakpoints: &[i64],
        output: &mut dyn OutputSink,
    ) -> Result<StepResult, EngineError> {
        let (lines, result) = {
            let mut script = self.0.borrow_mut();
            script.evals.push((action, breakpoints.to_vec()));
            let result = script.steps.pop_front().unwrap_or(Ok(StepResult::Completed));
            (script.step_output.clone(), result)
        };
        for line in &lines {
            output.output(line);
        }
        result
    }

    fn stack_frames(&mut self) -> Result<Vec<EngineFrame>, EngineError> {
        Ok(self.0.borrow().frames.clone())
    }

    fn local_variables(&mut self) -> Result<Vec<EngineVariable>, EngineError> {
        Ok(self.0.borrow().locals.clone())
    }

    fn capture_quantum_state(&mut self) -> Result<Vec<QuantumStateEntry>, EngineError> {
        Ok(self.0.borrow().quantum_state.clone())
    }

    fn circuit(&mut self) -> Result<serde_json::Value, EngineError> {
        Ok(self.0.borrow().circuit.clone())
    }

    fn terminate(&mut self) {
        self.0.borrow_mut().terminated = true;
    }
}
