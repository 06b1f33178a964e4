use dap::types;
use std::collections::HashMap;
use std::time::Instant;
use tracing::{debug, warn};

use crate::engine::Engine;
use crate::telemetry::TelemetrySink;
use crate::visualization::VisualizationBridge;

/// Display type attached to every quantum state entry.
pub const QUANTUM_STATE_TYPE: &str = "Complex";

const CIRCUIT_PLACEHOLDER: &str = "See the circuit panel";

/// What a variables reference handed out by `scopes` points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    Locals,
    QuantumState,
    Circuit,
}

impl ScopeKind {
    const ALL: [ScopeKind; 3] = [ScopeKind::Locals, ScopeKind::QuantumState, ScopeKind::Circuit];

    pub fn name(&self) -> &'static str {
        match self {
            ScopeKind::Locals => "Locals",
            ScopeKind::QuantumState => "Quantum State",
            ScopeKind::Circuit => "Quantum Circuit",
        }
    }

    pub fn is_expensive(&self) -> bool {
        !matches!(self, ScopeKind::Locals)
    }
}

/// Materializes the three variable scopes from engine queries.
///
/// Handles are only valid until execution resumes. Nothing is cached between
/// requests; the circuit scope's only lasting effect is on the visualization.
#[derive(Debug)]
pub struct VariableInspector {
    handles: HashMap<i64, ScopeKind>,
    next_handle: i64,
    supports_variable_type: bool,
}

impl Default for VariableInspector {
    fn default() -> Self {
        Self {
            handles: HashMap::new(),
            next_handle: 1,
            supports_variable_type: false,
        }
    }
}

impl VariableInspector {
    pub fn set_supports_variable_type(&mut self, supported: bool) {
        self.supports_variable_type = supported;
    }

    /// Allocates a fresh handle per scope.
    pub fn scopes(&mut self) -> Vec<types::Scope> {
        ScopeKind::ALL
            .iter()
            .map(|kind| {
                let handle = self.next_handle;
                self.next_handle += 1;
                self.handles.insert(handle, *kind);

                types::Scope {
                    name: kind.name().to_string(),
                    variables_reference: handle,
                    expensive: kind.is_expensive(),
                    ..Default::default()
                }
            })
            .collect()
    }

    pub fn scope(&self, reference: i64) -> Option<ScopeKind> {
        self.handles.get(&reference).copied()
    }

    /// Invalidates every handle handed out so far. Handle numbers are never reused.
    pub fn reset(&mut self) {
        self.handles.clear();
    }

    pub fn variables(
        &mut self,
        reference: i64,
        engine: &mut dyn Engine,
        visualization: &mut VisualizationBridge,
        telemetry: &mut dyn TelemetrySink,
    ) -> Vec<types::Variable> {
        let Some(kind) = self.scope(reference) else {
            debug!(reference, "Unknown or stale variables reference");
            return Vec::new();
        };

        match kind {
            ScopeKind::Locals => self.locals(engine),
            ScopeKind::QuantumState => quantum_state(engine, telemetry),
            ScopeKind::Circuit => {
                visualization.enable();
                visualization.update(engine, None);
                vec![variable(
                    kind.name().to_string(),
                    CIRCUIT_PLACEHOLDER.to_string(),
                    None,
                )]
            }
        }
    }

    fn locals(&self, engine: &mut dyn Engine) -> Vec<types::Variable> {
        match engine.local_variables() {
            Ok(locals) => locals
                .into_iter()
                .map(|local| {
                    let type_name = self.supports_variable_type.then_some(local.type_name);
                    variable(local.name, local.value, type_name)
                })
                .collect(),
            Err(e) => {
                warn!(error = %e, "Failed to get local variables");
                Vec::new()
            }
        }
    }
}

fn quantum_state(engine: &mut dyn Engine, telemetry: &mut dyn TelemetrySink) -> Vec<types::Variable> {
    let start = Instant::now();
    let state = match engine.capture_quantum_state() {
        Ok(state) => state,
        Err(e) => {
            warn!(error = %e, "Failed to capture quantum state");
            return Vec::new();
        }
    };
    let elapsed = start.elapsed();

    debug!(entries = state.len(), elapsed_ms = elapsed.as_millis() as u64, "Captured quantum state");
    telemetry.send(
        "quantumStateCaptured",
        serde_json::json!({
            "entries": state.len(),
            "elapsedMs": elapsed.as_millis() as u64,
        }),
    );

    state
        .into_iter()
        .map(|entry| variable(entry.name, entry.value, Some(QUANTUM_STATE_TYPE.to_string())))
        .collect()
}

fn variable(name: String, value: String, type_field: Option<String>) -> types::Variable {
    types::Variable {
        name,
        value,
        type_field,
        variables_reference: 0,
        ..Default::default()
    }
}
