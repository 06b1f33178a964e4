use serde::Serialize;
use std::fs::File;
use std::io::{self, Write};
use std::path::Path;
use tracing::{debug, warn};

use crate::engine::Engine;
use crate::error::EngineError;

/// Circuit state shown in the panel.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CircuitState {
    pub circuit: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_annotation: Option<String>,
    pub simulated: bool,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PanelUpdate {
    pub profile_id: String,
    pub program_id: String,
    pub reveal: bool,
    pub state: CircuitState,
}

/// The external panel that renders circuit state.
pub trait PanelSink {
    fn update_panel(&mut self, update: PanelUpdate) -> io::Result<()>;

    /// Whether the panel is already showing, independently of this session's settings.
    fn is_open(&self) -> bool;
}

/// Discards updates. Used when no panel is attached.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullPanel;

impl PanelSink for NullPanel {
    fn update_panel(&mut self, _update: PanelUpdate) -> io::Result<()> {
        Ok(())
    }

    fn is_open(&self) -> bool {
        false
    }
}

/// Appends every update as one JSON line.
#[derive(Debug)]
pub struct JsonLinesPanel<W: Write> {
    writer: W,
    written: bool,
}

impl JsonLinesPanel<File> {
    pub fn create(path: &Path) -> io::Result<Self> {
        Ok(Self::new(File::create(path)?))
    }
}

impl<W: Write> JsonLinesPanel<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            written: false,
        }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> PanelSink for JsonLinesPanel<W> {
    fn update_panel(&mut self, update: PanelUpdate) -> io::Result<()> {
        serde_json::to_writer(&mut self.writer, &update)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        self.written = true;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.written
    }
}

/// Keeps the panel in sync with engine state after every step or shot.
pub struct VisualizationBridge {
    panel: Box<dyn PanelSink>,
    enabled: bool,
    revealed: bool,
    profile_id: String,
    program_id: String,
}

impl std::fmt::Debug for VisualizationBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VisualizationBridge")
            .field("enabled", &self.enabled)
            .field("revealed", &self.revealed)
            .field("profile_id", &self.profile_id)
            .field("program_id", &self.program_id)
            .finish()
    }
}

impl VisualizationBridge {
    pub fn new(panel: Box<dyn PanelSink>, profile_id: impl Into<String>) -> Self {
        Self {
            panel,
            enabled: false,
            revealed: false,
            profile_id: profile_id.into(),
            program_id: String::new(),
        }
    }

    pub fn set_program(&mut self, program_id: impl Into<String>) {
        self.program_id = program_id.into();
    }

    /// Turns visualization on for the rest of the session.
    pub fn enable(&mut self) {
        self.enabled = true;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn update(&mut self, engine: &mut dyn Engine, error: Option<&EngineError>) {
        if !self.enabled && !self.panel.is_open() {
            return;
        }

        let circuit = match engine.circuit() {
            Ok(circuit) => circuit,
            Err(e) => {
                warn!(error = %e, "Failed to get circuit state");
                serde_json::Value::Null
            }
        };

        // Reveal at most once per session.
        let reveal = !self.revealed;
        let update = PanelUpdate {
            profile_id: self.profile_id.clone(),
            program_id: self.program_id.clone(),
            reveal,
            state: CircuitState {
                circuit,
                error_annotation: error.map(EngineError::render),
                simulated: true,
            },
        };

        debug!(reveal, has_error = error.is_some(), "Updating circuit panel");
        match self.panel.update_panel(update) {
            Ok(()) => self.revealed = true,
            Err(e) => warn!(error = %e, "Failed to update circuit panel"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{RecordingPanel, ScriptedEngine, Trace};
    use serde_json::json;

    #[test]
    fn test_update_is_noop_when_disabled_and_closed() {
        let trace = Trace::default();
        let mut engine = ScriptedEngine::default();
        let mut bridge = VisualizationBridge::new(Box::new(RecordingPanel::new(&trace)), "unrestricted");

        bridge.update(&mut engine, None);
        assert!(trace.panel_updates().is_empty());
    }

    #[test]
    fn test_reveals_only_once() {
        let trace = Trace::default();
        let mut engine = ScriptedEngine::default().with_circuit(json!({"qubits": [{"id": 0}]}));
        let mut bridge = VisualizationBridge::new(Box::new(RecordingPanel::new(&trace)), "unrestricted");
        bridge.set_program("file:///work/main.qs");
        bridge.enable();

        bridge.update(&mut engine, None);
        bridge.update(&mut engine, None);
        bridge.update(&mut engine, None);

        let reveals: Vec<bool> = trace.panel_updates().iter().map(|u| u.reveal).collect();
        assert_eq!(reveals, vec![true, false, false]);

        let first = &trace.panel_updates()[0];
        assert_eq!(first.profile_id, "unrestricted");
        assert_eq!(first.program_id, "file:///work/main.qs");
        assert!(first.state.simulated);
        assert_eq!(first.state.circuit, json!({"qubits": [{"id": 0}]}));
    }

    #[test]
    fn test_updates_when_panel_already_open() {
        let trace = Trace::default();
        let mut engine = ScriptedEngine::default();
        let panel = RecordingPanel::new(&trace).opened();
        let mut bridge = VisualizationBridge::new(Box::new(panel), "unrestricted");

        bridge.update(&mut engine, None);
        assert_eq!(trace.panel_updates().len(), 1);
        assert!(!bridge.is_enabled());
    }

    #[test]
    fn test_error_is_rendered_into_annotation() {
        let trace = Trace::default();
        let mut engine = ScriptedEngine::default();
        let mut bridge = VisualizationBridge::new(Box::new(RecordingPanel::new(&trace)), "unrestricted");
        bridge.enable();

        let error = EngineError::runtime("Qubit1 released while not in |0⟩ state");
        bridge.update(&mut engine, Some(&error));

        let annotation = trace.panel_updates()[0].state.error_annotation.clone().unwrap();
        assert!(annotation.contains("Qubit1 released while not in |0⟩ state"));
    }

    #[test]
    fn test_json_lines_panel_writes_one_line_per_update() {
        let mut panel = JsonLinesPanel::new(Vec::new());
        assert!(!panel.is_open());

        let update = PanelUpdate {
            profile_id: "unrestricted".to_string(),
            program_id: "main".to_string(),
            reveal: true,
            state: CircuitState {
                circuit: json!({}),
                error_annotation: None,
                simulated: true,
            },
        };
        panel.update_panel(update.clone()).unwrap();
        panel.update_panel(PanelUpdate { reveal: false, ..update }).unwrap();
        assert!(panel.is_open());

        let written = String::from_utf8(panel.into_inner()).unwrap();
        let lines: Vec<serde_json::Value> = written
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["reveal"], json!(true));
        assert_eq!(lines[0]["state"]["simulated"], json!(true));
        assert!(lines[0]["state"].get("errorAnnotation").is_none());
        assert_eq!(lines[1]["reveal"], json!(false));
    }

    #[test]
    fn test_json_lines_panel_create_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("panel.jsonl");
        let mut panel = JsonLinesPanel::create(&path).unwrap();

        panel
            .update_panel(PanelUpdate {
                profile_id: "unrestricted".to_string(),
                program_id: "main".to_string(),
                reveal: true,
                state: CircuitState {
                    circuit: json!({"operations": []}),
                    error_annotation: Some("boom".to_string()),
                    simulated: true,
                },
            })
            .unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("\"errorAnnotation\":\"boom\""));
    }
}
