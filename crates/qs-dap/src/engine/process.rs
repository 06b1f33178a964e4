use crossbeam_channel::Receiver;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::thread;
use tracing::{debug, error, info, warn};
use url::Url;

use super::{
    Engine, EngineBreakpoint, EngineFrame, EngineVariable, OutputSink, QuantumStateEntry,
    StepAction, StepResult,
};
use crate::config::RunConfiguration;
use crate::error::EngineError;

#[derive(Serialize, Debug)]
struct EngineRequest<'a> {
    id: u64,
    method: &'a str,
    params: serde_json::Value,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
struct RemoteError {
    message: String,
    #[serde(default)]
    stack_trace: Option<String>,
}

/// Lines read from the engine's stdout.
#[derive(Deserialize, Debug, Clone)]
#[serde(untagged)]
enum EngineMessage {
    Reply {
        id: u64,
        #[serde(default)]
        result: serde_json::Value,
        #[serde(default)]
        error: Option<RemoteError>,
    },
    Notification {
        method: String,
        #[serde(default)]
        params: serde_json::Value,
    },
}

/// An engine running as a child process, spoken to with newline-delimited JSON.
pub struct ProcessEngine {
    child: Child,
    stdin: ChildStdin,
    messages: Receiver<EngineMessage>,
    next_id: u64,
}

impl std::fmt::Debug for ProcessEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessEngine")
            .field("pid", &self.child.id())
            .field("next_id", &self.next_id)
            .finish()
    }
}

impl ProcessEngine {
    pub fn spawn(program: &str, args: &[String]) -> Result<Self, EngineError> {
        debug!(program = %program, ?args, "Spawning execution engine");

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| EngineError::Protocol("engine stdin is not piped".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| EngineError::Protocol("engine stdout is not piped".to_string()))?;

        let (tx, rx) = crossbeam_channel::unbounded();
        thread::spawn(move || {
            for line in BufReader::new(stdout).lines() {
                let line = match line {
                    Ok(line) => line,
                    Err(e) => {
                        error!(error = %e, "Failed to read from execution engine");
                        break;
                    }
                };
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<EngineMessage>(&line) {
                    Ok(message) => {
                        if tx.send(message).is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!(error = %e, line = %line, "Ignoring malformed engine message"),
                }
            }
            debug!("Execution engine output closed");
        });

        Ok(Self {
            child,
            stdin,
            messages: rx,
            next_id: 1,
        })
    }

    fn send(&mut self, method: &str, params: serde_json::Value) -> Result<u64, EngineError> {
        let id = self.next_id;
        self.next_id += 1;

        let request = serde_json::to_string(&EngineRequest { id, method, params })
            .map_err(|e| EngineError::Protocol(e.to_string()))?;
        writeln!(self.stdin, "{}", request)?;
        self.stdin.flush()?;
        Ok(id)
    }

    fn call<T: DeserializeOwned>(
        &mut self,
        method: &str,
        params: serde_json::Value,
        mut output: Option<&mut dyn OutputSink>,
    ) -> Result<T, EngineError> {
        let request_id = self.send(method, params)?;

        loop {
            match self.messages.recv() {
                Ok(EngineMessage::Reply { id, result, error }) if id == request_id => {
                    if let Some(error) = error {
                        return Err(EngineError::Runtime {
                            message: error.message,
                            stack_trace: error.stack_trace,
                        });
                    }
                    return serde_json::from_value(result).map_err(|e| {
                        EngineError::Protocol(format!("unexpected result for {}: {}", method, e))
                    });
                }
                Ok(EngineMessage::Reply { id, .. }) => {
                    debug!(id, expected = request_id, "Discarding stale engine reply");
                }
                Ok(EngineMessage::Notification { method, params }) if method == "output" => {
                    let text = params.get("text").and_then(|t| t.as_str()).unwrap_or_default();
                    match output.as_deref_mut() {
                        Some(sink) => sink.output(text),
                        None => info!(output = %text, "Engine output"),
                    }
                }
                Ok(EngineMessage::Notification { method, .. }) => {
                    debug!(method = %method, "Ignoring engine notification");
                }
                Err(_) => return Err(EngineError::Exited),
            }
        }
    }
}

impl Engine for ProcessEngine {
    fn load_program(&mut self, config: &RunConfiguration) -> Result<Vec<Url>, EngineError> {
        let params =
            serde_json::to_value(config).map_err(|e| EngineError::Protocol(e.to_string()))?;
        let sources: Vec<String> =
            self.call("loadProgram", params, None)
                .map_err(|e| match e {
                    EngineError::Runtime { message, .. } => EngineError::LoadFailed(message),
                    e => e,
                })?;

        sources
            .iter()
            .map(|source| {
                Url::parse(source).map_err(|e| {
                    EngineError::Protocol(format!("invalid source identifier '{}': {}", source, e))
                })
            })
            .collect()
    }

    fn breakpoints(&mut self, source: &Url) -> Result<Vec<EngineBreakpoint>, EngineError> {
        self.call("getBreakpoints", json!({ "source": source.as_str() }), None)
    }

    fn eval(
        &mut self,
        action: StepAction,
        breakpoints: &[i64],
        output: &mut dyn OutputSink,
    ) -> Result<StepResult, EngineError> {
        self.call(
            "eval",
            json!({ "action": action, "breakpoints": breakpoints }),
            Some(output),
        )
    }

    fn stack_frames(&mut self) -> Result<Vec<EngineFrame>, EngineError> {
        self.call("getStackFrames", serde_json::Value::Null, None)
    }

    fn local_variables(&mut self) -> Result<Vec<EngineVariable>, EngineError> {
        self.call("getLocalVariables", serde_json::Value::Null, None)
    }

    fn capture_quantum_state(&mut self) -> Result<Vec<QuantumStateEntry>, EngineError> {
        self.call("captureQuantumState", serde_json::Value::Null, None)
    }

    fn circuit(&mut self) -> Result<serde_json::Value, EngineError> {
        self.call("getCircuit", serde_json::Value::Null, None)
    }

    fn terminate(&mut self) {
        if let Err(e) = self.send("terminate", serde_json::Value::Null) {
            warn!(error = %e, "Failed to send terminate to execution engine");
        }
    }
}

impl Drop for ProcessEngine {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}
