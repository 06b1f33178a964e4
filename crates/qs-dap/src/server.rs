use crossbeam_channel::{Receiver, select};
use dap::prelude::*;
use dap::types::OutputEventCategory;
use std::io::{self, BufReader, BufWriter};
use std::thread;
use std::time::Instant;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use crate::adapter::QsAdapter;
use crate::config::Config;
use crate::engine::ProcessEngine;
use crate::error::QsAdapterError;
use crate::log::DebugConsoleWriter;
use crate::protocol::{DapClient, output_event};
use crate::telemetry::TracingTelemetry;
use crate::visualization::{JsonLinesPanel, NullPanel, PanelSink};

type DynResult<T> = miette::Result<T, Box<dyn std::error::Error + Send + Sync>>;

enum Incoming {
    Request(Request),
    Closed,
    Log(String),
    LogsClosed,
    LaunchDeadline,
}

/// Serves one debugging session over stdin/stdout with a process-backed engine.
pub fn start(config: Config) -> DynResult<()> {
    let (debug_writer, log_rx) = DebugConsoleWriter::new();

    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("qs_dap=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_writer(debug_writer)
        .init();

    info!("Starting qs-dap debug adapter");

    let command = config
        .engine_command
        .as_deref()
        .ok_or_else(|| QsAdapterError::ProtocolError("No execution engine configured".to_string()))?;
    let engine = ProcessEngine::spawn(command, &config.engine_args)?;

    let panel: Box<dyn PanelSink> = match &config.panel_output {
        Some(path) => Box::new(JsonLinesPanel::create(path)?),
        None => Box::new(NullPanel),
    };

    let adapter = QsAdapter::new(Box::new(engine), panel, Box::new(TracingTelemetry), &config);
    run(adapter, io::stdin(), io::stdout(), log_rx)
}

/// Runs the session until the client disconnects or the input ends.
///
/// Requests are read on a separate thread; handling, log forwarding and the
/// launch deadline all run on the calling thread, one at a time.
pub fn run<R, W>(mut adapter: QsAdapter, input: R, output: W, log_rx: Receiver<String>) -> DynResult<()>
where
    R: io::Read + Send + 'static,
    W: io::Write,
{
    let (request_tx, request_rx) = crossbeam_channel::unbounded::<Request>();
    thread::Builder::new()
        .name("qs-dap-reader".to_string())
        .spawn(move || {
            let mut reader = Server::new(BufReader::new(input), BufWriter::new(io::sink()));
            loop {
                match reader.poll_request() {
                    Ok(Some(req)) => {
                        if request_tx.send(req).is_err() {
                            break;
                        }
                    }
                    Ok(None) => {
                        info!("Client disconnected or stream ended");
                        break;
                    }
                    Err(e) => {
                        error!(error = %e, "Failed to read DAP request");
                        break;
                    }
                }
            }
        })?;

    let mut server = Server::new(BufReader::new(io::empty()), BufWriter::new(output));
    let mut logs_open = true;

    loop {
        let logs = if logs_open {
            log_rx.clone()
        } else {
            crossbeam_channel::never()
        };
        let deadline = adapter
            .launch_deadline()
            .map(crossbeam_channel::at)
            .unwrap_or_else(crossbeam_channel::never);

        let incoming = select! {
            recv(request_rx) -> req => req.map_or(Incoming::Closed, Incoming::Request),
            recv(logs) -> line => line.map_or(Incoming::LogsClosed, Incoming::Log),
            recv(deadline) -> _ => Incoming::LaunchDeadline,
        };

        match incoming {
            Incoming::Request(req) => {
                if let Err(e) = adapter.handle_request(req, &mut server) {
                    if let Some(QsAdapterError::Shutdown) = e.downcast_ref::<QsAdapterError>() {
                        info!("Debug session shut down");
                        break;
                    }
                    error!(error = %e, "Failed to handle DAP request");
                }
            }
            Incoming::Closed => {
                debug!("Request stream closed");
                break;
            }
            Incoming::Log(line) => {
                if adapter.trace_enabled()
                    && let Err(e) =
                        DapClient::send(&mut server, output_event(line, OutputEventCategory::Console))
                {
                    eprintln!("Failed to send log output: {}", e);
                }
            }
            Incoming::LogsClosed => logs_open = false,
            Incoming::LaunchDeadline => {
                if let Err(e) = adapter.resume_launch(Instant::now(), &mut server) {
                    error!(error = %e, "Failed to resume launch");
                }
            }
        }
    }

    Ok(())
}
