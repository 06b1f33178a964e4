use dap::prelude::*;
use dap::responses::{
    BreakpointLocationsResponse, ContinueResponse, ScopesResponse, SetBreakpointsResponse,
    SetExceptionBreakpointsResponse, SetFunctionBreakpointsResponse, StackTraceResponse,
    ThreadsResponse, VariablesResponse,
};
use dap::types::OutputEventCategory;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::breakpoints::{BreakpointResolver, BreakpointSet, RequestedBreakpoint};
use crate::config::{Config, LaunchArgs, RunConfiguration};
use crate::engine::{Engine, StepAction};
use crate::error::{EngineError, QsAdapterError};
use crate::protocol::{
    DapClient, SessionState, StepOutcome, THREAD_ID, breakpoint_event, exited_event, output_event,
    terminated_event,
};
use crate::range::ClientCoordinates;
use crate::shots::{self, ShotsOutcome};
use crate::source::SourceRegistry;
use crate::stepping;
use crate::telemetry::TelemetrySink;
use crate::variables::VariableInspector;
use crate::visualization::{PanelSink, VisualizationBridge};

type DynResult<T> = miette::Result<T, Box<dyn std::error::Error>>;

/// Name of the synthetic outermost stack frame.
const ENTRY_FRAME: &str = "entry";

/// The loaded program and everything derived from loading it.
#[derive(Debug, Default)]
struct Program {
    config: RunConfiguration,
    sources: SourceRegistry,
    resolver: BreakpointResolver,
    breakpoints: BreakpointSet,
    loaded: bool,
}

impl Program {
    /// Loads (or reloads) the program, then arms any breakpoints that were
    /// requested before its sources were known. Returns the breakpoints armed
    /// that way, which the client has not been told about yet.
    fn load(&mut self, engine: &mut dyn Engine) -> Result<Vec<types::Breakpoint>, EngineError> {
        self.resolver.clear();
        let sources = match engine.load_program(&self.config) {
            Ok(sources) => sources,
            Err(e) => {
                self.loaded = false;
                return Err(e);
            }
        };

        self.sources.clear();
        for source in &sources {
            self.sources.register(source);
        }
        self.loaded = true;
        debug!(program = %self.config.program, sources = sources.len(), "Program loaded");

        let mut armed = Vec::new();
        for (path, requested) in self.breakpoints.take_deferred() {
            match self.sources.resolve(&path) {
                Some(uri) => {
                    let resolved = self.resolver.resolve(engine, &uri, &requested);
                    debug!(source = %uri, armed = resolved.len(), "Armed deferred breakpoints");
                    let source = self.sources.client_source(&uri);
                    armed.extend(resolved.iter().map(|candidate| candidate.to_breakpoint(&source)));
                    self.breakpoints.replace(uri, resolved);
                }
                None => warn!(path = %path, "Dropping breakpoints for unknown source"),
            }
        }

        Ok(armed)
    }
}

/// A launch waiting for `configurationDone` or its deadline, whichever comes first.
#[derive(Debug)]
struct PendingLaunch {
    request: Request,
    deadline: Instant,
}

/// Session controller for one debugging client.
pub struct QsAdapter {
    engine: Box<dyn Engine>,
    program: Program,
    visualization: VisualizationBridge,
    variables: VariableInspector,
    telemetry: Box<dyn TelemetrySink>,
    state: SessionState,
    coords: ClientCoordinates,
    configured: bool,
    pending_launch: Option<PendingLaunch>,
    configuration_timeout: Duration,
}

impl std::fmt::Debug for QsAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QsAdapter")
            .field("program", &self.program)
            .field("state", &self.state)
            .field("configured", &self.configured)
            .field("pending_launch", &self.pending_launch)
            .finish()
    }
}

impl QsAdapter {
    pub fn new(
        engine: Box<dyn Engine>,
        panel: Box<dyn PanelSink>,
        telemetry: Box<dyn TelemetrySink>,
        config: &Config,
    ) -> Self {
        Self {
            engine,
            program: Program::default(),
            visualization: VisualizationBridge::new(panel, config.profile.clone()),
            variables: VariableInspector::default(),
            telemetry,
            state: SessionState::default(),
            coords: ClientCoordinates::default(),
            configured: false,
            pending_launch: None,
            configuration_timeout: config.configuration_timeout,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Whether adapter log lines should be mirrored to the client's console.
    pub fn trace_enabled(&self) -> bool {
        self.program.config.trace_verbose && !self.state.is_terminated()
    }

    /// When a pending launch stops waiting for `configurationDone`.
    pub fn launch_deadline(&self) -> Option<Instant> {
        self.pending_launch.as_ref().map(|pending| pending.deadline)
    }

    /// Proceeds with a pending launch if configuration is done or its deadline
    /// has passed. Resolving an already resolved launch does nothing.
    pub fn resume_launch(&mut self, now: Instant, client: &mut dyn DapClient) -> DynResult<()> {
        let Some(pending) = self.take_ready_launch(now) else {
            return Ok(());
        };

        if !self.configured {
            info!("No configurationDone before the deadline, launching anyway");
        }

        client.respond(pending.request.success(ResponseBody::Launch))?;
        self.state.advance(SessionState::Running);

        if self.program.config.no_debug {
            self.run_shots(client)
        } else if self.program.config.stop_on_entry {
            self.step(StepAction::Next, client)
        } else {
            self.step(StepAction::Continue, client)
        }
    }

    fn take_ready_launch(&mut self, now: Instant) -> Option<PendingLaunch> {
        match &self.pending_launch {
            Some(pending) if self.configured || now >= pending.deadline => self.pending_launch.take(),
            _ => None,
        }
    }

    /// Sends the closing output, `terminated` and `exited` events. Only the first call has any effect.
    fn end_session(&mut self, message: &str, exit_code: i64, client: &mut dyn DapClient) -> DynResult<()> {
        if !self.state.advance(SessionState::Terminated) {
            return Ok(());
        }

        info!(exit_code, message, "Ending debug session");
        self.pending_launch = None;
        self.variables.reset();
        self.telemetry
            .send("debugSessionEnd", serde_json::json!({ "exitCode": exit_code }));

        client.send(output_event(format!("{message}\n"), OutputEventCategory::Console))?;
        client.send(terminated_event())?;
        client.send(exited_event(exit_code))?;
        Ok(())
    }

    fn step(&mut self, action: StepAction, client: &mut dyn DapClient) -> DynResult<()> {
        if self.state != SessionState::Running {
            warn!(?action, state = ?self.state, "Ignoring step outside of a running session");
            return Ok(());
        }

        self.variables.reset();
        let armed = self.program.breakpoints.armed_ids();
        let outcome = stepping::run_step(
            self.engine.as_mut(),
            &mut self.visualization,
            action,
            &armed,
            client,
        );

        if let Some(event) = stepping::stopped_event_for(&outcome) {
            client.send(event)?;
            return Ok(());
        }

        match outcome {
            StepOutcome::Failed(error) => {
                error!(error = %error, "Engine raised an error");
                report_failure(&error, client)?;
                self.end_session("ending session due to error", 1, client)
            }
            _ => self.end_session("program completed", 0, client),
        }
    }

    fn run_shots(&mut self, client: &mut dyn DapClient) -> DynResult<()> {
        self.variables.reset();
        let shots = self.program.config.shot_count;
        let program = &mut self.program;
        let mut reload = |engine: &mut dyn Engine| program.load(engine).map(|_| ());

        let outcome = shots::run_shots(
            self.engine.as_mut(),
            &mut self.visualization,
            shots,
            client,
            &mut reload,
        );

        if let ShotsOutcome::Failed { error, .. } = &outcome {
            report_failure(error, client)?;
        }
        self.end_session(outcome.message(), outcome.exit_code(), client)
    }

    fn capabilities() -> types::Capabilities {
        types::Capabilities {
            supports_configuration_done_request: Some(true),
            supports_function_breakpoints: Some(true),
            supports_breakpoint_locations_request: Some(true),
            support_terminate_debuggee: Some(true),
            supports_terminate_request: Some(true),
            supports_conditional_breakpoints: Some(false),
            supports_hit_conditional_breakpoints: Some(false),
            supports_evaluate_for_hovers: Some(false),
            supports_step_back: Some(false),
            supports_set_variable: Some(false),
            supports_exception_options: Some(false),
            supports_exception_filter_options: Some(false),
            ..Default::default()
        }
    }

    /// Handle DAP request and send appropriate response
    pub fn handle_request(&mut self, req: Request, client: &mut dyn DapClient) -> DynResult<()> {
        match &req.command {
            Command::Initialize(args) => {
                debug!(?args, "Received Initialize request");
                self.coords = ClientCoordinates::new(args.lines_start_at1, args.columns_start_at1);
                self.program.resolver.set_coordinates(self.coords);
                self.variables
                    .set_supports_variable_type(args.supports_variable_type.unwrap_or(false));
                self.state.advance(SessionState::Initialized);

                client.respond(req.success(ResponseBody::Initialize(Self::capabilities())))?;
                client.send(Event::Initialized)?;
            }
            Command::Launch(args) => {
                debug!(?args, "Received Launch request");
                if self.state >= SessionState::AwaitingConfiguration {
                    warn!(state = ?self.state, "Rejecting launch for an already launched session");
                    let error = QsAdapterError::ProtocolError("Program already launched".to_string());
                    client.respond(req.error(&error.to_string()))?;
                    return Err(Box::new(error));
                }

                let no_debug = args.no_debug.unwrap_or(false);
                let launch = args
                    .additional_data
                    .clone()
                    .ok_or(QsAdapterError::MissingLaunchArguments)
                    .and_then(|data| {
                        serde_json::from_value::<LaunchArgs>(data)
                            .map_err(QsAdapterError::LaunchArgumentsError)
                    });

                match launch {
                    Ok(launch) => self.launch(req, RunConfiguration::from_launch(launch, no_debug), client)?,
                    Err(e) => {
                        client.respond(req.error(&e.to_string()))?;
                        return Err(Box::new(e));
                    }
                }
            }
            Command::ConfigurationDone => {
                debug!("Received ConfigurationDone request");
                client.respond(req.success(ResponseBody::ConfigurationDone))?;
                self.configured = true;
                self.resume_launch(Instant::now(), client)?;
            }
            Command::SetBreakpoints(args) => {
                debug!(?args, "Received SetBreakpoints request");
                let requested: Vec<RequestedBreakpoint> = args
                    .breakpoints
                    .as_deref()
                    .unwrap_or_default()
                    .iter()
                    .map(RequestedBreakpoint::from)
                    .collect();

                let breakpoints = if !self.program.loaded {
                    if let Some(path) = args.source.path.clone() {
                        debug!(path = %path, "Deferring breakpoints until the program is loaded");
                        self.program.breakpoints.defer(path, requested);
                    }
                    Vec::new()
                } else if let Some(uri) = self.program.sources.resolve_source(&args.source) {
                    let resolved = self
                        .program
                        .resolver
                        .resolve(self.engine.as_mut(), &uri, &requested);
                    let breakpoints = resolved
                        .iter()
                        .map(|candidate| candidate.to_breakpoint(&args.source))
                        .collect();
                    self.program.breakpoints.replace(uri, resolved);
                    breakpoints
                } else {
                    debug!(source = ?args.source.path, "Could not resolve breakpoint source");
                    Vec::new()
                };

                client.respond(req.success(ResponseBody::SetBreakpoints(SetBreakpointsResponse {
                    breakpoints,
                })))?;
            }
            Command::BreakpointLocations(args) => {
                debug!(?args, "Received BreakpointLocations request");
                let requested = RequestedBreakpoint {
                    line: args.line,
                    column: args.column,
                    end_line: args.end_line,
                    end_column: args.end_column,
                };

                let breakpoints = match self.program.sources.resolve_source(&args.source) {
                    Some(uri) if self.program.loaded => self
                        .program
                        .resolver
                        .query(self.engine.as_mut(), &uri, &requested)
                        .iter()
                        .map(|range| range.to_location())
                        .collect(),
                    _ => Vec::new(),
                };

                client.respond(req.success(ResponseBody::BreakpointLocations(
                    BreakpointLocationsResponse { breakpoints },
                )))?;
            }
            Command::SetExceptionBreakpoints(_) => {
                debug!("Received SetExceptionBreakpoints request");
                client.respond(req.success(ResponseBody::SetExceptionBreakpoints(
                    SetExceptionBreakpointsResponse { breakpoints: None },
                )))?;
            }
            Command::SetFunctionBreakpoints(_) => {
                debug!("Received SetFunctionBreakpoints request");
                client.respond(req.success(ResponseBody::SetFunctionBreakpoints(
                    SetFunctionBreakpointsResponse {
                        breakpoints: Vec::new(),
                    },
                )))?;
            }
            Command::Threads => {
                debug!("Received Threads request");
                client.respond(req.success(ResponseBody::Threads(ThreadsResponse {
                    threads: vec![types::Thread {
                        id: THREAD_ID,
                        name: "main".to_string(),
                    }],
                })))?;
            }
            Command::StackTrace(args) => {
                debug!(?args, "Received StackTrace request");
                let stack_frames = self.stack_frames();
                client.respond(req.success(ResponseBody::StackTrace(StackTraceResponse {
                    total_frames: Some(stack_frames.len() as i64),
                    stack_frames,
                })))?;
            }
            Command::Scopes(args) => {
                debug!(?args, "Received Scopes request");
                let scopes = self.variables.scopes();
                client.respond(req.success(ResponseBody::Scopes(ScopesResponse { scopes })))?;
            }
            Command::Variables(args) => {
                debug!(?args, "Received Variables request");
                let variables = self.variables.variables(
                    args.variables_reference,
                    self.engine.as_mut(),
                    &mut self.visualization,
                    self.telemetry.as_mut(),
                );
                if self.visualization.is_enabled() {
                    self.program.config.visualization_enabled = true;
                }
                client.respond(req.success(ResponseBody::Variables(VariablesResponse { variables })))?;
            }
            Command::Continue(_) => {
                debug!("Received Continue request");
                client.respond(req.success(ResponseBody::Continue(ContinueResponse {
                    all_threads_continued: Some(true),
                })))?;
                self.step(StepAction::Continue, client)?;
            }
            Command::Next(_) => {
                debug!("Received Next request");
                client.respond(req.success(ResponseBody::Next))?;
                self.step(StepAction::Next, client)?;
            }
            Command::StepIn(_) => {
                debug!("Received StepIn request");
                client.respond(req.success(ResponseBody::StepIn))?;
                self.step(StepAction::StepIn, client)?;
            }
            Command::StepOut(_) => {
                debug!("Received StepOut request");
                client.respond(req.success(ResponseBody::StepOut))?;
                self.step(StepAction::StepOut, client)?;
            }
            Command::Terminate(_) => {
                debug!("Received Terminate request");
                self.engine.terminate();
                client.respond(req.success(ResponseBody::Terminate))?;
                self.end_session("debug session terminated", 0, client)?;
            }
            Command::Disconnect(_) => {
                debug!("Received Disconnect request");
                self.engine.terminate();
                self.pending_launch = None;
                self.state.advance(SessionState::Terminated);

                client.respond(req.success(ResponseBody::Disconnect))?;
                return Err(Box::new(QsAdapterError::Shutdown));
            }
            command => {
                let command = command.clone();
                warn!(?command, "Unsupported request");
                client.respond(req.error("Unsupported request"))?;
                return Err(Box::new(QsAdapterError::UnhandledCommand(command)));
            }
        }
        Ok(())
    }

    fn launch(
        &mut self,
        req: Request,
        config: RunConfiguration,
        client: &mut dyn DapClient,
    ) -> DynResult<()> {
        info!(program = %config.program, no_debug = config.no_debug, shots = config.shot_count, "Launching program");
        self.telemetry.send(
            "debugSessionStart",
            serde_json::json!({ "noDebug": config.no_debug, "shots": config.shot_count }),
        );

        if config.visualization_enabled {
            self.visualization.enable();
        }
        self.visualization.set_program(config.program.clone());
        self.program.config = config;

        let armed = match self.program.load(self.engine.as_mut()) {
            Ok(armed) => armed,
            Err(e) => {
                error!(error = %e, "Failed to load program");
                client.respond(req.error(&e.to_string()))?;
                return self.end_session("ending session due to error", 1, client);
            }
        };
        for breakpoint in armed {
            client.send(breakpoint_event(breakpoint))?;
        }

        self.state.advance(SessionState::AwaitingConfiguration);
        self.pending_launch = Some(PendingLaunch {
            request: req,
            deadline: Instant::now() + self.configuration_timeout,
        });
        self.resume_launch(Instant::now(), client)
    }

    /// Engine frames innermost-first, followed by the synthetic entry frame.
    fn stack_frames(&mut self) -> Vec<types::StackFrame> {
        let frames = match self.engine.stack_frames() {
            Ok(frames) => frames,
            Err(e) => {
                warn!(error = %e, "Failed to get stack frames");
                Vec::new()
            }
        };

        let mut stack_frames: Vec<types::StackFrame> = frames
            .iter()
            .rev()
            .enumerate()
            .map(|(i, frame)| {
                let range = self.coords.range_to_client(&frame.range);
                let source = match self.program.sources.resolve(&frame.source) {
                    Some(uri) => self.program.sources.client_source(&uri),
                    None => types::Source {
                        path: Some(frame.source.clone()),
                        ..Default::default()
                    },
                };

                types::StackFrame {
                    id: i as i64 + 1,
                    name: frame.name.clone(),
                    source: Some(source),
                    line: range.line,
                    column: range.column,
                    end_line: Some(range.end_line),
                    end_column: Some(range.end_column),
                    ..Default::default()
                }
            })
            .collect();

        stack_frames.push(types::StackFrame {
            id: 0,
            name: ENTRY_FRAME.to_string(),
            source: None,
            line: 0,
            column: 0,
            ..Default::default()
        });
        stack_frames
    }
}

fn report_failure(error: &EngineError, client: &mut dyn DapClient) -> DynResult<()> {
    client.send(output_event(error.render(), OutputEventCategory::Stderr))?;
    Ok(())
}
