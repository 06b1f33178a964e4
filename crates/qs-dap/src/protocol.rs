use dap::events::{
    BreakpointEventBody, Event, ExitedEventBody, OutputEventBody, StoppedEventBody, TerminatedEventBody,
};
use dap::responses::Response;
use dap::server::Server;
use dap::types::{Breakpoint, BreakpointEventReason, OutputEventCategory, StoppedEventReason};
use std::io;

use crate::engine::StepResult;
use crate::error::EngineError;

type DynResult<T> = miette::Result<T, Box<dyn std::error::Error>>;

/// The only thread the adapter ever reports.
pub const THREAD_ID: i64 = 1;

/// Session lifecycle. Only ever moves forward; `Terminated` is final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum SessionState {
    #[default]
    Uninitialized,
    Initialized,
    AwaitingConfiguration,
    Running,
    Terminated,
}

impl SessionState {
    /// Moves to `next` if that is forward; returns whether the state changed.
    pub fn advance(&mut self, next: SessionState) -> bool {
        if next > *self {
            *self = next;
            true
        } else {
            false
        }
    }

    pub fn is_terminated(&self) -> bool {
        *self == SessionState::Terminated
    }
}

/// Classified result of one engine continuation.
#[derive(Debug)]
pub enum StepOutcome {
    BreakpointHit(i64),
    Completed,
    Progressed,
    Failed(EngineError),
}

impl StepOutcome {
    pub fn failure(&self) -> Option<&EngineError> {
        match self {
            StepOutcome::Failed(error) => Some(error),
            _ => None,
        }
    }
}

impl From<Result<StepResult, EngineError>> for StepOutcome {
    fn from(result: Result<StepResult, EngineError>) -> Self {
        match result {
            Ok(StepResult::BreakpointHit { id }) => StepOutcome::BreakpointHit(id),
            Ok(StepResult::Completed) => StepOutcome::Completed,
            Ok(StepResult::Progressed) => StepOutcome::Progressed,
            Err(error) => StepOutcome::Failed(error),
        }
    }
}

/// The connected client: receives responses and events.
pub trait DapClient {
    fn respond(&mut self, response: Response) -> DynResult<()>;

    fn send(&mut self, event: Event) -> DynResult<()>;
}

impl<R: io::Read, W: io::Write> DapClient for Server<R, W> {
    fn respond(&mut self, response: Response) -> DynResult<()> {
        Server::respond(self, response)?;
        Ok(())
    }

    fn send(&mut self, event: Event) -> DynResult<()> {
        self.send_event(event)?;
        Ok(())
    }
}

pub fn output_event(output: impl Into<String>, category: OutputEventCategory) -> Event {
    Event::Output(OutputEventBody {
        output: output.into(),
        category: Some(category),
        group: None,
        variables_reference: None,
        source: None,
        line: None,
        column: None,
        data: None,
    })
}

pub fn stopped_event(reason: StoppedEventReason, hit_breakpoint_ids: Option<Vec<i64>>) -> Event {
    let description = match &reason {
        StoppedEventReason::Breakpoint => Some("Paused on breakpoint".to_string()),
        StoppedEventReason::Entry => Some("Paused on entry".to_string()),
        _ => None,
    };

    Event::Stopped(StoppedEventBody {
        reason,
        description,
        thread_id: Some(THREAD_ID),
        preserve_focus_hint: None,
        text: None,
        all_threads_stopped: Some(true),
        hit_breakpoint_ids,
    })
}

/// Tells the client about a breakpoint it did not get in a `setBreakpoints` response.
pub fn breakpoint_event(breakpoint: Breakpoint) -> Event {
    Event::Breakpoint(BreakpointEventBody {
        reason: BreakpointEventReason::New,
        breakpoint,
    })
}

pub fn terminated_event() -> Event {
    Event::Terminated(Some(TerminatedEventBody {
        restart: Some(serde_json::Value::Bool(false)),
    }))
}

pub fn exited_event(exit_code: i64) -> Event {
    Event::Exited(ExitedEventBody { exit_code })
}
