use dap::events::Event;
use dap::types::{OutputEventCategory, StoppedEventReason};
use tracing::{debug, warn};

use crate::engine::{Engine, StepAction};
use crate::protocol::{DapClient, StepOutcome, output_event, stopped_event};
use crate::visualization::VisualizationBridge;

/// Issues exactly one engine continuation and classifies the result.
///
/// Engine output produced while the call is in flight goes to the client as
/// stdout `output` events. The visualization is updated before this returns,
/// so any event describing the outcome is sent after the panel has the state.
pub fn run_step(
    engine: &mut dyn Engine,
    visualization: &mut VisualizationBridge,
    action: StepAction,
    armed: &[i64],
    client: &mut dyn DapClient,
) -> StepOutcome {
    debug!(?action, armed = armed.len(), "Dispatching step to engine");

    let mut forward = |text: &str| {
        if let Err(e) = client.send(output_event(text, OutputEventCategory::Stdout)) {
            warn!(error = %e, "Failed to forward engine output");
        }
    };
    let outcome = StepOutcome::from(engine.eval(action, armed, &mut forward));

    visualization.update(engine, outcome.failure());
    outcome
}

/// The `stopped` event for outcomes that leave the session running.
pub fn stopped_event_for(outcome: &StepOutcome) -> Option<Event> {
    match outcome {
        StepOutcome::BreakpointHit(id) => Some(stopped_event(StoppedEventReason::Breakpoint, Some(vec![*id]))),
        StepOutcome::Progressed => Some(stopped_event(StoppedEventReason::Step, None)),
        StepOutcome::Completed | StepOutcome::Failed(_) => None,
    }
}
