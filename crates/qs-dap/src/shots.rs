use dap::types::OutputEventCategory;
use tracing::{debug, info, warn};

use crate::engine::{Engine, StepAction};
use crate::error::EngineError;
use crate::protocol::{DapClient, StepOutcome, output_event};
use crate::stepping::run_step;
use crate::visualization::VisualizationBridge;

/// How a no-debug run of repeated shots ended.
#[derive(Debug)]
pub enum ShotsOutcome {
    /// Every shot ran to completion.
    Completed,
    /// A shot stopped short of completion without raising an error.
    Incomplete { shot: u32 },
    /// A shot raised an error, or the program could not be reloaded after it.
    Failed { shot: u32, error: EngineError },
}

impl ShotsOutcome {
    pub fn exit_code(&self) -> i64 {
        match self {
            ShotsOutcome::Completed => 0,
            ShotsOutcome::Incomplete { .. } => -1,
            ShotsOutcome::Failed { .. } => 1,
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            ShotsOutcome::Completed => "all shots completed",
            ShotsOutcome::Incomplete { .. } => "execution didn't run to completion",
            ShotsOutcome::Failed { .. } => "ending session due to error",
        }
    }
}

/// Runs the program `shots` times without stepping and stops at the first shot
/// that does not complete.
///
/// `reload` resets the program between shots. It is not called after the last one.
pub fn run_shots(
    engine: &mut dyn Engine,
    visualization: &mut VisualizationBridge,
    shots: u32,
    client: &mut dyn DapClient,
    reload: &mut dyn FnMut(&mut dyn Engine) -> Result<(), EngineError>,
) -> ShotsOutcome {
    let shots = shots.max(1);

    for shot in 1..=shots {
        debug!(shot, shots, "Starting shot");
        match run_step(engine, visualization, StepAction::Continue, &[], client) {
            StepOutcome::Completed => {}
            StepOutcome::Failed(error) => {
                warn!(shot, error = %error, "Shot raised an error");
                return ShotsOutcome::Failed { shot, error };
            }
            outcome => {
                warn!(shot, ?outcome, "Shot did not run to completion");
                return ShotsOutcome::Incomplete { shot };
            }
        }

        info!(shot, shots, "Finished shot");
        if let Err(e) = client.send(output_event(
            format!("Finished shot {shot} of {shots}\n"),
            OutputEventCategory::Console,
        )) {
            warn!(error = %e, "Failed to report finished shot");
        }

        if shot < shots
            && let Err(error) = reload(&mut *engine)
        {
            warn!(shot, error = %error, "Failed to reload program between shots");
            return ShotsOutcome::Failed { shot, error };
        }
    }

    ShotsOutcome::Completed
}
