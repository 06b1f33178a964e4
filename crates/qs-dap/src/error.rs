use dap::prelude::Command;
use miette::Diagnostic;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum QsAdapterError {
    #[error("Unhandled command: {0:?}")]
    UnhandledCommand(Command),
    #[error("Protocol error: {0}")]
    ProtocolError(String),
    #[error("Failed to deserialize launch arguments: {0}")]
    LaunchArgumentsError(serde_json::Error),
    #[error("Missing launch arguments")]
    MissingLaunchArguments,
    #[error("Session shut down")]
    Shutdown,
}

/// Failures reported by, or while talking to, the execution engine.
#[derive(Error, Diagnostic, Debug)]
pub enum EngineError {
    #[error("{0}")]
    #[diagnostic(code(qs_dap::engine::load))]
    LoadFailed(String),
    #[error("{message}")]
    #[diagnostic(code(qs_dap::engine::runtime))]
    Runtime {
        message: String,
        #[help]
        stack_trace: Option<String>,
    },
    #[error("Engine I/O error: {0}")]
    #[diagnostic(code(qs_dap::engine::io))]
    Io(#[from] std::io::Error),
    #[error("Malformed engine reply: {0}")]
    #[diagnostic(code(qs_dap::engine::protocol))]
    Protocol(String),
    #[error("Engine process exited")]
    #[diagnostic(code(qs_dap::engine::exited))]
    Exited,
}

impl EngineError {
    pub fn runtime(message: impl Into<String>) -> Self {
        EngineError::Runtime {
            message: message.into(),
            stack_trace: None,
        }
    }

    /// Renders the error the way a user should see it, without terminal colors.
    pub fn render(&self) -> String {
        let handler =
            miette::GraphicalReportHandler::new_themed(miette::GraphicalTheme::unicode_nocolor());
        let mut rendered = String::new();
        match handler.render_report(&mut rendered, self) {
            Ok(()) => rendered,
            Err(_) => self.to_string(),
        }
    }
}
