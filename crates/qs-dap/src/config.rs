use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_CONFIGURATION_TIMEOUT: Duration = Duration::from_millis(1000);
pub const DEFAULT_PROFILE: &str = "unrestricted";

/// Adapter-wide settings, fixed for the lifetime of the process.
#[derive(Debug, Clone)]
pub struct Config {
    pub engine_command: Option<String>,
    pub engine_args: Vec<String>,
    /// How long `launch` waits for `configurationDone` before proceeding anyway.
    pub configuration_timeout: Duration,
    pub panel_output: Option<PathBuf>,
    pub profile: String,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        #[cfg(debug_assertions)]
        let log_level = "qs_dap=debug";
        #[cfg(not(debug_assertions))]
        let log_level = "qs_dap=info";

        Self {
            engine_command: None,
            engine_args: Vec::new(),
            configuration_timeout: DEFAULT_CONFIGURATION_TIMEOUT,
            panel_output: None,
            profile: DEFAULT_PROFILE.to_string(),
            log_level: log_level.to_string(),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(engine) = env::var("QS_DAP_ENGINE") {
            config.engine_command = Some(engine);
        }

        if let Ok(timeout) = env::var("QS_DAP_CONFIGURATION_TIMEOUT_MS") {
            if let Ok(millis) = timeout.parse::<u64>() {
                config.configuration_timeout = Duration::from_millis(millis);
            } else {
                eprintln!(
                    "Warning: Invalid QS_DAP_CONFIGURATION_TIMEOUT_MS value '{}', using default {}ms",
                    timeout,
                    config.configuration_timeout.as_millis()
                );
            }
        }

        if let Ok(path) = env::var("QS_DAP_PANEL_OUTPUT") {
            config.panel_output = Some(PathBuf::from(path));
        }

        if let Ok(profile) = env::var("QS_DAP_PROFILE") {
            config.profile = profile;
        }

        if let Ok(log_level) = env::var("RUST_LOG") {
            config.log_level = log_level;
        } else if let Ok(log_level) = env::var("QS_DAP_LOG_LEVEL") {
            config.log_level = log_level;
        }

        config
    }
}

/// Launch arguments for DAP launch configuration
#[derive(Deserialize, Serialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct LaunchArgs {
    pub program: String,
    #[serde(default)]
    pub entry: Option<String>,
    #[serde(default)]
    pub shots: Option<u32>,
    #[serde(default)]
    pub stop_on_entry: bool,
    #[serde(default)]
    pub trace: bool,
    #[serde(default)]
    pub show_circuit: bool,
}

/// Everything the session needs to know about how to run the program.
///
/// Fixed once launch begins. Only `visualization_enabled` may change later,
/// and only from off to on.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RunConfiguration {
    pub program: String,
    pub entry_point: Option<String>,
    pub shot_count: u32,
    pub no_debug: bool,
    pub stop_on_entry: bool,
    pub visualization_enabled: bool,
    pub trace_verbose: bool,
}

impl Default for RunConfiguration {
    fn default() -> Self {
        Self {
            program: String::new(),
            entry_point: None,
            shot_count: 1,
            no_debug: false,
            stop_on_entry: false,
            visualization_enabled: false,
            trace_verbose: false,
        }
    }
}

impl RunConfiguration {
    pub fn from_launch(args: LaunchArgs, no_debug: bool) -> Self {
        Self {
            program: args.program,
            entry_point: args.entry,
            shot_count: args.shots.unwrap_or(1).max(1),
            no_debug,
            stop_on_entry: args.stop_on_entry,
            visualization_enabled: args.show_circuit,
            trace_verbose: args.trace,
        }
    }
}
