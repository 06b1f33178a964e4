use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use qs_dap::config::Config;

/// Debug Adapter Protocol server for quantum program execution engines
#[derive(Parser, Debug)]
#[command(name = "qs-dap")]
#[command(author = env!("CARGO_PKG_AUTHORS"))]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Execution engine executable (overrides QS_DAP_ENGINE)
    #[arg(short, long)]
    engine: Option<String>,

    /// Milliseconds a launch waits for configurationDone before proceeding
    #[arg(long, value_name = "MILLIS")]
    configuration_timeout_ms: Option<u64>,

    /// Append circuit panel updates to this file as JSON lines
    #[arg(long, value_name = "FILE")]
    panel_output: Option<PathBuf>,

    /// Profile id reported with every panel update
    #[arg(long)]
    profile: Option<String>,

    /// Log filter directive, e.g. `qs_dap=debug`
    #[arg(long)]
    log_level: Option<String>,

    /// Arguments passed to the execution engine
    #[arg(last = true)]
    engine_args: Vec<String>,
}

impl Cli {
    fn into_config(self, mut config: Config) -> Config {
        if let Some(engine) = self.engine {
            config.engine_command = Some(engine);
        }
        if !self.engine_args.is_empty() {
            config.engine_args = self.engine_args;
        }
        if let Some(millis) = self.configuration_timeout_ms {
            config.configuration_timeout = Duration::from_millis(millis);
        }
        if let Some(path) = self.panel_output {
            config.panel_output = Some(path);
        }
        if let Some(profile) = self.profile {
            config.profile = profile;
        }
        if let Some(log_level) = self.log_level {
            config.log_level = log_level;
        }
        config
    }
}

fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let config = Cli::parse().into_config(Config::from_env());
    qs_dap::start(config)
}
