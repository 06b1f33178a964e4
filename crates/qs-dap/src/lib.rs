pub mod adapter;
pub mod breakpoints;
pub mod config;
pub mod engine;
pub mod error;
pub mod log;
pub mod protocol;
pub mod range;
pub mod server;
pub mod shots;
pub mod source;
pub mod stepping;
pub mod telemetry;
pub mod variables;
pub mod visualization;

#[cfg(test)]
mod testing;

pub use adapter::QsAdapter;
pub use server::{run, start};
