use tracing::info;

/// Fire-and-forget channel for named usage events.
pub trait TelemetrySink {
    fn send(&mut self, event: &str, properties: serde_json::Value);
}

/// Records telemetry events as structured log lines.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingTelemetry;

impl TelemetrySink for TracingTelemetry {
    fn send(&mut self, event: &str, properties: serde_json::Value) {
        info!(target: "qs_dap::telemetry", event = %event, properties = %properties, "Telemetry event");
    }
}
