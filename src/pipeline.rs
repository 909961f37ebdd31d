use std::sync::Arc;

use tracing::{debug, error, info};

use crate::anomaly;
use crate::codec::{self, DecodeError, TelemetryReading};
use crate::hub::BroadcastHub;
use crate::store::TelemetryStore;

/// Per-frame processing: decode, classify, persist, publish.
///
/// Persistence and broadcast are independent. A failed insert is logged and
/// the reading is still published.
pub struct TelemetryPipeline {
    store: Arc<dyn TelemetryStore>,
    hub: BroadcastHub,
    strict_length: bool,
}

impl TelemetryPipeline {
    pub fn new(store: Arc<dyn TelemetryStore>, hub: BroadcastHub) -> Self {
        Self {
            store,
            hub,
            strict_length: false,
        }
    }

    /// Reject frames whose packet length field disagrees with their size.
    pub fn with_strict_length(mut self, strict_length: bool) -> Self {
        self.strict_length = strict_length;
        self
    }

    pub fn store(&self) -> &Arc<dyn TelemetryStore> {
        &self.store
    }

    pub fn hub(&self) -> &BroadcastHub {
        &self.hub
    }

    pub async fn handle_frame(&self, frame: &[u8]) -> Result<TelemetryReading, DecodeError> {
        let packet = codec::decode_packet(frame)?;
        if self.strict_length {
            codec::validate_length(&packet.header, frame.len())?;
        }
        let reading = TelemetryReading::from_packet(&packet)?;

        if reading.is_anomaly() {
            let violations = anomaly::violations(&packet.payload);
            let violations: Vec<String> = violations.iter().map(ToString::to_string).collect();
            info!(
                timestamp = %reading.timestamp(),
                apid = packet.header.primary.apid(),
                seq = packet.header.primary.sequence_count(),
                violations = ?violations,
                "Anomalous telemetry"
            );
        }

        match self.store.insert(&reading).await {
            Ok(()) => debug!(timestamp = %reading.timestamp(), "Stored telemetry"),
            Err(e) => error!(timestamp = %reading.timestamp(), error = %e, "Failed to insert telemetry"),
        }

        self.hub.publish(reading.clone());
        Ok(reading)
    }
}
