//! Telemetry packet generator for exercising the ingest path.
//!
//! Every fifth packet (sequence count divisible by 5) pushes exactly one
//! field past its limit; all others stay inside nominal ranges.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::codec::{encode_packet, PacketHeader, TelemetryPacket, TelemetryPayload, FRAME_SIZE};

pub const SIMULATOR_APID: u16 = 0x01;
pub const SUBSYSTEM_MAIN_BUS: u16 = 0x0001;
pub const ANOMALY_PERIOD: u16 = 5;

const SEQ_COUNT_MODULUS: u16 = 1 << 14;

// Nominal operating ranges
const NOMINAL_TEMPERATURE: (f32, f32) = (20.0, 30.0);
const NOMINAL_BATTERY: (f32, f32) = (70.0, 100.0);
const NOMINAL_ALTITUDE: (f32, f32) = (500.0, 550.0);
const NOMINAL_SIGNAL: (f32, f32) = (-60.0, -40.0);

// Out-of-limit ranges, kept clear of the thresholds themselves
const HOT_TEMPERATURE: (f32, f32) = (35.5, 40.0);
const LOW_BATTERY: (f32, f32) = (20.0, 39.5);
const LOW_ALTITUDE: (f32, f32) = (300.0, 399.5);
const WEAK_SIGNAL: (f32, f32) = (-90.0, -80.5);

/// Whether the packet with this sequence count carries an out-of-limit field.
pub fn is_anomaly_slot(sequence_count: u16) -> bool {
    sequence_count % ANOMALY_PERIOD == 0
}

#[derive(Debug)]
pub struct PacketGenerator<R = StdRng> {
    rng: R,
    sequence_count: u16,
}

impl PacketGenerator<StdRng> {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    pub fn seeded(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }
}

impl Default for PacketGenerator<StdRng> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Rng> PacketGenerator<R> {
    pub fn with_rng(rng: R) -> Self {
        Self {
            rng,
            sequence_count: 0,
        }
    }

    /// Sequence count the next packet will carry.
    pub fn sequence_count(&self) -> u16 {
        self.sequence_count
    }

    pub fn next_packet(&mut self, timestamp: u64) -> TelemetryPacket {
        let count = self.sequence_count;
        self.sequence_count = (count + 1) % SEQ_COUNT_MODULUS;

        let payload = if is_anomaly_slot(count) {
            self.anomalous_payload()
        } else {
            self.nominal_payload()
        };

        TelemetryPacket {
            header: PacketHeader::standalone(SIMULATOR_APID, count, timestamp, SUBSYSTEM_MAIN_BUS),
            payload,
        }
    }

    pub fn next_frame(&mut self, timestamp: u64) -> [u8; FRAME_SIZE] {
        encode_packet(&self.next_packet(timestamp))
    }

    fn nominal_payload(&mut self) -> TelemetryPayload {
        TelemetryPayload {
            temperature: self.sample(NOMINAL_TEMPERATURE),
            battery: self.sample(NOMINAL_BATTERY),
            altitude: self.sample(NOMINAL_ALTITUDE),
            signal: self.sample(NOMINAL_SIGNAL),
        }
    }

    fn anomalous_payload(&mut self) -> TelemetryPayload {
        let mut payload = self.nominal_payload();
        match self.rng.gen_range(0..4) {
            0 => payload.temperature = self.sample(HOT_TEMPERATURE),
            1 => payload.battery = self.sample(LOW_BATTERY),
            2 => payload.altitude = self.sample(LOW_ALTITUDE),
            _ => payload.signal = self.sample(WEAK_SIGNAL),
        }
        payload
    }

    fn sample(&mut self, (min, max): (f32, f32)) -> f32 {
        self.rng.gen_range(min..max)
    }
}
