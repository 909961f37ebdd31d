use serde::{Deserialize, Serialize};

use crate::codec::TelemetryPayload;

// Operational limits. Comparisons are strict: a value sitting exactly on a
// limit is nominal.
pub const MAX_TEMPERATURE_C: f32 = 35.0;
pub const MIN_BATTERY_PERCENT: f32 = 40.0;
pub const MIN_ALTITUDE_KM: f32 = 400.0;
pub const MIN_SIGNAL_DB: f32 = -80.0;

const MAX_VIOLATIONS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Violation {
    TemperatureHigh,
    BatteryLow,
    AltitudeLow,
    SignalWeak,
}

impl core::fmt::Display for Violation {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Violation::TemperatureHigh => write!(f, "temperature above {MAX_TEMPERATURE_C}°C"),
            Violation::BatteryLow => write!(f, "battery below {MIN_BATTERY_PERCENT}%"),
            Violation::AltitudeLow => write!(f, "altitude below {MIN_ALTITUDE_KM}km"),
            Violation::SignalWeak => write!(f, "signal below {MIN_SIGNAL_DB}dB"),
        }
    }
}

pub type Violations = heapless::Vec<Violation, MAX_VIOLATIONS>;

/// Returns true when any single threshold is crossed.
pub fn classify(payload: &TelemetryPayload) -> bool {
    payload.temperature > MAX_TEMPERATURE_C
        || payload.battery < MIN_BATTERY_PERCENT
        || payload.altitude < MIN_ALTITUDE_KM
        || payload.signal < MIN_SIGNAL_DB
}

/// Lists every threshold the payload crosses, in field order.
pub fn violations(payload: &TelemetryPayload) -> Violations {
    let checks = [
        (payload.temperature > MAX_TEMPERATURE_C, Violation::TemperatureHigh),
        (payload.battery < MIN_BATTERY_PERCENT, Violation::BatteryLow),
        (payload.altitude < MIN_ALTITUDE_KM, Violation::AltitudeLow),
        (payload.signal < MIN_SIGNAL_DB, Violation::SignalWeak),
    ];

    let mut found = Violations::new();
    for (tripped, violation) in checks {
        if tripped {
            // Capacity matches the number of checks
            let _ = found.push(violation);
        }
    }
    found
}
