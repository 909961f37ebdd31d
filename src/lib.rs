//! # Ground Station Telemetry Ingest
//!
//! Receives fixed-layout binary telemetry frames over UDP, decodes and
//! classifies them, hands every reading to a persistence backend and fans it
//! out to live observers.
//!
//! ## Features
//!
//! - **Binary codec**: 32-byte big-endian CCSDS-style frames
//! - **Anomaly classification**: fixed thresholds on temperature, battery, altitude and signal
//! - **UDP ingest**: one receive loop, one task per frame
//! - **Broadcast hub**: single control task owning the subscriber set, with pruning of dead observers
//! - **Live feed**: newline-delimited JSON over TCP
//! - **In-memory store**: range, anomaly, aggregate and paginated queries
//!
//! ## Quick Start
//!
//! ```rust
//! use groundstation::codec::{encode_packet, PacketHeader, TelemetryPacket, TelemetryPayload};
//!
//! let packet = TelemetryPacket {
//!     header: PacketHeader::standalone(1, 0, 1_700_000_000, 1),
//!     payload: TelemetryPayload { temperature: 36.0, battery: 80.0, altitude: 500.0, signal: -50.0 },
//! };
//! let reading = groundstation::decode(&encode_packet(&packet)).unwrap();
//! assert!(reading.is_anomaly());
//! ```
//!
//! ## Architecture
//!
//! - [`codec`] - Frame layout, decode and encode
//! - [`anomaly`] - Threshold classification
//! - [`pipeline`] - Per-frame decode, persist, publish
//! - [`ingest`] - UDP listener
//! - [`hub`] - Broadcast hub and subscriber sinks
//! - [`feed`] - TCP live feed
//! - [`store`] - Persistence trait and in-memory backend
//! - [`config`] - Service configuration
//! - [`simulator`] - Packet generator for testing the ingest path

#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::struct_field_names)]
#![allow(clippy::large_types_passed_by_value)]

pub mod anomaly;
pub mod codec;
pub mod config;
pub mod feed;
pub mod hub;
pub mod ingest;
pub mod pipeline;
pub mod simulator;
pub mod store;

// Re-export main public types for convenience
pub use anomaly::classify;
pub use codec::{decode, DecodeError, TelemetryReading};
pub use config::ServiceConfig;
pub use feed::LiveFeed;
pub use hub::BroadcastHub;
pub use ingest::IngestListener;
pub use pipeline::TelemetryPipeline;
pub use simulator::PacketGenerator;
pub use store::{MemoryStore, TelemetryStore};
