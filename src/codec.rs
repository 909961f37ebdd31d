//! Fixed-layout binary codec for CCSDS-style telemetry frames.
//!
//! Wire format (big-endian, 32 bytes):
//!
//! ```text
//! offset  size  field
//! 0       2     packet id: version(3) | type(1) | sec hdr flag(1) | APID(11)
//! 2       2     sequence control: seq flags(2) | seq count(14)
//! 4       2     packet length (total length - 7)
//! 6       8     timestamp (Unix seconds)
//! 14      2     subsystem id
//! 16      4     temperature (f32)
//! 20      4     battery (f32)
//! 24      4     altitude (f32)
//! 28      4     signal (f32)
//! ```
//!
//! Fields are positional. Nothing is length- or tag-delimited, so any frame of
//! at least [`FRAME_SIZE`] bytes decodes; trailing bytes are ignored.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use static_assertions::const_assert_eq;
use thiserror::Error;

use crate::anomaly;

pub const PRIMARY_HEADER_SIZE: usize = 6;
pub const SECONDARY_HEADER_SIZE: usize = 10;
pub const HEADER_SIZE: usize = PRIMARY_HEADER_SIZE + SECONDARY_HEADER_SIZE;
pub const PAYLOAD_SIZE: usize = 16;
pub const FRAME_SIZE: usize = HEADER_SIZE + PAYLOAD_SIZE;

/// Largest datagram the ingest listener will copy out of its receive buffer.
pub const MAX_FRAME_SIZE: usize = 1024;

const_assert_eq!(HEADER_SIZE, 16);
const_assert_eq!(FRAME_SIZE, 32);

// The length field counts everything after the primary header, minus one.
const LENGTH_FIELD_OFFSET: usize = 7;

pub const PACKET_VERSION: u8 = 0;
pub const PACKET_TYPE_TELEMETRY: u8 = 0;
pub const SEQ_FLAGS_STANDALONE: u8 = 0b11;
pub const STANDALONE_PACKET_LENGTH: u16 = (FRAME_SIZE - LENGTH_FIELD_OFFSET) as u16;

const APID_MASK: u16 = 0x07FF;
const SEQ_COUNT_MASK: u16 = 0x3FFF;

/// A datagram copied out of the listener's reuse buffer.
pub type RawFrame = heapless::Vec<u8, MAX_FRAME_SIZE>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("Truncated frame: need {needed} bytes, got {available}")]
    TruncatedFrame { needed: usize, available: usize },
    #[error("Packet length field {declared} does not match a {actual}-byte frame")]
    LengthMismatch { declared: u16, actual: usize },
    #[error("Timestamp {0} is outside the representable range")]
    TimestampOutOfRange(u64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrimaryHeader {
    pub packet_id: u16,
    pub packet_seq_ctrl: u16,
    pub packet_length: u16,
}

impl PrimaryHeader {
    pub fn version(self) -> u8 {
        (self.packet_id >> 13) as u8
    }

    pub fn packet_type(self) -> u8 {
        ((self.packet_id >> 12) & 0x1) as u8
    }

    pub fn has_secondary_header(self) -> bool {
        (self.packet_id >> 11) & 0x1 == 1
    }

    pub fn apid(self) -> u16 {
        self.packet_id & APID_MASK
    }

    pub fn sequence_flags(self) -> u8 {
        (self.packet_seq_ctrl >> 14) as u8
    }

    pub fn sequence_count(self) -> u16 {
        self.packet_seq_ctrl & SEQ_COUNT_MASK
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecondaryHeader {
    pub timestamp: u64,
    pub subsystem_id: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PacketHeader {
    pub primary: PrimaryHeader,
    pub secondary: SecondaryHeader,
}

impl PacketHeader {
    /// Header for a standalone telemetry packet carrying a secondary header.
    pub fn standalone(apid: u16, sequence_count: u16, timestamp: u64, subsystem_id: u16) -> Self {
        let packet_id = (u16::from(PACKET_VERSION) << 13)
            | (u16::from(PACKET_TYPE_TELEMETRY) << 12)
            | (1 << 11)
            | (apid & APID_MASK);
        let packet_seq_ctrl = (u16::from(SEQ_FLAGS_STANDALONE) << 14) | (sequence_count & SEQ_COUNT_MASK);

        Self {
            primary: PrimaryHeader {
                packet_id,
                packet_seq_ctrl,
                packet_length: STANDALONE_PACKET_LENGTH,
            },
            secondary: SecondaryHeader {
                timestamp,
                subsystem_id,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TelemetryPayload {
    pub temperature: f32, // Celsius
    pub battery: f32,     // percent, 0-100 nominal
    pub altitude: f32,    // km
    pub signal: f32,      // dB
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TelemetryPacket {
    pub header: PacketHeader,
    pub payload: TelemetryPayload,
}

/// A decoded and classified reading.
///
/// The anomaly flag is computed once, when the reading is built from a
/// payload, and the fields cannot be changed afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryReading {
    timestamp: DateTime<Utc>,
    temperature: f32,
    battery: f32,
    altitude: f32,
    signal: f32,
    anomaly: bool,
}

impl TelemetryReading {
    pub fn new(timestamp: DateTime<Utc>, payload: TelemetryPayload) -> Self {
        Self {
            timestamp,
            temperature: payload.temperature,
            battery: payload.battery,
            altitude: payload.altitude,
            signal: payload.signal,
            anomaly: anomaly::classify(&payload),
        }
    }

    pub fn from_packet(packet: &TelemetryPacket) -> Result<Self, DecodeError> {
        let timestamp = unix_seconds_to_utc(packet.header.secondary.timestamp)?;
        Ok(Self::new(timestamp, packet.payload))
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn temperature(&self) -> f32 {
        self.temperature
    }

    pub fn battery(&self) -> f32 {
        self.battery
    }

    pub fn altitude(&self) -> f32 {
        self.altitude
    }

    pub fn signal(&self) -> f32 {
        self.signal
    }

    pub fn is_anomaly(&self) -> bool {
        self.anomaly
    }

    pub fn payload(&self) -> TelemetryPayload {
        TelemetryPayload {
            temperature: self.temperature,
            battery: self.battery,
            altitude: self.altitude,
            signal: self.signal,
        }
    }
}

/// Decodes and classifies one frame.
pub fn decode(raw: &[u8]) -> Result<TelemetryReading, DecodeError> {
    let packet = decode_packet(raw)?;
    TelemetryReading::from_packet(&packet)
}

pub fn decode_packet(raw: &[u8]) -> Result<TelemetryPacket, DecodeError> {
    let mut reader = FrameReader::new(raw);

    let primary = PrimaryHeader {
        packet_id: reader.read_u16()?,
        packet_seq_ctrl: reader.read_u16()?,
        packet_length: reader.read_u16()?,
    };
    let secondary = SecondaryHeader {
        timestamp: reader.read_u64()?,
        subsystem_id: reader.read_u16()?,
    };
    let payload = TelemetryPayload {
        temperature: reader.read_f32()?,
        battery: reader.read_f32()?,
        altitude: reader.read_f32()?,
        signal: reader.read_f32()?,
    };

    Ok(TelemetryPacket {
        header: PacketHeader { primary, secondary },
        payload,
    })
}

pub fn encode_packet(packet: &TelemetryPacket) -> [u8; FRAME_SIZE] {
    let primary = &packet.header.primary;
    let secondary = &packet.header.secondary;
    let payload = &packet.payload;

    let mut buf = [0u8; FRAME_SIZE];
    buf[0..2].copy_from_slice(&primary.packet_id.to_be_bytes());
    buf[2..4].copy_from_slice(&primary.packet_seq_ctrl.to_be_bytes());
    buf[4..6].copy_from_slice(&primary.packet_length.to_be_bytes());
    buf[6..14].copy_from_slice(&secondary.timestamp.to_be_bytes());
    buf[14..16].copy_from_slice(&secondary.subsystem_id.to_be_bytes());
    buf[16..20].copy_from_slice(&payload.temperature.to_be_bytes());
    buf[20..24].copy_from_slice(&payload.battery.to_be_bytes());
    buf[24..28].copy_from_slice(&payload.altitude.to_be_bytes());
    buf[28..32].copy_from_slice(&payload.signal.to_be_bytes());
    buf
}

/// Checks the declared packet length against the received frame size.
///
/// `decode` does not call this; frames are accepted regardless of the length
/// field unless strict validation is configured.
pub fn validate_length(header: &PacketHeader, frame_len: usize) -> Result<(), DecodeError> {
    let declared = header.primary.packet_length;
    if usize::from(declared) + LENGTH_FIELD_OFFSET != frame_len {
        return Err(DecodeError::LengthMismatch {
            declared,
            actual: frame_len,
        });
    }
    Ok(())
}

fn unix_seconds_to_utc(seconds: u64) -> Result<DateTime<Utc>, DecodeError> {
    i64::try_from(seconds)
        .ok()
        .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
        .ok_or(DecodeError::TimestampOutOfRange(seconds))
}

struct FrameReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> FrameReader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        let end = self.pos + N;
        let bytes = self.buf.get(self.pos..end).ok_or(DecodeError::TruncatedFrame {
            needed: end,
            available: self.buf.len(),
        })?;
        self.pos = end;

        let mut out = [0u8; N];
        out.copy_from_slice(bytes);
        Ok(out)
    }

    fn read_u16(&mut self) -> Result<u16, DecodeError> {
        self.take().map(u16::from_be_bytes)
    }

    fn read_u64(&mut self) -> Result<u64, DecodeError> {
        self.take().map(u64::from_be_bytes)
    }

    fn read_f32(&mut self) -> Result<f32, DecodeError> {
        self.take().map(f32::from_be_bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reader_reports_first_unreadable_field() {
        let mut reader = FrameReader::new(&[0x00, 0x01, 0x02]);
        assert_eq!(reader.read_u16(), Ok(1));
        assert_eq!(
            reader.read_u16(),
            Err(DecodeError::TruncatedFrame { needed: 4, available: 3 })
        );
    }

    #[test]
    fn timestamp_beyond_i64_is_rejected() {
        assert_eq!(
            unix_seconds_to_utc(u64::MAX),
            Err(DecodeError::TimestampOutOfRange(u64::MAX))
        );
    }
}
