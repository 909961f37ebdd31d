use groundstation::codec::*;
use groundstation::*;

fn sample_packet(payload: TelemetryPayload) -> TelemetryPacket {
    TelemetryPacket {
        header: PacketHeader::standalone(1, 42, 1_700_000_000, 1),
        payload,
    }
}

fn nominal_payload() -> TelemetryPayload {
    TelemetryPayload {
        temperature: 25.0,
        battery: 80.0,
        altitude: 500.0,
        signal: -50.0,
    }
}

#[test]
fn test_frame_layout_is_big_endian() {
    let frame = encode_packet(&sample_packet(nominal_payload()));
    assert_eq!(frame.len(), FRAME_SIZE);

    // version 0, type 0, secondary header flag set, APID 1
    assert_eq!(&frame[0..2], &[0x08, 0x01]);
    // standalone flags, sequence count 42
    assert_eq!(&frame[2..4], &[0xC0, 0x2A]);
    assert_eq!(&frame[4..6], &25u16.to_be_bytes());
    assert_eq!(&frame[6..14], &1_700_000_000u64.to_be_bytes());
    assert_eq!(&frame[14..16], &[0x00, 0x01]);
    assert_eq!(&frame[16..20], &25.0f32.to_be_bytes());
    assert_eq!(&frame[28..32], &(-50.0f32).to_be_bytes());
}

#[test]
fn test_decode_preserves_header_and_payload_bits() {
    let payload = TelemetryPayload {
        temperature: 21.123_457,
        battery: 99.999,
        altitude: 512.25,
        signal: -47.5,
    };
    let packet = sample_packet(payload);
    let decoded = decode_packet(&encode_packet(&packet)).unwrap();

    assert_eq!(decoded.header, packet.header);
    assert_eq!(decoded.payload.temperature.to_bits(), payload.temperature.to_bits());
    assert_eq!(decoded.payload.battery.to_bits(), payload.battery.to_bits());
    assert_eq!(decoded.payload.altitude.to_bits(), payload.altitude.to_bits());
    assert_eq!(decoded.payload.signal.to_bits(), payload.signal.to_bits());

    let primary = decoded.header.primary;
    assert_eq!(primary.version(), PACKET_VERSION);
    assert_eq!(primary.packet_type(), PACKET_TYPE_TELEMETRY);
    assert!(primary.has_secondary_header());
    assert_eq!(primary.apid(), 1);
    assert_eq!(primary.sequence_flags(), SEQ_FLAGS_STANDALONE);
    assert_eq!(primary.sequence_count(), 42);
}

#[test]
fn test_decode_builds_utc_reading() {
    let reading = decode(&encode_packet(&sample_packet(nominal_payload()))).unwrap();

    assert_eq!(reading.timestamp().timestamp(), 1_700_000_000);
    assert_eq!(reading.temperature(), 25.0);
    assert_eq!(reading.battery(), 80.0);
    assert_eq!(reading.altitude(), 500.0);
    assert_eq!(reading.signal(), -50.0);
    assert!(!reading.is_anomaly());
}

#[test]
fn test_short_frames_are_truncated() {
    let frame = encode_packet(&sample_packet(nominal_payload()));

    for len in 0..FRAME_SIZE {
        let result = decode(&frame[..len]);
        match result {
            Err(DecodeError::TruncatedFrame { available, needed }) => {
                assert_eq!(available, len);
                assert!(needed > len && needed <= FRAME_SIZE);
            }
            other => panic!("expected truncation for {} bytes, got {:?}", len, other),
        }
    }
}

#[test]
fn test_trailing_bytes_are_ignored() {
    let frame = encode_packet(&sample_packet(nominal_payload()));
    let mut long = frame.to_vec();
    long.extend_from_slice(&[0xAA; 8]);

    assert_eq!(decode(&long).unwrap(), decode(&frame).unwrap());
}

#[test]
fn test_length_field_not_checked_by_default() {
    let mut frame = encode_packet(&sample_packet(nominal_payload()));
    frame[4..6].copy_from_slice(&999u16.to_be_bytes());

    assert!(decode(&frame).is_ok());

    let packet = decode_packet(&frame).unwrap();
    assert_eq!(
        validate_length(&packet.header, frame.len()),
        Err(DecodeError::LengthMismatch {
            declared: 999,
            actual: FRAME_SIZE
        })
    );
}

#[test]
fn test_standalone_length_validates() {
    let packet = sample_packet(nominal_payload());
    assert_eq!(packet.header.primary.packet_length, STANDALONE_PACKET_LENGTH);
    assert!(validate_length(&packet.header, FRAME_SIZE).is_ok());
}

#[test]
fn test_reading_serializes_to_json() {
    let reading = decode(&encode_packet(&sample_packet(nominal_payload()))).unwrap();
    let json: serde_json::Value = serde_json::to_value(&reading).unwrap();

    assert_eq!(json["timestamp"], "2023-11-14T22:13:20Z");
    assert_eq!(json["battery"], 80.0);
    assert_eq!(json["anomaly"], false);

    let back: TelemetryReading = serde_json::from_value(json).unwrap();
    assert_eq!(back, reading);
}
