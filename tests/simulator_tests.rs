use groundstation::codec::{decode, decode_packet, FRAME_SIZE, STANDALONE_PACKET_LENGTH};
use groundstation::simulator::*;

const T0: u64 = 1_700_000_000;

#[test]
fn test_every_fifth_packet_is_anomalous() {
    let mut generator = PacketGenerator::seeded(7);

    for i in 0..200u64 {
        let seq = generator.sequence_count();
        let reading = decode(&generator.next_frame(T0 + i)).unwrap();
        assert_eq!(
            reading.is_anomaly(),
            is_anomaly_slot(seq),
            "sequence {} classified wrong",
            seq
        );
    }
}

#[test]
fn test_generated_headers() {
    let mut generator = PacketGenerator::seeded(1);

    for expected_seq in 0..10u16 {
        let frame = generator.next_frame(T0);
        assert_eq!(frame.len(), FRAME_SIZE);

        let packet = decode_packet(&frame).unwrap();
        let primary = packet.header.primary;
        assert_eq!(primary.apid(), SIMULATOR_APID);
        assert_eq!(primary.sequence_count(), expected_seq);
        assert_eq!(primary.sequence_flags(), 0b11);
        assert_eq!(primary.packet_length, STANDALONE_PACKET_LENGTH);
        assert_eq!(packet.header.secondary.subsystem_id, SUBSYSTEM_MAIN_BUS);
        assert_eq!(packet.header.secondary.timestamp, T0);
    }
}

#[test]
fn test_same_seed_same_frames() {
    let mut a = PacketGenerator::seeded(42);
    let mut b = PacketGenerator::seeded(42);

    for i in 0..20 {
        assert_eq!(a.next_frame(T0 + i), b.next_frame(T0 + i));
    }
}

#[test]
fn test_sequence_count_wraps_at_fourteen_bits() {
    let mut generator = PacketGenerator::seeded(3);
    for _ in 0..(1u32 << 14) {
        generator.next_packet(T0);
    }

    assert_eq!(generator.sequence_count(), 0);
    assert_eq!(generator.next_packet(T0).header.primary.sequence_count(), 0);
}
