use rand::{Rng, RngCore};

use crate::config::Config;
use crate::endpoint::Spacecraft;
use crate::frame::tc::{self, TcFrameHeader};
use crate::pus::{self, AckFlags, PusTcSink, TcHeader};
use crate::space_packet::{self, PacketType, SequenceFlags};

mod util;
use util::{config, Pair, Recording};

#[test]
fn telecommand_uplink_through_cltu() {
    let mut pair = Pair::new(config());
    pair.ground
        .send_tc(0, false, 0x42, 0, b"switch heater on", &mut pair.ground_events)
        .unwrap();
    pair.drive_uplink();

    assert_eq!(pair.space_events.packets.len(), 1);
    let (vc, header, payload) = &pair.space_events.packets[0];
    assert_eq!(*vc, 0);
    assert_eq!(header.packet_type, PacketType::Telecommand);
    assert_eq!(header.apid, 0x42);
    assert_eq!(payload, b"switch heater on");

    // the frame was accepted in sequence
    assert_eq!(pair.space.farm(0).unwrap().expected_seq(), 1);
    assert_eq!(pair.ground.next_fsn(0), Some(1));
}

#[test]
fn telecommand_uplink_without_cltu() {
    let mut cfg = config();
    cfg.use_cltu = false;
    let mut pair = Pair::new(cfg);
    pair.ground
        .send_tc(1, false, 0x17, 3, &[0xAB; 8], &mut pair.ground_events)
        .unwrap();
    pair.drive_uplink();

    assert_eq!(pair.space_events.packets.len(), 1);
    assert_eq!(pair.space_events.packets[0].0, 1);
    assert_eq!(pair.space.farm(1).unwrap().expected_seq(), 1);
    // channel 0 untouched
    assert_eq!(pair.space.farm(0).unwrap().expected_seq(), 0);
}

#[test]
fn uplink_survives_arbitrary_chunking() {
    for chunk in [1, 2, 3, 7, 16] {
        let mut pair = Pair::new(config());
        for seq in 0..4u16 {
            pair.ground
                .send_tc(0, false, 0x100, seq, &[seq as u8; 12], &mut pair.ground_events)
                .unwrap();
        }
        pair.drive_uplink_chunked(chunk);
        assert_eq!(pair.space_events.packets.len(), 4, "chunk size {chunk}");
        for (seq, (_, header, _)) in pair.space_events.packets.iter().enumerate() {
            assert_eq!(header.sequence_count, seq as u16);
        }
    }
}

#[test]
fn lost_frame_raises_retransmit_until_resent() {
    let mut pair = Pair::new(config());

    pair.ground
        .send_tc(0, false, 1, 0, &[0x00], &mut pair.ground_events)
        .unwrap();
    pair.drive_uplink();

    // frame with FSN 1 never arrives
    pair.ground
        .send_tc(0, false, 1, 1, &[0x01], &mut pair.ground_events)
        .unwrap();
    pair.lose_uplink();

    pair.ground
        .send_tc(0, false, 1, 2, &[0x02], &mut pair.ground_events)
        .unwrap();
    pair.drive_uplink();

    let farm = pair.space.farm(0).unwrap();
    assert!(farm.retransmit());
    assert_eq!(farm.expected_seq(), 1);
    assert_eq!(pair.space.retransmit_error_count(), 1);
    assert_eq!(pair.space_events.packets.len(), 1);

    // report reaches the ground with the next telemetry frame
    pair.space
        .send_tm(0, 0x7F0, 0, b"hk", &mut pair.space_events)
        .unwrap();
    pair.drive_downlink();
    let clcw = pair.ground.last_clcw(0).unwrap();
    assert!(clcw.retransmit);
    assert_eq!(clcw.report_value, 1);
    assert_eq!(pair.ground.next_fsn(0), Some(3));

    // this operator recovers the channel by reinitializing AD mode
    pair.ground.send_init_ad(0, &mut pair.ground_events).unwrap();
    pair.drive_uplink();
    assert_eq!(pair.space.farm(0).unwrap().expected_seq(), 0);
    assert!(!pair.space.farm(0).unwrap().retransmit());
}

#[test]
fn far_sequence_number_locks_channel_and_init_ad_recovers() {
    let mut pair = Pair::new(config());

    // a frame from a stale session arrives with FSN 100
    let header = TcFrameHeader {
        bypass: false,
        control_command: false,
        spacecraft_id: 0x1BB,
        virtual_channel: 0,
        frame_seq_number: 100,
        map: 0,
    };
    let mut buf = [0u8; 64];
    let n = tc::encode(&header, &[0x99], true, true, &mut buf).unwrap();
    pair.space.set_sync();
    pair.space.process_tc(&buf[..n], &mut pair.space_events);

    assert!(pair.space.farm(0).unwrap().lockout());
    assert_eq!(pair.space.lockout_error_count(), 1);

    // type-A traffic is refused while locked out
    pair.ground
        .send_tc(0, false, 1, 0, &[0x01], &mut pair.ground_events)
        .unwrap();
    pair.drive_uplink();
    assert!(pair.space_events.packets.is_empty());

    // but type-B still gets through
    pair.ground
        .send_tc(0, true, 1, 1, &[0x02], &mut pair.ground_events)
        .unwrap();
    pair.drive_uplink();
    assert_eq!(pair.space_events.packets.len(), 1);

    // recovery: Set V(R) + Unlock, then normal AD traffic
    pair.ground.send_init_ad(0, &mut pair.ground_events).unwrap();
    pair.drive_uplink();
    assert!(!pair.space.farm(0).unwrap().lockout());

    pair.ground
        .send_tc(0, false, 1, 2, &[0x03], &mut pair.ground_events)
        .unwrap();
    pair.drive_uplink();
    assert_eq!(pair.space_events.packets.len(), 2);
    assert_eq!(pair.space.farm(0).unwrap().expected_seq(), 1);
}

#[test]
fn telemetry_downlink_reports_clcw_and_fills_with_idle() {
    let mut pair = Pair::new(config());

    // some uplink first so the CLCW has something to say
    pair.ground
        .send_tc(0, false, 2, 0, &[0x10], &mut pair.ground_events)
        .unwrap();
    pair.drive_uplink();

    pair.space
        .send_tm(0, 0x7F0, 9, b"temperatures nominal", &mut pair.space_events)
        .unwrap();
    pair.drive_downlink();

    // the data packet and the idle fill packet
    assert_eq!(pair.ground_events.packets.len(), 2);
    let (vc, header, payload) = &pair.ground_events.packets[0];
    assert_eq!(*vc, 0);
    assert_eq!(header.apid, 0x7F0);
    assert_eq!(header.sequence_count, 9);
    assert_eq!(payload, b"temperatures nominal");
    let (_, idle, idle_payload) = &pair.ground_events.packets[1];
    assert_eq!(idle.apid, space_packet::IDLE_APID);
    assert!(idle_payload.iter().all(|&b| b == space_packet::IDLE_FILL));

    assert_eq!(pair.ground_events.clcws.len(), 1);
    let clcw = pair.ground.last_clcw(0).unwrap();
    assert_eq!(clcw.report_value, 1);
    assert!(!clcw.retransmit);
    assert!(!clcw.lockout);
}

#[test]
fn downlink_frame_counters_track_gaps() {
    let mut pair = Pair::new(config());

    pair.space.send_tm(0, 1, 0, &[0x01], &mut pair.space_events).unwrap();
    pair.drive_downlink();
    assert_eq!(pair.ground.mcfc_error_count(), 0);

    // one frame vanishes on the way down
    pair.space.send_tm(0, 1, 1, &[0x02], &mut pair.space_events).unwrap();
    pair.space_events.out.clear();

    pair.space.send_tm(0, 1, 2, &[0x03], &mut pair.space_events).unwrap();
    pair.drive_downlink();
    assert_eq!(pair.ground.mcfc_error_count(), 1);
    assert_eq!(pair.ground.vcfc_error_count(), 1);

    // back in sequence afterwards
    pair.space.send_tm(0, 1, 3, &[0x04], &mut pair.space_events).unwrap();
    pair.drive_downlink();
    assert_eq!(pair.ground.mcfc_error_count(), 1);
    assert_eq!(pair.ground.vcfc_error_count(), 1);
}

#[test]
fn idle_frames_keep_the_channel_alive() {
    let mut pair = Pair::new(config());
    pair.space.send_idle(&mut pair.space_events).unwrap();
    pair.space.send_idle(&mut pair.space_events).unwrap();
    pair.drive_downlink();

    // idle frames carry no packets but advance the master count
    assert!(pair.ground_events.packets.is_empty());
    assert_eq!(pair.ground.mcfc_error_count(), 0);
    assert_eq!(pair.ground.tm_sync_error_count(), 0);

    // a data frame after idles is still in sequence on the master channel
    pair.space.send_tm(0, 5, 0, &[0xAA], &mut pair.space_events).unwrap();
    pair.drive_downlink();
    assert_eq!(pair.ground.mcfc_error_count(), 0);
    assert_eq!(pair.ground_events.packets.len(), 2);
}

#[test]
fn foreign_spacecraft_id_counted_and_dropped() {
    let mut pair = Pair::new(config());

    let header = TcFrameHeader {
        bypass: true,
        control_command: false,
        spacecraft_id: 0x005, // not in the allow-list
        virtual_channel: 0,
        frame_seq_number: 0,
        map: 0,
    };
    let mut buf = [0u8; 64];
    let n = tc::encode(&header, &[0x01], true, true, &mut buf).unwrap();
    pair.space.set_sync();
    pair.space.process_tc(&buf[..n], &mut pair.space_events);

    assert!(pair.space_events.packets.is_empty());
    assert_eq!(pair.space.scid_error_count(), 1);

    // widening the allow-list at runtime admits it
    pair.space.set_scids(vec![0x1BB, 0x005]).unwrap();
    pair.space.set_sync();
    pair.space.process_tc(&buf[..n], &mut pair.space_events);
    assert_eq!(pair.space_events.packets.len(), 1);
}

#[test]
fn unconfigured_virtual_channel_counted() {
    let mut pair = Pair::new(config());
    let header = TcFrameHeader {
        bypass: true,
        control_command: false,
        spacecraft_id: 0x1BB,
        virtual_channel: 5, // only 0 and 1 exist
        frame_seq_number: 0,
        map: 0,
    };
    let mut buf = [0u8; 64];
    let n = tc::encode(&header, &[0x01], true, true, &mut buf).unwrap();
    pair.space.set_sync();
    pair.space.process_tc(&buf[..n], &mut pair.space_events);
    assert!(pair.space_events.packets.is_empty());
    assert_eq!(pair.space.vc_error_count(), 1);
}

#[test]
fn sequence_break_resets_partial_packet() {
    // a packet spanning two frames is abandoned when the second frame is
    // lost and a later frame sets the retransmit flag
    let mut cfg = config();
    cfg.use_cltu = false;
    let mut pair = Pair::new(cfg);

    // hand-build a frame whose payload is only the start of a packet
    let mut packet = [0u8; 32];
    let len = space_packet::encode(
        PacketType::Telecommand,
        SequenceFlags::Unsegmented,
        0x33,
        0,
        None,
        &[0x44; 20],
        &mut packet,
    )
    .unwrap();
    let header = TcFrameHeader {
        bypass: false,
        control_command: false,
        spacecraft_id: 0x1BB,
        virtual_channel: 0,
        frame_seq_number: 0,
        map: 0,
    };
    let mut buf = [0u8; 64];
    let first_half = &packet[..len / 2];
    let n = tc::encode(&header, first_half, true, true, &mut buf).unwrap();
    pair.space.set_sync();
    pair.space.process_tc(&buf[..n], &mut pair.space_events);
    assert!(pair.space_events.packets.is_empty());

    // FSN 1 with the rest of the packet is lost; FSN 2 arrives
    let header = TcFrameHeader {
        frame_seq_number: 2,
        ..header
    };
    let n = tc::encode(&header, &[0x55], true, true, &mut buf).unwrap();
    pair.space.set_sync();
    pair.space.process_tc(&buf[..n], &mut pair.space_events);

    assert_eq!(pair.space.retransmit_error_count(), 1);
    assert_eq!(pair.space.sp_sync_error_count(0), Some(1));
    assert!(pair.space_events.packets.is_empty());
}

#[test]
fn pus_telecommand_end_to_end() {
    #[derive(Default)]
    struct Commands {
        seen: Vec<(TcHeader, Vec<u8>)>,
    }
    impl PusTcSink for Commands {
        fn on_pus_tc(&mut self, header: &TcHeader, payload: &[u8]) {
            self.seen.push((*header, payload.to_vec()));
        }
    }

    let mut pair = Pair::new(config());

    // build service 8 "perform function" with two parameter bytes
    let pus_header = TcHeader {
        acks: AckFlags {
            acceptance: true,
            start: false,
            progress: false,
            completion: true,
        },
        service: pus::Service::FunctionManagement.into(),
        subservice: 1,
        source_id: 0x10,
    };
    let mut data = [0u8; 32];
    let n = pus_header.encode(pus::DEFAULT_HEADER_SIZE, &mut data).unwrap();
    data[n] = 0xB0;
    data[n + 1] = 0xB1;
    pair.ground
        .send_tc(0, false, 0x42, 0, &data[..n + 2], &mut pair.ground_events)
        .unwrap();
    pair.drive_uplink();

    assert_eq!(pair.space_events.packets.len(), 1);
    let mut commands = Commands::default();
    pus::parse(
        &pair.space_events.packets[0].2,
        pus::DEFAULT_HEADER_SIZE,
        &mut commands,
    );
    assert_eq!(commands.seen.len(), 1);
    assert_eq!(commands.seen[0].0, pus_header);
    assert_eq!(commands.seen[0].1, vec![0xB0, 0xB1]);
}

#[test]
fn random_payload_roundtrips() {
    let mut rng = rand::thread_rng();
    let mut pair = Pair::new(config());
    for seq in 0..32u16 {
        let len = rng.gen_range(1..=24);
        let mut payload = vec![0u8; len];
        rng.fill_bytes(&mut payload);

        pair.ground
            .send_tc(0, false, 0x7A, seq, &payload, &mut pair.ground_events)
            .unwrap();
        pair.drive_uplink_chunked(rng.gen_range(1..=13));
        let (_, header, got) = pair.space_events.packets.last().unwrap();
        assert_eq!(header.sequence_count, seq);
        assert_eq!(*got, payload);

        pair.space
            .send_tm(0, 0x90, seq, &payload, &mut pair.space_events)
            .unwrap();
        pair.drive_downlink();
        let (_, header, got) = pair
            .ground_events
            .packets
            .iter()
            .rev()
            .find(|(_, h, _)| h.apid == 0x90)
            .unwrap();
        assert_eq!(header.sequence_count, seq);
        assert_eq!(*got, payload);
    }
    assert_eq!(pair.space.tc_checksum_error_count(), 0);
    assert_eq!(pair.ground.tm_checksum_error_count(), 0);
}

#[test]
fn error_counters_saturate() {
    let mut parser = space_packet::Parser::new(16);
    for _ in 0..0x1_0004u32 {
        // one byte in, then a reset: one sync error each round
        parser.push(&[0x00], &mut Discard);
        parser.reset();
    }
    assert_eq!(parser.sync_error_count(), 0xFFFF);

    struct Discard;
    impl space_packet::SpacePacketSink for Discard {
        fn on_space_packet(
            &mut self,
            _: &space_packet::SpacePacketHeader,
            _: &[u8],
        ) {
        }
    }
}

#[test]
fn bypass_traffic_counts_on_farm_b() {
    let mut pair = Pair::new(config());
    for seq in 0..6u16 {
        pair.ground
            .send_tc(0, true, 1, seq, &[seq as u8], &mut pair.ground_events)
            .unwrap();
    }
    pair.drive_uplink();
    assert_eq!(pair.space_events.packets.len(), 6);
    // six type-B frames, counter is mod 4
    assert_eq!(pair.space.farm(0).unwrap().farm_b_counter(), 2);
    // V(R) untouched by bypass traffic
    assert_eq!(pair.space.farm(0).unwrap().expected_seq(), 0);
}

#[test]
fn spacecraft_rejects_out_of_range_channel_on_send() {
    let cfg = config();
    let mut space = Spacecraft::new(cfg).unwrap();
    let mut events = Recording::default();
    assert_eq!(
        space.send_tm(8, 1, 0, &[0x01], &mut events),
        Err(crate::EncodeError::InvalidChannel)
    );

    let mut cfg = Config::new(vec![1]);
    cfg.farm_window = 3;
    assert!(Spacecraft::new(cfg).is_err());
}
