use bytes::Bytes;
use util::time::{MicroSecs, Ptimes};

use super::*;

const SSRC: u32 = 0x1234_5678;
const UNITS: u32 = 160; // 20 ms at 8 kHz

fn cfg() -> JitterConfig {
    JitterConfig {
        target_delay: Ptimes(1),
        ..Default::default()
    }
}

fn media(seq: u16, ts: u32) -> PacketMeta {
    PacketMeta {
        seq,
        timestamp: ts,
        ssrc: SSRC,
        payload_type: 0,
        marker: false,
        payload: Bytes::from(vec![seq as u8; 160]),
        kind: PayloadKind::Media,
        arrival: MicroSecs(0),
    }
}

fn sid(seq: u16, ts: u32) -> PacketMeta {
    PacketMeta {
        payload: Bytes::from(vec![0xF0, seq as u8]),
        kind: PayloadKind::Sid,
        ..media(seq, ts)
    }
}

fn ftrt() -> PullFlags {
    PullFlags {
        ftrt: true,
        ..Default::default()
    }
}

fn drain() -> PullFlags {
    PullFlags {
        return_all: true,
        ..Default::default()
    }
}

#[test]
fn unprimed_delivers_nothing() {
    let mut jb = JitterBuffer::new(JitterConfig {
        target_delay: Ptimes(4),
        ..Default::default()
    });
    jb.add(media(0, 0)).unwrap();
    assert!(jb.pull(MicroSecs(0), ftrt()).is_empty());
    assert!(!jb.is_primed());
}

#[test]
fn primes_at_target_and_delivers_one_per_ptime() {
    let mut jb = JitterBuffer::new(JitterConfig {
        target_delay: Ptimes(2),
        ..cfg()
    });
    jb.add(media(0, 0)).unwrap();
    assert!(!jb.is_primed());
    jb.add(media(1, UNITS)).unwrap();
    assert!(jb.is_primed());

    let out = jb.pull(MicroSecs(0), ftrt());
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].seq, 0);

    let out = jb.pull(MicroSecs(0), ftrt());
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].seq, 1);
}

#[test]
fn reorder_within_window() {
    let mut jb = JitterBuffer::new(cfg());
    for &(seq, ts) in &[(0u16, 0u32), (2, 2 * UNITS), (1, UNITS), (3, 3 * UNITS)] {
        jb.add(media(seq, ts)).unwrap();
    }
    let out = jb.pull(MicroSecs(0), drain());
    let seqs: Vec<u16> = out.iter().map(|d| d.seq).collect();
    assert_eq!(seqs, vec![0, 1, 2, 3]);
    assert_eq!(jb.info(InfoItem::InputOoo), 1);
    assert_eq!(jb.info(InfoItem::MaxInputOoo), 1);
    assert_eq!(jb.info(InfoItem::OutputOoo), 0);
    assert_eq!(jb.info(InfoItem::MissingSeqNum), 0);
}

#[test]
fn rfc7198_dedup() {
    let mut jb = JitterBuffer::new(cfg());
    assert_eq!(jb.add(media(0, 0)).unwrap(), AddResult::Buffered);
    assert_eq!(jb.add(media(0, 0)).unwrap(), AddResult::DedupDrop);
    assert_eq!(jb.info(InfoItem::DedupDrops), 1);
}

#[test]
fn dedup_disabled_counts_plain_duplicate() {
    let mut jb = JitterBuffer::new(JitterConfig {
        enable_dedup: false,
        ..cfg()
    });
    assert_eq!(jb.add(media(0, 0)).unwrap(), AddResult::Buffered);
    assert_eq!(jb.add(media(0, 0)).unwrap(), AddResult::DuplicateDrop);
    assert_eq!(jb.info(InfoItem::DuplicateDrops), 1);
}

#[test]
fn rtcp_screened() {
    let mut jb = JitterBuffer::new(cfg());
    let mut pkt = media(0, 0);
    pkt.payload_type = 72;
    assert_eq!(jb.add(pkt).unwrap(), AddResult::RtcpDrop);
}

#[test]
fn single_loss_media_repair() {
    let mut jb = JitterBuffer::new(cfg());
    jb.add(media(0, 0)).unwrap();
    let out = jb.pull(MicroSecs(0), ftrt());
    assert_eq!(out.len(), 1);

    jb.add(media(2, 2 * UNITS)).unwrap();
    jb.add(media(3, 3 * UNITS)).unwrap();
    let out = jb.flush(MicroSecs(0));

    assert_eq!(out.len(), 3);
    assert_eq!(out[0].seq, 1);
    assert!(out[0].flags.has(DeliveredFlags::REPAIRED));
    assert_eq!(out[0].timestamp, UNITS);
    assert_eq!(out[1].seq, 2);
    assert!(!out[1].flags.has(DeliveredFlags::REPAIRED));
    assert_eq!(jb.info(InfoItem::MissingSeqNum), 1);
    assert_eq!(jb.info(InfoItem::RepairedMedia), 1);
}

#[test]
fn long_gap_not_repaired() {
    let mut jb = JitterBuffer::new(JitterConfig {
        max_pkt_repair: Ptimes(3),
        ..cfg()
    });
    jb.add(media(0, 0)).unwrap();
    jb.pull(MicroSecs(0), ftrt());

    jb.add(media(6, 6 * UNITS)).unwrap();
    let out = jb.flush(MicroSecs(0));
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].seq, 6);
    assert!(out[0].flags.has(DeliveredFlags::SEQ_GAP));
    assert_eq!(jb.info(InfoItem::RepairedMedia), 0);
    assert_eq!(jb.info(InfoItem::MissingSeqNum), 5);
    assert_eq!(jb.info(InfoItem::MaxConsecMissingSeqNum), 5);
}

#[test]
fn dtx_expansion_emits_sid_reuse_at_cadence() {
    let mut jb = JitterBuffer::new(cfg());
    jb.add(media(0, 0)).unwrap();
    assert_eq!(jb.pull(MicroSecs(0), ftrt()).len(), 1);

    jb.add(sid(1, UNITS)).unwrap();
    let out = jb.pull(MicroSecs(0), ftrt());
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].kind, PayloadKind::Sid);

    // silence: each further pull expands one SID_REUSE frame
    let out = jb.pull(MicroSecs(0), ftrt());
    assert_eq!(out.len(), 1);
    assert!(out[0].flags.has(DeliveredFlags::SID_REUSE));
    assert_eq!(out[0].timestamp, 2 * UNITS);

    let out = jb.pull(MicroSecs(0), ftrt());
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].timestamp, 3 * UNITS);
    assert_eq!(jb.info(InfoItem::SidReuseGenerated), 2);
}

#[test]
fn dtx_expansion_stops_at_next_media() {
    let mut jb = JitterBuffer::new(cfg());
    jb.add(media(0, 0)).unwrap();
    jb.pull(MicroSecs(0), ftrt());
    jb.add(sid(1, UNITS)).unwrap();
    jb.pull(MicroSecs(0), ftrt());

    // media resumes at ts 2*UNITS: no expansion happens
    jb.add(media(2, 2 * UNITS)).unwrap();
    let out = jb.pull(MicroSecs(0), ftrt());
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].kind, PayloadKind::Media);
    assert_eq!(jb.info(InfoItem::SidReuseGenerated), 0);
}

#[test]
fn sid_loss_repaired_with_sid_reuse() {
    let mut jb = JitterBuffer::new(JitterConfig {
        enable_dtx: false,
        ..cfg()
    });
    jb.add(sid(0, 0)).unwrap();
    let out = jb.pull(MicroSecs(0), ftrt());
    assert_eq!(out.len(), 1);

    // seq 1 lost, seq 2 arrives
    jb.add(sid(2, 2 * UNITS)).unwrap();
    let out = jb.flush(MicroSecs(0));
    assert_eq!(out.len(), 2);
    assert!(out[0].flags.has(DeliveredFlags::SID_REUSE));
    assert_eq!(jb.info(InfoItem::RepairedSid), 1);
}

#[test]
fn large_gap_resync_on_add() {
    let mut jb = JitterBuffer::new(cfg());
    jb.add(media(0, 0)).unwrap();
    jb.pull(MicroSecs(0), ftrt());

    let far = 100 * jb.config().max_timestamp_gap;
    jb.add(media(1, far)).unwrap();
    assert_eq!(jb.info(InfoItem::TimestampGapResyncCount), 1);

    let out = jb.pull(MicroSecs(0), ftrt());
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].timestamp, far);
}

#[test]
fn timestamp_jump_rejected_when_disallowed() {
    let mut jb = JitterBuffer::new(JitterConfig {
        allow_gap_resync: false,
        allow_timestamp_jump: false,
        ..cfg()
    });
    jb.add(media(0, 0)).unwrap();
    jb.pull(MicroSecs(0), ftrt());

    let res = jb.add(media(1, 0x4000_0000)).unwrap();
    assert_eq!(res, AddResult::TimestampJumpDrop);
}

#[test]
fn return_all_suppresses_gap_resync() {
    // documented flag-precedence vector: when return-all is in effect a
    // requested gap resync is ignored and no resync is counted
    let mut jb = JitterBuffer::new(JitterConfig {
        allow_gap_resync: false,
        allow_timestamp_jump: true,
        ..cfg()
    });
    jb.add(media(0, 0)).unwrap();
    jb.add(media(1, 0x2000_0000)).unwrap();

    let flags = PullFlags {
        return_all: true,
        timestamp_gap_resync: true,
        ..Default::default()
    };
    let out = jb.pull(MicroSecs(0), flags);
    assert_eq!(out.len(), 2);
    assert_eq!(jb.info(InfoItem::TimestampGapResyncCount), 0);
}

#[test]
fn overrun_drops_oldest() {
    let mut jb = JitterBuffer::new(JitterConfig {
        target_delay: Ptimes(100), // stay unprimed
        max_depth: Ptimes(4),
        ..Default::default()
    });
    for i in 0..6u16 {
        jb.add(media(i, i as u32 * UNITS)).unwrap();
    }
    assert_eq!(jb.depth_pkts(), 4);
    assert_eq!(jb.info(InfoItem::OverrunResyncCount), 2);
}

#[test]
fn underrun_resync_after_consecutive_empty_pulls() {
    let mut jb = JitterBuffer::new(JitterConfig {
        underrun_resync_pulls: 3,
        max_timestamp_gap: u32::MAX, // keep the add-time screen out of the way
        ..cfg()
    });
    jb.add(media(0, 0)).unwrap();
    assert_eq!(jb.pull(MicroSecs(0), ftrt()).len(), 1);

    // next packet far ahead in timestamp: undeliverable for a while
    jb.add(media(1, 1000 * UNITS)).unwrap();
    for _ in 0..2 {
        assert!(jb.pull(MicroSecs(0), ftrt()).is_empty());
    }
    // third empty pull triggers the resync; the one after delivers
    assert!(jb.pull(MicroSecs(0), ftrt()).is_empty());
    assert_eq!(jb.info(InfoItem::UnderrunResyncCount), 1);
    let out = jb.pull(MicroSecs(0), ftrt());
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].seq, 1);
}

#[test]
fn flush_then_add_rejected() {
    let mut jb = JitterBuffer::new(cfg());
    jb.add(media(0, 0)).unwrap();
    let out = jb.flush(MicroSecs(0));
    assert_eq!(out.len(), 1);
    assert!(jb.is_flushed());
    assert_eq!(jb.add(media(1, UNITS)), Err(Error::ErrFlushed));
}

#[test]
fn probation_gates_delivery() {
    let mut jb = JitterBuffer::new(JitterConfig {
        probation_packets: 2,
        ..cfg()
    });
    jb.add(media(10, 0)).unwrap();
    assert!(jb.pull(MicroSecs(0), ftrt()).is_empty());
    jb.add(media(11, UNITS)).unwrap();
    // two consecutive in-order packets seen: delivery opens
    assert_eq!(jb.pull(MicroSecs(0), ftrt()).len(), 1);
}

#[test]
fn holdoff_delays_single_packet_by_one_ptime() {
    let mut jb = JitterBuffer::new(JitterConfig {
        enable_holdoff: true,
        ..cfg()
    });
    jb.add(media(0, 0)).unwrap();
    assert!(jb.pull(MicroSecs(0), ftrt()).is_empty());
    assert_eq!(jb.info(InfoItem::HoldoffCount), 1);

    let out = jb.pull(MicroSecs(0), ftrt());
    assert_eq!(out.len(), 1);
    assert!(out[0].flags.has(DeliveredFlags::HOLDOFF_DELIVERY));
    assert_eq!(jb.info(InfoItem::HoldoffDeliveries), 1);
}

#[test]
fn wall_clock_window_advances_delivery() {
    let mut jb = JitterBuffer::new(JitterConfig {
        target_delay: Ptimes(2),
        ..cfg()
    });
    jb.add(media(0, 0)).unwrap();
    jb.add(media(1, UNITS)).unwrap();
    jb.add(media(2, 2 * UNITS)).unwrap();

    // first pull establishes the base time and opens one ptime of window
    let out = jb.pull(MicroSecs(1_000_000), PullFlags::default());
    assert_eq!(out.len(), 1);

    // 40 ms later two more intervals are due
    let out = jb.pull(MicroSecs(1_040_000), PullFlags::default());
    assert_eq!(out.len(), 2);
}

#[test]
fn pulled_never_exceeds_added_plus_generated() {
    let mut jb = JitterBuffer::new(cfg());
    for i in 0..20u16 {
        if i != 7 && i != 13 {
            jb.add(media(i, i as u32 * UNITS)).unwrap();
        }
    }
    let mut total = 0;
    for _ in 0..30 {
        total += jb.pull(MicroSecs(0), ftrt()).len() as i64;
    }
    total += jb.flush(MicroSecs(0)).len() as i64;

    let ceiling = jb.info(InfoItem::InputPktCount)
        + jb.info(InfoItem::RepairedMedia)
        + jb.info(InfoItem::RepairedSid)
        + jb.info(InfoItem::SidReuseGenerated);
    assert!(total <= ceiling, "delivered {total} > ceiling {ceiling}");
    assert_eq!(jb.info(InfoItem::OutputPktCount), total);
}

#[test]
fn set_info_adjusts_delays() {
    let mut jb = JitterBuffer::new(cfg());
    jb.set_info(SetItem::TargetDelay, 14).unwrap();
    assert_eq!(jb.info(InfoItem::TargetDelay), 14);
    jb.set_info(SetItem::SidRepairEnable, 0).unwrap();
    assert_eq!(jb.info(InfoItem::SidRepairEnable), 0);
    assert!(jb.set_info(SetItem::MaxDepthPtimes, 0).is_err());

    jb.add(media(0, 0)).unwrap();
    jb.set_info(SetItem::StatsReset, 0).unwrap();
    assert_eq!(jb.info(InfoItem::InputPktCount), 0);
}
