use super::*;

fn entry(seq: u16, disp: Disposition, at: u64) -> HistoryEntry {
    HistoryEntry {
        seq,
        rtp_timestamp: seq as u32 * 160,
        arrival_us: at,
        disposition: disp,
    }
}

#[test]
fn chunked_growth_and_reset() {
    let mut h = ChannelHistory::new(10_000);
    for i in 0..(CHUNK_ENTRIES + 5) {
        h.push(entry(i as u16, Disposition::Added, i as u64));
    }
    assert_eq!(h.len(), CHUNK_ENTRIES + 5);
    h.reset();
    assert!(h.is_empty());
    assert_eq!(h.dropped_for_capacity, 0);
}

#[test]
fn capacity_cap_counts_drops() {
    let mut h = ChannelHistory::new(4);
    for i in 0..6 {
        h.push(entry(i, Disposition::Added, i as u64));
    }
    assert_eq!(h.len(), 4);
    assert_eq!(h.dropped_for_capacity, 2);
}

#[test]
fn analysis_counts_dispositions() {
    let ph = PacketHistory::new(1000);
    ph.record(3, entry(0, Disposition::Added, 0));
    ph.record(3, entry(1, Disposition::Added, 10));
    ph.record(3, entry(3, Disposition::Added, 20));
    ph.record(3, entry(2, Disposition::Added, 30)); // reordered
    ph.record(3, entry(0, Disposition::Delivered, 40));
    ph.record(3, entry(1, Disposition::Delivered, 50));
    ph.record(3, entry(2, Disposition::Repaired, 60));
    ph.record(3, entry(9, Disposition::Duplicate, 70));

    let a = ph.analyze(3);
    assert_eq!(a.input, 4);
    assert_eq!(a.output, 3);
    assert_eq!(a.repaired, 1);
    assert_eq!(a.reordered, 1);
    assert_eq!(a.duplicates, 1);

    // unknown channel analyzes to zeroes
    assert_eq!(ph.analyze(99), ChannelAnalysis::default());
}

#[test]
fn write_log_produces_sorted_file() {
    let ph = PacketHistory::new(1000);
    ph.record(1, entry(2, Disposition::Added, 200));
    ph.record(1, entry(1, Disposition::Added, 100));
    ph.record(1, entry(1, Disposition::Delivered, 300));

    let mut path = std::env::temp_dir();
    path.push(format!("mf_pkt_log_{}.txt", std::process::id()));
    ph.write_log(&path).unwrap();

    let contents = std::fs::read_to_string(&path).unwrap();
    assert!(contents.contains("channel 1: 2 in, 1 out"));
    let p1 = contents.find("seq     1").unwrap();
    let p2 = contents.find("seq     2").unwrap();
    assert!(p1 < p2, "entries sorted by arrival time");
    std::fs::remove_file(&path).ok();
}
