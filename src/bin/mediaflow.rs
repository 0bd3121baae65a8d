#![allow(dead_code)]

//! Ingest-side driver: opens pcap inputs, pushes packets into the engine
//! at a real-time, fixed or auto-adjusted rate, pulls the jitter-buffer /
//! transcoded / stream-group egress categories, and writes pcap and wav
//! sinks. Repeats inputs and handles a small command set on stdin.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufWriter};
use std::path::PathBuf;
use std::sync::mpsc;
use std::time::Duration;

use bytes::Bytes;
use clap::{Arg, Command};
use log::{info, warn};

use mediaflow::eventlog::{EventLog, EventLogConfig, LogBridge, LogMode};
use mediaflow::group::WavWriter;
use mediaflow::packet::WireOrder;
use mediaflow::pcap::{open_capture, open_pcap_writer, strip_link_layer, LinkType, PcapWriter};
use mediaflow::queue::Category;
use mediaflow::session::{SessionId, ThreadAssignment};
use mediaflow::util::time::{MicroSecs, MilliSecs};
use mediaflow::{
    AutoRateController, DynamicDefaults, Engine, EngineConfig, L16Factory, ServiceAction,
    ServiceMode,
};

// -d mode bitfield
const DYNAMIC_CALL: u64 = 1 << 0;
const COMBINE_CALLS: u64 = 1 << 1;
const USE_PACKET_ARRIVAL_TIMES: u64 = 1 << 2;
const ANALYTICS_MODE: u64 = 1 << 3;
const ENABLE_AUTO_ADJUST_PUSH_RATE: u64 = 1 << 4;
const REPEAT_INPUTS: u64 = 1 << 5;
const ENABLE_STREAM_GROUPS: u64 = 1 << 6;
const ENABLE_WAV_OUTPUT: u64 = 1 << 7;
const ROUND_ROBIN_SESSION_ALLOCATION: u64 = 1 << 8;
const WHOLE_GROUP_THREAD_ALLOCATE: u64 = 1 << 9;
const ENABLE_STREAM_GROUP_DEDUPLICATION: u64 = 1 << 10;
const DISABLE_DTX_HANDLING: u64 = 1 << 11;
const DISABLE_FLC: u64 = 1 << 12;
const DISABLE_PACKET_REPAIR: u64 = 1 << 13;
const ENABLE_TIMING_MARKERS: u64 = 1 << 14;
const ENABLE_PACKET_INPUT_ALARM: u64 = 1 << 15;
const ENABLE_MEM_STATS: u64 = 1 << 16;
const ENERGY_SAVER_TEST: u64 = 1 << 17;
const START_THREADS_FIRST: u64 = 1 << 18;
const CREATE_DELETE_TEST: u64 = 1 << 19;
const CREATE_DELETE_TEST_PCAP: u64 = 1 << 20;
const ENABLE_RANDOM_WAIT: u64 = 1 << 21;
const DISABLE_AUTOQUIT: u64 = 1 << 22;

struct Args {
    inputs: Vec<PathBuf>,
    out_prefix: String,
    log_file: Option<PathBuf>,
    rate_ms: u64,
    mode: u64,
    repeats: u32,
    jitter_target: u32,
    jitter_max: u32,
    threads: usize,
}

fn parse_args() -> Args {
    let m = Command::new("mediaflow")
        .about("real-time media packet processing driver")
        .arg(Arg::new("input").short('i').multiple_occurrences(true).takes_value(true))
        .arg(Arg::new("output").short('o').takes_value(true).default_value("mediaflow_out"))
        .arg(Arg::new("config").short('C').takes_value(true))
        .arg(Arg::new("log").short('L').takes_value(true))
        .arg(Arg::new("rate").short('r').takes_value(true).default_value("20"))
        .arg(Arg::new("mode").short('d').takes_value(true).default_value("0x1"))
        .arg(Arg::new("repeat").short('R').takes_value(true).default_value("1"))
        .arg(Arg::new("jitter").short('j').takes_value(true).default_value("0x0e0a"))
        .arg(Arg::new("threads").short('t').takes_value(true).default_value("1"))
        .get_matches();

    let mode_str = m.value_of("mode").unwrap();
    let mode = u64::from_str_radix(mode_str.trim_start_matches("0x"), 16).unwrap_or(DYNAMIC_CALL);
    let jitter = m
        .value_of("jitter")
        .map(|j| u32::from_str_radix(j.trim_start_matches("0x"), 16).unwrap_or(0x0e0a))
        .unwrap_or(0x0e0a);

    Args {
        inputs: m
            .values_of("input")
            .map(|v| v.map(PathBuf::from).collect())
            .unwrap_or_default(),
        out_prefix: m.value_of("output").unwrap().to_string(),
        log_file: m.value_of("log").map(PathBuf::from),
        rate_ms: m.value_of("rate").unwrap().parse().unwrap_or(20),
        mode,
        repeats: m.value_of("repeat").unwrap().parse().unwrap_or(1),
        jitter_target: jitter & 0xFF,
        jitter_max: (jitter >> 8) & 0xFF,
        threads: m.value_of("threads").unwrap().parse().unwrap_or(1),
    }
}

/// Duplicated command-line inputs get distinct flows: bump the UDP ports
/// and SSRC in place. Driver-level behavior only; the engine never sees
/// the original tuple. IPv4 UDP checksum is cleared (legal per RFC 768).
fn apply_input_dedup_rewrite(data: &mut [u8], nth_dup: u16) {
    if data.is_empty() || data[0] >> 4 != 4 {
        return;
    }
    let ihl = ((data[0] & 0x0F) as usize) * 4;
    if data.len() < ihl + 8 + 12 {
        return;
    }
    for port_ofs in [ihl, ihl + 2] {
        let port = u16::from_be_bytes([data[port_ofs], data[port_ofs + 1]]);
        let new = port.wrapping_add(nth_dup * 2);
        data[port_ofs..port_ofs + 2].copy_from_slice(&new.to_be_bytes());
    }
    data[ihl + 6] = 0;
    data[ihl + 7] = 0; // UDP checksum
    let ssrc_ofs = ihl + 8 + 8;
    let ssrc = u32::from_be_bytes([
        data[ssrc_ofs],
        data[ssrc_ofs + 1],
        data[ssrc_ofs + 2],
        data[ssrc_ofs + 3],
    ]);
    data[ssrc_ofs..ssrc_ofs + 4].copy_from_slice(&ssrc.wrapping_add(nth_dup as u32).to_be_bytes());
}

struct LoadedInput {
    records: Vec<(MicroSecs, Bytes)>,
    dup_index: u16,
}

fn load_inputs(args: &Args) -> Vec<LoadedInput> {
    let mut seen: HashMap<PathBuf, u16> = HashMap::new();
    let mut out = Vec::new();
    for path in &args.inputs {
        let dup_index = {
            let e = seen.entry(path.clone()).or_insert(0);
            let v = *e;
            *e += 1;
            v
        };
        let mut records = Vec::new();
        match open_capture(path) {
            Ok(mut reader) => loop {
                match reader.next_record() {
                    Ok(Some(rec)) => {
                        match strip_link_layer(rec.link_type, rec.data) {
                            Ok(ip) => {
                                let mut bytes = ip.to_vec();
                                if dup_index > 0 {
                                    apply_input_dedup_rewrite(&mut bytes, dup_index);
                                }
                                records.push((rec.ts, Bytes::from(bytes)));
                            }
                            Err(e) => warn!("{}: skipping frame: {e}", path.display()),
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        warn!("{}: read error: {e}", path.display());
                        break;
                    }
                }
            },
            Err(e) => {
                warn!("{}: open failed: {e}", path.display());
            }
        }
        info!("loaded {} packets from {}", records.len(), path.display());
        out.push(LoadedInput { records, dup_index });
    }
    out
}

struct Sinks {
    prefix: String,
    transcoded: HashMap<SessionId, PcapWriter<BufWriter<File>>>,
    jb: HashMap<SessionId, PcapWriter<BufWriter<File>>>,
    group: HashMap<SessionId, PcapWriter<BufWriter<File>>>,
    group_wav: HashMap<SessionId, WavWriter<BufWriter<File>>>,
    wav_enabled: bool,
    sample_rate: u32,
}

impl Sinks {
    fn write(&mut self, cat: Category, pkt: &mediaflow::queue::QueuedPacket) {
        let (map, suffix) = match cat {
            Category::Transcoded => (&mut self.transcoded, String::new()),
            Category::JitterBuffer => (&mut self.jb, "_jb".to_string()),
            Category::StreamGroup => (&mut self.group, "_group".to_string()),
        };
        let w = map.entry(pkt.session).or_insert_with(|| {
            let path = format!("{}{}{}.pcap", self.prefix, suffix, pkt.session);
            open_pcap_writer(&path, LinkType::RawIp).expect("open output pcap")
        });
        if let Err(e) = w.write_record(pkt.ts, &pkt.data) {
            warn!("pcap write failed: {e}");
        }

        if cat == Category::StreamGroup && self.wav_enabled {
            // group payloads are L16 under the built-in codec factory
            if let Ok(view) =
                mediaflow::packet::PacketView::parse(pkt.data.clone(), WireOrder::Network)
            {
                let rate = self.sample_rate;
                let w = self.group_wav.entry(pkt.session).or_insert_with(|| {
                    let path = format!("{}_group{}.wav", self.prefix, pkt.session);
                    WavWriter::new(
                        BufWriter::new(File::create(path).expect("open group wav")),
                        1,
                        rate,
                    )
                    .expect("wav header")
                });
                let samples: Vec<i16> = view
                    .payload()
                    .chunks_exact(2)
                    .map(|c| i16::from_be_bytes([c[0], c[1]]))
                    .collect();
                let _ = w.write_samples(&samples);
            }
        }
    }

    fn close(&mut self) {
        for w in self.transcoded.values_mut().chain(self.jb.values_mut()) {
            let _ = w.flush();
        }
        for w in self.group.values_mut() {
            let _ = w.flush();
        }
        for w in self.group_wav.values_mut() {
            let _ = w.close();
        }
    }
}

fn spawn_stdin_reader() -> mpsc::Receiver<char> {
    let (tx, rx) = mpsc::channel();
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            for c in line.chars() {
                if tx.send(c).is_err() {
                    return;
                }
            }
        }
    });
    rx
}

fn main() {
    let args = parse_args();

    // event log owns the file and screen; engine warn!/info! lines are
    // bridged into it
    let event_log = args.log_file.as_ref().map(|path| {
        EventLog::spawn(EventLogConfig {
            mode: LogMode::Both,
            path: Some(path.clone()),
            ..Default::default()
        })
        .expect("event log open")
    });
    match &event_log {
        Some(log) => {
            let _ = LogBridge::install(log.handle());
        }
        None => env_logger::init(),
    }

    let mode = args.mode;
    let cfg = EngineConfig {
        num_workers: args.threads.clamp(1, mediaflow::MAX_PKT_MEDIA_THREADS),
        enable_push_alarm: mode & ENABLE_PACKET_INPUT_ALARM != 0,
        energy_saver_inactivity: if mode & ENERGY_SAVER_TEST != 0 {
            MilliSecs(100)
        } else {
            MilliSecs(20_000)
        },
        ..Default::default()
    };

    let mut engine = Engine::new(cfg, Box::new(L16Factory)).expect("engine config");
    if mode & DYNAMIC_CALL != 0 {
        let group = (mode & (COMBINE_CALLS | ENABLE_STREAM_GROUPS) != 0)
            .then(|| "combined".to_string());
        engine = engine.with_dynamic_sessions(group);
    }
    engine = engine.with_dynamic_defaults(DynamicDefaults {
        assignment: if mode & ROUND_ROBIN_SESSION_ALLOCATION != 0 {
            ThreadAssignment::RoundRobin
        } else if mode & WHOLE_GROUP_THREAD_ALLOCATE != 0 {
            ThreadAssignment::WholeGroup
        } else {
            ThreadAssignment::Linear
        },
        dtx_enable: mode & DISABLE_DTX_HANDLING == 0,
        packet_repair_enable: mode & DISABLE_PACKET_REPAIR == 0,
        sid_repair_enable: mode & DISABLE_PACKET_REPAIR == 0,
        group_flc: mode & DISABLE_FLC == 0,
        group_dedup: mode & ENABLE_STREAM_GROUP_DEDUPLICATION != 0,
        timing_markers: mode & ENABLE_TIMING_MARKERS != 0,
        jitter_target: Some(args.jitter_target.max(1)),
        jitter_max: Some(args.jitter_max.max(args.jitter_target.max(1))),
        ..Default::default()
    });
    if let Some(log) = &event_log {
        engine = engine.with_event_log(log.handle());
    }

    // START_THREADS_FIRST is the default ordering here: no static session
    // config is loaded, so workers always start before sessions exist
    let _ = mode & START_THREADS_FIRST;
    engine
        .config_media_service(ServiceAction::Start(ServiceMode::Thread))
        .expect("start media service");

    let inputs = load_inputs(&args);
    let total_packets: usize = inputs.iter().map(|i| i.records.len()).sum();
    if total_packets == 0 {
        warn!("no input packets, exiting");
        return;
    }

    let mut sinks = Sinks {
        prefix: args.out_prefix.clone(),
        transcoded: HashMap::new(),
        jb: HashMap::new(),
        group: HashMap::new(),
        group_wav: HashMap::new(),
        wav_enabled: mode & ENABLE_WAV_OUTPUT != 0,
        sample_rate: 8000,
    };

    let stdin_rx = spawn_stdin_reader();
    let mut rate = AutoRateController::new(1, 2000, 64_000);
    let mut paused = false;
    let mut quit = false;

    for repeat in 0..args.repeats.max(1) {
        if quit {
            break;
        }
        if repeat > 0 {
            if let Some(log) = &event_log {
                log.info(format!("================ repeating, pass {}", repeat + 1));
            }
            info!("repeating inputs, pass {}", repeat + 1);
        }

        let mut cursors: Vec<usize> = inputs.iter().map(|_| 0).collect();
        let start = engine.now();

        loop {
            if quit {
                break;
            }
            for c in stdin_rx.try_iter() {
                match c {
                    'q' => quit = true,
                    'p' => paused = !paused,
                    's' => {
                        info!("sessions: {}", engine.num_sessions());
                    }
                    'd' | 't' => {
                        for t in 0..args.threads {
                            if let Ok(snap) = engine.get_thread_info(t) {
                                info!(
                                    "thread {t}: state {:?}, {} sessions, {} ticks, buffer avg {} us",
                                    snap.state,
                                    snap.stats.num_sessions,
                                    snap.stats.ticks,
                                    snap.stats.buffer.avg_us()
                                );
                            }
                        }
                    }
                    '+' => rate.sample([0usize]),  // nudge up
                    '-' => rate.sample([usize::MAX]), // reset
                    _ => {}
                }
            }
            if paused {
                std::thread::sleep(Duration::from_millis(20));
                continue;
            }

            // push phase
            let mut pushed_any = false;
            let mut remaining = false;
            let burst = if mode & ENABLE_AUTO_ADJUST_PUSH_RATE != 0 {
                rate.value() as usize
            } else {
                1
            };
            for (input, cursor) in inputs.iter().zip(cursors.iter_mut()) {
                for _ in 0..burst {
                    if *cursor >= input.records.len() {
                        break;
                    }
                    let (ts, data) = &input.records[*cursor];
                    if mode & USE_PACKET_ARRIVAL_TIMES != 0 && mode & ANALYTICS_MODE == 0 {
                        let base = input.records[0].0;
                        let due = start + ts.saturating_sub(base);
                        if engine.now() < due {
                            break;
                        }
                    }
                    match engine.push_packet(-1, data.clone()) {
                        Ok(true) => {
                            *cursor += 1;
                            pushed_any = true;
                        }
                        Ok(false) => break, // queue full or unmatched
                        Err(e) => {
                            warn!("push failed: {e}");
                            *cursor += 1;
                        }
                    }
                }
                if *cursor < input.records.len() {
                    remaining = true;
                }
            }

            // pull phase: all sessions, all categories
            for cat in Category::ALL {
                for pkt in engine.pull_packets(-1, cat, 256) {
                    sinks.write(cat, &pkt);
                }
            }

            if mode & ENABLE_AUTO_ADJUST_PUSH_RATE != 0 {
                let levels: Vec<usize> = (0..engine.config().max_sessions as i32)
                    .map(|s| engine.egress_level(s, Category::Transcoded))
                    .collect();
                rate.sample(levels);
            }

            if mode & ENABLE_RANDOM_WAIT != 0 {
                let wait: u64 = rand::random::<u64>() % 5;
                std::thread::sleep(Duration::from_millis(wait));
            }

            if !remaining {
                break;
            }
            if !pushed_any {
                std::thread::sleep(Duration::from_millis(if mode & ANALYTICS_MODE != 0 {
                    1
                } else {
                    args.rate_ms.max(1)
                }));
            }
        }

        // end of inputs: flush sessions, drain egress, delete
        let sessions: Vec<SessionId> = (0..engine.config().max_sessions as i32)
            .filter(|&s| engine.get_session_info(s).is_ok())
            .collect();
        for &s in &sessions {
            let _ = engine.flush_session(s);
        }
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        loop {
            for cat in Category::ALL {
                for pkt in engine.pull_packets(-1, cat, 256) {
                    sinks.write(cat, &pkt);
                }
            }
            let drained = sessions.iter().all(|&s| engine.egress_empty(s));
            if drained || std::time::Instant::now() > deadline {
                break;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        for &s in &sessions {
            let _ = engine.log_packet_time_loss_stats(s);
            let _ = engine.delete_session(s);
        }
        // wait for workers to finalize deletes so repeats start clean
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while engine.num_sessions() > 0 && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    let pkt_log = format!("{}_pkt_log.txt", args.out_prefix);
    if let Err(e) = engine.write_packet_stats_history_log(&pkt_log) {
        warn!("packet stats log failed: {e}");
    }

    sinks.close();
    let _ = engine.config_media_service(ServiceAction::Exit);

    if mode & DISABLE_AUTOQUIT != 0 {
        info!("autoquit disabled, 'q' to exit");
        for c in stdin_rx.iter() {
            if c == 'q' {
                break;
            }
        }
    }

    info!("done: {total_packets} packets in");
}
