pub(crate) mod pipeline;
pub(crate) mod scheduler;

use std::collections::HashMap;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;

use bytes::Bytes;
use eventlog::{EventLogHandle, PacketHistory};
use group::{ContributorConfig, GroupConfig, GroupMixer};
use jitter::{JitterBuffer, JitterConfig};
use log::{info, warn};
use packet::{ChannelFormatState, FormatOptions, PacketView, WireOrder};
use parking_lot::{Condvar, Mutex};
use portable_atomic::{AtomicI32, AtomicU32, AtomicU64, Ordering};
use queue::{Category, QueuedPacket, SessionQueues};
use session::{CreateFlags, Registry, SessionData, SessionId, Termination, ThreadAssignment};
use util::time::{MicroSecs, MilliSecs, Ptimes};

use crate::codec::{CodecFactory, MediaCodec};
use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::stats::{WorkerHotStats, WorkerSnapshot, WorkerState};

/// How the service loop runs: worker threads owned by the engine, or the
/// app thread calling [`Engine::service_app_tick`] itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceMode {
    Thread,
    App,
}

/// Media-service control actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceAction {
    Start(ServiceMode),
    EnableProfiling,
    DisableProfiling,
    Exit,
}

/// Writable session attributes.
#[derive(Debug, Clone)]
pub enum SessionInfoSet {
    Name(String),
    DormantSsrcDetect { side: session::TermSide, enable: bool },
}

/// Defaults applied to dynamically created sessions and their groups.
#[derive(Debug, Clone)]
pub struct DynamicDefaults {
    pub assignment: ThreadAssignment,
    pub dtx_enable: bool,
    pub packet_repair_enable: bool,
    pub sid_repair_enable: bool,
    pub rfc7198_dedup: bool,
    pub group_flc: bool,
    pub group_dedup: bool,
    pub timing_markers: bool,
    /// Jitter buffer delays in ptime units; `None` keeps the termination
    /// defaults.
    pub jitter_target: Option<u32>,
    pub jitter_max: Option<u32>,
}

impl Default for DynamicDefaults {
    fn default() -> Self {
        DynamicDefaults {
            assignment: ThreadAssignment::Linear,
            dtx_enable: true,
            packet_repair_enable: true,
            sid_repair_enable: true,
            rfc7198_dedup: true,
            group_flc: true,
            group_dedup: false,
            timing_markers: false,
            jitter_target: None,
            jitter_max: None,
        }
    }
}

pub(crate) struct ChannelRuntime {
    pub chan: session::ChanId,
    pub jb: Option<JitterBuffer>,
    pub decoder: Box<dyn MediaCodec>,
    pub encoder: Box<dyn MediaCodec>,
    /// Outbound header state toward the opposite endpoint.
    pub format: ChannelFormatState,
    pub preserve_seqnum: bool,
    /// Payloads at or under this length classify as SID when DTX is on.
    pub sid_threshold: usize,
    pub dtx_enable: bool,
}

pub(crate) struct SessionRuntime {
    pub id: SessionId,
    pub rt1: ChannelRuntime,
    pub rt2: ChannelRuntime,
    /// RFC 8108 child channel runtimes, keyed by channel id.
    pub children: HashMap<session::ChanId, ChannelRuntime>,
    pub flags: CreateFlags,
    pub term1: Termination,
    pub term2: Termination,
    pub group_id: Option<String>,
    pub group_contributor_chan: Option<session::ChanId>,
    /// Group egress: encoder and header state for mixed output.
    pub group_encoder: Option<Box<dyn MediaCodec>>,
    pub group_format: Option<ChannelFormatState>,
    pub flushed: bool,
}

pub(crate) struct MixerEntry {
    pub mixer: GroupMixer,
    pub owner: SessionId,
    pub last_mix: Option<MicroSecs>,
}

pub(crate) struct WorkerShared {
    pub assigned: Mutex<Vec<SessionId>>,
    pub state: AtomicU32,
    pub snapshot: Mutex<WorkerHotStats>,
    pub profiling: portable_atomic::AtomicBool,
    pub wake_lock: Mutex<()>,
    pub wake: Condvar,
}

impl WorkerShared {
    fn new() -> Self {
        WorkerShared {
            assigned: Mutex::new(Vec::new()),
            state: AtomicU32::new(WorkerState::Run.as_u32()),
            snapshot: Mutex::new(WorkerHotStats::default()),
            profiling: portable_atomic::AtomicBool::new(true),
            wake_lock: Mutex::new(()),
            wake: Condvar::new(),
        }
    }
}

pub(crate) struct Shared {
    pub cfg: EngineConfig,
    pub registry: Mutex<Registry>,
    pub runtimes: Vec<Mutex<Option<SessionRuntime>>>,
    pub queues: Vec<SessionQueues>,
    pub mixers: Mutex<HashMap<String, MixerEntry>>,
    pub history: PacketHistory,
    pub event_log: Option<EventLogHandle>,
    /// 1 = run, 0 = graceful stop, negative = fatal stop.
    pub run: AtomicI32,
    pub workers: Vec<Arc<WorkerShared>>,
    pub codec_factory: Box<dyn CodecFactory>,
    pub epoch: Instant,
    /// Engine-clock micros of the most recent push, for the energy saver
    /// and the push-inactivity alarm.
    pub last_push: AtomicU64,
    pub next_rr_worker: AtomicU32,
    /// Dynamic session creation on unmatched packets.
    pub dynamic_mode: bool,
    /// Group id applied to dynamically created sessions (combine-calls).
    pub dynamic_group: Option<String>,
    pub dynamic_defaults: DynamicDefaults,
}

impl Shared {
    pub fn now(&self) -> MicroSecs {
        MicroSecs(self.epoch.elapsed().as_micros() as u64)
    }

    pub fn log_warning(&self, text: String) {
        if let Some(log) = &self.event_log {
            log.warning(text.clone());
        }
        warn!("{text}");
    }

    pub fn log_info(&self, text: String) {
        if let Some(log) = &self.event_log {
            log.info(text.clone());
        }
        info!("{text}");
    }
}

/// The packet/media engine: session registry, queues, jitter buffers,
/// stream groups and the worker pool, owned as one explicit value. No
/// global state; every API call goes through a handle to this.
pub struct Engine {
    pub(crate) shared: Arc<Shared>,
    worker_joins: Mutex<Vec<JoinHandle<()>>>,
    service_mode: Mutex<Option<ServiceMode>>,
}

impl Engine {
    pub fn new(cfg: EngineConfig, codec_factory: Box<dyn CodecFactory>) -> Result<Engine> {
        cfg.validate()?;
        let registry = Registry::new(cfg.max_sessions, cfg.max_stream_groups)
            .with_ssrc_run_threshold(cfg.ssrc_run_threshold);
        let runtimes = (0..cfg.max_sessions).map(|_| Mutex::new(None)).collect();
        let queues = (0..cfg.max_sessions)
            .map(|_| SessionQueues::new(cfg.queue_capacity))
            .collect();
        let workers = (0..cfg.num_workers)
            .map(|_| Arc::new(WorkerShared::new()))
            .collect();
        let history = PacketHistory::new(cfg.max_history_entries_per_chan);

        Ok(Engine {
            shared: Arc::new(Shared {
                registry: Mutex::new(registry),
                runtimes,
                queues,
                mixers: Mutex::new(HashMap::new()),
                history,
                event_log: None,
                run: AtomicI32::new(1),
                workers,
                codec_factory,
                epoch: Instant::now(),
                last_push: AtomicU64::new(0),
                next_rr_worker: AtomicU32::new(0),
                dynamic_mode: false,
                dynamic_group: None,
                dynamic_defaults: DynamicDefaults::default(),
                cfg,
            }),
            worker_joins: Mutex::new(Vec::new()),
            service_mode: Mutex::new(None),
        })
    }

    /// Builder-style knobs that must be set before the service starts.
    pub fn with_event_log(mut self, handle: EventLogHandle) -> Engine {
        Arc::get_mut(&mut self.shared)
            .expect("set before starting the service")
            .event_log = Some(handle);
        self
    }

    pub fn with_dynamic_sessions(mut self, group: Option<String>) -> Engine {
        let s = Arc::get_mut(&mut self.shared).expect("set before starting the service");
        s.dynamic_mode = true;
        s.dynamic_group = group;
        self
    }

    pub fn with_dynamic_defaults(mut self, defaults: DynamicDefaults) -> Engine {
        Arc::get_mut(&mut self.shared)
            .expect("set before starting the service")
            .dynamic_defaults = defaults;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.shared.cfg
    }

    pub fn now(&self) -> MicroSecs {
        self.shared.now()
    }

    // ---- service control ----------------------------------------------

    /// Starts, stops or reconfigures the media service.
    pub fn config_media_service(&self, action: ServiceAction) -> Result<()> {
        match action {
            ServiceAction::Start(mode) => {
                let mut cur = self.service_mode.lock();
                if cur.is_some() {
                    return Err(Error::AlreadyRunning);
                }
                *cur = Some(mode);
                if mode == ServiceMode::Thread {
                    let mut joins = self.worker_joins.lock();
                    for idx in 0..self.shared.cfg.num_workers {
                        let shared = Arc::clone(&self.shared);
                        let join = std::thread::Builder::new()
                            .name(format!("mf-worker-{idx}"))
                            .spawn(move || scheduler::worker_main(shared, idx))?;
                        joins.push(join);
                    }
                }
                Ok(())
            }
            ServiceAction::EnableProfiling => {
                for w in &self.shared.workers {
                    w.profiling.store(true, Ordering::Relaxed);
                }
                Ok(())
            }
            ServiceAction::DisableProfiling => {
                for w in &self.shared.workers {
                    w.profiling.store(false, Ordering::Relaxed);
                }
                Ok(())
            }
            ServiceAction::Exit => {
                self.shared.run.store(0, Ordering::SeqCst);
                for w in &self.shared.workers {
                    let _guard = w.wake_lock.lock();
                    w.wake.notify_all();
                }
                let mut joins = self.worker_joins.lock();
                for j in joins.drain(..) {
                    let _ = j.join();
                }
                *self.service_mode.lock() = None;
                Ok(())
            }
        }
    }

    /// Per-worker stats snapshot, published at tick boundaries.
    pub fn get_thread_info(&self, thread: usize) -> Result<WorkerSnapshot> {
        let w = self
            .shared
            .workers
            .get(thread)
            .ok_or(Error::BadThreadIndex(thread))?;
        Ok(WorkerSnapshot {
            thread_index: thread,
            state: WorkerState::from_u32(w.state.load(Ordering::Relaxed)),
            stats: w.snapshot.lock().clone(),
        })
    }

    // ---- session lifecycle --------------------------------------------

    pub fn create_session(&self, data: SessionData, flags: CreateFlags) -> Result<SessionId> {
        let mut reg = self.shared.registry.lock();
        let id = reg.create(data, flags)?;
        self.finish_create(&mut reg, id, flags.assignment)?;
        Ok(id)
    }

    fn finish_create(
        &self,
        reg: &mut Registry,
        id: SessionId,
        assignment: ThreadAssignment,
    ) -> Result<()> {
        let sess = reg.session(id)?.clone();

        // worker placement
        let worker = self.pick_worker(reg, &sess, assignment);
        reg.session_mut(id)?.thread = Some(worker);
        {
            let mut assigned = self.shared.workers[worker].assigned.lock();
            assigned.push(id);
        }

        // drain any stale packets left in the reused queue slot
        let q = &self.shared.queues[id as usize];
        while !q.ingress.pull(64).is_empty() {}
        for cat in Category::ALL {
            while !q.egress(cat).pull(64).is_empty() {}
        }

        let runtime = self.build_runtime(&sess)?;
        *self.shared.runtimes[id as usize].lock() = Some(runtime);

        // group wiring
        if let Some(gid) = group_id_of(&sess.data) {
            let mut mixers = self.shared.mixers.lock();
            let rec_owner = reg.group(&gid).map(|g| g.owner).unwrap_or(id);
            let entry = mixers.entry(gid.clone()).or_insert_with(|| {
                let gt = sess
                    .data
                    .group_term
                    .as_ref()
                    .unwrap_or(&sess.data.term2);
                let d = &self.shared.dynamic_defaults;
                MixerEntry {
                    mixer: GroupMixer::new(GroupConfig {
                        id: gid.clone(),
                        ptime: gt.ptime,
                        sample_rate: gt.sample_rate,
                        enable_flc: d.group_flc,
                        enable_dedup: d.group_dedup,
                        enable_timing_markers: d.timing_markers,
                        enable_alignment_markers: d.group_dedup,
                        ..Default::default()
                    }),
                    owner: rec_owner,
                    last_mix: None,
                }
            });
            entry
                .mixer
                .add_contributor(sess.chan1, ContributorConfig::default())?;
        }
        Ok(())
    }

    fn pick_worker(
        &self,
        reg: &Registry,
        sess: &session::Session,
        assignment: ThreadAssignment,
    ) -> usize {
        let n = self.shared.cfg.num_workers;
        match assignment {
            ThreadAssignment::RoundRobin => {
                (self.shared.next_rr_worker.fetch_add(1, Ordering::Relaxed) as usize) % n
            }
            ThreadAssignment::WholeGroup => {
                if let Some(gid) = group_id_of(&sess.data) {
                    if let Some(rec) = reg.group(&gid) {
                        for &m in &rec.members {
                            if m != sess.id {
                                if let Ok(s) = reg.session(m) {
                                    if let Some(t) = s.thread {
                                        return t;
                                    }
                                }
                            }
                        }
                    }
                }
                self.pick_linear()
            }
            ThreadAssignment::Linear => self.pick_linear(),
        }
    }

    fn pick_linear(&self) -> usize {
        let cap = self.shared.cfg.linear_capacity_sessions;
        for (i, w) in self.shared.workers.iter().enumerate() {
            if w.assigned.lock().len() < cap {
                return i;
            }
        }
        self.shared.workers.len() - 1
    }

    fn build_runtime(&self, sess: &session::Session) -> Result<SessionRuntime> {
        let d = &sess.data;
        let rt1 = self.build_channel(sess, &d.term1, &d.term2, sess.chan1)?;
        let rt2 = self.build_channel(sess, &d.term2, &d.term1, sess.chan2)?;

        let group_id = group_id_of(d);
        let (group_encoder, group_format) = if group_id.is_some() {
            let gt = d.group_term.as_ref().unwrap_or(&d.term2);
            let enc = self
                .shared
                .codec_factory
                .create(gt.codec, gt.bitrate, gt.sample_rate);
            let fmt = ChannelFormatState::new(
                gt.local,
                gt.remote,
                gt.payload_type,
                rand::random::<u32>(),
                gt.units_per_ptime(),
            );
            (Some(enc), Some(fmt))
        } else {
            (None, None)
        };

        Ok(SessionRuntime {
            id: sess.id,
            rt1,
            rt2,
            children: HashMap::new(),
            flags: sess.flags,
            term1: d.term1.clone(),
            term2: d.term2.clone(),
            group_contributor_chan: group_id.as_ref().map(|_| sess.chan1),
            group_id,
            group_encoder,
            group_format,
            flushed: false,
        })
    }

    fn build_channel(
        &self,
        sess: &session::Session,
        term_in: &Termination,
        term_out: &Termination,
        chan: session::ChanId,
    ) -> Result<ChannelRuntime> {
        Ok(build_channel_runtime(
            &self.shared,
            &sess.flags,
            term_in,
            term_out,
            chan,
        ))
    }

    /// Marks a session delete-pending; removal happens once its queues
    /// drain (in the manage phase of a tick).
    pub fn delete_session(&self, id: SessionId) -> Result<()> {
        self.shared.registry.lock().delete(id)?;
        Ok(())
    }

    /// ACTIVE -> FLUSH_PACKETS; remaining buffered packets are delivered
    /// on the next tick.
    pub fn flush_session(&self, id: SessionId) -> Result<()> {
        self.shared.registry.lock().flush(id)?;
        Ok(())
    }

    pub fn get_session_info(&self, id: SessionId) -> Result<session::Session> {
        Ok(self.shared.registry.lock().session(id)?.clone())
    }

    pub fn get_session_status(&self, id: SessionId) -> Result<Option<session::Error>> {
        Ok(self.shared.registry.lock().session(id)?.last_status)
    }

    /// Channel record lookup, for callers addressing by channel number.
    pub fn get_channel_info(&self, chan: session::ChanId) -> Result<session::Channel> {
        Ok(self.shared.registry.lock().channel(chan)?.clone())
    }

    pub fn set_session_name(&self, id: SessionId, name: String) -> Result<()> {
        self.set_session_info(id, SessionInfoSet::Name(name))
    }

    pub fn set_session_info(&self, id: SessionId, set: SessionInfoSet) -> Result<()> {
        let mut reg = self.shared.registry.lock();
        match set {
            SessionInfoSet::Name(name) => {
                reg.session_mut(id)?.data.name = name;
            }
            SessionInfoSet::DormantSsrcDetect { side, enable } => {
                // a per-channel property only: the group term has no
                // dormant-SSRC detection and no group-wide default
                let chan = match side {
                    session::TermSide::Term1 => reg.session(id)?.chan1,
                    session::TermSide::Term2 => reg.session(id)?.chan2,
                    session::TermSide::Group => {
                        return Err(Error::Session(session::Error::InvalidTermInfo))
                    }
                };
                reg.channel_mut(chan)?.dormant_ssrc_detect = enable;
            }
        }
        Ok(())
    }

    pub fn num_sessions(&self) -> usize {
        self.shared.registry.lock().num_sessions()
    }

    // ---- packet I/O ---------------------------------------------------

    /// Parses a prepared IP datagram into a view.
    pub fn get_packet_info(&self, data: Bytes, order: WireOrder) -> Result<PacketView> {
        Ok(PacketView::parse(data, order)?)
    }

    pub fn get_dtmf_info(&self, payload: &[u8]) -> Result<packet::DtmfEvent> {
        Ok(packet::get_dtmf_info(payload)?)
    }

    /// Pushes one datagram toward a session's worker. `session` of -1
    /// matches (and, in dynamic mode, creates) the session from the packet
    /// headers. Returns false when the ingress queue is full; the caller
    /// retries later.
    pub fn push_packet(&self, session: SessionId, data: Bytes) -> Result<bool> {
        let now = self.shared.now();

        if self.shared.cfg.enable_push_alarm {
            let last = self.shared.last_push.load(Ordering::Relaxed);
            let gap = now.0.saturating_sub(last);
            if last != 0 && gap > self.shared.cfg.push_alarm.as_micros().0 {
                self.shared
                    .log_warning(format!("no packets pushed for {} ms", gap / 1000));
            }
        }
        self.shared.last_push.store(now.0, Ordering::Relaxed);

        let id = if session >= 0 {
            if session as usize >= self.shared.queues.len() {
                return Err(Error::Session(session::Error::InvalidHandle));
            }
            session
        } else {
            let view = PacketView::parse(data.clone(), WireOrder::Network)?;
            let mut reg = self.shared.registry.lock();
            match reg.match_packet(&view) {
                Some(chan) => reg.channel(chan)?.session,
                None if self.shared.dynamic_mode && !view.is_rtcp() => {
                    let (id, _chan, est) =
                        reg.create_dynamic(&view, self.shared.dynamic_group.clone())?;
                    self.shared.log_info(format!(
                        "created dynamic session {id}, estimated codec {:?} bitrate {}",
                        est.codec, est.bitrate
                    ));
                    let d = &self.shared.dynamic_defaults;
                    {
                        let s = reg.session_mut(id)?;
                        for t in [&mut s.data.term1, &mut s.data.term2] {
                            t.flags.dtx_enable = d.dtx_enable;
                            t.flags.packet_repair_enable = d.packet_repair_enable;
                            t.flags.sid_repair_enable = d.sid_repair_enable;
                            t.flags.rfc7198_dedup = d.rfc7198_dedup;
                            if let Some(target) = d.jitter_target {
                                t.delay_target = Ptimes(target);
                            }
                            if let Some(max) = d.jitter_max {
                                t.delay_max = Ptimes(max);
                            }
                        }
                    }
                    self.finish_create(&mut reg, id, d.assignment)?;
                    id
                }
                None => return Ok(false),
            }
        };

        let q = &self.shared.queues[id as usize];
        let ok = q.ingress.push(QueuedPacket {
            session: id,
            data,
            ts: now,
            flags: 0,
        });
        if ok {
            let thread = {
                let mut reg = self.shared.registry.lock();
                let _ = reg.mark_active(id);
                reg.session(id).ok().and_then(|s| s.thread)
            };
            // kick any worker sleeping in energy saver
            if let Some(t) = thread {
                let _guard = self.shared.workers[t].wake_lock.lock();
                self.shared.workers[t].wake.notify_all();
            }
        }
        Ok(ok)
    }

    /// Batch push with the queue-full retry policy: sleep
    /// `max(1000, frame interval) µs` between attempts, three retries,
    /// then give up and return how many were accepted.
    pub fn push_packets(&self, session: SessionId, pkts: &[Bytes]) -> Result<usize> {
        let mut pushed = 0;
        for p in pkts {
            let mut tries = 0;
            loop {
                if self.push_packet(session, p.clone())? {
                    pushed += 1;
                    break;
                }
                tries += 1;
                if tries > 3 {
                    self.shared
                        .log_warning(format!("session {session} ingress full, push deferred"));
                    return Ok(pushed);
                }
                std::thread::sleep(std::time::Duration::from_micros(
                    1000u64.max(MilliSecs(20).as_micros().0),
                ));
            }
        }
        Ok(pushed)
    }

    /// Pulls egress packets of one category. `session` of -1 drains
    /// across all sessions; each packet carries its session handle.
    pub fn pull_packets(
        &self,
        session: SessionId,
        cat: Category,
        max_n: usize,
    ) -> Vec<QueuedPacket> {
        if session >= 0 && (session as usize) < self.shared.queues.len() {
            return self.shared.queues[session as usize].egress(cat).pull(max_n);
        }
        let mut out = Vec::new();
        for q in &self.shared.queues {
            if out.len() >= max_n {
                break;
            }
            out.extend(q.egress(cat).pull(max_n - out.len()));
        }
        out
    }

    /// Egress level in bytes for the auto-rate controller.
    pub fn egress_level(&self, session: SessionId, cat: Category) -> usize {
        if session >= 0 && (session as usize) < self.shared.queues.len() {
            self.shared.queues[session as usize].egress(cat).level()
        } else {
            0
        }
    }

    pub fn egress_empty(&self, session: SessionId) -> bool {
        if session >= 0 && (session as usize) < self.shared.queues.len() {
            !self.shared.queues[session as usize].egress_status()
        } else {
            true
        }
    }

    // ---- direct (queue-less) buffer API -------------------------------

    /// Adds packets straight into a session's jitter buffers, bypassing
    /// the queues. For apps that drive the engine themselves.
    pub fn buffer_packets(&self, session: SessionId, pkts: &[Bytes]) -> Result<usize> {
        let mut n = 0;
        for p in pkts {
            let view = PacketView::parse(p.clone(), WireOrder::Network)?;
            let mut guard = self.shared.runtimes[session as usize].lock();
            let rt = guard.as_mut().ok_or(session::Error::InvalidHandle)?;
            let now = self.shared.now();
            if pipeline::buffer_one(&self.shared, rt, &view, now).is_ok() {
                n += 1;
            }
        }
        Ok(n)
    }

    /// Ordered pull straight from a session's term1 jitter buffer.
    pub fn get_ordered_packets(
        &self,
        session: SessionId,
        flags: jitter::PullFlags,
    ) -> Result<Vec<jitter::Delivered>> {
        let mut guard = self.shared.runtimes[session as usize].lock();
        let rt = guard.as_mut().ok_or(session::Error::InvalidHandle)?;
        let now = self.shared.now();
        let jb = rt.rt1.jb.as_mut().ok_or(session::Error::InvalidChannel)?;
        Ok(jb.pull(now, flags))
    }

    // ---- jitter buffer info -------------------------------------------

    pub fn get_jitter_buffer_info(
        &self,
        session: SessionId,
        item: jitter::InfoItem,
    ) -> Result<i64> {
        let guard = self.shared.runtimes[session as usize].lock();
        let rt = guard.as_ref().ok_or(session::Error::InvalidHandle)?;
        let jb = rt.rt1.jb.as_ref().ok_or(session::Error::InvalidChannel)?;
        Ok(jb.info(item))
    }

    pub fn set_jitter_buffer_info(
        &self,
        session: SessionId,
        item: jitter::stats::SetItem,
        value: i64,
    ) -> Result<()> {
        let mut guard = self.shared.runtimes[session as usize].lock();
        let rt = guard.as_mut().ok_or(session::Error::InvalidHandle)?;
        let jb = rt.rt1.jb.as_mut().ok_or(session::Error::InvalidChannel)?;
        jb.set_info(item, value).map_err(Error::Jitter)
    }

    // ---- formatting ----------------------------------------------------

    /// Formats a payload into a full datagram using a session's outbound
    /// (term2-direction) header state.
    pub fn format_packet(
        &self,
        session: SessionId,
        opts: &FormatOptions,
        payload: &[u8],
    ) -> Result<Bytes> {
        let mut guard = self.shared.runtimes[session as usize].lock();
        let rt = guard.as_mut().ok_or(session::Error::InvalidHandle)?;
        Ok(packet::format_packet(&mut rt.rt1.format, opts, payload)?)
    }

    // ---- app-driven service -------------------------------------------

    /// One cooperative tick over every session, on the calling thread.
    /// The jitter-buffer clock advances one ptime per call (analytics /
    /// faster-than-real-time pacing).
    pub fn service_app_tick(&self) -> Result<()> {
        let ids: Vec<SessionId> = {
            let reg = self.shared.registry.lock();
            reg.sessions().map(|s| s.id).collect()
        };
        let mut stats = WorkerHotStats::default();
        for id in ids {
            pipeline::tick_session(&self.shared, id, true, &mut stats);
        }
        Ok(())
    }

    /// Mixer run-time stats for a stream group.
    pub fn get_group_stats(&self, group_id: &str) -> Option<group::GroupStats> {
        self.shared
            .mixers
            .lock()
            .get(group_id)
            .map(|e| e.mixer.stats().clone())
    }

    // ---- stats output --------------------------------------------------

    pub fn write_packet_stats_history_log<P: AsRef<std::path::Path>>(
        &self,
        path: P,
    ) -> Result<()> {
        self.shared.history.write_log(path)?;
        Ok(())
    }

    /// Per-channel time/loss summary into the event log.
    pub fn log_packet_time_loss_stats(&self, session: SessionId) -> Result<()> {
        let (chan1, chan2) = {
            let reg = self.shared.registry.lock();
            let s = reg.session(session)?;
            (s.chan1, s.chan2)
        };
        for chan in [chan1, chan2] {
            let a = self.shared.history.analyze(chan);
            self.shared.log_info(format!(
                "chan {chan}: input {} output {} repaired {} sid-reuse {} dropped {} reordered {}",
                a.input, a.output, a.repaired, a.sid_reuse, a.dropped, a.reordered
            ));
        }
        Ok(())
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        let _ = self.config_media_service(ServiceAction::Exit);
    }
}

pub(crate) fn build_channel_runtime(
    shared: &Shared,
    flags: &CreateFlags,
    term_in: &Termination,
    term_out: &Termination,
    chan: session::ChanId,
) -> ChannelRuntime {
    let jb = if flags.no_jitter_buffer {
        None
    } else {
        Some(JitterBuffer::new(jitter_config(term_in)))
    };
    let decoder = shared
        .codec_factory
        .create(term_in.codec, term_in.bitrate, term_in.sample_rate);
    let encoder = shared
        .codec_factory
        .create(term_out.codec, term_out.bitrate, term_out.sample_rate);
    let format = ChannelFormatState::new(
        term_out.local,
        term_out.remote,
        term_out.payload_type,
        rand::random::<u32>(),
        term_out.units_per_ptime(),
    );
    ChannelRuntime {
        chan,
        jb,
        decoder,
        encoder,
        format,
        preserve_seqnum: flags.preserve_seqnum,
        sid_threshold: 8,
        dtx_enable: term_in.flags.dtx_enable,
    }
}

pub(crate) fn group_id_of(d: &SessionData) -> Option<String> {
    d.group_term
        .as_ref()
        .and_then(|g| g.group_id.clone())
        .or_else(|| d.term1.group_id.clone())
}

pub(crate) fn jitter_config(t: &Termination) -> JitterConfig {
    JitterConfig {
        ptime: t.ptime,
        sample_rate: t.sample_rate,
        target_delay: t.delay_target,
        min_delay: t.delay_min,
        max_depth: t.delay_max.max(Ptimes(t.delay_target.0 + 4)),
        enable_dedup: t.flags.rfc7198_dedup,
        enable_sid_repair: t.flags.sid_repair_enable,
        enable_dtx: t.flags.dtx_enable,
        enable_holdoff: t.flags.timestamp_hold_off,
        enable_packet_repair: t.flags.packet_repair_enable,
        ..Default::default()
    }
}
