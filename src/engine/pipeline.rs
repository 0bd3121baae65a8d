//! The per-session tick: manage, input, buffer, pull, decode, group mix,
//! encode, stats. Runs on a worker thread or on the app thread in
//! app-driven service mode.

use std::time::Instant;

use eventlog::{Disposition, HistoryEntry};
use jitter::{Delivered, DeliveredFlags, PacketMeta, PayloadKind, PullFlags};
use packet::{FormatOptions, PacketView, WireOrder};
use queue::{Category, QueuedPacket};
use session::{SessionId, SessionState, TermSide};
use util::time::MicroSecs;

use super::{build_channel_runtime, ChannelRuntime, SessionRuntime, Shared};
use crate::stats::WorkerHotStats;

const INPUT_BATCH: usize = 32;

/// One tick for one session. `ftrt` advances the jitter-buffer clock one
/// ptime per call instead of following wall time.
pub(crate) fn tick_session(
    shared: &Shared,
    id: SessionId,
    ftrt: bool,
    stats: &mut WorkerHotStats,
) {
    let now = shared.now();

    // ---- manage: state transitions ------------------------------------
    let t0 = Instant::now();
    let state = {
        let reg = shared.registry.lock();
        match reg.session(id) {
            Ok(s) => s.state,
            Err(_) => {
                stats.invalid_channel_skips += 1;
                return;
            }
        }
    };
    if state == SessionState::DeletePending {
        let q = &shared.queues[id as usize];
        if q.ingress.is_empty() && !q.egress_status() {
            finalize_delete(shared, id);
        }
        stats.manage.record(t0.elapsed().as_micros() as u64);
        return;
    }
    stats.manage.record(t0.elapsed().as_micros() as u64);

    // ---- input + buffer -----------------------------------------------
    let t0 = Instant::now();
    let pkts = shared.queues[id as usize].ingress.pull(INPUT_BATCH);
    stats.input.record(t0.elapsed().as_micros() as u64);
    stats.pkts_in += pkts.len() as u64;

    let mut guard = shared.runtimes[id as usize].lock();
    let rt = match guard.as_mut() {
        Some(rt) => rt,
        None => {
            stats.invalid_channel_skips += 1;
            return;
        }
    };

    let t0 = Instant::now();
    for qp in pkts {
        match PacketView::parse(qp.data, WireOrder::Network) {
            Ok(view) => {
                let _ = buffer_one(shared, rt, &view, qp.ts);
            }
            Err(e) => {
                shared.log_warning(format!("session {id}: dropped malformed packet: {e}"));
            }
        }
    }
    stats.buffer.record(t0.elapsed().as_micros() as u64);

    // ---- flush request ------------------------------------------------
    if state == SessionState::FlushPackets && !rt.flushed {
        flush_runtime(shared, id, rt, now, stats);
        rt.flushed = true;
        return;
    }

    // ---- pull, decode, encode -----------------------------------------
    let flags = PullFlags {
        ftrt,
        ..Default::default()
    };
    pull_side(shared, id, rt, Side::Term1, now, flags, stats);
    pull_side(shared, id, rt, Side::Term2, now, flags, stats);

    // ---- pastdue: keep a starving mixer fed ---------------------------
    // a contributor sitting on buffered packets while its audio ring is
    // empty would stall the whole group; drain the buffer into the ring
    if let (Some(gid), Some(chan)) = (rt.group_id.clone(), rt.group_contributor_chan) {
        let starving = {
            let mixers = shared.mixers.lock();
            mixers
                .get(&gid)
                .map(|e| e.mixer.data_available(chan) < e.mixer.framesize())
                .unwrap_or(false)
        };
        if starving {
            let pastdue = rt
                .rt1
                .jb
                .as_ref()
                .map(|jb| jb.is_primed() && jb.depth_pkts() > 0)
                .unwrap_or(false);
            if pastdue {
                let outs = rt
                    .rt1
                    .jb
                    .as_mut()
                    .map(|jb| {
                        jb.pull(
                            now,
                            PullFlags {
                                return_all: true,
                                ..Default::default()
                            },
                        )
                    })
                    .unwrap_or_default();
                if !outs.is_empty() {
                    emit_delivered(
                        shared,
                        id,
                        &mut rt.rt1,
                        outs,
                        Some((gid.as_str(), chan)),
                        stats,
                    );
                }
            }
        }
    }

    drop(guard);

    // ---- group mix (owner only) ---------------------------------------
    let t0 = Instant::now();
    mix_groups_owned_by(shared, id, now, ftrt);
    stats.group.record(t0.elapsed().as_micros() as u64);
}

#[derive(Clone, Copy, PartialEq)]
enum Side {
    Term1,
    Term2,
}

/// Validates, classifies and buffers one parsed packet into the right
/// channel's jitter buffer (parent or RFC 8108 child).
pub(crate) fn buffer_one(
    shared: &Shared,
    rt: &mut SessionRuntime,
    view: &PacketView,
    arrival: MicroSecs,
) -> crate::error::Result<()> {
    if view.is_rtcp() {
        return Ok(());
    }

    // match and, when allowed, resolve SSRC transitions to a child channel
    let (chan, side) = {
        let mut reg = shared.registry.lock();
        let matched = match reg.match_packet(view) {
            Some(c) => c,
            None => {
                // direct-buffer callers already know the session; fall
                // back to term1 for packets that bypass the key tables
                rt.rt1.chan
            }
        };
        let (resolved, created) = match reg.resolve_ssrc(matched, view.rtp.ssrc) {
            Ok(v) => v,
            Err(e) => {
                // child-channel capacity and stale-channel failures are
                // surfaced through the session status
                if let Ok(s) = reg.session_mut(rt.id) {
                    s.last_status = Some(e);
                }
                return Err(e.into());
            }
        };
        let side = reg
            .channel(resolved)
            .map(|c| c.side)
            .unwrap_or(TermSide::Term1);
        if created {
            // build a runtime for the new child alongside its parent
            let (term_in, term_out) = match side {
                TermSide::Term2 => (&rt.term2, &rt.term1),
                _ => (&rt.term1, &rt.term2),
            };
            let child_rt = build_channel_runtime(shared, &rt.flags, term_in, term_out, resolved);
            rt.children.insert(resolved, child_rt);
        }
        (resolved, side)
    };

    let crt: &mut ChannelRuntime = if chan == rt.rt1.chan {
        &mut rt.rt1
    } else if chan == rt.rt2.chan {
        &mut rt.rt2
    } else if let Some(c) = rt.children.get_mut(&chan) {
        c
    } else {
        match side {
            TermSide::Term2 => &mut rt.rt2,
            _ => &mut rt.rt1,
        }
    };

    let Some(jb) = crt.jb.as_mut() else {
        return Ok(());
    };

    let payload = view.payload();
    let kind = if view.looks_like_dtmf_event() {
        PayloadKind::Event
    } else if crt.dtx_enable && payload.len() <= crt.sid_threshold {
        PayloadKind::Sid
    } else {
        PayloadKind::Media
    };

    let meta = PacketMeta {
        seq: view.rtp.sequence_number,
        timestamp: view.rtp.timestamp,
        ssrc: view.rtp.ssrc,
        payload_type: view.rtp.payload_type,
        marker: view.rtp.marker,
        payload,
        kind,
        arrival,
    };

    let seq = meta.seq;
    let rtp_ts = meta.timestamp;
    let disposition = match jb.add(meta) {
        Ok(r) if r.buffered() => Disposition::Added,
        Ok(jitter::AddResult::DedupDrop) | Ok(jitter::AddResult::DuplicateDrop) => {
            Disposition::Duplicate
        }
        Ok(_) => Disposition::Dropped,
        Err(_) => Disposition::Dropped,
    };
    shared.history.record(
        chan,
        HistoryEntry {
            seq,
            rtp_timestamp: rtp_ts,
            arrival_us: arrival.0,
            disposition,
        },
    );
    Ok(())
}

fn pull_side(
    shared: &Shared,
    id: SessionId,
    rt: &mut SessionRuntime,
    side: Side,
    now: MicroSecs,
    flags: PullFlags,
    stats: &mut WorkerHotStats,
) {
    let t0 = Instant::now();
    let group_id = rt.group_id.clone();
    let contributor_chan = match side {
        Side::Term1 => rt.group_contributor_chan,
        Side::Term2 => None,
    };

    // pull from the current channel for the termination: the parent, or
    // the child that won the SSRC run
    let crt = match side {
        Side::Term1 => current_runtime(shared, &mut rt.rt1, &mut rt.children),
        Side::Term2 => current_runtime(shared, &mut rt.rt2, &mut rt.children),
    };

    let outs = match crt.jb.as_mut() {
        Some(jb) => jb.pull(now, flags),
        None => Vec::new(),
    };
    stats.pull.record(t0.elapsed().as_micros() as u64);
    if outs.is_empty() {
        return;
    }

    let group_feed = match (&group_id, contributor_chan) {
        (Some(gid), Some(chan)) => Some((gid.as_str(), chan)),
        _ => None,
    };
    emit_delivered(shared, id, crt, outs, group_feed, stats);
}

/// Picks the current channel runtime for a termination, honoring RFC 8108
/// switches recorded in the registry.
fn current_runtime<'a>(
    shared: &Shared,
    parent: &'a mut ChannelRuntime,
    children: &'a mut std::collections::HashMap<session::ChanId, ChannelRuntime>,
) -> &'a mut ChannelRuntime {
    if children.is_empty() {
        return parent;
    }
    let current_child = {
        let reg = shared.registry.lock();
        reg.channel(parent.chan)
            .ok()
            .filter(|c| !c.current)
            .map(|c| c.children.clone())
            .and_then(|kids| {
                kids.into_iter()
                    .find(|k| reg.channel(*k).map(|c| c.current).unwrap_or(false))
            })
    };
    match current_child.and_then(|c| children.get_mut(&c)) {
        Some(child) => child,
        None => parent,
    }
}

/// Formats and enqueues delivered packets: the as-is jitter-buffer view,
/// and either the transcoded packet or contributor audio for the mixer.
fn emit_delivered(
    shared: &Shared,
    id: SessionId,
    crt: &mut ChannelRuntime,
    outs: Vec<Delivered>,
    group_feed: Option<(&str, session::ChanId)>,
    stats: &mut WorkerHotStats,
) {
    let q = &shared.queues[id as usize];

    for d in outs {
        let disposition = if d.flags.has(DeliveredFlags::REPAIRED) {
            Disposition::Repaired
        } else if d.flags.has(DeliveredFlags::SID_REUSE) || d.flags.has(DeliveredFlags::SID_NODATA)
        {
            Disposition::SidReuse
        } else {
            Disposition::Delivered
        };
        shared.history.record(
            crt.chan,
            HistoryEntry {
                seq: d.seq,
                rtp_timestamp: d.timestamp,
                arrival_us: shared.now().0,
                disposition,
            },
        );

        // jitter-buffer category: re-emit with the original RTP fields
        let jb_opts = FormatOptions {
            payload_type: Some(d.payload_type),
            marker: Some(d.marker),
            seqnum: Some(d.seq),
            timestamp: Some(d.timestamp),
            ssrc: Some(d.ssrc),
            ..Default::default()
        };
        if let Ok(bytes) = packet::format_packet(&mut crt.format, &jb_opts, &d.payload) {
            let _ = q.egress(Category::JitterBuffer).push(QueuedPacket {
                session: id,
                data: bytes,
                ts: shared.now(),
                flags: d.flags.0,
            });
        }

        if d.kind == PayloadKind::Event {
            // DTMF events pass through the transcoded path unchanged
            let opts = FormatOptions {
                marker: Some(d.marker),
                rtp_event: true,
                timestamp: Some(d.timestamp),
                ..Default::default()
            };
            if let Ok(bytes) = packet::format_packet(&mut crt.format, &opts, &d.payload) {
                let _ = q.egress(Category::Transcoded).push(QueuedPacket {
                    session: id,
                    data: bytes,
                    ts: shared.now(),
                    flags: d.flags.0,
                });
            }
            continue;
        }

        // decode
        let t0 = Instant::now();
        let samples = crt.decoder.decode(&d.payload);
        stats.decode.record(t0.elapsed().as_micros() as u64);

        if let Some((gid, contributor_chan)) = group_feed {
            // child channels feed their parent's contributor slot
            let mut mixers = shared.mixers.lock();
            if let Some(entry) = mixers.get_mut(gid) {
                let _ = entry.mixer.write_samples(contributor_chan, &samples);
            }
            continue;
        }

        // encode + format toward the opposite endpoint
        let t0 = Instant::now();
        let payload = crt.encoder.encode(&samples);
        stats.encode.record(t0.elapsed().as_micros() as u64);

        let opts = FormatOptions {
            marker: Some(d.marker),
            seqnum: crt.preserve_seqnum.then_some(d.seq),
            ..Default::default()
        };
        if let Ok(bytes) = packet::format_packet(&mut crt.format, &opts, &payload) {
            let ok = q.egress(Category::Transcoded).push(QueuedPacket {
                session: id,
                data: bytes,
                ts: shared.now(),
                flags: d.flags.0,
            });
            if !ok {
                shared.log_warning(format!("session {id} transcoded egress full"));
            } else {
                stats.pkts_out += 1;
            }
        }
    }
}

/// Final drain on a flush request: everything still buffered goes out
/// through the normal emit path.
fn flush_runtime(
    shared: &Shared,
    id: SessionId,
    rt: &mut SessionRuntime,
    now: MicroSecs,
    stats: &mut WorkerHotStats,
) {
    let contributor_chan = rt.group_contributor_chan;
    let group_id = rt.group_id.clone();

    let mut sides: Vec<&mut ChannelRuntime> = Vec::new();
    sides.push(&mut rt.rt1);
    sides.push(&mut rt.rt2);
    sides.extend(rt.children.values_mut());

    for (i, crt) in sides.into_iter().enumerate() {
        let outs = match crt.jb.as_mut() {
            Some(jb) => jb.flush(now),
            None => Vec::new(),
        };
        if outs.is_empty() {
            continue;
        }
        // term2 is never the group feed
        let group_feed = match (&group_id, contributor_chan) {
            (Some(gid), Some(chan)) if i != 1 => Some((gid.as_str(), chan)),
            _ => None,
        };
        emit_delivered(shared, id, crt, outs, group_feed, stats);
    }
}

/// Runs the mixer for every group this session owns: one frame per group
/// ptime (every call in FTRT mode), encoded and queued on the stream-group
/// egress.
fn mix_groups_owned_by(shared: &Shared, id: SessionId, now: MicroSecs, ftrt: bool) {
    // produce frames under the mixers lock only; the runtime lock for
    // encoding is taken afterwards (contributor ticks lock in the other
    // order)
    let frames: Vec<group::MixOutput> = {
        let mut mixers = shared.mixers.lock();
        let mut frames = Vec::new();
        for entry in mixers.values_mut() {
            if entry.owner != id {
                continue;
            }
            let ptime_us = entry.mixer.config().ptime.as_micros();
            let due = match (ftrt, entry.last_mix) {
                (true, _) => true,
                (false, None) => true,
                (false, Some(last)) => now.saturating_sub(last) >= ptime_us,
            };
            if !due {
                continue;
            }
            entry.last_mix = Some(now);
            if let Some(out) = entry.mixer.mix_frame() {
                frames.push(out);
            }
        }
        frames
    };

    if frames.is_empty() {
        return;
    }

    let mut guard = shared.runtimes[id as usize].lock();
    let Some(rt) = guard.as_mut() else { return };
    let (Some(enc), Some(fmt)) = (rt.group_encoder.as_mut(), rt.group_format.as_mut()) else {
        return;
    };
    for out in frames {
        let payload = enc.encode(&out.mixed);
        if let Ok(bytes) = packet::format_packet(fmt, &FormatOptions::default(), &payload) {
            let _ = shared.queues[id as usize]
                .egress(Category::StreamGroup)
                .push(QueuedPacket {
                    session: id,
                    data: bytes,
                    ts: now,
                    flags: 0,
                });
        }
    }
}

/// Completes a pending delete once the queues are empty: runtime dropped,
/// mixer membership cleared, registry entry removed.
fn finalize_delete(shared: &Shared, id: SessionId) {
    let rt = shared.runtimes[id as usize].lock().take();
    if let Some(rt) = rt {
        if let Some(gid) = &rt.group_id {
            let mut mixers = shared.mixers.lock();
            let empty = if let Some(entry) = mixers.get_mut(gid) {
                let _ = entry.mixer.remove_contributor(rt.rt1.chan);
                entry.mixer.contributors().is_empty()
            } else {
                false
            };
            if empty {
                mixers.remove(gid);
            }
        }
    }

    // unassign from its worker
    for w in &shared.workers {
        w.assigned.lock().retain(|&s| s != id);
    }

    let mut reg = shared.registry.lock();
    let _ = reg.remove(id);
    shared.log_info(format!("session {id} deleted"));
}
