#[cfg(test)]
mod registry_test;

use std::collections::HashMap;
use std::net::SocketAddr;

use log::{info, warn};
use packet::PacketView;
use serde::{Deserialize, Serialize};

use crate::channel::{Channel, TermSide};
use crate::codec::{estimate_codec_type, CodecEstimate};
use crate::error::{Error, Result};
use crate::term::{GroupMode, SessionData, Termination};
use crate::{ChanId, SessionId};

/// Session-to-worker placement policy, chosen at create time.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ThreadAssignment {
    /// Fill the current worker to nominal capacity before moving on.
    #[default]
    Linear,
    /// Spread sessions evenly across workers.
    RoundRobin,
    /// Keep all sessions of a stream group on one worker.
    WholeGroup,
}

#[derive(Debug, Default, Clone, Copy, Serialize, Deserialize)]
pub struct CreateFlags {
    pub assignment: ThreadAssignment,
    pub disable_network_io: bool,
    pub preserve_seqnum: bool,
    /// Matching key includes the session handle.
    pub user_managed: bool,
    /// Allow RFC 8108 child channels on SSRC transitions.
    pub dynamic_channel_enable: bool,
    pub no_jitter_buffer: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    New,
    Active,
    FlushPackets,
    DeletePending,
}

/// One session record in the fixed-capacity table.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: SessionId,
    pub data: SessionData,
    pub flags: CreateFlags,
    pub state: SessionState,
    pub thread: Option<usize>,
    pub chan1: ChanId,
    pub chan2: ChanId,
    pub group_chan: Option<ChanId>,
    /// Created by dynamic matching rather than an explicit request.
    pub dynamic: bool,
    pub last_status: Option<Error>,
}

#[derive(Debug, Clone)]
pub struct GroupRecord {
    pub owner: SessionId,
    pub members: Vec<SessionId>,
}

/// Matching key. User-managed sessions fold the handle into the key so
/// identical tuples can coexist; expressing that as a distinct variant
/// keeps the hot-path lookup free of mode checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatchKey {
    Normal {
        src: SocketAddr,
        dst: SocketAddr,
        payload_type: u8,
    },
    UserManaged {
        src: SocketAddr,
        dst: SocketAddr,
        payload_type: u8,
        session: SessionId,
    },
}

impl MatchKey {
    fn for_term(t: &Termination, user_managed: Option<SessionId>) -> MatchKey {
        match user_managed {
            None => MatchKey::Normal {
                src: t.remote,
                dst: t.local,
                payload_type: t.payload_type,
            },
            Some(session) => MatchKey::UserManaged {
                src: t.remote,
                dst: t.local,
                payload_type: t.payload_type,
                session,
            },
        }
    }

    fn for_view(view: &PacketView, user_managed: Option<SessionId>) -> MatchKey {
        let src = SocketAddr::new(view.src_addr, view.udp.src_port);
        let dst = SocketAddr::new(view.dst_addr, view.udp.dst_port);
        match user_managed {
            None => MatchKey::Normal {
                src,
                dst,
                payload_type: view.rtp.payload_type,
            },
            Some(session) => MatchKey::UserManaged {
                src,
                dst,
                payload_type: view.rtp.payload_type,
                session,
            },
        }
    }
}

/// Fixed-capacity session and channel tables plus the matching maps. All
/// ceilings are set at construction; exceeding one fails the create.
pub struct Registry {
    max_sessions: usize,
    max_groups: usize,
    sessions: Vec<Option<Session>>,
    channels: Vec<Option<Channel>>,
    by_key: HashMap<MatchKey, ChanId>,
    /// DTMF-aware fallback: RFC 4733 event packets carry an event payload
    /// type that is excluded from the primary key.
    by_addr: HashMap<(SocketAddr, SocketAddr), ChanId>,
    groups: HashMap<String, GroupRecord>,
    /// Bumped on every delete; stale channel ids are caught against it.
    version: u32,
    ssrc_run_threshold: u32,
    dynamic_count: u32,
}

impl Registry {
    pub fn new(max_sessions: usize, max_groups: usize) -> Self {
        Registry {
            max_sessions,
            max_groups,
            sessions: (0..max_sessions).map(|_| None).collect(),
            channels: (0..max_sessions * 4).map(|_| None).collect(),
            by_key: HashMap::new(),
            by_addr: HashMap::new(),
            groups: HashMap::new(),
            version: 0,
            ssrc_run_threshold: 2,
            dynamic_count: 0,
        }
    }

    pub fn with_ssrc_run_threshold(mut self, n: u32) -> Self {
        self.ssrc_run_threshold = n.max(1);
        self
    }

    pub fn num_sessions(&self) -> usize {
        self.sessions.iter().filter(|s| s.is_some()).count()
    }

    pub fn table_version(&self) -> u32 {
        self.version
    }

    fn alloc_channel(&mut self, session: SessionId, side: TermSide) -> Result<ChanId> {
        let slot = self
            .channels
            .iter()
            .position(|c| c.is_none())
            .ok_or(Error::CapacityChannels)?;
        let id = slot as ChanId;
        self.channels[slot] = Some(Channel::new(id, session, side, self.version));
        Ok(id)
    }

    /// Creates a session, registers its matching keys, and returns the
    /// handle.
    pub fn create(&mut self, data: SessionData, flags: CreateFlags) -> Result<SessionId> {
        data.validate()?;

        let slot = self
            .sessions
            .iter()
            .position(|s| s.is_none())
            .ok_or(Error::CapacitySessions)?;
        let id = slot as SessionId;

        let um = flags.user_managed.then_some(id);
        let key1 = MatchKey::for_term(&data.term1, um);
        if self.by_key.contains_key(&key1) {
            return Err(Error::DuplicateSession);
        }

        // group bookkeeping before any mutation that would need undo
        let group_id = data
            .group_term
            .as_ref()
            .and_then(|g| g.group_id.clone())
            .or_else(|| data.term1.group_id.clone());
        if let Some(gid) = &group_id {
            if !self.groups.contains_key(gid) && self.groups.len() >= self.max_groups {
                return Err(Error::CapacityGroups);
            }
        }

        let chan1 = self.alloc_channel(id, TermSide::Term1)?;
        let chan2 = match self.alloc_channel(id, TermSide::Term2) {
            Ok(c) => c,
            Err(e) => {
                self.channels[chan1 as usize] = None;
                return Err(e);
            }
        };
        let group_chan = if data.group_term.is_some() {
            match self.alloc_channel(id, TermSide::Group) {
                Ok(c) => Some(c),
                Err(e) => {
                    self.channels[chan1 as usize] = None;
                    self.channels[chan2 as usize] = None;
                    return Err(e);
                }
            }
        } else {
            None
        };

        // dormant-SSRC detection applies to endpoint channels only, never
        // the group term
        if let Some(c) = self.channels[chan1 as usize].as_mut() {
            c.dormant_ssrc_detect = data.term1.flags.dormant_ssrc_detect;
        }
        if let Some(c) = self.channels[chan2 as usize].as_mut() {
            c.dormant_ssrc_detect = data.term2.flags.dormant_ssrc_detect;
        }

        self.by_key.insert(key1, chan1);
        self.by_key
            .insert(MatchKey::for_term(&data.term2, um), chan2);
        self.by_addr
            .insert((data.term1.remote, data.term1.local), chan1);
        self.by_addr
            .insert((data.term2.remote, data.term2.local), chan2);

        if let Some(gid) = group_id {
            let entry = self.groups.entry(gid.clone()).or_insert_with(|| {
                info!("session {id} is owner of stream group \"{gid}\"");
                GroupRecord {
                    owner: id,
                    members: Vec::new(),
                }
            });
            entry.members.push(id);
        }

        self.sessions[slot] = Some(Session {
            id,
            data,
            flags,
            state: SessionState::New,
            thread: None,
            chan1,
            chan2,
            group_chan,
            dynamic: false,
            last_status: None,
        });

        Ok(id)
    }

    /// Builds and creates a session from an unmatched packet in dynamic
    /// mode. Codec and bitrate come from payload estimation; the reverse
    /// direction mirrors the forward one.
    pub fn create_dynamic(
        &mut self,
        view: &PacketView,
        group_id: Option<String>,
    ) -> Result<(SessionId, ChanId, CodecEstimate)> {
        let est = estimate_codec_type(&view.payload(), view.rtp.payload_type)
            .ok_or(Error::CodecEstimateFailed)?;

        let src = SocketAddr::new(view.src_addr, view.udp.src_port);
        let dst = SocketAddr::new(view.dst_addr, view.udp.dst_port);

        let mut term1 = Termination::new(src, dst, est.codec, view.rtp.payload_type);
        term1.bitrate = est.bitrate;
        term1.ptime = est.ptime;

        let mut term2 = Termination::new(dst, src, est.codec, view.rtp.payload_type);
        term2.bitrate = est.bitrate;
        term2.ptime = est.ptime;

        let group_term = group_id.as_ref().map(|gid| {
            let mut g = term2.clone();
            g.group_id = Some(gid.clone());
            g.group_mode = GroupMode::Contributor;
            g
        });
        let mut t1 = term1;
        if group_id.is_some() {
            t1.group_id = group_id.clone();
            t1.group_mode = GroupMode::Contributor;
        }

        self.dynamic_count += 1;
        let data = SessionData {
            name: format!("dyn{}", self.dynamic_count),
            term1: t1,
            term2,
            group_term,
        };
        let flags = CreateFlags {
            dynamic_channel_enable: true,
            ..Default::default()
        };

        let id = self.create(data, flags)?;
        let chan = self.session(id)?.chan1;
        if let Some(s) = self.sessions[id as usize].as_mut() {
            s.dynamic = true;
        }
        info!(
            "created dynamic session {id}, estimated codec {:?}, bitrate {}",
            est.codec, est.bitrate
        );
        Ok((id, chan, est))
    }

    /// Primary packet match: (src, dst, payload type), with the
    /// DTMF-aware fallback that drops the payload type from the key for
    /// 4-byte event payloads.
    pub fn match_packet(&self, view: &PacketView) -> Option<ChanId> {
        let key = MatchKey::for_view(view, None);
        if let Some(&chan) = self.by_key.get(&key) {
            return Some(chan);
        }
        if view.looks_like_dtmf_event() {
            let src = SocketAddr::new(view.src_addr, view.udp.src_port);
            let dst = SocketAddr::new(view.dst_addr, view.udp.dst_port);
            return self.by_addr.get(&(src, dst)).copied();
        }
        None
    }

    /// Match against a user-managed session, whose key includes the
    /// handle.
    pub fn match_packet_user_managed(
        &self,
        view: &PacketView,
        session: SessionId,
    ) -> Option<ChanId> {
        let key = MatchKey::for_view(view, Some(session));
        self.by_key.get(&key).copied()
    }

    /// RFC 8108: routes a packet's SSRC to the right channel under the
    /// matched termination, creating a child channel on a new SSRC when
    /// the session allows it. Returns the channel to buffer into and
    /// whether a child was created.
    pub fn resolve_ssrc(&mut self, chan: ChanId, ssrc: u32) -> Result<(ChanId, bool)> {
        let (session_id, parent_id) = {
            let c = self.channel(chan)?;
            (c.session, c.parent.unwrap_or(c.id))
        };

        // first packet on the parent claims its SSRC
        {
            let parent = self.channel_mut(parent_id)?;
            match parent.ssrc {
                None => {
                    parent.ssrc = Some(ssrc);
                    return Ok((parent_id, false));
                }
                Some(s) if s == ssrc => {
                    parent.run_ssrc = None;
                    parent.run_count = 0;
                    return Ok((parent_id, false));
                }
                _ => {}
            }
        }

        // existing child with this SSRC?
        let existing = {
            let parent = self.channel(parent_id)?;
            parent
                .children
                .iter()
                .copied()
                .find(|&c| self.channel(c).map(|ch| ch.ssrc == Some(ssrc)).unwrap_or(false))
        };

        let child_id = match existing {
            Some(c) => c,
            None => {
                let dyn_enabled = self
                    .session(session_id)
                    .map(|s| s.flags.dynamic_channel_enable)
                    .unwrap_or(false);
                if !dyn_enabled {
                    // without dynamic channels the parent keeps the packet
                    // and the jitter buffer screens the SSRC
                    return Ok((parent_id, false));
                }
                let side = self.channel(parent_id)?.side;
                let child = self.alloc_channel(session_id, side)?;
                {
                    let c = self.channel_mut(child)?;
                    c.parent = Some(parent_id);
                    c.ssrc = Some(ssrc);
                    c.current = false;
                }
                self.channel_mut(parent_id)?.children.push(child);
                info!(
                    "created child channel {child} (parent {parent_id}) for ssrc {ssrc:#010x}"
                );
                return Ok((child, true));
            }
        };

        // SSRC-run stability: a run of packets on one child makes it the
        // current channel for the termination
        let threshold = self.ssrc_run_threshold;
        let switch = {
            let parent = self.channel_mut(parent_id)?;
            if parent.run_ssrc == Some(ssrc) {
                parent.run_count += 1;
            } else {
                parent.run_ssrc = Some(ssrc);
                parent.run_count = 1;
            }
            parent.run_count >= threshold
        };
        if switch {
            let children = self.channel(parent_id)?.children.clone();
            self.channel_mut(parent_id)?.current = false;
            for c in children {
                let cur = c == child_id;
                self.channel_mut(c)?.current = cur;
            }
            self.channel_mut(child_id)?.current = true;
        }

        Ok((child_id, false))
    }

    pub fn session(&self, id: SessionId) -> Result<&Session> {
        if id < 0 || id as usize >= self.max_sessions {
            return Err(Error::InvalidHandle);
        }
        self.sessions[id as usize].as_ref().ok_or(Error::InvalidHandle)
    }

    pub fn session_mut(&mut self, id: SessionId) -> Result<&mut Session> {
        if id < 0 || id as usize >= self.max_sessions {
            return Err(Error::InvalidHandle);
        }
        self.sessions[id as usize].as_mut().ok_or(Error::InvalidHandle)
    }

    pub fn channel(&self, chan: ChanId) -> Result<&Channel> {
        self.channels
            .get(chan as usize)
            .and_then(|c| c.as_ref())
            .ok_or(Error::InvalidChannel)
    }

    pub fn channel_mut(&mut self, chan: ChanId) -> Result<&mut Channel> {
        self.channels
            .get_mut(chan as usize)
            .and_then(|c| c.as_mut())
            .ok_or(Error::InvalidChannel)
    }

    /// Validates a possibly-stale channel id against the table version it
    /// was captured at.
    pub fn check_channel(&self, chan: ChanId, version: u32) -> Result<&Channel> {
        let c = self.channel(chan)?;
        if c.version != version {
            return Err(Error::StaleChannel);
        }
        Ok(c)
    }

    pub fn sessions(&self) -> impl Iterator<Item = &Session> {
        self.sessions.iter().filter_map(|s| s.as_ref())
    }

    pub fn group(&self, id: &str) -> Option<&GroupRecord> {
        self.groups.get(id)
    }

    pub fn groups(&self) -> impl Iterator<Item = (&String, &GroupRecord)> {
        self.groups.iter()
    }

    /// NEW -> ACTIVE on first push.
    pub fn mark_active(&mut self, id: SessionId) -> Result<()> {
        let s = self.session_mut(id)?;
        if s.state == SessionState::New {
            s.state = SessionState::Active;
        }
        Ok(())
    }

    /// ACTIVE -> FLUSH_PACKETS on request or end of input.
    pub fn flush(&mut self, id: SessionId) -> Result<()> {
        let s = self.session_mut(id)?;
        match s.state {
            SessionState::New | SessionState::Active => {
                s.state = SessionState::FlushPackets;
                Ok(())
            }
            SessionState::FlushPackets => Ok(()),
            SessionState::DeletePending => Err(Error::InvalidStateTransition),
        }
    }

    /// Marks a session delete-pending. Actual removal happens through
    /// [`Registry::remove`] once the owning worker confirms its queues are
    /// empty.
    pub fn delete(&mut self, id: SessionId) -> Result<()> {
        let s = self.session_mut(id)?;
        s.state = SessionState::DeletePending;
        Ok(())
    }

    /// Final removal: clears channels, match keys and group membership and
    /// bumps the table version.
    pub fn remove(&mut self, id: SessionId) -> Result<()> {
        let s = self
            .sessions
            .get_mut(id as usize)
            .and_then(|s| s.take())
            .ok_or(Error::InvalidHandle)?;

        let um = s.flags.user_managed.then_some(id);
        self.by_key.remove(&MatchKey::for_term(&s.data.term1, um));
        self.by_key.remove(&MatchKey::for_term(&s.data.term2, um));
        self.by_addr
            .remove(&(s.data.term1.remote, s.data.term1.local));
        self.by_addr
            .remove(&(s.data.term2.remote, s.data.term2.local));

        let mut chans = vec![s.chan1, s.chan2];
        chans.extend(s.group_chan);
        for chan in chans {
            let children = self
                .channels
                .get(chan as usize)
                .and_then(|c| c.as_ref())
                .map(|c| c.children.clone())
                .unwrap_or_default();
            for child in children {
                self.channels[child as usize] = None;
            }
            self.channels[chan as usize] = None;
        }

        let gid = s
            .data
            .group_term
            .as_ref()
            .and_then(|g| g.group_id.clone())
            .or_else(|| s.data.term1.group_id.clone());
        if let Some(gid) = gid {
            let empty = if let Some(g) = self.groups.get_mut(&gid) {
                g.members.retain(|&m| m != id);
                g.members.is_empty()
            } else {
                false
            };
            if empty {
                self.groups.remove(&gid);
            } else if let Some(g) = self.groups.get_mut(&gid) {
                if g.owner == id {
                    // ownership passes to the eldest surviving member
                    g.owner = g.members[0];
                    warn!("stream group \"{gid}\" owner deleted, new owner {}", g.owner);
                }
            }
        }

        self.version = self.version.wrapping_add(1);
        Ok(())
    }
}
