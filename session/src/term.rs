use std::net::SocketAddr;

use serde::{Deserialize, Serialize};
use util::time::{MilliSecs, Ptimes};

use crate::codec::CodecType;
use crate::error::{Error, Result};

/// Behavior flags on one termination.
#[derive(Debug, Default, Clone, Copy, Serialize, Deserialize)]
pub struct TermFlags {
    pub dtx_enable: bool,
    pub sid_repair_enable: bool,
    pub packet_repair_enable: bool,
    pub overrun_sync_enable: bool,
    pub timestamp_hold_off: bool,
    pub expect_bidirectional_traffic: bool,
    /// Per-channel only; never applies to a group term.
    pub dormant_ssrc_detect: bool,
    pub rfc7198_dedup: bool,
}

/// Group membership of a termination.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GroupMode {
    #[default]
    None,
    /// Contributes audio to its stream group.
    Contributor,
}

/// One endpoint of a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Termination {
    pub remote: SocketAddr,
    pub local: SocketAddr,
    pub codec: CodecType,
    pub bitrate: u32,
    pub sample_rate: u32,
    pub ptime: MilliSecs,
    pub payload_type: u8,
    pub flags: TermFlags,
    /// Jitter buffer delays in ptime units.
    pub delay_target: Ptimes,
    pub delay_min: Ptimes,
    pub delay_max: Ptimes,
    pub group_id: Option<String>,
    pub group_mode: GroupMode,
}

impl Termination {
    pub fn new(
        remote: SocketAddr,
        local: SocketAddr,
        codec: CodecType,
        payload_type: u8,
    ) -> Self {
        Termination {
            remote,
            local,
            codec,
            bitrate: 0,
            sample_rate: codec.sample_rate(),
            ptime: MilliSecs(20),
            payload_type,
            flags: TermFlags::default(),
            delay_target: Ptimes(10),
            delay_min: Ptimes(2),
            delay_max: Ptimes(14),
            group_id: None,
            group_mode: GroupMode::None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.remote.is_ipv4() != self.local.is_ipv4() {
            return Err(Error::InvalidIpAddrType);
        }
        if self.ptime.0 == 0 || self.sample_rate == 0 {
            return Err(Error::InvalidTermInfo);
        }
        if self.payload_type > 127 {
            return Err(Error::InvalidTermInfo);
        }
        if self.delay_max < self.delay_target {
            return Err(Error::InvalidTermInfo);
        }
        Ok(())
    }

    /// RTP timestamp units per packetization interval.
    pub fn units_per_ptime(&self) -> u32 {
        self.ptime.0 as u32 * (self.sample_rate / 1000)
    }

    /// Samples per ptime of decoded audio.
    pub fn frame_size(&self) -> usize {
        (self.ptime.0 as usize) * (self.sample_rate as usize / 1000)
    }
}

/// Everything needed to create a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionData {
    pub name: String,
    pub term1: Termination,
    pub term2: Termination,
    pub group_term: Option<Termination>,
}

impl SessionData {
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(Error::InvalidSessionData);
        }
        self.term1.validate()?;
        self.term2.validate()?;
        if let Some(g) = &self.group_term {
            g.validate()?;
        }
        Ok(())
    }
}
