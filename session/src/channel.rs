use crate::SessionId;

/// Which endpoint of the session a channel executes for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TermSide {
    Term1,
    Term2,
    Group,
}

/// Execution-level handle bound to a termination. A channel owns one
/// jitter buffer and one decode context (held by the engine, keyed by the
/// channel id). Children are SSRC variants created under RFC 8108; exactly
/// one channel per termination is current at a time.
#[derive(Debug, Clone)]
pub struct Channel {
    pub id: u32,
    pub session: SessionId,
    pub side: TermSide,
    pub parent: Option<u32>,
    pub children: Vec<u32>,
    pub ssrc: Option<u32>,
    /// Current channel for its termination.
    pub current: bool,
    pub dormant_ssrc_detect: bool,
    /// Table version at creation; detects use-after-delete through stale
    /// channel ids.
    pub version: u32,
    /// SSRC-run stability tracking for RFC 8108 switching.
    pub(crate) run_ssrc: Option<u32>,
    pub(crate) run_count: u32,
}

impl Channel {
    pub(crate) fn new(id: u32, session: SessionId, side: TermSide, version: u32) -> Self {
        Channel {
            id,
            session,
            side,
            parent: None,
            children: Vec::new(),
            ssrc: None,
            current: true,
            dormant_ssrc_detect: false,
            version,
            run_ssrc: None,
            run_count: 0,
        }
    }

    pub fn is_child(&self) -> bool {
        self.parent.is_some()
    }
}
