use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Session-level failure kinds. Creation and modification return the
/// distinct ack codes the driver surfaces through `get_session_status`.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    #[error("invalid session data")]
    InvalidSessionData,
    #[error("invalid termination info")]
    InvalidTermInfo,
    #[error("invalid IP address type")]
    InvalidIpAddrType,
    #[error("session table full")]
    CapacitySessions,
    #[error("channel table full")]
    CapacityChannels,
    #[error("duplicate session")]
    DuplicateSession,
    #[error("stream group table full")]
    CapacityGroups,
    #[error("invalid session handle")]
    InvalidHandle,
    #[error("invalid channel number")]
    InvalidChannel,
    #[error("stale channel (deleted and reused)")]
    StaleChannel,
    #[error("codec could not be estimated from payload")]
    CodecEstimateFailed,
    #[error("invalid state transition")]
    InvalidStateTransition,
}
