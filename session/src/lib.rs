#![warn(rust_2018_idioms)]
#![allow(dead_code)]

pub mod channel;
pub mod codec;
pub mod error;
pub mod registry;
pub mod term;

pub use channel::{Channel, TermSide};
pub use codec::{estimate_codec_type, CodecEstimate, CodecType};
pub use error::Error;
pub use registry::{
    CreateFlags, GroupRecord, MatchKey, Registry, Session, SessionState, ThreadAssignment,
};
pub use term::{GroupMode, SessionData, TermFlags, Termination};

/// Session handle. Valid handles are `0..max_sessions`.
pub type SessionId = i32;

/// Channel number. Valid channels are `0..4*max_sessions`.
pub type ChanId = u32;
