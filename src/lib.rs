#![warn(rust_2018_idioms)]
#![allow(dead_code)]

//! mediaflow: a real-time RTP media packet processing engine.
//!
//! The engine accepts prepared IP/UDP/RTP datagrams (live or from capture
//! files), matches them to sessions, re-orders and repairs them in
//! per-channel jitter buffers, decodes through an external codec contract,
//! optionally merges streams into time-aligned groups, and re-emits
//! transcoded or mixed audio as packets and files.

pub mod codec;
pub mod config;
pub mod engine;
pub mod error;
pub mod rate;
pub mod stats;

pub use codec::{CodecFactory, L16Codec, L16Factory, MediaCodec};
pub use config::{EngineConfig, MAX_PKT_MEDIA_THREADS, MAX_STREAM_GROUPS};
pub use engine::{DynamicDefaults, Engine, ServiceAction, ServiceMode, SessionInfoSet};
pub use error::Error;
pub use rate::AutoRateController;
pub use stats::{WorkerSnapshot, WorkerState};

pub use eventlog;
pub use group;
pub use jitter;
pub use packet;
pub use pcap;
pub use queue;
pub use session;
pub use util;
