#![warn(rust_2018_idioms)]
#![allow(dead_code)]

pub mod error;
pub mod event;
pub mod history;

pub use error::Error;
pub use event::{EventLog, EventLogConfig, EventLogHandle, LogBridge, LogMode, TimestampMode};
pub use history::{ChannelHistory, Disposition, HistoryEntry, PacketHistory};
