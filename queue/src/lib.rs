#![warn(rust_2018_idioms)]
#![allow(dead_code)]

//! Bounded single-producer single-consumer packet rings.
//!
//! One queue pair exists per session: an ingress ring (app pushes, worker
//! pulls) and three egress sub-rings, one per output category (worker
//! pushes, app pulls). A full push returns `false` and the caller retries;
//! an empty pull returns nothing. Level accounting is in payload bytes
//! between the read and write pointers.

pub mod ring;

use bytes::Bytes;
use util::time::MicroSecs;

pub use ring::Ring;

pub const DEFAULT_QUEUE_CAPACITY: usize = 512;

/// Output category of a queued packet. Each category has its own egress
/// sub-ring so pulls can select what they want.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    JitterBuffer,
    Transcoded,
    StreamGroup,
}

pub const NUM_CATEGORIES: usize = 3;

impl Category {
    pub const ALL: [Category; NUM_CATEGORIES] =
        [Category::JitterBuffer, Category::Transcoded, Category::StreamGroup];

    pub fn index(self) -> usize {
        match self {
            Category::JitterBuffer => 0,
            Category::Transcoded => 1,
            Category::StreamGroup => 2,
        }
    }
}

/// One packet in flight between app and worker threads.
#[derive(Debug, Clone)]
pub struct QueuedPacket {
    pub session: i32,
    pub data: Bytes,
    /// Push or arrival timestamp carried with the packet.
    pub ts: MicroSecs,
    pub flags: u32,
}

impl ring::Cost for QueuedPacket {
    fn cost(&self) -> usize {
        self.data.len()
    }
}

/// The per-session queue pair.
pub struct SessionQueues {
    pub ingress: Ring<QueuedPacket>,
    egress: [Ring<QueuedPacket>; NUM_CATEGORIES],
}

impl SessionQueues {
    pub fn new(capacity: usize) -> Self {
        SessionQueues {
            ingress: Ring::new(capacity),
            egress: [
                Ring::new(capacity),
                Ring::new(capacity),
                Ring::new(capacity),
            ],
        }
    }

    pub fn egress(&self, cat: Category) -> &Ring<QueuedPacket> {
        &self.egress[cat.index()]
    }

    /// True if any egress sub-ring holds packets.
    pub fn egress_status(&self) -> bool {
        self.egress.iter().any(|r| !r.is_empty())
    }

    /// Total egress level in bytes across categories.
    pub fn egress_level(&self) -> usize {
        self.egress.iter().map(|r| r.level()).sum()
    }
}
