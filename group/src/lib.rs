#![warn(rust_2018_idioms)]
#![allow(dead_code)]

pub mod align;
pub mod error;
pub mod mixer;
pub mod ring;
pub mod sinks;
pub mod wav;

pub use error::Error;
pub use mixer::{
    Contributor, ContributorConfig, GroupConfig, GroupMixer, GroupStats, MixOutput, OverrunPolicy,
};
pub use ring::ContributorRing;
pub use sinks::GroupSinks;
pub use wav::WavWriter;
