#![warn(rust_2018_idioms)]
#![allow(dead_code)]

pub mod error;
pub mod link;
pub mod pcapng;
pub mod reader;
pub mod writer;

pub use error::Error;
pub use link::{strip_link_layer, LinkType};
pub use reader::{open_capture, CaptureFormat, CaptureReader, Record};
pub use writer::{open_pcap_writer, PcapWriter};

pub const PCAP_MAGIC: u32 = 0xa1b2_c3d4;
pub const PCAP_MAGIC_SWAPPED: u32 = 0xd4c3_b2a1;
pub const PCAP_MAGIC_NANOS: u32 = 0xa1b2_3c4d;
pub const PCAP_MAGIC_NANOS_SWAPPED: u32 = 0x4d3c_b2a1;
pub const PCAPNG_BLOCK_MAGIC: u32 = 0x0a0d_0d0a;
pub const PCAP_VERSION_MAJOR: u16 = 2;
pub const PCAP_VERSION_MINOR: u16 = 4;
pub const PCAP_FILE_HEADER_LEN: usize = 24;
pub const PCAP_RECORD_HEADER_LEN: usize = 16;
