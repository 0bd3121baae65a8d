#[cfg(test)]
mod reader_test;

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use byteorder::{BigEndian, LittleEndian, ReadBytesExt};
use bytes::Bytes;
use util::time::MicroSecs;

use crate::error::{Error, Result};
use crate::link::LinkType;
use crate::pcapng::PcapNgReader;
use crate::{
    PCAPNG_BLOCK_MAGIC, PCAP_MAGIC, PCAP_MAGIC_NANOS, PCAP_MAGIC_NANOS_SWAPPED,
    PCAP_MAGIC_SWAPPED,
};

/// One captured frame: capture timestamp, frame bytes as captured, original
/// on-wire length and the interface link type.
#[derive(Debug, Clone)]
pub struct Record {
    pub ts: MicroSecs,
    pub data: Bytes,
    pub orig_len: u32,
    pub link_type: LinkType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureFormat {
    Pcap,
    PcapNg,
}

/// Classic pcap reader. The magic number fixes endianness and timestamp
/// resolution for the whole file.
pub struct PcapReader<R: Read> {
    r: R,
    swapped: bool,
    nanos: bool,
    pub snaplen: u32,
    pub link_type: LinkType,
}

impl<R: Read> PcapReader<R> {
    /// `magic` has already been consumed by format detection.
    pub(crate) fn after_magic(mut r: R, magic: u32) -> Result<Self> {
        let (swapped, nanos) = match magic {
            PCAP_MAGIC => (false, false),
            PCAP_MAGIC_SWAPPED => (true, false),
            PCAP_MAGIC_NANOS => (false, true),
            PCAP_MAGIC_NANOS_SWAPPED => (true, true),
            other => return Err(Error::BadMagic(other)),
        };
        // version major/minor, thiszone, sigfigs, snaplen, linktype
        let mut rest = [0u8; 20];
        r.read_exact(&mut rest).map_err(|_| Error::TruncatedFileHeader)?;
        let (snaplen, link) = if swapped {
            (
                u32::from_le_bytes([rest[12], rest[13], rest[14], rest[15]]),
                u32::from_le_bytes([rest[16], rest[17], rest[18], rest[19]]),
            )
        } else {
            (
                u32::from_be_bytes([rest[12], rest[13], rest[14], rest[15]]),
                u32::from_be_bytes([rest[16], rest[17], rest[18], rest[19]]),
            )
        };
        Ok(PcapReader {
            r,
            swapped,
            nanos,
            snaplen,
            link_type: LinkType::from(link as u16),
        })
    }

    fn read_u32(&mut self) -> std::io::Result<u32> {
        if self.swapped {
            self.r.read_u32::<LittleEndian>()
        } else {
            self.r.read_u32::<BigEndian>()
        }
    }

    /// Returns the next record, or `None` at a clean end of file.
    pub fn next_record(&mut self) -> Result<Option<Record>> {
        let ts_sec = match self.read_u32() {
            Ok(v) => v,
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let ts_frac = self.read_u32()?;
        let incl_len = self.read_u32()? as usize;
        let orig_len = self.read_u32()?;

        let mut data = vec![0u8; incl_len];
        self.r.read_exact(&mut data).map_err(|_| Error::TruncatedRecord {
            expected: incl_len,
            actual: 0,
        })?;

        let micros = if self.nanos { ts_frac / 1000 } else { ts_frac };
        Ok(Some(Record {
            ts: MicroSecs(ts_sec as u64 * 1_000_000 + micros as u64),
            data: Bytes::from(data),
            orig_len,
            link_type: self.link_type,
        }))
    }
}

/// A capture stream in either format, detected by magic number.
pub enum CaptureReader<R: Read> {
    Pcap(PcapReader<R>),
    PcapNg(PcapNgReader<R>),
}

impl<R: Read> CaptureReader<R> {
    pub fn new(mut r: R) -> Result<Self> {
        let magic = r.read_u32::<BigEndian>().map_err(|_| Error::TruncatedFileHeader)?;
        match magic {
            PCAPNG_BLOCK_MAGIC => Ok(CaptureReader::PcapNg(PcapNgReader::after_magic(r)?)),
            m => Ok(CaptureReader::Pcap(PcapReader::after_magic(r, m)?)),
        }
    }

    pub fn format(&self) -> CaptureFormat {
        match self {
            CaptureReader::Pcap(_) => CaptureFormat::Pcap,
            CaptureReader::PcapNg(_) => CaptureFormat::PcapNg,
        }
    }

    pub fn next_record(&mut self) -> Result<Option<Record>> {
        match self {
            CaptureReader::Pcap(r) => r.next_record(),
            CaptureReader::PcapNg(r) => r.next_record(),
        }
    }
}

/// Opens a capture file, detecting classic pcap vs pcapng by magic.
pub fn open_capture<P: AsRef<Path>>(path: P) -> Result<CaptureReader<BufReader<File>>> {
    let f = File::open(path)?;
    CaptureReader::new(BufReader::new(f))
}
