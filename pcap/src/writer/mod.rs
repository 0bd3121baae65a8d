#[cfg(test)]
mod writer_test;

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use byteorder::{LittleEndian, WriteBytesExt};
use log::info;
use util::time::MicroSecs;

use crate::error::Result;
use crate::link::LinkType;
use crate::{PCAP_MAGIC, PCAP_VERSION_MAJOR, PCAP_VERSION_MINOR};

pub const DEFAULT_SNAPLEN: u32 = 65535;

/// Classic pcap writer. Only the classic format is emitted; requests to
/// write pcapng produce classic pcap with a notice (see
/// [`open_pcap_writer`]).
pub struct PcapWriter<W: Write> {
    w: W,
    link_type: LinkType,
}

impl<W: Write> PcapWriter<W> {
    pub fn new(mut w: W, link_type: LinkType) -> Result<Self> {
        w.write_u32::<LittleEndian>(PCAP_MAGIC)?;
        w.write_u16::<LittleEndian>(PCAP_VERSION_MAJOR)?;
        w.write_u16::<LittleEndian>(PCAP_VERSION_MINOR)?;
        w.write_i32::<LittleEndian>(0)?; // thiszone
        w.write_u32::<LittleEndian>(0)?; // sigfigs
        w.write_u32::<LittleEndian>(DEFAULT_SNAPLEN)?;
        w.write_u32::<LittleEndian>(link_type.code() as u32)?;
        Ok(PcapWriter { w, link_type })
    }

    pub fn link_type(&self) -> LinkType {
        self.link_type
    }

    pub fn write_record(&mut self, ts: MicroSecs, data: &[u8]) -> Result<()> {
        self.w.write_u32::<LittleEndian>((ts.0 / 1_000_000) as u32)?;
        self.w.write_u32::<LittleEndian>((ts.0 % 1_000_000) as u32)?;
        self.w.write_u32::<LittleEndian>(data.len() as u32)?;
        self.w.write_u32::<LittleEndian>(data.len() as u32)?;
        self.w.write_all(data)?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.w.flush()?;
        Ok(())
    }
}

/// Opens `path` for writing classic pcap. A `.pcapng` path is honored but
/// the contents are classic pcap; a notice is logged.
pub fn open_pcap_writer<P: AsRef<Path>>(
    path: P,
    link_type: LinkType,
) -> Result<PcapWriter<BufWriter<File>>> {
    let path = path.as_ref();
    if path.extension().map(|e| e == "pcapng").unwrap_or(false) {
        info!(
            "{}: pcapng write not supported, writing classic pcap format",
            path.display()
        );
    }
    let f = File::create(path)?;
    PcapWriter::new(BufWriter::new(f), link_type)
}
