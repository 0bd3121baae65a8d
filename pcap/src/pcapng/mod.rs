#[cfg(test)]
mod pcapng_test;

use std::io::Read;

use byteorder::{BigEndian, ByteOrder, LittleEndian, ReadBytesExt};
use bytes::Bytes;
use util::time::MicroSecs;

use crate::error::{Error, Result};
use crate::link::LinkType;
use crate::reader::Record;
use crate::PCAPNG_BLOCK_MAGIC;

pub const BLOCK_TYPE_SHB: u32 = 0x0A0D_0D0A;
pub const BLOCK_TYPE_IDB: u32 = 0x0000_0001;
pub const BLOCK_TYPE_SPB: u32 = 0x0000_0003;
pub const BLOCK_TYPE_EPB: u32 = 0x0000_0006;
pub const BYTE_ORDER_MAGIC: u32 = 0x1A2B_3C4D;
pub const OPT_END: u16 = 0;
pub const OPT_IF_TSRESOL: u16 = 9;

/// One capture interface from an IDB: link type, snap length and timestamp
/// resolution (ticks per second).
#[derive(Debug, Clone, Copy)]
pub struct Interface {
    pub link_type: LinkType,
    pub snaplen: u32,
    pub ticks_per_sec: u64,
}

/// Read-only pcapng stream: SHB, IDB and EPB/SPB blocks. Unknown block
/// types are skipped. Write support intentionally does not exist; the
/// writer side of the capture layer emits classic pcap only.
pub struct PcapNgReader<R: Read> {
    r: R,
    big_endian: bool,
    interfaces: Vec<Interface>,
    section_snaplen: u32,
}

impl<R: Read> PcapNgReader<R> {
    /// `PCAPNG_BLOCK_MAGIC` has already been consumed by format detection.
    pub(crate) fn after_magic(mut r: R) -> Result<Self> {
        // remainder of the SHB: total length, byte-order magic, version,
        // section length, options
        let mut len_bytes = [0u8; 4];
        r.read_exact(&mut len_bytes)?;
        let mut bom = [0u8; 4];
        r.read_exact(&mut bom)?;
        let big_endian = match BigEndian::read_u32(&bom) {
            BYTE_ORDER_MAGIC => true,
            m if LittleEndian::read_u32(&bom) == BYTE_ORDER_MAGIC => {
                let _ = m;
                false
            }
            _ => return Err(Error::DidntStartWithShb),
        };
        let total_len = if big_endian {
            BigEndian::read_u32(&len_bytes)
        } else {
            LittleEndian::read_u32(&len_bytes)
        };
        if total_len < 28 || total_len % 4 != 0 {
            return Err(Error::BlockLengthTooShort(total_len));
        }
        // skip version + section length + options + trailing length
        let mut rest = vec![0u8; total_len as usize - 12];
        r.read_exact(&mut rest)?;
        let trailer_ofs = rest.len() - 4;
        let trailer = if big_endian {
            BigEndian::read_u32(&rest[trailer_ofs..])
        } else {
            LittleEndian::read_u32(&rest[trailer_ofs..])
        };
        if trailer != total_len {
            return Err(Error::BlockLengthMismatch(total_len, trailer));
        }

        Ok(PcapNgReader {
            r,
            big_endian,
            interfaces: vec![],
            section_snaplen: 0,
        })
    }

    fn u16_at(&self, b: &[u8]) -> u16 {
        if self.big_endian {
            BigEndian::read_u16(b)
        } else {
            LittleEndian::read_u16(b)
        }
    }

    fn u32_at(&self, b: &[u8]) -> u32 {
        if self.big_endian {
            BigEndian::read_u32(b)
        } else {
            LittleEndian::read_u32(b)
        }
    }

    fn parse_idb(&mut self, body: &[u8]) -> Result<()> {
        if body.len() < 8 {
            return Err(Error::BlockLengthTooShort(body.len() as u32));
        }
        let link = self.u16_at(&body[0..2]);
        let snaplen = self.u32_at(&body[4..8]);
        let mut ticks_per_sec: u64 = 1_000_000; // default 10^-6
        let mut opts = &body[8..];
        while opts.len() >= 4 {
            let code = self.u16_at(&opts[0..2]);
            let olen = self.u16_at(&opts[2..4]) as usize;
            let padded = (olen + 3) & !3;
            if code == OPT_END {
                break;
            }
            if opts.len() < 4 + olen {
                break;
            }
            if code == OPT_IF_TSRESOL && olen == 1 {
                let v = opts[4];
                ticks_per_sec = if v & 0x80 != 0 {
                    1u64 << (v & 0x7F)
                } else {
                    10u64.pow((v & 0x7F).min(18) as u32)
                };
            }
            opts = &opts[4 + padded..];
        }
        self.interfaces.push(Interface {
            link_type: LinkType::from(link),
            snaplen,
            ticks_per_sec,
        });
        self.section_snaplen = snaplen;
        Ok(())
    }

    pub fn interfaces(&self) -> &[Interface] {
        &self.interfaces
    }

    /// Returns the next packet record, skipping non-packet blocks.
    pub fn next_record(&mut self) -> Result<Option<Record>> {
        loop {
            let mut head = [0u8; 8];
            match self.r.read_exact(&mut head[..4]) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
                Err(e) => return Err(e.into()),
            }
            self.r.read_exact(&mut head[4..])?;
            let block_type = self.u32_at(&head[0..4]);
            let total_len = self.u32_at(&head[4..8]);
            if total_len < 12 || total_len % 4 != 0 {
                return Err(Error::BlockLengthTooShort(total_len));
            }
            let mut body = vec![0u8; total_len as usize - 12];
            self.r.read_exact(&mut body)?;
            let trailer = self.r.read_u32::<LittleEndian>().map(|v| {
                if self.big_endian {
                    v.swap_bytes()
                } else {
                    v
                }
            })?;
            if trailer != total_len {
                return Err(Error::BlockLengthMismatch(total_len, trailer));
            }

            match block_type {
                BLOCK_TYPE_SHB => {
                    // new section resets the interface list
                    if body.len() < 4 || self.u32_at(&body[0..4]) != BYTE_ORDER_MAGIC {
                        return Err(Error::DidntStartWithShb);
                    }
                    self.interfaces.clear();
                }
                BLOCK_TYPE_IDB => self.parse_idb(&body)?,
                BLOCK_TYPE_EPB => {
                    if body.len() < 20 {
                        return Err(Error::BlockLengthTooShort(total_len));
                    }
                    let if_id = self.u32_at(&body[0..4]);
                    let iface = *self
                        .interfaces
                        .get(if_id as usize)
                        .ok_or(Error::UnknownInterface(if_id))?;
                    let ts_high = self.u32_at(&body[4..8]) as u64;
                    let ts_low = self.u32_at(&body[8..12]) as u64;
                    let incl_len = self.u32_at(&body[12..16]) as usize;
                    let orig_len = self.u32_at(&body[16..20]);
                    if body.len() < 20 + incl_len {
                        return Err(Error::TruncatedRecord {
                            expected: incl_len,
                            actual: body.len() - 20,
                        });
                    }
                    let ticks = (ts_high << 32) | ts_low;
                    let micros = ticks as u128 * 1_000_000 / iface.ticks_per_sec as u128;
                    return Ok(Some(Record {
                        ts: MicroSecs(micros as u64),
                        data: Bytes::copy_from_slice(&body[20..20 + incl_len]),
                        orig_len,
                        link_type: iface.link_type,
                    }));
                }
                BLOCK_TYPE_SPB => {
                    let iface = *self
                        .interfaces
                        .first()
                        .ok_or(Error::UnknownInterface(0))?;
                    if body.len() < 4 {
                        return Err(Error::BlockLengthTooShort(total_len));
                    }
                    let orig_len = self.u32_at(&body[0..4]);
                    let incl = (orig_len as usize).min(body.len() - 4);
                    return Ok(Some(Record {
                        ts: MicroSecs(0),
                        data: Bytes::copy_from_slice(&body[4..4 + incl]),
                        orig_len,
                        link_type: iface.link_type,
                    }));
                }
                _ => {} // name resolution, statistics, custom: skipped
            }
        }
    }
}

/// Leading block-type word of a pcapng stream, used by format detection.
pub fn is_pcapng_magic(magic: u32) -> bool {
    magic == PCAPNG_BLOCK_MAGIC
}
