
use bytes::{Buf, BufMut};

use crate::error::{Error, Result};
use crate::WireOrder;

pub const HEADER_LENGTH: usize = 12;
pub const VERSION_SHIFT: u8 = 6;
pub const VERSION_MASK: u8 = 0x3;
pub const PADDING_SHIFT: u8 = 5;
pub const PADDING_MASK: u8 = 0x1;
pub const EXTENSION_SHIFT: u8 = 4;
pub const EXTENSION_MASK: u8 = 0x1;
pub const CC_MASK: u8 = 0xF;
pub const MARKER_SHIFT: u8 = 7;
pub const MARKER_MASK: u8 = 0x1;
pub const PT_MASK: u8 = 0x7F;
pub const CSRC_LENGTH: usize = 4;

/// Header represents an RTP packet header.
///
/// Extension words are skipped on parse and accounted in `header_len`; the
/// engine never interprets extension contents.
#[derive(Debug, Eq, PartialEq, Default, Clone)]
pub struct RtpHeader {
    pub version: u8,
    pub padding: bool,
    pub extension: bool,
    pub marker: bool,
    pub payload_type: u8,
    pub sequence_number: u16,
    pub timestamp: u32,
    pub ssrc: u32,
    pub csrc: Vec<u32>,
    /// Total parsed header length including CSRC and extension words.
    pub header_len: usize,
}

impl RtpHeader {
    pub fn marshal_size(&self) -> usize {
        HEADER_LENGTH + self.csrc.len() * CSRC_LENGTH
    }

    /// Parses an RTP header from `buf`, honoring the byte-order tag.
    pub fn parse<B: Buf>(buf: &mut B, order: WireOrder) -> Result<Self> {
        /*
         *  0                   1                   2                   3
         *  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
         * +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
         * |V=2|P|X|  CC   |M|     PT      |       sequence number         |
         * +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
         * |                           timestamp                           |
         * +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
         * |           synchronization source (SSRC) identifier            |
         * +=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+
         * |            contributing source (CSRC) identifiers             |
         * |                             ....                              |
         * +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
         */
        if buf.remaining() < HEADER_LENGTH {
            return Err(Error::ErrRtpHeaderSizeInsufficient);
        }

        let b0 = buf.get_u8();
        let version = b0 >> VERSION_SHIFT & VERSION_MASK;
        if version != 2 {
            return Err(Error::ErrRtpVersion(version));
        }
        let padding = (b0 >> PADDING_SHIFT & PADDING_MASK) > 0;
        let extension = (b0 >> EXTENSION_SHIFT & EXTENSION_MASK) > 0;
        let cc = (b0 & CC_MASK) as usize;

        let b1 = buf.get_u8();
        let marker = (b1 >> MARKER_SHIFT & MARKER_MASK) > 0;
        let payload_type = b1 & PT_MASK;

        let mut b2 = [0u8; 2];
        buf.copy_to_slice(&mut b2);
        let sequence_number = order.u16(b2);
        let mut b4 = [0u8; 4];
        buf.copy_to_slice(&mut b4);
        let timestamp = order.u32(b4);
        buf.copy_to_slice(&mut b4);
        let ssrc = order.u32(b4);

        let mut header_len = HEADER_LENGTH + cc * CSRC_LENGTH;
        if buf.remaining() < cc * CSRC_LENGTH {
            return Err(Error::ErrRtpHeaderSizeInsufficient);
        }
        let mut csrc = Vec::with_capacity(cc);
        for _ in 0..cc {
            buf.copy_to_slice(&mut b4);
            csrc.push(order.u32(b4));
        }

        if extension {
            if buf.remaining() < 4 {
                return Err(Error::ErrRtpHeaderSizeInsufficient);
            }
            buf.copy_to_slice(&mut b2); // profile, uninterpreted
            buf.copy_to_slice(&mut b2);
            let ext_words = order.u16(b2) as usize;
            let ext_len = ext_words * 4;
            if buf.remaining() < ext_len {
                return Err(Error::ErrRtpHeaderSizeInsufficient);
            }
            buf.advance(ext_len);
            header_len += 4 + ext_len;
        }

        Ok(RtpHeader {
            version,
            padding,
            extension,
            marker,
            payload_type,
            sequence_number,
            timestamp,
            ssrc,
            csrc,
            header_len,
        })
    }

    /// Serializes the header into `buf` and returns the bytes written.
    pub fn marshal_to(&self, buf: &mut [u8], order: WireOrder) -> Result<usize> {
        let size = self.marshal_size();
        if buf.len() < size {
            return Err(Error::ErrBufferTooSmall);
        }
        let mut buf = &mut buf[..];

        // The first byte contains the version, padding bit, extension bit
        // and csrc count.
        let mut b0 = (2u8 << VERSION_SHIFT) | self.csrc.len() as u8;
        if self.padding {
            b0 |= 1 << PADDING_SHIFT;
        }
        buf.put_u8(b0);

        let mut b1 = self.payload_type;
        if self.marker {
            b1 |= 1 << MARKER_SHIFT;
        }
        buf.put_u8(b1);

        buf.put_slice(&order.put_u16(self.sequence_number));
        buf.put_slice(&order.put_u32(self.timestamp));
        buf.put_slice(&order.put_u32(self.ssrc));
        for csrc in &self.csrc {
            buf.put_slice(&order.put_u32(*csrc));
        }

        Ok(size)
    }
}
