#[cfg(test)]
mod dtmf_test;

use bytes::{Buf, BufMut};
use util::marshal::{Marshal, MarshalSize, Unmarshal};

use crate::error::{Error, Result};

pub const EVENT_PAYLOAD_LENGTH: usize = 4;

/// RFC 4733 telephone-event payload.
///
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |     event     |E|R| volume    |          duration             |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
///
/// Several packets may repeat the same event timestamp; the last one (E bit
/// set, possibly duplicated) carries the final duration.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DtmfEvent {
    pub event: u8,
    pub end: bool,
    pub volume: u8,
    pub duration: u16,
}

impl MarshalSize for DtmfEvent {
    fn marshal_size(&self) -> usize {
        EVENT_PAYLOAD_LENGTH
    }
}

impl Unmarshal for DtmfEvent {
    fn unmarshal<B>(buf: &mut B) -> util::error::Result<Self>
    where
        Self: Sized,
        B: Buf,
    {
        if buf.remaining() < EVENT_PAYLOAD_LENGTH {
            return Err(util::Error::ErrBufferTooSmall);
        }
        let event = buf.get_u8();
        let b1 = buf.get_u8();
        let end = b1 & 0x80 != 0;
        let volume = b1 & 0x3F;
        let duration = buf.get_u16();
        Ok(DtmfEvent {
            event,
            end,
            volume,
            duration,
        })
    }
}

impl Marshal for DtmfEvent {
    fn marshal_to(&self, buf: &mut [u8]) -> util::error::Result<usize> {
        if buf.len() < EVENT_PAYLOAD_LENGTH {
            return Err(util::Error::ErrBufferTooSmall);
        }
        let mut b = &mut buf[..];
        b.put_u8(self.event);
        let mut b1 = self.volume & 0x3F;
        if self.end {
            b1 |= 0x80;
        }
        b.put_u8(b1);
        b.put_u16(self.duration);
        Ok(EVENT_PAYLOAD_LENGTH)
    }
}

/// Decodes an RFC 4733 payload into (event, duration, volume).
pub fn get_dtmf_info(payload: &[u8]) -> Result<DtmfEvent> {
    if payload.len() != EVENT_PAYLOAD_LENGTH {
        return Err(Error::ErrBadEventPayload(payload.len()));
    }
    let mut buf = payload;
    DtmfEvent::unmarshal(&mut buf).map_err(Error::from)
}
