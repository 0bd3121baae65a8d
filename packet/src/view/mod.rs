#[cfg(test)]
mod view_test;

use std::net::IpAddr;

use bytes::Bytes;

use crate::error::{Error, Result};
use crate::ip::{Ipv4Header, Ipv6Header, UdpHeader, PROTOCOL_UDP};
use crate::rtp::RtpHeader;
use crate::WireOrder;

/// Parsed, immutable view over one IP/UDP/RTP datagram. The underlying
/// bytes are kept alongside the parsed fields so the view can be re-emitted
/// or sliced without another copy. The byte-order tag used at parse time is
/// carried with the view.
#[derive(Debug, Clone)]
pub struct PacketView {
    raw: Bytes,
    pub order: WireOrder,
    pub ip_version: u8,
    pub src_addr: IpAddr,
    pub dst_addr: IpAddr,
    pub ip_header_len: usize,
    pub udp: UdpHeader,
    pub rtp: RtpHeader,
    pub payload_ofs: usize,
    pub payload_len: usize,
}

impl PacketView {
    /// Parses a prepared IP datagram (no link layer). Rejects anything that
    /// is not v4/v6 + UDP + well-formed RTP.
    pub fn parse(raw: Bytes, order: WireOrder) -> Result<Self> {
        if raw.is_empty() {
            return Err(Error::ErrIpHeaderSizeInsufficient);
        }
        let version = raw[0] >> 4;
        let mut buf = &raw[..];

        let (src_addr, dst_addr, ip_header_len, ip_payload_len, protocol) = match version {
            4 => {
                let h = Ipv4Header::parse(&mut buf, order)?;
                let total = h.total_len as usize;
                if total > raw.len() || total < h.header_len {
                    return Err(Error::ErrPktLenMismatch {
                        total,
                        actual: raw.len(),
                    });
                }
                (
                    IpAddr::V4(h.src),
                    IpAddr::V4(h.dst),
                    h.header_len,
                    total - h.header_len,
                    h.protocol,
                )
            }
            6 => {
                let h = Ipv6Header::parse(&mut buf, order)?;
                let total = 40 + h.payload_len as usize;
                if total > raw.len() {
                    return Err(Error::ErrPktLenMismatch {
                        total,
                        actual: raw.len(),
                    });
                }
                (
                    IpAddr::V6(h.src),
                    IpAddr::V6(h.dst),
                    40usize,
                    h.payload_len as usize,
                    h.next_header,
                )
            }
            v => return Err(Error::ErrBadIpVersion(v)),
        };

        if protocol != PROTOCOL_UDP {
            return Err(Error::ErrNotUdp(protocol));
        }

        let udp = UdpHeader::parse(&mut buf, order)?;
        let udp_payload_len = ip_payload_len
            .checked_sub(8)
            .ok_or(Error::ErrUdpHeaderSizeInsufficient)?;

        let rtp_start = ip_header_len + 8;
        let mut rtp_buf = &raw[rtp_start..rtp_start + udp_payload_len.min(raw.len() - rtp_start)];
        let rtp = RtpHeader::parse(&mut rtp_buf, order)?;

        let payload_ofs = rtp_start + rtp.header_len;
        let payload_len = udp_payload_len
            .checked_sub(rtp.header_len)
            .ok_or(Error::ErrBadPayloadOffset)?;
        if payload_ofs + payload_len > raw.len() {
            return Err(Error::ErrBadPayloadOffset);
        }

        Ok(PacketView {
            raw,
            order,
            ip_version: version,
            src_addr,
            dst_addr,
            ip_header_len,
            udp,
            rtp,
            payload_ofs,
            payload_len,
        })
    }

    pub fn raw(&self) -> &Bytes {
        &self.raw
    }

    pub fn into_raw(self) -> Bytes {
        self.raw
    }

    pub fn payload(&self) -> Bytes {
        self.raw
            .slice(self.payload_ofs..self.payload_ofs + self.payload_len)
    }

    pub fn is_rtcp(&self) -> bool {
        crate::is_rtcp_payload_type(self.rtp.payload_type)
    }

    /// RFC 4733 telephone-event payloads are 4 bytes.
    pub fn looks_like_dtmf_event(&self) -> bool {
        self.payload_len == 4
    }
}
