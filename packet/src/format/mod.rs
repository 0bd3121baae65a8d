#[cfg(test)]
mod format_test;

use std::net::{IpAddr, SocketAddr};

use bytes::{Bytes, BytesMut};

use crate::error::{Error, Result};
use crate::ip::{
    udp_checksum, Ipv4Header, Ipv6Header, UdpHeader, IPV4_HEADER_LENGTH, IPV6_HEADER_LENGTH,
    PROTOCOL_UDP, UDP_HEADER_LENGTH,
};
use crate::rtp::RtpHeader;
use crate::WireOrder;

/// Per-field overrides for packet formatting. Fields left `None` are
/// supplied from the channel state; sequence number and timestamp
/// auto-increment when defaulted.
#[derive(Debug, Default, Clone)]
pub struct FormatOptions {
    pub payload_type: Option<u8>,
    pub marker: Option<bool>,
    pub seqnum: Option<u16>,
    pub timestamp: Option<u32>,
    pub ssrc: Option<u32>,
    pub src_ip: Option<IpAddr>,
    pub dst_ip: Option<IpAddr>,
    pub src_port: Option<u16>,
    pub dst_port: Option<u16>,
    pub disable_ipv4_checksum: bool,
    /// RFC 4733 event packets share the timestamp of the event start; the
    /// channel timestamp is not advanced.
    pub rtp_event: bool,
}

/// Outbound header state owned by a channel: addresses, payload type, SSRC
/// and the running sequence/timestamp counters.
#[derive(Debug, Clone)]
pub struct ChannelFormatState {
    pub src_addr: SocketAddr,
    pub dst_addr: SocketAddr,
    pub payload_type: u8,
    pub ssrc: u32,
    pub next_seq: u16,
    pub next_timestamp: u32,
    /// RTP timestamp units to advance per formatted media packet.
    pub units_per_ptime: u32,
    ip_id: u16,
}

impl ChannelFormatState {
    pub fn new(
        src_addr: SocketAddr,
        dst_addr: SocketAddr,
        payload_type: u8,
        ssrc: u32,
        units_per_ptime: u32,
    ) -> Self {
        ChannelFormatState {
            src_addr,
            dst_addr,
            payload_type,
            ssrc,
            next_seq: 0,
            next_timestamp: 0,
            units_per_ptime,
            ip_id: 0,
        }
    }

    pub fn with_random_ssrc(mut self) -> Self {
        self.ssrc = rand::random::<u32>();
        self
    }
}

/// Builds a complete IP/UDP/RTP datagram around `payload`. Absent options
/// come from (and advance) the channel state.
pub fn format_packet(
    state: &mut ChannelFormatState,
    opts: &FormatOptions,
    payload: &[u8],
) -> Result<Bytes> {
    let order = WireOrder::Network;

    let src_ip = opts.src_ip.unwrap_or_else(|| state.src_addr.ip());
    let dst_ip = opts.dst_ip.unwrap_or_else(|| state.dst_addr.ip());
    let src_port = opts.src_port.unwrap_or_else(|| state.src_addr.port());
    let dst_port = opts.dst_port.unwrap_or_else(|| state.dst_addr.port());

    let seqnum = match opts.seqnum {
        Some(s) => s,
        None => {
            let s = state.next_seq;
            state.next_seq = state.next_seq.wrapping_add(1);
            s
        }
    };
    let timestamp = match opts.timestamp {
        Some(t) => t,
        None => {
            let t = state.next_timestamp;
            if !opts.rtp_event {
                state.next_timestamp = state.next_timestamp.wrapping_add(state.units_per_ptime);
            }
            t
        }
    };

    let rtp = RtpHeader {
        version: 2,
        padding: false,
        extension: false,
        marker: opts.marker.unwrap_or(false),
        payload_type: opts.payload_type.unwrap_or(state.payload_type),
        sequence_number: seqnum,
        timestamp,
        ssrc: opts.ssrc.unwrap_or(state.ssrc),
        csrc: vec![],
        header_len: 0,
    };

    let rtp_len = rtp.marshal_size() + payload.len();
    let udp_len = UDP_HEADER_LENGTH + rtp_len;

    let (ip_header_len, total_len) = match (src_ip, dst_ip) {
        (IpAddr::V4(_), IpAddr::V4(_)) => (IPV4_HEADER_LENGTH, IPV4_HEADER_LENGTH + udp_len),
        (IpAddr::V6(_), IpAddr::V6(_)) => (IPV6_HEADER_LENGTH, IPV6_HEADER_LENGTH + udp_len),
        _ => return Err(Error::ErrMixedIpVersions),
    };

    let mut buf = BytesMut::with_capacity(total_len);
    buf.resize(total_len, 0);

    match (src_ip, dst_ip) {
        (IpAddr::V4(s), IpAddr::V4(d)) => {
            state.ip_id = state.ip_id.wrapping_add(1);
            let ip = Ipv4Header {
                dscp: 0,
                total_len: total_len as u16,
                identification: state.ip_id,
                ttl: 64,
                protocol: PROTOCOL_UDP,
                checksum: 0,
                src: s,
                dst: d,
                header_len: IPV4_HEADER_LENGTH,
            };
            ip.marshal_to(&mut buf[..], order, !opts.disable_ipv4_checksum)?;
        }
        (IpAddr::V6(s), IpAddr::V6(d)) => {
            let ip = Ipv6Header {
                traffic_class: 0,
                payload_len: udp_len as u16,
                next_header: PROTOCOL_UDP,
                hop_limit: 64,
                src: s,
                dst: d,
            };
            ip.marshal_to(&mut buf[..], order)?;
        }
        _ => unreachable!(),
    }

    let udp = UdpHeader {
        src_port,
        dst_port,
        length: udp_len as u16,
        checksum: 0,
    };
    udp.marshal_to(&mut buf[ip_header_len..], order)?;

    let rtp_ofs = ip_header_len + UDP_HEADER_LENGTH;
    rtp.marshal_to(&mut buf[rtp_ofs..], order)?;
    buf[rtp_ofs + rtp.marshal_size()..].copy_from_slice(payload);

    // UDP checksum last, over the finished datagram
    let sum = udp_checksum(&src_ip, &dst_ip, &buf[ip_header_len..]);
    buf[ip_header_len + 6..ip_header_len + 8].copy_from_slice(&sum.to_be_bytes());

    Ok(buf.freeze())
}
