use bytes::Bytes;

use crate::error::{Error, Result};

pub const ETHERTYPE_IPV4: u16 = 0x0800;
pub const ETHERTYPE_IPV6: u16 = 0x86DD;
pub const ETHERTYPE_VLAN: u16 = 0x8100;
pub const ETHERNET_HEADER_LEN: usize = 14;
pub const VLAN_TAG_LEN: usize = 4;

/// Link types the capture layer knows how to strip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkType {
    /// BSD loopback: 4-byte AF_ value before the IP header.
    Null,
    /// D/I/X Ethernet.
    Ethernet,
    /// Raw IP, no link header.
    RawIp,
    /// Linux cooked capture, 16-byte header.
    LinuxSll,
    Unknown(u16),
}

impl From<u16> for LinkType {
    fn from(v: u16) -> Self {
        match v {
            0 => LinkType::Null,
            1 => LinkType::Ethernet,
            12 | 101 => LinkType::RawIp,
            113 => LinkType::LinuxSll,
            other => LinkType::Unknown(other),
        }
    }
}

impl LinkType {
    pub fn code(self) -> u16 {
        match self {
            LinkType::Null => 0,
            LinkType::Ethernet => 1,
            LinkType::RawIp => 101,
            LinkType::LinuxSll => 113,
            LinkType::Unknown(v) => v,
        }
    }
}

/// Strips the link-layer header from a captured frame, returning the IP
/// datagram. Handles one 802.1Q VLAN tag between the Ethernet header and
/// the IP header.
pub fn strip_link_layer(link: LinkType, frame: Bytes) -> Result<Bytes> {
    match link {
        LinkType::RawIp => Ok(frame),
        LinkType::Null => {
            if frame.len() < 4 {
                return Err(Error::TruncatedLinkLayer);
            }
            Ok(frame.slice(4..))
        }
        LinkType::LinuxSll => {
            if frame.len() < 16 {
                return Err(Error::TruncatedLinkLayer);
            }
            Ok(frame.slice(16..))
        }
        LinkType::Ethernet => {
            if frame.len() < ETHERNET_HEADER_LEN {
                return Err(Error::TruncatedLinkLayer);
            }
            let mut ofs = ETHERNET_HEADER_LEN;
            let mut ethertype = u16::from_be_bytes([frame[12], frame[13]]);
            if ethertype == ETHERTYPE_VLAN {
                if frame.len() < ofs + VLAN_TAG_LEN {
                    return Err(Error::TruncatedLinkLayer);
                }
                ethertype = u16::from_be_bytes([frame[16], frame[17]]);
                ofs += VLAN_TAG_LEN;
            }
            match ethertype {
                ETHERTYPE_IPV4 | ETHERTYPE_IPV6 => Ok(frame.slice(ofs..)),
                other => Err(Error::UnknownEtherType(other)),
            }
        }
        LinkType::Unknown(v) => Err(Error::UnsupportedLinkType(v)),
    }
}

#[cfg(test)]
mod link_test {
    use super::*;

    fn eth_frame(ethertype: u16, vlan: bool, payload: &[u8]) -> Bytes {
        let mut f = vec![0u8; 12];
        if vlan {
            f.extend_from_slice(&ETHERTYPE_VLAN.to_be_bytes());
            f.extend_from_slice(&[0x00, 0x64]); // VLAN 100
        }
        f.extend_from_slice(&ethertype.to_be_bytes());
        f.extend_from_slice(payload);
        Bytes::from(f)
    }

    #[test]
    fn ethernet_strip() {
        let ip = [0x45u8, 0, 0, 20];
        let out = strip_link_layer(LinkType::Ethernet, eth_frame(ETHERTYPE_IPV4, false, &ip))
            .unwrap();
        assert_eq!(&out[..], &ip[..]);
    }

    #[test]
    fn vlan_tag_skipped() {
        let ip = [0x45u8, 0, 0, 20];
        let out =
            strip_link_layer(LinkType::Ethernet, eth_frame(ETHERTYPE_IPV4, true, &ip)).unwrap();
        assert_eq!(&out[..], &ip[..]);
    }

    #[test]
    fn raw_ip_passthrough() {
        let ip = Bytes::from_static(&[0x60, 0, 0, 0]);
        assert_eq!(strip_link_layer(LinkType::RawIp, ip.clone()).unwrap(), ip);
    }

    #[test]
    fn unknown_ethertype_rejected() {
        let out = strip_link_layer(LinkType::Ethernet, eth_frame(0x0806, false, &[0u8; 28]));
        assert!(matches!(out, Err(Error::UnknownEtherType(0x0806))));
    }
}
