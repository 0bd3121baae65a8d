use super::*;
use crate::format::{format_packet, ChannelFormatState, FormatOptions};

fn dgram(payload_type: u8, payload: &[u8]) -> Bytes {
    let mut st = ChannelFormatState::new(
        "192.168.1.1:5000".parse().unwrap(),
        "192.168.1.2:6000".parse().unwrap(),
        payload_type,
        0xabcd_0123,
        160,
    );
    format_packet(&mut st, &FormatOptions::default(), payload).unwrap()
}

#[test]
fn parse_rejects_truncated() {
    let raw = dgram(0, &[0u8; 40]);
    let cut = raw.slice(0..24);
    assert!(PacketView::parse(cut, WireOrder::Network).is_err());
}

#[test]
fn parse_rejects_total_len_overrun() {
    let raw = dgram(0, &[0u8; 40]);
    let mut bad = raw.to_vec();
    bad[2] = 0xFF;
    bad[3] = 0xFF; // total_len far beyond the buffer
    assert!(matches!(
        PacketView::parse(Bytes::from(bad), WireOrder::Network),
        Err(Error::ErrPktLenMismatch { .. })
    ));
}

#[test]
fn parse_rejects_non_udp() {
    let raw = dgram(0, &[0u8; 40]);
    let mut bad = raw.to_vec();
    bad[9] = 6; // TCP
    assert!(matches!(
        PacketView::parse(Bytes::from(bad), WireOrder::Network),
        Err(Error::ErrNotUdp(6))
    ));
}

#[test]
fn rtcp_screen() {
    let raw = dgram(72, &[0u8; 8]);
    let view = PacketView::parse(raw, WireOrder::Network).unwrap();
    assert!(view.is_rtcp());

    let raw = dgram(0, &[0u8; 8]);
    let view = PacketView::parse(raw, WireOrder::Network).unwrap();
    assert!(!view.is_rtcp());
}

#[test]
fn dtmf_shape() {
    let raw = dgram(101, &[0x05, 0x8a, 0x03, 0x20]);
    let view = PacketView::parse(raw, WireOrder::Network).unwrap();
    assert!(view.looks_like_dtmf_event());
}

#[test]
fn payload_slice_matches() {
    let payload: Vec<u8> = (0u8..160).collect();
    let raw = dgram(8, &payload);
    let view = PacketView::parse(raw, WireOrder::Network).unwrap();
    assert_eq!(&view.payload()[..], &payload[..]);
}
