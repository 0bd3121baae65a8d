use super::*;
use crate::view::PacketView;

fn state() -> ChannelFormatState {
    ChannelFormatState::new(
        "10.0.0.1:6170".parse().unwrap(),
        "10.0.0.2:10240".parse().unwrap(),
        0,
        0x1111_2222,
        160,
    )
}

#[test]
fn format_then_parse_round_trips_defaults() -> Result<()> {
    let mut st = state();
    let payload = [0x55u8; 160];

    let raw = format_packet(&mut st, &FormatOptions::default(), &payload)?;
    let view = PacketView::parse(raw, WireOrder::Network)?;

    assert_eq!(view.ip_version, 4);
    assert_eq!(view.udp.src_port, 6170);
    assert_eq!(view.udp.dst_port, 10240);
    assert_eq!(view.rtp.payload_type, 0);
    assert_eq!(view.rtp.sequence_number, 0);
    assert_eq!(view.rtp.timestamp, 0);
    assert_eq!(view.rtp.ssrc, 0x1111_2222);
    assert_eq!(view.payload_len, 160);
    assert_eq!(&view.payload()[..], &payload[..]);
    Ok(())
}

#[test]
fn defaults_advance_seq_and_timestamp() -> Result<()> {
    let mut st = state();
    for i in 0..3u16 {
        let raw = format_packet(&mut st, &FormatOptions::default(), &[0u8; 160])?;
        let view = PacketView::parse(raw, WireOrder::Network)?;
        assert_eq!(view.rtp.sequence_number, i);
        assert_eq!(view.rtp.timestamp, i as u32 * 160);
    }
    Ok(())
}

#[test]
fn explicit_fields_do_not_advance_state() -> Result<()> {
    let mut st = state();
    let opts = FormatOptions {
        seqnum: Some(500),
        timestamp: Some(80_000),
        marker: Some(true),
        ..Default::default()
    };
    let raw = format_packet(&mut st, &opts, &[0u8; 160])?;
    let view = PacketView::parse(raw, WireOrder::Network)?;
    assert_eq!(view.rtp.sequence_number, 500);
    assert_eq!(view.rtp.timestamp, 80_000);
    assert!(view.rtp.marker);
    assert_eq!(st.next_seq, 0);
    assert_eq!(st.next_timestamp, 0);
    Ok(())
}

#[test]
fn rtp_event_keeps_timestamp() -> Result<()> {
    let mut st = state();
    let opts = FormatOptions {
        rtp_event: true,
        ..Default::default()
    };
    format_packet(&mut st, &opts, &[1, 2, 3, 4])?;
    format_packet(&mut st, &opts, &[1, 2, 3, 4])?;
    assert_eq!(st.next_timestamp, 0, "event packets share the start timestamp");
    assert_eq!(st.next_seq, 2, "sequence still advances");
    Ok(())
}

#[test]
fn ipv6_format_parses() -> Result<()> {
    let mut st = ChannelFormatState::new(
        "[2001:db8::1]:5000".parse().unwrap(),
        "[2001:db8::2]:5002".parse().unwrap(),
        96,
        7,
        320,
    );
    let raw = format_packet(&mut st, &FormatOptions::default(), &[9u8; 33])?;
    let view = PacketView::parse(raw, WireOrder::Network)?;
    assert_eq!(view.ip_version, 6);
    assert_eq!(view.rtp.payload_type, 96);
    assert_eq!(view.payload_len, 33);
    Ok(())
}

#[test]
fn mixed_ip_versions_rejected() {
    let mut st = state();
    let opts = FormatOptions {
        dst_ip: Some("2001:db8::2".parse().unwrap()),
        ..Default::default()
    };
    assert_eq!(
        format_packet(&mut st, &opts, &[0u8; 4]),
        Err(Error::ErrMixedIpVersions)
    );
}
