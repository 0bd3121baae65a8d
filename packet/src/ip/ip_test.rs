use super::*;

fn sample_ipv4() -> Vec<u8> {
    // 20-byte IPv4 header, UDP, 10.0.0.1 -> 10.0.0.2, total_len 32
    vec![
        0x45, 0x00, 0x00, 0x20, 0x00, 0x01, 0x00, 0x00, 0x40, 0x11, 0x00, 0x00, 10, 0, 0, 1, 10,
        0, 0, 2,
    ]
}

#[test]
fn test_ipv4_parse() -> Result<()> {
    let raw = sample_ipv4();
    let mut buf = &raw[..];
    let h = Ipv4Header::parse(&mut buf, WireOrder::Network)?;
    assert_eq!(h.total_len, 32);
    assert_eq!(h.protocol, PROTOCOL_UDP);
    assert_eq!(h.src, Ipv4Addr::new(10, 0, 0, 1));
    assert_eq!(h.dst, Ipv4Addr::new(10, 0, 0, 2));
    assert_eq!(h.header_len, 20);
    Ok(())
}

#[test]
fn test_ipv4_wrong_version() {
    let mut raw = sample_ipv4();
    raw[0] = 0x65;
    let mut buf = &raw[..];
    assert_eq!(
        Ipv4Header::parse(&mut buf, WireOrder::Network),
        Err(Error::ErrBadIpVersion(6))
    );
}

#[test]
fn test_ipv4_round_trip_with_checksum() -> Result<()> {
    let h = Ipv4Header {
        dscp: 0,
        total_len: 200,
        identification: 7,
        ttl: 64,
        protocol: PROTOCOL_UDP,
        checksum: 0,
        src: Ipv4Addr::new(192, 168, 1, 10),
        dst: Ipv4Addr::new(192, 168, 1, 20),
        header_len: 20,
    };
    let mut out = [0u8; 20];
    h.marshal_to(&mut out, WireOrder::Network, true)?;

    // a correct header sums to zero when the checksum field is included
    assert_eq!(header_checksum(&out), 0);

    let mut buf = &out[..];
    let parsed = Ipv4Header::parse(&mut buf, WireOrder::Network)?;
    assert_eq!(parsed.src, h.src);
    assert_eq!(parsed.dst, h.dst);
    assert_eq!(parsed.total_len, 200);
    Ok(())
}

#[test]
fn test_ipv6_round_trip() -> Result<()> {
    let h = Ipv6Header {
        traffic_class: 0,
        payload_len: 172,
        next_header: PROTOCOL_UDP,
        hop_limit: 64,
        src: "2001:db8::1".parse().unwrap(),
        dst: "2001:db8::2".parse().unwrap(),
    };
    let mut out = [0u8; 40];
    h.marshal_to(&mut out, WireOrder::Network)?;
    let mut buf = &out[..];
    let parsed = Ipv6Header::parse(&mut buf, WireOrder::Network)?;
    assert_eq!(parsed, h);
    Ok(())
}

#[test]
fn test_udp_round_trip() -> Result<()> {
    let h = UdpHeader {
        src_port: 6170,
        dst_port: 10240,
        length: 180,
        checksum: 0,
    };
    let mut out = [0u8; 8];
    h.marshal_to(&mut out, WireOrder::Network)?;
    let mut buf = &out[..];
    assert_eq!(UdpHeader::parse(&mut buf, WireOrder::Network)?, h);
    Ok(())
}

#[test]
fn test_udp_checksum_nonzero() {
    let src = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1));
    let dst = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2));
    let dgram = [0x18, 0x1a, 0x28, 0x00, 0x00, 0x0c, 0x00, 0x00, 0xab, 0xcd, 0xef, 0x01];
    let sum = udp_checksum(&src, &dst, &dgram);
    assert_ne!(sum, 0);
}
