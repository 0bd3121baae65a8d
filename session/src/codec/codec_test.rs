use super::*;

#[test]
fn static_payload_types() {
    let e = estimate_codec_type(&[0x55; 160], 0).unwrap();
    assert_eq!(e.codec, CodecType::G711U);
    let e = estimate_codec_type(&[0xD5; 160], 8).unwrap();
    assert_eq!(e.codec, CodecType::G711A);
}

#[test]
fn evs_compact_13200_from_size_33() {
    // first byte outside the AMR CMR patterns
    let payload = [0x0Cu8; 33];
    let e = estimate_codec_type(&payload, 96).unwrap();
    assert_eq!(e.codec, CodecType::Evs);
    assert_eq!(e.bitrate, 13200);
}

#[test]
fn evs_sizes_24400() {
    for n in [61usize, 62, 63] {
        let payload = vec![0x0Cu8; n];
        let e = estimate_codec_type(&payload, 96).unwrap();
        assert_eq!(e.codec, CodecType::Evs, "size {n}");
        assert_eq!(e.bitrate, 24400, "size {n}");
    }
}

#[test]
fn amr_wb_23850_wins_sizes_61_62_on_cmr() {
    // 0xf0..0xf7 first byte claims the sizes for AMR-WB
    let mut payload = vec![0u8; 62];
    payload[0] = 0xf4;
    payload[1] = 0x00;
    let e = estimate_codec_type(&payload, 96).unwrap();
    assert_eq!(e.codec, CodecType::AmrWb);
    assert_eq!(e.bitrate, 23850);
}

#[test]
fn amr_octet_aligned_33_beats_evs() {
    let mut payload = vec![0u8; 33];
    payload[0] = 0xf0;
    payload[1] = 0x3C; // follow bit clear
    let e = estimate_codec_type(&payload, 96).unwrap();
    assert_eq!(e.codec, CodecType::AmrNb);
    assert_eq!(e.bitrate, 12200);
}

#[test]
fn amr_bandwidth_efficient_sid() {
    let mut payload = vec![0u8; 6];
    payload[0] = 0xf1;
    payload[1] = 0x00;
    let e = estimate_codec_type(&payload, 96).unwrap();
    assert_eq!(e.codec, CodecType::AmrNb);
    assert_eq!(e.bitrate, 12200);
}

#[test]
fn amr_wb_bandwidth_efficient_frames() {
    for (n, bitrate) in [(37usize, 14250u32), (47, 18250), (51, 19850), (59, 23050)] {
        let mut payload = vec![0u8; n];
        payload[0] = 0x21;
        payload[1] = 0x00;
        let e = estimate_codec_type(&payload, 96).unwrap();
        assert_eq!(e.codec, CodecType::AmrWb, "size {n}");
        assert_eq!(e.bitrate, bitrate, "size {n}");
    }
}

#[test]
fn unknown_size_fails() {
    assert!(estimate_codec_type(&[0u8; 100], 96).is_none());
    assert!(estimate_codec_type(&[0u8; 1], 96).is_none());
}
