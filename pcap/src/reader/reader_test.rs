use std::io::Cursor;

use super::*;

/// Big-endian classic pcap bytes, one 4-byte record.
fn be_fixture() -> Vec<u8> {
    let mut f = Vec::new();
    f.extend_from_slice(&0xa1b2_c3d4u32.to_be_bytes());
    f.extend_from_slice(&2u16.to_be_bytes());
    f.extend_from_slice(&4u16.to_be_bytes());
    f.extend_from_slice(&0i32.to_be_bytes());
    f.extend_from_slice(&0u32.to_be_bytes());
    f.extend_from_slice(&65535u32.to_be_bytes());
    f.extend_from_slice(&101u32.to_be_bytes()); // raw IP
    f.extend_from_slice(&3u32.to_be_bytes()); // ts_sec
    f.extend_from_slice(&250_000u32.to_be_bytes()); // ts_usec
    f.extend_from_slice(&4u32.to_be_bytes()); // incl_len
    f.extend_from_slice(&4u32.to_be_bytes()); // orig_len
    f.extend_from_slice(&[0xAA, 0xBB, 0xCC, 0xDD]);
    f
}

#[test]
fn big_endian_file() -> Result<()> {
    let mut r = CaptureReader::new(Cursor::new(be_fixture()))?;
    let rec = r.next_record()?.expect("record");
    assert_eq!(rec.ts, MicroSecs(3_250_000));
    assert_eq!(rec.link_type, LinkType::RawIp);
    assert_eq!(&rec.data[..], &[0xAA, 0xBB, 0xCC, 0xDD]);
    assert!(r.next_record()?.is_none());
    Ok(())
}

#[test]
fn nanosecond_magic() -> Result<()> {
    let mut f = be_fixture();
    f[0..4].copy_from_slice(&0xa1b2_3c4du32.to_be_bytes());
    // ts_usec field now carries nanoseconds
    f[28..32].copy_from_slice(&250_000_000u32.to_be_bytes());
    let mut r = CaptureReader::new(Cursor::new(f))?;
    let rec = r.next_record()?.expect("record");
    assert_eq!(rec.ts, MicroSecs(3_250_000));
    Ok(())
}

#[test]
fn bad_magic_rejected() {
    let f = vec![0x00u8, 0x11, 0x22, 0x33, 0, 0, 0, 0];
    assert!(matches!(
        CaptureReader::new(Cursor::new(f)),
        Err(Error::BadMagic(0x0011_2233))
    ));
}

#[test]
fn truncated_record_errors() {
    let mut f = be_fixture();
    f.truncate(f.len() - 2);
    let mut r = CaptureReader::new(Cursor::new(f)).unwrap();
    assert!(r.next_record().is_err());
}
