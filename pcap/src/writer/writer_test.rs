use std::io::Cursor;

use super::*;
use crate::reader::{CaptureFormat, CaptureReader};

#[test]
fn write_then_read_round_trip() -> Result<()> {
    let mut out = Vec::new();
    {
        let mut w = PcapWriter::new(&mut out, LinkType::RawIp)?;
        w.write_record(MicroSecs(1_500_000), &[1, 2, 3, 4])?;
        w.write_record(MicroSecs(1_520_000), &[5, 6, 7, 8, 9])?;
        w.flush()?;
    }

    let mut r = CaptureReader::new(Cursor::new(out))?;
    assert_eq!(r.format(), CaptureFormat::Pcap);

    let rec1 = r.next_record()?.expect("first record");
    assert_eq!(rec1.ts, MicroSecs(1_500_000));
    assert_eq!(&rec1.data[..], &[1, 2, 3, 4]);
    assert_eq!(rec1.orig_len, 4);
    assert_eq!(rec1.link_type, LinkType::RawIp);

    let rec2 = r.next_record()?.expect("second record");
    assert_eq!(rec2.ts, MicroSecs(1_520_000));
    assert_eq!(&rec2.data[..], &[5, 6, 7, 8, 9]);

    assert!(r.next_record()?.is_none());
    Ok(())
}

#[test]
fn header_fields() -> Result<()> {
    let mut out = Vec::new();
    PcapWriter::new(&mut out, LinkType::Ethernet)?;
    assert_eq!(out.len(), crate::PCAP_FILE_HEADER_LEN);
    assert_eq!(&out[0..4], &[0xd4, 0xc3, 0xb2, 0xa1], "LE magic on disk");
    assert_eq!(u16::from_le_bytes([out[4], out[5]]), 2);
    assert_eq!(u16::from_le_bytes([out[6], out[7]]), 4);
    assert_eq!(u32::from_le_bytes([out[20], out[21], out[22], out[23]]), 1);
    Ok(())
}
