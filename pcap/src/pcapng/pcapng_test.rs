use std::io::Cursor;

use super::*;
use crate::reader::CaptureReader;

fn push_u16(v: &mut Vec<u8>, x: u16) {
    v.extend_from_slice(&x.to_le_bytes());
}

fn push_u32(v: &mut Vec<u8>, x: u32) {
    v.extend_from_slice(&x.to_le_bytes());
}

/// Little-endian SHB + IDB (+ optional if_tsresol) + one EPB.
fn fixture(tsresol: Option<u8>, ticks: u64, data: &[u8]) -> Vec<u8> {
    let mut f = Vec::new();

    // SHB
    push_u32(&mut f, BLOCK_TYPE_SHB);
    push_u32(&mut f, 28);
    push_u32(&mut f, BYTE_ORDER_MAGIC);
    push_u16(&mut f, 1); // major
    push_u16(&mut f, 0); // minor
    f.extend_from_slice(&(-1i64).to_le_bytes()); // section length unknown
    push_u32(&mut f, 28);

    // IDB
    let opts_len = if tsresol.is_some() { 8 + 4 } else { 0 };
    let idb_len = 20 + opts_len as u32;
    push_u32(&mut f, BLOCK_TYPE_IDB);
    push_u32(&mut f, idb_len);
    push_u16(&mut f, 101); // raw IP
    push_u16(&mut f, 0);
    push_u32(&mut f, 65535);
    if let Some(r) = tsresol {
        push_u16(&mut f, OPT_IF_TSRESOL);
        push_u16(&mut f, 1);
        f.extend_from_slice(&[r, 0, 0, 0]); // value + pad
        push_u16(&mut f, OPT_END);
        push_u16(&mut f, 0);
    }
    push_u32(&mut f, idb_len);

    // EPB
    let padded = (data.len() + 3) & !3;
    let epb_len = (12 + 20 + padded) as u32;
    push_u32(&mut f, BLOCK_TYPE_EPB);
    push_u32(&mut f, epb_len);
    push_u32(&mut f, 0); // interface id
    push_u32(&mut f, (ticks >> 32) as u32);
    push_u32(&mut f, ticks as u32);
    push_u32(&mut f, data.len() as u32);
    push_u32(&mut f, data.len() as u32);
    f.extend_from_slice(data);
    f.resize(f.len() + (padded - data.len()), 0);
    push_u32(&mut f, epb_len);

    f
}

#[test]
fn default_microsecond_resolution() -> Result<()> {
    let f = fixture(None, 5_000_123, &[0x45, 0, 0, 20]);
    let mut r = CaptureReader::new(Cursor::new(f))?;
    assert_eq!(r.format(), crate::CaptureFormat::PcapNg);
    let rec = r.next_record()?.expect("record");
    assert_eq!(rec.ts, MicroSecs(5_000_123));
    assert_eq!(rec.link_type, LinkType::RawIp);
    assert_eq!(&rec.data[..], &[0x45, 0, 0, 20]);
    assert!(r.next_record()?.is_none());
    Ok(())
}

#[test]
fn millisecond_tsresol_honored() -> Result<()> {
    // 10^-3 resolution: 2500 ticks = 2.5 s
    let f = fixture(Some(3), 2500, &[0x45, 0, 0, 20]);
    let mut r = CaptureReader::new(Cursor::new(f))?;
    let rec = r.next_record()?.expect("record");
    assert_eq!(rec.ts, MicroSecs(2_500_000));
    Ok(())
}

#[test]
fn epb_for_unknown_interface_rejected() {
    let mut f = fixture(None, 0, &[1, 2, 3, 4]);
    // point the EPB (36-byte block for 4 data bytes) at interface 7
    let epb_ofs = f.len() - 36;
    f[epb_ofs + 8..epb_ofs + 12].copy_from_slice(&7u32.to_le_bytes());
    let mut r = CaptureReader::new(Cursor::new(f)).unwrap();
    assert!(matches!(
        r.next_record(),
        Err(Error::UnknownInterface(7))
    ));
}

#[test]
fn length_mismatch_rejected() {
    let mut f = fixture(None, 0, &[1, 2, 3, 4]);
    let n = f.len();
    f[n - 4..].copy_from_slice(&9999u32.to_le_bytes());
    let mut r = CaptureReader::new(Cursor::new(f)).unwrap();
    assert!(matches!(
        r.next_record(),
        Err(Error::BlockLengthMismatch(_, 9999))
    ));
}
