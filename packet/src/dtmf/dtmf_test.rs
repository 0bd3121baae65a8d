use super::*;

#[test]
fn test_unmarshal() -> Result<()> {
    // event 5 (digit '5'), end bit set, volume 10, duration 800
    let raw = [0x05u8, 0x8a, 0x03, 0x20];
    let ev = get_dtmf_info(&raw)?;
    assert_eq!(
        ev,
        DtmfEvent {
            event: 5,
            end: true,
            volume: 10,
            duration: 800,
        }
    );
    Ok(())
}

#[test]
fn test_round_trip() -> Result<()> {
    let ev = DtmfEvent {
        event: 11, // '#'
        end: false,
        volume: 7,
        duration: 160,
    };
    assert_eq!(ev.marshal_size(), 4);
    let mut buf = [0u8; 4];
    ev.marshal_to(&mut buf).unwrap();
    assert_eq!(get_dtmf_info(&buf)?, ev);
    Ok(())
}

#[test]
fn test_marshal_into_bytes() {
    let ev = DtmfEvent {
        event: 0,
        end: true,
        volume: 63,
        duration: 1600,
    };
    let bytes = ev.marshal().unwrap();
    assert_eq!(&bytes[..], &[0x00, 0xBF, 0x06, 0x40]);
}

#[test]
fn test_wrong_size_rejected() {
    assert_eq!(
        get_dtmf_info(&[1, 2, 3]),
        Err(Error::ErrBadEventPayload(3))
    );
    assert_eq!(
        get_dtmf_info(&[1, 2, 3, 4, 5]),
        Err(Error::ErrBadEventPayload(5))
    );
}
