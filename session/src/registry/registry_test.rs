use packet::{format_packet, ChannelFormatState, FormatOptions, WireOrder};

use super::*;
use crate::codec::CodecType;

fn term(remote: &str, local: &str, pt: u8) -> Termination {
    Termination::new(remote.parse().unwrap(), local.parse().unwrap(), CodecType::G711U, pt)
}

fn data(name: &str) -> SessionData {
    SessionData {
        name: name.into(),
        term1: term("10.0.0.1:6170", "10.0.0.2:10240", 0),
        term2: term("10.0.0.2:10242", "10.0.0.1:6172", 0),
        group_term: None,
    }
}

fn view(src: &str, dst: &str, pt: u8, payload: &[u8], ssrc: u32) -> PacketView {
    let mut st = ChannelFormatState::new(src.parse().unwrap(), dst.parse().unwrap(), pt, ssrc, 160);
    let raw = format_packet(&mut st, &FormatOptions::default(), payload).unwrap();
    PacketView::parse(raw, WireOrder::Network).unwrap()
}

#[test]
fn create_match_delete() {
    let mut reg = Registry::new(8, 4);
    let id = reg.create(data("s0"), CreateFlags::default()).unwrap();
    assert_eq!(id, 0);
    assert_eq!(reg.session(id).unwrap().state, SessionState::New);

    // term1 direction matches chan1
    let v = view("10.0.0.1:6170", "10.0.0.2:10240", 0, &[0u8; 160], 1);
    assert_eq!(reg.match_packet(&v), Some(reg.session(id).unwrap().chan1));

    // term2 direction matches chan2
    let v = view("10.0.0.2:10242", "10.0.0.1:6172", 0, &[0u8; 160], 2);
    assert_eq!(reg.match_packet(&v), Some(reg.session(id).unwrap().chan2));

    // unknown tuple does not match
    let v = view("10.9.9.9:1000", "10.0.0.2:10240", 0, &[0u8; 160], 3);
    assert_eq!(reg.match_packet(&v), None);

    reg.mark_active(id).unwrap();
    assert_eq!(reg.session(id).unwrap().state, SessionState::Active);
    reg.flush(id).unwrap();
    reg.delete(id).unwrap();
    assert_eq!(reg.session(id).unwrap().state, SessionState::DeletePending);

    let chan1 = reg.session(id).unwrap().chan1;
    let v0 = reg.table_version();
    reg.remove(id).unwrap();
    assert!(reg.session(id).is_err());
    assert!(reg.channel(chan1).is_err());
    assert_eq!(reg.table_version(), v0 + 1);
}

#[test]
fn capacity_and_duplicates() {
    let mut reg = Registry::new(2, 4);
    reg.create(data("a"), CreateFlags::default()).unwrap();

    // identical term1 tuple is a duplicate
    assert_eq!(
        reg.create(data("a2"), CreateFlags::default()),
        Err(Error::DuplicateSession)
    );

    let mut d = data("b");
    d.term1.remote = "10.0.0.3:6170".parse().unwrap();
    reg.create(d, CreateFlags::default()).unwrap();

    let mut d = data("c");
    d.term1.remote = "10.0.0.4:6170".parse().unwrap();
    assert_eq!(
        reg.create(d, CreateFlags::default()),
        Err(Error::CapacitySessions)
    );
}

#[test]
fn user_managed_key_includes_handle() {
    let mut reg = Registry::new(8, 4);
    let flags = CreateFlags {
        user_managed: true,
        ..Default::default()
    };
    let id0 = reg.create(data("um0"), flags).unwrap();
    // same tuple, different handle: allowed for user-managed sessions
    let id1 = reg.create(data("um1"), flags).unwrap();
    assert_ne!(id0, id1);

    let v = view("10.0.0.1:6170", "10.0.0.2:10240", 0, &[0u8; 160], 1);
    assert_eq!(reg.match_packet(&v), None, "normal lookup skips user-managed");
    assert_eq!(
        reg.match_packet_user_managed(&v, id1),
        Some(reg.session(id1).unwrap().chan1)
    );
}

#[test]
fn dtmf_fallback_ignores_payload_type() {
    let mut reg = Registry::new(8, 4);
    let id = reg.create(data("s"), CreateFlags::default()).unwrap();

    // RFC 4733 event packet arrives with the event payload type
    let v = view("10.0.0.1:6170", "10.0.0.2:10240", 101, &[0x05, 0x8a, 0x03, 0x20], 1);
    assert_eq!(reg.match_packet(&v), Some(reg.session(id).unwrap().chan1));

    // a non-event packet with a wrong payload type does not match
    let v = view("10.0.0.1:6170", "10.0.0.2:10240", 101, &[0u8; 160], 1);
    assert_eq!(reg.match_packet(&v), None);
}

#[test]
fn dynamic_create_estimates_evs() {
    let mut reg = Registry::new(8, 4);
    let v = view("10.1.1.1:5000", "10.1.1.2:5002", 96, &[0x0C; 33], 0xabcd);

    assert_eq!(reg.match_packet(&v), None);
    let (id, chan, est) = reg.create_dynamic(&v, None).unwrap();
    assert_eq!(est.codec, CodecType::Evs);
    assert_eq!(est.bitrate, 13200);
    assert!(reg.session(id).unwrap().dynamic);

    // the same tuple now matches without creating again
    assert_eq!(reg.match_packet(&v), Some(chan));
}

#[test]
fn dynamic_create_unknown_codec_fails() {
    let mut reg = Registry::new(8, 4);
    let v = view("10.1.1.1:5000", "10.1.1.2:5002", 96, &[0u8; 100], 1);
    assert_eq!(
        reg.create_dynamic(&v, None).err(),
        Some(Error::CodecEstimateFailed)
    );
}

#[test]
fn rfc8108_child_channel_lifecycle() {
    let mut reg = Registry::new(8, 4).with_ssrc_run_threshold(2);
    let flags = CreateFlags {
        dynamic_channel_enable: true,
        ..Default::default()
    };
    let id = reg.create(data("s"), flags).unwrap();
    let chan = reg.session(id).unwrap().chan1;

    // first packet claims the parent SSRC
    let (c, created) = reg.resolve_ssrc(chan, 0xAAAA).unwrap();
    assert_eq!(c, chan);
    assert!(!created);

    // same SSRC keeps the parent
    let (c, _) = reg.resolve_ssrc(chan, 0xAAAA).unwrap();
    assert_eq!(c, chan);

    // new SSRC creates a child
    let (child, created) = reg.resolve_ssrc(chan, 0xBBBB).unwrap();
    assert!(created);
    assert_ne!(child, chan);
    assert_eq!(reg.channel(child).unwrap().parent, Some(chan));
    assert!(!reg.channel(child).unwrap().current);
    assert!(reg.channel(chan).unwrap().current);

    // a stable run of the new SSRC switches the current channel
    let (c, _) = reg.resolve_ssrc(chan, 0xBBBB).unwrap();
    assert_eq!(c, child);
    let (c, _) = reg.resolve_ssrc(chan, 0xBBBB).unwrap();
    assert_eq!(c, child);
    assert!(reg.channel(child).unwrap().current);
    assert!(!reg.channel(chan).unwrap().current);
}

#[test]
fn no_child_without_dynamic_enable() {
    let mut reg = Registry::new(8, 4);
    let id = reg.create(data("s"), CreateFlags::default()).unwrap();
    let chan = reg.session(id).unwrap().chan1;

    reg.resolve_ssrc(chan, 0xAAAA).unwrap();
    let (c, created) = reg.resolve_ssrc(chan, 0xBBBB).unwrap();
    assert_eq!(c, chan);
    assert!(!created);
    assert!(reg.channel(chan).unwrap().children.is_empty());
}

#[test]
fn group_ownership() {
    let mut reg = Registry::new(8, 4);

    let mut d = data("owner");
    let mut g = d.term2.clone();
    g.group_id = Some("g1".into());
    g.group_mode = GroupMode::Contributor;
    d.group_term = Some(g);
    let owner = reg.create(d, CreateFlags::default()).unwrap();

    let mut d = data("member");
    d.term1.remote = "10.0.0.9:6170".parse().unwrap();
    d.term2.remote = "10.0.0.9:6180".parse().unwrap();
    let mut g = d.term2.clone();
    g.group_id = Some("g1".into());
    d.group_term = Some(g);
    let member = reg.create(d, CreateFlags::default()).unwrap();

    let rec = reg.group("g1").unwrap();
    assert_eq!(rec.owner, owner);
    assert_eq!(rec.members, vec![owner, member]);

    // deleting the owner passes ownership to the surviving member
    reg.remove(owner).unwrap();
    assert_eq!(reg.group("g1").unwrap().owner, member);

    reg.remove(member).unwrap();
    assert!(reg.group("g1").is_none());
}

#[test]
fn group_capacity_enforced() {
    let mut reg = Registry::new(8, 1);
    let mut d = data("a");
    d.term1.group_id = Some("g1".into());
    reg.create(d, CreateFlags::default()).unwrap();

    let mut d = data("b");
    d.term1.remote = "10.0.0.7:6170".parse().unwrap();
    d.term2.remote = "10.0.0.7:6180".parse().unwrap();
    d.term1.group_id = Some("g2".into());
    assert_eq!(reg.create(d, CreateFlags::default()), Err(Error::CapacityGroups));
}

#[test]
fn invalid_term_rejected() {
    let mut reg = Registry::new(8, 4);
    let mut d = data("bad");
    d.term1.local = "[2001:db8::1]:9000".parse().unwrap();
    assert_eq!(
        reg.create(d, CreateFlags::default()),
        Err(Error::InvalidIpAddrType)
    );

    let mut d = data("bad2");
    d.term2.ptime = util::time::MilliSecs(0);
    assert_eq!(
        reg.create(d, CreateFlags::default()),
        Err(Error::InvalidTermInfo)
    );
}

#[test]
fn stale_channel_detected_after_remove() {
    let mut reg = Registry::new(8, 4);
    let id = reg.create(data("s"), CreateFlags::default()).unwrap();
    let chan = reg.session(id).unwrap().chan1;
    let version = reg.channel(chan).unwrap().version;
    assert!(reg.check_channel(chan, version).is_ok());

    reg.remove(id).unwrap();

    // a new session reuses the channel slot under a newer version
    let mut d = data("s2");
    d.term1.remote = "10.0.0.8:6170".parse().unwrap();
    d.term2.remote = "10.0.0.8:6180".parse().unwrap();
    let id2 = reg.create(d, CreateFlags::default()).unwrap();
    let chan2 = reg.session(id2).unwrap().chan2;
    assert_eq!(chan, reg.session(id2).unwrap().chan1, "slot reused");
    let _ = chan2;
    assert_eq!(
        reg.check_channel(chan, version).err(),
        Some(Error::StaleChannel)
    );
}
