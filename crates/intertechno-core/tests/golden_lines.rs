use intertechno_core::{Frame, Framer, Packet, Protocol, StackPrefix, WireDialect};
use std::fs;
use std::path::{Path, PathBuf};

fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("../..")
        .canonicalize()
        .expect("workspace root should be resolvable")
}

fn session_lines(name: &str) -> Vec<String> {
    let path = workspace_root().join("fixtures/lines").join(name);
    let content = fs::read_to_string(&path)
        .unwrap_or_else(|_| panic!("fixture {} must be readable", path.display()));
    content
        .lines()
        .filter(|l| !l.starts_with('#'))
        .map(|l| format!("{l}\r\n"))
        .collect()
}

#[test]
fn cul_session_classifies_every_line() {
    let framer = Framer::default();
    let frames: Vec<Frame> = session_lines("cul_session.log")
        .iter()
        .map(|l| framer.classify(l))
        .collect();

    assert_eq!(frames.len(), 8);
    assert_eq!(frames[0], Frame::Unrecognized("V 1.67 CUL433".into()));

    let Frame::Packet(Packet::Intertechno(on)) = &frames[1] else {
        panic!("expected intertechno packet, got {:?}", frames[1]);
    };
    assert_eq!(on.sender_address(), 78);
    assert_eq!(on.payload(), "FF");
    assert_eq!(on.wire_form_for(WireDialect::CulLegacy), "000F00FFF0FF");

    let Frame::Packet(Packet::Intertechno(off)) = &frames[2] else {
        panic!("expected intertechno packet, got {:?}", frames[2]);
    };
    assert_eq!(off.payload(), "00");

    let Frame::Packet(Packet::Intertechno(large)) = &frames[3] else {
        panic!("expected intertechno packet, got {:?}", frames[3]);
    };
    assert_eq!(large.channel(), Some(4));

    let Frame::Packet(Packet::Cultx(temp)) = &frames[4] else {
        panic!("expected cultx packet, got {:?}", frames[4]);
    };
    assert_eq!(temp.sender_address(), 8);
    assert_eq!(temp.payload(), "22.1");

    assert_eq!(frames[5], Frame::DutyCycleLimit);
    assert_eq!(frames[6], Frame::Ignored);
    assert!(matches!(
        frames[7],
        Frame::Malformed {
            protocol: Protocol::Intertechno,
            ..
        }
    ));
}

#[test]
fn second_stack_position_sees_only_its_lines() {
    let framer = Framer::new(StackPrefix::for_position(2));
    let packets: Vec<Packet> = session_lines("cul_session.log")
        .iter()
        .filter_map(|l| match framer.classify(l) {
            Frame::Packet(p) => Some(p),
            _ => None,
        })
        .collect();

    assert_eq!(packets.len(), 1);
    assert_eq!(packets[0].protocol(), Protocol::Intertechno);
    assert_eq!(packets[0].sender_address(), 78);
}
