#![no_main]

use intertechno_core::IntertechnoPacket;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(line) = std::str::from_utf8(data) else {
        return;
    };
    if let Ok(packet) = IntertechnoPacket::decode_line(line) {
        assert!(packet.channel().map_or(true, |c| c >= 1));
        let _ = packet.wire_form();
        let _ = packet.radio_bytes();
    }
});
