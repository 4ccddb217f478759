#![no_main]

use intertechno_core::CultxPacket;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(line) = std::str::from_utf8(data) else {
        return;
    };
    if let Ok(packet) = CultxPacket::decode_line(line) {
        assert_eq!(packet.rssi(), 0);
        let _ = packet.value();
    }
});
