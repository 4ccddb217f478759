#![no_main]

use intertechno_core::{Frame, Framer, StackPrefix};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Some((&position, rest)) = data.split_first() else {
        return;
    };
    let Ok(line) = std::str::from_utf8(rest) else {
        return;
    };
    let framer = Framer::new(StackPrefix::for_position(position % 4));
    if let Frame::Packet(packet) = framer.classify(line) {
        let _ = packet.sender_address();
    }
});
