#![no_main]

use intertechno_link::line::LineAssembler;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let mut assembler = LineAssembler::new(256);
    for chunk in data.chunks(7) {
        for line in assembler.push(chunk) {
            assert!(line.ends_with('\n'));
        }
        assert!(assembler.pending_len() <= 256);
    }
});
