#![no_main]

use libfuzzer_sys::fuzz_target;
use straightedge_core::event::parse_line;

fuzz_target!(|data: &[u8]| {
    if let Ok(line) = std::str::from_utf8(data) {
        let _ = parse_line(line);
    }
});
