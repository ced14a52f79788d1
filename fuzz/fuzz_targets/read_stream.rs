#![no_main]

use libfuzzer_sys::fuzz_target;
use straightedge_core::event::read_stream;

fuzz_target!(|data: &[u8]| {
    let _ = read_stream(data);
});
