#![no_main]

use libfuzzer_sys::fuzz_target;
use straightedge_core::regression::fit;

fuzz_target!(|data: &[u8]| {
    let points: Vec<(f64, f64)> = data
        .chunks_exact(16)
        .filter_map(|chunk| {
            let (x, y) = chunk.split_at(8);
            let x = f64::from_le_bytes(x.try_into().ok()?);
            let y = f64::from_le_bytes(y.try_into().ok()?);
            (x.is_finite() && y.is_finite()).then_some((x, y))
        })
        .collect();

    assert_eq!(fit(&points).is_err(), points.is_empty());
});
