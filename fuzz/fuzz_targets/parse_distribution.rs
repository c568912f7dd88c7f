//! Fuzz target for the distribution expression parser.
//!
//! Any string must either compile into a valid distribution or return an
//! error; it must never panic, and a valid result always has a
//! non-decreasing cumulative array.

#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(spec) = std::str::from_utf8(data) else {
        return;
    };
    if let Ok(d) = sumlab_distribution::parse(spec, 32, -8.0, 8.0) {
        assert!(d.valid());
        assert!(d.cdf().windows(2).all(|w| w[0] <= w[1]));
        assert!(d.pdf().iter().all(|&p| p >= 0.0));
    }
});
