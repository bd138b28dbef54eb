//! Fuzz test for log position parsing
//!
//! Any text either fails to parse or parses to a position whose display
//! form parses back to the same position.
//!
//! Run with: cargo +nightly fuzz run log_position_fuzz -- -max_total_time=60

#![no_main]

use libfuzzer_sys::fuzz_target;
use tandem_core::LogPosition;

fuzz_target!(|data: &[u8]| {
    if let Ok(input) = std::str::from_utf8(data) {
        if let Ok(position) = input.parse::<LogPosition>() {
            let reparsed: LogPosition = position
                .to_string()
                .parse()
                .expect("Displayed log position should parse");
            assert_eq!(reparsed, position);
        }
    }
});
