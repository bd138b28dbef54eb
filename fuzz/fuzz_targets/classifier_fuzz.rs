//! Fuzz test for the SQL classifier
//!
//! Feeds arbitrary text to every classification and checks that none of
//! them panics, including on multi-byte characters around the prefix and
//! suffix limits.
//!
//! Run with: cargo +nightly fuzz run classifier_fuzz -- -max_total_time=60

#![no_main]

use libfuzzer_sys::fuzz_target;
use tandem_core::RoutingConfig;
use tandem_router::SqlClassifier;

fuzz_target!(|data: &[u8]| {
    if let Ok(sql) = std::str::from_utf8(data) {
        let classifier = SqlClassifier::new(
            RoutingConfig::default().with_read_only_function("pg_catalog.now"),
        );

        let write = classifier.is_write_operation(Some(sql));
        classifier.is_select_for_update(Some(sql));
        classifier.is_set_statement(Some(sql));

        // Blank text is never a write
        if sql.trim().is_empty() {
            assert!(!write, "Blank SQL classified as a write");
        }
    }
});
