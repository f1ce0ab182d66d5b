//! Fuzz target for the TOML configuration parser.
//!
//! Run with: cargo +nightly fuzz run fuzz_config_parser
//!
//! Feeds arbitrary text through `AppConfig::parse()`, covering TOML parsing,
//! serde defaults and validation.

#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        if let Ok(config) = webshim_config::AppConfig::parse(s) {
            // A config that parsed must also re-validate.
            assert!(config.validate().is_ok());
            let _ = config.request_timeout();
        }
    }
});
