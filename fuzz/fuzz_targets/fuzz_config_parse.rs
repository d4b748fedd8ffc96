//! Fuzz target for TOML config parsing.
//!
//! Feeds arbitrary UTF-8 to `LoadTestConfig::from_toml()`. Parse and
//! validation errors are expected; panics are not. Configs that validate
//! must also yield a URL for every request, with the request path kept
//! out of the query and fragment.
//!
//! Run with: `cargo +nightly fuzz run fuzz_config_parse`

#![no_main]
use libfuzzer_sys::fuzz_target;

use vuload::loadtest::config::LoadTestConfig;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        if let Ok(config) = LoadTestConfig::from_toml(s) {
            for request in &config.request {
                let url = config.request_url(request).expect("validated config yields URLs");
                // The path must land in the path, not in a query or fragment of the host.
                if !request.path.contains(['?', '#']) {
                    assert!(url.query().is_none());
                    assert!(url.fragment().is_none());
                }
            }
        }
    }
});
