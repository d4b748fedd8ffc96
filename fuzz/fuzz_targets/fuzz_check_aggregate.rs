//! Fuzz target for check evaluation and aggregation.
//!
//! Decodes arbitrary bytes into batches of responses, evaluates a marker
//! check and a status check against each, and records the results.
//! Tallies must add up to the number of evaluations.
//!
//! Run with: `cargo +nightly fuzz run fuzz_check_aggregate`

#![no_main]
use libfuzzer_sys::fuzz_target;

use vuload::loadtest::checks::CheckAggregator;
use vuload::loadtest::client::HttpResponse;
use vuload::loadtest::config::CheckDef;
use vuload::loadtest::scenario::evaluate_checks;

fuzz_target!(|data: &[u8]| {
    let checks = [
        CheckDef::BodyContains {
            name: "marker".to_string(),
            marker: "hello!".to_string(),
        },
        CheckDef::Status {
            name: "status".to_string(),
            status: 200,
        },
    ];
    let aggregator = CheckAggregator::new();
    let mut batches = 0u64;

    // Each chunk is one batch: first byte picks status and completeness,
    // the rest is the body.
    for chunk in data.chunks(16) {
        let Some((&head, body)) = chunk.split_first() else {
            continue;
        };
        let status = if head & 1 == 0 { 200 } else { 500 };
        let complete = head & 2 == 0;
        let responses = [HttpResponse::new(status, String::from_utf8_lossy(body))];

        let results = evaluate_checks(&checks, &responses, complete);
        assert_eq!(results.len(), checks.len());
        if !complete {
            assert!(results.iter().all(|r| !r.passed));
        }
        aggregator.record_all(&results);
        batches += 1;
    }

    let snapshot = aggregator.snapshot();
    assert_eq!(snapshot.total(), batches * checks.len() as u64);
    let rate = snapshot.pass_rate();
    assert!((0.0..=1.0).contains(&rate));
});
