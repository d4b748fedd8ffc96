//! vuload: a virtual-user HTTP load generator.
//!
//! Runs a configured number of concurrent virtual users against a target
//! host. Each one repeatedly fires a batch of GET requests, evaluates named
//! checks against the batch and pauses for a think-time. The run reports
//! pass/fail counts per check label.

pub mod loadtest;
