//! Prometheus metrics for the bridge relayer.
//!
//! Exposed on the /metrics endpoint for scraping.

#![allow(dead_code)]

use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_gauge, register_gauge_vec, CounterVec, Gauge, GaugeVec,
};

lazy_static! {
    // Observer metrics
    pub static ref BLOCKS_ANALYZED: CounterVec = register_counter_vec!(
        "relayer_blocks_analyzed_total",
        "Total number of blocks analyzed",
        &["chain"]
    ).unwrap();

    pub static ref LATEST_BLOCK: GaugeVec = register_gauge_vec!(
        "relayer_latest_block",
        "Latest block height analyzed",
        &["chain"]
    ).unwrap();

    pub static ref DEPOSITS_OBSERVED: CounterVec = register_counter_vec!(
        "relayer_deposits_observed_total",
        "Total number of bridge deposits observed",
        &["chain"]
    ).unwrap();

    pub static ref DEPOSITS_SKIPPED: CounterVec = register_counter_vec!(
        "relayer_deposits_skipped_total",
        "Deposits skipped without relay",
        &["chain", "reason"]
    ).unwrap();

    // Relay metrics
    pub static ref RELAYS_SUBMITTED: CounterVec = register_counter_vec!(
        "relayer_relays_submitted_total",
        "Relay transactions broadcast to a destination chain",
        &["dest_chain"]
    ).unwrap();

    pub static ref RELAYS_FAILED: CounterVec = register_counter_vec!(
        "relayer_relays_failed_total",
        "Payloads dropped during relay",
        &["dest_chain", "reason"]
    ).unwrap();

    // Indexer metrics
    pub static ref INDEXED_EVENTS: CounterVec = register_counter_vec!(
        "relayer_indexed_events_total",
        "Events written by the replay indexer",
        &["table"]
    ).unwrap();

    // Error metrics
    pub static ref ERRORS: CounterVec = register_counter_vec!(
        "relayer_errors_total",
        "Total number of errors",
        &["chain", "type"]
    ).unwrap();

    // Health metrics
    pub static ref UP: Gauge = register_gauge!(
        "relayer_up",
        "Whether the relayer is up and running"
    ).unwrap();

    pub static ref LAST_SUCCESSFUL_POLL: GaugeVec = register_gauge_vec!(
        "relayer_last_successful_poll_timestamp",
        "Unix timestamp of last successful poll",
        &["chain"]
    ).unwrap();
}

/// Record a block analyzed
pub fn record_block_analyzed(chain: &str, height: u64) {
    BLOCKS_ANALYZED.with_label_values(&[chain]).inc();
    LATEST_BLOCK.with_label_values(&[chain]).set(height as f64);
    record_successful_poll(chain);
}

/// Record a deposit observed
pub fn record_deposit_observed(chain: &str) {
    DEPOSITS_OBSERVED.with_label_values(&[chain]).inc();
}

/// Record a deposit skipped without relay
pub fn record_deposit_skipped(chain: &str, reason: &str) {
    DEPOSITS_SKIPPED.with_label_values(&[chain, reason]).inc();
}

/// Record a relay broadcast
pub fn record_relay_submitted(dest_chain: &str) {
    RELAYS_SUBMITTED.with_label_values(&[dest_chain]).inc();
}

/// Record a dropped payload
pub fn record_relay_failed(dest_chain: &str, reason: &str) {
    RELAYS_FAILED.with_label_values(&[dest_chain, reason]).inc();
}

/// Record an indexed event
pub fn record_indexed_event(table: &str) {
    INDEXED_EVENTS.with_label_values(&[table]).inc();
}

/// Record an error
pub fn record_error(chain: &str, error_type: &str) {
    ERRORS.with_label_values(&[chain, error_type]).inc();
}

/// Record last successful poll
pub fn record_successful_poll(chain: &str) {
    use std::time::{SystemTime, UNIX_EPOCH};
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0);
    LAST_SUCCESSFUL_POLL
        .with_label_values(&[chain])
        .set(timestamp);
}
