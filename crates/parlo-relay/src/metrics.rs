// SPDX-FileCopyrightText: 2026 Parlo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Metric registration and recording helpers.
//!
//! Uses the metrics-rs facade so any recorder (Prometheus, statsd, etc.)
//! can collect these metrics.

use metrics::{describe_counter, describe_gauge};

/// Register all Parlo metric descriptions.
///
/// Called once at startup after the recorder is installed.
pub fn register_metrics() {
    describe_counter!("parlo_inbound_events_total", "Inbound channel events by kind");
    describe_counter!("parlo_messages_stored_total", "Messages persisted by sender role");
    describe_counter!("parlo_binds_total", "Conversations bound to an operator");
    describe_counter!(
        "parlo_bind_conflicts_total",
        "Bind attempts that lost the claim race"
    );
    describe_counter!(
        "parlo_notifications_total",
        "Outbound notification attempts by result"
    );
    describe_counter!(
        "parlo_unsupported_dropped_total",
        "Inbound events dropped as unsupported"
    );
    describe_gauge!("parlo_open_conversations", "Conversations currently waiting or busy");
    describe_gauge!("parlo_registered_channels", "Channel adapters currently running");
    describe_gauge!("parlo_queue_depth", "Messages buffered in the dispatch queue");
}

/// Record an inbound channel event.
pub fn record_inbound(kind: &str) {
    metrics::counter!("parlo_inbound_events_total", "kind" => kind.to_string()).increment(1);
}

/// Record a persisted message.
pub fn record_stored(sender: &str) {
    metrics::counter!("parlo_messages_stored_total", "sender" => sender.to_string()).increment(1);
}

/// Record a successful operator bind.
pub fn record_bind() {
    metrics::counter!("parlo_binds_total").increment(1);
}

/// Record a bind attempt that hit an already-claimed conversation.
pub fn record_bind_conflict() {
    metrics::counter!("parlo_bind_conflicts_total").increment(1);
}

/// Record the outcome of an outbound notification.
pub fn record_notification(result: &str) {
    metrics::counter!("parlo_notifications_total", "result" => result.to_string()).increment(1);
}

/// Record an unsupported inbound event that was dropped.
pub fn record_unsupported_dropped() {
    metrics::counter!("parlo_unsupported_dropped_total").increment(1);
}

/// Set the number of open (waiting or busy) conversations.
pub fn set_open_conversations(count: f64) {
    metrics::gauge!("parlo_open_conversations").set(count);
}

/// Set the number of running channel adapters.
pub fn set_registered_channels(count: f64) {
    metrics::gauge!("parlo_registered_channels").set(count);
}

/// Set the dispatch queue depth.
pub fn set_queue_depth(count: f64) {
    metrics::gauge!("parlo_queue_depth").set(count);
}
