// SPDX-FileCopyrightText: 2026 Parlo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Prometheus recorder for the metrics facade.
//!
//! Installs the global recorder once at startup; the render handle is
//! what `GET /metrics` serves. Everything else in the workspace records
//! through the `metrics` crate macros and never sees this type.

use std::sync::Arc;

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use parlo_core::error::ParloError;

pub struct MetricsRecorder {
    handle: PrometheusHandle,
}

impl MetricsRecorder {
    /// Install the global Prometheus recorder. Fails when a recorder is
    /// already installed in this process.
    pub fn install() -> Result<Self, ParloError> {
        let handle = PrometheusBuilder::new().install_recorder().map_err(|e| {
            ParloError::Internal(format!("failed to install metrics recorder: {e}"))
        })?;
        Ok(Self { handle })
    }

    /// The render closure handed to the gateway's `/metrics` handler.
    pub fn render_fn(&self) -> Arc<dyn Fn() -> String + Send + Sync> {
        let handle = self.handle.clone();
        Arc::new(move || handle.render())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn install_once_and_render() {
        // A process can hold only one global recorder, so this is the
        // single test touching it.
        let recorder = MetricsRecorder::install().expect("first install must succeed");
        metrics::counter!("parlo_test_events_total").increment(1);
        let rendered = (recorder.render_fn())();
        assert!(rendered.contains("parlo_test_events_total"));

        assert!(MetricsRecorder::install().is_err());
    }
}
