// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Relay metrics in Prometheus text format.
//!
//! The relay records through the `metrics` facade (see [`recording`]); this
//! crate installs the Prometheus recorder behind it and renders the
//! exposition served at `GET /metrics`.

pub mod recording;

use async_trait::async_trait;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle, PrometheusRecorder};

use palaver_core::PalaverError;
use palaver_core::traits::adapter::PluginAdapter;
use palaver_core::types::{AdapterType, HealthStatus};

pub use recording::{
    record_fanout, record_frame, record_store_error, set_active_sessions, set_connected_peers,
    set_freshness_polls,
};

/// Owns the render handle of the process-wide Prometheus recorder.
#[derive(Clone)]
pub struct PrometheusAdapter {
    handle: PrometheusHandle,
}

impl std::fmt::Debug for PrometheusAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrometheusAdapter").finish_non_exhaustive()
    }
}

impl PrometheusAdapter {
    /// Installs the recorder as the global `metrics` recorder and describes
    /// the relay metrics. Fails if another recorder is already installed.
    pub fn new() -> Result<Self, PalaverError> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .map_err(|e| PalaverError::Internal(format!("cannot install metrics recorder: {e}")))?;
        recording::register_metrics();
        tracing::info!("prometheus recorder installed");
        Ok(Self { handle })
    }

    /// A recorder that is not installed globally, for use with
    /// `metrics::with_local_recorder`.
    pub fn detached() -> (PrometheusRecorder, Self) {
        let recorder = PrometheusBuilder::new().build_recorder();
        let adapter = Self {
            handle: recorder.handle(),
        };
        (recorder, adapter)
    }

    pub fn handle(&self) -> &PrometheusHandle {
        &self.handle
    }

    /// Current exposition text.
    pub fn render(&self) -> String {
        self.handle.render()
    }
}

#[async_trait]
impl PluginAdapter for PrometheusAdapter {
    fn name(&self) -> &str {
        "prometheus"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Observability
    }

    async fn health_check(&self) -> Result<HealthStatus, PalaverError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), PalaverError> {
        Ok(())
    }
}
