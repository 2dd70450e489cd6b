// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Identity and lifecycle shared by every pluggable backend.

use async_trait::async_trait;

use crate::error::PalaverError;
use crate::types::{AdapterType, HealthStatus};

/// Implemented by stores, the relay server and the metrics exporter so that
/// `/health` and shutdown can treat them uniformly.
#[async_trait]
pub trait PluginAdapter: Send + Sync + 'static {
    /// Short name used in logs and health output, e.g. `"memory"`.
    fn name(&self) -> &str;

    fn version(&self) -> semver::Version;

    fn adapter_type(&self) -> AdapterType;

    /// Probes the backend. A reachable but impaired backend reports
    /// [`HealthStatus::Degraded`] rather than an error.
    async fn health_check(&self) -> Result<HealthStatus, PalaverError>;

    /// Releases held resources. Calling it twice is harmless.
    async fn shutdown(&self) -> Result<(), PalaverError>;
}
