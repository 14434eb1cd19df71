use async_trait::async_trait;

use crate::domain::models::CoverageReport;

/// Destination for converted coverage reports.
///
/// Adding a destination only requires fulfilling this contract. Delivery
/// failures are handled and logged by the target itself; the caller only
/// learns whether the report was durably accepted.
#[async_trait]
pub trait DeliveryTarget: Send + Sync {
    /// Deliver a report, returning `true` once it is durably accepted
    async fn deliver(&self, report: &CoverageReport) -> bool;

    /// Human readable description for logs
    fn describe(&self) -> String;

    /// Called once when the hosting application shuts down
    async fn shutdown(&self) {}
}
