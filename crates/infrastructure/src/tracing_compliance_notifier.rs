use async_trait::async_trait;
use custodia_application::{ComplianceEvent, ComplianceNotifier};
use custodia_core::{AppError, AppResult};
use tracing::warn;

/// Notification adapter that emits compliance events to the structured log.
///
/// Stands in for the notification collaborator in development and worker
/// deployments without a delivery transport; events are never dropped
/// silently, they land in the log stream at warn level.
#[derive(Debug, Clone, Default)]
pub struct TracingComplianceNotifier;

impl TracingComplianceNotifier {
    /// Creates the adapter.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ComplianceNotifier for TracingComplianceNotifier {
    async fn dispatch(&self, event: ComplianceEvent) -> AppResult<()> {
        let payload = serde_json::to_string(&event)
            .map_err(|error| AppError::Internal(format!("failed to serialize event: {error}")))?;

        warn!(
            event_kind = event.kind(),
            payload = payload.as_str(),
            "compliance event"
        );
        Ok(())
    }
}
