// ============================================================================
// Infrastructure Actors
// ============================================================================
//
// Actors for system concerns around the order cache:
// - Dead letter queue
// - Health monitoring
// - Coordination and graceful shutdown
//
// ============================================================================

// Private module declarations
mod dlq;
mod health_monitor;
mod coordinator;

// Re-export for public API
pub use dlq::{AddToDlq, DlqActor, GetDlqMessages, GetDlqStats};
pub use health_monitor::{
    GetSystemHealth, HealthMonitorActor, UpdateHealth, COMPONENT_DLQ, COMPONENT_INGEST,
};
pub use coordinator::{CoordinatorActor, GetDlqActor, GetHealthMonitor, Shutdown};

#[cfg(test)]
pub(crate) use dlq::tests as dlq_tests;
