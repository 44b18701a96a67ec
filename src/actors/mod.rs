// ============================================================================
// Actors Module
// ============================================================================
//
// Actor-based infrastructure for the background side of the service.
//
// Structure:
// - core/           - Shared health types
// - infrastructure/ - Concrete infrastructure actors (DLQ, Health, Coordinator)
//
// Note: The read/write protocol (OrderService) is plain async code, NOT actors.
//       Actors are reserved for infrastructure concerns only.
//
// ============================================================================

// Private module declarations
mod core;
mod infrastructure;

// Re-export only what's needed in the public API
pub use infrastructure::{CoordinatorActor, GetDlqActor, GetHealthMonitor, Shutdown};

// Internal re-exports for use within the crate
pub(crate) use self::core::HealthStatus;
#[cfg(test)]
pub(crate) use infrastructure::dlq_tests;
pub(crate) use infrastructure::{
    AddToDlq, DlqActor, GetDlqMessages, GetDlqStats, GetSystemHealth, HealthMonitorActor,
    UpdateHealth, COMPONENT_INGEST,
};
