use std::time::Duration;

use crate::utils::IsTransient;

// ============================================================================
// Persistence Errors
// ============================================================================
//
// "Not found" is not an error here: lookups return Ok(None).
//
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The order row exists but a mandatory companion row is missing or unreadable.
    #[error("Order {order_uid} is incomplete: {part} could not be loaded")]
    IncompleteAggregate {
        order_uid: String,
        part: &'static str,
        #[source]
        source: Option<sqlx::Error>,
    },

    #[error("Store operation timed out after {0:?}")]
    Timeout(Duration),
}

impl StoreError {
    pub(crate) fn incomplete(
        order_uid: &str,
        part: &'static str,
        source: Option<sqlx::Error>,
    ) -> Self {
        StoreError::IncompleteAggregate {
            order_uid: order_uid.to_string(),
            part,
            source,
        }
    }
}

impl IsTransient for StoreError {
    fn is_transient(&self) -> bool {
        match self {
            StoreError::Database(_) | StoreError::Timeout(_) => true,
            StoreError::IncompleteAggregate { .. } => false,
        }
    }
}
