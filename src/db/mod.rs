// ============================================================================
// Persistent Store
// ============================================================================
//
// PostgreSQL is the source of truth for order aggregates. The cache is always
// rebuildable from here.
//
// - errors.rs       - StoreError taxonomy
// - schema.rs       - idempotent table creation at startup
// - order_store.rs  - OrderStore trait + PostgreSQL implementation
// - memory.rs       - in-memory OrderStore used by unit tests
//
// ============================================================================

mod errors;
mod order_store;
pub mod schema;

#[cfg(test)]
pub(crate) mod memory;

pub use errors::StoreError;
pub use order_store::{OrderStore, PgOrderStore};
