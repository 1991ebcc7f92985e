//! Test utilities for the explorer: a temporary database runner, a
//! deterministic guardian network and mocks of the chain facing traits.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Deterministic guardian keys and signed messages
pub mod fixtures;

/// Mock contracts
pub mod mocks;

/// Testing utilities
pub mod test_utils {
    pub use explorer_base::db::test_utils::{run_test_db, setup_db};
}
