//! Transaction status tracking.
//!
//! - Transaction ids, with 0 reserved as the always-committed super transaction
//! - Active / committed / aborted states and their status-byte encoding
//! - A durable registry mapping each issued id to its state

pub mod id;
pub mod manager;
pub mod state;

// Re-export commonly used types
pub use id::{TransactionId, SUPER_XID};
pub use manager::{Transaction, TransactionError, TransactionManager, XID_SUFFIX};
pub use state::TransactionState;
