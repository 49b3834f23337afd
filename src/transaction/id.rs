//! Transaction identifiers.

use std::fmt;

/// A transaction identifier. Issued ids start at 1 and only grow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TransactionId(pub u64);

/// The reserved id 0. It is never stored and always reads as committed.
pub const SUPER_XID: TransactionId = TransactionId(0);

impl TransactionId {
    /// Creates a new transaction ID with the given value.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the inner u64 value.
    pub fn value(&self) -> u64 {
        self.0
    }

    pub fn is_super(&self) -> bool {
        *self == SUPER_XID
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Txn{}", self.0)
    }
}
