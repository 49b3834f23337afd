//! Transaction status values and their on-disk encoding.

use std::fmt;

/// Status recorded for every issued xid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Active,
    Committed,
    Aborted,
}

impl TransactionState {
    /// Status byte stored in the xid file.
    pub fn to_byte(self) -> u8 {
        match self {
            Self::Active => 0,
            Self::Committed => 1,
            Self::Aborted => 2,
        }
    }

    /// Decodes a status byte; `None` for anything outside 0..=2.
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Self::Active),
            1 => Some(Self::Committed),
            2 => Some(Self::Aborted),
            _ => None,
        }
    }

    pub fn is_active(&self) -> bool {
        *self == Self::Active
    }

    pub fn is_committed(&self) -> bool {
        *self == Self::Committed
    }

    pub fn is_aborted(&self) -> bool {
        *self == Self::Aborted
    }

    /// Committed and aborted are both final.
    pub fn is_terminal(&self) -> bool {
        !self.is_active()
    }
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Active => "Active",
            Self::Committed => "Committed",
            Self::Aborted => "Aborted",
        };
        f.write_str(name)
    }
}
