//! Transaction isolation levels.
//!
//! The level is only handed to the runner when a new transaction is
//! started. Joining an already-open transaction ignores it.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::transaction::error::TransactionError;

/// Transaction isolation level, named after its SQL spelling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum IsolationLevel {
    /// `SERIALIZABLE`: transactions behave as if run one after another.
    #[serde(rename = "SERIALIZABLE")]
    Serializable,

    /// `READ COMMITTED`: each statement sees data committed before it began.
    #[default]
    #[serde(rename = "READ COMMITTED")]
    ReadCommitted,

    /// `REPEATABLE READ`: all reads see the snapshot taken at the first read.
    #[serde(rename = "REPEATABLE READ")]
    RepeatableRead,

    /// `READ UNCOMMITTED`: dirty reads allowed where the backend supports them.
    #[serde(rename = "READ UNCOMMITTED")]
    ReadUncommitted,
}

impl IsolationLevel {
    /// All levels, strongest first.
    pub const ALL: [IsolationLevel; 4] = [
        IsolationLevel::Serializable,
        IsolationLevel::RepeatableRead,
        IsolationLevel::ReadCommitted,
        IsolationLevel::ReadUncommitted,
    ];

    /// The SQL spelling, suitable for `SET TRANSACTION ISOLATION LEVEL ...`.
    pub fn as_sql(&self) -> &'static str {
        match self {
            IsolationLevel::Serializable => "SERIALIZABLE",
            IsolationLevel::ReadCommitted => "READ COMMITTED",
            IsolationLevel::RepeatableRead => "REPEATABLE READ",
            IsolationLevel::ReadUncommitted => "READ UNCOMMITTED",
        }
    }

    /// Check if reads in this level see a stable snapshot.
    pub fn uses_snapshot(&self) -> bool {
        matches!(
            self,
            IsolationLevel::RepeatableRead | IsolationLevel::Serializable
        )
    }
}

impl fmt::Display for IsolationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// Parse isolation level from string (SQL syntax).
impl std::str::FromStr for IsolationLevel {
    type Err = TransactionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "SERIALIZABLE" => Ok(IsolationLevel::Serializable),
            "READ COMMITTED" | "READ_COMMITTED" | "READCOMMITTED" => {
                Ok(IsolationLevel::ReadCommitted)
            }
            "REPEATABLE READ" | "REPEATABLE_READ" | "REPEATABLEREAD" => {
                Ok(IsolationLevel::RepeatableRead)
            }
            "READ UNCOMMITTED" | "READ_UNCOMMITTED" | "READUNCOMMITTED" => {
                Ok(IsolationLevel::ReadUncommitted)
            }
            _ => Err(TransactionError::InvalidIsolationLevel(s.to_string())),
        }
    }
}
