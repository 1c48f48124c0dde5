//! Transaction error types.

use std::fmt;

use thiserror::Error;

use crate::transaction::runner::RunnerError;

/// Result type for transaction operations.
pub type TransactionResult<T> = Result<T, TransactionError>;

/// Runner operation that produced a [`TransactionError::Runner`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunnerOperation {
    Start,
    Commit,
    Rollback,
}

impl fmt::Display for RunnerOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunnerOperation::Start => write!(f, "start"),
            RunnerOperation::Commit => write!(f, "commit"),
            RunnerOperation::Rollback => write!(f, "rollback"),
        }
    }
}

/// Errors that can occur while propagating or finalizing a transaction.
#[derive(Debug, Error)]
pub enum TransactionError {
    /// `commit`/`rollback` was called with no transaction in the current context.
    #[error("no transaction in the current context")]
    NotInContext,

    /// Transaction was already committed or rolled back.
    #[error("transaction {tx_id} is no longer active (state: {state})")]
    AlreadyFinalized {
        tx_id: String,
        state: String,
    },

    /// The runner failed to start, commit or roll back a transaction.
    #[error("runner failed to {operation} transaction: {source}")]
    Runner {
        operation: RunnerOperation,
        #[source]
        source: RunnerError,
    },

    /// Unknown isolation level name.
    #[error("unknown isolation level: {0}")]
    InvalidIsolationLevel(String),

    /// Coordinator configuration could not be parsed.
    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),
}

impl TransactionError {
    /// Check if this error is retryable.
    ///
    /// The coordinator never retries on its own; runner failures are passed
    /// through verbatim and callers decide.
    pub fn is_retryable(&self) -> bool {
        false
    }

    /// Check if this is [`TransactionError::NotInContext`].
    pub fn is_not_in_context(&self) -> bool {
        matches!(self, TransactionError::NotInContext)
    }

    pub(crate) fn runner(operation: RunnerOperation, source: RunnerError) -> Self {
        Self::Runner { operation, source }
    }
}
