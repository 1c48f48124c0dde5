//! The transaction runner interface.
//!
//! A runner is whatever actually talks to the database: it opens a
//! transaction at a given isolation level and later commits or rolls it
//! back. The coordinator never looks inside the handle it returns.

use std::sync::Arc;

use async_trait::async_trait;

use crate::transaction::isolation::IsolationLevel;

/// Error type returned by runners. Passed through to callers verbatim.
pub type RunnerError = Box<dyn std::error::Error + Send + Sync>;

/// Starts and finalizes transactions over a concrete resource.
///
/// Idempotency of `commit`/`rollback` is not required: the coordinator
/// finalizes each handle at most once.
#[async_trait]
pub trait TransactionRunner: Send + Sync + 'static {
    /// Opaque value representing an open transaction (e.g. a connection
    /// that has issued `BEGIN`).
    type Handle: Clone + Send + Sync + 'static;

    /// Open a new transaction at the given isolation level.
    async fn start(&self, isolation: IsolationLevel) -> Result<Self::Handle, RunnerError>;

    /// Commit the transaction.
    async fn commit(&self, handle: &Self::Handle) -> Result<(), RunnerError>;

    /// Abort the transaction.
    async fn rollback(&self, handle: &Self::Handle) -> Result<(), RunnerError>;
}

#[async_trait]
impl<R: TransactionRunner> TransactionRunner for Arc<R> {
    type Handle = R::Handle;

    async fn start(&self, isolation: IsolationLevel) -> Result<Self::Handle, RunnerError> {
        (**self).start(isolation).await
    }

    async fn commit(&self, handle: &Self::Handle) -> Result<(), RunnerError> {
        (**self).commit(handle).await
    }

    async fn rollback(&self, handle: &Self::Handle) -> Result<(), RunnerError> {
        (**self).rollback(handle).await
    }
}
