//! txscope - transaction propagation across async call chains.
//!
//! A [`PropagatedTransaction`] binds the transaction it opens to the
//! current async call chain. Anything awaited inside that chain can call
//! `run` again and transparently join the open transaction, or reach the
//! handle through `connection()`, without it being threaded through every
//! function signature. Commit and rollback happen exactly once, in the
//! call that started the transaction.
//!
//! The database side is pluggable through [`TransactionRunner`].
//!
//! # Example
//!
//! ```no_run
//! use async_trait::async_trait;
//! use txscope::{IsolationLevel, PropagatedTransaction, RunnerError, TransactionError, TransactionRunner};
//!
//! struct Runner;
//!
//! #[async_trait]
//! impl TransactionRunner for Runner {
//!     type Handle = u64;
//!
//!     async fn start(&self, _isolation: IsolationLevel) -> Result<u64, RunnerError> {
//!         Ok(1)
//!     }
//!
//!     async fn commit(&self, _handle: &u64) -> Result<(), RunnerError> {
//!         Ok(())
//!     }
//!
//!     async fn rollback(&self, _handle: &u64) -> Result<(), RunnerError> {
//!         Ok(())
//!     }
//! }
//!
//! # async fn demo() -> Result<(), TransactionError> {
//! let tx = PropagatedTransaction::new(Runner);
//! let handle = tx
//!     .run(|| async { Ok::<_, TransactionError>(tx.connection()) })
//!     .await?;
//! assert_eq!(handle, Some(1));
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod transaction;

pub use config::CoordinatorConfig;
pub use transaction::{
    ActiveTransaction, ContextStorage, IsolationLevel, PropagatedTransaction, RunnerError,
    TransactionError, TransactionResult, TransactionRunner,
};
