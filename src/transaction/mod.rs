//! Transaction propagation for async call chains.
//!
//! Code nested anywhere below a [`PropagatedTransaction::run`] call joins
//! the transaction that call opened, without the handle being passed
//! down explicitly. Only the outermost `run` in a chain talks to the
//! runner; nested calls just execute their callback.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  PropagatedTransaction                      │
//! │   (join or start, commit/rollback what it started, track)   │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!        ┌─────────────────────┼─────────────────────┐
//!        │                     │                     │
//!        ▼                     ▼                     ▼
//!  ┌─────────────┐       ┌─────────────┐       ┌─────────────┐
//!  │ Context     │       │   Active    │       │ Transaction │
//!  │ Storage     │       │ Transaction │       │   Runner    │
//!  └─────────────┘       └─────────────┘       └─────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use txscope::transaction::{PropagatedTransaction, TransactionError};
//!
//! let tx = PropagatedTransaction::new(runner);
//!
//! tx.run(|| async {
//!     insert_user(&tx).await?;
//!     // Joins the transaction above instead of opening a second one.
//!     tx.run(|| insert_audit_log(&tx)).await?;
//!     Ok::<_, TransactionError>(())
//! })
//! .await?;
//! ```

mod context;
mod error;
mod isolation;
mod manager;
mod runner;
mod storage;

pub use context::{ActiveTransaction, TransactionMetadata, TxState};
pub use error::{RunnerOperation, TransactionError, TransactionResult};
pub use isolation::IsolationLevel;
pub use manager::{PropagatedTransaction, TransactionStorage};
pub use runner::{RunnerError, TransactionRunner};
pub use storage::{propagate, spawn, ContextStorage};
