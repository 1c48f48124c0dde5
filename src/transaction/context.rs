//! The transaction bound into a context scope.
//!
//! An [`ActiveTransaction`] wraps the runner's handle together with its
//! metadata and lifecycle state. Clones share the same state, so every
//! join in a call chain observes a commit or rollback made by any other
//! participant.
//!
//! ```text
//! NONE ──start──▶ STARTED ──commit───▶ COMMITTED
//!                    │
//!                    └─────rollback──▶ ROLLED_BACK
//! ```

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use ulid::Ulid;

use crate::transaction::error::{TransactionError, TransactionResult};
use crate::transaction::isolation::IsolationLevel;

/// Lifecycle state of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TxState {
    Started,
    Committed,
    RolledBack,
}

impl TxState {
    /// Check if the state is terminal.
    pub fn is_finalized(&self) -> bool {
        !matches!(self, TxState::Started)
    }
}

impl fmt::Display for TxState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TxState::Started => write!(f, "started"),
            TxState::Committed => write!(f, "committed"),
            TxState::RolledBack => write!(f, "rolled back"),
        }
    }
}

/// Transaction metadata tracked by the coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransactionMetadata {
    /// Unique transaction ID.
    pub tx_id: String,
    /// Isolation level the transaction was started with.
    pub isolation: IsolationLevel,
    /// When the transaction started.
    pub started_at: DateTime<Utc>,
}

struct ActiveInner<H> {
    metadata: TransactionMetadata,
    handle: H,
    state: Mutex<TxState>,
}

/// A started transaction and the runner handle backing it.
pub struct ActiveTransaction<H> {
    inner: Arc<ActiveInner<H>>,
}

impl<H> ActiveTransaction<H> {
    /// Wrap a freshly started handle.
    pub(crate) fn new(handle: H, isolation: IsolationLevel) -> Self {
        Self {
            inner: Arc::new(ActiveInner {
                metadata: TransactionMetadata {
                    tx_id: Ulid::new().to_string().to_lowercase(),
                    isolation,
                    started_at: Utc::now(),
                },
                handle,
                state: Mutex::new(TxState::Started),
            }),
        }
    }

    /// Get the transaction ID.
    pub fn id(&self) -> &str {
        &self.inner.metadata.tx_id
    }

    /// Get the isolation level.
    pub fn isolation(&self) -> IsolationLevel {
        self.inner.metadata.isolation
    }

    pub fn metadata(&self) -> &TransactionMetadata {
        &self.inner.metadata
    }

    /// The runner's handle.
    pub fn handle(&self) -> &H {
        &self.inner.handle
    }

    pub fn state(&self) -> TxState {
        *self.inner.state.lock()
    }

    /// Check if the transaction can still be committed or rolled back.
    pub fn is_active(&self) -> bool {
        !self.state().is_finalized()
    }

    /// Fail with [`TransactionError::AlreadyFinalized`] unless still started.
    pub fn ensure_active(&self) -> TransactionResult<()> {
        let state = self.state();
        if state.is_finalized() {
            return Err(TransactionError::AlreadyFinalized {
                tx_id: self.id().to_string(),
                state: state.to_string(),
            });
        }
        Ok(())
    }

    /// Move from `Started` to a terminal state.
    ///
    /// The transition happens before the runner is called, so a second
    /// finalize racing the first one is rejected rather than forwarded.
    pub(crate) fn finish(&self, target: TxState) -> TransactionResult<()> {
        let mut state = self.inner.state.lock();
        if state.is_finalized() {
            return Err(TransactionError::AlreadyFinalized {
                tx_id: self.id().to_string(),
                state: state.to_string(),
            });
        }
        *state = target;
        Ok(())
    }
}

impl<H> Clone for ActiveTransaction<H> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<H> fmt::Debug for ActiveTransaction<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActiveTransaction")
            .field("tx_id", &self.id())
            .field("isolation", &self.isolation())
            .field("state", &self.state())
            .finish()
    }
}
