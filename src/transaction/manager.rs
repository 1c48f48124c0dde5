//! Propagation coordinator - decides whether a unit of work joins the
//! transaction already open in its call chain or starts a new one.
//!
//! The coordinator handles:
//! - Joining the transaction visible in the current context
//! - Starting, scoping and finalizing transactions it opened itself
//! - Explicit commit/rollback from inside a scope
//! - Tracking started transactions until they are finalized
//!
//! There is one coordinator per runner type per process: the first
//! construction registers the instance, later constructions return it and
//! discard their arguments. [`PropagatedTransaction::reset`] clears the
//! registration.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::config::CoordinatorConfig;
use crate::transaction::context::{ActiveTransaction, TransactionMetadata, TxState};
use crate::transaction::error::{RunnerOperation, TransactionError, TransactionResult};
use crate::transaction::isolation::IsolationLevel;
use crate::transaction::runner::TransactionRunner;
use crate::transaction::storage::ContextStorage;

/// Registered coordinators, keyed by runner type.
static INSTANCES: Lazy<RwLock<HashMap<TypeId, Box<dyn Any + Send + Sync>>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

/// Context storage holding the current transaction for runner `R`.
pub type TransactionStorage<R> = ContextStorage<ActiveTransaction<<R as TransactionRunner>::Handle>>;

/// Propagation coordinator.
///
/// Thread-safe: can be shared across tasks via Clone (uses Arc internally).
pub struct PropagatedTransaction<R: TransactionRunner> {
    inner: Arc<PropagatedTransactionInner<R>>,
}

struct PropagatedTransactionInner<R: TransactionRunner> {
    /// Starts and finalizes transactions.
    runner: R,
    /// Where the current transaction of a call chain lives.
    storage: TransactionStorage<R>,
    config: CoordinatorConfig,
    /// Started, unfinished transactions tracked by ID.
    active: RwLock<HashMap<String, TransactionMetadata>>,
}

impl<R: TransactionRunner> PropagatedTransaction<R> {
    /// Get the process-wide coordinator for `R`, creating it on first use.
    pub fn new(runner: R) -> Self {
        Self::with_config(runner, None, CoordinatorConfig::default())
    }

    /// Like [`new`](Self::new), with a pre-built context storage.
    pub fn with_storage(runner: R, storage: Option<TransactionStorage<R>>) -> Self {
        Self::with_config(runner, storage, CoordinatorConfig::default())
    }

    /// Get the process-wide coordinator for `R`, creating it from these
    /// arguments if none is registered yet.
    ///
    /// When an instance already exists the arguments are dropped.
    ///
    /// The registry is keyed by the exact runner type, so
    /// `PropagatedTransaction<Db>` and `PropagatedTransaction<Arc<Db>>` are
    /// separate coordinators whose scopes never join each other. Pick one
    /// runner type per database and use it everywhere.
    pub fn with_config(
        runner: R,
        storage: Option<TransactionStorage<R>>,
        config: CoordinatorConfig,
    ) -> Self {
        let mut instances = INSTANCES.write();
        let key = TypeId::of::<R>();

        if let Some(existing) = instances.get(&key).and_then(|i| i.downcast_ref::<Self>()) {
            debug!("coordinator already registered, ignoring new runner");
            return existing.clone();
        }

        let coordinator = Self::standalone(runner, storage, config);
        instances.insert(key, Box::new(coordinator.clone()));
        coordinator
    }

    /// Build a coordinator that is not registered process-wide.
    ///
    /// Only calls made through this instance (or its clones) join each
    /// other, unless it shares `storage` with another coordinator.
    pub fn standalone(
        runner: R,
        storage: Option<TransactionStorage<R>>,
        config: CoordinatorConfig,
    ) -> Self {
        Self {
            inner: Arc::new(PropagatedTransactionInner {
                runner,
                storage: storage.unwrap_or_default(),
                config,
                active: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// The registered coordinator for `R`, if any.
    pub fn instance() -> Option<Self> {
        INSTANCES
            .read()
            .get(&TypeId::of::<R>())
            .and_then(|i| i.downcast_ref::<Self>())
            .cloned()
    }

    /// Drop the registered coordinator for `R` so the next construction
    /// creates a fresh one. Returns whether an instance was registered.
    ///
    /// Clones of the old coordinator keep working on their own.
    pub fn reset() -> bool {
        INSTANCES.write().remove(&TypeId::of::<R>()).is_some()
    }

    /// Get a reference to the underlying runner.
    pub fn runner(&self) -> &R {
        &self.inner.runner
    }

    pub fn storage(&self) -> &TransactionStorage<R> {
        &self.inner.storage
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.inner.config
    }

    /// The handle visible in the current context, if any.
    pub fn connection(&self) -> Option<R::Handle> {
        self.current().map(|tx| tx.handle().clone())
    }

    /// The transaction visible in the current context, if any.
    pub fn current(&self) -> Option<ActiveTransaction<R::Handle>> {
        self.inner.storage.get()
    }

    /// Run `callback` inside a transaction at the default isolation level.
    ///
    /// See [`run_with_isolation`](Self::run_with_isolation).
    pub async fn run<F, Fut, T, E>(&self, callback: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<TransactionError>,
    {
        self.run_with_isolation(callback, self.inner.config.default_isolation)
            .await
    }

    /// Run `callback` inside a transaction.
    ///
    /// If a transaction is already visible, the callback joins it and its
    /// outcome is returned untouched; `isolation` is ignored. Joining a
    /// transaction that was already committed or rolled back fails with
    /// [`TransactionError::AlreadyFinalized`]. Otherwise a
    /// new transaction is started at `isolation` and bound for the
    /// duration of the callback, then committed if the callback returned
    /// `Ok` or rolled back if it returned `Err`.
    ///
    /// A failed rollback replaces the callback's error. A transaction the
    /// callback already finalized itself is left alone.
    pub async fn run_with_isolation<F, Fut, T, E>(
        &self,
        callback: F,
        isolation: IsolationLevel,
    ) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<TransactionError>,
    {
        if let Some(tx) = self.current() {
            tx.ensure_active()?;
            debug!(tx_id = tx.id(), "joining transaction");
            return callback().await;
        }

        let tx = self.begin(isolation).await?;
        let guard = AbandonGuard::new(self.clone(), tx.clone());

        let result = self
            .inner
            .storage
            .scope(tx.clone(), async move { callback().await })
            .await;

        let outcome = match result {
            Ok(value) => match self.settle(&tx, TxState::Committed).await {
                Ok(()) => Ok(value),
                Err(err) => Err(E::from(err)),
            },
            Err(err) => match self.settle(&tx, TxState::RolledBack).await {
                Ok(()) => Err(err),
                Err(rollback_err) => {
                    warn!(
                        tx_id = tx.id(),
                        error = %rollback_err,
                        "rollback failed, callback error discarded"
                    );
                    Err(E::from(rollback_err))
                }
            },
        };

        guard.disarm();
        outcome
    }

    /// Start a transaction without binding or finalizing it.
    ///
    /// Pair with [`run_in`](Self::run_in) and an explicit
    /// [`commit`](Self::commit) or [`rollback`](Self::rollback).
    pub async fn begin(
        &self,
        isolation: IsolationLevel,
    ) -> TransactionResult<ActiveTransaction<R::Handle>> {
        let handle = self
            .inner
            .runner
            .start(isolation)
            .await
            .map_err(|source| TransactionError::runner(RunnerOperation::Start, source))?;

        let tx = ActiveTransaction::new(handle, isolation);

        if self.inner.config.track_active {
            let mut active = self.inner.active.write();
            active.insert(tx.id().to_string(), tx.metadata().clone());
        }

        debug!(tx_id = tx.id(), isolation = %isolation, "transaction started");
        Ok(tx)
    }

    /// Run `callback` with `tx` bound as the current transaction.
    ///
    /// Nothing is committed or rolled back on the way out.
    pub async fn run_in<F, Fut, T>(&self, tx: ActiveTransaction<R::Handle>, callback: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        self.inner
            .storage
            .scope(tx, async move { callback().await })
            .await
    }

    /// Commit the transaction visible in the current context.
    pub async fn commit(&self) -> TransactionResult<()> {
        let tx = self.current().ok_or(TransactionError::NotInContext)?;
        self.commit_transaction(&tx).await
    }

    /// Roll back the transaction visible in the current context.
    pub async fn rollback(&self) -> TransactionResult<()> {
        let tx = self.current().ok_or(TransactionError::NotInContext)?;
        self.rollback_transaction(&tx).await
    }

    /// Commit a specific transaction.
    pub(crate) async fn commit_transaction(
        &self,
        tx: &ActiveTransaction<R::Handle>,
    ) -> TransactionResult<()> {
        tx.finish(TxState::Committed)?;
        self.mark_completed(tx.id());

        self.inner
            .runner
            .commit(tx.handle())
            .await
            .map_err(|source| TransactionError::runner(RunnerOperation::Commit, source))?;

        debug!(tx_id = tx.id(), "transaction committed");
        Ok(())
    }

    /// Roll back a specific transaction.
    pub(crate) async fn rollback_transaction(
        &self,
        tx: &ActiveTransaction<R::Handle>,
    ) -> TransactionResult<()> {
        tx.finish(TxState::RolledBack)?;
        self.mark_completed(tx.id());

        self.inner
            .runner
            .rollback(tx.handle())
            .await
            .map_err(|source| TransactionError::runner(RunnerOperation::Rollback, source))?;

        debug!(tx_id = tx.id(), "transaction rolled back");
        Ok(())
    }

    /// Finalize a transaction started by `run`, unless someone else
    /// already did.
    async fn settle(
        &self,
        tx: &ActiveTransaction<R::Handle>,
        target: TxState,
    ) -> TransactionResult<()> {
        let result = match target {
            TxState::Committed => self.commit_transaction(tx).await,
            TxState::RolledBack => self.rollback_transaction(tx).await,
            TxState::Started => Ok(()),
        };

        match result {
            Err(TransactionError::AlreadyFinalized { state, .. }) => {
                debug!(tx_id = tx.id(), state = %state, "transaction finalized inside callback");
                Ok(())
            }
            other => other,
        }
    }

    /// Get the number of active transactions.
    pub fn active_count(&self) -> usize {
        self.inner.active.read().len()
    }

    /// List all active transaction IDs.
    pub fn active_transactions(&self) -> Vec<String> {
        self.inner.active.read().keys().cloned().collect()
    }

    /// Check if a transaction is active.
    pub fn is_active(&self, tx_id: &str) -> bool {
        self.inner.active.read().contains_key(tx_id)
    }

    /// Get metadata for an active transaction.
    pub fn transaction_info(&self, tx_id: &str) -> Option<TransactionMetadata> {
        self.inner.active.read().get(tx_id).cloned()
    }

    fn mark_completed(&self, tx_id: &str) {
        self.inner.active.write().remove(tx_id);
    }
}

impl<R: TransactionRunner> Clone for PropagatedTransaction<R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<R: TransactionRunner> fmt::Debug for PropagatedTransaction<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropagatedTransaction")
            .field("storage", &self.inner.storage)
            .field("active_count", &self.active_count())
            .finish()
    }
}

/// Rolls back a transaction whose `run` future was dropped (or unwound)
/// before its callback settled.
///
/// The rollback is spawned on the current tokio runtime. Without one the
/// handle stays open and is the runner's to clean up.
struct AbandonGuard<R: TransactionRunner> {
    coordinator: PropagatedTransaction<R>,
    tx: ActiveTransaction<R::Handle>,
    armed: bool,
}

impl<R: TransactionRunner> AbandonGuard<R> {
    fn new(coordinator: PropagatedTransaction<R>, tx: ActiveTransaction<R::Handle>) -> Self {
        Self {
            coordinator,
            tx,
            armed: true,
        }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl<R: TransactionRunner> Drop for AbandonGuard<R> {
    fn drop(&mut self) {
        if self.armed && self.tx.is_active() {
            self.coordinator.mark_completed(self.tx.id());

            let Ok(runtime) = tokio::runtime::Handle::try_current() else {
                warn!(
                    tx_id = self.tx.id(),
                    "transaction abandoned outside a runtime, left open"
                );
                return;
            };

            warn!(
                tx_id = self.tx.id(),
                "transaction abandoned before its callback settled, rolling back"
            );
            let coordinator = self.coordinator.clone();
            let tx = self.tx.clone();
            runtime.spawn(async move {
                if let Err(err) = coordinator.rollback_transaction(&tx).await {
                    warn!(tx_id = tx.id(), error = %err, "rollback of abandoned transaction failed");
                }
            });
        }
    }
}
