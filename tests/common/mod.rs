//! Shared fixtures: an in-memory "database" whose runner buffers writes per
//! transaction and only publishes them on commit.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use thiserror::Error;

use txscope::{
    CoordinatorConfig, IsolationLevel, PropagatedTransaction, RunnerError, TransactionError,
    TransactionRunner,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: u32,
    pub name: String,
    pub surname: String,
}

pub fn user(id: u32) -> User {
    User {
        id,
        name: "Ada".to_string(),
        surname: "Lovelace".to_string(),
    }
}

/// A connection with an open transaction.
#[derive(Debug, Clone)]
pub struct Connection {
    pub id: u64,
    pub isolation: IsolationLevel,
    pending: Arc<Mutex<Vec<User>>>,
}

impl Connection {
    pub fn insert(&self, user: User) {
        self.pending.lock().push(user);
    }
}

#[derive(Default)]
pub struct MemoryDb {
    committed: Mutex<Vec<User>>,
    next_id: AtomicU64,
    pub starts: AtomicUsize,
    pub commits: AtomicUsize,
    pub rollbacks: AtomicUsize,
    pub fail_start: AtomicBool,
    pub fail_commit: AtomicBool,
}

impl MemoryDb {
    pub fn find(&self, id: u32) -> Option<User> {
        self.committed.lock().iter().find(|u| u.id == id).cloned()
    }

    pub fn len(&self) -> usize {
        self.committed.lock().len()
    }

    /// (starts, commits, rollbacks)
    pub fn counts(&self) -> (usize, usize, usize) {
        (
            self.starts.load(Ordering::SeqCst),
            self.commits.load(Ordering::SeqCst),
            self.rollbacks.load(Ordering::SeqCst),
        )
    }
}

#[async_trait]
impl TransactionRunner for MemoryDb {
    type Handle = Connection;

    async fn start(&self, isolation: IsolationLevel) -> Result<Connection, RunnerError> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        if self.fail_start.load(Ordering::SeqCst) {
            return Err("too many connections".into());
        }
        Ok(Connection {
            id: self.next_id.fetch_add(1, Ordering::SeqCst) + 1,
            isolation,
            pending: Arc::new(Mutex::new(Vec::new())),
        })
    }

    async fn commit(&self, conn: &Connection) -> Result<(), RunnerError> {
        self.commits.fetch_add(1, Ordering::SeqCst);
        if self.fail_commit.load(Ordering::SeqCst) {
            return Err("connection lost".into());
        }
        let rows: Vec<User> = conn.pending.lock().drain(..).collect();
        self.committed.lock().extend(rows);
        Ok(())
    }

    async fn rollback(&self, conn: &Connection) -> Result<(), RunnerError> {
        self.rollbacks.fetch_add(1, Ordering::SeqCst);
        conn.pending.lock().clear();
        Ok(())
    }
}

pub type Coordinator = PropagatedTransaction<Arc<MemoryDb>>;

/// An unregistered coordinator over a fresh database.
pub fn setup() -> (Arc<MemoryDb>, Coordinator) {
    init_tracing();
    let db = Arc::new(MemoryDb::default());
    let coordinator =
        PropagatedTransaction::standalone(db.clone(), None, CoordinatorConfig::default());
    (db, coordinator)
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Transaction(#[from] TransactionError),

    #[error("user {0} is invalid")]
    InvalidUser(u32),
}

/// Repository-style helper that never sees a connection argument.
pub async fn insert_user(tx: &Coordinator, user: User) -> Result<(), AppError> {
    let conn = tx.connection().ok_or(TransactionError::NotInContext)?;
    if user.name.is_empty() {
        return Err(AppError::InvalidUser(user.id));
    }
    conn.insert(user);
    Ok(())
}
