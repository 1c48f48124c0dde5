//! Async-context-local storage.
//!
//! A [`ContextStorage`] binds a value to one logical call chain: everything
//! awaited inside [`ContextStorage::scope`] sees the value, unrelated tasks
//! never do. Bindings live in a linked list of frames carried by a single
//! tokio task-local, so independent storages nest without interfering and
//! an inner binding of the same storage shadows the outer one until its
//! scope ends.
//!
//! Tasks started with `tokio::spawn` do not inherit task-locals. Use
//! [`spawn`] or wrap the future with [`propagate`] to carry the current
//! bindings into another task.

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::task::JoinHandle;

tokio::task_local! {
    static FRAME: Arc<Frame>;
}

static NEXT_STORAGE_ID: AtomicU64 = AtomicU64::new(1);

/// One binding in the current chain.
struct Frame {
    storage_id: u64,
    value: Arc<dyn Any + Send + Sync>,
    parent: Option<Arc<Frame>>,
}

fn current_frame() -> Option<Arc<Frame>> {
    FRAME.try_with(Arc::clone).ok()
}

/// A scoped slot holding a `T` for the current async call chain.
pub struct ContextStorage<T> {
    id: u64,
    _marker: PhantomData<fn() -> T>,
}

impl<T> ContextStorage<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create a new, independent storage.
    pub fn new() -> Self {
        Self {
            id: NEXT_STORAGE_ID.fetch_add(1, Ordering::Relaxed),
            _marker: PhantomData,
        }
    }

    /// The value bound in the innermost enclosing scope of this storage.
    pub fn get(&self) -> Option<T> {
        let mut frame = current_frame();
        while let Some(current) = frame {
            if current.storage_id == self.id {
                return current.value.downcast_ref::<T>().cloned();
            }
            frame = current.parent.clone();
        }
        None
    }

    /// Check if a scope of this storage encloses the caller.
    pub fn is_in_scope(&self) -> bool {
        self.get().is_some()
    }

    /// Run `fut` with `value` bound in this storage.
    ///
    /// Bindings of other storages visible at the call site stay visible
    /// inside the scope.
    pub fn scope<F>(&self, value: T, fut: F) -> impl Future<Output = F::Output>
    where
        F: Future,
    {
        let frame = Arc::new(Frame {
            storage_id: self.id,
            value: Arc::new(value),
            parent: current_frame(),
        });
        FRAME.scope(frame, fut)
    }
}

impl<T> Default for ContextStorage<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for ContextStorage<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            _marker: PhantomData,
        }
    }
}

impl<T> fmt::Debug for ContextStorage<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextStorage").field("id", &self.id).finish()
    }
}

/// Capture the bindings visible now and re-establish them around `fut`.
pub fn propagate<F>(fut: F) -> impl Future<Output = F::Output>
where
    F: Future,
{
    let frame = current_frame();
    async move {
        match frame {
            Some(frame) => FRAME.scope(frame, fut).await,
            None => fut.await,
        }
    }
}

/// Spawn a task that inherits the caller's bindings.
pub fn spawn<F>(fut: F) -> JoinHandle<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    tokio::spawn(propagate(fut))
}
