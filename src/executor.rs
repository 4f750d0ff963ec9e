//! The deferred-execution facility promises dispatch their continuations to.
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// A unit of work.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Runs submitted tasks later, never inside the submitting call.
///
/// Tasks passed to [`submit`](Executor::submit) run in submission order and
/// never overlap one another. A task passed to
/// [`submit_after`](Executor::submit_after) runs no earlier than `delay` after
/// submission; its order relative to other tasks is otherwise unspecified.
pub trait Executor: Send + Sync + 'static {
    fn submit(&self, task: Task);
    fn submit_after(&self, task: Task, delay: Duration);
}

/// Shared handle to an [`Executor`]. Every promise carries one, and promises
/// derived from it inherit it.
#[derive(Clone)]
pub struct Scheduler {
    executor: Arc<dyn Executor>,
}

impl Scheduler {
    pub fn new<X: Executor>(executor: Arc<X>) -> Self {
        Self { executor }
    }

    pub fn submit<F>(&self, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.executor.submit(Box::new(task));
    }

    pub fn submit_after<F>(&self, task: F, delay: Duration)
    where
        F: FnOnce() + Send + 'static,
    {
        self.executor.submit_after(Box::new(task), delay);
    }
}

impl From<Arc<dyn Executor>> for Scheduler {
    fn from(executor: Arc<dyn Executor>) -> Self {
        Self { executor }
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler").finish_non_exhaustive()
    }
}
