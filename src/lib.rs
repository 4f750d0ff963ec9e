//! Promise/A+ style deferred values.
//!
//! A [`Promise`] holds a value or a rejection reason that becomes available
//! later. Continuations registered with [`Promise::then`] never run inside the
//! call that registers them or the call that settles the promise; they are
//! handed to an [`Executor`], which runs them later in submission order.
//!
//! # Examples
//!
//! ```
//! use promise_plus::{ManualExecutor, Promise, Resolution, Scheduler, Status};
//! use std::sync::Arc;
//!
//! let executor = Arc::new(ManualExecutor::new());
//! let scheduler = Scheduler::new(executor.clone());
//!
//! let doubled = Promise::<i32, String>::resolve(&scheduler, 21)
//!     .and_then(|v| Ok(Resolution::Value(v * 2)));
//! assert_eq!(doubled.status(), Status::Pending);
//!
//! executor.run_until_stalled();
//! assert_eq!(doubled.outcome(), Some(Ok(42)));
//! ```
use thiserror::Error;

pub mod combinators;
pub mod executor;
pub mod manual;
pub mod promise;
pub mod worker;

pub use executor::{Executor, Scheduler, Task};
pub use manual::ManualExecutor;
pub use promise::{Promise, Resolution, Resolver, Status};
pub use worker::{ThreadExecutor, ThreadExecutorConfig};

/// Failures of the execution machinery itself. Promise outcomes are never
/// reported through this type.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
    #[error("failed to spawn executor thread: {0}")]
    Spawn(String),
    #[error("executor has been shut down")]
    ExecutorShutdown,
}
