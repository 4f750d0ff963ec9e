use crate::executor::Scheduler;
use crate::worker::format_panic;
use std::fmt;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll, Waker};

/// Observable state of a [`Promise`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Pending,
    Fulfilled,
    Rejected,
}

/// What a promise is resolved with: either a plain value, or another promise
/// whose eventual outcome is adopted.
pub enum Resolution<T, E> {
    Value(T),
    Adopt(Promise<T, E>),
}

impl<T, E> From<T> for Resolution<T, E> {
    fn from(value: T) -> Self {
        Resolution::Value(value)
    }
}

impl<T, E> fmt::Debug for Resolution<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resolution::Value(_) => f.write_str("Resolution::Value(..)"),
            Resolution::Adopt(promise) => f.debug_tuple("Resolution::Adopt").field(promise).finish(),
        }
    }
}

type Reaction<T, E> = Box<dyn FnOnce(Result<T, E>) + Send + 'static>;

enum State<T, E> {
    Pending(Vec<Reaction<T, E>>),
    Fulfilled(T),
    Rejected(E),
}

struct Inner<T, E> {
    state: State<T, E>,
    wakers: Vec<Waker>,
}

/// A value or rejection reason that becomes available later.
///
/// `Promise` is a handle: clones refer to the same underlying promise. The
/// promise moves from pending to fulfilled or rejected exactly once, and
/// every continuation registered through [`then`](Self::then) runs on the
/// promise's [`Scheduler`], never inside the registering or settling call.
///
/// # Examples
///
/// ```
/// use promise_plus::{ManualExecutor, Promise, Resolution, Scheduler};
/// use std::sync::Arc;
///
/// let executor = Arc::new(ManualExecutor::new());
/// let scheduler = Scheduler::new(executor.clone());
///
/// let (resolver, promise) = Promise::<String, String>::with_resolver(&scheduler);
/// let greeting = promise.map(|name| format!("hello {name}"));
/// resolver.resolve("world".into());
///
/// executor.run_until_stalled();
/// assert_eq!(greeting.outcome(), Some(Ok("hello world".to_string())));
/// ```
pub struct Promise<T, E> {
    inner: Arc<Mutex<Inner<T, E>>>,
    scheduler: Scheduler,
}

impl<T, E> Clone for Promise<T, E> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            scheduler: self.scheduler.clone(),
        }
    }
}

impl<T, E> fmt::Debug for Promise<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Promise").field("status", &self.status()).finish()
    }
}

/// The settlement capability of one promise. Cloning it hands out the same
/// capability; only the first `resolve` or `reject` across all clones counts.
pub struct Resolver<T, E> {
    promise: Promise<T, E>,
}

impl<T, E> Clone for Resolver<T, E> {
    fn clone(&self) -> Self {
        Self {
            promise: self.promise.clone(),
        }
    }
}

impl<T, E> fmt::Debug for Resolver<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolver").field("promise", &self.promise).finish()
    }
}

impl<T, E> Promise<T, E> {
    fn lock(&self) -> MutexGuard<'_, Inner<T, E>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn status(&self) -> Status {
        match self.lock().state {
            State::Pending(_) => Status::Pending,
            State::Fulfilled(_) => Status::Fulfilled,
            State::Rejected(_) => Status::Rejected,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status() == Status::Pending
    }

    /// The scheduler continuations of this promise are submitted to.
    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }
}

impl<T, E> Promise<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    /// Creates a promise and runs `initializer` synchronously with its
    /// [`Resolver`]. An `Err` returned by the initializer rejects the promise,
    /// unless it was already settled.
    ///
    /// The resolver only accepts plain values; use [`Promise::resolve`] to
    /// adopt the outcome of another promise.
    pub fn new<F>(scheduler: &Scheduler, initializer: F) -> Self
    where
        F: FnOnce(Resolver<T, E>) -> Result<(), E>,
    {
        let (resolver, promise) = Self::with_resolver(scheduler);
        if let Err(reason) = initializer(resolver.clone()) {
            log::trace!("promise initializer failed, rejecting");
            resolver.reject(reason);
        }
        promise
    }

    /// Creates a pending promise together with its detached resolver.
    pub fn with_resolver(scheduler: &Scheduler) -> (Resolver<T, E>, Self) {
        let promise = Promise {
            inner: Arc::new(Mutex::new(Inner {
                state: State::Pending(Vec::new()),
                wakers: Vec::new(),
            })),
            scheduler: scheduler.clone(),
        };
        (
            Resolver {
                promise: promise.clone(),
            },
            promise,
        )
    }

    /// The settled outcome, or `None` while pending.
    pub fn outcome(&self) -> Option<Result<T, E>> {
        match &self.lock().state {
            State::Pending(_) => None,
            State::Fulfilled(value) => Some(Ok(value.clone())),
            State::Rejected(reason) => Some(Err(reason.clone())),
        }
    }

    fn settle(&self, outcome: Result<T, E>) {
        let (reactions, wakers) = {
            let mut inner = self.lock();
            if !matches!(inner.state, State::Pending(_)) {
                log::trace!("ignoring settlement of an already settled promise");
                return;
            }
            let settled = match &outcome {
                Ok(value) => State::Fulfilled(value.clone()),
                Err(reason) => State::Rejected(reason.clone()),
            };
            let reactions = match std::mem::replace(&mut inner.state, settled) {
                State::Pending(reactions) => reactions,
                _ => Vec::new(),
            };
            (reactions, std::mem::take(&mut inner.wakers))
        };
        log::trace!(
            "promise {} with {} queued reaction(s)",
            if outcome.is_ok() { "fulfilled" } else { "rejected" },
            reactions.len()
        );
        // All queued reactions run as a single unit of work, in registration order.
        // A panicking reaction does not keep the ones after it from running.
        if !reactions.is_empty() {
            self.scheduler.submit(move || {
                let mut first_panic = None;
                for reaction in reactions {
                    let outcome = outcome.clone();
                    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(move || reaction(outcome))) {
                        log::error!("promise reaction: {}", format_panic(&*payload));
                        first_panic.get_or_insert(payload);
                    }
                }
                if let Some(payload) = first_panic {
                    panic::resume_unwind(payload);
                }
            });
        }
        for waker in wakers {
            waker.wake();
        }
    }

    /// Registers `reaction` to receive the outcome. Never runs it inline.
    pub(crate) fn subscribe<F>(&self, reaction: F)
    where
        F: FnOnce(Result<T, E>) + Send + 'static,
    {
        let outcome = {
            let mut inner = self.lock();
            match &mut inner.state {
                State::Pending(reactions) => {
                    reactions.push(Box::new(reaction));
                    log::trace!("queued reaction #{} on pending promise", reactions.len());
                    return;
                }
                State::Fulfilled(value) => Ok(value.clone()),
                State::Rejected(reason) => Err(reason.clone()),
            }
        };
        log::trace!("dispatching reaction on settled promise");
        self.scheduler.submit(move || reaction(outcome));
    }

    /// Derives a new promise from the outcome of this one.
    ///
    /// Exactly one of `on_fulfilled` or `on_rejected` runs, later, on the
    /// scheduler. The derived promise rejects with the handler's `Err`,
    /// adopts the promise in a returned [`Resolution::Adopt`], or fulfills
    /// with a returned [`Resolution::Value`].
    pub fn then<U, F, R>(&self, on_fulfilled: F, on_rejected: R) -> Promise<U, E>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> Result<Resolution<U, E>, E> + Send + 'static,
        R: FnOnce(E) -> Result<Resolution<U, E>, E> + Send + 'static,
    {
        let (resolver, derived) = Promise::with_resolver(&self.scheduler);
        self.subscribe(move |outcome| {
            let handled = match outcome {
                Ok(value) => on_fulfilled(value),
                Err(reason) => on_rejected(reason),
            };
            match handled {
                Ok(resolution) => resolver.resolve_from(resolution),
                Err(reason) => resolver.reject(reason),
            }
        });
        derived
    }

    /// [`then`](Self::then) without a rejection handler: a rejection passes
    /// through to the derived promise unchanged.
    pub fn and_then<U, F>(&self, on_fulfilled: F) -> Promise<U, E>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> Result<Resolution<U, E>, E> + Send + 'static,
    {
        self.then(on_fulfilled, |reason| Err(reason))
    }

    /// [`then`](Self::then) without a fulfillment handler: a fulfillment
    /// passes through to the derived promise unchanged.
    pub fn catch<R>(&self, on_rejected: R) -> Promise<T, E>
    where
        R: FnOnce(E) -> Result<Resolution<T, E>, E> + Send + 'static,
    {
        self.then(|value| Ok(Resolution::Value(value)), on_rejected)
    }

    /// Maps the fulfillment value with an infallible function.
    pub fn map<U, F>(&self, f: F) -> Promise<U, E>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> U + Send + 'static,
    {
        self.and_then(move |value| Ok(Resolution::Value(f(value))))
    }
}

impl<T, E> Resolver<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    /// Fulfills the promise with `value`. No-op once settled.
    pub fn resolve(&self, value: T) {
        self.promise.settle(Ok(value));
    }

    /// Rejects the promise with `reason`. No-op once settled.
    pub fn reject(&self, reason: E) {
        self.promise.settle(Err(reason));
    }

    pub(crate) fn settle(&self, outcome: Result<T, E>) {
        self.promise.settle(outcome);
    }

    /// Fulfills with a plain value, or binds the promise's fate to another one.
    pub(crate) fn resolve_from(&self, resolution: Resolution<T, E>) {
        match resolution {
            Resolution::Value(value) => self.resolve(value),
            Resolution::Adopt(inner) => {
                log::trace!("adopting the outcome of {:?}", inner);
                let resolver = self.clone();
                inner.subscribe(move |outcome| resolver.settle(outcome));
            }
        }
    }
}

impl<T: Clone, E: Clone> Future for Promise<T, E> {
    type Output = Result<T, E>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut guard = self.lock();
        let inner = &mut *guard;
        match &inner.state {
            State::Fulfilled(value) => Poll::Ready(Ok(value.clone())),
            State::Rejected(reason) => Poll::Ready(Err(reason.clone())),
            State::Pending(_) => {
                if !inner.wakers.iter().any(|waker| waker.will_wake(cx.waker())) {
                    inner.wakers.push(cx.waker().clone());
                }
                Poll::Pending
            }
        }
    }
}
