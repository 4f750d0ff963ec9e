//! A threaded executor: one worker thread runs tasks in FIFO order and a
//! companion timer thread holds delayed tasks until they are due.
use crate::executor::{Executor, Task};
use crate::Error;
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use std::any::Any;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct ThreadExecutorConfig {
    /// Name of the worker thread. The timer thread is named `<name>-timer`.
    pub name: String,
}

impl Default for ThreadExecutorConfig {
    fn default() -> Self {
        Self {
            name: "promise-worker".to_string(),
        }
    }
}

/// [`Executor`] backed by a dedicated worker thread.
///
/// Tasks never overlap: the worker runs them one at a time. A panicking task
/// is logged and the worker moves on. Both threads exit once every handle is
/// dropped and the remaining tasks and timers have been drained.
///
/// # Examples
///
/// ```
/// use promise_plus::{Promise, Scheduler, ThreadExecutor};
/// use futures::executor::block_on;
///
/// let scheduler = Scheduler::new(ThreadExecutor::new().unwrap());
/// let promise = Promise::<i32, String>::resolve(&scheduler, 20).map(|v| v + 1);
/// assert_eq!(block_on(promise), Ok(21));
/// ```
pub struct ThreadExecutor {
    name: String,
    tasks: Sender<Task>,
    timers: Sender<(Instant, Task)>,
}

impl ThreadExecutor {
    pub fn new() -> Result<Arc<Self>, Error> {
        Self::with_config(ThreadExecutorConfig::default())
    }

    pub fn with_config(config: ThreadExecutorConfig) -> Result<Arc<Self>, Error> {
        let (task_tx, task_rx) = unbounded::<Task>();
        let (timer_tx, timer_rx) = unbounded::<(Instant, Task)>();

        let worker_name = config.name.clone();
        thread::Builder::new()
            .name(config.name.clone())
            .spawn(move || run_worker(&worker_name, task_rx))
            .map_err(|e| Error::Spawn(e.to_string()))?;

        let timer_name = format!("{}-timer", config.name);
        let ready = task_tx.clone();
        thread::Builder::new()
            .name(timer_name.clone())
            .spawn(move || run_timers(&timer_name, timer_rx, ready))
            .map_err(|e| Error::Spawn(e.to_string()))?;

        log::debug!("{}: executor started", config.name);
        Ok(Arc::new(Self {
            name: config.name,
            tasks: task_tx,
            timers: timer_tx,
        }))
    }

    /// Like [`Executor::submit`], but reports a worker that is gone.
    pub fn try_submit(&self, task: Task) -> Result<(), Error> {
        self.tasks.send(task).map_err(|_| Error::ExecutorShutdown)
    }

    /// Like [`Executor::submit_after`], but reports a timer thread that is gone.
    pub fn try_submit_after(&self, task: Task, delay: Duration) -> Result<(), Error> {
        let when = Instant::now() + delay;
        self.timers
            .send((when, task))
            .map_err(|_| Error::ExecutorShutdown)
    }
}

impl Executor for ThreadExecutor {
    fn submit(&self, task: Task) {
        if let Err(e) = self.try_submit(task) {
            log::warn!("{}: dropping task: {e}", self.name);
        }
    }

    fn submit_after(&self, task: Task, delay: Duration) {
        if let Err(e) = self.try_submit_after(task, delay) {
            log::warn!("{}: dropping delayed task: {e}", self.name);
        }
    }
}

impl fmt::Debug for ThreadExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadExecutor")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

fn run_worker(name: &str, tasks: Receiver<Task>) {
    for task in tasks.iter() {
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(task)) {
            log::error!("{name}: {}", format_panic(&*payload));
        }
    }
    log::debug!("{name}: task channel closed, worker exiting");
}

fn run_timers(name: &str, commands: Receiver<(Instant, Task)>, ready: Sender<Task>) {
    // min-heap of (deadline, id); ids break ties in submission order
    let mut heap: BinaryHeap<Reverse<(Instant, u64)>> = BinaryHeap::new();
    let mut pending: HashMap<u64, Task> = HashMap::new();
    let mut next_id = 0u64;
    let mut connected = true;

    loop {
        let now = Instant::now();
        while let Some(Reverse((when, id))) = heap.peek().copied() {
            if when > now {
                break;
            }
            heap.pop();
            if let Some(task) = pending.remove(&id) {
                log::trace!("{name}: timer #{id} expired");
                if ready.send(task).is_err() {
                    log::warn!("{name}: worker is gone, dropping expired timer #{id}");
                }
            }
        }

        let command = match heap.peek() {
            Some(Reverse((when, _))) => {
                let wait = when.saturating_duration_since(Instant::now());
                if !connected {
                    // no new timers can arrive, just sleep until the next one is due
                    thread::sleep(wait);
                    continue;
                }
                commands.recv_timeout(wait)
            }
            None if connected => commands.recv().map_err(|_| RecvTimeoutError::Disconnected),
            None => break,
        };

        match command {
            Ok((when, task)) => {
                heap.push(Reverse((when, next_id)));
                pending.insert(next_id, task);
                next_id += 1;
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => connected = false,
        }
    }
    log::debug!("{name}: timer channel closed, timer thread exiting");
}

pub(crate) fn format_panic(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        return format!("task panicked: {msg}");
    }
    if let Some(msg) = payload.downcast_ref::<String>() {
        return format!("task panicked: {msg}");
    }
    "task panicked".to_string()
}
