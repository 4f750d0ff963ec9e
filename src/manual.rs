//! A deterministic executor driven by hand, with a virtual clock.
//!
//! Nothing runs until the owner calls [`ManualExecutor::run_until_stalled`]
//! or [`ManualExecutor::advance`], which makes every deferral observable.
use crate::executor::{Executor, Task};
use std::cmp::Ordering;
use std::collections::{BinaryHeap, VecDeque};
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

struct Timer {
    deadline: Duration,
    seq: u64,
    task: Task,
}

impl PartialEq for Timer {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.seq == other.seq
    }
}

impl Eq for Timer {}

impl PartialOrd for Timer {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Timer {
    // reversed: BinaryHeap pops the earliest deadline first, ties by submission
    fn cmp(&self, other: &Self) -> Ordering {
        (other.deadline, other.seq).cmp(&(self.deadline, self.seq))
    }
}

#[derive(Default)]
struct Queues {
    ready: VecDeque<Task>,
    timers: BinaryHeap<Timer>,
    now: Duration,
    next_seq: u64,
}

/// Single-threaded, manually stepped [`Executor`].
///
/// Panics raised by tasks propagate out of the stepping call.
#[derive(Default)]
pub struct ManualExecutor {
    queues: Mutex<Queues>,
}

impl ManualExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Queues> {
        self.queues.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Virtual time elapsed through [`advance`](Self::advance).
    pub fn now(&self) -> Duration {
        self.lock().now
    }

    pub fn pending_tasks(&self) -> usize {
        self.lock().ready.len()
    }

    pub fn pending_timers(&self) -> usize {
        self.lock().timers.len()
    }

    /// Runs the oldest ready task, if any.
    pub fn run_next(&self) -> bool {
        let task = self.lock().ready.pop_front();
        match task {
            Some(task) => {
                task();
                true
            }
            None => false,
        }
    }

    /// Runs ready tasks, including the ones they submit, until none is left.
    /// Returns how many ran.
    pub fn run_until_stalled(&self) -> usize {
        let mut ran = 0;
        while self.run_next() {
            ran += 1;
        }
        ran
    }

    /// Moves the virtual clock forward by `by`, firing due timers in deadline
    /// order and draining the ready queue after each one. Returns how many
    /// tasks ran.
    pub fn advance(&self, by: Duration) -> usize {
        let mut ran = self.run_until_stalled();
        let target = self.now() + by;
        loop {
            {
                let mut queues = self.lock();
                let due = queues
                    .timers
                    .peek()
                    .is_some_and(|timer| timer.deadline <= target);
                if !due {
                    queues.now = target;
                    break;
                }
                if let Some(timer) = queues.timers.pop() {
                    log::trace!("timer #{} fired at {:?}", timer.seq, timer.deadline);
                    queues.now = queues.now.max(timer.deadline);
                    queues.ready.push_back(timer.task);
                }
            }
            ran += self.run_until_stalled();
        }
        ran
    }
}

impl Executor for ManualExecutor {
    fn submit(&self, task: Task) {
        self.lock().ready.push_back(task);
    }

    fn submit_after(&self, task: Task, delay: Duration) {
        let mut queues = self.lock();
        let timer = Timer {
            deadline: queues.now + delay,
            seq: queues.next_seq,
            task,
        };
        queues.next_seq += 1;
        log::trace!("timer #{} scheduled for {:?}", timer.seq, timer.deadline);
        queues.timers.push(timer);
    }
}

impl fmt::Debug for ManualExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let queues = self.lock();
        f.debug_struct("ManualExecutor")
            .field("now", &queues.now)
            .field("ready", &queues.ready.len())
            .field("timers", &queues.timers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn record(log: &Arc<Mutex<Vec<u32>>>, n: u32) -> Task {
        let log = log.clone();
        Box::new(move || log.lock().unwrap().push(n))
    }

    #[test]
    fn test_runs_in_submission_order() {
        let executor = ManualExecutor::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        for n in 0..4 {
            executor.submit(record(&log, n));
        }
        assert!(log.lock().unwrap().is_empty());
        assert_eq!(executor.run_until_stalled(), 4);
        assert_eq!(*log.lock().unwrap(), vec![0, 1, 2, 3]);
        assert!(!executor.run_next());
    }

    #[test]
    fn test_tasks_submitted_while_running_run_after() {
        let executor = Arc::new(ManualExecutor::new());
        let log = Arc::new(Mutex::new(Vec::new()));
        let nested = executor.clone();
        let inner_log = log.clone();
        executor.submit(Box::new(move || {
            inner_log.lock().unwrap().push(1);
            nested.submit(record(&inner_log, 3));
        }));
        executor.submit(record(&log, 2));
        assert_eq!(executor.run_until_stalled(), 3);
        assert_eq!(*log.lock().unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_timers_fire_by_deadline() {
        let executor = ManualExecutor::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        executor.submit_after(record(&log, 50), Duration::from_millis(50));
        executor.submit_after(record(&log, 10), Duration::from_millis(10));
        executor.submit_after(record(&log, 11), Duration::from_millis(10));

        assert_eq!(executor.run_until_stalled(), 0);
        assert_eq!(executor.advance(Duration::from_millis(9)), 0);
        assert_eq!(executor.now(), Duration::from_millis(9));

        assert_eq!(executor.advance(Duration::from_millis(1)), 2);
        assert_eq!(*log.lock().unwrap(), vec![10, 11]);
        assert_eq!(executor.pending_timers(), 1);

        executor.advance(Duration::from_secs(1));
        assert_eq!(*log.lock().unwrap(), vec![10, 11, 50]);
        assert_eq!(executor.now(), Duration::from_millis(1010));
    }

    #[test]
    fn test_timer_scheduled_by_timer_uses_virtual_now() {
        let executor = Arc::new(ManualExecutor::new());
        let log = Arc::new(Mutex::new(Vec::new()));
        let nested = executor.clone();
        let inner_log = log.clone();
        executor.submit_after(
            Box::new(move || {
                inner_log.lock().unwrap().push(1);
                nested.submit_after(record(&inner_log, 2), Duration::from_millis(5));
            }),
            Duration::from_millis(5),
        );
        executor.advance(Duration::from_millis(10));
        assert_eq!(*log.lock().unwrap(), vec![1, 2]);
    }
}
