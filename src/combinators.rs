//! Promise factories and combinators built on the public engine.
use crate::executor::Scheduler;
use crate::promise::{Promise, Resolution};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

struct Collected<T> {
    values: Vec<Option<T>>,
    remaining: usize,
}

impl<T, E> Promise<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    /// A promise fulfilled with a plain value, or one that adopts the outcome
    /// of a [`Resolution::Adopt`] promise.
    pub fn resolve(scheduler: &Scheduler, value: impl Into<Resolution<T, E>>) -> Self {
        let resolution = value.into();
        Promise::new(scheduler, move |resolver| {
            resolver.resolve_from(resolution);
            Ok(())
        })
    }

    /// A promise rejected with `reason`.
    pub fn reject(scheduler: &Scheduler, reason: E) -> Self {
        Promise::new(scheduler, move |resolver| {
            resolver.reject(reason);
            Ok(())
        })
    }

    /// Fulfills with every input's value, positionally, once all inputs have
    /// fulfilled; rejects with the first rejection to happen.
    ///
    /// An empty input fulfills immediately with an empty vector. Inputs that
    /// are still pending once the outcome is decided keep running.
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
    /// let two = Promise::<i32, String>::resolve(&scheduler, 2);
    /// let all = Promise::<i32, String>::all(&scheduler, [1.into(), Resolution::Adopt(two), 3.into()]);
    ///
    /// executor.run_until_stalled();
    /// assert_eq!(all.outcome(), Some(Ok(vec![1, 2, 3])));
    /// ```
    pub fn all<I>(scheduler: &Scheduler, inputs: I) -> Promise<Vec<T>, E>
    where
        I: IntoIterator,
        I::Item: Into<Resolution<T, E>>,
    {
        let inputs: Vec<Promise<T, E>> = inputs
            .into_iter()
            .map(|input| Promise::resolve(scheduler, input))
            .collect();
        Promise::new(scheduler, move |resolver| {
            if inputs.is_empty() {
                resolver.resolve(Vec::new());
                return Ok(());
            }
            log::trace!("waiting on {} promise(s)", inputs.len());
            let collected = Arc::new(Mutex::new(Collected {
                values: (0..inputs.len()).map(|_| None).collect(),
                remaining: inputs.len(),
            }));
            for (index, input) in inputs.into_iter().enumerate() {
                let resolver = resolver.clone();
                let collected = collected.clone();
                input.subscribe(move |outcome| match outcome {
                    Ok(value) => {
                        let finished = {
                            let mut collected = collected.lock().unwrap_or_else(PoisonError::into_inner);
                            collected.values[index] = Some(value);
                            collected.remaining -= 1;
                            if collected.remaining == 0 {
                                Some(collected.values.iter_mut().filter_map(Option::take).collect::<Vec<T>>())
                            } else {
                                None
                            }
                        };
                        if let Some(values) = finished {
                            resolver.resolve(values);
                        }
                    }
                    Err(reason) => resolver.reject(reason),
                });
            }
            Ok(())
        })
    }

    /// Settles like whichever input settles first. Later settlements of the
    /// other inputs are ignored. An empty input never settles.
    pub fn race<I>(scheduler: &Scheduler, inputs: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Resolution<T, E>>,
    {
        let inputs: Vec<Promise<T, E>> = inputs
            .into_iter()
            .map(|input| Promise::resolve(scheduler, input))
            .collect();
        Promise::new(scheduler, move |resolver| {
            for input in inputs {
                let resolver = resolver.clone();
                input.subscribe(move |outcome| resolver.settle(outcome));
            }
            Ok(())
        })
    }

    /// Like [`resolve`](Self::resolve), but only once `delay` has elapsed.
    /// An adopted promise is subscribed to after the delay.
    pub fn resolve_delay(scheduler: &Scheduler, value: impl Into<Resolution<T, E>>, delay: Duration) -> Self {
        let resolution = value.into();
        let timer = scheduler.clone();
        Promise::new(scheduler, move |resolver| {
            timer.submit_after(move || resolver.resolve_from(resolution), delay);
            Ok(())
        })
    }

    /// A promise rejected with `reason` once `delay` has elapsed.
    pub fn reject_delay(scheduler: &Scheduler, reason: E, delay: Duration) -> Self {
        let timer = scheduler.clone();
        Promise::new(scheduler, move |resolver| {
            timer.submit_after(move || resolver.reject(reason), delay);
            Ok(())
        })
    }
}
