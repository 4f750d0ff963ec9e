use futures::executor::block_on;
use promise_plus::{Promise, Resolution, Scheduler, Status, ThreadExecutor};
use std::sync::{Arc, Mutex};
use std::{thread, time::Duration};

// Initialize logger for this integration test binary so `RUST_LOG` is honored.
#[ctor::ctor]
fn __init_test_logger() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default()).is_test(true).try_init();
}

fn scheduler() -> Scheduler {
    Scheduler::new(ThreadExecutor::new().expect("failed to start executor"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolved_from_another_thread() {
        let scheduler = scheduler();
        let (resolver, promise) = Promise::<i32, String>::with_resolver(&scheduler);

        let producer = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            resolver.resolve(42);
        });

        assert_eq!(block_on(promise), Ok(42));
        producer.join().expect("The producer thread has panicked");
    }

    #[test]
    fn test_many_consumers_await_one_promise() {
        let scheduler = scheduler();
        let (resolver, promise) = Promise::<String, ()>::with_resolver(&scheduler);
        let consumers: Vec<_> = (0..3)
            .map(|_| {
                let promise = promise.clone();
                thread::spawn(move || block_on(promise))
            })
            .collect();
        resolver.resolve("🍓".into());
        for consumer in consumers {
            assert_eq!(consumer.join().expect("a consumer thread has panicked"), Ok("🍓".to_string()));
        }
    }

    #[test]
    fn test_identity_then_delivers_value() {
        let scheduler = scheduler();
        let promise = Promise::<&str, ()>::resolve(&scheduler, "v").and_then(|x| Ok(Resolution::Value(x)));
        assert_eq!(block_on(promise), Ok("v"));
    }

    #[test]
    fn test_flattening_through_chain() {
        let scheduler = scheduler();
        let inner_scheduler = scheduler.clone();
        let promise = Promise::<i32, String>::resolve(&scheduler, 0)
            .and_then(move |_| Ok(Resolution::Adopt(Promise::<i32, String>::resolve(&inner_scheduler, 5))));
        assert_eq!(block_on(promise), Ok(5));
    }

    #[test]
    fn test_error_tunnels_to_rejection_handler() {
        let scheduler = scheduler();
        let promise = Promise::<String, String>::resolve(&scheduler, "1".to_string())
            .and_then(|_| Err::<Resolution<String, String>, _>("e".to_string()))
            .then(|x| Ok(Resolution::Value(x)), |e| Ok(Resolution::Value(e)));
        assert_eq!(block_on(promise), Ok("e".to_string()));
    }

    #[test]
    fn test_registration_order_is_kept() {
        let scheduler = scheduler();
        let (resolver, promise) = Promise::<u32, ()>::with_resolver(&scheduler);
        let order = Arc::new(Mutex::new(Vec::new()));
        let tails: Vec<_> = (0..10)
            .map(|n| {
                let order = order.clone();
                promise.map(move |_| order.lock().unwrap().push(n))
            })
            .collect();
        resolver.resolve(0);
        block_on(Promise::<(), ()>::all(&scheduler, tails.into_iter().map(Resolution::Adopt))).unwrap();
        assert_eq!(*order.lock().unwrap(), (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn test_all_and_race() {
        let scheduler = scheduler();
        let two = Promise::<i32, String>::resolve(&scheduler, 2);
        let all = Promise::<i32, String>::all(&scheduler, [1.into(), Resolution::Adopt(two), 3.into()]);
        assert_eq!(block_on(all), Ok(vec![1, 2, 3]));

        let empty = Promise::<i32, String>::all(&scheduler, Vec::<i32>::new());
        assert_eq!(empty.status(), Status::Fulfilled);

        let failing = Promise::<i32, String>::all(
            &scheduler,
            [
                Resolution::Adopt(Promise::resolve(&scheduler, 1)),
                Resolution::Adopt(Promise::reject(&scheduler, "x".into())),
            ],
        );
        assert_eq!(block_on(failing), Err("x".to_string()));

        let race = Promise::<i32, String>::race(
            &scheduler,
            [
                Resolution::Adopt(Promise::resolve_delay(&scheduler, 1, Duration::from_millis(200))),
                Resolution::Adopt(Promise::resolve_delay(&scheduler, 2, Duration::from_millis(10))),
            ],
        );
        assert_eq!(block_on(race), Ok(2));
    }

    #[test]
    fn test_reject_delay_is_pending_until_elapsed() {
        let scheduler = scheduler();
        let promise = Promise::<(), &str>::reject_delay(&scheduler, "boom", Duration::from_millis(30));
        assert_eq!(promise.status(), Status::Pending);
        assert_eq!(block_on(promise.clone()), Err("boom"));
        assert_eq!(promise.outcome(), Some(Err("boom")));
    }

    #[test]
    fn test_panicking_handler_does_not_starve_siblings() {
        let scheduler = scheduler();
        let (resolver, promise) = Promise::<i32, String>::with_resolver(&scheduler);
        let broken = promise.map(|_: i32| -> i32 { panic!("handler bug") });
        let sibling = promise.map(|v| v + 1);
        resolver.resolve(1);
        assert_eq!(block_on(sibling), Ok(2));
        assert!(broken.is_pending());
    }

    #[test]
    fn test_panicking_handler_leaves_derived_pending() {
        let scheduler = scheduler();
        let broken = Promise::<i32, String>::resolve(&scheduler, 1).map(|_: i32| -> i32 { panic!("handler bug") });
        // the worker keeps serving later units of work
        let healthy = Promise::<i32, String>::resolve(&scheduler, 1).map(|v| v + 1);
        assert_eq!(block_on(healthy), Ok(2));
        assert!(broken.is_pending());
    }
}
