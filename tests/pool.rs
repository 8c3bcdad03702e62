mod util;

#[cfg(test)]
mod tests {
    use super::util::trace_init;

    use spindle::Scheduler;
    use spindle::pool::{PoolHandler, WorkerPool};
    use spindle::reactor::EventLoop;
    use spindle::task::{self, Step};

    use std::cell::RefCell;
    use std::rc::Rc;
    use std::sync::{Arc, Mutex};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_completion_join_from_task() {
        trace_init();

        let pool = WorkerPool::new(2);
        let mut scheduler = Scheduler::new();

        let total = scheduler
            .block_on(async move {
                let jobs: Vec<_> = (1..=4u64)
                    .map(|n| {
                        pool.spawn(move || {
                            thread::sleep(Duration::from_millis(10 * n));
                            n * n
                        })
                        .expect("Failed to spawn job")
                    })
                    .collect();

                let mut total = 0;
                for job in jobs {
                    total += job.join().await.expect("Failed to join job");
                }
                total
            })
            .expect("Failed to run scheduler");

        assert_eq!(total, 1 + 4 + 9 + 16);
    }

    #[test]
    fn test_panicking_job_is_reported() {
        let pool = WorkerPool::new(1);
        let mut scheduler = Scheduler::new();

        let result = scheduler
            .block_on(async move {
                let job = pool
                    .spawn(|| -> u32 { panic!("boom") })
                    .expect("Failed to spawn job");
                job.join().await
            })
            .expect("Failed to run scheduler");

        assert!(result.is_err());
    }

    #[test]
    fn test_completion_from_hand_written_task() {
        let pool = WorkerPool::new(1);
        let completion = pool.spawn(|| "done").expect("Failed to spawn job");

        let seen = Rc::new(RefCell::new(None));
        let out = seen.clone();
        let mut waiting = false;

        let mut scheduler = Scheduler::new();
        scheduler.submit(task::from_fn(move |_, value| {
            if !waiting {
                waiting = true;
                return Step::Wait(completion.wait());
            }

            value.into_read().expect("Failed to read signal");
            *out.borrow_mut() = completion.take();
            Step::Done
        }));

        scheduler.run().expect("Failed to run scheduler");

        let result = seen.borrow_mut().take().expect("job result missing");
        assert_eq!(result.expect("job panicked"), "done");
    }

    #[test]
    fn test_pool_handler_runs_callbacks_on_loop() {
        trace_init();

        let (handler, submitter) = PoolHandler::new(WorkerPool::new(2)).expect("Failed to create handler");
        let results = Arc::new(Mutex::new(Vec::new()));

        for n in 0..4 {
            let results = results.clone();
            submitter.run(
                move || n * 10,
                move |result, _changes| {
                    results.lock().unwrap().push(result.expect("job panicked"));
                },
            );
        }

        let mut event_loop = EventLoop::new();
        event_loop.add(handler);

        // Returns once every callback has run and the handler stops asking
        // for readiness.
        event_loop.run().expect("Failed to run event loop");

        let mut results = results.lock().unwrap().clone();
        results.sort();
        assert_eq!(results, [0, 10, 20, 30]);
    }

    #[test]
    fn test_idle_pool_handler_does_not_block_loop() {
        let (handler, _submitter) = PoolHandler::new(WorkerPool::new(1)).expect("Failed to create handler");

        let mut event_loop = EventLoop::new();
        let id = event_loop.add(handler);

        assert!(event_loop.turn().expect("Failed to turn").is_none());
        assert!(event_loop.contains(id));
    }
}
