mod util;

#[cfg(test)]
mod tests {
    use super::util::trace_init;

    use proptest::prelude::*;
    use spindle::net::{Socket, Stream};
    use spindle::task::{self, Step};
    use spindle::{Builder, Direction, Error, Intent, Scheduler};

    use std::cell::{Cell, RefCell};
    use std::rc::Rc;
    use std::thread;
    use std::time::Duration;

    /// Hand-written task that records its label every time it runs and
    /// yields `rounds` times before finishing.
    fn ticker(label: char, rounds: usize, log: Rc<RefCell<Vec<char>>>) -> impl task::Task {
        let mut left = rounds;
        task::from_fn(move |_, _| {
            log.borrow_mut().push(label);
            if left == 0 {
                return Step::Done;
            }
            left -= 1;
            Step::Yield
        })
    }

    #[test]
    fn test_yielding_tasks_interleave_fifo() {
        trace_init();

        let log = Rc::new(RefCell::new(Vec::new()));
        let mut scheduler = Scheduler::new();

        for label in ['a', 'b', 'c'] {
            scheduler.submit(ticker(label, 2, log.clone()));
        }

        let stats = scheduler.run().expect("Failed to run scheduler");

        assert_eq!(
            log.borrow().iter().collect::<String>(),
            "abcabcabc",
            "tasks should be resumed round-robin"
        );
        assert_eq!(stats.completed, 3);
        assert_eq!(stats.polls, 0, "pure yielders never need the poller");
    }

    #[test]
    fn test_countdown_and_countup_interleave() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut scheduler = Scheduler::new();

        let down = log.clone();
        scheduler.spawn(async move {
            for n in (1..=3).rev() {
                down.borrow_mut().push(format!("T-minus {n}"));
                task::yield_now().await;
            }
        });

        let up = log.clone();
        scheduler.spawn(async move {
            for n in 0..3 {
                up.borrow_mut().push(format!("Counting up {n}"));
                task::yield_now().await;
            }
        });

        scheduler.run().expect("Failed to run scheduler");

        assert_eq!(
            *log.borrow(),
            [
                "T-minus 3",
                "Counting up 0",
                "T-minus 2",
                "Counting up 1",
                "T-minus 1",
                "Counting up 2",
            ]
        );
    }

    #[test]
    fn test_task_waiting_on_data_written_later() {
        trace_init();

        let (reader, writer) = Stream::pair().expect("Failed to create pair");
        let received = Rc::new(RefCell::new(Vec::new()));
        let mut scheduler = Scheduler::new();

        let out = received.clone();
        scheduler.spawn(async move {
            let data = reader.read(16).await.expect("Failed to read");
            out.borrow_mut().extend(data);
        });

        scheduler.spawn(async move {
            task::yield_now().await;
            writer.write_all(b"late").await.expect("Failed to write");
        });

        let stats = scheduler.run().expect("Failed to run scheduler");

        assert_eq!(*received.borrow(), b"late");
        assert!(stats.polls >= 1);
        assert_eq!(stats.resumed, stats.yielded + stats.completed);
    }

    #[test]
    fn test_duplicate_registration_is_fatal() {
        let (a, _b) = Socket::pair().expect("Failed to create pair");
        let fd = a.fd();
        let mut scheduler = Scheduler::new();

        for _ in 0..2 {
            scheduler.submit(task::from_fn(move |_, _| {
                Step::Wait(Intent::Read { fd, max: 1 })
            }));
        }

        let err = scheduler.run().expect_err("second waiter should be rejected");

        assert!(
            matches!(err, Error::AlreadyRegistered { fd: f, direction: Direction::Read } if f == fd)
        );
        assert!(err.is_contract_violation());
    }

    #[test]
    fn test_read_and_write_waiters_coexist_on_one_descriptor() {
        let (a, b) = Socket::pair().expect("Failed to create pair");
        let fd = a.fd();
        let mut scheduler = Scheduler::new();

        // The write resolves right away, the read only once `b` answers.
        let mut sent = false;
        scheduler.submit(task::from_fn(move |_, value| {
            if sent {
                assert_eq!(value.into_wrote().expect("Failed to write"), 2);
                return Step::Done;
            }
            sent = true;
            Step::Wait(Intent::Write {
                fd,
                data: b"hi".to_vec(),
            })
        }));

        let mut reading = false;
        scheduler.submit(task::from_fn(move |_, value| {
            if reading {
                assert_eq!(value.into_read().expect("Failed to read"), b"yo");
                return Step::Done;
            }
            reading = true;
            Step::Wait(Intent::Read { fd, max: 8 })
        }));

        let mut echoed = false;
        scheduler.submit(task::from_fn(move |_, value| {
            if echoed {
                value.into_wrote().expect("Failed to answer");
                return Step::Done;
            }
            echoed = true;
            Step::Wait(b.send(&b"yo"[..]))
        }));

        let stats = scheduler.run().expect("Failed to run scheduler");
        assert_eq!(stats.completed, 3);
        drop(a);
    }

    #[test]
    fn test_stalled_future_is_fatal() {
        let mut scheduler = Scheduler::new();
        scheduler.spawn(std::future::pending::<()>());

        let err = scheduler.run().expect_err("pending future should be rejected");
        assert!(matches!(err, Error::UnrecognizedYield { .. }));
    }

    #[test]
    fn test_cancel_drops_waiter_and_closes_socket() {
        trace_init();

        let (a, b) = Socket::pair().expect("Failed to create pair");
        let fd = a.fd();
        let mut scheduler = Scheduler::new();

        let resumed = Rc::new(Cell::new(false));
        let flag = resumed.clone();
        scheduler.spawn(async move {
            let stream = Stream::from_socket(a);
            let _ = stream.read(1).await;
            flag.set(true);
        });

        scheduler.submit(task::from_fn(move |cx, _| {
            cx.cancel(fd);
            cx.cancel(fd);
            Step::Done
        }));

        let stats = scheduler.run().expect("Failed to run scheduler");

        assert!(!resumed.get(), "a cancelled waiter is never resumed");
        assert_eq!(stats.cancelled, 1);
        assert_eq!(stats.completed, 1);
        assert!(!scheduler.is_waiting(fd, Direction::Read));
        assert_eq!(scheduler.cancel(fd), 0, "cancel is idempotent");

        let mut buf = [0u8; 1];
        assert_eq!(
            b.try_read(&mut buf).expect("Failed to read peer"),
            0,
            "dropping the task closes its socket"
        );
    }

    #[test]
    fn test_abort_skips_queued_resumption() {
        let mut scheduler = Scheduler::new();
        let ran = Rc::new(Cell::new(false));

        let flag = ran.clone();
        let victim = scheduler.submit(task::from_fn(move |_, _| {
            flag.set(true);
            Step::Done
        }));
        scheduler.submit(task::from_fn(|_, _| Step::Done));

        assert!(scheduler.abort(victim));
        assert_eq!(scheduler.ready_len(), 2);

        let stats = scheduler.run().expect("Failed to run scheduler");

        assert!(!ran.get());
        assert_eq!(stats.stale, 1);
        assert_eq!(stats.completed, 1);
    }

    #[test]
    fn test_spawn_from_task() {
        let counter = Rc::new(Cell::new(0));
        let mut scheduler = Scheduler::new();

        let outer = counter.clone();
        scheduler.spawn(async move {
            for _ in 0..3 {
                let inner = outer.clone();
                task::spawn(async move {
                    inner.set(inner.get() + 1);
                });
            }
        });

        let stats = scheduler.run().expect("Failed to run scheduler");

        assert_eq!(counter.get(), 3);
        assert_eq!(stats.spawned, 3);
        assert_eq!(stats.completed, 4);
    }

    #[test]
    fn test_task_id_is_visible_inside_task() {
        let seen = Rc::new(Cell::new(None));
        let mut scheduler = Scheduler::new();

        let out = seen.clone();
        let id = scheduler.spawn(async move {
            out.set(Some(task::id()));
        });

        scheduler.run().expect("Failed to run scheduler");
        assert_eq!(seen.get(), Some(id));
    }

    #[test]
    fn test_block_on_returns_output() {
        let mut scheduler = Builder::new().task_capacity(4).build();

        let value = scheduler
            .block_on(async {
                let (a, b) = Stream::pair().expect("Failed to create pair");
                a.write_all(b"21").await.expect("Failed to write");
                let digits = b.read(2).await.expect("Failed to read");
                String::from_utf8(digits).expect("Failed to decode").parse::<u32>().unwrap() * 2
            })
            .expect("Failed to block on future");

        assert_eq!(value, 42);
    }

    #[test]
    fn test_block_on_reports_cancellation() {
        let mut scheduler = Scheduler::new();

        let result = scheduler.block_on(async {
            task::abort(task::id());
            task::yield_now().await;
            1
        });

        assert!(matches!(result, Err(Error::Cancelled)));
    }

    #[test]
    fn test_remote_injection_wakes_poll() {
        trace_init();

        let mut scheduler = Scheduler::new();
        let remote = scheduler.remote().expect("Failed to create remote");
        let (read, write) = Socket::pipe().expect("Failed to create pipe");

        let received = Rc::new(RefCell::new(Vec::new()));
        let out = received.clone();
        scheduler.spawn(async move {
            let stream = Stream::from_socket(read);
            let data = stream.read(8).await.expect("Failed to read");
            out.borrow_mut().extend(data);
        });

        let producer = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            remote.spawn(task::from_fn(move |_, _| {
                write.try_write(b"remote").expect("Failed to write pipe");
                Step::Done
            }));
        });

        let stats = scheduler.run().expect("Failed to run scheduler");
        producer.join().expect("Failed to join producer");

        assert_eq!(*received.borrow(), b"remote");
        assert_eq!(stats.spawned, 1);
        assert_eq!(stats.completed, 2);
    }

    #[test]
    fn test_waiter_runs_after_runnable_tasks() {
        let (readied, signal) = Socket::pair().expect("Failed to create pair");
        let fd = readied.fd();
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut scheduler = Scheduler::new();

        let mut rounds = 0;
        let a = log.clone();
        scheduler.submit(task::from_fn(move |_, _| {
            a.borrow_mut().push("A");
            rounds += 1;
            if rounds == 2 { Step::Done } else { Step::Yield }
        }));

        let mut rounds = 0;
        let b = log.clone();
        scheduler.submit(task::from_fn(move |_, _| {
            b.borrow_mut().push("B");
            rounds += 1;
            if rounds == 1 {
                signal.try_write(b"!").expect("Failed to signal");
                return Step::Yield;
            }
            Step::Done
        }));

        let mut started = false;
        let c = log.clone();
        scheduler.submit(task::from_fn(move |_, value| {
            if !started {
                started = true;
                c.borrow_mut().push("C start");
                return Step::Wait(Intent::Read { fd, max: 1 });
            }
            assert_eq!(value.into_read().expect("Failed to read"), b"!");
            c.borrow_mut().push("C");
            Step::Done
        }));

        let stats = scheduler.run().expect("Failed to run scheduler");

        assert_eq!(*log.borrow(), ["A", "B", "C start", "A", "B", "C"]);
        assert_eq!(stats.polls, 1, "the poller runs only once the queue drains");
        drop(readied);
    }

    #[test]
    fn test_cancel_after_resolution_in_same_poll_is_a_no_op() {
        trace_init();

        let first = Socket::pair().expect("Failed to create pair");
        let second = Socket::pair().expect("Failed to create pair");

        // The readable with the lower number is fired first, so the
        // cancelling task is resumed before the reader it cancels.
        let ((early, early_peer), (late, late_peer)) = if first.0.fd() < second.0.fd() {
            (first, second)
        } else {
            (second, first)
        };
        let fd = late.fd();
        let trigger = early.fd();

        let resumptions = Rc::new(Cell::new(0));
        let received = Rc::new(RefCell::new(Vec::new()));
        let mut scheduler = Scheduler::new();

        let (count, out) = (resumptions.clone(), received.clone());
        let mut waiting = false;
        scheduler.submit(task::from_fn(move |_, value| {
            if !waiting {
                waiting = true;
                return Step::Wait(Intent::Read { fd, max: 8 });
            }
            count.set(count.get() + 1);
            out.borrow_mut().extend(value.into_read().expect("Failed to read"));
            Step::Done
        }));

        let mut waiting = false;
        scheduler.submit(task::from_fn(move |cx, value| {
            if !waiting {
                waiting = true;
                return Step::Wait(Intent::Read { fd: trigger, max: 8 });
            }
            value.into_read().expect("Failed to read trigger");
            cx.cancel(fd);
            Step::Done
        }));

        // Both descriptors are readable by the first poll.
        scheduler.submit(task::from_fn(move |_, _| {
            late_peer.try_write(b"data").expect("Failed to write");
            early_peer.try_write(b"go").expect("Failed to write");
            Step::Done
        }));

        let stats = scheduler.run().expect("Failed to run scheduler");

        assert_eq!(resumptions.get(), 1, "the resolved read is delivered once");
        assert_eq!(*received.borrow(), b"data");
        assert_eq!(stats.cancelled, 0);
        assert_eq!(stats.polls, 1);
        drop((early, late));
    }

    #[test]
    fn test_named_actors_exchange_messages() {
        trace_init();

        let printed = Rc::new(RefCell::new(Vec::new()));
        let mut scheduler = Scheduler::new();

        let out = printed.clone();
        scheduler.spawn_named("printer", async move {
            while let Some(n) = task::receive::<u32>().await {
                out.borrow_mut().push(format!("Got: {n}"));
            }
        });

        scheduler.spawn_named("counter", async {
            while let Some(n) = task::receive::<u32>().await {
                if n == 0 {
                    break;
                }
                task::send("printer", n);
                task::send("counter", n - 1);
            }
        });

        assert!(scheduler.send("counter", 3u32));
        let stats = scheduler.run().expect("Failed to run scheduler");

        assert_eq!(*printed.borrow(), ["Got: 3", "Got: 2", "Got: 1"]);
        assert_eq!(stats.messages, 6);
        assert_eq!(stats.completed, 1, "the counter stops at zero");
        assert_eq!(scheduler.live(), 1, "the printer stays parked on its mailbox");

        assert!(!scheduler.send("counter", 1u32));
        assert!(scheduler.send("printer", 9u32));
        scheduler.run().expect("Failed to run scheduler");
        assert_eq!(printed.borrow().last().map(String::as_str), Some("Got: 9"));
    }

    #[test]
    fn test_message_sent_from_hand_written_task_by_id() {
        let mut scheduler = Scheduler::new();
        let seen = Rc::new(Cell::new(None));

        let out = seen.clone();
        let mut started = false;
        let sink = scheduler.submit(task::from_fn(move |_, value| {
            if !started {
                started = true;
                return Step::Receive;
            }
            out.set(value.into_message::<&'static str>());
            Step::Done
        }));

        scheduler.submit(task::from_fn(move |cx, _| {
            cx.send(sink, "hello");
            Step::Done
        }));

        let stats = scheduler.run().expect("Failed to run scheduler");

        assert_eq!(seen.get(), Some("hello"));
        assert_eq!(stats.completed, 2);
        assert_eq!(scheduler.live(), 0);
    }

    fn run_yielders(rounds: &[usize]) -> spindle::Stats {
        let mut scheduler = Scheduler::new();
        let log = Rc::new(RefCell::new(Vec::new()));

        for &n in rounds {
            scheduler.submit(ticker('x', n, log.clone()));
        }

        scheduler.run().expect("Failed to run scheduler")
    }

    proptest! {
        #[test]
        fn resumptions_end_in_yield_or_completion(rounds in prop::collection::vec(0usize..6, 0..8)) {
            let stats = run_yielders(&rounds);

            prop_assert_eq!(stats.resumed, stats.yielded + stats.completed);
            prop_assert_eq!(stats.completed, rounds.len());
            prop_assert_eq!(stats.yielded, rounds.iter().sum::<usize>());
        }
    }
}
