use spindle::net::Stream;
use spindle::task;

use std::cell::Cell;
use std::rc::Rc;

#[spindle::test]
async fn macro_runs_async_body() {
    let (a, b) = Stream::pair().expect("Failed to create pair");

    a.write_all(b"ping").await.expect("Failed to write");
    assert_eq!(b.read(4).await.expect("Failed to read"), b"ping");
}

#[spindle::test(task_capacity = 8, queue_capacity = 8)]
async fn macro_accepts_builder_options() {
    let hits = Rc::new(Cell::new(0));

    for _ in 0..4 {
        let hits = hits.clone();
        task::spawn(async move {
            task::yield_now().await;
            hits.set(hits.get() + 1);
        });
    }

    let mut rounds = 0;
    while hits.get() < 4 {
        task::yield_now().await;
        rounds += 1;
    }

    assert_eq!(hits.get(), 4);
    assert_eq!(rounds, 3);
}

#[spindle::test]
#[should_panic(expected = "spindle test runtime failed")]
async fn macro_reports_runtime_errors() {
    std::future::pending::<()>().await;
}
