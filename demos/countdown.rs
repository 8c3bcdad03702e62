//! Two tasks counting in opposite directions on one thread, one written as
//! a hand-rolled state machine and one as an `async` block. Then two named
//! tasks counting by sending each other messages.

use spindle::task::{self, Context, Step, Task};
use spindle::{Resume, Scheduler};

struct Countdown {
    n: u32,
}

impl Task for Countdown {
    fn resume(&mut self, _cx: &mut Context<'_>, _value: Resume) -> Step {
        if self.n == 0 {
            return Step::Done;
        }

        println!("T-minus {}", self.n);
        self.n -= 1;
        Step::Yield
    }
}

async fn countup(stop: u32) {
    for n in 0..stop {
        println!("Counting up {n}");
        task::yield_now().await;
    }
}

async fn printer() {
    while let Some(n) = task::receive::<u32>().await {
        println!("Got: {n}");
    }
}

async fn counter() {
    while let Some(n) = task::receive::<u32>().await {
        if n == 0 {
            break;
        }
        task::send("printer", n);
        task::send("counter", n - 1);
    }
}

fn main() -> spindle::Result<()> {
    tracing_subscriber::fmt::init();

    let mut scheduler = Scheduler::new();
    scheduler.submit(Countdown { n: 10 });
    scheduler.spawn(countup(15));

    let stats = scheduler.run()?;
    println!(
        "{} resumptions, {} tasks completed",
        stats.resumed, stats.completed
    );

    scheduler.spawn_named("printer", printer());
    scheduler.spawn_named("counter", counter());
    scheduler.send("counter", 5u32);

    let stats = scheduler.run()?;
    println!("{} messages delivered", stats.messages);

    Ok(())
}
