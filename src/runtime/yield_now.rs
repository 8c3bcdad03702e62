use crate::runtime::context::Request;
use crate::runtime::task::Suspend;

/// Yields execution back to the scheduler.
///
/// The task goes to the back of the ready queue, so every task that was
/// already runnable gets to run before it continues. The function yields
/// exactly once.
///
/// # Examples
///
/// ```rust,ignore
/// async fn countdown(mut n: u32) {
///     while n > 0 {
///         println!("T-minus {n}");
///         n -= 1;
///         yield_now().await;
///     }
/// }
/// ```
pub async fn yield_now() {
    Suspend::new(Request::Yield).await;
}
