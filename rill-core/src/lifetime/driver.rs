//! Tokio Timer Driver
//!
//! Maps the virtual clock of the [`timer`](super::timer) queue onto tokio
//! time so that debounce windows, delays and intervals elapse in real time.
//!
//! The queue is thread-local, so the driver must be awaited on the thread
//! that owns the cells: inside `block_on`, a current-thread runtime, or a
//! `LocalSet`.

use tokio::time::{sleep_until, Instant};

use super::timer;
use super::LifetimeToken;

/// Fire timers as their deadlines pass until the queue is idle or `stop` is
/// cancelled. Returns the number of callbacks run.
pub async fn drive(stop: &LifetimeToken) -> usize {
    let origin = Instant::now();
    let base = timer::now();
    let mut fired = 0;

    while !stop.is_cancelled() {
        let Some(deadline) = timer::next_deadline() else {
            break;
        };
        sleep_until(origin + deadline.saturating_sub(base)).await;
        fired += timer::advance_to(deadline);
    }

    tracing::trace!(fired, "timer driver stopped");
    fired
}
