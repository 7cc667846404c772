use futures::{executor::ThreadPool, future};
use once_cell::sync::Lazy;

use super::{Duration, Instant, RepeatingTask, Scheduler, TaskHandle};

static DEFAULT_POOL: Lazy<ThreadPool> =
  Lazy::new(|| ThreadPool::new().expect("failed to create the default thread pool"));

/// Runs repeating tasks on a `futures` thread pool.
///
/// Each tick sleeps towards an absolute deadline, so a slow tick does not push
/// back the ones after it. When the pool falls more than a whole interval
/// behind, the missed ticks are skipped instead of fired in a burst.
#[derive(Clone)]
pub struct ThreadPoolScheduler {
  pool: ThreadPool,
}

impl ThreadPoolScheduler {
  pub fn new(pool: ThreadPool) -> Self { ThreadPoolScheduler { pool } }
}

impl Default for ThreadPoolScheduler {
  /// Share a lazily created process-wide pool.
  fn default() -> Self { ThreadPoolScheduler { pool: DEFAULT_POOL.clone() } }
}

impl Scheduler for ThreadPoolScheduler {
  fn now(&self) -> Instant { Instant::now() }

  fn schedule_repeating(
    &self, interval: Duration, leeway: Duration, mut task: RepeatingTask,
  ) -> TaskHandle {
    let repeating = async move {
      let mut deadline = Instant::now() + interval;
      loop {
        let now = Instant::now();
        if deadline > now {
          futures_time::task::sleep((deadline - now).into()).await;
        }
        let fired = Instant::now();
        let late = fired.saturating_duration_since(deadline);
        if late > leeway {
          log::debug!("timer tick fired {late:?} late (leeway {leeway:?})");
        }
        if !task() {
          break;
        }
        deadline += interval;
        if deadline <= fired {
          deadline = fired + interval;
        }
      }
    };
    let (repeating, abort) = future::abortable(repeating);
    self.pool.spawn_ok(async move {
      let _ = repeating.await;
    });
    TaskHandle::with_abort(abort)
  }
}
