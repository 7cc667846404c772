use futures::future;
use tokio::{
  runtime::{Handle, TryCurrentError},
  time::{self, MissedTickBehavior},
};

use super::{Duration, Instant, RepeatingTask, Scheduler, TaskHandle};

/// Runs repeating tasks on a tokio runtime.
#[derive(Clone, Debug)]
pub struct TokioScheduler {
  handle: Handle,
}

impl TokioScheduler {
  pub fn new(handle: Handle) -> Self { TokioScheduler { handle } }

  /// Use the runtime the caller is running on.
  pub fn current() -> Result<Self, TryCurrentError> { Handle::try_current().map(Self::new) }
}

impl Scheduler for TokioScheduler {
  fn now(&self) -> Instant { Instant::now() }

  fn schedule_repeating(
    &self, interval: Duration, leeway: Duration, mut task: RepeatingTask,
  ) -> TaskHandle {
    let repeating = async move {
      let start = time::Instant::now() + interval;
      let mut ticks = time::interval_at(start, interval);
      ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);
      loop {
        let deadline = ticks.tick().await;
        let late = time::Instant::now().saturating_duration_since(deadline);
        if late > leeway {
          log::debug!("timer tick fired {late:?} late (leeway {leeway:?})");
        }
        if !task() {
          break;
        }
      }
    };
    let (repeating, abort) = future::abortable(repeating);
    self.handle.spawn(repeating);
    TaskHandle::with_abort(abort)
  }
}
