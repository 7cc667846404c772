//! Executors for time-based producers.
//!
//! A [`Scheduler`] knows the current time and can run a task repeatedly at a
//! fixed interval until the task asks to stop or its [`TaskHandle`] is
//! cancelled. Three implementations are provided:
//!
//! - [`ThreadPoolScheduler`]: a `futures` thread pool (features
//!   `futures-scheduler` and `timer`).
//! - [`TokioScheduler`]: a tokio runtime (feature `tokio-scheduler`).
//! - [`TestScheduler`]: virtual time for deterministic tests.

use std::sync::{
  atomic::{AtomicBool, Ordering},
  Arc,
};

use futures::future::AbortHandle;
pub use std::time::{Duration, Instant};

mod test_scheduler;
pub use test_scheduler::TestScheduler;

#[cfg(all(feature = "futures-scheduler", feature = "timer"))]
mod thread_pool_scheduler;
#[cfg(all(feature = "futures-scheduler", feature = "timer"))]
pub use thread_pool_scheduler::ThreadPoolScheduler;

#[cfg(feature = "tokio-scheduler")]
mod tokio_scheduler;
#[cfg(feature = "tokio-scheduler")]
pub use tokio_scheduler::TokioScheduler;

/// A task run on every tick. Returning `false` stops the repetition.
pub type RepeatingTask = Box<dyn FnMut() -> bool + Send>;

/// Orders repeating work in time.
pub trait Scheduler: Clone + Send + Sync + 'static {
  /// The scheduler's notion of the current time.
  fn now(&self) -> Instant;

  /// Run `task` every `interval`, starting one interval from now.
  ///
  /// `leeway` is how late a tick may fire before the scheduler considers it
  /// late. Schedulers are free to batch or coalesce ticks within it.
  fn schedule_repeating(&self, interval: Duration, leeway: Duration, task: RepeatingTask)
    -> TaskHandle;
}

/// Cancellation handle for scheduled work.
#[derive(Clone, Debug, Default)]
pub struct TaskHandle {
  cancelled: Arc<AtomicBool>,
  abort: Option<AbortHandle>,
}

impl TaskHandle {
  pub fn new() -> Self { Self::default() }

  /// A handle that also aborts the spawned future driving the task.
  pub fn with_abort(abort: AbortHandle) -> Self {
    TaskHandle { cancelled: Arc::new(AtomicBool::new(false)), abort: Some(abort) }
  }

  /// Stop the task. Calling this more than once has no further effect.
  pub fn cancel(&self) {
    if !self.cancelled.swap(true, Ordering::AcqRel) {
      if let Some(abort) = &self.abort {
        abort.abort();
      }
    }
  }

  pub fn is_cancelled(&self) -> bool { self.cancelled.load(Ordering::Acquire) }
}
