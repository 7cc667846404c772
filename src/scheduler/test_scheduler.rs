//! Virtual-time scheduler for deterministic tests.
//!
//! Time only moves when [`TestScheduler::advance_by`] is called, and due tasks
//! run synchronously on the calling thread, ordered by due time and then by
//! the order they were scheduled in.
//!
//! ```rust
//! use std::sync::{
//!   atomic::{AtomicUsize, Ordering},
//!   Arc,
//! };
//!
//! use rxdemand::prelude::*;
//!
//! let scheduler = TestScheduler::new();
//! let ticks = Arc::new(AtomicUsize::new(0));
//! let c_ticks = ticks.clone();
//! scheduler.schedule_repeating(
//!   Duration::from_millis(10),
//!   Duration::ZERO,
//!   Box::new(move || c_ticks.fetch_add(1, Ordering::SeqCst) < 2),
//! );
//!
//! scheduler.advance_by(Duration::from_millis(100));
//! assert_eq!(ticks.load(Ordering::SeqCst), 3);
//! assert_eq!(scheduler.pending_count(), 0);
//! ```

use std::{cmp::Ordering, collections::BinaryHeap, sync::Arc};

use parking_lot::Mutex;

use super::{Duration, Instant, RepeatingTask, Scheduler, TaskHandle};

// ==================== Internal State ====================

struct TestSchedulerState {
  origin: Instant,
  virtual_time: Duration,
  task_queue: BinaryHeap<ScheduledTask>,
  next_task_id: usize,
}

struct ScheduledTask {
  scheduled_time: Duration,
  task_id: usize,
  interval: Duration,
  task: RepeatingTask,
  handle: TaskHandle,
}

impl PartialEq for ScheduledTask {
  fn eq(&self, other: &Self) -> bool {
    self.scheduled_time == other.scheduled_time && self.task_id == other.task_id
  }
}

impl Eq for ScheduledTask {}

impl PartialOrd for ScheduledTask {
  fn partial_cmp(&self, other: &Self) -> Option<Ordering> { Some(self.cmp(other)) }
}

impl Ord for ScheduledTask {
  fn cmp(&self, other: &Self) -> Ordering {
    // Min-heap: earlier times first, then FIFO by task_id
    other
      .scheduled_time
      .cmp(&self.scheduled_time)
      .then_with(|| other.task_id.cmp(&self.task_id))
  }
}

// ==================== TestScheduler ====================

/// A virtual time scheduler. Clones share the same clock and task queue.
#[derive(Clone)]
pub struct TestScheduler {
  state: Arc<Mutex<TestSchedulerState>>,
}

impl Default for TestScheduler {
  fn default() -> Self { Self::new() }
}

impl TestScheduler {
  /// A scheduler whose virtual clock starts at the current wall-clock time.
  pub fn new() -> Self { Self::starting_at(Instant::now()) }

  pub fn starting_at(origin: Instant) -> Self {
    TestScheduler {
      state: Arc::new(Mutex::new(TestSchedulerState {
        origin,
        virtual_time: Duration::ZERO,
        task_queue: BinaryHeap::new(),
        next_task_id: 0,
      })),
    }
  }

  /// Virtual time elapsed since the scheduler was created.
  pub fn elapsed(&self) -> Duration { self.state.lock().virtual_time }

  /// Number of tasks that are still scheduled and not cancelled.
  pub fn pending_count(&self) -> usize {
    let state = self.state.lock();
    state.task_queue.iter().filter(|t| !t.handle.is_cancelled()).count()
  }

  /// Advance virtual time by `duration`, running every task that falls due.
  ///
  /// A repeating task fires once per elapsed interval, each time with the
  /// clock set to that tick's due time.
  pub fn advance_by(&self, duration: Duration) {
    let target_time = self.state.lock().virtual_time + duration;

    loop {
      let next = {
        let mut state = self.state.lock();
        let due = state.task_queue.peek().is_some_and(|t| t.scheduled_time <= target_time);
        if !due {
          break;
        }
        state.task_queue.pop().map(|task| {
          state.virtual_time = task.scheduled_time;
          task
        })
      };
      let Some(mut scheduled) = next else { break };
      if scheduled.handle.is_cancelled() {
        continue;
      }

      // the lock is released while the task runs
      let again = (scheduled.task)();

      if again && !scheduled.handle.is_cancelled() {
        let mut state = self.state.lock();
        scheduled.scheduled_time += scheduled.interval;
        scheduled.task_id = state.next_task_id;
        state.next_task_id += 1;
        state.task_queue.push(scheduled);
      }
    }

    self.state.lock().virtual_time = target_time;
  }
}

impl Scheduler for TestScheduler {
  fn now(&self) -> Instant {
    let state = self.state.lock();
    state.origin + state.virtual_time
  }

  fn schedule_repeating(
    &self, interval: Duration, _leeway: Duration, task: RepeatingTask,
  ) -> TaskHandle {
    let handle = TaskHandle::new();
    let mut state = self.state.lock();
    let task_id = state.next_task_id;
    state.next_task_id += 1;
    let scheduled_time = state.virtual_time + interval;
    state.task_queue.push(ScheduledTask {
      scheduled_time,
      task_id,
      interval,
      task,
      handle: handle.clone(),
    });
    handle
  }
}
