//! A publisher that emits the current time at a fixed interval.
//!
//! The timer starts ticking on the first non-zero request. Each tick that
//! finds outstanding demand delivers the scheduler's current time and spends
//! one unit of demand and one unit of the emission budget. A tick that finds
//! no demand is skipped and costs nothing. When the budget runs out the
//! subscriber receives `Finished` and the timer stops.
//!
//! ```rust
//! use std::sync::{Arc, Mutex};
//!
//! use rxdemand::prelude::*;
//!
//! let scheduler = TestScheduler::new();
//! let timer = TimerConfig::new(scheduler.clone(), Duration::from_secs(1))
//!   .max_count(3)
//!   .build()
//!   .unwrap();
//!
//! let ticks = Arc::new(Mutex::new(0));
//! let c_ticks = ticks.clone();
//! timer.sink(move |_| *c_ticks.lock().unwrap() += 1, |_| {});
//!
//! scheduler.advance_by(Duration::from_secs(10));
//! assert_eq!(*ticks.lock().unwrap(), 3);
//! ```

use std::{
  convert::Infallible,
  sync::{Arc, Weak},
};

use parking_lot::Mutex;

use crate::{
  completion::Completion,
  demand::Demand,
  error::Error,
  publisher::Publisher,
  scheduler::{Duration, Instant, Scheduler, TaskHandle},
  subscriber::{BoxedSubscriber, Subscriber},
  subscription::{Link, LinkStatus, Subscription},
};

/// Builder for a [`Timer`].
#[derive(Clone, Debug)]
pub struct TimerConfig<S> {
  scheduler: S,
  interval: Duration,
  leeway: Duration,
  max_count: Option<usize>,
}

impl<S: Scheduler> TimerConfig<S> {
  /// Tick every `interval` on `scheduler`, with no leeway and no budget.
  pub fn new(scheduler: S, interval: Duration) -> Self {
    TimerConfig { scheduler, interval, leeway: Duration::ZERO, max_count: None }
  }

  /// How late a tick may fire before it is reported as late.
  pub fn leeway(mut self, leeway: Duration) -> Self {
    self.leeway = leeway;
    self
  }

  /// Finish after `count` emissions.
  pub fn max_count(mut self, count: usize) -> Self {
    self.max_count = Some(count);
    self
  }

  pub fn build(self) -> Result<Timer<S>, Error> {
    if self.interval.is_zero() {
      return Err(Error::InvalidInterval(self.interval));
    }
    Ok(Timer { config: self })
  }
}

#[derive(Clone, Debug)]
pub struct Timer<S> {
  config: TimerConfig<S>,
}

impl<S> Timer<S> {
  pub fn interval(&self) -> Duration { self.config.interval }

  pub fn max_count(&self) -> Option<usize> { self.config.max_count }
}

impl<S: Scheduler> Publisher for Timer<S> {
  type Item = Instant;
  type Err = Infallible;

  fn subscribe<O>(&self, subscriber: O) -> Link
  where
    O: Subscriber<Instant, Infallible> + Send + 'static,
  {
    let link = Arc::new_cyclic(|this| TimerLink {
      this: this.clone(),
      config: self.config.clone(),
      state: Mutex::new(TimerState {
        status: LinkStatus::Active,
        demand: Demand::NONE,
        remaining: self.config.max_count,
        started: false,
        task: None,
        subscriber: None,
      }),
    });
    link.attach(Box::new(subscriber))
  }
}

// ============================================================================
// TimerLink
// ============================================================================

struct TimerLink<S> {
  this: Weak<TimerLink<S>>,
  config: TimerConfig<S>,
  state: Mutex<TimerState>,
}

struct TimerState {
  status: LinkStatus,
  demand: Demand,
  remaining: Option<usize>,
  started: bool,
  task: Option<TaskHandle>,
  subscriber: Option<BoxedSubscriber<Instant, Infallible>>,
}

impl<S: Scheduler> TimerLink<S> {
  fn attach(self: &Arc<Self>, mut subscriber: BoxedSubscriber<Instant, Infallible>) -> Link {
    let link = Link::from_arc(self.clone());
    subscriber.on_subscribe(&link);
    {
      let mut state = self.state.lock();
      if state.status.is_terminal() {
        return link;
      }
      if state.remaining != Some(0) {
        state.subscriber = Some(subscriber);
        return link;
      }
      state.status = LinkStatus::Completed;
    }
    log::debug!("timer with an empty budget completes at subscribe");
    subscriber.receive_completion(Completion::Finished);
    link
  }

  fn start(&self) {
    let Some(this) = self.this.upgrade() else { return };
    let task = self.config.scheduler.schedule_repeating(
      self.config.interval,
      self.config.leeway,
      Box::new(move || this.tick()),
    );
    let mut state = self.state.lock();
    if state.status.is_terminal() {
      task.cancel();
    } else {
      state.task = Some(task);
    }
  }

  /// One scheduler tick. Returns `false` once the timer is done.
  fn tick(&self) -> bool {
    let mut subscriber = {
      let mut state = self.state.lock();
      if state.status.is_terminal() {
        return false;
      }
      if state.demand.is_none() {
        log::trace!("timer tick without demand skipped");
        return true;
      }
      let Some(subscriber) = state.subscriber.take() else {
        return true;
      };
      state.demand.consume_one();
      if let Some(remaining) = state.remaining.as_mut() {
        *remaining = remaining.saturating_sub(1);
      }
      subscriber
    };

    let more = subscriber.receive(self.config.scheduler.now());

    {
      let mut state = self.state.lock();
      if state.status.is_terminal() {
        return false;
      }
      state.demand += more;
      if state.remaining != Some(0) {
        state.subscriber = Some(subscriber);
        return true;
      }
      state.status = LinkStatus::Completed;
      state.demand = Demand::NONE;
      state.task = None;
    }
    subscriber.receive_completion(Completion::Finished);
    false
  }
}

impl<S: Scheduler> Subscription for TimerLink<S> {
  fn request(&self, demand: Demand) {
    let start = {
      let mut state = self.state.lock();
      if state.status.is_terminal() {
        log::debug!("request({demand}) on a terminated timer ignored");
        return;
      }
      if demand.is_none() {
        return;
      }
      state.demand += demand;
      if state.started || state.remaining == Some(0) {
        false
      } else {
        state.started = true;
        true
      }
    };
    if start {
      self.start();
    }
  }

  fn cancel(&self) {
    let (task, subscriber) = {
      let mut state = self.state.lock();
      if state.status.is_terminal() {
        return;
      }
      state.status = LinkStatus::Cancelled;
      state.demand = Demand::NONE;
      (state.task.take(), state.subscriber.take())
    };
    if let Some(task) = task {
      task.cancel();
    }
    drop(subscriber);
  }

  fn is_closed(&self) -> bool { self.state.lock().status.is_terminal() }
}
