//! A link that serves its subscriber from a private buffer.
//!
//! The buffer is filled by the producer side (`push`, `complete`) and drained
//! by the subscriber's demand (`request`). The state lock is never held while
//! the subscriber runs. Whoever finds the link idle becomes the drainer; any
//! request, push or cancel that arrives meanwhile (re-entrantly from a callback
//! or from another thread) only updates the state and leaves the delivery to
//! the active drain loop.

use std::sync::Arc;

use parking_lot::Mutex;

use super::{Link, LinkStatus, Subscription};
use crate::{
  completion::Completion, demand::Demand, replay_buffer::ReplayBuffer,
  subscriber::BoxedSubscriber,
};

/// What a cancel does to the subscriber.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum OnCancel {
  /// Tear down without any further callback.
  Silent,
  /// Drop the backlog and deliver `Completion::Finished`.
  Finish,
}

pub(crate) struct BufferedSubscription<Item, Err> {
  state: Mutex<BufferedState<Item, Err>>,
  on_cancel: OnCancel,
}

struct BufferedState<Item, Err> {
  status: LinkStatus,
  demand: Demand,
  buffer: ReplayBuffer<Item>,
  completion: Option<Completion<Err>>,
  cancelling: bool,
  subscriber: Option<BoxedSubscriber<Item, Err>>,
  draining: bool,
}

enum Step<Item, Err> {
  Value(Item),
  Complete(Completion<Err>),
  Stop,
  Idle,
}

impl<Item, Err> BufferedState<Item, Err> {
  fn next_step(&mut self) -> Step<Item, Err> {
    if self.status.is_terminal() {
      return Step::Stop;
    }
    if !self.demand.is_none() {
      if let Some(value) = self.buffer.pop_front() {
        self.demand.consume_one();
        return Step::Value(value);
      }
    }
    if self.buffer.is_empty() {
      if let Some(completion) = self.completion.take() {
        self.status = if self.cancelling { LinkStatus::Cancelled } else { LinkStatus::Completed };
        return Step::Complete(completion);
      }
    }
    Step::Idle
  }
}

impl<Item, Err> BufferedSubscription<Item, Err>
where
  Item: Send + 'static,
  Err: Send + 'static,
{
  /// A link pre-seeded with a backlog and, optionally, a known completion.
  pub(crate) fn new(
    buffer: ReplayBuffer<Item>, completion: Option<Completion<Err>>, on_cancel: OnCancel,
  ) -> Arc<Self> {
    Arc::new(BufferedSubscription {
      state: Mutex::new(BufferedState {
        status: LinkStatus::Active,
        demand: Demand::NONE,
        buffer,
        completion,
        cancelling: false,
        subscriber: None,
        draining: false,
      }),
      on_cancel,
    })
  }

  /// Hand `subscriber` its link, then start serving it.
  ///
  /// A completion known up front reaches the subscriber right away when there
  /// is no backlog; values always wait for demand.
  pub(crate) fn attach(self: &Arc<Self>, mut subscriber: BoxedSubscriber<Item, Err>) -> Link {
    let link = Link::from_arc(self.clone());
    subscriber.on_subscribe(&link);
    let rejected = {
      let mut state = self.state.lock();
      if state.status.is_terminal() {
        Some(subscriber)
      } else {
        state.subscriber = Some(subscriber);
        None
      }
    };
    drop(rejected);
    self.drain();
    link
  }

  /// Buffer one value from upstream and serve it if demand allows.
  ///
  /// Values past the capacity are evicted once nobody is draining, so an
  /// active drain loop still sees everything staged while it runs.
  pub(crate) fn push(&self, value: Item) {
    {
      let mut state = self.state.lock();
      if state.status.is_terminal() || state.completion.is_some() {
        log::trace!("value for a terminated link dropped");
        return;
      }
      state.buffer.stage(value);
    }
    self.drain();
    let mut state = self.state.lock();
    if !state.draining {
      state.buffer.trim();
    }
  }

  /// Record the upstream completion. It is delivered once the backlog that is
  /// buffered right now has been drained.
  pub(crate) fn complete(&self, completion: Completion<Err>) {
    {
      let mut state = self.state.lock();
      if state.status.is_terminal() || state.completion.is_some() {
        return;
      }
      state.completion = Some(completion);
    }
    self.drain();
  }

  #[cfg(test)]
  pub(crate) fn status(&self) -> LinkStatus { self.state.lock().status }

  #[cfg(test)]
  pub(crate) fn buffered_len(&self) -> usize { self.state.lock().buffer.len() }

  #[cfg(test)]
  pub(crate) fn demand(&self) -> Demand { self.state.lock().demand }

  fn drain(&self) {
    let mut subscriber = {
      let mut state = self.state.lock();
      if state.draining || state.status.is_terminal() {
        return;
      }
      match state.subscriber.take() {
        Some(subscriber) => {
          state.draining = true;
          subscriber
        }
        None => return,
      }
    };

    loop {
      let step = {
        let mut state = self.state.lock();
        match state.next_step() {
          Step::Idle => {
            state.subscriber = Some(subscriber);
            state.draining = false;
            state.buffer.trim();
            return;
          }
          step => step,
        }
      };
      match step {
        Step::Value(value) => {
          let more = subscriber.receive(value);
          if !more.is_none() {
            self.state.lock().demand += more;
          }
        }
        Step::Complete(completion) => {
          subscriber.receive_completion(completion);
          break;
        }
        Step::Stop | Step::Idle => break,
      }
    }

    {
      let mut state = self.state.lock();
      state.draining = false;
      state.buffer.clear();
    }
    drop(subscriber);
  }
}

impl<Item, Err> Subscription for BufferedSubscription<Item, Err>
where
  Item: Send + 'static,
  Err: Send + 'static,
{
  fn request(&self, demand: Demand) {
    {
      let mut state = self.state.lock();
      if state.status.is_terminal() {
        log::debug!("request({demand}) on a terminated link ignored");
        return;
      }
      if demand.is_none() {
        return;
      }
      state.demand += demand;
    }
    self.drain();
  }

  fn cancel(&self) {
    let released = {
      let mut state = self.state.lock();
      if state.status.is_terminal() || state.cancelling {
        return;
      }
      state.buffer.clear();
      match self.on_cancel {
        OnCancel::Finish => {
          state.cancelling = true;
          state.completion = Some(Completion::Finished);
          None
        }
        OnCancel::Silent => {
          state.status = LinkStatus::Cancelled;
          state.completion = None;
          state.subscriber.take()
        }
      }
    };
    drop(released);
    self.drain();
  }

  fn is_closed(&self) -> bool {
    let state = self.state.lock();
    state.status.is_terminal() || state.cancelling
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    replay_buffer::Capacity,
    subscriber::Subscriber,
    test_util::{Event, Recorder},
  };

  fn link_with(
    items: Vec<i32>, completion: Option<Completion<&'static str>>, on_cancel: OnCancel,
  ) -> Arc<BufferedSubscription<i32, &'static str>> {
    BufferedSubscription::new(
      ReplayBuffer::with_items(Capacity::Bounded(3), items),
      completion,
      on_cancel,
    )
  }

  #[test]
  fn serves_exactly_the_requested_values() {
    let sub = link_with(vec![1, 2, 3], None, OnCancel::Silent);
    let (recorder, events) = Recorder::new(Demand::NONE);
    let link = sub.attach(Box::new(recorder));
    assert!(events.is_empty());

    link.request(Demand::max(2));
    assert_eq!(events.values(), vec![1, 2]);
    assert_eq!(sub.demand(), Demand::NONE);

    link.request(Demand::NONE);
    assert_eq!(events.values(), vec![1, 2]);

    link.request(Demand::max(5));
    assert_eq!(events.values(), vec![1, 2, 3]);
    assert_eq!(sub.demand(), Demand::max(4));
  }

  #[test]
  fn completion_waits_for_the_backlog() {
    let sub = link_with(vec![1, 2], None, OnCancel::Silent);
    let (recorder, events) = Recorder::new(Demand::max(1));
    let link = sub.attach(Box::new(recorder));
    sub.complete(Completion::Failed("boom"));
    assert_eq!(events.all(), vec![Event::Value(1)]);

    link.request(Demand::max(1));
    assert_eq!(
      events.all(),
      vec![Event::Value(1), Event::Value(2), Event::Done(Completion::Failed("boom"))]
    );
    assert_eq!(sub.status(), LinkStatus::Completed);
    assert!(link.is_closed());

    // later signals are ignored
    sub.complete(Completion::Finished);
    sub.push(9);
    link.request(Demand::Unlimited);
    assert_eq!(events.completions().len(), 1);
  }

  #[test]
  fn known_completion_with_empty_backlog_is_immediate() {
    let sub = link_with(vec![], Some(Completion::Finished), OnCancel::Finish);
    let (recorder, events) = Recorder::new(Demand::NONE);
    sub.attach(Box::new(recorder));
    assert_eq!(events.all(), vec![Event::Done(Completion::Finished)]);
  }

  #[test]
  fn push_evicts_past_capacity_when_not_drained() {
    let sub = link_with(vec![], None, OnCancel::Silent);
    let (recorder, events) = Recorder::new(Demand::NONE);
    let link = sub.attach(Box::new(recorder));
    for v in 1..=5 {
      sub.push(v);
    }
    assert_eq!(sub.buffered_len(), 3);
    link.request(Demand::Unlimited);
    assert_eq!(events.values(), vec![3, 4, 5]);

    sub.push(6);
    assert_eq!(events.values(), vec![3, 4, 5, 6]);
    assert_eq!(sub.buffered_len(), 0);
  }

  /// Pushes `2` into its own link while `1` is being delivered.
  struct PushesWhileDraining {
    link: Arc<BufferedSubscription<i32, &'static str>>,
    seen: Arc<Mutex<Vec<i32>>>,
  }

  impl Subscriber<i32, &'static str> for PushesWhileDraining {
    fn on_subscribe(&mut self, link: &Link) { link.request(Demand::max(1)); }

    fn receive(&mut self, value: i32) -> Demand {
      self.seen.lock().push(value);
      if value == 1 {
        self.link.push(2);
      }
      Demand::max(1)
    }

    fn receive_completion(&mut self, _: Completion<&'static str>) {}
  }

  #[test]
  fn zero_capacity_value_reaches_an_active_drain() {
    let sub = BufferedSubscription::new(
      ReplayBuffer::new(Capacity::Bounded(0)),
      None::<Completion<&'static str>>,
      OnCancel::Silent,
    );
    let seen = Arc::new(Mutex::new(vec![]));
    sub.attach(Box::new(PushesWhileDraining { link: sub.clone(), seen: seen.clone() }));
    sub.push(1);
    assert_eq!(*seen.lock(), vec![1, 2]);
    assert_eq!(sub.buffered_len(), 0);

    // without demand nothing is kept
    let zero = BufferedSubscription::new(
      ReplayBuffer::new(Capacity::Bounded(0)),
      None::<Completion<&'static str>>,
      OnCancel::Silent,
    );
    let (recorder, events) = Recorder::new(Demand::NONE);
    let link = zero.attach(Box::new(recorder));
    zero.push(1);
    assert_eq!(zero.buffered_len(), 0);
    link.request(Demand::Unlimited);
    assert!(events.is_empty());
  }

  #[test]
  fn granted_demand_keeps_the_drain_going() {
    let sub = link_with(vec![1, 2, 3], Some(Completion::Finished), OnCancel::Silent);
    let (recorder, events) = Recorder::new(Demand::max(1));
    sub.attach(Box::new(recorder.granting(Demand::max(1))));
    assert_eq!(
      events.all(),
      vec![Event::Value(1), Event::Value(2), Event::Value(3), Event::Done(Completion::Finished)]
    );
  }

  #[test]
  fn silent_cancel_drops_everything() {
    let sub = link_with(vec![1, 2], None, OnCancel::Silent);
    let (recorder, events) = Recorder::new(Demand::NONE);
    let link = sub.attach(Box::new(recorder));
    link.cancel();
    link.cancel();
    link.request(Demand::Unlimited);
    sub.push(3);
    assert!(events.is_empty());
    assert_eq!(sub.status(), LinkStatus::Cancelled);
    assert_eq!(sub.buffered_len(), 0);
  }

  #[test]
  fn finishing_cancel_skips_the_backlog() {
    let sub = link_with(vec![1, 2], None, OnCancel::Finish);
    let (recorder, events) = Recorder::new(Demand::NONE);
    let link = sub.attach(Box::new(recorder));
    link.cancel();
    link.cancel();
    sub.complete(Completion::Failed("late"));
    assert_eq!(events.all(), vec![Event::Done(Completion::Finished)]);
    assert_eq!(sub.status(), LinkStatus::Cancelled);
  }

  #[test]
  fn cancel_from_inside_a_callback() {
    let sub = link_with(vec![1, 2, 3], None, OnCancel::Finish);
    let (recorder, events) = Recorder::new(Demand::Unlimited);
    sub.attach(Box::new(recorder.cancelling_after(2)));
    assert_eq!(
      events.all(),
      vec![Event::Value(1), Event::Value(2), Event::Done(Completion::Finished)]
    );
  }

  #[test]
  fn request_from_inside_a_callback_does_not_recurse() {
    let sub = link_with(vec![1, 2, 3], None, OnCancel::Silent);
    let (recorder, events) = Recorder::new(Demand::max(1));
    sub.attach(Box::new(recorder.requesting_in_callback(Demand::max(1))));
    assert_eq!(events.values(), vec![1, 2, 3]);
    assert_eq!(events.max_depth(), 1);
  }
}
