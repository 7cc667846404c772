//! Subject: a manually driven, hot publisher.
//!
//! Values pushed with [`Subject::send`] go to every current subscriber that
//! has outstanding demand; subscribers without demand miss them. The first
//! [`Subject::complete`] call is delivered to every subscriber and cached, so
//! subscribers that arrive later are completed right away.
//!
//! # Example
//!
//! ```rust
//! use std::sync::{Arc, Mutex};
//!
//! use rxdemand::prelude::*;
//!
//! let subject = Subject::<i32, ()>::new();
//! let seen = Arc::new(Mutex::new(vec![]));
//! let c_seen = seen.clone();
//! subject.sink(move |v| c_seen.lock().unwrap().push(v), |_| {});
//!
//! subject.send(1);
//! subject.send(2);
//! subject.complete(Completion::Finished);
//! assert_eq!(*seen.lock().unwrap(), vec![1, 2]);
//! ```

use std::sync::Arc;

use parking_lot::Mutex;
use smallvec::SmallVec;

use crate::{
  completion::Completion,
  demand::Demand,
  error::{report_violation, ProtocolViolation},
  publisher::Publisher,
  subscriber::{BoxedSubscriber, Subscriber},
  subscription::{Link, LinkStatus, Subscription},
};

pub struct Subject<Item, Err> {
  inner: Arc<Mutex<SubjectState<Item, Err>>>,
}

struct SubjectState<Item, Err> {
  links: Vec<Arc<SubjectLink<Item, Err>>>,
  completion: Option<Completion<Err>>,
}

impl<Item, Err> Clone for Subject<Item, Err> {
  fn clone(&self) -> Self { Subject { inner: self.inner.clone() } }
}

impl<Item, Err> Default for Subject<Item, Err> {
  fn default() -> Self {
    Subject { inner: Arc::new(Mutex::new(SubjectState { links: vec![], completion: None })) }
  }
}

impl<Item, Err> Subject<Item, Err>
where
  Item: Clone + Send + 'static,
  Err: Clone + Send + 'static,
{
  pub fn new() -> Self { Self::default() }

  /// Deliver `value` to every subscriber with outstanding demand.
  pub fn send(&self, value: Item) {
    let links: SmallVec<[_; 4]> = {
      let mut state = self.inner.lock();
      if state.completion.is_some() {
        log::trace!("send after completion ignored");
        return;
      }
      state.links.retain(|link| !link.is_closed());
      state.links.iter().cloned().collect()
    };
    for link in links {
      link.offer(value.clone());
    }
  }

  /// Terminate every subscriber. Only the first call has an effect.
  pub fn complete(&self, completion: Completion<Err>) {
    let links = {
      let mut state = self.inner.lock();
      if state.completion.is_some() {
        report_violation(ProtocolViolation::DuplicateCompletion);
        return;
      }
      state.completion = Some(completion.clone());
      std::mem::take(&mut state.links)
    };
    log::debug!("subject completed, notifying {} subscriber(s)", links.len());
    for link in links {
      link.complete(completion.clone());
    }
  }

  /// Number of subscribers that can still receive values.
  pub fn subscriber_count(&self) -> usize {
    self.inner.lock().links.iter().filter(|link| !link.is_closed()).count()
  }

  pub fn is_completed(&self) -> bool { self.inner.lock().completion.is_some() }
}

impl<Item, Err> Publisher for Subject<Item, Err>
where
  Item: Clone + Send + 'static,
  Err: Clone + Send + 'static,
{
  type Item = Item;
  type Err = Err;

  fn subscribe<S>(&self, subscriber: S) -> Link
  where
    S: Subscriber<Item, Err> + Send + 'static,
  {
    let link = Arc::new(SubjectLink::new());
    let cached = {
      let mut state = self.inner.lock();
      if state.completion.is_none() {
        state.links.push(link.clone());
      }
      state.completion.clone()
    };
    if let Some(completion) = cached {
      link.complete(completion);
    }
    link.attach(Box::new(subscriber))
  }
}

// ============================================================================
// SubjectLink
// ============================================================================

struct SubjectLink<Item, Err> {
  state: Mutex<SubjectLinkState<Item, Err>>,
}

struct SubjectLinkState<Item, Err> {
  status: LinkStatus,
  demand: Demand,
  attached: bool,
  subscriber: Option<BoxedSubscriber<Item, Err>>,
  pending: Option<Completion<Err>>,
}

impl<Item, Err> SubjectLink<Item, Err>
where
  Item: Send + 'static,
  Err: Send + 'static,
{
  fn new() -> Self {
    SubjectLink {
      state: Mutex::new(SubjectLinkState {
        status: LinkStatus::Active,
        demand: Demand::NONE,
        attached: false,
        subscriber: None,
        pending: None,
      }),
    }
  }

  fn attach(self: &Arc<Self>, mut subscriber: BoxedSubscriber<Item, Err>) -> Link {
    let link = Link::from_arc(self.clone());
    subscriber.on_subscribe(&link);
    self.state.lock().attached = true;
    self.settle(subscriber);
    link
  }

  fn offer(&self, value: Item) {
    let mut subscriber = {
      let mut state = self.state.lock();
      if state.status.is_terminal() {
        return;
      }
      if state.demand.is_none() {
        log::trace!("subscriber without demand misses a value");
        return;
      }
      match state.subscriber.take() {
        Some(subscriber) => {
          state.demand.consume_one();
          subscriber
        }
        None => {
          if state.attached {
            report_violation(ProtocolViolation::ReentrantDelivery);
          }
          return;
        }
      }
    };
    let more = subscriber.receive(value);
    if !more.is_none() {
      self.state.lock().demand += more;
    }
    self.settle(subscriber);
  }

  fn complete(&self, completion: Completion<Err>) {
    let subscriber = {
      let mut state = self.state.lock();
      if state.status.is_terminal() {
        return;
      }
      state.status = LinkStatus::Completed;
      state.demand = Demand::NONE;
      match state.subscriber.take() {
        Some(subscriber) => subscriber,
        None => {
          // the holder of the subscriber delivers it
          state.pending = Some(completion);
          return;
        }
      }
    };
    self.settle_with(subscriber, completion);
  }

  /// Put the subscriber back, or hand it a completion that arrived while it
  /// was out.
  fn settle(&self, subscriber: BoxedSubscriber<Item, Err>) {
    let pending = {
      let mut state = self.state.lock();
      match state.pending.take() {
        Some(completion) => completion,
        None => {
          if !state.status.is_terminal() {
            state.subscriber = Some(subscriber);
          }
          return;
        }
      }
    };
    self.settle_with(subscriber, pending);
  }

  fn settle_with(&self, mut subscriber: BoxedSubscriber<Item, Err>, completion: Completion<Err>) {
    subscriber.receive_completion(completion);
  }
}

impl<Item, Err> Subscription for SubjectLink<Item, Err>
where
  Item: Send + 'static,
  Err: Send + 'static,
{
  fn request(&self, demand: Demand) {
    let mut state = self.state.lock();
    if state.status.is_terminal() {
      log::debug!("request({demand}) on a terminated link ignored");
      return;
    }
    state.demand += demand;
  }

  fn cancel(&self) {
    let released = {
      let mut state = self.state.lock();
      if state.status.is_terminal() {
        return;
      }
      state.status = LinkStatus::Cancelled;
      state.demand = Demand::NONE;
      state.pending = None;
      state.subscriber.take()
    };
    drop(released);
  }

  fn is_closed(&self) -> bool { self.state.lock().status.is_terminal() }
}
