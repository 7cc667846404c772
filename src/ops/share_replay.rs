//! Share one upstream run among many subscribers, replaying recent values.
//!
//! [`ShareReplay`] subscribes to its upstream lazily, exactly once, when the
//! first downstream subscriber arrives, and requests unlimited demand from it.
//! Every upstream value goes into a bounded replay buffer and into the private
//! buffer of every live downstream link. Each link then serves its own
//! subscriber's demand, so a slow subscriber never throttles a fast one.
//!
//! A subscriber that arrives later starts from a copy of the replay buffer.
//! If upstream has already terminated, that copy is followed by the cached
//! completion and upstream is not subscribed again.
//!
//! # Example
//!
//! ```rust
//! use std::sync::{Arc, Mutex};
//!
//! use rxdemand::prelude::*;
//!
//! let upstream = Subject::<i32, ()>::new();
//! let shared = upstream.clone().share_replay(2);
//!
//! let early = Arc::new(Mutex::new(vec![]));
//! let c_early = early.clone();
//! shared.sink(move |v| c_early.lock().unwrap().push(v), |_| {});
//!
//! upstream.send(1);
//! upstream.send(2);
//! upstream.send(3);
//!
//! let late = Arc::new(Mutex::new(vec![]));
//! let c_late = late.clone();
//! shared.sink(move |v| c_late.lock().unwrap().push(v), |_| {});
//!
//! assert_eq!(*early.lock().unwrap(), vec![1, 2, 3]);
//! assert_eq!(*late.lock().unwrap(), vec![2, 3]);
//! ```
//!
//! # Locking
//!
//! All hub state (subscriber set, replay buffer, cached completion, upstream
//! link) sits behind one re-entrant lock. Relays, completions and subscribes
//! are serialized by it, and a subscriber callback that calls back into the
//! same hub on the same thread re-enters instead of deadlocking. The inner
//! `RefCell` is only borrowed for bookkeeping, never while a link or
//! subscriber runs.
//!
//! A completion or `dispose` that arrives re-entrantly while a value is being
//! relayed is deferred until that value has reached every link.

use std::{cell::RefCell, sync::Arc};

use parking_lot::ReentrantMutex;
use smallvec::SmallVec;

use crate::{
  completion::Completion,
  demand::Demand,
  error::{report_violation, ProtocolViolation},
  publisher::Publisher,
  replay_buffer::{Capacity, ReplayBuffer},
  subscriber::Subscriber,
  subscription::{
    buffered::{BufferedSubscription, OnCancel},
    Link, Subscription,
  },
};

/// Configuration of a [`ShareReplay`] hub.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReplayConfig {
  pub capacity: Capacity,
}

impl ReplayConfig {
  pub fn new(capacity: Capacity) -> Self { ReplayConfig { capacity } }

  /// Keep every value ever emitted.
  pub fn unbounded() -> Self { ReplayConfig { capacity: Capacity::Unbounded } }

  /// Keep at most the `n` most recent values.
  pub fn bounded(n: usize) -> Self { ReplayConfig { capacity: Capacity::Bounded(n) } }
}

type ReplayLink<P> = BufferedSubscription<<P as Publisher>::Item, <P as Publisher>::Err>;

/// Multicast hub with a bounded replay buffer.
///
/// Cloning the hub clones the handle; all clones share the same upstream run.
pub struct ShareReplay<P: Publisher> {
  hub: Arc<Hub<P>>,
}

struct Hub<P: Publisher> {
  state: ReentrantMutex<RefCell<HubState<P>>>,
}

struct HubState<P: Publisher> {
  upstream: Option<P>,
  upstream_link: Option<Link>,
  connected: bool,
  buffer: ReplayBuffer<P::Item>,
  completion: Option<Completion<P::Err>>,
  links: Vec<Arc<ReplayLink<P>>>,
  relaying: bool,
  deferred: Option<Completion<P::Err>>,
}

impl<P: Publisher> HubState<P> {
  fn is_terminating(&self) -> bool { self.completion.is_some() || self.deferred.is_some() }
}

impl<P: Publisher> Clone for ShareReplay<P> {
  fn clone(&self) -> Self { ShareReplay { hub: self.hub.clone() } }
}

impl<P> ShareReplay<P>
where
  P: Publisher + Send + 'static,
  P::Item: Clone + Send + 'static,
  P::Err: Clone + Send + 'static,
{
  pub fn new(upstream: P, config: ReplayConfig) -> Self {
    let state = HubState {
      upstream: Some(upstream),
      upstream_link: None,
      connected: false,
      buffer: ReplayBuffer::new(config.capacity),
      completion: None,
      links: vec![],
      relaying: false,
      deferred: None,
    };
    ShareReplay { hub: Arc::new(Hub { state: ReentrantMutex::new(RefCell::new(state)) }) }
  }

  /// Number of downstream links that can still receive values.
  pub fn subscriber_count(&self) -> usize {
    let guard = self.hub.state.lock();
    let state = guard.borrow();
    state.links.iter().filter(|link| !link.is_closed()).count()
  }

  /// Number of values currently held for replay.
  pub fn replay_len(&self) -> usize { self.hub.state.lock().borrow().buffer.len() }

  /// `true` once upstream has completed or the hub was disposed.
  pub fn is_completed(&self) -> bool { self.hub.state.lock().borrow().completion.is_some() }

  /// `true` once the hub has subscribed to its upstream.
  pub fn is_connected(&self) -> bool { self.hub.state.lock().borrow().connected }

  /// Tear the hub down: cancel the upstream link (or make sure it is never
  /// created) and finish every downstream link once its backlog drains.
  ///
  /// Later subscribers get the replay buffer followed by `Finished`.
  /// Calling this more than once has no further effect. Called from a callback
  /// that is receiving a relayed value, the links are finished only after that
  /// value has reached all of them.
  pub fn dispose(&self) {
    let guard = self.hub.state.lock();
    let upstream_link = {
      let mut state = guard.borrow_mut();
      if state.is_terminating() {
        return;
      }
      state.upstream = None;
      state.upstream_link.take()
    };
    log::debug!("share_replay disposed");
    if let Some(link) = upstream_link {
      link.cancel();
    }
    self.hub.complete(Completion::Finished);
  }
}

impl<P> Hub<P>
where
  P: Publisher + Send + 'static,
  P::Item: Clone + Send + 'static,
  P::Err: Clone + Send + 'static,
{
  /// Upstream value: buffer it for replay, then forward it to every link.
  fn relay(&self, value: P::Item) {
    let guard = self.state.lock();
    let (links, nested) = {
      let mut state = guard.borrow_mut();
      if state.is_terminating() {
        log::trace!("value after hub completion dropped");
        return;
      }
      state.buffer.push(value.clone());
      state.links.retain(|link| !link.is_closed());
      let nested = std::mem::replace(&mut state.relaying, true);
      let links: SmallVec<[Arc<ReplayLink<P>>; 4]> = state.links.iter().cloned().collect();
      (links, nested)
    };
    log::trace!("share_replay relays a value to {} link(s)", links.len());
    let mut iter = links.into_iter().peekable();
    while let Some(link) = iter.next() {
      if iter.peek().is_some() {
        link.push(value.clone());
      } else {
        link.push(value);
        break;
      }
    }

    if nested {
      return;
    }
    let deferred = {
      let mut state = guard.borrow_mut();
      state.relaying = false;
      state.deferred.take()
    };
    if let Some(completion) = deferred {
      self.complete(completion);
    }
  }

  /// Upstream completion: cache it for late subscribers and forward it.
  fn complete(&self, completion: Completion<P::Err>) {
    let guard = self.state.lock();
    let (links, upstream_link) = {
      let mut state = guard.borrow_mut();
      if state.completion.is_some() {
        return;
      }
      if state.relaying {
        if state.deferred.is_none() {
          log::debug!("share_replay completion deferred until the current value is relayed");
          state.deferred = Some(completion);
        }
        return;
      }
      state.completion = Some(completion.clone());
      (std::mem::take(&mut state.links), state.upstream_link.take())
    };
    log::debug!(
      "share_replay upstream {}, completing {} link(s)",
      if completion.is_failed() { "failed" } else { "finished" },
      links.len()
    );
    drop(upstream_link);
    for link in links {
      link.complete(completion.clone());
    }
  }
}

impl<P> Publisher for ShareReplay<P>
where
  P: Publisher + Send + 'static,
  P::Item: Clone + Send + 'static,
  P::Err: Clone + Send + 'static,
{
  type Item = P::Item;
  type Err = P::Err;

  fn subscribe<S>(&self, subscriber: S) -> Link
  where
    S: Subscriber<P::Item, P::Err> + Send + 'static,
  {
    let guard = self.hub.state.lock();
    let (link, upstream) = {
      let mut state = guard.borrow_mut();
      state.links.retain(|link| !link.is_closed());
      let link = BufferedSubscription::new(
        state.buffer.snapshot(),
        state.completion.clone(),
        OnCancel::Finish,
      );
      if state.completion.is_none() {
        state.links.push(link.clone());
      }
      let upstream = state.upstream.take();
      state.connected |= upstream.is_some();
      (link, upstream)
    };
    let handle = link.attach(Box::new(subscriber));

    if let Some(upstream) = upstream {
      log::debug!("share_replay connects to upstream");
      let sink = HubSink { hub: self.hub.clone(), demand: Demand::NONE };
      let upstream_link = upstream.subscribe(sink);
      let terminated = guard.borrow().completion.is_some();
      if terminated {
        upstream_link.cancel();
      }
    }
    handle
  }
}

/// The hub's own subscriber on the upstream publisher.
///
/// It asks for unlimited demand as soon as it is handed its link, unless the
/// hub was torn down in the meantime.
struct HubSink<P: Publisher> {
  hub: Arc<Hub<P>>,
  demand: Demand,
}

impl<P> Subscriber<P::Item, P::Err> for HubSink<P>
where
  P: Publisher + Send + 'static,
  P::Item: Clone + Send + 'static,
  P::Err: Clone + Send + 'static,
{
  fn on_subscribe(&mut self, link: &Link) {
    let guard = self.hub.state.lock();
    let live = {
      let mut state = guard.borrow_mut();
      if !state.is_terminating() {
        state.upstream_link = Some(link.clone());
      }
      !state.is_terminating()
    };
    if live {
      self.demand = Demand::Unlimited;
      link.request(Demand::Unlimited);
    } else {
      link.cancel();
    }
  }

  fn receive(&mut self, value: P::Item) -> Demand {
    if !self.demand.consume_one() {
      report_violation(ProtocolViolation::UnrequestedDelivery);
      return Demand::NONE;
    }
    self.hub.relay(value);
    Demand::NONE
  }

  fn receive_completion(&mut self, completion: Completion<P::Err>) { self.hub.complete(completion); }
}

#[cfg(test)]
mod tests {
  use std::sync::atomic::{AtomicUsize, Ordering};

  use super::*;
  use crate::{
    publisher::{sequence::sequence, PublisherExt},
    subject::Subject,
    test_util::{Event, Recorder},
  };

  /// Counts how many times it is subscribed to.
  #[derive(Clone)]
  struct Counted {
    subject: Subject<i32, &'static str>,
    subscriptions: Arc<AtomicUsize>,
  }

  impl Publisher for Counted {
    type Item = i32;
    type Err = &'static str;

    fn subscribe<S>(&self, subscriber: S) -> Link
    where
      S: Subscriber<i32, &'static str> + Send + 'static,
    {
      self.subscriptions.fetch_add(1, Ordering::SeqCst);
      self.subject.subscribe(subscriber)
    }
  }

  fn counted() -> (Counted, Subject<i32, &'static str>, Arc<AtomicUsize>) {
    let subject = Subject::new();
    let subscriptions = Arc::new(AtomicUsize::new(0));
    let upstream = Counted { subject: subject.clone(), subscriptions: subscriptions.clone() };
    (upstream, subject, subscriptions)
  }

  #[test]
  fn upstream_is_subscribed_lazily_and_once() {
    let (upstream, subject, subscriptions) = counted();
    let shared = upstream.share_replay(2);
    assert_eq!(subscriptions.load(Ordering::SeqCst), 0);
    assert!(!shared.is_connected());

    // nobody listens yet: these are lost
    subject.send(1);
    subject.send(2);
    subject.send(3);

    let (a, a_events) = Recorder::new(Demand::Unlimited);
    shared.subscribe(a);
    assert!(shared.is_connected());
    let (b, _) = Recorder::new(Demand::Unlimited);
    shared.subscribe(b);
    assert_eq!(subscriptions.load(Ordering::SeqCst), 1);

    subject.send(4);
    assert_eq!(a_events.values(), vec![4]);
  }

  #[test]
  fn hub_scenario_with_capacity_two() {
    let (upstream, subject, subscriptions) = counted();
    let shared = upstream.share_replay(2);

    let (a, a_events) = Recorder::new(Demand::Unlimited);
    shared.subscribe(a);
    subject.send(4);
    subject.send(5);
    assert_eq!(a_events.values(), vec![4, 5]);

    let (b, b_events) = Recorder::new(Demand::Unlimited);
    shared.subscribe(b);
    assert_eq!(b_events.values(), vec![4, 5]);

    subject.send(6);
    subject.complete(Completion::Finished);
    let tail = vec![Event::Value(6), Event::Done(Completion::Finished)];
    assert_eq!(a_events.all()[2..], tail[..]);
    assert_eq!(b_events.all()[2..], tail[..]);

    let (c, c_events) = Recorder::new(Demand::Unlimited);
    shared.subscribe(c);
    assert_eq!(
      c_events.all(),
      vec![Event::Value(5), Event::Value(6), Event::Done(Completion::Finished)]
    );
    assert_eq!(subscriptions.load(Ordering::SeqCst), 1);
  }

  #[test]
  fn late_subscriber_waits_for_demand_before_completion() {
    let shared = sequence::<_, ()>(vec![1, 2, 3]).share_replay_with(ReplayConfig::unbounded());
    let (first, _) = Recorder::new(Demand::Unlimited);
    shared.subscribe(first);
    assert!(shared.is_completed());

    let (late, late_events) = Recorder::new(Demand::max(2));
    let link = shared.subscribe(late);
    assert_eq!(late_events.values(), vec![1, 2]);
    assert!(late_events.completions().is_empty());

    link.request(Demand::max(1));
    assert_eq!(
      late_events.all(),
      vec![Event::Value(1), Event::Value(2), Event::Value(3), Event::Done(Completion::Finished)]
    );
  }

  #[test]
  fn failure_reaches_current_and_future_subscribers() {
    let (upstream, subject, _) = counted();
    let shared = upstream.share_replay(1);
    let (a, a_events) = Recorder::new(Demand::NONE);
    let a_link = shared.subscribe(a);
    subject.send(1);
    subject.complete(Completion::Failed("boom"));
    // backlog first
    assert!(a_events.is_empty());
    a_link.request(Demand::max(1));
    assert_eq!(a_events.all(), vec![Event::Value(1), Event::Done(Completion::Failed("boom"))]);

    let (b, b_events) = Recorder::new(Demand::max(1));
    shared.subscribe(b);
    assert_eq!(b_events.all(), vec![Event::Value(1), Event::Done(Completion::Failed("boom"))]);
  }

  #[test]
  fn slow_and_fast_subscribers_drain_independently() {
    let (upstream, subject, _) = counted();
    let shared = upstream.share_replay(10);
    let (slow, slow_events) = Recorder::new(Demand::max(1));
    let slow_link = shared.subscribe(slow);
    let (fast, fast_events) = Recorder::new(Demand::Unlimited);
    shared.subscribe(fast);

    for v in 1..=5 {
      subject.send(v);
    }
    assert_eq!(fast_events.values(), vec![1, 2, 3, 4, 5]);
    assert_eq!(slow_events.values(), vec![1]);

    slow_link.request(Demand::max(2));
    assert_eq!(slow_events.values(), vec![1, 2, 3]);
    slow_link.request(Demand::Unlimited);
    assert_eq!(slow_events.values(), vec![1, 2, 3, 4, 5]);
  }

  #[test]
  fn slow_subscriber_loses_values_past_its_capacity() {
    let (upstream, subject, _) = counted();
    let shared = upstream.share_replay(2);
    let (slow, slow_events) = Recorder::new(Demand::NONE);
    let slow_link = shared.subscribe(slow);
    for v in 1..=5 {
      subject.send(v);
    }
    slow_link.request(Demand::Unlimited);
    assert_eq!(slow_events.values(), vec![4, 5]);
  }

  #[test]
  fn cancel_finishes_one_link_only() {
    let (upstream, subject, _) = counted();
    let shared = upstream.share_replay(4);
    let (a, a_events) = Recorder::new(Demand::NONE);
    let a_link = shared.subscribe(a);
    let (b, b_events) = Recorder::new(Demand::Unlimited);
    shared.subscribe(b);
    subject.send(1);
    assert_eq!(shared.subscriber_count(), 2);

    a_link.cancel();
    assert_eq!(a_events.all(), vec![Event::Done(Completion::Finished)]);
    assert_eq!(shared.subscriber_count(), 1);

    subject.send(2);
    assert_eq!(a_events.all().len(), 1);
    assert_eq!(b_events.values(), vec![1, 2]);
    // upstream stays connected after a downstream cancel
    assert!(!subject.is_completed());
    assert_eq!(subject.subscriber_count(), 1);
  }

  #[test]
  fn dispose_cancels_upstream_and_finishes_links() {
    let (upstream, subject, subscriptions) = counted();
    let shared = upstream.share_replay(3);
    let (a, a_events) = Recorder::new(Demand::NONE);
    let a_link = shared.subscribe(a);
    subject.send(1);

    shared.dispose();
    shared.dispose();
    assert!(shared.is_completed());
    assert_eq!(subject.subscriber_count(), 0);
    assert!(a_events.is_empty());
    a_link.request(Demand::Unlimited);
    assert_eq!(a_events.all(), vec![Event::Value(1), Event::Done(Completion::Finished)]);

    let (late, late_events) = Recorder::new(Demand::Unlimited);
    shared.subscribe(late);
    assert_eq!(late_events.all(), vec![Event::Value(1), Event::Done(Completion::Finished)]);
    assert_eq!(subscriptions.load(Ordering::SeqCst), 1);
  }

  #[test]
  fn dispose_before_first_subscriber_never_connects() {
    let (upstream, _, subscriptions) = counted();
    let shared = upstream.share_replay(3);
    shared.dispose();
    let (a, a_events) = Recorder::new(Demand::NONE);
    shared.subscribe(a);
    assert_eq!(a_events.all(), vec![Event::Done(Completion::Finished)]);
    assert_eq!(subscriptions.load(Ordering::SeqCst), 0);
    assert!(!shared.is_connected());
  }

  #[test]
  fn dispose_inside_a_callback_lets_the_value_reach_every_link() {
    let (upstream, subject, _) = counted();
    let shared = upstream.share_replay(2);
    let log = Arc::new(parking_lot::Mutex::new(vec![]));
    let subscribe = |name: &'static str, dispose_on: Option<i32>| {
      let c_log = log.clone();
      let d_log = log.clone();
      let c_shared = shared.clone();
      shared.sink(
        move |v| {
          c_log.lock().push(format!("{name}:{v}"));
          if dispose_on == Some(v) {
            c_shared.dispose();
          }
        },
        move |_| d_log.lock().push(format!("{name}:done")),
      );
    };

    subscribe("a", Some(1));
    subscribe("b", None);
    subject.send(1);
    subject.send(2);
    subscribe("c", None);

    assert_eq!(*log.lock(), vec!["a:1", "b:1", "a:done", "b:done", "c:1", "c:done"]);
    assert!(shared.is_completed());
    assert!(shared.is_connected());
    assert_eq!(subject.subscriber_count(), 0);
  }

  #[test]
  fn synchronous_upstream_completes_during_first_subscribe() {
    let shared = sequence::<_, ()>(vec![1, 2, 3]).share_replay(2);
    let (a, a_events) = Recorder::new(Demand::Unlimited);
    shared.subscribe(a);
    assert_eq!(
      a_events.all(),
      vec![Event::Value(1), Event::Value(2), Event::Value(3), Event::Done(Completion::Finished)]
    );
    assert_eq!(shared.replay_len(), 2);
    assert_eq!(shared.subscriber_count(), 0);
  }

  #[test]
  fn subscribing_from_inside_a_callback_reenters() {
    let (upstream, subject, _) = counted();
    let shared = upstream.share_replay(2);
    let inner_events = Arc::new(parking_lot::Mutex::new(vec![]));
    let c_shared = shared.clone();
    let c_inner = inner_events.clone();
    shared.sink(
      move |v| {
        if v == 2 {
          let c_inner = c_inner.clone();
          c_shared.sink(move |v| c_inner.lock().push(v), |_| {});
        }
      },
      |_| {},
    );
    subject.send(1);
    subject.send(2);
    subject.send(3);
    assert_eq!(*inner_events.lock(), vec![1, 2, 3]);
  }

  fn fan_out() {
    let upstream = Subject::<usize, ()>::new();
    let shared = upstream.clone().share_replay(16);
    for _ in 0..4 {
      shared.sink(|_| {}, |_| {});
    }
    for v in 0..100 {
      upstream.send(v);
    }
    upstream.complete(Completion::Finished);
  }

  #[test]
  fn bench() { do_bench(); }

  bencher::benchmark_group!(do_bench, bench_fan_out);

  fn bench_fan_out(b: &mut bencher::Bencher) { b.iter(fan_out); }
}
