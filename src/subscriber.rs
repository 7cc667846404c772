//! Subscriber trait and the closure-based [`Sink`].
//!
//! A subscriber is the consumer side of the demand protocol. It is handed its
//! [`Link`] once, then receives values (each one answering with extra demand)
//! and finally at most one completion.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::{
  completion::Completion,
  demand::Demand,
  error::{report_violation, ProtocolViolation},
  subscription::{Link, Subscription},
};

// ============================================================================
// Subscriber Trait
// ============================================================================

/// Consumer of a demand-driven stream.
pub trait Subscriber<Item, Err> {
  /// Called exactly once, before any value, with the link to the publisher.
  ///
  /// Requesting demand from inside this call is allowed.
  fn on_subscribe(&mut self, link: &Link) { let _ = link; }

  /// Receive one requested value and return any additional demand.
  fn receive(&mut self, value: Item) -> Demand;

  /// Receive the terminal signal. Called at most once.
  fn receive_completion(&mut self, completion: Completion<Err>);
}

/// Boxed subscriber that can be driven from any thread.
pub type BoxedSubscriber<Item, Err> = Box<dyn Subscriber<Item, Err> + Send>;

impl<Item, Err, S> Subscriber<Item, Err> for Box<S>
where
  S: Subscriber<Item, Err> + ?Sized,
{
  #[inline]
  fn on_subscribe(&mut self, link: &Link) { (**self).on_subscribe(link) }

  #[inline]
  fn receive(&mut self, value: Item) -> Demand { (**self).receive(value) }

  #[inline]
  fn receive_completion(&mut self, completion: Completion<Err>) {
    (**self).receive_completion(completion)
  }
}

// ============================================================================
// Sink - closure adapter
// ============================================================================

/// Subscriber built from two closures.
///
/// The sink requests `initial` demand when it is subscribed. Every value is
/// passed to the value handler, whose return is granted as additional demand.
/// The sink keeps its own count of outstanding demand: values that arrive
/// without it, or after the completion, are dropped and reported.
///
/// Demand requested on the publisher's link directly is not seen by the sink.
/// Request through a link wrapped by [`SinkDemand::track`] instead; the
/// `PublisherExt` sink helpers already return one.
pub struct Sink<N, C> {
  receive_value: N,
  receive_completion: Option<C>,
  initial: Demand,
  outstanding: Arc<Mutex<Demand>>,
}

impl<N, C> Sink<N, C> {
  pub fn new(initial: Demand, receive_value: N, receive_completion: C) -> Self {
    Sink {
      receive_value,
      receive_completion: Some(receive_completion),
      initial,
      outstanding: Arc::new(Mutex::new(Demand::NONE)),
    }
  }

  /// `true` once the completion handler has run.
  pub fn is_completed(&self) -> bool { self.receive_completion.is_none() }

  /// Demand the sink still expects to be served.
  pub fn outstanding(&self) -> Demand { *self.outstanding.lock() }

  /// Handle to this sink's demand count that outlives subscribing the sink.
  pub fn demand(&self) -> SinkDemand { SinkDemand(self.outstanding.clone()) }
}

/// Shared view of a [`Sink`]'s outstanding demand.
#[derive(Clone)]
pub struct SinkDemand(Arc<Mutex<Demand>>);

impl SinkDemand {
  pub fn outstanding(&self) -> Demand { *self.0.lock() }

  /// Wrap `link` so that requests made through it count as the sink's demand.
  pub fn track(&self, link: Link) -> Link {
    Link::new(TrackedLink { link, outstanding: self.0.clone() })
  }
}

/// A link whose requests are also credited to a [`Sink`].
struct TrackedLink {
  link: Link,
  outstanding: Arc<Mutex<Demand>>,
}

impl Subscription for TrackedLink {
  fn request(&self, demand: Demand) {
    if !self.link.is_closed() {
      *self.outstanding.lock() += demand;
    }
    self.link.request(demand);
  }

  fn cancel(&self) { self.link.cancel(); }

  fn is_closed(&self) -> bool { self.link.is_closed() }
}

impl<Item, Err, N, C> Subscriber<Item, Err> for Sink<N, C>
where
  N: FnMut(Item) -> Demand,
  C: FnOnce(Completion<Err>),
{
  fn on_subscribe(&mut self, link: &Link) {
    *self.outstanding.lock() += self.initial;
    link.request(self.initial);
  }

  fn receive(&mut self, value: Item) -> Demand {
    if self.is_completed() {
      report_violation(ProtocolViolation::DeliveryAfterTermination);
      return Demand::NONE;
    }
    if !self.outstanding.lock().consume_one() {
      report_violation(ProtocolViolation::UnrequestedDelivery);
      return Demand::NONE;
    }
    let more = (self.receive_value)(value);
    *self.outstanding.lock() += more;
    more
  }

  fn receive_completion(&mut self, completion: Completion<Err>) {
    match self.receive_completion.take() {
      Some(handler) => handler(completion),
      None => report_violation(ProtocolViolation::DuplicateCompletion),
    }
  }
}
