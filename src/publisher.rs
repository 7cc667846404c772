//! The producer side of the demand protocol.
//!
//! A [`Publisher`] hands each subscriber its own [`Link`] and emits values
//! only while that link has outstanding demand. [`PublisherExt`] adds the
//! consumer helpers and the multicast operator to every publisher.

use crate::{
  completion::Completion,
  demand::Demand,
  ops::{
    pausable::PausableSink,
    share_replay::{ReplayConfig, ShareReplay},
  },
  replay_buffer::Capacity,
  subscriber::{Sink, Subscriber},
  subscription::Link,
};

pub mod sequence;
pub mod timer;

/// Something that can be subscribed to and emits values on demand.
pub trait Publisher {
  type Item;
  type Err;

  /// Connect `subscriber`.
  ///
  /// The publisher calls [`Subscriber::on_subscribe`] exactly once before
  /// returning, and delivers nothing before that. The returned link is the
  /// same one the subscriber was handed.
  fn subscribe<S>(&self, subscriber: S) -> Link
  where
    S: Subscriber<Self::Item, Self::Err> + Send + 'static;
}

/// Consumer helpers and operators available on every [`Publisher`].
pub trait PublisherExt: Publisher + Sized {
  /// Subscribe with unlimited demand.
  fn sink<N, C>(&self, mut receive_value: N, receive_completion: C) -> Link
  where
    N: FnMut(Self::Item) + Send + 'static,
    C: FnOnce(Completion<Self::Err>) + Send + 'static,
  {
    self.sink_with_demand(
      Demand::Unlimited,
      move |value| {
        receive_value(value);
        Demand::NONE
      },
      receive_completion,
    )
  }

  /// Subscribe with `initial` demand; the value handler returns the demand it
  /// grants on top.
  ///
  /// Requests made through the returned link are credited to the sink, which
  /// drops and reports any value delivered without demand.
  fn sink_with_demand<N, C>(&self, initial: Demand, receive_value: N, receive_completion: C) -> Link
  where
    N: FnMut(Self::Item) -> Demand + Send + 'static,
    C: FnOnce(Completion<Self::Err>) + Send + 'static,
  {
    let sink = Sink::new(initial, receive_value, receive_completion);
    let demand = sink.demand();
    demand.track(self.subscribe(sink))
  }

  /// Subscribe one value at a time. The value handler returns `true` to keep
  /// going or `false` to pause until [`PausableSink::resume`] is called.
  fn pausable_sink<N, C>(&self, receive_value: N, receive_completion: C) -> PausableSink
  where
    N: FnMut(Self::Item) -> bool + Send + 'static,
    C: FnOnce(Completion<Self::Err>) + Send + 'static,
  {
    PausableSink::subscribe(self, receive_value, receive_completion)
  }

  /// Share one upstream run among all subscribers, replaying up to `capacity`
  /// recent values to late joiners.
  fn share_replay(self, capacity: impl Into<Capacity>) -> ShareReplay<Self>
  where
    Self: Send + 'static,
    Self::Item: Clone + Send + 'static,
    Self::Err: Clone + Send + 'static,
  {
    ShareReplay::new(self, ReplayConfig::new(capacity.into()))
  }

  /// [`PublisherExt::share_replay`] with an explicit configuration.
  fn share_replay_with(self, config: ReplayConfig) -> ShareReplay<Self>
  where
    Self: Send + 'static,
    Self::Item: Clone + Send + 'static,
    Self::Err: Clone + Send + 'static,
  {
    ShareReplay::new(self, config)
  }
}

impl<P: Publisher> PublisherExt for P {}
