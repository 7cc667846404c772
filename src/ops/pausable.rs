//! A sink that pulls one value at a time and can pause itself.
//!
//! The value handler answers `true` to ask for the next value or `false` to
//! pause. While paused the upstream link has no outstanding demand at all;
//! [`PausableSink::resume`] asks for exactly one more value.
//!
//! ```rust
//! use std::sync::{Arc, Mutex};
//!
//! use rxdemand::prelude::*;
//!
//! let seen = Arc::new(Mutex::new(vec![]));
//! let c_seen = seen.clone();
//! let sink = sequence::<_, ()>(1..=4).pausable_sink(
//!   move |v| {
//!     c_seen.lock().unwrap().push(v);
//!     v != 2
//!   },
//!   |_| {},
//! );
//! assert!(sink.is_paused());
//! assert_eq!(*seen.lock().unwrap(), vec![1, 2]);
//!
//! sink.resume();
//! assert_eq!(*seen.lock().unwrap(), vec![1, 2, 3, 4]);
//! ```

use std::sync::Arc;

use parking_lot::Mutex;

use crate::{
  completion::Completion,
  demand::Demand,
  error::{report_violation, ProtocolViolation},
  publisher::Publisher,
  subscriber::Subscriber,
  subscription::Link,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
  Unsubscribed,
  Active,
  Completed,
  Cancelled,
}

struct PauseState {
  phase: Phase,
  paused: bool,
  demand: Demand,
  upstream: Option<Link>,
}

/// Handle to a pausable subscription.
///
/// Dropping the handle does not cancel the subscription.
#[derive(Clone)]
pub struct PausableSink {
  state: Arc<Mutex<PauseState>>,
}

impl PausableSink {
  pub(crate) fn subscribe<P, N, C>(publisher: &P, receive_value: N, receive_completion: C) -> Self
  where
    P: Publisher,
    N: FnMut(P::Item) -> bool + Send + 'static,
    C: FnOnce(Completion<P::Err>) + Send + 'static,
  {
    let state = Arc::new(Mutex::new(PauseState {
      phase: Phase::Unsubscribed,
      paused: false,
      demand: Demand::NONE,
      upstream: None,
    }));
    publisher.subscribe(PauseSubscriber {
      state: state.clone(),
      receive_value,
      receive_completion: Some(receive_completion),
    });
    PausableSink { state }
  }

  /// Ask for one more value. Does nothing unless the sink is paused.
  pub fn resume(&self) {
    let upstream = {
      let mut state = self.state.lock();
      if !state.paused || state.phase != Phase::Active {
        return;
      }
      state.paused = false;
      state.demand += Demand::max(1);
      state.upstream.clone()
    };
    if let Some(link) = upstream {
      link.request(Demand::max(1));
    }
  }

  pub fn is_paused(&self) -> bool { self.state.lock().paused }

  /// `true` once the sink has been completed or cancelled.
  pub fn is_closed(&self) -> bool {
    matches!(self.state.lock().phase, Phase::Completed | Phase::Cancelled)
  }

  /// Release the upstream link. No callback fires afterwards.
  pub fn cancel(&self) {
    let upstream = {
      let mut state = self.state.lock();
      if matches!(state.phase, Phase::Completed | Phase::Cancelled) {
        return;
      }
      state.phase = Phase::Cancelled;
      state.paused = false;
      state.demand = Demand::NONE;
      state.upstream.take()
    };
    if let Some(link) = upstream {
      link.cancel();
    }
  }
}

struct PauseSubscriber<N, C> {
  state: Arc<Mutex<PauseState>>,
  receive_value: N,
  receive_completion: Option<C>,
}

impl<Item, Err, N, C> Subscriber<Item, Err> for PauseSubscriber<N, C>
where
  N: FnMut(Item) -> bool,
  C: FnOnce(Completion<Err>),
{
  fn on_subscribe(&mut self, link: &Link) {
    {
      let mut state = self.state.lock();
      if state.phase != Phase::Unsubscribed {
        return;
      }
      state.phase = Phase::Active;
      state.demand = Demand::max(1);
      state.upstream = Some(link.clone());
    }
    link.request(Demand::max(1));
  }

  fn receive(&mut self, value: Item) -> Demand {
    {
      let mut state = self.state.lock();
      match state.phase {
        Phase::Active => {}
        Phase::Cancelled => {
          log::trace!("value after cancel dropped");
          return Demand::NONE;
        }
        Phase::Unsubscribed | Phase::Completed => {
          report_violation(ProtocolViolation::DeliveryAfterTermination);
          return Demand::NONE;
        }
      }
      if !state.demand.consume_one() {
        report_violation(ProtocolViolation::UnrequestedDelivery);
        return Demand::NONE;
      }
    }

    let more = (self.receive_value)(value);

    let mut state = self.state.lock();
    if state.phase != Phase::Active {
      return Demand::NONE;
    }
    if more {
      state.demand += Demand::max(1);
      Demand::max(1)
    } else {
      state.paused = true;
      Demand::NONE
    }
  }

  fn receive_completion(&mut self, completion: Completion<Err>) {
    let upstream = {
      let mut state = self.state.lock();
      match state.phase {
        Phase::Active => {}
        Phase::Cancelled => return,
        Phase::Unsubscribed | Phase::Completed => {
          report_violation(ProtocolViolation::DuplicateCompletion);
          return;
        }
      }
      state.phase = Phase::Completed;
      state.paused = false;
      state.demand = Demand::NONE;
      state.upstream.take()
    };
    drop(upstream);
    if let Some(handler) = self.receive_completion.take() {
      handler(completion);
    }
  }
}
