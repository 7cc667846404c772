//! Links: the stateful channel between one publisher and one subscriber.
//!
//! A publisher hands every subscriber a [`Link`]. The subscriber pulls values
//! with [`Link::request`] and withdraws with [`Link::cancel`]. Both calls are
//! cheap, never block on another subscriber, and are no-ops once the link has
//! terminated.

use std::{
  fmt::{Debug, Formatter},
  sync::Arc,
};

use crate::demand::Demand;

pub(crate) mod buffered;

/// Producer-side implementation behind a [`Link`].
pub trait Subscription: Send + Sync {
  /// Ask for up to `demand` more values. Zero demand is a no-op.
  fn request(&self, demand: Demand);

  /// Stop delivery and release resources. Idempotent.
  fn cancel(&self);

  /// `true` once the link is cancelled or completed.
  fn is_closed(&self) -> bool;
}

/// Lifecycle of a link.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LinkStatus {
  Active,
  Cancelled,
  Completed,
}

impl LinkStatus {
  #[inline]
  pub fn is_terminal(&self) -> bool { !matches!(self, LinkStatus::Active) }
}

/// Type-erased, cloneable handle to a [`Subscription`].
///
/// All clones refer to the same link: cancelling through one cancels it for
/// every holder.
#[derive(Clone)]
pub struct Link(Arc<dyn Subscription>);

impl Link {
  pub fn new<S: Subscription + 'static>(subscription: S) -> Self { Link(Arc::new(subscription)) }

  pub fn from_arc(subscription: Arc<dyn Subscription>) -> Self { Link(subscription) }

  /// A link that is already closed. Requests and cancels do nothing.
  pub fn closed() -> Self { Link::new(ClosedSubscription) }

  #[inline]
  pub fn request(&self, demand: Demand) { self.0.request(demand) }

  #[inline]
  pub fn cancel(&self) { self.0.cancel() }

  #[inline]
  pub fn is_closed(&self) -> bool { self.0.is_closed() }

  /// Whether both handles point at the same link.
  pub fn same_link(&self, other: &Link) -> bool { Arc::ptr_eq(&self.0, &other.0) }

  /// Activates "RAII" behavior for this link: it is cancelled as soon as the
  /// returned guard goes out of scope.
  ///
  /// **Attention:** if you don't bind the guard to a variable, the link is
  /// cancelled immediately.
  pub fn cancel_when_dropped(self) -> LinkGuard { LinkGuard(self) }
}

impl Debug for Link {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Link")
      .field("is_closed", &self.is_closed())
      .finish()
  }
}

struct ClosedSubscription;

impl Subscription for ClosedSubscription {
  fn request(&self, _demand: Demand) {}

  fn cancel(&self) {}

  fn is_closed(&self) -> bool { true }
}

/// Cancels its link when dropped.
#[derive(Debug)]
#[must_use]
pub struct LinkGuard(Link);

impl LinkGuard {
  pub fn new(link: Link) -> Self { LinkGuard(link) }

  pub fn link(&self) -> &Link { &self.0 }
}

impl Drop for LinkGuard {
  #[inline]
  fn drop(&mut self) { self.0.cancel() }
}
