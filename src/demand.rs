//! Demand: how many values a subscriber currently allows a publisher to send.
//!
//! A demand is either a finite count or unbounded. Adding demand saturates at
//! [`Demand::Unlimited`], consuming demand never goes below zero, and an
//! unlimited demand stays unlimited no matter how many values are delivered.

use std::{
  fmt::{Display, Formatter},
  ops::{Add, AddAssign, Sub, SubAssign},
};

/// Outstanding demand of a link.
///
/// Variants are declared in ascending order, so the derived `Ord` ranks every
/// finite demand below `Unlimited`.
///
/// ```rust
/// use rxdemand::prelude::*;
///
/// let mut demand = Demand::max(2) + Demand::max(1);
/// assert!(demand.consume_one());
/// assert_eq!(demand, Demand::max(2));
///
/// demand += Demand::Unlimited;
/// assert!(demand.consume_one());
/// assert!(demand.is_unlimited());
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Demand {
  /// At most this many more values.
  Max(usize),
  /// Any number of values.
  Unlimited,
}

impl Demand {
  /// No demand at all.
  pub const NONE: Demand = Demand::Max(0);

  #[inline]
  pub fn max(n: usize) -> Self { Demand::Max(n) }

  #[inline]
  pub fn unlimited() -> Self { Demand::Unlimited }

  #[inline]
  pub fn is_none(&self) -> bool { matches!(self, Demand::Max(0)) }

  #[inline]
  pub fn is_unlimited(&self) -> bool { matches!(self, Demand::Unlimited) }

  /// The finite count, or `None` when unlimited.
  #[inline]
  pub fn as_finite(&self) -> Option<usize> {
    match self {
      Demand::Max(n) => Some(*n),
      Demand::Unlimited => None,
    }
  }

  /// Spend one unit of demand for a delivered value.
  ///
  /// Returns `false` and leaves the demand untouched when it is already zero.
  #[inline]
  pub fn consume_one(&mut self) -> bool {
    match self {
      Demand::Unlimited => true,
      Demand::Max(0) => false,
      Demand::Max(n) => {
        *n -= 1;
        true
      }
    }
  }
}

impl Default for Demand {
  #[inline]
  fn default() -> Self { Demand::NONE }
}

impl From<usize> for Demand {
  #[inline]
  fn from(n: usize) -> Self { Demand::Max(n) }
}

impl Add for Demand {
  type Output = Demand;

  fn add(self, rhs: Demand) -> Demand {
    match (self, rhs) {
      (Demand::Max(a), Demand::Max(b)) => a.checked_add(b).map_or(Demand::Unlimited, Demand::Max),
      _ => Demand::Unlimited,
    }
  }
}

impl AddAssign for Demand {
  #[inline]
  fn add_assign(&mut self, rhs: Demand) { *self = *self + rhs; }
}

impl Sub<usize> for Demand {
  type Output = Demand;

  fn sub(self, rhs: usize) -> Demand {
    match self {
      Demand::Max(n) => Demand::Max(n.saturating_sub(rhs)),
      Demand::Unlimited => Demand::Unlimited,
    }
  }
}

impl SubAssign<usize> for Demand {
  #[inline]
  fn sub_assign(&mut self, rhs: usize) { *self = *self - rhs; }
}

impl Display for Demand {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    match self {
      Demand::Max(n) => write!(f, "max({n})"),
      Demand::Unlimited => f.write_str("unlimited"),
    }
  }
}
