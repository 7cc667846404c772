//! Bounded backlog of the most recent values.

use std::collections::VecDeque;

/// Maximum number of values a replay buffer retains.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Capacity {
  Bounded(usize),
  Unbounded,
}

impl Capacity {
  #[inline]
  pub fn allows(&self, len: usize) -> bool {
    match self {
      Capacity::Bounded(max) => len <= *max,
      Capacity::Unbounded => true,
    }
  }
}

impl From<usize> for Capacity {
  #[inline]
  fn from(n: usize) -> Self { Capacity::Bounded(n) }
}

impl Default for Capacity {
  #[inline]
  fn default() -> Self { Capacity::Unbounded }
}

/// Ordered values, oldest first, never longer than its capacity once trimmed.
#[derive(Clone, Debug)]
pub struct ReplayBuffer<T> {
  items: VecDeque<T>,
  capacity: Capacity,
}

impl<T> ReplayBuffer<T> {
  pub fn new(capacity: Capacity) -> Self { ReplayBuffer { items: VecDeque::new(), capacity } }

  /// A buffer pre-filled with `items`, trimmed to `capacity`.
  pub fn with_items<I: IntoIterator<Item = T>>(capacity: Capacity, items: I) -> Self {
    let mut buffer = ReplayBuffer { items: items.into_iter().collect(), capacity };
    buffer.trim();
    buffer
  }

  #[inline]
  pub fn capacity(&self) -> Capacity { self.capacity }

  #[inline]
  pub fn len(&self) -> usize { self.items.len() }

  #[inline]
  pub fn is_empty(&self) -> bool { self.items.is_empty() }

  /// Append `value`, evicting the oldest entries past capacity.
  pub fn push(&mut self, value: T) {
    self.items.push_back(value);
    self.trim();
  }

  /// Append without evicting. Call [`ReplayBuffer::trim`] afterwards.
  pub(crate) fn stage(&mut self, value: T) { self.items.push_back(value); }

  /// Evict the oldest entries until the capacity holds again.
  pub fn trim(&mut self) {
    while !self.capacity.allows(self.items.len()) {
      self.items.pop_front();
    }
  }

  #[inline]
  pub fn pop_front(&mut self) -> Option<T> { self.items.pop_front() }

  pub fn clear(&mut self) { self.items.clear(); }

  pub fn iter(&self) -> impl Iterator<Item = &T> { self.items.iter() }
}

impl<T: Clone> ReplayBuffer<T> {
  /// Independent copy of the current contents.
  pub fn snapshot(&self) -> ReplayBuffer<T> { self.clone() }
}
