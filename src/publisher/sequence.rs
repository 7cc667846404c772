use crate::{
  completion::Completion,
  publisher::Publisher,
  replay_buffer::{Capacity, ReplayBuffer},
  subscriber::Subscriber,
  subscription::{
    buffered::{BufferedSubscription, OnCancel},
    Link,
  },
};

/// Creates a publisher that emits `items` in order, strictly on demand, and
/// then finishes.
///
/// Every subscriber gets its own run over its own copy of the values.
///
/// ```rust
/// use std::sync::{Arc, Mutex};
///
/// use rxdemand::prelude::*;
///
/// let seen = Arc::new(Mutex::new(vec![]));
/// let c_seen = seen.clone();
/// sequence::<_, ()>(vec![1, 2, 3]).sink_with_demand(
///   Demand::max(2),
///   move |v| {
///     c_seen.lock().unwrap().push(v);
///     Demand::NONE
///   },
///   |_| {},
/// );
/// assert_eq!(*seen.lock().unwrap(), vec![1, 2]);
/// ```
pub fn sequence<Item, Err>(items: impl IntoIterator<Item = Item>) -> Sequence<Item, Err> {
  Sequence::new(items)
}

#[derive(Clone, Debug)]
pub struct Sequence<Item, Err> {
  items: Vec<Item>,
  completion: Completion<Err>,
}

impl<Item, Err> Sequence<Item, Err> {
  pub fn new(items: impl IntoIterator<Item = Item>) -> Self {
    Sequence { items: items.into_iter().collect(), completion: Completion::Finished }
  }

  /// Replace the completion sent after the last value.
  pub fn ending_with(mut self, completion: Completion<Err>) -> Self {
    self.completion = completion;
    self
  }

  pub fn len(&self) -> usize { self.items.len() }

  pub fn is_empty(&self) -> bool { self.items.is_empty() }
}

impl<Item, Err> Publisher for Sequence<Item, Err>
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
    let buffer = ReplayBuffer::with_items(Capacity::Unbounded, self.items.iter().cloned());
    BufferedSubscription::new(buffer, Some(self.completion.clone()), OnCancel::Silent)
      .attach(Box::new(subscriber))
  }
}
