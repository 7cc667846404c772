//! Recording subscriber shared by the unit tests.

use std::sync::{
  atomic::{AtomicUsize, Ordering},
  Arc,
};

use parking_lot::Mutex;

use crate::{completion::Completion, demand::Demand, subscriber::Subscriber, subscription::Link};

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Event<Item, Err> {
  Value(Item),
  Done(Completion<Err>),
}

pub(crate) struct Events<Item, Err> {
  log: Arc<Mutex<Vec<Event<Item, Err>>>>,
  max_depth: Arc<AtomicUsize>,
  link: Arc<Mutex<Option<Link>>>,
}

impl<Item: Clone, Err: Clone> Events<Item, Err> {
  pub(crate) fn all(&self) -> Vec<Event<Item, Err>> { self.log.lock().clone() }

  pub(crate) fn is_empty(&self) -> bool { self.log.lock().is_empty() }

  pub(crate) fn values(&self) -> Vec<Item> {
    self
      .log
      .lock()
      .iter()
      .filter_map(|e| match e {
        Event::Value(v) => Some(v.clone()),
        Event::Done(_) => None,
      })
      .collect()
  }

  pub(crate) fn completions(&self) -> Vec<Completion<Err>> {
    self
      .log
      .lock()
      .iter()
      .filter_map(|e| match e {
        Event::Done(c) => Some(c.clone()),
        Event::Value(_) => None,
      })
      .collect()
  }

  /// Deepest nesting of `receive` calls seen so far.
  pub(crate) fn max_depth(&self) -> usize { self.max_depth.load(Ordering::SeqCst) }

  /// The link the recorder was handed.
  pub(crate) fn link(&self) -> Link { self.link.lock().clone().unwrap_or_else(Link::closed) }
}

pub(crate) struct Recorder<Item, Err> {
  log: Arc<Mutex<Vec<Event<Item, Err>>>>,
  depth: Arc<AtomicUsize>,
  max_depth: Arc<AtomicUsize>,
  link: Arc<Mutex<Option<Link>>>,
  initial: Demand,
  grant: Demand,
  cancel_after: Option<usize>,
  request_in_callback: Demand,
  received: usize,
}

impl<Item, Err> Recorder<Item, Err> {
  pub(crate) fn new(initial: Demand) -> (Self, Events<Item, Err>) {
    let log = Arc::new(Mutex::new(vec![]));
    let depth = Arc::new(AtomicUsize::new(0));
    let max_depth = Arc::new(AtomicUsize::new(0));
    let link = Arc::new(Mutex::new(None));
    let events = Events {
      log: log.clone(),
      max_depth: max_depth.clone(),
      link: link.clone(),
    };
    let recorder = Recorder {
      log,
      depth,
      max_depth,
      link,
      initial,
      grant: Demand::NONE,
      cancel_after: None,
      request_in_callback: Demand::NONE,
      received: 0,
    };
    (recorder, events)
  }

  /// Return `grant` from every `receive`.
  pub(crate) fn granting(mut self, grant: Demand) -> Self {
    self.grant = grant;
    self
  }

  /// Cancel the link from inside the `n`th `receive`.
  pub(crate) fn cancelling_after(mut self, n: usize) -> Self {
    self.cancel_after = Some(n);
    self
  }

  /// Call `link.request(demand)` from inside every `receive`.
  pub(crate) fn requesting_in_callback(mut self, demand: Demand) -> Self {
    self.request_in_callback = demand;
    self
  }

  fn current_link(&self) -> Option<Link> { self.link.lock().clone() }
}

impl<Item, Err> Subscriber<Item, Err> for Recorder<Item, Err> {
  fn on_subscribe(&mut self, link: &Link) {
    *self.link.lock() = Some(link.clone());
    link.request(self.initial);
  }

  fn receive(&mut self, value: Item) -> Demand {
    let depth = self.depth.fetch_add(1, Ordering::SeqCst) + 1;
    self.max_depth.fetch_max(depth, Ordering::SeqCst);
    self.log.lock().push(Event::Value(value));
    self.received += 1;

    if let Some(link) = self.current_link() {
      if !self.request_in_callback.is_none() {
        link.request(self.request_in_callback);
      }
      if self.cancel_after == Some(self.received) {
        link.cancel();
      }
    }
    self.depth.fetch_sub(1, Ordering::SeqCst);
    self.grant
  }

  fn receive_completion(&mut self, completion: Completion<Err>) {
    self.log.lock().push(Event::Done(completion));
  }
}
