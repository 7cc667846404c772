//! Terminal signal of a link.

/// How a stream ended: normally, or with an upstream error.
///
/// A completion is delivered at most once per link and nothing is delivered
/// on that link afterwards.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Completion<Err> {
  Finished,
  Failed(Err),
}

impl<Err> Completion<Err> {
  #[inline]
  pub fn is_finished(&self) -> bool { matches!(self, Completion::Finished) }

  #[inline]
  pub fn is_failed(&self) -> bool { matches!(self, Completion::Failed(_)) }

  /// The error carried by a failed completion.
  pub fn error(&self) -> Option<&Err> {
    match self {
      Completion::Finished => None,
      Completion::Failed(err) => Some(err),
    }
  }

  /// Convert the error type while keeping the completion kind.
  pub fn map_err<E, F>(self, f: F) -> Completion<E>
  where
    F: FnOnce(Err) -> E,
  {
    match self {
      Completion::Finished => Completion::Finished,
      Completion::Failed(err) => Completion::Failed(f(err)),
    }
  }
}

impl<Err> From<Result<(), Err>> for Completion<Err> {
  fn from(result: Result<(), Err>) -> Self {
    match result {
      Ok(()) => Completion::Finished,
      Err(err) => Completion::Failed(err),
    }
  }
}
