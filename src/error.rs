//! Error types and protocol-violation reporting.
//!
//! Upstream failures travel as [`Completion::Failed`] values and never show up
//! here. This module covers the two other kinds of trouble: invalid
//! configuration, reported as [`Error`], and collaborators that break the
//! demand protocol, reported as [`ProtocolViolation`].
//!
//! [`Completion::Failed`]: crate::completion::Completion::Failed

use std::time::Duration;

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
  /// A repeating timer needs a positive period.
  #[error("timer interval must be greater than zero, got {0:?}")]
  InvalidInterval(Duration),
}

/// A collaborator broke the demand protocol.
///
/// These indicate bugs in a publisher or subscriber, not runtime conditions.
/// The offending signal is always dropped. By default the violation is logged;
/// with the `strict-contract` feature it panics instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolViolation {
  #[error("value delivered without outstanding demand")]
  UnrequestedDelivery,
  #[error("value delivered after the link terminated")]
  DeliveryAfterTermination,
  #[error("completion delivered more than once")]
  DuplicateCompletion,
  #[error("value delivered while a previous delivery to the same subscriber was in progress")]
  ReentrantDelivery,
}

#[cfg(not(feature = "strict-contract"))]
pub(crate) fn report_violation(violation: ProtocolViolation) {
  log::warn!("protocol violation ignored: {violation}");
}

#[cfg(feature = "strict-contract")]
pub(crate) fn report_violation(violation: ProtocolViolation) {
  panic!("protocol violation: {violation}");
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn messages() {
    assert_eq!(
      Error::InvalidInterval(Duration::ZERO).to_string(),
      "timer interval must be greater than zero, got 0ns"
    );
    assert_eq!(
      ProtocolViolation::UnrequestedDelivery.to_string(),
      "value delivered without outstanding demand"
    );
  }
}
