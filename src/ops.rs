//! Operators built on the demand protocol.

pub mod pausable;
pub mod share_replay;
