//! # rxdemand: demand-driven reactive streams
//!
//! Publishers emit values only as fast as each subscriber asks for them.
//! Every subscription is a [`Link`] over which the subscriber requests
//! [`Demand`]; values beyond the outstanding demand are never delivered.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::{Arc, Mutex};
//!
//! use rxdemand::prelude::*;
//!
//! let upstream = Subject::<u32, ()>::new();
//! let shared = upstream.clone().share_replay(2);
//!
//! let seen = Arc::new(Mutex::new(vec![]));
//! let c_seen = seen.clone();
//! let link = shared.sink_with_demand(
//!   Demand::max(1),
//!   move |v| {
//!     c_seen.lock().unwrap().push(v);
//!     Demand::NONE
//!   },
//!   |_| {},
//! );
//!
//! upstream.send(1);
//! upstream.send(2);
//! assert_eq!(*seen.lock().unwrap(), vec![1]);
//!
//! // the second value waited in the link's own buffer
//! link.request(Demand::max(1));
//! assert_eq!(*seen.lock().unwrap(), vec![1, 2]);
//! ```
//!
//! ## Key Concepts
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Publisher`] | Something that can be subscribed to |
//! | [`Subscriber`] | Receives values, each answered with extra demand, then one completion |
//! | [`Link`] | Handle to request demand or cancel |
//! | [`ShareReplay`] | Multicast hub replaying recent values to late subscribers |
//! | [`Scheduler`] | Executor for time-based producers such as [`Timer`] |
//!
//! ## Feature Flags
//!
//! - **`futures-scheduler`** and **`timer`** (default): [`ThreadPoolScheduler`]
//! - **`tokio-scheduler`**: [`TokioScheduler`]
//! - **`strict-contract`**: protocol violations panic instead of being logged
//!
//! [`Link`]: subscription::Link
//! [`Demand`]: demand::Demand
//! [`Publisher`]: publisher::Publisher
//! [`Subscriber`]: subscriber::Subscriber
//! [`ShareReplay`]: ops::share_replay::ShareReplay
//! [`Scheduler`]: scheduler::Scheduler
//! [`Timer`]: publisher::timer::Timer
//! [`ThreadPoolScheduler`]: scheduler::ThreadPoolScheduler
//! [`TokioScheduler`]: scheduler::TokioScheduler

pub mod completion;
pub mod demand;
pub mod error;
pub mod ops;
pub mod prelude;
pub mod publisher;
pub mod replay_buffer;
pub mod scheduler;
pub mod subject;
pub mod subscriber;
pub mod subscription;

#[cfg(test)]
mod test_util;

pub use prelude::*;
