//! Prelude module for convenient imports.

pub use crate::{
  completion::Completion,
  demand::Demand,
  error::{Error, ProtocolViolation},
  ops::{
    pausable::PausableSink,
    share_replay::{ReplayConfig, ShareReplay},
  },
  publisher::{
    sequence::{sequence, Sequence},
    timer::{Timer, TimerConfig},
    Publisher, PublisherExt,
  },
  replay_buffer::{Capacity, ReplayBuffer},
  scheduler::{Duration, Instant, RepeatingTask, Scheduler, TaskHandle, TestScheduler},
  subject::Subject,
  subscriber::{BoxedSubscriber, Sink, SinkDemand, Subscriber},
  subscription::{Link, LinkGuard, LinkStatus, Subscription},
};
#[cfg(all(feature = "futures-scheduler", feature = "timer"))]
pub use crate::scheduler::ThreadPoolScheduler;
#[cfg(feature = "tokio-scheduler")]
pub use crate::scheduler::TokioScheduler;
