//! Core engine: latest-prediction selection and the vote lifecycle.

pub mod clock;
pub mod selector;
pub mod lifecycle;

pub use clock::{Clock, ManualClock, SystemClock};
pub use lifecycle::{score_delta, Resolution, VoteEngine};
