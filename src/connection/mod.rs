//! Session supervision with exponential backoff.
//!
//! The [`ConnectionManager`] opens a session, hands it to the
//! [`FrameProcessor`](crate::detection::FrameProcessor), and reconnects
//! whenever the processor reports that the stream was lost.
//!
//! ```text
//! Opening --ok--> Streaming --user exit--> done
//!    |               |
//!    +--fail--> Backoff <--read failure / fault
//!                  |
//!                  +--retries left--> Opening
//!                  +--exhausted-----> done
//! ```

mod manager;
mod retry;

pub use manager::{ConnectionManager, ConnectionStats, RunOutcome};
pub use retry::{RetryPolicy, RetryState};
