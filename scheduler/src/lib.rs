//! Burst Transmission Scheduler Library
//!
//! The real-time core of the transceiver bridge: the time-ordered
//! transmit queue, the deadline-clock/latency control loop that drains
//! it against the radio's hardware clock, the control channel handler,
//! the ingress decoder and the upstream relay/notification paths.

pub mod control;
pub mod ingress;
pub mod latency;
pub mod notifier;
pub mod queue;
pub mod relay;
pub mod state;
pub mod transmit;

#[cfg(test)]
pub mod testutil;

use common::Timestamp;
use thiserror::Error;

/// Scheduler errors
#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("duplicate burst for timestamp {0}")]
    DuplicateBurst(Timestamp),

    #[error("interface error: {0}")]
    Interface(#[from] interfaces::InterfaceError),
}
