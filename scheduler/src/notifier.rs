//! Clock Notifier
//!
//! Sends `IND CLOCK <frame>` indications upstream so the baseband core
//! can track the deadline clock. Invoked periodically by the burst
//! scheduler, per command by the control handler, and ad hoc on stale
//! eviction and ingress staleness.

use crate::state::SharedState;
use common::Timestamp;
use interfaces::channels::UdpChannel;
use interfaces::wire;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Frames added to the reported frame number so the core schedules
/// comfortably ahead of the deadline clock.
const CLOCK_IND_MARGIN_FRAMES: u32 = 2;

/// Shared handle for sending clock indications
#[derive(Clone)]
pub struct ClockNotifier {
    channel: Arc<UdpChannel>,
    shared: SharedState,
    last_sent: Arc<RwLock<Option<Timestamp>>>,
}

impl ClockNotifier {
    /// Create a notifier writing to the clock channel
    pub fn new(channel: Arc<UdpChannel>, shared: SharedState) -> Self {
        Self {
            channel,
            shared,
            last_sent: Arc::new(RwLock::new(None)),
        }
    }

    /// Send one indication carrying the current deadline frame.
    ///
    /// Best effort: a send failure is logged, never propagated, since a
    /// lost indication is recovered by the next one.
    pub async fn send(&self) {
        let deadline = self.shared.deadline().await;
        let line = wire::format_clock_ind(deadline.frame() + CLOCK_IND_MARGIN_FRAMES);
        match self.channel.send(line.as_bytes()).await {
            Ok(()) => {
                debug!("sent clock indication at deadline {}", deadline);
                *self.last_sent.write().await = Some(deadline);
            }
            Err(e) => warn!("failed to send clock indication: {}", e),
        }
    }

    /// Deadline at which the last indication went out
    pub async fn last_sent(&self) -> Option<Timestamp> {
        *self.last_sent.read().await
    }
}
