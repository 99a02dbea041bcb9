//! Adaptive Transmit Latency Controller
//!
//! Tunes the gap between the hardware clock and the deadline clock to
//! the smallest value that avoids underrun. Increases react quickly to
//! starvation; decreases wait for a long underrun-free window so the
//! latency does not thrash.

use common::SLOTS_PER_FRAME;
use tracing::debug;

/// Latency controller tuning parameters, all in slots
#[derive(Debug, Clone)]
pub struct LatencyConfig {
    /// Starting latency
    pub initial_slots: u64,
    /// Hard floor, never below one slot
    pub min_slots: u64,
    /// Hard cap
    pub max_slots: u64,
    /// Minimum slots between consecutive latency increases (W1)
    pub increase_window: u64,
    /// Underrun-free slots required before a decrease (W2, > W1)
    pub decrease_window: u64,
}

impl Default for LatencyConfig {
    fn default() -> Self {
        Self {
            initial_slots: 2 * SLOTS_PER_FRAME as u64,
            min_slots: 1,
            max_slots: 15 * SLOTS_PER_FRAME as u64,
            increase_window: 10 * SLOTS_PER_FRAME as u64,
            decrease_window: 100 * SLOTS_PER_FRAME as u64,
        }
    }
}

/// Hysteresis policy over underrun observations.
///
/// Pure state machine: the only inputs are the underrun flag and the
/// current hardware slot count, the only output is the latency value.
pub struct LatencyController {
    config: LatencyConfig,
    latency: u64,
    last_change: Option<u64>,
    last_underrun: Option<u64>,
}

impl LatencyController {
    /// Create a controller at the configured initial latency
    pub fn new(config: LatencyConfig) -> Self {
        let latency = config
            .initial_slots
            .clamp(config.min_slots, config.max_slots);
        Self {
            config,
            latency,
            last_change: None,
            last_underrun: None,
        }
    }

    /// Current latency in slots
    pub fn latency_slots(&self) -> u64 {
        self.latency
    }

    /// Feed one observation taken at hardware slot `now`.
    ///
    /// Returns the new latency if it changed.
    pub fn observe(&mut self, underrun: bool, now: u64) -> Option<u64> {
        if underrun {
            self.last_underrun = Some(now);
            let window_open = self
                .last_change
                .map_or(true, |c| now.saturating_sub(c) >= self.config.increase_window);
            if window_open && self.latency < self.config.max_slots {
                self.latency += 1;
                self.last_change = Some(now);
                debug!("latency increased to {} slots", self.latency);
                return Some(self.latency);
            }
        } else if self.latency > self.config.min_slots {
            let quiet_since = self.last_underrun.unwrap_or(0).max(self.last_change.unwrap_or(0));
            if now.saturating_sub(quiet_since) >= self.config.decrease_window {
                self.latency -= 1;
                self.last_change = Some(now);
                debug!("latency decreased to {} slots", self.latency);
                return Some(self.latency);
            }
        }
        None
    }
}
