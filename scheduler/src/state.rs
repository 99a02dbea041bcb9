//! Shared Transceiver State
//!
//! Radio configuration and the published deadline clock, owned behind
//! locks so the control handler can mutate while the real-time loops
//! read without torn values. Shutdown is a watch channel observed at
//! every blocking-call boundary.

use common::Timestamp;
use std::sync::Arc;
use tokio::sync::{watch, RwLock};

/// Radio configuration and power state.
///
/// Mutated only by the control channel handler; the other loops read
/// snapshots through [`SharedState`].
#[derive(Debug, Clone, Default)]
pub struct RadioState {
    /// Transceiver powered on
    pub power_on: bool,
    /// Transmit frequency in kHz, zero until tuned
    pub tx_freq_khz: f64,
    /// Receive frequency in kHz, zero until tuned
    pub rx_freq_khz: f64,
    /// Transmit power attenuation in dB
    pub tx_atten_db: f64,
    /// Receive gain in dB
    pub rx_gain_db: f64,
    /// Local oscillator trim
    pub freq_offset: f64,
}

impl RadioState {
    /// Both frequencies tuned, precondition for POWERON
    pub fn frequencies_set(&self) -> bool {
        self.tx_freq_khz != 0.0 && self.rx_freq_khz != 0.0
    }
}

/// Cloneable handle on the state shared between the service loops
#[derive(Clone)]
pub struct SharedState {
    radio: Arc<RwLock<RadioState>>,
    deadline: Arc<RwLock<Timestamp>>,
}

impl SharedState {
    /// Fresh state: powered off, untuned, deadline at frame zero
    pub fn new() -> Self {
        Self {
            radio: Arc::new(RwLock::new(RadioState::default())),
            deadline: Arc::new(RwLock::new(Timestamp::from_slots(0))),
        }
    }

    /// Snapshot of the radio state
    pub async fn radio(&self) -> RadioState {
        self.radio.read().await.clone()
    }

    /// Mutate the radio state; control handler only
    pub async fn update_radio<F: FnOnce(&mut RadioState)>(&self, f: F) {
        let mut state = self.radio.write().await;
        f(&mut state);
    }

    /// Deadline clock as last published by the burst scheduler
    pub async fn deadline(&self) -> Timestamp {
        *self.deadline.read().await
    }

    /// Publish a new deadline clock value; scheduler loop only
    pub async fn publish_deadline(&self, deadline: Timestamp) {
        *self.deadline.write().await = deadline;
    }
}

impl Default for SharedState {
    fn default() -> Self {
        Self::new()
    }
}

/// Create a shutdown signal pair.
///
/// Loops hold the receiver and exit at their next blocking boundary
/// once `trigger_shutdown` flips the flag.
pub fn shutdown_channel() -> (watch::Sender<bool>, watch::Receiver<bool>) {
    watch::channel(false)
}

/// Signal all loops to terminate
pub fn trigger_shutdown(tx: &watch::Sender<bool>) {
    let _ = tx.send(true);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_frequencies_gate_power_on() {
        let shared = SharedState::new();
        assert!(!shared.radio().await.frequencies_set());

        shared.update_radio(|s| s.tx_freq_khz = 890_000.0).await;
        assert!(!shared.radio().await.frequencies_set());

        shared.update_radio(|s| s.rx_freq_khz = 935_000.0).await;
        assert!(shared.radio().await.frequencies_set());
    }

    #[tokio::test]
    async fn test_deadline_publication() {
        let shared = SharedState::new();
        let t = Timestamp::new(12, 4).unwrap();
        shared.publish_deadline(t).await;
        assert_eq!(shared.deadline().await, t);
    }
}
