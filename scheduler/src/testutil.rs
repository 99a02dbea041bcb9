//! Test doubles shared by the scheduler tests

use crate::notifier::ClockNotifier;
use crate::state::SharedState;
use async_trait::async_trait;
use common::{ReceivedBurst, Timestamp};
use interfaces::channels::UdpChannel;
use interfaces::radio::{ClockDriver, RadioDevice, SlotClock};
use interfaces::InterfaceError;
use num_complex::Complex32;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::net::UdpSocket;

/// Scripted radio device: the clock is driven by the test, every
/// transmit is recorded, and tune/underrun behavior is controllable.
pub struct MockRadio {
    driver: ClockDriver,
    clock: SlotClock,
    started: AtomicBool,
    fail_tune: AtomicBool,
    underrun: AtomicBool,
    transmissions: Mutex<Vec<(Timestamp, bool)>>,
    rx_bursts: Mutex<VecDeque<ReceivedBurst>>,
}

impl MockRadio {
    pub fn new() -> Arc<Self> {
        let (driver, clock) = ClockDriver::new();
        Arc::new(Self {
            driver,
            clock,
            started: AtomicBool::new(false),
            fail_tune: AtomicBool::new(false),
            underrun: AtomicBool::new(false),
            transmissions: Mutex::new(Vec::new()),
            rx_bursts: Mutex::new(VecDeque::new()),
        })
    }

    /// Advance the hardware clock by `n` slots
    pub fn tick_slots(&self, n: u64) {
        for _ in 0..n {
            self.driver.tick();
        }
    }

    /// Bypass `start()` for tests that exercise the loops directly
    pub fn mark_started(&self) {
        self.started.store(true, Ordering::SeqCst);
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    /// Make subsequent tune calls fail
    pub fn fail_tuning(&self) {
        self.fail_tune.store(true, Ordering::SeqCst);
    }

    /// Raise the underrun flag for the next poll
    pub fn raise_underrun(&self) {
        self.underrun.store(true, Ordering::SeqCst);
    }

    /// Queue a burst for `receive()` to return
    pub fn push_rx(&self, burst: ReceivedBurst) {
        self.rx_bursts.lock().unwrap().push_back(burst);
    }

    /// Everything transmitted so far, in order
    pub fn transmitted(&self) -> Vec<(Timestamp, bool)> {
        self.transmissions.lock().unwrap().clone()
    }
}

#[async_trait]
impl RadioDevice for MockRadio {
    async fn start(&self) -> Result<(), InterfaceError> {
        self.started.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn tune_tx(&self, _freq_khz: f64) -> Result<(), InterfaceError> {
        if self.fail_tune.load(Ordering::SeqCst) {
            return Err(InterfaceError::TuneFailed("tx out of range".to_string()));
        }
        Ok(())
    }

    async fn tune_rx(&self, _freq_khz: f64) -> Result<(), InterfaceError> {
        if self.fail_tune.load(Ordering::SeqCst) {
            return Err(InterfaceError::TuneFailed("rx out of range".to_string()));
        }
        Ok(())
    }

    async fn set_rx_gain(&self, gain_db: f64) -> Result<f64, InterfaceError> {
        Ok(gain_db)
    }

    async fn set_power_attenuation(&self, _atten_db: f64) -> Result<(), InterfaceError> {
        Ok(())
    }

    async fn set_freq_offset(&self, _offset: f64) -> Result<(), InterfaceError> {
        Ok(())
    }

    async fn transmit(
        &self,
        _samples: &[Complex32],
        deadline: Timestamp,
        filler: bool,
    ) -> Result<(), InterfaceError> {
        self.transmissions.lock().unwrap().push((deadline, filler));
        Ok(())
    }

    async fn receive(&self) -> Result<Option<ReceivedBurst>, InterfaceError> {
        Ok(self.rx_bursts.lock().unwrap().pop_front())
    }

    fn take_underrun(&self) -> bool {
        self.underrun.swap(false, Ordering::SeqCst)
    }

    fn slot_clock(&self) -> SlotClock {
        self.clock.clone()
    }
}

/// Bind a loopback UDP pair and wrap the near side in a channel
pub async fn channel_pair(name: &'static str) -> (Arc<UdpChannel>, UdpSocket) {
    let peer = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let channel = UdpChannel::bind(
        name,
        "127.0.0.1:0".parse().unwrap(),
        peer.local_addr().unwrap(),
    )
    .await
    .unwrap();
    peer.connect(channel.local_addr().unwrap()).await.unwrap();
    (Arc::new(channel), peer)
}

/// A notifier wired to a loopback clock channel; returns the peer socket
/// so tests can count the indications that arrive.
pub async fn clock_sink(shared: SharedState) -> (ClockNotifier, UdpSocket) {
    let (channel, peer) = channel_pair("clock").await;
    (ClockNotifier::new(channel, shared), peer)
}
