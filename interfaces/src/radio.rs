//! Abstract Radio Device Interface
//!
//! The scheduler core drives the radio exclusively through this trait, so
//! a hardware driver, the ZeroMQ virtual radio and test doubles are all
//! interchangeable.

use crate::InterfaceError;
use async_trait::async_trait;
use common::{ReceivedBurst, Timestamp};
use num_complex::Complex32;
use tokio::sync::watch;

/// Read side of the hardware slot clock.
///
/// The clock counts absolute slots since device start. `advanced()`
/// blocks until the counter moves; consecutive ticks may be coalesced,
/// so callers must service every slot between the last observed value
/// and the returned one.
#[derive(Clone)]
pub struct SlotClock {
    rx: watch::Receiver<u64>,
}

impl SlotClock {
    /// Current hardware slot count
    pub fn now(&self) -> u64 {
        *self.rx.borrow()
    }

    /// Wait for the hardware clock to advance, returning the new count
    pub async fn advanced(&mut self) -> Result<u64, InterfaceError> {
        self.rx
            .changed()
            .await
            .map_err(|_| InterfaceError::DeviceStopped)?;
        Ok(*self.rx.borrow())
    }
}

/// Write side of the hardware slot clock, owned by the device driver
pub struct ClockDriver {
    tx: watch::Sender<u64>,
}

impl ClockDriver {
    /// Create a clock pair starting at slot zero
    pub fn new() -> (Self, SlotClock) {
        let (tx, rx) = watch::channel(0u64);
        (Self { tx }, SlotClock { rx })
    }

    /// Advance the clock by one slot
    pub fn tick(&self) {
        self.tx.send_modify(|slots| *slots += 1);
    }

    /// Current slot count
    pub fn now(&self) -> u64 {
        *self.tx.borrow()
    }

    /// A new read handle on this clock
    pub fn subscribe(&self) -> SlotClock {
        SlotClock {
            rx: self.tx.subscribe(),
        }
    }
}

/// Contract between the scheduler core and a radio device driver
#[async_trait]
pub trait RadioDevice: Send + Sync {
    /// Start streaming; must be called before transmit/receive
    async fn start(&self) -> Result<(), InterfaceError>;

    /// Tune the transmit chain, frequency in kHz
    async fn tune_tx(&self, freq_khz: f64) -> Result<(), InterfaceError>;

    /// Tune the receive chain, frequency in kHz
    async fn tune_rx(&self, freq_khz: f64) -> Result<(), InterfaceError>;

    /// Set receive gain; returns the gain actually applied in dB
    async fn set_rx_gain(&self, gain_db: f64) -> Result<f64, InterfaceError>;

    /// Set transmit power attenuation relative to full scale, in dB
    async fn set_power_attenuation(&self, atten_db: f64) -> Result<(), InterfaceError>;

    /// Adjust the local oscillator trim
    async fn set_freq_offset(&self, offset: f64) -> Result<(), InterfaceError>;

    /// Queue one burst for transmission at `deadline`. `filler` marks an
    /// idle burst substituted for an empty slot.
    async fn transmit(
        &self,
        samples: &[Complex32],
        deadline: Timestamp,
        filler: bool,
    ) -> Result<(), InterfaceError>;

    /// Pull one demodulated burst if available
    async fn receive(&self) -> Result<Option<ReceivedBurst>, InterfaceError>;

    /// Read and clear the underrun flag
    fn take_underrun(&self) -> bool;

    /// Handle on the hardware slot clock
    fn slot_clock(&self) -> SlotClock;
}
