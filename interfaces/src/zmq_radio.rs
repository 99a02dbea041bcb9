//! ZeroMQ Virtual Radio Device
//!
//! A software-only [`RadioDevice`] for running the transceiver without
//! SDR hardware. Transmit bursts are pushed out a ZMQ PUSH socket,
//! receive bursts are pulled from a PULL socket, and a tokio interval
//! stands in for the hardware sample clock, ticking once per slot.
//!
//! ZMQ runs on a dedicated thread; the async side talks to it through
//! channels, so no socket call ever blocks a runtime worker.

use crate::radio::{ClockDriver, RadioDevice, SlotClock};
use crate::InterfaceError;
use async_trait::async_trait;
use bytes::{BufMut, BytesMut};
use common::{ReceivedBurst, Timestamp, SLOT_DURATION_US};
use num_complex::Complex32;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, info, trace, warn};

/// ZMQ virtual radio configuration
#[derive(Debug, Clone)]
pub struct ZmqRadioConfig {
    /// PUSH socket bind address for outgoing bursts
    pub tx_address: String,
    /// PULL socket connect address for incoming bursts
    pub rx_address: String,
    /// Duration of one slot tick
    pub slot_duration: Duration,
    /// Slots the clock may pass without a transmit before flagging underrun
    pub underrun_grace_slots: u64,
}

impl Default for ZmqRadioConfig {
    fn default() -> Self {
        Self {
            tx_address: "tcp://*:5700".to_string(),
            rx_address: "tcp://localhost:5701".to_string(),
            slot_duration: Duration::from_micros(SLOT_DURATION_US),
            underrun_grace_slots: 2,
        }
    }
}

/// Virtual radio statistics
#[derive(Debug, Default, Clone)]
pub struct RadioStats {
    pub tx_bursts: u64,
    pub filler_bursts: u64,
    pub rx_bursts: u64,
    pub underruns: u64,
}

struct Shared {
    started: AtomicBool,
    shutdown: AtomicBool,
    underrun: AtomicBool,
    last_tx_slot: AtomicU64,
    stats: std::sync::Mutex<RadioStats>,
}

struct TxBlock {
    deadline: Timestamp,
    filler: bool,
    samples: Vec<Complex32>,
}

/// ZeroMQ-backed virtual radio
pub struct ZmqRadio {
    shared: Arc<Shared>,
    clock: SlotClock,
    tx_sender: std::sync::mpsc::Sender<TxBlock>,
    rx_receiver: Mutex<mpsc::Receiver<ReceivedBurst>>,
}

impl ZmqRadio {
    /// Create the device, bind its sockets and start the clock task
    pub fn new(config: ZmqRadioConfig) -> Result<Self, InterfaceError> {
        let shared = Arc::new(Shared {
            started: AtomicBool::new(false),
            shutdown: AtomicBool::new(false),
            underrun: AtomicBool::new(false),
            last_tx_slot: AtomicU64::new(0),
            stats: std::sync::Mutex::new(RadioStats::default()),
        });

        let (tx_sender, tx_receiver) = std::sync::mpsc::channel::<TxBlock>();
        let (rx_sender, rx_receiver) = mpsc::channel::<ReceivedBurst>(256);

        // Socket setup happens on the ZMQ thread; report the result back
        // before returning so bind failures surface here.
        let (init_tx, init_rx) = std::sync::mpsc::channel::<Result<(), InterfaceError>>();
        let zmq_shared = Arc::clone(&shared);
        let zmq_config = config.clone();
        std::thread::spawn(move || {
            zmq_io_thread(zmq_config, zmq_shared, tx_receiver, rx_sender, init_tx)
        });

        match init_rx.recv_timeout(Duration::from_secs(10)) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                error!("virtual radio socket setup failed: {}", e);
                return Err(e);
            }
            Err(_) => {
                return Err(InterfaceError::NotInitialized);
            }
        }

        let (driver, clock) = ClockDriver::new();
        tokio::spawn(clock_task(config, Arc::clone(&shared), driver));

        Ok(Self {
            shared,
            clock,
            tx_sender,
            rx_receiver: Mutex::new(rx_receiver),
        })
    }

    /// Current statistics snapshot
    pub fn stats(&self) -> RadioStats {
        self.shared
            .stats
            .lock()
            .map(|s| s.clone())
            .unwrap_or_default()
    }
}

impl Drop for ZmqRadio {
    fn drop(&mut self) {
        self.shared.shutdown.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl RadioDevice for ZmqRadio {
    async fn start(&self) -> Result<(), InterfaceError> {
        info!("starting virtual radio");
        self.shared.started.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn tune_tx(&self, freq_khz: f64) -> Result<(), InterfaceError> {
        info!("virtual radio tx tuned to {} kHz", freq_khz);
        Ok(())
    }

    async fn tune_rx(&self, freq_khz: f64) -> Result<(), InterfaceError> {
        info!("virtual radio rx tuned to {} kHz", freq_khz);
        Ok(())
    }

    async fn set_rx_gain(&self, gain_db: f64) -> Result<f64, InterfaceError> {
        let applied = gain_db.clamp(0.0, 60.0);
        info!("virtual radio rx gain set to {} dB", applied);
        Ok(applied)
    }

    async fn set_power_attenuation(&self, atten_db: f64) -> Result<(), InterfaceError> {
        info!("virtual radio tx attenuation set to {} dB", atten_db);
        Ok(())
    }

    async fn set_freq_offset(&self, offset: f64) -> Result<(), InterfaceError> {
        info!("virtual radio frequency offset set to {}", offset);
        Ok(())
    }

    async fn transmit(
        &self,
        samples: &[Complex32],
        deadline: Timestamp,
        filler: bool,
    ) -> Result<(), InterfaceError> {
        if !self.shared.started.load(Ordering::SeqCst) {
            return Err(InterfaceError::NotInitialized);
        }

        self.shared
            .last_tx_slot
            .fetch_max(deadline.to_slots(), Ordering::SeqCst);
        if let Ok(mut stats) = self.shared.stats.lock() {
            if filler {
                stats.filler_bursts += 1;
            } else {
                stats.tx_bursts += 1;
            }
        }

        self.tx_sender
            .send(TxBlock {
                deadline,
                filler,
                samples: samples.to_vec(),
            })
            .map_err(|_| InterfaceError::DeviceStopped)
    }

    async fn receive(&self) -> Result<Option<ReceivedBurst>, InterfaceError> {
        if !self.shared.started.load(Ordering::SeqCst) {
            return Err(InterfaceError::NotInitialized);
        }
        let mut rx = self.rx_receiver.lock().await;
        match rx.try_recv() {
            Ok(burst) => {
                if let Ok(mut stats) = self.shared.stats.lock() {
                    stats.rx_bursts += 1;
                }
                Ok(Some(burst))
            }
            Err(mpsc::error::TryRecvError::Empty) => Ok(None),
            Err(mpsc::error::TryRecvError::Disconnected) => Err(InterfaceError::DeviceStopped),
        }
    }

    fn take_underrun(&self) -> bool {
        self.shared.underrun.swap(false, Ordering::SeqCst)
    }

    fn slot_clock(&self) -> SlotClock {
        self.clock.clone()
    }
}

/// Drives the slot clock and watches for transmit starvation
async fn clock_task(config: ZmqRadioConfig, shared: Arc<Shared>, driver: ClockDriver) {
    let mut interval = tokio::time::interval(config.slot_duration);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        interval.tick().await;
        if shared.shutdown.load(Ordering::SeqCst) {
            break;
        }
        if !shared.started.load(Ordering::SeqCst) {
            continue;
        }

        driver.tick();
        let now = driver.now();
        let last_tx = shared.last_tx_slot.load(Ordering::SeqCst);
        if now > last_tx + config.underrun_grace_slots
            && !shared.underrun.swap(true, Ordering::SeqCst)
        {
            if let Ok(mut stats) = shared.stats.lock() {
                stats.underruns += 1;
            }
            warn!(
                "virtual radio underrun: clock at slot {}, last transmit at {}",
                now, last_tx
            );
        }
    }
    debug!("virtual radio clock task stopped");
}

/// Owns the ZMQ sockets: drains queued transmit blocks out the PUSH
/// socket and polls the PULL socket for incoming bursts.
fn zmq_io_thread(
    config: ZmqRadioConfig,
    shared: Arc<Shared>,
    tx_receiver: std::sync::mpsc::Receiver<TxBlock>,
    rx_sender: mpsc::Sender<ReceivedBurst>,
    init_tx: std::sync::mpsc::Sender<Result<(), InterfaceError>>,
) {
    let context = zmq::Context::new();
    let sockets = (|| -> Result<(zmq::Socket, zmq::Socket), InterfaceError> {
        let push = context.socket(zmq::PUSH)?;
        push.bind(&config.tx_address)?;
        push.set_sndtimeo(100)?;
        info!("virtual radio PUSH socket bound to {}", config.tx_address);

        let pull = context.socket(zmq::PULL)?;
        pull.connect(&config.rx_address)?;
        info!("virtual radio PULL socket connected to {}", config.rx_address);
        Ok((push, pull))
    })();

    let (push, pull) = match sockets {
        Ok(pair) => {
            let _ = init_tx.send(Ok(()));
            pair
        }
        Err(e) => {
            let _ = init_tx.send(Err(e));
            return;
        }
    };

    while !shared.shutdown.load(Ordering::SeqCst) {
        // Drain pending transmit blocks, waiting briefly when idle
        match tx_receiver.recv_timeout(Duration::from_millis(1)) {
            Ok(block) => {
                let bytes = encode_tx_block(&block);
                if let Err(e) = push.send(&*bytes, 0) {
                    warn!("failed to push burst for {}: {}", block.deadline, e);
                }
            }
            Err(std::sync::mpsc::RecvTimeoutError::Timeout) => {}
            Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => break,
        }

        // Poll for incoming bursts without blocking
        loop {
            match pull.recv_bytes(zmq::DONTWAIT) {
                Ok(bytes) => match decode_rx_block(&bytes) {
                    Ok(burst) => {
                        trace!("virtual radio received burst at {}", burst.timestamp);
                        if rx_sender.blocking_send(burst).is_err() {
                            return;
                        }
                    }
                    Err(e) => warn!("dropping malformed rx block: {}", e),
                },
                Err(zmq::Error::EAGAIN) => break,
                Err(e) => {
                    error!("virtual radio PULL socket error: {}", e);
                    break;
                }
            }
        }
    }
    debug!("virtual radio ZMQ thread stopped");
}

/// TX block layout: `[slot u8][frame u32 BE][filler u8][f32 LE I/Q pairs]`
fn encode_tx_block(block: &TxBlock) -> BytesMut {
    let mut buf = BytesMut::with_capacity(6 + block.samples.len() * 8);
    buf.put_u8(block.deadline.slot());
    buf.put_u32(block.deadline.frame());
    buf.put_u8(block.filler as u8);
    for sample in &block.samples {
        buf.put_f32_le(sample.re);
        buf.put_f32_le(sample.im);
    }
    buf
}

/// RX block layout: `[slot u8][frame u32 BE][rssi u8][toa i16 BE][f32 LE I/Q pairs]`
fn decode_rx_block(bytes: &[u8]) -> Result<ReceivedBurst, InterfaceError> {
    const HEADER: usize = 8;
    if bytes.len() < HEADER || (bytes.len() - HEADER) % 8 != 0 {
        return Err(InterfaceError::MalformedRecord(format!(
            "rx block of {} bytes",
            bytes.len()
        )));
    }

    let slot = bytes[0];
    let frame = u32::from_be_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]);
    let timestamp = Timestamp::new(frame, slot)
        .ok_or_else(|| InterfaceError::MalformedRecord(format!("slot index {}", slot)))?;
    let rssi_db = bytes[5];
    let timing_offset = i16::from_be_bytes([bytes[6], bytes[7]]);

    let mut samples = Vec::with_capacity((bytes.len() - HEADER) / 8);
    for pair in bytes[HEADER..].chunks_exact(8) {
        let re = f32::from_le_bytes([pair[0], pair[1], pair[2], pair[3]]);
        let im = f32::from_le_bytes([pair[4], pair[5], pair[6], pair[7]]);
        samples.push(Complex32::new(re, im));
    }

    Ok(ReceivedBurst {
        timestamp,
        rssi_db,
        timing_offset,
        samples,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tx_block_layout() {
        let block = TxBlock {
            deadline: Timestamp::new(0x01020304, 6).unwrap(),
            filler: true,
            samples: vec![Complex32::new(0.5, -0.5)],
        };
        let bytes = encode_tx_block(&block);
        assert_eq!(bytes.len(), 6 + 8);
        assert_eq!(bytes[0], 6);
        assert_eq!(&bytes[1..5], &[0x01, 0x02, 0x03, 0x04]);
        assert_eq!(bytes[5], 1);
    }

    #[test]
    fn test_rx_block_round_trip() {
        let mut buf = BytesMut::new();
        buf.put_u8(2);
        buf.put_u32(77);
        buf.put_u8(35);
        buf.put_i16(-3);
        buf.put_f32_le(1.0);
        buf.put_f32_le(-1.0);

        let burst = decode_rx_block(&buf).unwrap();
        assert_eq!(burst.timestamp, Timestamp::new(77, 2).unwrap());
        assert_eq!(burst.rssi_db, 35);
        assert_eq!(burst.timing_offset, -3);
        assert_eq!(burst.samples, vec![Complex32::new(1.0, -1.0)]);
    }

    #[test]
    fn test_rx_block_rejects_truncated() {
        assert!(decode_rx_block(&[0u8; 5]).is_err());
        assert!(decode_rx_block(&[0u8; 11]).is_err());
    }
}
