//! Common Types for the SDR Transceiver Bridge
//!
//! Defines the fundamental time and burst types used throughout the
//! transmit scheduler and the radio interfaces.

use num_complex::Complex32;
use serde::{Deserialize, Serialize};

/// Number of time slots per TDMA frame
pub const SLOTS_PER_FRAME: u32 = 8;

/// Number of complex samples in one modulated burst
pub const SAMPLES_PER_BURST: usize = 156;

/// Nominal duration of one time slot in microseconds
pub const SLOT_DURATION_US: u64 = 577;

/// Logical air-interface time: a (frame number, slot index) pair.
///
/// Totally ordered by frame number first, slot index second. The derived
/// ordering relies on the field order below.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp {
    frame: u32,
    slot: u8,
}

impl Timestamp {
    /// Create a new timestamp with slot validation
    pub fn new(frame: u32, slot: u8) -> Option<Self> {
        if (slot as u32) < SLOTS_PER_FRAME {
            Some(Self { frame, slot })
        } else {
            None
        }
    }

    /// Frame number
    pub fn frame(&self) -> u32 {
        self.frame
    }

    /// Slot index within the frame (0..8)
    pub fn slot(&self) -> u8 {
        self.slot
    }

    /// Absolute slot count since frame zero
    pub fn to_slots(&self) -> u64 {
        self.frame as u64 * SLOTS_PER_FRAME as u64 + self.slot as u64
    }

    /// Build a timestamp from an absolute slot count
    pub fn from_slots(slots: u64) -> Self {
        Self {
            frame: (slots / SLOTS_PER_FRAME as u64) as u32,
            slot: (slots % SLOTS_PER_FRAME as u64) as u8,
        }
    }

    /// The next slot, carrying into the frame number at the frame boundary
    pub fn succ(&self) -> Self {
        if self.slot as u32 + 1 < SLOTS_PER_FRAME {
            Self {
                frame: self.frame,
                slot: self.slot + 1,
            }
        } else {
            Self {
                frame: self.frame + 1,
                slot: 0,
            }
        }
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.frame, self.slot)
    }
}

/// A pre-modulated transmit burst bound to a single time slot.
///
/// Created by the ingress decoder, owned by the transmit queue until the
/// scheduler pops it, then moved into the radio transmit call.
#[derive(Debug, Clone)]
pub struct TxBurst {
    /// Intended transmission time
    pub timestamp: Timestamp,
    /// Complex baseband samples
    pub samples: Vec<Complex32>,
}

impl TxBurst {
    /// Create a burst from decoded samples
    pub fn new(timestamp: Timestamp, samples: Vec<Complex32>) -> Self {
        Self { timestamp, samples }
    }

    /// An idle filler burst: all-zero samples for a slot with no data.
    pub fn filler(timestamp: Timestamp) -> Self {
        Self {
            timestamp,
            samples: vec![Complex32::new(0.0, 0.0); SAMPLES_PER_BURST],
        }
    }
}

/// A demodulated receive burst with signal-quality metadata
#[derive(Debug, Clone)]
pub struct ReceivedBurst {
    /// Time the burst was received at
    pub timestamp: Timestamp,
    /// Received signal strength in dB below full scale
    pub rssi_db: u8,
    /// Timing-of-arrival offset in quarter-symbol units
    pub timing_offset: i16,
    /// Demodulated complex samples
    pub samples: Vec<Complex32>,
}
