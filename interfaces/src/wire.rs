//! Wire Formats for the Baseband-Core Channels
//!
//! Three record kinds cross the channels: fixed-size binary transmit
//! burst records downstream, variable binary receive burst records
//! upstream, and textual command/indication lines on the control and
//! clock channels.

use crate::InterfaceError;
use bytes::{BufMut, Bytes, BytesMut};
use common::{ReceivedBurst, Timestamp, TxBurst, SAMPLES_PER_BURST, SLOTS_PER_FRAME};
use num_complex::Complex32;

/// Header bytes of a downstream transmit burst record: 1 byte slot index
/// plus a 2 byte big-endian frame number.
pub const TX_HEADER_BYTES: usize = 3;

/// Total size of a downstream transmit burst record
pub const TX_RECORD_BYTES: usize = TX_HEADER_BYTES + 2 * SAMPLES_PER_BURST;

/// Header bytes of an upstream receive burst record: slot, frame,
/// RSSI and a 2 byte timing offset.
pub const RX_HEADER_BYTES: usize = 6;

/// Full-scale value of the 8-bit I/Q samples on the wire
const SAMPLE_SCALE: f32 = 127.0;

/// Decode a downstream transmit burst record.
///
/// Record layout: `[slot: u8][frame: u16 BE][i0 q0 i1 q1 ...: i8]`.
/// Any length other than [`TX_RECORD_BYTES`] is a framing error.
pub fn decode_tx_burst(buf: &[u8]) -> Result<TxBurst, InterfaceError> {
    if buf.len() != TX_RECORD_BYTES {
        return Err(InterfaceError::MalformedRecord(format!(
            "transmit record is {} bytes, expected {}",
            buf.len(),
            TX_RECORD_BYTES
        )));
    }

    let slot = buf[0];
    let frame = u16::from_be_bytes([buf[1], buf[2]]) as u32;
    let timestamp = Timestamp::new(frame, slot).ok_or_else(|| {
        InterfaceError::MalformedRecord(format!(
            "slot index {} out of range 0..{}",
            slot, SLOTS_PER_FRAME
        ))
    })?;

    let mut samples = Vec::with_capacity(SAMPLES_PER_BURST);
    for pair in buf[TX_HEADER_BYTES..].chunks_exact(2) {
        let re = pair[0] as i8 as f32 / SAMPLE_SCALE;
        let im = pair[1] as i8 as f32 / SAMPLE_SCALE;
        samples.push(Complex32::new(re, im));
    }

    Ok(TxBurst::new(timestamp, samples))
}

/// Encode an upstream receive burst record.
///
/// Record layout: `[slot: u8][frame: u16 BE][rssi: u8][toa: i16 BE]`
/// followed by interleaved signed 8-bit I/Q samples.
pub fn encode_rx_burst(burst: &ReceivedBurst) -> Bytes {
    let mut buf = BytesMut::with_capacity(RX_HEADER_BYTES + 2 * burst.samples.len());
    buf.put_u8(burst.timestamp.slot());
    buf.put_u16(burst.timestamp.frame() as u16);
    buf.put_u8(burst.rssi_db);
    buf.put_i16(burst.timing_offset);
    for sample in &burst.samples {
        buf.put_i8(quantize(sample.re));
        buf.put_i8(quantize(sample.im));
    }
    buf.freeze()
}

fn quantize(value: f32) -> i8 {
    (value * SAMPLE_SCALE).round().clamp(-SAMPLE_SCALE, SAMPLE_SCALE) as i8
}

/// Format a clock indication line for the clock channel
pub fn format_clock_ind(frame: u32) -> String {
    format!("IND CLOCK {}", frame)
}

/// A parsed control channel command.
///
/// The wire format stays textual (`CMD <verb> [args]`) for
/// interoperability; internally every command is a tagged variant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ControlCommand {
    /// Mark the transceiver off; actual process shutdown is external
    PowerOff,
    /// Start the service loops and mark the transceiver on
    PowerOn,
    /// Set receive gain in dB
    SetRxGain(i32),
    /// Adjust transmit attenuation by a delta in dB
    SetTxAtten(i32),
    /// Set absolute transmit power level in dB
    SetPower(i32),
    /// Adjust transmit power by a step in dB
    AdjPower(i32),
    /// Tune the receive frequency, in kHz
    RxTune(f64),
    /// Tune the transmit frequency, in kHz
    TxTune(f64),
    /// Adjust the local oscillator trim
    SetFreqOffset(i32),
    /// Liveness probe, no effect
    Noop,
}

impl ControlCommand {
    /// Parse a `CMD <verb> [args]` line
    pub fn parse(line: &str) -> Result<Self, InterfaceError> {
        let mut parts = line.split_whitespace();
        match parts.next() {
            Some("CMD") => {}
            _ => {
                return Err(InterfaceError::MalformedRecord(
                    "control record does not start with CMD".to_string(),
                ))
            }
        }
        let verb = parts
            .next()
            .ok_or_else(|| InterfaceError::MalformedRecord("missing verb".to_string()))?;

        let cmd = match verb {
            "POWEROFF" => Self::PowerOff,
            "POWERON" => Self::PowerOn,
            "SETRXGAIN" => Self::SetRxGain(parse_arg(verb, parts.next())?),
            "SETTXATTEN" => Self::SetTxAtten(parse_arg(verb, parts.next())?),
            "SETPOWER" => Self::SetPower(parse_arg(verb, parts.next())?),
            "ADJPOWER" => Self::AdjPower(parse_arg(verb, parts.next())?),
            "RXTUNE" => Self::RxTune(parse_arg(verb, parts.next())?),
            "TXTUNE" => Self::TxTune(parse_arg(verb, parts.next())?),
            "SETFREQOFFSET" => Self::SetFreqOffset(parse_arg(verb, parts.next())?),
            "NOOP" => Self::Noop,
            other => {
                return Err(InterfaceError::MalformedRecord(format!(
                    "unknown verb {:?}",
                    other
                )))
            }
        };
        Ok(cmd)
    }

    /// The wire verb for this command
    pub fn verb(&self) -> &'static str {
        match self {
            Self::PowerOff => "POWEROFF",
            Self::PowerOn => "POWERON",
            Self::SetRxGain(_) => "SETRXGAIN",
            Self::SetTxAtten(_) => "SETTXATTEN",
            Self::SetPower(_) => "SETPOWER",
            Self::AdjPower(_) => "ADJPOWER",
            Self::RxTune(_) => "RXTUNE",
            Self::TxTune(_) => "TXTUNE",
            Self::SetFreqOffset(_) => "SETFREQOFFSET",
            Self::Noop => "NOOP",
        }
    }
}

fn parse_arg<T: std::str::FromStr>(verb: &str, arg: Option<&str>) -> Result<T, InterfaceError> {
    arg.and_then(|a| a.parse().ok()).ok_or_else(|| {
        InterfaceError::MalformedRecord(format!("missing or invalid argument for {}", verb))
    })
}

/// A control channel response: `RSP <verb> <status> [args]`
#[derive(Debug, Clone, PartialEq)]
pub struct ControlResponse {
    /// Verb being answered
    pub verb: &'static str,
    /// Zero on success, non-zero error code otherwise
    pub status: i32,
    /// Optional trailing argument (echoed gain, power, ...)
    pub arg: Option<String>,
}

impl ControlResponse {
    /// A success response with no argument
    pub fn ok(verb: &'static str) -> Self {
        Self {
            verb,
            status: 0,
            arg: None,
        }
    }

    /// A success response echoing an argument
    pub fn ok_with(verb: &'static str, arg: impl ToString) -> Self {
        Self {
            verb,
            status: 0,
            arg: Some(arg.to_string()),
        }
    }

    /// An error response
    pub fn error(verb: &'static str, status: i32) -> Self {
        Self {
            verb,
            status,
            arg: None,
        }
    }

    /// Render the wire line
    pub fn format(&self) -> String {
        match &self.arg {
            Some(arg) => format!("RSP {} {} {}", self.verb, self.status, arg),
            None => format!("RSP {} {}", self.verb, self.status),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_record(frame: u16, slot: u8) -> Vec<u8> {
        let mut rec = vec![0u8; TX_RECORD_BYTES];
        rec[0] = slot;
        rec[1..3].copy_from_slice(&frame.to_be_bytes());
        rec[3] = 127; // first I sample at full scale
        rec
    }

    #[test]
    fn test_decode_tx_burst() {
        let rec = sample_record(1234, 5);
        let burst = decode_tx_burst(&rec).unwrap();
        assert_eq!(burst.timestamp, Timestamp::new(1234, 5).unwrap());
        assert_eq!(burst.samples.len(), SAMPLES_PER_BURST);
        assert!((burst.samples[0].re - 1.0).abs() < 1e-6);
        assert_eq!(burst.samples[1], Complex32::new(0.0, 0.0));
    }

    #[test]
    fn test_decode_rejects_wrong_length() {
        let rec = vec![0u8; TX_RECORD_BYTES - 1];
        assert!(matches!(
            decode_tx_burst(&rec),
            Err(InterfaceError::MalformedRecord(_))
        ));
    }

    #[test]
    fn test_decode_rejects_bad_slot() {
        let rec = sample_record(0, 8);
        assert!(decode_tx_burst(&rec).is_err());
    }

    #[test]
    fn test_encode_rx_burst_header() {
        let burst = ReceivedBurst {
            timestamp: Timestamp::new(0x0102, 3).unwrap(),
            rssi_db: 40,
            timing_offset: -5,
            samples: vec![Complex32::new(1.0, -1.0)],
        };
        let rec = encode_rx_burst(&burst);
        assert_eq!(rec.len(), RX_HEADER_BYTES + 2);
        assert_eq!(rec[0], 3);
        assert_eq!(&rec[1..3], &[0x01, 0x02]);
        assert_eq!(rec[3], 40);
        assert_eq!(i16::from_be_bytes([rec[4], rec[5]]), -5);
        assert_eq!(rec[6] as i8, 127);
        assert_eq!(rec[7] as i8, -127);
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(
            ControlCommand::parse("CMD POWERON").unwrap(),
            ControlCommand::PowerOn
        );
        assert_eq!(
            ControlCommand::parse("CMD SETRXGAIN 12").unwrap(),
            ControlCommand::SetRxGain(12)
        );
        assert_eq!(
            ControlCommand::parse("CMD RXTUNE 890000").unwrap(),
            ControlCommand::RxTune(890000.0)
        );
        assert_eq!(
            ControlCommand::parse("CMD ADJPOWER -2").unwrap(),
            ControlCommand::AdjPower(-2)
        );
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(ControlCommand::parse("").is_err());
        assert!(ControlCommand::parse("POWERON").is_err());
        assert!(ControlCommand::parse("CMD FROBNICATE 1").is_err());
        assert!(ControlCommand::parse("CMD SETRXGAIN").is_err());
        assert!(ControlCommand::parse("CMD SETRXGAIN lots").is_err());
    }

    #[test]
    fn test_response_format() {
        assert_eq!(ControlResponse::ok("POWERON").format(), "RSP POWERON 0");
        assert_eq!(
            ControlResponse::ok_with("SETRXGAIN", 12).format(),
            "RSP SETRXGAIN 0 12"
        );
        assert_eq!(
            ControlResponse::error("POWERON", 1).format(),
            "RSP POWERON 1"
        );
    }

    #[test]
    fn test_clock_indication() {
        assert_eq!(format_clock_ind(42), "IND CLOCK 42");
    }
}
