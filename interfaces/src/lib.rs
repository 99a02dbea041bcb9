//! Radio and Baseband-Core Interfaces Library
//!
//! This crate provides everything that crosses a process or hardware
//! boundary: the UDP channels towards the baseband core, the wire codecs
//! for burst and command records, the abstract radio device, and a
//! ZeroMQ-backed virtual radio for running without hardware.

pub mod channels;
pub mod radio;
pub mod wire;
pub mod zmq_radio;

use thiserror::Error;

/// Interface errors
#[derive(Error, Debug)]
pub enum InterfaceError {
    #[error("ZMQ error: {0}")]
    ZmqError(#[from] zmq::Error),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("malformed record: {0}")]
    MalformedRecord(String),

    #[error("invalid channel address: {0}")]
    InvalidAddress(String),

    #[error("interface not initialized")]
    NotInitialized,

    #[error("tune failed: {0}")]
    TuneFailed(String),

    #[error("radio device stopped")]
    DeviceStopped,
}
