//! Common Types Library
//!
//! This crate provides shared types used across the transceiver bridge.

pub mod types;

// Re-export commonly used items
pub use types::*;
