//! TOML Configuration for the Transceiver Binary

use common::{SLOTS_PER_FRAME, SLOT_DURATION_US};
use serde::{Deserialize, Serialize};

/// Main configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TrxConfig {
    /// Channels towards the baseband core
    #[serde(default)]
    pub channels: ChannelConfig,
    /// Virtual radio device
    #[serde(default)]
    pub radio: RadioConfig,
    /// Transmit latency control
    #[serde(default)]
    pub latency: LatencySettings,
}

impl Default for TrxConfig {
    fn default() -> Self {
        Self {
            channels: ChannelConfig::default(),
            radio: RadioConfig::default(),
            latency: LatencySettings::default(),
        }
    }
}

/// Baseband-core channel addressing: control, data and clock channels
/// live on three consecutive ports starting at the base port.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChannelConfig {
    /// Local bind address
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    /// Local base port
    #[serde(default = "default_base_port")]
    pub base_port: u16,
    /// Baseband core address
    #[serde(default = "default_peer_addr")]
    pub peer_addr: String,
    /// Baseband core base port
    #[serde(default = "default_peer_base_port")]
    pub peer_base_port: u16,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            base_port: default_base_port(),
            peer_addr: default_peer_addr(),
            peer_base_port: default_peer_base_port(),
        }
    }
}

fn default_bind_addr() -> String {
    "127.0.0.1".to_string()
}

fn default_base_port() -> u16 {
    5700
}

fn default_peer_addr() -> String {
    "127.0.0.1".to_string()
}

fn default_peer_base_port() -> u16 {
    5800
}

/// Virtual radio configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RadioConfig {
    /// PUSH socket bind address for outgoing sample blocks
    #[serde(default = "default_radio_tx")]
    pub tx_address: String,
    /// PULL socket connect address for incoming sample blocks
    #[serde(default = "default_radio_rx")]
    pub rx_address: String,
    /// Slot tick duration in microseconds
    #[serde(default = "default_slot_duration_us")]
    pub slot_duration_us: u64,
    /// Slots without a transmit before the clock flags underrun
    #[serde(default = "default_underrun_grace")]
    pub underrun_grace_slots: u64,
}

impl Default for RadioConfig {
    fn default() -> Self {
        Self {
            tx_address: default_radio_tx(),
            rx_address: default_radio_rx(),
            slot_duration_us: default_slot_duration_us(),
            underrun_grace_slots: default_underrun_grace(),
        }
    }
}

fn default_radio_tx() -> String {
    "tcp://*:5900".to_string()
}

fn default_radio_rx() -> String {
    "tcp://localhost:5901".to_string()
}

fn default_slot_duration_us() -> u64 {
    SLOT_DURATION_US
}

fn default_underrun_grace() -> u64 {
    2
}

/// Latency controller settings, in frames for readability
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LatencySettings {
    /// Initial latency in frames
    #[serde(default = "default_initial_frames")]
    pub initial_frames: u32,
    /// Maximum latency in frames
    #[serde(default = "default_max_frames")]
    pub max_frames: u32,
    /// Minimum frames between latency increases (W1)
    #[serde(default = "default_increase_window_frames")]
    pub increase_window_frames: u32,
    /// Underrun-free frames required before a decrease (W2)
    #[serde(default = "default_decrease_window_frames")]
    pub decrease_window_frames: u32,
    /// Frames between periodic clock indications
    #[serde(default = "default_clock_interval_frames")]
    pub clock_interval_frames: u32,
}

impl Default for LatencySettings {
    fn default() -> Self {
        Self {
            initial_frames: default_initial_frames(),
            max_frames: default_max_frames(),
            increase_window_frames: default_increase_window_frames(),
            decrease_window_frames: default_decrease_window_frames(),
            clock_interval_frames: default_clock_interval_frames(),
        }
    }
}

fn default_initial_frames() -> u32 {
    2
}

fn default_max_frames() -> u32 {
    15
}

fn default_increase_window_frames() -> u32 {
    10
}

fn default_decrease_window_frames() -> u32 {
    100
}

fn default_clock_interval_frames() -> u32 {
    10
}

impl LatencySettings {
    /// Convert to the slot-based controller configuration
    pub fn to_latency_config(&self) -> scheduler::latency::LatencyConfig {
        let per_frame = SLOTS_PER_FRAME as u64;
        scheduler::latency::LatencyConfig {
            initial_slots: self.initial_frames as u64 * per_frame,
            min_slots: 1,
            max_slots: self.max_frames as u64 * per_frame,
            increase_window: self.increase_window_frames as u64 * per_frame,
            decrease_window: self.decrease_window_frames as u64 * per_frame,
        }
    }
}

impl TrxConfig {
    /// Load configuration from a TOML file
    pub fn from_toml_file(path: &str) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: TrxConfig = toml::from_str(&contents)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_toml() {
        let config: TrxConfig = toml::from_str("").unwrap();
        assert_eq!(config.channels.base_port, 5700);
        assert_eq!(config.latency.max_frames, 15);
    }

    #[test]
    fn test_partial_override() {
        let config: TrxConfig = toml::from_str(
            r#"
            [channels]
            base_port = 6000

            [latency]
            initial_frames = 3
            "#,
        )
        .unwrap();
        assert_eq!(config.channels.base_port, 6000);
        assert_eq!(config.latency.initial_frames, 3);
        assert_eq!(config.latency.max_frames, 15);
    }

    #[test]
    fn test_latency_settings_convert_to_slots() {
        let settings = LatencySettings::default();
        let cfg = settings.to_latency_config();
        assert_eq!(cfg.initial_slots, 16);
        assert_eq!(cfg.max_slots, 120);
        assert_eq!(cfg.increase_window, 80);
        assert_eq!(cfg.decrease_window, 800);
    }
}
