//! Receive Relay Loop
//!
//! Pulls demodulated bursts from the radio and forwards them upstream on
//! the data channel, framed with timestamp and signal-quality metadata.

use crate::SchedulerError;
use interfaces::channels::UdpChannel;
use interfaces::radio::RadioDevice;
use interfaces::wire;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, trace, warn};

/// Pause between polls when the radio has nothing pending
const IDLE_POLL: Duration = Duration::from_micros(500);

/// Run the receive relay until shutdown
pub async fn run_receive_loop(
    radio: Arc<dyn RadioDevice>,
    data: Arc<UdpChannel>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), SchedulerError> {
    info!("receive relay started");

    loop {
        let burst = tokio::select! {
            _ = shutdown.changed() => break,
            received = radio.receive() => received?,
        };

        match burst {
            Some(burst) => {
                trace!("relaying burst received at {}", burst.timestamp);
                let record = wire::encode_rx_burst(&burst);
                if let Err(e) = data.send(&record).await {
                    warn!("failed to relay burst at {}: {}", burst.timestamp, e);
                }
            }
            None => tokio::time::sleep(IDLE_POLL).await,
        }
    }

    info!("receive relay stopped");
    Ok(())
}
