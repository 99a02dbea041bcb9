//! Ingress Decoder
//!
//! Reads fixed-size encoded burst records from the data channel, decodes
//! them and inserts them into the transmit queue. Malformed records,
//! duplicate timestamps and channel receive errors are dropped with a
//! log line; only the shutdown signal stops the loop.

use crate::notifier::ClockNotifier;
use crate::queue::TxPriorityQueue;
use crate::state::SharedState;
use crate::SchedulerError;
use interfaces::channels::UdpChannel;
use interfaces::wire;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, trace, warn};

/// If the deadline clock ran this many frames past the last clock
/// indication, send a fresh one even without a stale-burst event.
const CLOCK_STALENESS_FRAMES: u32 = 100;

/// Backoff after a channel receive error before the next attempt
const RECV_RETRY_DELAY: Duration = Duration::from_millis(10);

/// Run the ingress decoder until shutdown
pub async fn run_ingress_loop(
    data: Arc<UdpChannel>,
    queue: Arc<TxPriorityQueue>,
    shared: SharedState,
    notifier: ClockNotifier,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), SchedulerError> {
    info!("ingress decoder started");
    let mut buf = vec![0u8; 4 * wire::TX_RECORD_BYTES];

    loop {
        let n = tokio::select! {
            _ = shutdown.changed() => break,
            received = data.recv(&mut buf) => match received {
                Ok(n) => n,
                // Connected UDP surfaces peer outages (ICMP unreachable)
                // as receive errors. The peer may come back, so keep
                // the loop alive.
                Err(e) => {
                    warn!("data channel receive failed: {}", e);
                    tokio::time::sleep(RECV_RETRY_DELAY).await;
                    continue;
                }
            },
        };

        match wire::decode_tx_burst(&buf[..n]) {
            Ok(burst) => {
                let ts = burst.timestamp;
                match queue.insert(burst).await {
                    Ok(()) => trace!("queued burst for {}", ts),
                    Err(e) => warn!("dropping burst: {}", e),
                }
            }
            Err(e) => error!("dropping malformed burst record: {}", e),
        }

        // Keep the upstream clock view fresh even absent eviction events
        let deadline = shared.deadline().await;
        let last_frame = notifier
            .last_sent()
            .await
            .map(|t| t.frame())
            .unwrap_or(0);
        if deadline.frame().saturating_sub(last_frame) >= CLOCK_STALENESS_FRAMES {
            notifier.send().await;
        }
    }

    info!("ingress decoder stopped");
    Ok(())
}
