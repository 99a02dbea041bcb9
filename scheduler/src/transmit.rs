//! Burst Scheduler Transmit Loop
//!
//! Drains the transmit queue against the hardware clock. The deadline
//! clock runs `latency` slots ahead of the hardware clock; every slot
//! gets exactly one burst, real or filler, so the radio pipeline never
//! stalls. Stale bursts are evicted with a clock resync indication so
//! the upstream sender can catch up.

use crate::latency::LatencyController;
use crate::notifier::ClockNotifier;
use crate::queue::TxPriorityQueue;
use crate::state::SharedState;
use crate::SchedulerError;
use common::{Timestamp, TxBurst};
use interfaces::radio::RadioDevice;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, trace, warn};

/// Run the transmit loop until shutdown.
///
/// Services slots only while the radio state is ON; on a transition back
/// to ON the deadline clock is re-seeded from the hardware clock, never
/// moving backwards.
#[allow(clippy::too_many_arguments)]
pub async fn run_transmit_loop(
    radio: Arc<dyn RadioDevice>,
    queue: Arc<TxPriorityQueue>,
    shared: SharedState,
    notifier: ClockNotifier,
    mut controller: LatencyController,
    clock_interval_frames: u32,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), SchedulerError> {
    let mut clock = radio.slot_clock();
    let mut deadline = Timestamp::from_slots(clock.now() + controller.latency_slots());
    let mut active = false;
    let mut last_ind_frame = deadline.frame();

    if shared.radio().await.power_on {
        shared.publish_deadline(deadline).await;
        active = true;
    }
    info!(
        "transmit loop started, deadline clock at {}, latency {} slots",
        deadline,
        controller.latency_slots()
    );

    loop {
        let hw = tokio::select! {
            _ = shutdown.changed() => break,
            advanced = clock.advanced() => advanced?,
        };

        if !shared.radio().await.power_on {
            active = false;
            continue;
        }
        if !active {
            // Re-seed after a power cycle; the deadline clock stays monotone.
            let seed = Timestamp::from_slots(hw + controller.latency_slots());
            if seed > deadline {
                deadline = seed;
            }
            shared.publish_deadline(deadline).await;
            last_ind_frame = deadline.frame();
            active = true;
        }

        while hw + controller.latency_slots() > deadline.to_slots() {
            let underrun = radio.take_underrun();
            if underrun {
                warn!("hardware underrun at slot {}", hw);
            }
            if let Some(latency) = controller.observe(underrun, hw) {
                info!("transmit latency now {} slots", latency);
            }

            // Flush bursts that missed their slot; each one means the
            // sender's clock view has drifted, so resync immediately.
            while let Some(stale) = queue.pop_stale(deadline).await {
                warn!(
                    "evicting stale burst {} at deadline {}",
                    stale.timestamp, deadline
                );
                notifier.send().await;
            }

            match queue.pop_at(deadline).await {
                Some(burst) => {
                    debug!("transmitting burst at {}", deadline);
                    radio.transmit(&burst.samples, deadline, false).await?;
                }
                None => {
                    trace!("no burst for {}, transmitting filler", deadline);
                    let filler = TxBurst::filler(deadline);
                    radio.transmit(&filler.samples, deadline, true).await?;
                }
            }

            deadline = deadline.succ();
            shared.publish_deadline(deadline).await;

            if deadline.frame().saturating_sub(last_ind_frame) >= clock_interval_frames {
                notifier.send().await;
                last_ind_frame = deadline.frame();
            }
        }
    }

    queue.clear().await;
    info!("transmit loop stopped");
    Ok(())
}
