//! Control Channel Handler
//!
//! Synchronous command/response processing for the baseband core. One
//! `CMD <verb> [args]` record per datagram, one `RSP` back. A record
//! that fails to parse is dropped without a response; callers recover by
//! timeout and retry, and that contract is deliberately preserved.
//!
//! POWERON is also where the service loops come to life: the transmit
//! scheduler, the receive relay and the ingress decoder are spawned on
//! the first successful power-up.

use crate::ingress::run_ingress_loop;
use crate::latency::{LatencyConfig, LatencyController};
use crate::notifier::ClockNotifier;
use crate::queue::TxPriorityQueue;
use crate::relay::run_receive_loop;
use crate::state::SharedState;
use crate::transmit::run_transmit_loop;
use crate::SchedulerError;
use interfaces::channels::UdpChannel;
use interfaces::radio::RadioDevice;
use interfaces::wire::{ControlCommand, ControlResponse};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Backoff after a channel receive error before the next attempt
const RECV_RETRY_DELAY: Duration = Duration::from_millis(10);

/// Control handler tuning
#[derive(Debug, Clone)]
pub struct ControlConfig {
    /// Latency controller parameters handed to the transmit loop
    pub latency: LatencyConfig,
    /// Frames between periodic clock indications from the scheduler
    pub clock_interval_frames: u32,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            latency: LatencyConfig::default(),
            clock_interval_frames: 10,
        }
    }
}

/// Owns the control channel and, once powered on, the service loops
pub struct ControlHandler {
    radio: Arc<dyn RadioDevice>,
    control: Arc<UdpChannel>,
    data: Arc<UdpChannel>,
    queue: Arc<TxPriorityQueue>,
    shared: SharedState,
    notifier: ClockNotifier,
    config: ControlConfig,
    shutdown: watch::Receiver<bool>,
    loops: Vec<JoinHandle<()>>,
}

impl ControlHandler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        radio: Arc<dyn RadioDevice>,
        control: Arc<UdpChannel>,
        data: Arc<UdpChannel>,
        queue: Arc<TxPriorityQueue>,
        shared: SharedState,
        notifier: ClockNotifier,
        config: ControlConfig,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            radio,
            control,
            data,
            queue,
            shared,
            notifier,
            config,
            shutdown,
            loops: Vec::new(),
        }
    }

    /// Process commands until shutdown
    pub async fn run(mut self) -> Result<(), SchedulerError> {
        info!("control channel handler started");
        let mut buf = vec![0u8; 256];

        loop {
            let n = tokio::select! {
                _ = self.shutdown.changed() => break,
                received = self.control.recv(&mut buf) => match received {
                    Ok(n) => n,
                    // A briefly absent baseband core shows up here as
                    // ICMP-driven receive errors. Stay up and wait for
                    // the next command.
                    Err(e) => {
                        warn!("control channel receive failed: {}", e);
                        tokio::time::sleep(RECV_RETRY_DELAY).await;
                        continue;
                    }
                },
            };

            let text = match std::str::from_utf8(&buf[..n]) {
                Ok(text) => text.trim_matches(char::from(0)).trim(),
                Err(_) => {
                    error!("control record is not UTF-8, dropping");
                    continue;
                }
            };

            // Refresh the upstream clock view before executing anything,
            // so configuration bursts never leave the core's view stale.
            self.notifier.send().await;

            let cmd = match ControlCommand::parse(text) {
                Ok(cmd) => cmd,
                Err(e) => {
                    // Deliberately no response here; the caller's
                    // timeout-and-retry is the recovery path.
                    error!("dropping unparseable control command {:?}: {}", text, e);
                    continue;
                }
            };

            let response = self.execute(cmd).await;
            debug!("{} -> {}", text, response.format());
            if let Err(e) = self.control.send(response.format().as_bytes()).await {
                warn!("failed to send control response: {}", e);
            }
        }

        // The service loops observe the same shutdown channel and exit
        // on their own at the next blocking boundary.
        info!("control channel handler stopped");
        Ok(())
    }

    async fn execute(&mut self, cmd: ControlCommand) -> ControlResponse {
        let verb = cmd.verb();
        match cmd {
            ControlCommand::PowerOff => {
                self.shared.update_radio(|s| s.power_on = false).await;
                self.queue.clear().await;
                info!("transceiver powered off");
                ControlResponse::ok(verb)
            }

            ControlCommand::PowerOn => {
                let state = self.shared.radio().await;
                if !state.frequencies_set() {
                    warn!("POWERON refused: tx/rx frequencies not set");
                    return ControlResponse::error(verb, 1);
                }
                if state.power_on {
                    return ControlResponse::ok(verb);
                }
                if let Err(e) = self.radio.start().await {
                    error!("radio start failed: {}", e);
                    return ControlResponse::error(verb, 1);
                }
                if self.loops.is_empty() {
                    self.spawn_service_loops();
                }
                self.shared.update_radio(|s| s.power_on = true).await;
                info!("transceiver powered on");
                ControlResponse::ok(verb)
            }

            ControlCommand::SetRxGain(gain) => match self.radio.set_rx_gain(gain as f64).await {
                Ok(applied) => {
                    self.shared.update_radio(|s| s.rx_gain_db = applied).await;
                    ControlResponse::ok_with(verb, applied.round() as i64)
                }
                Err(e) => {
                    error!("rx gain change failed: {}", e);
                    ControlResponse::error(verb, 1)
                }
            },

            ControlCommand::SetTxAtten(delta) => {
                let state = self.shared.radio().await;
                if !state.power_on {
                    return ControlResponse::error(verb, 1);
                }
                let atten = state.tx_atten_db + delta as f64;
                self.apply_attenuation(verb, atten, false).await
            }

            ControlCommand::SetPower(level) => {
                if !self.shared.radio().await.power_on {
                    return ControlResponse::error(verb, 1);
                }
                self.apply_attenuation(verb, level as f64, false).await
            }

            ControlCommand::AdjPower(step) => {
                let state = self.shared.radio().await;
                if !state.power_on {
                    // Powered off: report the current level, change nothing
                    return ControlResponse::ok_with(verb, state.tx_atten_db.round() as i64);
                }
                let atten = state.tx_atten_db + step as f64;
                self.apply_attenuation(verb, atten, true).await
            }

            ControlCommand::RxTune(freq_khz) => match self.radio.tune_rx(freq_khz).await {
                Ok(()) => {
                    self.shared.update_radio(|s| s.rx_freq_khz = freq_khz).await;
                    info!("rx tuned to {} kHz", freq_khz);
                    ControlResponse::ok(verb)
                }
                Err(e) => {
                    error!("rx tune failed: {}", e);
                    ControlResponse::error(verb, 1)
                }
            },

            ControlCommand::TxTune(freq_khz) => match self.radio.tune_tx(freq_khz).await {
                Ok(()) => {
                    self.shared.update_radio(|s| s.tx_freq_khz = freq_khz).await;
                    info!("tx tuned to {} kHz", freq_khz);
                    ControlResponse::ok(verb)
                }
                Err(e) => {
                    error!("tx tune failed: {}", e);
                    ControlResponse::error(verb, 1)
                }
            },

            ControlCommand::SetFreqOffset(offset) => {
                if !self.shared.radio().await.power_on {
                    return ControlResponse::error(verb, 1);
                }
                match self.radio.set_freq_offset(offset as f64).await {
                    Ok(()) => {
                        self.shared.update_radio(|s| s.freq_offset = offset as f64).await;
                        ControlResponse::ok(verb)
                    }
                    Err(e) => {
                        error!("frequency offset change failed: {}", e);
                        ControlResponse::error(verb, 1)
                    }
                }
            }

            ControlCommand::Noop => ControlResponse::ok(verb),
        }
    }

    async fn apply_attenuation(
        &mut self,
        verb: &'static str,
        atten_db: f64,
        echo: bool,
    ) -> ControlResponse {
        match self.radio.set_power_attenuation(atten_db).await {
            Ok(()) => {
                self.shared.update_radio(|s| s.tx_atten_db = atten_db).await;
                if echo {
                    ControlResponse::ok_with(verb, atten_db.round() as i64)
                } else {
                    ControlResponse::ok(verb)
                }
            }
            Err(e) => {
                error!("power change failed: {}", e);
                ControlResponse::error(verb, 1)
            }
        }
    }

    fn spawn_service_loops(&mut self) {
        info!("starting service loops");

        let transmit = {
            let radio = Arc::clone(&self.radio);
            let queue = Arc::clone(&self.queue);
            let shared = self.shared.clone();
            let notifier = self.notifier.clone();
            let controller = LatencyController::new(self.config.latency.clone());
            let interval = self.config.clock_interval_frames;
            let shutdown = self.shutdown.clone();
            tokio::spawn(async move {
                if let Err(e) = run_transmit_loop(
                    radio, queue, shared, notifier, controller, interval, shutdown,
                )
                .await
                {
                    error!("transmit loop terminated: {}", e);
                }
            })
        };

        let ingress = {
            let data = Arc::clone(&self.data);
            let queue = Arc::clone(&self.queue);
            let shared = self.shared.clone();
            let notifier = self.notifier.clone();
            let shutdown = self.shutdown.clone();
            tokio::spawn(async move {
                if let Err(e) = run_ingress_loop(data, queue, shared, notifier, shutdown).await {
                    error!("ingress decoder terminated: {}", e);
                }
            })
        };

        let relay = {
            let radio = Arc::clone(&self.radio);
            let data = Arc::clone(&self.data);
            let shutdown = self.shutdown.clone();
            tokio::spawn(async move {
                if let Err(e) = run_receive_loop(radio, data, shutdown).await {
                    error!("receive relay terminated: {}", e);
                }
            })
        };

        self.loops.extend([transmit, ingress, relay]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{shutdown_channel, trigger_shutdown};
    use crate::testutil::{channel_pair, clock_sink, MockRadio};
    use tokio::net::UdpSocket;
    use tokio::sync::watch;

    struct Fixture {
        radio: Arc<MockRadio>,
        control_peer: UdpSocket,
        clock_peer: UdpSocket,
        shutdown_tx: watch::Sender<bool>,
        handle: tokio::task::JoinHandle<Result<(), SchedulerError>>,
    }

    async fn fixture() -> Fixture {
        let radio = MockRadio::new();
        let (control, control_peer) = channel_pair("control").await;
        let (data, _data_peer) = channel_pair("data").await;
        let shared = SharedState::new();
        let (notifier, clock_peer) = clock_sink(shared.clone()).await;
        let queue = Arc::new(TxPriorityQueue::new());
        let (shutdown_tx, shutdown_rx) = shutdown_channel();

        let handler = ControlHandler::new(
            Arc::clone(&radio) as Arc<dyn RadioDevice>,
            control,
            data,
            queue,
            shared,
            notifier,
            ControlConfig::default(),
            shutdown_rx,
        );
        let handle = tokio::spawn(handler.run());

        Fixture {
            radio,
            control_peer,
            clock_peer,
            shutdown_tx,
            handle,
        }
    }

    impl Fixture {
        async fn exchange(&self, cmd: &str) -> String {
            self.control_peer.send(cmd.as_bytes()).await.unwrap();
            let mut buf = [0u8; 256];
            let n = tokio::time::timeout(Duration::from_secs(2), self.control_peer.recv(&mut buf))
                .await
                .expect("no control response")
                .unwrap();
            String::from_utf8(buf[..n].to_vec()).unwrap()
        }

        async fn finish(self) {
            trigger_shutdown(&self.shutdown_tx);
            self.handle.await.unwrap().unwrap();
        }
    }

    // Scenario E: POWERON before tuning must fail and must not start
    // the radio or the service loops.
    #[tokio::test]
    async fn test_power_on_requires_tuned_frequencies() {
        let f = fixture().await;
        assert_eq!(f.exchange("CMD POWERON").await, "RSP POWERON 1");
        assert!(!f.radio.is_started());

        assert_eq!(f.exchange("CMD RXTUNE 935000").await, "RSP RXTUNE 0");
        assert_eq!(f.exchange("CMD TXTUNE 890000").await, "RSP TXTUNE 0");
        assert_eq!(f.exchange("CMD POWERON").await, "RSP POWERON 0");
        assert!(f.radio.is_started());

        // Second POWERON is idempotent
        assert_eq!(f.exchange("CMD POWERON").await, "RSP POWERON 0");
        f.finish().await;
    }

    #[tokio::test]
    async fn test_tune_failure_is_reported() {
        let f = fixture().await;
        f.radio.fail_tuning();
        assert_eq!(f.exchange("CMD RXTUNE 935000").await, "RSP RXTUNE 1");
        f.finish().await;
    }

    #[tokio::test]
    async fn test_power_commands_require_on() {
        let f = fixture().await;
        assert_eq!(f.exchange("CMD SETPOWER 10").await, "RSP SETPOWER 1");
        assert_eq!(f.exchange("CMD SETTXATTEN 2").await, "RSP SETTXATTEN 1");
        assert_eq!(f.exchange("CMD SETFREQOFFSET 5").await, "RSP SETFREQOFFSET 1");
        // ADJPOWER while off echoes the current level instead
        assert_eq!(f.exchange("CMD ADJPOWER 3").await, "RSP ADJPOWER 0 0");

        f.exchange("CMD RXTUNE 935000").await;
        f.exchange("CMD TXTUNE 890000").await;
        f.exchange("CMD POWERON").await;

        assert_eq!(f.exchange("CMD SETPOWER 10").await, "RSP SETPOWER 0");
        assert_eq!(f.exchange("CMD ADJPOWER -2").await, "RSP ADJPOWER 0 8");
        assert_eq!(f.exchange("CMD SETTXATTEN 1").await, "RSP SETTXATTEN 0");
        f.finish().await;
    }

    #[tokio::test]
    async fn test_rx_gain_echoes_applied_value() {
        let f = fixture().await;
        assert_eq!(f.exchange("CMD SETRXGAIN 12").await, "RSP SETRXGAIN 0 12");
        f.finish().await;
    }

    #[tokio::test]
    async fn test_unparseable_command_gets_no_response() {
        let f = fixture().await;
        f.control_peer.send(b"CMD FROBNICATE 9").await.unwrap();
        let mut buf = [0u8; 64];
        assert!(
            tokio::time::timeout(Duration::from_millis(200), f.control_peer.recv(&mut buf))
                .await
                .is_err(),
            "unparseable command must be dropped silently"
        );
        // The handler is still alive afterwards
        assert_eq!(f.exchange("CMD NOOP").await, "RSP NOOP 0");
        f.finish().await;
    }

    // A receive error on the control socket must not take the handler
    // down; it keeps answering once the peer is reachable again.
    #[tokio::test]
    async fn test_recv_error_does_not_stop_handler() {
        let doomed = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let peer_addr = doomed.local_addr().unwrap();
        let control = Arc::new(
            UdpChannel::bind("control", "127.0.0.1:0".parse().unwrap(), peer_addr)
                .await
                .unwrap(),
        );
        let local_addr = control.local_addr().unwrap();
        drop(doomed);
        control.send(b"ping").await.ok();

        let radio = MockRadio::new();
        let (data, _data_peer) = channel_pair("data").await;
        let shared = SharedState::new();
        let (notifier, _clock_peer) = clock_sink(shared.clone()).await;
        let queue = Arc::new(TxPriorityQueue::new());
        let (shutdown_tx, shutdown_rx) = shutdown_channel();

        let handler = ControlHandler::new(
            Arc::clone(&radio) as Arc<dyn RadioDevice>,
            Arc::clone(&control),
            data,
            queue,
            shared,
            notifier,
            ControlConfig::default(),
            shutdown_rx,
        );
        let handle = tokio::spawn(handler.run());
        tokio::time::sleep(Duration::from_millis(50)).await;

        let peer = UdpSocket::bind(peer_addr).await.unwrap();
        peer.connect(local_addr).await.unwrap();
        peer.send(b"CMD NOOP").await.unwrap();
        let mut buf = [0u8; 64];
        let n = tokio::time::timeout(Duration::from_secs(2), peer.recv(&mut buf))
            .await
            .expect("no response after receive error")
            .unwrap();
        assert_eq!(&buf[..n], b"RSP NOOP 0");

        trigger_shutdown(&shutdown_tx);
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_every_command_triggers_clock_indication() {
        let f = fixture().await;
        f.exchange("CMD NOOP").await;
        let mut buf = [0u8; 64];
        let n = tokio::time::timeout(Duration::from_secs(1), f.clock_peer.recv(&mut buf))
            .await
            .expect("no clock indication before command execution")
            .unwrap();
        assert!(std::str::from_utf8(&buf[..n]).unwrap().starts_with("IND CLOCK "));
        f.finish().await;
    }
}
