//! Sensor agent with statum typestate lifecycle
//!
//! Each state only exposes the operations valid in it: connecting is only
//! possible once configured, the instruction loop only runs once
//! connected, and the instruction channel is closed in the single
//! `Running -> Terminated` transition.
//!
//! # State Machine
//!
//! ```text
//! Configured ──► Connected ──► Running ──► Terminated
//!   (attach)       (start)      (run_until_terminated)
//! ```

use statum::{machine, state};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::coordinator::{LifecycleCoordinator, RunState};
use super::prompt::Prompt;
use crate::config::SensorConfig;
use crate::display::{DisplayController, EmitterHandle};
use crate::instruction::Instruction;
use crate::mqtt::mqtt_handler::drain_event_task;
use crate::mqtt::{ChannelLink, ConnectionError, InstructionMessage, MqttHandler};
use crate::sensor::BatchSink;

/// How long the event loop may take to flush the disconnect
const EVENT_LOOP_GRACE: Duration = Duration::from_secs(2);

#[state]
#[derive(Debug, Clone)]
pub enum AgentState {
    Configured, // Configuration validated, nothing connected
    Connected,  // Instruction channel established
    Running,    // Emission task spawned, instructions processed
    Terminated, // Channel closed, tasks stopped
}

/// Coordinator and emission task of a running agent
pub struct Session {
    coordinator: LifecycleCoordinator,
    emitter: EmitterHandle,
}

#[machine]
pub struct SensorAgent<S: AgentState> {
    config: SensorConfig,
    interrupt: CancellationToken,
    link: Option<ChannelLink>,
    session: Option<Session>,
    closed_cleanly: bool,
}

impl SensorAgent<Configured> {
    /// `interrupt` requests termination from outside the instruction
    /// channel, e.g. on Ctrl+C.
    pub fn configure(config: SensorConfig, interrupt: CancellationToken) -> Self {
        info!("Configuring sensor agent ({} mode)", config.mode);
        Self::new(config, interrupt, None, None, false)
    }

    /// Gives up early when the interrupt fires during the attempt
    pub async fn connect(self) -> Result<SensorAgent<Connected>, ConnectionError> {
        let mut handler = MqttHandler::new(self.config.mqtt.clone());
        let link = tokio::select! {
            _ = self.interrupt.cancelled() => {
                info!("Interrupted while connecting");
                return Err(ConnectionError::Interrupted {
                    broker: self.config.mqtt.broker(),
                });
            }
            link = handler.connect() => link?,
        };
        Ok(self.attach(link))
    }

    /// Uses an already established channel
    pub fn attach(mut self, link: ChannelLink) -> SensorAgent<Connected> {
        self.link = Some(link);
        self.transition()
    }
}

impl SensorAgent<Connected> {
    /// Spawns the emission task and hands instructions to a fresh
    /// coordinator. The display starts Idle.
    pub fn start(
        mut self,
        prompt: Box<dyn Prompt>,
        sink: Arc<dyn BatchSink>,
    ) -> SensorAgent<Running> {
        let coordinator = LifecycleCoordinator::new(DisplayController::new(), prompt);
        let emitter = EmitterHandle::spawn(
            coordinator.display_watch(),
            self.config.emitter_settings(),
            sink,
        );
        self.session = Some(Session {
            coordinator,
            emitter,
        });
        info!("Sensor agent running");
        self.transition()
    }
}

impl SensorAgent<Running> {
    /// Processes instructions until the run state turns Terminating, then
    /// shuts down.
    pub async fn run_until_terminated(mut self) -> SensorAgent<Terminated> {
        match (self.link.as_mut(), self.session.as_mut()) {
            (Some(link), Some(session)) => {
                instruction_loop(
                    &mut link.instructions,
                    &mut session.coordinator,
                    &self.interrupt,
                )
                .await;
            }
            _ => error!("Running agent without channel or session"),
        }

        self.shutdown().await
    }

    async fn shutdown(mut self) -> SensorAgent<Terminated> {
        if let Some(session) = self.session.take() {
            session.emitter.shutdown().await;
        }

        if let Some(mut link) = self.link.take() {
            match link.handle.close() {
                Ok(()) => {
                    info!("Instruction channel closed");
                    self.closed_cleanly = true;
                }
                Err(e) => warn!("Closing the instruction channel failed: {}", e),
            }
            if let Some(task) = link.event_task.take() {
                drain_event_task(task, EVENT_LOOP_GRACE).await;
            }
        }

        info!("Sensor agent terminated");
        self.transition()
    }
}

impl SensorAgent<Terminated> {
    /// Whether the single close attempt succeeded
    pub fn closed_cleanly(&self) -> bool {
        self.closed_cleanly
    }
}

async fn instruction_loop(
    instructions: &mut mpsc::Receiver<InstructionMessage>,
    coordinator: &mut LifecycleCoordinator,
    interrupt: &CancellationToken,
) {
    println!("Waiting for instructions...");

    loop {
        let message = tokio::select! {
            _ = interrupt.cancelled() => {
                info!("Interrupt received");
                coordinator.terminate();
                break;
            }
            message = instructions.recv() => message,
        };

        let Some(message) = message else {
            warn!("Instruction stream ended");
            coordinator.terminate();
            break;
        };

        let instruction = message.instruction();
        if instruction == Instruction::Unrecognized {
            debug!("Ignoring unrecognized instruction: {}", message);
            continue;
        }
        info!("Instruction message: {}", message);

        let acknowledgement = coordinator.handle(instruction).await;
        if let Some(notice) = acknowledgement.notice() {
            println!("{}", notice);
        }

        if coordinator.run_state() == RunState::Terminating {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SensorMode;
    use crate::display::emitter::tests::RecordingSink;
    use crate::lifecycle::prompt::tests::ScriptedPrompt;
    use crate::mqtt::{ChannelError, ChannelHandle, MqttConfig};
    use crate::sensor::ReadingRange;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingHandle {
        closes: Arc<AtomicUsize>,
        fail: bool,
    }

    impl ChannelHandle for CountingHandle {
        fn close(&mut self) -> Result<(), ChannelError> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(ChannelError::AlreadyClosed)
            } else {
                Ok(())
            }
        }
    }

    struct Harness {
        tx: mpsc::Sender<InstructionMessage>,
        closes: Arc<AtomicUsize>,
        sink: Arc<RecordingSink>,
        interrupt: CancellationToken,
        running: tokio::task::JoinHandle<SensorAgent<Terminated>>,
    }

    impl Harness {
        fn spawn(min: u16, max: u16, period_secs: u64, answers: &[&str], fail_close: bool) -> Self {
            let config = SensorConfig {
                mode: SensorMode::Mockup,
                reading_period: Duration::from_secs(period_secs),
                range: ReadingRange::new(min, max).unwrap(),
                mqtt: MqttConfig::default(),
            };
            let (tx, rx) = mpsc::channel(16);
            let closes = Arc::new(AtomicUsize::new(0));
            let handle = CountingHandle {
                closes: Arc::clone(&closes),
                fail: fail_close,
            };
            let sink = Arc::new(RecordingSink::default());
            let interrupt = CancellationToken::new();

            let agent = SensorAgent::configure(config, interrupt.clone())
                .attach(ChannelLink::new(Box::new(handle), rx))
                .start(Box::new(ScriptedPrompt::new(answers)), sink.clone());
            let running = tokio::spawn(agent.run_until_terminated());

            Self {
                tx,
                closes,
                sink,
                interrupt,
                running,
            }
        }

        async fn send(&self, payload: &str) {
            self.tx
                .send(InstructionMessage::new("sensor_instructions", payload))
                .await
                .unwrap();
        }

        async fn finish(self) -> (SensorAgent<Terminated>, usize) {
            let agent = tokio::time::timeout(Duration::from_secs(60), self.running)
                .await
                .expect("agent should terminate")
                .unwrap();
            (agent, self.closes.load(Ordering::SeqCst))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn operator_session_ends_with_a_single_close() {
        let harness = Harness::spawn(10, 20, 1, &["n"], false);

        harness.send("start").await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(harness.sink.count(), 1);
        let batch = &harness.sink.batches()[0];
        assert_eq!(batch.len(), 64);
        assert!(batch.values().iter().all(|v| (10..=20).contains(v)));

        harness.send("stop").await;
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(harness.sink.count(), 1);

        harness.send("stop").await;
        harness.send("exit").await;

        let sink = Arc::clone(&harness.sink);
        let (agent, closes) = harness.finish().await;
        assert!(agent.closed_cleanly());
        assert_eq!(closes, 1);
        assert_eq!(sink.count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn declined_exit_keeps_running_without_emission() {
        let harness = Harness::spawn(0, 100, 1, &["y", "n"], false);

        harness.send("start").await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        harness.send("exit").await;
        tokio::time::sleep(Duration::from_secs(5)).await;
        let after_exit = harness.sink.count();
        assert_eq!(after_exit, 1);
        assert_eq!(harness.closes.load(Ordering::SeqCst), 0);

        harness.send("start").await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(harness.sink.count(), after_exit + 1);

        harness.send("exit").await;
        let (_, closes) = harness.finish().await;
        assert_eq!(closes, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_payloads_are_ignored() {
        let harness = Harness::spawn(0, 100, 1, &["n"], false);

        harness.send("START").await;
        harness.send("reboot").await;
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(harness.sink.count(), 0);

        harness.send("exit").await;
        let (_, closes) = harness.finish().await;
        assert_eq!(closes, 1);
    }

    #[tokio::test]
    async fn interrupt_terminates_and_closes_once() {
        let harness = Harness::spawn(0, 100, 1, &[], false);

        harness.send("start").await;
        harness.interrupt.cancel();

        let (agent, closes) = harness.finish().await;
        assert!(agent.closed_cleanly());
        assert_eq!(closes, 1);
    }

    #[tokio::test]
    async fn lost_connection_terminates_and_closes_once() {
        let harness = Harness::spawn(0, 100, 1, &[], false);

        let Harness {
            tx,
            closes,
            running,
            ..
        } = harness;
        drop(tx);

        let agent = running.await.unwrap();
        assert!(agent.closed_cleanly());
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_close_still_terminates() {
        let harness = Harness::spawn(0, 100, 1, &["n"], true);

        harness.send("exit").await;

        let (agent, closes) = harness.finish().await;
        assert!(!agent.closed_cleanly());
        assert_eq!(closes, 1);
    }

    #[tokio::test]
    async fn interrupt_cancels_pending_connect() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        // Accepts but never sends ConnAck
        let silent = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(30)).await;
            drop(socket);
        });
        let config = SensorConfig {
            mode: SensorMode::Mockup,
            reading_period: Duration::from_secs(1),
            range: ReadingRange::default(),
            mqtt: MqttConfig {
                host: "127.0.0.1".to_string(),
                port,
                connect_timeout_secs: 20,
                ..MqttConfig::default()
            },
        };
        let interrupt = CancellationToken::new();
        let connecting = tokio::spawn(SensorAgent::configure(config, interrupt.clone()).connect());

        tokio::time::sleep(Duration::from_millis(200)).await;
        interrupt.cancel();

        let result = tokio::time::timeout(Duration::from_secs(2), connecting)
            .await
            .expect("connect should give up on interrupt")
            .unwrap();
        assert!(matches!(result, Err(ConnectionError::Interrupted { .. })));
        silent.abort();
    }
}
