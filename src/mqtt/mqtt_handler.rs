use std::io;
use std::time::Duration;

use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::config::MqttConfig;
use super::message_manager::InstructionMessage;
use super::{ChannelHandle, ChannelLink};

#[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Failed,
}

/// Why the broker connection could not be established
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("Connection to MQTT broker ({broker}) refused. Please make sure the server is running and reachable.")]
    Refused { broker: String },

    #[error("Connection to MQTT broker ({broker}) timed out after {}s. Please check your network connection and try again.", timeout.as_secs())]
    TimedOut { broker: String, timeout: Duration },

    #[error("Failed to connect to MQTT broker ({broker}): {reason}")]
    Other { broker: String, reason: String },

    #[error("Connection to MQTT broker ({broker}) interrupted")]
    Interrupted { broker: String },
}

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("Failed to disconnect from broker: {0}")]
    Close(#[from] rumqttc::ClientError),

    #[error("Channel already closed")]
    AlreadyClosed,
}

/// Establishes the instruction channel
#[derive(Debug)]
pub struct MqttHandler {
    config: MqttConfig,
    state: ConnectionState,
}

impl MqttHandler {
    pub fn new(config: MqttConfig) -> Self {
        Self {
            config,
            state: ConnectionState::default(),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Connects, subscribes to the instruction topic and spawns the event
    /// loop task. Fails without side effects on the instruction path.
    pub async fn connect(&mut self) -> Result<ChannelLink, ConnectionError> {
        let broker = self.config.broker();
        let mut mqtt_options =
            MqttOptions::new(&self.config.client_id, &self.config.host, self.config.port);
        mqtt_options.set_keep_alive(self.config.keep_alive());

        let (client, mut event_loop) = AsyncClient::new(mqtt_options, self.config.channel_capacity);
        // rumqttc bounds the TCP connect and ConnAck with its own timeout
        event_loop
            .network_options
            .set_connection_timeout(self.config.connect_timeout_secs);

        self.set_state(ConnectionState::Connecting);
        let timeout = self.config.connect_timeout();
        match tokio::time::timeout(timeout, wait_for_connack(&mut event_loop)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                self.set_state(ConnectionState::Failed);
                let error = classify(broker, timeout, e);
                error!("{}", error);
                return Err(error);
            }
            Err(_) => {
                self.set_state(ConnectionState::Failed);
                let error = ConnectionError::TimedOut { broker, timeout };
                error!("{}", error);
                return Err(error);
            }
        }
        self.set_state(ConnectionState::Connected);
        info!("Connection to MQTT broker ({}) successful", broker);

        // Nothing polls the event loop yet, so the request must not wait for it
        if let Err(e) = client.try_subscribe(&self.config.topic, QoS::AtLeastOnce) {
            self.set_state(ConnectionState::Failed);
            return Err(ConnectionError::Other {
                broker,
                reason: format!("subscription to {} failed: {}", self.config.topic, e),
            });
        }
        info!("Subscribed to topic {}", self.config.topic);

        let (instruction_tx, instruction_rx) = mpsc::channel(self.config.channel_capacity);
        let topic = self.config.topic.clone();
        let event_task = tokio::spawn(async move {
            forward_instructions(event_loop, topic, instruction_tx).await;
            info!("Connection state: {:?}", ConnectionState::Disconnected);
        });

        let handle = MqttChannel::new(client);
        Ok(ChannelLink::new(Box::new(handle), instruction_rx).with_event_task(event_task))
    }

    fn set_state(&mut self, state: ConnectionState) {
        debug!("Connection state: {:?} -> {:?}", self.state, state);
        self.state = state;
    }
}

async fn wait_for_connack(event_loop: &mut EventLoop) -> Result<(), rumqttc::ConnectionError> {
    loop {
        match event_loop.poll().await? {
            Event::Incoming(Packet::ConnAck(ack)) => {
                debug!("ConnAck received: {:?}", ack.code);
                return Ok(());
            }
            event => debug!("Event before ConnAck: {:?}", event),
        }
    }
}

fn classify(
    broker: String,
    timeout: Duration,
    error: rumqttc::ConnectionError,
) -> ConnectionError {
    match error {
        rumqttc::ConnectionError::ConnectionRefused(code) => {
            debug!("Broker refused connection: {:?}", code);
            ConnectionError::Refused { broker }
        }
        rumqttc::ConnectionError::Io(ref e) if e.kind() == io::ErrorKind::ConnectionRefused => {
            ConnectionError::Refused { broker }
        }
        rumqttc::ConnectionError::Io(ref e) if e.kind() == io::ErrorKind::TimedOut => {
            ConnectionError::TimedOut { broker, timeout }
        }
        rumqttc::ConnectionError::NetworkTimeout => ConnectionError::TimedOut { broker, timeout },
        other => ConnectionError::Other {
            broker,
            reason: other.to_string(),
        },
    }
}

/// Polls the event loop and forwards instruction publishes in arrival
/// order. Ends when the connection drops, a disconnect has been sent, or
/// nobody listens anymore; dropping the sender then ends the stream.
async fn forward_instructions(
    mut event_loop: EventLoop,
    topic: String,
    instruction_tx: mpsc::Sender<InstructionMessage>,
) {
    loop {
        match event_loop.poll().await {
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                if publish.topic != topic {
                    debug!("Ignoring publish on foreign topic {}", publish.topic);
                    continue;
                }
                let message = InstructionMessage::from_publish(&publish.topic, &publish.payload);
                if instruction_tx.send(message).await.is_err() {
                    debug!("Instruction receiver dropped, stopping event loop");
                    break;
                }
            }
            Ok(Event::Incoming(Packet::Disconnect)) => {
                warn!("Broker closed the connection");
                break;
            }
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                info!("Disconnect sent to broker");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                error!("MQTT connection lost: {}", e);
                break;
            }
        }
    }
}

/// Client side of the broker connection; closes at most once
pub struct MqttChannel {
    client: AsyncClient,
    closed: bool,
}

impl MqttChannel {
    pub fn new(client: AsyncClient) -> Self {
        Self {
            client,
            closed: false,
        }
    }
}

impl ChannelHandle for MqttChannel {
    fn close(&mut self) -> Result<(), ChannelError> {
        if self.closed {
            return Err(ChannelError::AlreadyClosed);
        }
        self.closed = true;
        self.client.try_disconnect()?;
        info!("Disconnect requested");
        Ok(())
    }
}

/// Gives the event loop time to flush the disconnect, then aborts it
pub(crate) async fn drain_event_task(task: tokio::task::JoinHandle<()>, grace: Duration) {
    let abort = task.abort_handle();
    match tokio::time::timeout(grace, task).await {
        Ok(Ok(())) => debug!("Event loop task finished"),
        Ok(Err(e)) if e.is_cancelled() => debug!("Event loop task cancelled"),
        Ok(Err(e)) => error!("Event loop task panicked: {}", e),
        Err(_) => {
            warn!("Event loop did not finish within {:?}, aborting", grace);
            abort.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rumqttc::ConnectReturnCode;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::time::Instant;

    const BROKER: &str = "mqtt://localhost:1883";
    const TIMEOUT: Duration = Duration::from_secs(10);

    #[test]
    fn refused_return_code_is_refused() {
        let error = classify(
            BROKER.to_string(),
            TIMEOUT,
            rumqttc::ConnectionError::ConnectionRefused(ConnectReturnCode::NotAuthorized),
        );
        assert!(matches!(error, ConnectionError::Refused { .. }));
    }

    #[test]
    fn refused_socket_is_refused() {
        let error = classify(
            BROKER.to_string(),
            TIMEOUT,
            rumqttc::ConnectionError::Io(io::Error::from(io::ErrorKind::ConnectionRefused)),
        );
        assert!(matches!(error, ConnectionError::Refused { .. }));
        assert!(error.to_string().contains("refused"));
    }

    #[test]
    fn network_timeout_is_timed_out() {
        let error = classify(
            BROKER.to_string(),
            TIMEOUT,
            rumqttc::ConnectionError::NetworkTimeout,
        );
        assert!(matches!(error, ConnectionError::TimedOut { .. }));
    }

    #[test]
    fn other_transport_failures_keep_their_reason() {
        let error = classify(
            BROKER.to_string(),
            TIMEOUT,
            rumqttc::ConnectionError::Io(io::Error::new(io::ErrorKind::Other, "tls handshake")),
        );
        match error {
            ConnectionError::Other { reason, .. } => assert!(reason.contains("tls handshake")),
            other => panic!("expected Other, got {other:?}"),
        }
    }

    fn local_config(port: u16, connect_timeout_secs: u64) -> MqttConfig {
        MqttConfig {
            host: "127.0.0.1".to_string(),
            port,
            connect_timeout_secs,
            ..MqttConfig::default()
        }
    }

    #[tokio::test]
    async fn closed_port_is_refused() {
        // Bind then drop to get a loopback port nobody listens on
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let mut handler = MqttHandler::new(local_config(port, 2));

        let result = handler.connect().await;

        assert!(matches!(result, Err(ConnectionError::Refused { .. })));
        assert_eq!(handler.state(), ConnectionState::Failed);
    }

    #[tokio::test]
    async fn silent_broker_times_out_after_configured_timeout() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        // Accepts and holds the socket without ever answering
        let silent = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(30)).await;
            drop(socket);
        });
        let mut handler = MqttHandler::new(local_config(port, 7));

        let started = Instant::now();
        let result = handler.connect().await;
        let elapsed = started.elapsed();

        match result {
            Err(ConnectionError::TimedOut { timeout, .. }) => {
                assert_eq!(timeout, Duration::from_secs(7))
            }
            Err(other) => panic!("expected TimedOut, got {other:?}"),
            Ok(_) => panic!("silent broker must not connect"),
        }
        assert!(elapsed >= Duration::from_millis(6_500), "gave up after {elapsed:?}");
        assert!(elapsed < Duration::from_secs(12), "gave up after {elapsed:?}");
        silent.abort();
    }

    #[tokio::test]
    async fn connect_completes_once_broker_acknowledges() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let broker = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut connect = [0u8; 256];
            let _ = socket.read(&mut connect).await.unwrap();
            // CONNACK, session not present, accepted
            socket.write_all(&[0x20, 0x02, 0x00, 0x00]).await.unwrap();
            tokio::time::sleep(Duration::from_secs(30)).await;
            drop(socket);
        });
        let config = MqttConfig {
            channel_capacity: 1,
            ..local_config(port, 5)
        };
        let mut handler = MqttHandler::new(config);

        let link = tokio::time::timeout(Duration::from_secs(10), handler.connect())
            .await
            .expect("connect must not hang after ConnAck")
            .expect("broker accepted the connection");

        assert_eq!(handler.state(), ConnectionState::Connected);
        if let Some(task) = link.event_task {
            task.abort();
        }
        broker.abort();
    }

    #[test]
    fn channel_closes_only_once() {
        let (client, _event_loop) = AsyncClient::new(MqttOptions::new("test", "localhost", 1883), 10);
        let mut channel = MqttChannel::new(client);

        assert!(channel.close().is_ok());
        assert!(matches!(channel.close(), Err(ChannelError::AlreadyClosed)));
    }
}
