//! Broadcasting protocol client
//!
//! This module handles:
//! - The registration handshake with the simulator
//! - The receive task that feeds frames to the session handler
//! - Outbound commands, queued from any thread
//! - Orderly and faulted shutdown of a connection

use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::session::SessionState;
use crate::state::{ModelView, ModelWriter};
use rc_core::{Event, EventBus};
use rc_protocol::codec::MAX_PACKET_SIZE;
use rc_protocol::{decode, Command, InboundMessage, RegistrationResult};
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::net::{lookup_host, UdpSocket};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{timeout_at, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Lifecycle of a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Closing,
}

/// Queues commands for the receive task of the current connection.
///
/// Sending never blocks; commands queued after the connection closed are
/// dropped.
#[derive(Debug, Clone)]
pub struct CommandSender {
    tx: mpsc::UnboundedSender<Command>,
}

impl CommandSender {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Command>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn send(&self, command: Command) {
        if self.tx.send(command).is_err() {
            debug!("Connection closed, dropping command");
        }
    }
}

struct ActiveConnection {
    /// Set once the simulator accepted the registration
    connection_id: Option<i32>,
    read_only: bool,
    cancel: CancellationToken,
    closed: CancellationToken,
    commands: CommandSender,
    task: Option<JoinHandle<()>>,
}

/// Client for the simulator's broadcasting interface.
///
/// Owns the session model writer; one connection at a time.
pub struct BroadcastClient {
    config: Arc<ClientConfig>,
    bus: EventBus,
    model: ModelWriter,
    state: Arc<Mutex<ConnectionState>>,
    active: Mutex<Option<ActiveConnection>>,
}

impl BroadcastClient {
    pub fn new(config: Arc<ClientConfig>, bus: EventBus, model: ModelWriter) -> Self {
        Self {
            config,
            bus,
            model,
            state: Arc::new(Mutex::new(ConnectionState::Disconnected)),
            active: Mutex::new(None),
        }
    }

    pub fn state(&self) -> ConnectionState {
        *lock(&self.state)
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Read-only view of the model this client writes
    pub fn model(&self) -> ModelView {
        self.model.view()
    }

    /// Id assigned by the simulator to the current connection
    pub fn connection_id(&self) -> Option<i32> {
        if !self.is_connected() {
            return None;
        }
        lock(&self.active)
            .as_ref()
            .and_then(|active| active.connection_id)
    }

    /// Register with the simulator and start receiving.
    ///
    /// Publishes `ConnectionOpened` on success and `ConnectionFailed` when the
    /// handshake is rejected, times out, is cancelled by `disconnect` or the
    /// socket fails.
    pub async fn connect(&self) -> Result<()> {
        let (commands, command_rx) = CommandSender::channel();
        let cancel = CancellationToken::new();
        let closed = CancellationToken::new();
        {
            // Same lock order as `disconnect`
            let mut active = lock(&self.active);
            let mut state = lock(&self.state);
            if *state != ConnectionState::Disconnected {
                return Err(ClientError::AlreadyConnected);
            }
            *state = ConnectionState::Connecting;
            *active = Some(ActiveConnection {
                connection_id: None,
                read_only: false,
                cancel: cancel.clone(),
                closed: closed.clone(),
                commands: commands.clone(),
                task: None,
            });
        }

        info!("Connecting to {}", self.config.address());
        self.model.write().reset();

        let handshake = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ClientError::Cancelled),
            result = self.handshake() => result,
        };
        let (socket, registration) = match handshake {
            Ok(connected) => connected,
            Err(e) => {
                warn!("Connection failed: {}", e);
                {
                    let mut active = lock(&self.active);
                    *active = None;
                    *lock(&self.state) = ConnectionState::Disconnected;
                }
                closed.cancel();
                self.bus.publish(Event::ConnectionFailed {
                    reason: e.to_string(),
                });
                return Err(e);
            }
        };

        let connection_id = registration.connection_id;
        let read_only = registration.read_only;
        {
            let mut active = lock(&self.active);
            let mut state = lock(&self.state);
            if let Some(active) = active.as_mut() {
                active.connection_id = Some(connection_id);
                active.read_only = read_only;
            }
            // A disconnect racing the registration result leaves `Closing`
            if *state == ConnectionState::Connecting {
                *state = ConnectionState::Connected;
            }
        }

        info!(connection_id, read_only, "Connected");
        self.bus.publish(Event::ConnectionOpened {
            connection_id,
            read_only,
            update_interval_ms: self.config.update_interval(),
        });

        commands.send(Command::RequestEntryList);
        commands.send(Command::RequestTrackData);

        let receiver = Receiver {
            socket,
            session: SessionState::new(self.model.share(), self.bus.clone(), commands),
            command_rx,
            cancel,
            closed,
            state: self.state.clone(),
            bus: self.bus.clone(),
            connection_id,
        };
        let task = tokio::spawn(receiver.run());
        if let Some(active) = lock(&self.active).as_mut() {
            active.task = Some(task);
        }
        Ok(())
    }

    /// Queue a command for the current connection
    pub fn send_command(&self, command: Command) {
        match lock(&self.active).as_ref() {
            Some(active) if self.is_connected() => {
                if active.read_only {
                    debug!(?command, "Sending command on a read-only connection");
                }
                active.commands.send(command);
            }
            _ => warn!(?command, "Not connected, dropping command"),
        }
    }

    /// Request shutdown of the current connection. Returns immediately;
    /// `ConnectionClosed` follows once the receive task has unregistered.
    /// During the handshake this aborts `connect` with `ClientError::Cancelled`.
    pub fn disconnect(&self) {
        let active = lock(&self.active);
        let Some(active) = active.as_ref() else {
            return;
        };
        {
            let mut state = lock(&self.state);
            if matches!(
                *state,
                ConnectionState::Connecting | ConnectionState::Connected
            ) {
                *state = ConnectionState::Closing;
            }
        }
        active.cancel.cancel();
    }

    /// Disconnect and wait for the receive task to finish
    pub async fn shutdown(&self) {
        self.disconnect();
        let task = lock(&self.active)
            .as_mut()
            .and_then(|active| active.task.take());
        match task {
            Some(task) => {
                if let Err(e) = task.await {
                    error!("Receive task failed: {}", e);
                }
            }
            None => self.wait_closed().await,
        }
    }

    /// Wait until the current connection has closed, for whatever reason.
    /// Returns immediately when there is no connection.
    pub async fn wait_closed(&self) {
        let closed = lock(&self.active)
            .as_ref()
            .map(|active| active.closed.clone());
        if let Some(closed) = closed {
            closed.cancelled().await;
        }
    }

    async fn handshake(&self) -> Result<(UdpSocket, RegistrationResult)> {
        let address = self.config.address();
        let remote = lookup_host(&address)
            .await?
            .next()
            .ok_or_else(|| ClientError::UnresolvedHost(self.config.address()))?;
        let local: SocketAddr = if remote.is_ipv4() {
            (Ipv4Addr::UNSPECIFIED, 0).into()
        } else {
            (Ipv6Addr::UNSPECIFIED, 0).into()
        };

        let socket = UdpSocket::bind(local).await?;
        socket.connect(remote).await?;

        let register = Command::Register {
            display_name: self.config.display_name.clone(),
            connection_password: self.config.connection_password.clone(),
            update_interval_ms: self.config.update_interval_ms,
            command_password: self.config.command_password.clone(),
        };
        socket.send(&register.encode(0)?).await?;

        let timeout = self.config.handshake_timeout();
        let deadline = Instant::now() + timeout;
        let mut buf = vec![0u8; MAX_PACKET_SIZE];
        loop {
            let len = match timeout_at(deadline, socket.recv(&mut buf)).await {
                Ok(received) => received?,
                Err(_) => return Err(ClientError::HandshakeTimeout(timeout)),
            };
            match decode(&buf[..len]) {
                Ok(InboundMessage::RegistrationResult(result)) if result.success => {
                    return Ok((socket, result));
                }
                Ok(InboundMessage::RegistrationResult(result)) => {
                    return Err(ClientError::HandshakeRejected {
                        message: result.error_message,
                    });
                }
                Ok(other) => debug!(kind = ?other.kind(), "Ignoring frame before registration"),
                Err(e) => warn!("Dropping malformed frame during handshake: {}", e),
            }
        }
    }

    fn set_state(&self, state: ConnectionState) {
        *lock(&self.state) = state;
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// State owned by the receive task of one connection
struct Receiver {
    socket: UdpSocket,
    session: SessionState,
    command_rx: mpsc::UnboundedReceiver<Command>,
    cancel: CancellationToken,
    closed: CancellationToken,
    state: Arc<Mutex<ConnectionState>>,
    bus: EventBus,
    connection_id: i32,
}

impl Receiver {
    async fn run(self) {
        let Receiver {
            socket,
            mut session,
            mut command_rx,
            cancel,
            closed,
            state,
            bus,
            connection_id,
        } = self;
        // Wakes `wait_closed` even if a listener panics on this task
        let _closed = closed.drop_guard();
        let mut buf = vec![0u8; MAX_PACKET_SIZE];

        let requested = loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break true,
                Some(command) = command_rx.recv() => {
                    send(&socket, &command, connection_id).await;
                }
                received = socket.recv(&mut buf) => match received {
                    Ok(len) => {
                        // Malformed frames are logged by the session handler
                        let _ = session.process_datagram(&buf[..len]);
                    }
                    Err(e) => {
                        error!("Socket error, closing connection: {}", e);
                        break false;
                    }
                },
            }
        };

        if requested {
            send(&socket, &Command::Unregister, connection_id).await;
        }

        *lock(&state) = ConnectionState::Disconnected;
        info!(connection_id, requested, "Connection closed");
        bus.publish(Event::ConnectionClosed);
    }
}

async fn send(socket: &UdpSocket, command: &Command, connection_id: i32) {
    let bytes = match command.encode(connection_id) {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(?command, "Failed to encode command: {}", e);
            return;
        }
    };
    if let Err(e) = socket.send(&bytes).await {
        warn!(?command, "Failed to send command: {}", e);
    }
}
