//! WebSocket Game Server
//!
//! Async WebSocket server for room connections. Owns the connection table
//! and routes parsed client messages into the `RoomRegistry`.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use chrono::Utc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, Notify, RwLock};
use tokio::time::interval;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use futures_util::{SinkExt, StreamExt};
use tracing::{debug, error, info, instrument, warn};

use crate::game::rules::RuleConfig;
use crate::network::protocol::{ClientMessage, ErrorCode, ServerError, ServerMessage};
use crate::network::registry::{ConnectionId, MessageSender, RoomError, RoomRegistry};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address.
    pub bind_addr: SocketAddr,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// Interval between WebSocket pings, and between dead-connection sweeps.
    pub heartbeat_interval: Duration,
    /// A connection with no inbound frame (pongs included) for this long has
    /// a dead transport and is dropped. A quiet player whose client answers
    /// pings is never dropped.
    pub idle_timeout: Duration,
    /// Outbound queue depth per connection.
    pub channel_capacity: usize,
    /// Server version string.
    pub version: String,
    /// Rules for new rooms.
    pub rules: RuleConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 3001)),
            max_connections: 1000,
            heartbeat_interval: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(90),
            channel_capacity: 64,
            version: env!("CARGO_PKG_VERSION").to_string(),
            rules: RuleConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Defaults overridden by `RUMMY_*` environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::from_lookup(|key| std::env::var(key).ok());
        config.rules = config.rules.with_env_overrides();
        config
    }

    /// Defaults overridden by whatever `lookup` returns. Unparseable values
    /// are logged and ignored.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(v) = lookup("RUMMY_BIND_ADDR") {
            match v.parse() {
                Ok(addr) => config.bind_addr = addr,
                Err(e) => warn!(value = %v, "Ignoring RUMMY_BIND_ADDR: {}", e),
            }
        }
        if let Some(v) = lookup("RUMMY_MAX_CONNECTIONS") {
            match v.parse() {
                Ok(n) => config.max_connections = n,
                Err(e) => warn!(value = %v, "Ignoring RUMMY_MAX_CONNECTIONS: {}", e),
            }
        }
        if let Some(v) = lookup("RUMMY_HEARTBEAT_SECS") {
            match v.parse::<u64>() {
                Ok(secs) if secs > 0 => config.heartbeat_interval = Duration::from_secs(secs),
                Ok(_) => warn!("Ignoring RUMMY_HEARTBEAT_SECS: must be positive"),
                Err(e) => warn!(value = %v, "Ignoring RUMMY_HEARTBEAT_SECS: {}", e),
            }
        }
        if let Some(v) = lookup("RUMMY_IDLE_TIMEOUT_SECS") {
            match v.parse() {
                Ok(secs) => config.idle_timeout = Duration::from_secs(secs),
                Err(e) => warn!(value = %v, "Ignoring RUMMY_IDLE_TIMEOUT_SECS: {}", e),
            }
        }

        config
    }
}

/// Game server errors.
#[derive(Debug, thiserror::Error)]
pub enum GameServerError {
    /// Failed to bind to address.
    #[error("Failed to bind: {0}")]
    BindFailed(#[from] std::io::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}

/// Connected client state.
struct ConnectedClient {
    addr: SocketAddr,
    connected_at: Instant,
    last_activity: Instant,
    /// Wakes the reader loop when the client is swept.
    kick: Arc<Notify>,
}

type ClientTable = Arc<RwLock<BTreeMap<ConnectionId, ConnectedClient>>>;

/// The game server.
pub struct GameServer {
    config: ServerConfig,
    registry: Arc<RoomRegistry>,
    clients: ClientTable,
    shutdown_tx: broadcast::Sender<()>,
}

impl GameServer {
    /// Create a new game server.
    pub fn new(config: ServerConfig) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        let registry = Arc::new(RoomRegistry::new(config.rules));

        Self {
            config,
            registry,
            clients: Arc::new(RwLock::new(BTreeMap::new())),
            shutdown_tx,
        }
    }

    /// The room registry this server routes into.
    pub fn registry(&self) -> &Arc<RoomRegistry> {
        &self.registry
    }

    /// Bind the configured address and serve until shutdown.
    pub async fn run(&self) -> Result<(), GameServerError> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        self.serve(listener).await
    }

    /// Serve connections from an already bound listener until shutdown.
    #[instrument(skip(self, listener), fields(version = %self.config.version))]
    pub async fn serve(&self, listener: TcpListener) -> Result<(), GameServerError> {
        info!("Rummy server listening on {}", listener.local_addr()?);

        let cleanup_handle = tokio::spawn(Self::run_cleanup_loop(
            self.clients.clone(),
            self.registry.clone(),
            self.config.heartbeat_interval,
            self.config.idle_timeout,
        ));

        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            let clients_count = self.clients.read().await.len();
                            if clients_count >= self.config.max_connections {
                                warn!("Connection limit reached, rejecting {}", addr);
                                Self::reject_connection(stream, addr);
                                continue;
                            }

                            info!("New connection from {}", addr);
                            self.handle_connection(stream, addr).await;
                        }
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        cleanup_handle.abort();
        Ok(())
    }

    /// Tell an over-limit client why, then close.
    fn reject_connection(stream: TcpStream, addr: SocketAddr) {
        tokio::spawn(async move {
            let mut ws = match accept_async(stream).await {
                Ok(ws) => ws,
                Err(e) => {
                    debug!("Handshake failed for rejected {}: {}", addr, e);
                    return;
                }
            };
            let msg = ServerMessage::Error {
                error: ServerError::new(ErrorCode::ServerOverloaded, "Too many connections"),
            };
            if let Ok(text) = msg.to_json() {
                let _ = ws.send(Message::Text(text)).await;
            }
            let _ = ws.close(None).await;
        });
    }

    /// Register a new connection and spawn its reader and writer tasks.
    async fn handle_connection(&self, stream: TcpStream, addr: SocketAddr) {
        let conn = ConnectionId::new_v4();
        let kick = Arc::new(Notify::new());
        {
            let now = Instant::now();
            let mut clients = self.clients.write().await;
            clients.insert(conn, ConnectedClient {
                addr,
                connected_at: now,
                last_activity: now,
                kick: kick.clone(),
            });
        }

        let clients = self.clients.clone();
        let registry = self.registry.clone();
        let capacity = self.config.channel_capacity;
        let heartbeat_interval = self.config.heartbeat_interval;
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            let ws_stream = match accept_async(stream).await {
                Ok(ws) => ws,
                Err(e) => {
                    error!("WebSocket handshake failed for {}: {}", addr, e);
                    clients.write().await.remove(&conn);
                    return;
                }
            };

            let (mut ws_sender, mut ws_receiver) = ws_stream.split();
            let (msg_tx, mut msg_rx) = mpsc::channel::<ServerMessage>(capacity);

            // Writer: drains the outbound queue until every sender is gone,
            // pinging between messages so live clients keep answering.
            let sender_task = tokio::spawn(async move {
                let mut heartbeat = interval(heartbeat_interval);
                heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
                heartbeat.tick().await;

                loop {
                    tokio::select! {
                        msg = msg_rx.recv() => {
                            let Some(msg) = msg else { break };
                            let text = match msg.to_json() {
                                Ok(t) => t,
                                Err(e) => {
                                    error!("Failed to serialize message: {}", e);
                                    continue;
                                }
                            };
                            if ws_sender.send(Message::Text(text)).await.is_err() {
                                return;
                            }
                        }
                        _ = heartbeat.tick() => {
                            if ws_sender.send(Message::Ping(Vec::new())).await.is_err() {
                                return;
                            }
                        }
                    }
                }
                let _ = ws_sender.close().await;
            });

            loop {
                tokio::select! {
                    msg = ws_receiver.next() => {
                        match msg {
                            Some(Ok(Message::Text(text))) => {
                                Self::touch(&clients, &conn).await;
                                match ClientMessage::from_json(&text) {
                                    Ok(client_msg) => {
                                        Self::handle_client_message(&registry, conn, client_msg, &msg_tx).await;
                                    }
                                    Err(e) => {
                                        debug!(connection = %conn, "Invalid message from {}: {}", addr, e);
                                        Self::reply(&msg_tx, ServerMessage::Error {
                                            error: ServerError::new(ErrorCode::InvalidInput, "Invalid message format"),
                                        });
                                    }
                                }
                            }
                            Some(Ok(Message::Binary(_))) => {
                                Self::touch(&clients, &conn).await;
                                Self::reply(&msg_tx, ServerMessage::Error {
                                    error: ServerError::new(ErrorCode::InvalidInput, "Binary frames are not supported"),
                                });
                            }
                            Some(Ok(Message::Close(_))) | None => {
                                debug!(connection = %conn, "Client {} disconnected", addr);
                                break;
                            }
                            Some(Err(e)) => {
                                warn!(connection = %conn, "WebSocket error for {}: {}", addr, e);
                                break;
                            }
                            // Pongs land here and keep the connection alive
                            Some(Ok(_)) => {
                                Self::touch(&clients, &conn).await;
                            }
                        }
                    }
                    _ = kick.notified() => {
                        debug!(connection = %conn, "Closing idle connection {}", addr);
                        break;
                    }
                    _ = shutdown_rx.recv() => {
                        Self::reply(&msg_tx, ServerMessage::Shutdown {
                            reason: "Server shutting down".to_string(),
                        });
                        break;
                    }
                }
            }

            // Leaving the room drops the registry's copy of the sender, so the
            // writer flushes what is queued and closes the socket.
            registry.disconnect(conn).await;
            let lifetime = clients.write().await.remove(&conn).map(|c| c.connected_at.elapsed());
            drop(msg_tx);
            if tokio::time::timeout(Duration::from_secs(5), sender_task).await.is_err() {
                debug!(connection = %conn, "Writer for {} did not finish", addr);
            }

            info!(
                connection = %conn,
                connected_secs = lifetime.map_or(0, |d| d.as_secs()),
                "Client {} cleaned up",
                addr
            );
        });
    }

    async fn touch(clients: &ClientTable, conn: &ConnectionId) {
        let mut clients = clients.write().await;
        if let Some(client) = clients.get_mut(conn) {
            client.last_activity = Instant::now();
        }
    }

    fn reply(sender: &MessageSender, message: ServerMessage) {
        if let Err(e) = sender.try_send(message) {
            warn!("Dropped reply: {}", e);
        }
    }

    /// Route one parsed client message. Failures go back to this connection
    /// only, as `create-error`, `join-error` or `error`.
    pub(crate) async fn handle_client_message(
        registry: &RoomRegistry,
        conn: ConnectionId,
        msg: ClientMessage,
        sender: &MessageSender,
    ) {
        match msg {
            ClientMessage::CreateRoom { player } => {
                if let Err(e) = registry.create_room(conn, player, sender.clone()).await {
                    debug!(connection = %conn, "Create rejected: {}", e);
                    Self::reply(sender, ServerMessage::CreateError { error: e.to_server_error() });
                }
            }
            ClientMessage::JoinRoom { code, player } => {
                if let Err(e) = registry.join_room(conn, &code, player, sender.clone()).await {
                    debug!(connection = %conn, room = %code, "Join rejected: {}", e);
                    Self::reply(sender, ServerMessage::JoinError { error: e.to_server_error() });
                }
            }
            ClientMessage::StartGame => {
                if let Err(e) = registry.start_game(conn).await {
                    debug!(connection = %conn, "Start rejected: {}", e);
                    Self::reply(sender, ServerMessage::Error { error: e.to_server_error() });
                }
            }
            ClientMessage::GameAction(request) => {
                if let Err(e) = registry.dispatch_action(conn, &request).await {
                    debug!(connection = %conn, room = %request.code, player = %request.player_id, "Action rejected: {}", e);
                    Self::reply(sender, ServerMessage::Error { error: e.to_server_error() });
                }
            }
            ClientMessage::LeaveRoom => {
                if !registry.disconnect(conn).await {
                    Self::reply(sender, ServerMessage::Error { error: RoomError::NotInRoom.to_server_error() });
                }
            }
            ClientMessage::Ping { timestamp } => {
                Self::reply(sender, ServerMessage::Pong {
                    timestamp,
                    server_time: Utc::now().timestamp_millis().max(0) as u64,
                });
            }
        }
    }

    /// Every `every`, drop connections that have not sent a frame (a pong
    /// counts) for `idle_timeout`. Only dead transports qualify: live
    /// clients answer the writer's pings.
    async fn run_cleanup_loop(
        clients: ClientTable,
        registry: Arc<RoomRegistry>,
        every: Duration,
        idle_timeout: Duration,
    ) {
        let mut interval = interval(every);

        loop {
            interval.tick().await;

            let now = Instant::now();
            let idle: Vec<_> = {
                let mut clients = clients.write().await;
                let ids: Vec<ConnectionId> = clients
                    .iter()
                    .filter(|(_, c)| now.duration_since(c.last_activity) > idle_timeout)
                    .map(|(id, _)| *id)
                    .collect();
                ids.into_iter().filter_map(|id| clients.remove(&id).map(|c| (id, c))).collect()
            };

            for (conn, client) in idle {
                registry.disconnect(conn).await;
                client.kick.notify_one();
                info!(
                    connection = %conn,
                    connected_secs = client.connected_at.elapsed().as_secs(),
                    "Removed unresponsive client {}",
                    client.addr
                );
            }
        }
    }

    /// Shutdown the server.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Get active connection count.
    pub async fn connection_count(&self) -> usize {
        self.clients.read().await.len()
    }

    /// Get live room count.
    pub async fn room_count(&self) -> usize {
        self.registry.room_count().await
    }
}
