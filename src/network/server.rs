//! WebSocket Game Server
//!
//! Async WebSocket server for multiplayer connections.
//! Handles the identity handshake, command routing and disconnect cleanup.
//!
//! A connection whose upgrade request carries a player identity (the
//! `player-id` header, or a `player_id` query parameter) is joined right
//! away and receives game events. Connections without one can still create
//! and list players.

use std::collections::BTreeMap;
use std::fmt::Display;
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, instrument, warn};
use url::form_urlencoded;

use crate::game::player::PlayerId;
use crate::network::connection::ConnectionId;
use crate::network::coordinator::Coordinator;
use crate::network::protocol::{ClientMessage, ErrorCode, ServerError, ServerMessage};

/// Upgrade request header carrying the caller's player id.
pub const PLAYER_ID_HEADER: &str = "player-id";

/// Query parameter accepted when the client cannot set headers.
pub const PLAYER_ID_QUERY: &str = "player_id";

/// How long a closing connection may take to flush its outbound queue.
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address.
    pub bind_addr: SocketAddr,
    /// Maximum concurrent connections.
    pub max_connections: usize,
    /// Time allowed for the WebSocket upgrade.
    pub handshake_timeout: Duration,
    /// Capacity of each connection's outbound queue.
    pub outbound_buffer: usize,
    /// Server version string.
    pub version: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            max_connections: 1000,
            handshake_timeout: Duration::from_secs(30),
            outbound_buffer: 64,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl ServerConfig {
    /// Create config from environment variables, falling back to defaults.
    ///
    /// Reads `TICTACTOE_BIND_ADDR`, `TICTACTOE_MAX_CONNECTIONS`,
    /// `TICTACTOE_OUTBOUND_BUFFER` and `TICTACTOE_HANDSHAKE_TIMEOUT_SECS`.
    pub fn from_env() -> Result<Self, GameServerError> {
        let mut config = Self::default();

        if let Some(addr) = env_parse("TICTACTOE_BIND_ADDR")? {
            config.bind_addr = addr;
        }
        if let Some(max) = env_parse("TICTACTOE_MAX_CONNECTIONS")? {
            config.max_connections = max;
        }
        if let Some(buffer) = env_parse::<usize>("TICTACTOE_OUTBOUND_BUFFER")? {
            if buffer == 0 {
                return Err(GameServerError::InvalidConfig(
                    "TICTACTOE_OUTBOUND_BUFFER must be at least 1".to_string(),
                ));
            }
            config.outbound_buffer = buffer;
        }
        if let Some(secs) = env_parse("TICTACTOE_HANDSHAKE_TIMEOUT_SECS")? {
            config.handshake_timeout = Duration::from_secs(secs);
        }

        Ok(config)
    }
}

fn env_parse<T>(name: &str) -> Result<Option<T>, GameServerError>
where
    T: FromStr,
    T::Err: Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| GameServerError::InvalidConfig(format!("{}={:?}: {}", name, raw, e))),
        Err(_) => Ok(None),
    }
}

/// Game server errors.
#[derive(Debug, thiserror::Error)]
pub enum GameServerError {
    /// Failed to bind to address.
    #[error("Failed to bind: {0}")]
    BindFailed(#[from] std::io::Error),

    /// Configuration value could not be parsed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Connected socket state.
struct ConnectedClient {
    /// Joined player, if any.
    player_id: Option<PlayerId>,
    /// Connection time.
    connected_at: Instant,
}

type Clients = Arc<RwLock<BTreeMap<SocketAddr, ConnectedClient>>>;

/// The game server.
pub struct GameServer {
    /// Server configuration.
    config: ServerConfig,
    /// Session coordinator.
    coordinator: Arc<Coordinator>,
    /// Connected sockets.
    clients: Clients,
    /// Shutdown signal.
    shutdown_tx: broadcast::Sender<()>,
}

impl GameServer {
    /// Create a new game server with an empty coordinator.
    pub fn new(config: ServerConfig) -> Self {
        Self::with_coordinator(config, Arc::new(Coordinator::new()))
    }

    /// Create a game server around an existing coordinator.
    pub fn with_coordinator(config: ServerConfig, coordinator: Arc<Coordinator>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            config,
            coordinator,
            clients: Arc::new(RwLock::new(BTreeMap::new())),
            shutdown_tx,
        }
    }

    /// Bind the configured address and serve until shutdown.
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<(), GameServerError> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        info!("Game server v{} listening on {}", self.config.version, self.config.bind_addr);
        self.serve(listener).await;
        Ok(())
    }

    /// Accept connections from a bound listener until shutdown.
    pub async fn serve(&self, listener: TcpListener) {
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            // Sockets count against the limit from accept, handshake included.
                            {
                                let mut clients = self.clients.write().await;
                                if clients.len() >= self.config.max_connections {
                                    warn!("Connection limit reached, rejecting {}", addr);
                                    continue;
                                }
                                clients.insert(addr, ConnectedClient {
                                    player_id: None,
                                    connected_at: Instant::now(),
                                });
                            }

                            info!("New connection from {}", addr);
                            self.handle_connection(stream, addr);
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
    }

    /// Handle a new WebSocket connection.
    fn handle_connection(&self, stream: TcpStream, addr: SocketAddr) {
        let coordinator = self.coordinator.clone();
        let clients = self.clients.clone();
        let config = self.config.clone();
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            let mut requested_id = None;
            let callback = |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
                requested_id = requested_identity(request);
                Ok(response)
            };

            let handshake = tokio::time::timeout(config.handshake_timeout, accept_hdr_async(stream, callback));
            let ws_stream = match handshake.await {
                Ok(Ok(ws)) => ws,
                Ok(Err(e)) => {
                    error!("WebSocket handshake failed for {}: {}", addr, e);
                    clients.write().await.remove(&addr);
                    return;
                }
                Err(_) => {
                    warn!("WebSocket handshake timed out for {}", addr);
                    clients.write().await.remove(&addr);
                    return;
                }
            };

            let (mut ws_sender, mut ws_receiver) = ws_stream.split();
            let (msg_tx, mut msg_rx) = mpsc::channel::<ServerMessage>(config.outbound_buffer);

            // Drain the outbound queue, then close the socket once every sender is gone.
            let mut sender_task = tokio::spawn(async move {
                while let Some(msg) = msg_rx.recv().await {
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
                let _ = ws_sender.close().await;
            });

            // Join the player named in the upgrade request. A refused join
            // gets one error reply and the connection is closed.
            let mut joined: Option<(PlayerId, ConnectionId)> = None;
            let mut terminate = false;
            if let Some(raw) = requested_id {
                match Self::join_player(&coordinator, &raw, &msg_tx).await {
                    Ok((player_id, connection_id)) => {
                        set_client_player(&clients, addr, Some(player_id)).await;
                        joined = Some((player_id, connection_id));
                    }
                    Err(reply) => {
                        warn!("Refused join from {}: {}", addr, reply.message);
                        let _ = msg_tx.send(ServerMessage::Error(reply)).await;
                        terminate = true;
                    }
                }
            }

            // Handle incoming messages
            while !terminate {
                tokio::select! {
                    msg = ws_receiver.next() => {
                        match msg {
                            Some(Ok(Message::Text(text))) => {
                                match ClientMessage::from_json(&text) {
                                    Ok(client_msg) => {
                                        Self::handle_client_message(
                                            addr,
                                            client_msg,
                                            &coordinator,
                                            &clients,
                                            &mut joined,
                                            &msg_tx,
                                        ).await;
                                    }
                                    Err(e) => {
                                        debug!("Invalid message from {}: {}", addr, e);
                                        let _ = msg_tx.send(ServerMessage::error(
                                            ErrorCode::InvalidInput,
                                            "Invalid message format",
                                        )).await;
                                    }
                                }
                            }
                            Some(Ok(Message::Binary(_))) => {
                                let _ = msg_tx.send(ServerMessage::error(
                                    ErrorCode::InvalidInput,
                                    "Binary frames are not supported",
                                )).await;
                            }
                            Some(Ok(Message::Close(_))) | None => {
                                debug!("Client {} disconnected", addr);
                                terminate = true;
                            }
                            Some(Err(e)) => {
                                error!("WebSocket error for {}: {}", addr, e);
                                terminate = true;
                            }
                            _ => {}
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        let _ = msg_tx.send(ServerMessage::Shutdown {
                            reason: "Server shutting down".to_string(),
                        }).await;
                        terminate = true;
                    }
                }
            }

            // Cleanup runs once: `joined` is cleared by an explicit Leave.
            if let Some((player_id, connection_id)) = joined.take() {
                coordinator.disconnect_connection(player_id, connection_id).await;
            }

            drop(msg_tx);
            if tokio::time::timeout(WRITER_DRAIN_TIMEOUT, &mut sender_task).await.is_err() {
                sender_task.abort();
            }

            if let Some(client) = clients.write().await.remove(&addr) {
                info!(
                    player = ?client.player_id,
                    "Client {} cleaned up after {:?}",
                    addr,
                    client.connected_at.elapsed()
                );
            }
        });
    }

    /// Resolve the requested identity and join it to the coordinator.
    async fn join_player(
        coordinator: &Coordinator,
        raw: &str,
        sender: &mpsc::Sender<ServerMessage>,
    ) -> Result<(PlayerId, ConnectionId), ServerError> {
        let player_id: PlayerId = raw.parse().map_err(|_| {
            ServerError::new(ErrorCode::InvalidInput, format!("invalid player id {:?}", raw))
        })?;

        let connection_id = coordinator
            .join(player_id, sender.clone())
            .await
            .map_err(|e| ServerError::new(ErrorCode::FailedPrecondition, e.to_string()))?;

        Ok((player_id, connection_id))
    }

    /// Handle a client message.
    async fn handle_client_message(
        addr: SocketAddr,
        msg: ClientMessage,
        coordinator: &Coordinator,
        clients: &Clients,
        joined: &mut Option<(PlayerId, ConnectionId)>,
        sender: &mpsc::Sender<ServerMessage>,
    ) {
        match msg {
            ClientMessage::CreatePlayer { name } => {
                let player = coordinator.create_player(name).await;
                let _ = sender.send(ServerMessage::PlayerCreated(player)).await;
            }
            ClientMessage::ListPlayers => {
                let players = coordinator.list_players().await;
                let _ = sender.send(ServerMessage::PlayerList { players }).await;
            }
            ClientMessage::ListJoinedPlayers => {
                let players = coordinator.joined_players().await;
                let _ = sender.send(ServerMessage::PlayerList { players }).await;
            }
            ClientMessage::Command(command) => match *joined {
                Some((player_id, _)) => {
                    if let Err(e) = coordinator.handle_command(player_id, command).await {
                        Coordinator::log_rejection(player_id, &e);
                    }
                }
                None => {
                    let _ = sender.send(ServerMessage::error(
                        ErrorCode::NotJoined,
                        "Connect with a player id before sending game commands",
                    )).await;
                }
            },
            ClientMessage::Leave => match joined.take() {
                Some((player_id, connection_id)) => {
                    coordinator.disconnect_connection(player_id, connection_id).await;
                    set_client_player(clients, addr, None).await;
                }
                None => debug!("Leave from {} without a joined player", addr),
            },
            ClientMessage::Ping { timestamp } => {
                let _ = sender.send(ServerMessage::Pong {
                    timestamp,
                    server_time: Utc::now().timestamp_millis().max(0) as u64,
                }).await;
            }
        }
    }

    /// Shutdown the server.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Session coordinator shared by all connections.
    pub fn coordinator(&self) -> &Arc<Coordinator> {
        &self.coordinator
    }

    /// Get open socket count.
    pub async fn connection_count(&self) -> usize {
        self.clients.read().await.len()
    }

    /// Get the number of open sockets bound to a player.
    pub async fn joined_socket_count(&self) -> usize {
        self.clients
            .read()
            .await
            .values()
            .filter(|client| client.player_id.is_some())
            .count()
    }

    /// Get active session count.
    pub async fn session_count(&self) -> usize {
        self.coordinator.session_count().await
    }
}

async fn set_client_player(clients: &Clients, addr: SocketAddr, player_id: Option<PlayerId>) {
    if let Some(client) = clients.write().await.get_mut(&addr) {
        client.player_id = player_id;
    }
}

/// Player identity from the upgrade request: header first, then query string.
fn requested_identity(request: &Request) -> Option<String> {
    if let Some(value) = request.headers().get(PLAYER_ID_HEADER) {
        return Some(value.to_str().unwrap_or_default().to_string());
    }

    request.uri().query().and_then(|query| {
        form_urlencoded::parse(query.as_bytes())
            .find(|(key, _)| key == PLAYER_ID_QUERY)
            .map(|(_, value)| value.into_owned())
    })
}
