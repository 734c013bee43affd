//! WebSocket Lobby Server
//!
//! Async WebSocket server for browser clients.
//! Each connection gets a reader task and a writer task; all lobby logic
//! runs on the coordinator actor.

use std::collections::BTreeMap;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch, OwnedSemaphorePermit, RwLock, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::timeout;
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, instrument, warn};

use crate::config::ServerConfig;
use crate::lobby::state::{ConnectionId, Lobby};
use crate::network::actor::{CoordinatorHandle, CoordinatorStopped};
use crate::network::protocol::{ClientMessage, ServerMessage};

/// Lobby server errors.
#[derive(Debug, thiserror::Error)]
pub enum LobbyServerError {
    /// Failed to bind to address.
    #[error("Failed to bind: {0}")]
    BindFailed(#[from] std::io::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Coordinator task is gone.
    #[error("Coordinator error: {0}")]
    Coordinator(#[from] CoordinatorStopped),
}

/// Connected client state.
struct ConnectedClient {
    /// Peer address.
    addr: SocketAddr,
    /// Connection time.
    connected_at: Instant,
}

type ClientTable = Arc<RwLock<BTreeMap<ConnectionId, ConnectedClient>>>;

/// The lobby server.
pub struct LobbyServer {
    /// Server configuration.
    config: Arc<ServerConfig>,
    /// Coordinator actor.
    coordinator: CoordinatorHandle,
    /// Coordinator task handle.
    coordinator_task: JoinHandle<()>,
    /// Connected clients.
    clients: ClientTable,
    /// One permit per accepted socket, held from accept until the task ends.
    connection_slots: Arc<Semaphore>,
    /// Shutdown flag.
    shutdown_tx: watch::Sender<bool>,
}

impl LobbyServer {
    /// Create a new lobby server. Must be called inside a tokio runtime.
    pub fn new(config: ServerConfig) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        let (coordinator, coordinator_task) =
            CoordinatorHandle::spawn(config.policy, config.command_buffer);
        let slots = config.max_connections.min(Semaphore::MAX_PERMITS);

        Self {
            config: Arc::new(config),
            coordinator,
            coordinator_task,
            clients: Arc::new(RwLock::new(BTreeMap::new())),
            connection_slots: Arc::new(Semaphore::new(slots)),
            shutdown_tx,
        }
    }

    /// Bind the configured address and serve until shutdown.
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<(), LobbyServerError> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        self.serve(listener).await
    }

    /// Serve on an already bound listener until shutdown.
    ///
    /// Returns once every connection task has finished, so all closed
    /// connections have been reported to the coordinator by then.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), LobbyServerError> {
        info!(
            "Lobby server v{} listening on {}",
            self.config.version,
            listener.local_addr()?
        );

        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let mut connections = JoinSet::new();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            let permit = match self.connection_slots.clone().try_acquire_owned() {
                                Ok(permit) => permit,
                                Err(_) => {
                                    warn!("Connection limit reached, rejecting {}", addr);
                                    continue;
                                }
                            };

                            debug!("New connection from {}", addr);
                            connections.spawn(self.handle_connection(stream, addr, permit));
                        }
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                }
                Some(finished) = connections.join_next(), if !connections.is_empty() => {
                    if let Err(e) = finished {
                        error!("Connection task failed: {}", e);
                    }
                }
                _ = stopped(&mut shutdown_rx) => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        drop(listener);
        debug!("Waiting for {} connection tasks", connections.len());
        while let Some(finished) = connections.join_next().await {
            if let Err(e) = finished {
                error!("Connection task failed: {}", e);
            }
        }
        info!("All connections closed");

        Ok(())
    }

    /// Build the task for a new WebSocket connection.
    fn handle_connection(
        &self,
        stream: TcpStream,
        addr: SocketAddr,
        permit: OwnedSemaphorePermit,
    ) -> impl Future<Output = ()> + Send + 'static {
        let clients = self.clients.clone();
        let coordinator = self.coordinator.clone();
        let config = self.config.clone();
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        async move {
            let _permit = permit;
            let origin_config = config.clone();
            let check_origin = move |request: &Request, response: Response| {
                let origin = request
                    .headers()
                    .get("origin")
                    .and_then(|v| v.to_str().ok());
                if origin_config.origin_allowed(origin) {
                    Ok(response)
                } else {
                    warn!("Rejected handshake from {} with origin {:?}", addr, origin);
                    let mut rejection =
                        ErrorResponse::new(Some("Origin not allowed".to_string()));
                    *rejection.status_mut() = StatusCode::FORBIDDEN;
                    Err(rejection)
                }
            };

            let handshake = accept_hdr_async(stream, check_origin);
            let ws_stream = match timeout(config.connection_timeout, handshake).await {
                Ok(Ok(ws)) => ws,
                Ok(Err(e)) => {
                    error!("WebSocket handshake failed for {}: {}", addr, e);
                    return;
                }
                Err(_) => {
                    warn!("WebSocket handshake timed out for {}", addr);
                    return;
                }
            };

            let connection = ConnectionId::random();
            let (mut ws_sender, mut ws_receiver) = ws_stream.split();
            let (msg_tx, mut msg_rx) = mpsc::channel::<ServerMessage>(config.outbound_buffer);

            // Register client
            {
                let mut clients = clients.write().await;
                clients.insert(connection, ConnectedClient {
                    addr,
                    connected_at: Instant::now(),
                });
            }
            if coordinator.connect(connection, msg_tx).await.is_err() {
                clients.write().await.remove(&connection);
                return;
            }
            info!("A user connected: {} from {}", connection, addr);

            // Spawn message sender task
            let sender_task = tokio::spawn(async move {
                while let Some(msg) = msg_rx.recv().await {
                    let text = match msg.to_json() {
                        Ok(t) => t,
                        Err(e) => {
                            error!("Failed to serialize message: {}", e);
                            continue;
                        }
                    };
                    if ws_sender.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                let _ = ws_sender.close().await;
            });

            // Handle incoming messages
            loop {
                tokio::select! {
                    msg = ws_receiver.next() => {
                        match msg {
                            Some(Ok(Message::Text(text))) => {
                                let client_msg = match ClientMessage::from_json(&text) {
                                    Ok(m) => m,
                                    Err(e) => {
                                        debug!("Invalid message from {}: {}", connection, e);
                                        continue;
                                    }
                                };
                                if coordinator.send(connection, client_msg).await.is_err() {
                                    break;
                                }
                            }
                            Some(Ok(Message::Binary(_))) => {
                                debug!("Ignoring binary frame from {}", connection);
                            }
                            Some(Ok(Message::Close(_))) | None => {
                                break;
                            }
                            Some(Err(e)) => {
                                warn!("WebSocket error for {}: {}", connection, e);
                                break;
                            }
                            _ => {}
                        }
                    }
                    _ = stopped(&mut shutdown_rx) => {
                        break;
                    }
                }
            }

            // Cleanup: the coordinator drops our outbound queue, which ends the sender task.
            let _ = coordinator.disconnect(connection).await;
            let _ = sender_task.await;

            let session = clients.write().await.remove(&connection);
            match session {
                Some(client) => info!(
                    "A user disconnected: {} from {} after {:?}",
                    connection,
                    client.addr,
                    client.connected_at.elapsed()
                ),
                None => info!("A user disconnected: {}", connection),
            }
        }
    }

    /// Shutdown the server.
    pub fn shutdown(&self) {
        self.shutdown_tx.send_replace(true);
    }

    /// Get active connection count.
    pub async fn connection_count(&self) -> usize {
        self.clients.read().await.len()
    }

    /// Get active lobby count.
    pub async fn lobby_count(&self) -> Result<usize, LobbyServerError> {
        Ok(self.coordinator.lobby_count().await?)
    }

    /// Get a copy of a lobby's state.
    pub async fn lobby(&self, key: &str) -> Result<Option<Lobby>, LobbyServerError> {
        Ok(self.coordinator.snapshot(key).await?)
    }
}

/// Resolves once shutdown has been requested, including before the call.
async fn stopped(shutdown_rx: &mut watch::Receiver<bool>) {
    let _ = shutdown_rx.wait_for(|stopped| *stopped).await;
}

impl Drop for LobbyServer {
    fn drop(&mut self) {
        self.coordinator_task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;
    use tokio_tungstenite::tungstenite::client::IntoClientRequest;
    use tokio_tungstenite::{client_async, connect_async, MaybeTlsStream, WebSocketStream};

    type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

    async fn start(config: ServerConfig) -> (Arc<LobbyServer>, SocketAddr, JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = Arc::new(LobbyServer::new(config));
        let serving = server.clone();
        let task = tokio::spawn(async move {
            serving.serve(listener).await.unwrap();
        });
        (server, addr, task)
    }

    async fn connect(addr: SocketAddr) -> Client {
        let (ws, _) = connect_async(format!("ws://{}", addr)).await.unwrap();
        ws
    }

    async fn send(ws: &mut Client, msg: ClientMessage) {
        ws.send(Message::Text(msg.to_json().unwrap())).await.unwrap();
    }

    async fn recv(ws: &mut Client) -> ServerMessage {
        loop {
            let frame = timeout(Duration::from_secs(5), ws.next())
                .await
                .expect("timed out waiting for server")
                .expect("stream ended")
                .unwrap();
            if let Message::Text(text) = frame {
                return ServerMessage::from_json(&text).unwrap();
            }
        }
    }

    async fn join(ws: &mut Client, lobby: &str, name: &str) {
        send(ws, ClientMessage::JoinLobby {
            lobby_id: lobby.into(),
            player_name: name.into(),
        })
        .await;
    }

    async fn expect_closed(ws: &mut Client) {
        loop {
            let frame = timeout(Duration::from_secs(5), ws.next())
                .await
                .expect("timed out waiting for close");
            match frame {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => return,
                Some(Ok(_)) => {}
            }
        }
    }

    async fn wait_for_connect(addr: SocketAddr) -> Client {
        for _ in 0..50 {
            if let Ok((ws, _)) = connect_async(format!("ws://{}", addr)).await {
                return ws;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("server never accepted another connection");
    }

    fn scores_of(msg: ServerMessage) -> Vec<(String, i64)> {
        match msg {
            ServerMessage::ScoresUpdated { scores } => scores.into_iter().collect(),
            other => panic!("expected scores, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_server_creation() {
        let config = ServerConfig {
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            ..Default::default()
        };
        let server = LobbyServer::new(config);

        assert_eq!(server.connection_count().await, 0);
        assert_eq!(server.lobby_count().await.unwrap(), 0);
        server.shutdown();
    }

    #[tokio::test]
    async fn test_round_over_websocket() {
        let (server, addr, _) = start(ServerConfig::default()).await;
        let mut amy = connect(addr).await;
        let mut bo = connect(addr).await;

        join(&mut amy, "L1", "Amy").await;
        assert_eq!(recv(&mut amy).await, ServerMessage::LeaderAssigned { leader: "Amy".into() });
        assert_eq!(scores_of(recv(&mut amy).await), vec![("Amy".to_string(), 0)]);

        join(&mut bo, "L1", "Bo").await;
        for ws in [&mut amy, &mut bo] {
            assert_eq!(recv(ws).await, ServerMessage::LeaderAssigned { leader: "Amy".into() });
            assert_eq!(
                scores_of(recv(ws).await),
                vec![("Amy".to_string(), 0), ("Bo".to_string(), 0)]
            );
        }

        send(&mut amy, ClientMessage::StartGame { lobby_id: "L1".into() }).await;
        assert_eq!(recv(&mut bo).await, ServerMessage::GameStarted);
        assert_eq!(recv(&mut amy).await, ServerMessage::GameStarted);

        let question = ClientMessage::QuestionSelected { category: "Science".into(), value: 400 };
        send(&mut amy, question).await;
        let opened = ServerMessage::QuestionSelected { category: "Science".into(), value: 400 };
        assert_eq!(recv(&mut amy).await, opened);
        assert_eq!(recv(&mut bo).await, opened);

        send(&mut bo, ClientMessage::Buzz { player_name: "Bo".into() }).await;
        let pressed = ServerMessage::BuzzerPressed { player_name: "Bo".into() };
        assert_eq!(recv(&mut bo).await, pressed);
        assert_eq!(recv(&mut amy).await, pressed);

        // Late buzz is dropped; the next thing Amy sees is her own score update
        send(&mut amy, ClientMessage::Buzz { player_name: "Amy".into() }).await;
        send(&mut amy, ClientMessage::UpdateScore { player_name: "Bo".into(), score: 400 }).await;
        assert_eq!(
            scores_of(recv(&mut amy).await),
            vec![("Amy".to_string(), 0), ("Bo".to_string(), 400)]
        );
        assert_eq!(
            scores_of(recv(&mut bo).await),
            vec![("Amy".to_string(), 0), ("Bo".to_string(), 400)]
        );

        let lobby = server.lobby("L1").await.unwrap().unwrap();
        assert!(lobby.buzzer_winner.is_none());
        assert_eq!(lobby.leader, "Amy");

        // Malformed frames are ignored without closing the connection
        amy.send(Message::Text("{\"type\":\"nonsense\"}".into())).await.unwrap();
        bo.close(None).await.unwrap();
        assert_eq!(scores_of(recv(&mut amy).await), vec![("Amy".to_string(), 0)]);

        amy.close(None).await.unwrap();
        let mut remaining = 1;
        for _ in 0..50 {
            remaining = server.lobby_count().await.unwrap();
            if remaining == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(remaining, 0);

        server.shutdown();
    }

    #[tokio::test]
    async fn test_rejects_disallowed_origin() {
        let config = ServerConfig {
            allowed_origin: Some("http://localhost:3000".into()),
            ..Default::default()
        };
        let (server, addr, _) = start(config).await;

        let mut request = format!("ws://{}", addr).into_client_request().unwrap();
        request
            .headers_mut()
            .insert("origin", "http://evil.example".parse().unwrap());
        assert!(connect_async(request).await.is_err());

        let mut request = format!("ws://{}", addr).into_client_request().unwrap();
        request
            .headers_mut()
            .insert("origin", "http://localhost:3000".parse().unwrap());
        assert!(connect_async(request).await.is_ok());

        server.shutdown();
    }

    #[tokio::test]
    async fn test_connection_limit_counts_pending_handshakes() {
        let config = ServerConfig {
            max_connections: 1,
            ..Default::default()
        };
        let (server, addr, _) = start(config).await;

        // Both sockets connect before either handshake starts
        let a = MaybeTlsStream::Plain(TcpStream::connect(addr).await.unwrap());
        let b = MaybeTlsStream::Plain(TcpStream::connect(addr).await.unwrap());
        let url = format!("ws://{}", addr);
        let (a, b) = tokio::join!(client_async(url.clone(), a), client_async(url, b));

        let mut open: Vec<_> = [a, b].into_iter().filter_map(Result::ok).collect();
        assert_eq!(open.len(), 1);

        let (mut admitted, _) = open.pop().unwrap();
        join(&mut admitted, "L1", "Amy").await;
        let leader = recv(&mut admitted).await;
        assert_eq!(leader, ServerMessage::LeaderAssigned { leader: "Amy".into() });
        assert_eq!(server.connection_count().await, 1);

        // Closing the admitted client frees its slot
        admitted.close(None).await.unwrap();
        let mut next = wait_for_connect(addr).await;
        join(&mut next, "L1", "Bo").await;
        assert_eq!(recv(&mut next).await, ServerMessage::LeaderAssigned { leader: "Bo".into() });

        server.shutdown();
    }

    #[tokio::test]
    async fn test_idle_handshake_times_out() {
        let config = ServerConfig {
            max_connections: 1,
            connection_timeout: Duration::from_millis(300),
            ..Default::default()
        };
        let (server, addr, _) = start(config).await;

        // Never sends a handshake, so it holds the only slot until the timeout
        let _idle = TcpStream::connect(addr).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(connect_async(format!("ws://{}", addr)).await.is_err());

        let mut ws = wait_for_connect(addr).await;
        join(&mut ws, "L1", "Amy").await;
        assert_eq!(recv(&mut ws).await, ServerMessage::LeaderAssigned { leader: "Amy".into() });

        server.shutdown();
    }

    #[tokio::test]
    async fn test_shutdown_closes_connections() {
        let (server, addr, serving) = start(ServerConfig::default()).await;
        let mut amy = connect(addr).await;
        let mut bo = connect(addr).await;

        join(&mut amy, "L1", "Amy").await;
        recv(&mut amy).await;
        recv(&mut amy).await;
        join(&mut bo, "L1", "Bo").await;
        for ws in [&mut amy, &mut bo] {
            recv(ws).await;
            recv(ws).await;
        }
        assert_eq!(server.lobby_count().await.unwrap(), 1);
        assert_eq!(server.connection_count().await, 2);

        server.shutdown();
        expect_closed(&mut amy).await;
        expect_closed(&mut bo).await;

        // serve returns only after every connection has been disconnected
        timeout(Duration::from_secs(5), serving)
            .await
            .expect("serve did not return")
            .unwrap();
        assert_eq!(server.connection_count().await, 0);
        assert_eq!(server.lobby_count().await.unwrap(), 0);
        assert!(connect_async(format!("ws://{}", addr)).await.is_err());
    }
}
