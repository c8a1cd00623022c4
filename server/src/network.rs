//! Server network layer handling TCP sessions and game loop coordination

use crate::client_manager::{ClientManager, OUTBOUND_QUEUE};
use crate::config::{Mode, ServerConfig};
use crate::game::{Command, GameState, TickReport};
use crate::persistence::{with_store, PersistenceGateway, ScoreWriter};
use log::{debug, error, info, warn};
use shared::{decode_payload, read_frame, write_packet, Packet, PlayerAction};
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, RwLock};
use tokio::time::{interval, timeout, MissedTickBehavior};

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// How often per-tick statistics are logged, in ticks.
const STATS_INTERVAL: u64 = 120;

/// Messages sent from session tasks to the main server loop
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    Connected { session: u32 },
    Input { session: u32, action: PlayerAction },
    Authenticated { session: u32, username: String },
    Disconnected { session: u32 },
}

/// State shared by every session's reader task.
#[derive(Clone)]
struct SessionContext {
    clients: Arc<RwLock<ClientManager>>,
    store: Arc<dyn PersistenceGateway>,
    server_tx: mpsc::UnboundedSender<ServerMessage>,
    write_timeout: Duration,
}

/// Main server coordinating sessions and game simulation
pub struct Server {
    listener: Option<TcpListener>,
    local_addr: SocketAddr,
    config: ServerConfig,
    clients: Arc<RwLock<ClientManager>>,
    store: Arc<dyn PersistenceGateway>,
    game_state: GameState,
    victory_sent: bool,

    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
}

impl Server {
    /// Binds the listening socket. Failing to bind is fatal for the caller.
    pub async fn new(
        config: ServerConfig,
        store: Arc<dyn PersistenceGateway>,
    ) -> Result<Self, BoxError> {
        let listener = TcpListener::bind(&config.addr).await?;
        let local_addr = listener.local_addr()?;
        info!("Server listening on {} ({:?} mode)", local_addr, config.mode);

        let (server_tx, server_rx) = mpsc::unbounded_channel();

        Ok(Server {
            listener: Some(listener),
            local_addr,
            clients: Arc::new(RwLock::new(ClientManager::new(config.max_clients))),
            game_state: GameState::new(
                Arc::new(ScoreWriter::spawn(Arc::clone(&store))),
                config.tick_rate,
            ),
            store,
            config,
            victory_sent: false,
            server_tx,
            server_rx,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    fn session_context(&self) -> SessionContext {
        SessionContext {
            clients: Arc::clone(&self.clients),
            store: Arc::clone(&self.store),
            server_tx: self.server_tx.clone(),
            write_timeout: self.config.write_timeout,
        }
    }

    /// Spawns the task that accepts connections and starts their session tasks
    fn spawn_acceptor(&mut self) {
        let Some(listener) = self.listener.take() else {
            return;
        };
        let context = self.session_context();

        tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, addr)) => {
                        if let Err(e) = stream.set_nodelay(true) {
                            debug!("Could not disable Nagle for {}: {}", addr, e);
                        }
                        start_session(stream, addr, context.clone()).await;
                    }
                    Err(e) => {
                        error!("Error accepting connection: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        });
    }

    /// Applies one message from a session task to the session table and the
    /// simulation inbox.
    pub async fn handle_message(&mut self, message: ServerMessage) {
        match message {
            ServerMessage::Connected { session } => {
                if self.config.mode != Mode::Single {
                    return;
                }
                let mut clients = self.clients.write().await;
                if clients.has_bound_client() {
                    debug!("Session {} is request-only", session);
                    return;
                }
                if clients.bind(session) {
                    self.game_state.queue_command(Command::Join {
                        session,
                        username: None,
                    });
                }
            }

            ServerMessage::Input { session, action } => {
                let mut clients = self.clients.write().await;
                let Some(client) = clients.get(&session) else {
                    return;
                };

                if !client.bound {
                    let Some(username) = client.username.clone() else {
                        debug!("Ignoring {:?} from session {} before login", action, session);
                        return;
                    };
                    if self.config.mode == Mode::Single {
                        debug!("Ignoring {:?} from request-only session {}", action, session);
                        return;
                    }
                    clients.bind(session);
                    self.game_state.queue_command(Command::Join {
                        session,
                        username: Some(username),
                    });
                }

                self.game_state
                    .queue_command(Command::Input { session, action });
            }

            ServerMessage::Authenticated { session, username } => {
                let bound = {
                    let clients = self.clients.read().await;
                    clients.get(&session).map_or(false, |client| client.bound)
                };
                if bound {
                    self.game_state
                        .queue_command(Command::Rename { session, username });
                }
            }

            ServerMessage::Disconnected { session } => {
                self.drop_session(session).await;
            }
        }
    }

    async fn drop_session(&mut self, session: u32) {
        let removed = {
            let mut clients = self.clients.write().await;
            clients.remove_client(&session)
        };
        if removed {
            self.game_state.queue_command(Command::Leave { session });
        }
    }

    /// Runs one simulation tick and fans the resulting snapshot out.
    pub async fn step(&mut self) -> TickReport {
        let report = self.game_state.tick();
        self.broadcast_game_state().await;

        if self.game_state.tick % STATS_INTERVAL == 0 {
            let client_count = self.clients.read().await.len();
            debug!(
                "Tick {}: {} sessions, {} entities, {} contacts, stage {} quota {}",
                self.game_state.tick,
                client_count,
                self.game_state.registry.len(),
                report.contacts,
                self.game_state.stage.index(),
                self.game_state.stage.quota()
            );
        }

        report
    }

    /// Sends every session its own view of the latest snapshot, followed by
    /// the victory sentinel the first time the game is won.
    async fn broadcast_game_state(&mut self) {
        let snapshot = self.game_state.snapshot();
        let send_victory = snapshot.won && !self.victory_sent;

        let failed = {
            let clients = self.clients.read().await;
            if clients.is_empty() {
                return;
            }

            let mut failed = clients.broadcast(|session| snapshot.packet_for(session));
            if send_victory {
                info!("Announcing victory to {} sessions", clients.len());
                failed.extend(clients.broadcast(|_| Packet::Victory));
            }
            failed
        };

        if send_victory {
            self.victory_sent = true;
        }

        for session in failed {
            self.drop_session(session).await;
        }
    }

    pub fn game_state(&self) -> &GameState {
        &self.game_state
    }

    /// Main server loop coordinating all operations
    pub async fn run(&mut self) -> Result<(), BoxError> {
        self.spawn_acceptor();

        let mut tick_interval = interval(self.config.tick_duration());
        tick_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            "Server started at {} Hz for up to {} sessions",
            self.config.tick_rate, self.config.max_clients
        );

        loop {
            tokio::select! {
                message = self.server_rx.recv() => {
                    match message {
                        Some(message) => self.handle_message(message).await,
                        None => {
                            info!("Server shutting down");
                            break;
                        }
                    }
                },

                _ = tick_interval.tick() => {
                    self.step().await;
                },
            }
        }

        Ok(())
    }
}

/// Registers a fresh connection and spawns its reader and writer, or turns
/// it away when the server is full.
async fn start_session(stream: TcpStream, addr: SocketAddr, context: SessionContext) {
    let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_QUEUE);
    let session = {
        let mut clients = context.clients.write().await;
        clients.add_client(addr, outbound_tx.clone())
    };

    let Some(session) = session else {
        warn!("Refusing {}: server full", addr);
        tokio::spawn(refuse(stream, context.write_timeout));
        return;
    };

    let (reader, writer) = stream.into_split();

    let writer_tx = context.server_tx.clone();
    let write_timeout = context.write_timeout;
    tokio::spawn(async move {
        if let Err(e) = write_loop(writer, outbound_rx, write_timeout).await {
            warn!("Session {} write failed: {}", session, e);
        }
        let _ = writer_tx.send(ServerMessage::Disconnected { session });
    });

    if context
        .server_tx
        .send(ServerMessage::Connected { session })
        .is_err()
    {
        error!("Main loop is gone, dropping session {}", session);
        return;
    }

    tokio::spawn(async move {
        read_loop(session, reader, outbound_tx, &context).await;
        let _ = context
            .server_tx
            .send(ServerMessage::Disconnected { session });
    });
}

async fn refuse(mut stream: TcpStream, write_timeout: Duration) {
    let packet = Packet::Disconnected {
        reason: "Server full".to_string(),
    };
    if let Ok(Err(e)) = timeout(write_timeout, write_packet(&mut stream, &packet)).await {
        debug!("Could not deliver refusal: {}", e);
    }
    let _ = stream.shutdown().await;
}

/// Drains the session's outbound queue onto the socket. Ends when the queue
/// closes or a write fails or overruns its time box.
async fn write_loop(
    mut writer: OwnedWriteHalf,
    mut outbound: mpsc::Receiver<Packet>,
    write_timeout: Duration,
) -> Result<(), BoxError> {
    while let Some(packet) = outbound.recv().await {
        timeout(write_timeout, write_packet(&mut writer, &packet)).await??;
    }
    writer.shutdown().await?;
    Ok(())
}

/// Reads frames until the peer goes away. Account and ranking requests are
/// answered here; inputs go to the main loop.
async fn read_loop(
    session: u32,
    mut reader: OwnedReadHalf,
    outbound: mpsc::Sender<Packet>,
    context: &SessionContext,
) {
    loop {
        let frame = match read_frame(&mut reader).await {
            Ok(frame) => frame,
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
                debug!("Session {} closed by peer", session);
                return;
            }
            Err(e) => {
                warn!("Session {} read failed: {}", session, e);
                return;
            }
        };

        let packet = match decode_payload(&frame) {
            Ok(packet) => packet,
            Err(e) => {
                warn!("Unrecognised message from session {}: {}", session, e);
                continue;
            }
        };

        let reply = match packet {
            Packet::PlayerInput { action } => {
                if context
                    .server_tx
                    .send(ServerMessage::Input { session, action })
                    .is_err()
                {
                    return;
                }
                continue;
            }
            Packet::LoginRequest { username, password } => {
                let success = authenticate(context, &username, &password).await;
                if success {
                    record_login(session, &username, context).await;
                }
                Packet::LoginResponse { success, username }
            }
            Packet::SignUpRequest { username, password } => {
                let (success, message) = sign_up(context, &username, &password).await;
                if success {
                    record_login(session, &username, context).await;
                }
                Packet::SignUpResponse { success, message }
            }
            Packet::RankRequest => Packet::RankResponse {
                entries: with_store(&context.store, |store| store.get_all_scores())
                    .await
                    .unwrap_or_else(|e| {
                        warn!("Could not load rankings: {}", e);
                        Vec::new()
                    }),
            },
            other => {
                warn!("Unexpected packet from session {}: {:?}", session, other);
                continue;
            }
        };

        if outbound.try_send(reply).is_err() {
            warn!("Session {} cannot take its reply, closing", session);
            return;
        }
    }
}

async fn authenticate(context: &SessionContext, username: &str, password: &str) -> bool {
    let (user, pass) = (username.to_string(), password.to_string());
    match with_store(&context.store, move |store| store.authenticate(&user, &pass)).await {
        Ok(success) => {
            info!("Login for {}: {}", username, if success { "ok" } else { "rejected" });
            success
        }
        Err(e) => {
            warn!("Login for {} failed: {}", username, e);
            false
        }
    }
}

async fn sign_up(context: &SessionContext, username: &str, password: &str) -> (bool, String) {
    let (user, pass) = (username.to_string(), password.to_string());
    match with_store(&context.store, move |store| store.create_account(&user, &pass)).await {
        Ok(true) => {
            info!("Created account {}", username);
            (true, "Account created".to_string())
        }
        Ok(false) => (false, "Username unavailable".to_string()),
        Err(e) => {
            warn!("Signup for {} failed: {}", username, e);
            (false, "Signup failed".to_string())
        }
    }
}

async fn record_login(session: u32, username: &str, context: &SessionContext) {
    context
        .clients
        .write()
        .await
        .set_username(session, username);
    let _ = context.server_tx.send(ServerMessage::Authenticated {
        session,
        username: username.to_string(),
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::MemoryStore;

    async fn test_server(mode: Mode) -> Server {
        let config = ServerConfig::new("127.0.0.1:0", mode);
        Server::new(config, Arc::new(MemoryStore::new()))
            .await
            .unwrap()
    }

    async fn register(server: &Server) -> (u32, mpsc::Receiver<Packet>) {
        let (tx, rx) = mpsc::channel(OUTBOUND_QUEUE);
        let addr = server.local_addr();
        let session = server.clients.write().await.add_client(addr, tx).unwrap();
        (session, rx)
    }

    #[tokio::test]
    async fn test_binds_ephemeral_port() {
        let server = test_server(Mode::Multi).await;
        assert_ne!(server.local_addr().port(), 0);
    }

    #[tokio::test]
    async fn test_single_mode_auto_joins_first_session_only() {
        let mut server = test_server(Mode::Single).await;
        let (first, _rx1) = register(&server).await;
        let (second, _rx2) = register(&server).await;

        server
            .handle_message(ServerMessage::Connected { session: first })
            .await;
        server
            .handle_message(ServerMessage::Connected { session: second })
            .await;
        server.step().await;

        assert!(server.game_state().is_bound(first));
        assert!(!server.game_state().is_bound(second));
    }

    #[tokio::test]
    async fn test_multi_mode_binds_on_first_input_after_login() {
        let mut server = test_server(Mode::Multi).await;
        let (session, _rx) = register(&server).await;

        server
            .handle_message(ServerMessage::Input {
                session,
                action: PlayerAction::MoveLeft,
            })
            .await;
        server.step().await;
        assert!(!server.game_state().is_bound(session));

        server.clients.write().await.set_username(session, "ace");
        server
            .handle_message(ServerMessage::Input {
                session,
                action: PlayerAction::MoveLeft,
            })
            .await;
        server.step().await;

        let player = server.game_state().player(session).unwrap();
        assert_eq!(player.username.as_deref(), Some("ace"));
        let ship = player.entity.unwrap();
        assert!(server.game_state().registry.get(ship).unwrap().dx < 0.0);
    }

    #[tokio::test]
    async fn test_step_sends_each_session_its_snapshot() {
        let mut server = test_server(Mode::Single).await;
        let (session, mut rx) = register(&server).await;
        server
            .handle_message(ServerMessage::Connected { session })
            .await;

        server.step().await;

        match rx.try_recv().unwrap() {
            Packet::GameState {
                tick, lives, status, ..
            } => {
                assert_eq!(tick, 1);
                assert_eq!(lives, shared::STARTING_LIVES);
                assert_eq!(status, shared::GameStatus::Playing);
            }
            other => panic!("Unexpected packet {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_stalled_session_is_dropped() {
        let mut server = test_server(Mode::Single).await;
        let (session, _rx) = register(&server).await;
        server
            .handle_message(ServerMessage::Connected { session })
            .await;

        for _ in 0..=OUTBOUND_QUEUE {
            server.step().await;
        }
        server.step().await;

        assert!(server.clients.read().await.get(&session).is_none());
        assert!(server.game_state().player(session).is_none());
    }

    #[tokio::test]
    async fn test_disconnect_removes_ship_through_inbox() {
        let mut server = test_server(Mode::Single).await;
        let (session, _rx) = register(&server).await;
        server
            .handle_message(ServerMessage::Connected { session })
            .await;
        server.step().await;
        let ship = server.game_state().player(session).unwrap().entity.unwrap();

        server
            .handle_message(ServerMessage::Disconnected { session })
            .await;
        assert!(server.game_state().registry.contains(ship));

        let report = server.step().await;
        assert!(report.removed.contains(&ship));
    }
}
