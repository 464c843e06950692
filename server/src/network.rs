//! Server network layer: UDP I/O tasks and the relay loop

use crate::client_manager::ClientManager;
use crate::game::PaintRoom;
use log::{debug, error, info, warn};
use shared::{timestamp_ms, Applied, Packet, PaintConfig, MAX_DATAGRAM_SIZE, PROTOCOL_VERSION};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, RwLock};
use tokio::time::interval;

/// Receive buffer; large enough for any UDP payload
pub const RECV_BUFFER_SIZE: usize = 65536;

const SCOREBOARD_INTERVAL: Duration = Duration::from_secs(1);
/// How far ahead of the server clock a stroke point may be stamped
const MAX_CLOCK_SKEW: Duration = Duration::from_secs(300);

/// Messages sent from network tasks to main server loop
#[derive(Debug)]
pub enum ServerMessage {
    PacketReceived {
        packet: Packet,
        addr: SocketAddr,
    },
    ClientTimeout {
        client_id: u32,
    },
    #[allow(dead_code)]
    Shutdown,
}

/// Messages sent from the relay loop to network tasks
#[derive(Debug)]
pub enum GameMessage {
    SendPacket {
        packet: Packet,
        addr: SocketAddr,
    },
    BroadcastPacket {
        packet: Packet,
        exclude: Option<u32>,
    },
}

/// Relay server: validates stroke traffic, keeps the observer canvas and
/// runs the round clock
pub struct Server {
    socket: Arc<UdpSocket>,
    clients: Arc<RwLock<ClientManager>>,
    room: PaintRoom,
    tick_duration: Duration,
    last_scoreboard: Instant,

    // Communication channels
    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
    game_tx: mpsc::UnboundedSender<GameMessage>,
    game_rx: mpsc::UnboundedReceiver<GameMessage>,
}

impl Server {
    pub async fn new(
        addr: &str,
        tick_duration: Duration,
        max_clients: usize,
        config: PaintConfig,
        round_duration: Duration,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let socket = Arc::new(UdpSocket::bind(addr).await?);
        info!("Server listening on {}", socket.local_addr()?);

        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let (game_tx, game_rx) = mpsc::unbounded_channel();
        let now = Instant::now();

        Ok(Server {
            socket,
            clients: Arc::new(RwLock::new(ClientManager::new(max_clients))),
            room: PaintRoom::new(&config, round_duration, now),
            tick_duration,
            last_scoreboard: now,
            server_tx,
            server_rx,
            game_tx,
            game_rx,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Spawns task that continuously listens for incoming packets
    async fn spawn_network_receiver(&self) {
        let socket = Arc::clone(&self.socket);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut buffer = vec![0u8; RECV_BUFFER_SIZE];

            loop {
                match socket.recv_from(&mut buffer).await {
                    Ok((len, addr)) => match Packet::decode(&buffer[..len]) {
                        Ok(packet) => {
                            if let Err(e) =
                                server_tx.send(ServerMessage::PacketReceived { packet, addr })
                            {
                                error!("Failed to send packet to main loop: {}", e);
                                break;
                            }
                        }
                        Err(e) => warn!("Failed to deserialize packet from {}: {}", addr, e),
                    },
                    Err(e) => {
                        error!("Error receiving packet: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        });
    }

    /// Spawns task that processes outgoing packet queue
    async fn spawn_network_sender(&mut self) {
        let socket = Arc::clone(&self.socket);
        let clients = Arc::clone(&self.clients);
        let mut game_rx = std::mem::replace(&mut self.game_rx, mpsc::unbounded_channel().1);

        tokio::spawn(async move {
            while let Some(message) = game_rx.recv().await {
                match message {
                    GameMessage::SendPacket { packet, addr } => {
                        if let Err(e) = Self::send_packet_impl(&socket, &packet, addr).await {
                            error!("Failed to send packet to {}: {}", addr, e);
                        }
                    }
                    GameMessage::BroadcastPacket { packet, exclude } => {
                        let client_addrs = {
                            let clients_guard = clients.read().await;
                            clients_guard.get_client_addrs()
                        };

                        for (client_id, addr) in client_addrs {
                            if Some(client_id) == exclude {
                                continue;
                            }

                            if let Err(e) = Self::send_packet_impl(&socket, &packet, addr).await {
                                error!("Failed to send to client {}: {}", client_id, e);
                            }
                        }
                    }
                }
            }
        });
    }

    /// Spawns task that monitors client timeouts
    async fn spawn_timeout_checker(&self) {
        let clients = Arc::clone(&self.clients);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));

            loop {
                interval.tick().await;

                let timed_out = {
                    let mut clients_guard = clients.write().await;
                    clients_guard.check_timeouts()
                };

                for client_id in timed_out {
                    if let Err(e) = server_tx.send(ServerMessage::ClientTimeout { client_id }) {
                        error!("Failed to send timeout message: {}", e);
                        break;
                    }
                }
            }
        });
    }

    async fn send_packet_impl(
        socket: &UdpSocket,
        packet: &Packet,
        addr: SocketAddr,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let data = packet.encode()?;
        if data.len() > MAX_DATAGRAM_SIZE {
            return Err(format!("packet of {} bytes exceeds a datagram", data.len()).into());
        }
        socket.send_to(&data, addr).await?;
        Ok(())
    }

    fn send_packet(&self, packet: Packet, addr: SocketAddr) {
        if let Err(e) = self.game_tx.send(GameMessage::SendPacket { packet, addr }) {
            error!("Failed to queue packet for sending: {}", e);
        }
    }

    fn broadcast_packet(&self, packet: Packet, exclude: Option<u32>) {
        if let Err(e) = self
            .game_tx
            .send(GameMessage::BroadcastPacket { packet, exclude })
        {
            error!("Failed to queue broadcast packet: {}", e);
        }
    }

    /// Finishes whatever a departed participant was drawing for everyone else.
    fn close_departed(&mut self, client_id: u32) {
        for end in self.room.close_strokes_of(client_id) {
            self.broadcast_packet(end, Some(client_id));
        }
    }

    /// Processes one incoming datagram
    async fn handle_packet(&mut self, packet: Packet, addr: SocketAddr) {
        let sender = {
            let mut clients = self.clients.write().await;
            clients.mark_seen(addr)
        };

        match packet {
            Packet::Connect { client_version } => {
                info!(
                    "Client connecting from {} (version: {})",
                    addr, client_version
                );

                if client_version != PROTOCOL_VERSION {
                    self.send_packet(
                        Packet::Disconnected {
                            reason: "Protocol version mismatch".to_string(),
                        },
                        addr,
                    );
                    return;
                }

                if let Some(existing_id) = sender {
                    info!("Removing existing client {} from {}", existing_id, addr);
                    let mut clients = self.clients.write().await;
                    clients.remove_client(&existing_id);
                    drop(clients);
                    self.close_departed(existing_id);
                }

                let client_id = {
                    let mut clients = self.clients.write().await;
                    clients.add_client(addr)
                };

                let response = match client_id {
                    Some(client_id) => Packet::Connected {
                        client_id,
                        canvas: self.room.canvas_spec(),
                    },
                    None => Packet::Disconnected {
                        reason: "Server full".to_string(),
                    },
                };
                self.send_packet(response, addr);
            }

            Packet::Disconnect => {
                if let Some(client_id) = sender {
                    let mut clients = self.clients.write().await;
                    clients.remove_client(&client_id);
                    drop(clients);
                    self.close_departed(client_id);
                }
            }

            Packet::Heartbeat { timestamp } => {
                if sender.is_some() {
                    self.send_packet(Packet::HeartbeatAck { timestamp }, addr);
                }
            }

            Packet::SnapshotRequest => {
                let Some(client_id) = sender else {
                    warn!("Snapshot request from unknown address {}", addr);
                    return;
                };
                let packets = self.room.snapshot_packets();
                debug!(
                    "Sending snapshot of {} packets to client {}",
                    packets.len(),
                    client_id
                );
                for packet in packets {
                    self.send_packet(packet, addr);
                }
            }

            Packet::CanvasClear => {
                let Some(client_id) = sender else {
                    warn!("Canvas clear from unknown address {}", addr);
                    return;
                };
                info!("Client {} cleared the canvas", client_id);
                self.room.clear();
                self.broadcast_packet(Packet::CanvasClear, Some(client_id));
            }

            packet if packet.is_stroke_message() => {
                let Some(client_id) = sender else {
                    warn!("Stroke message from unknown address {}", addr);
                    return;
                };
                if packet.stroke_author() != Some(client_id) {
                    warn!(
                        "Dropping stroke message from client {} with foreign author {:?}",
                        client_id,
                        packet.stroke_author()
                    );
                    return;
                }
                let horizon = timestamp_ms().saturating_add(MAX_CLOCK_SKEW.as_millis() as u64);
                if let Some(newest) = packet.newest_timestamp().filter(|t| *t > horizon) {
                    warn!(
                        "Dropping stroke message from client {} stamped {} ms ahead",
                        client_id,
                        newest.saturating_sub(timestamp_ms())
                    );
                    return;
                }

                match self.room.apply(packet.clone()) {
                    Ok(Applied::Ignored) => {}
                    Ok(_) => {
                        {
                            let mut clients = self.clients.write().await;
                            clients.record_stroke_message(client_id);
                        }
                        self.broadcast_packet(packet, Some(client_id));
                    }
                    Err(e) if e.is_benign() => {
                        debug!("Dropping stroke message from client {}: {}", client_id, e)
                    }
                    Err(e) => warn!("Rejected stroke message from client {}: {}", client_id, e),
                }
            }

            _ => {
                warn!("Unexpected packet type from client at {}", addr);
            }
        }
    }

    /// Scoreboard once a second, round rollover when the clock runs out
    fn run_round_clock(&mut self, now: Instant) {
        if self.room.is_round_over(now) {
            let round_over = self.room.finish_round(now);
            self.broadcast_packet(round_over, None);
            self.broadcast_packet(Packet::CanvasClear, None);
            self.last_scoreboard = now;
            return;
        }

        if now.saturating_duration_since(self.last_scoreboard) >= SCOREBOARD_INTERVAL {
            self.last_scoreboard = now;
            self.broadcast_packet(self.room.scoreboard(now), None);
        }
    }

    /// Main server loop coordinating all operations
    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.spawn_network_receiver().await;
        self.spawn_network_sender().await;
        self.spawn_timeout_checker().await;

        let mut tick_interval = interval(self.tick_duration);

        info!("Server started successfully");

        loop {
            tokio::select! {
                message = self.server_rx.recv() => {
                    match message {
                        Some(ServerMessage::PacketReceived { packet, addr }) => {
                            self.handle_packet(packet, addr).await;
                        },
                        Some(ServerMessage::ClientTimeout { client_id }) => {
                            info!("Client {} timed out", client_id);
                            self.close_departed(client_id);
                        },
                        Some(ServerMessage::Shutdown) | None => {
                            info!("Server shutting down");
                            break;
                        }
                    }
                },

                _ = tick_interval.tick() => {
                    self.room.tick += 1;
                    self.run_round_clock(Instant::now());

                    if self.room.tick % 60 == 0 {
                        let client_count = {
                            let clients = self.clients.read().await;
                            clients.len()
                        };

                        if client_count > 0 {
                            debug!(
                                "Tick {}: {} clients, {} strokes, round {}",
                                self.room.tick,
                                client_count,
                                self.room.canvas().store().len(),
                                self.room.round
                            );
                        }
                    }
                },
            }
        }

        Ok(())
    }
}
