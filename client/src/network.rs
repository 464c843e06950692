//! Client network layer: UDP socket tasks on the tokio runtime
//!
//! The frame loop never touches the socket. It hands outgoing packets to the
//! sender task and drains decoded packets from the receiver task, both over
//! unbounded channels.

use log::{error, info, warn};
use shared::{Packet, MAX_DATAGRAM_SIZE};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::time::sleep;

const RECV_BUFFER_SIZE: usize = 65536;

pub struct NetworkClient {
    server_addr: SocketAddr,
    local_addr: SocketAddr,
    outgoing: mpsc::UnboundedSender<Packet>,
    incoming: mpsc::UnboundedReceiver<Packet>,
}

impl NetworkClient {
    /// Binds an ephemeral socket and spawns the receiver and sender tasks on
    /// the current runtime. `fake_ping_ms` is split evenly between the two
    /// directions.
    pub async fn connect(
        server_addr: &str,
        fake_ping_ms: u64,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let server_addr: SocketAddr = server_addr.parse()?;
        let bind_addr = if server_addr.is_ipv4() {
            "0.0.0.0:0"
        } else {
            "[::]:0"
        };
        let socket = Arc::new(UdpSocket::bind(bind_addr).await?);
        let local_addr = socket.local_addr()?;
        info!("Client socket bound to {}", local_addr);

        let (outgoing, outgoing_rx) = mpsc::unbounded_channel();
        let (incoming_tx, incoming) = mpsc::unbounded_channel();
        let half_ping = Duration::from_millis(fake_ping_ms / 2);

        Self::spawn_receiver(Arc::clone(&socket), server_addr, incoming_tx, half_ping);
        Self::spawn_sender(socket, server_addr, outgoing_rx, half_ping);

        Ok(Self {
            server_addr,
            local_addr,
            outgoing,
            incoming,
        })
    }

    fn spawn_receiver(
        socket: Arc<UdpSocket>,
        server_addr: SocketAddr,
        incoming_tx: mpsc::UnboundedSender<Packet>,
        half_ping: Duration,
    ) {
        tokio::spawn(async move {
            let mut buffer = vec![0u8; RECV_BUFFER_SIZE];

            loop {
                match socket.recv_from(&mut buffer).await {
                    Ok((len, addr)) => {
                        if addr != server_addr {
                            warn!("Ignoring datagram from unknown peer {}", addr);
                            continue;
                        }
                        let packet = match Packet::decode(&buffer[..len]) {
                            Ok(packet) => packet,
                            Err(e) => {
                                warn!("Failed to deserialize packet from server: {}", e);
                                continue;
                            }
                        };

                        if !half_ping.is_zero() {
                            sleep(half_ping).await;
                        }

                        if incoming_tx.send(packet).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        error!("Error receiving packet: {}", e);
                        sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        });
    }

    fn spawn_sender(
        socket: Arc<UdpSocket>,
        server_addr: SocketAddr,
        mut outgoing_rx: mpsc::UnboundedReceiver<Packet>,
        half_ping: Duration,
    ) {
        tokio::spawn(async move {
            while let Some(packet) = outgoing_rx.recv().await {
                if !half_ping.is_zero() {
                    sleep(half_ping).await;
                }

                let data = match packet.encode() {
                    Ok(data) => data,
                    Err(e) => {
                        error!("Failed to serialize packet: {}", e);
                        continue;
                    }
                };
                if data.len() > MAX_DATAGRAM_SIZE {
                    error!("Dropping {} byte packet, too large for a datagram", data.len());
                    continue;
                }

                if let Err(e) = socket.send_to(&data, server_addr).await {
                    error!("Failed to send packet to {}: {}", server_addr, e);
                }
            }
        });
    }

    pub fn server_addr(&self) -> SocketAddr {
        self.server_addr
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Queues a packet for the sender task. Returns false once the task is
    /// gone.
    pub fn send(&self, packet: Packet) -> bool {
        self.outgoing.send(packet).is_ok()
    }

    /// Next decoded packet, if one is waiting.
    pub fn try_recv(&mut self) -> Option<Packet> {
        self.incoming.try_recv().ok()
    }

    pub async fn recv(&mut self) -> Option<Packet> {
        self.incoming.recv().await
    }
}
