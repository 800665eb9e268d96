//! Server network layer handling TCP connections and game loop coordination

use crate::dispatch::dispatch;
use crate::game::{Admission, GameState};
use crate::simulation::Simulation;
use log::{debug, error, info, warn};
use serde::Serialize;
use shared::{
    read_packet, write_packet, Packet, ServerMessage, ROOM_FULL_MESSAGE, SERVER_SENDER_ID,
};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};

/// Frames queued per connection before the peer is considered stalled
pub const OUTBOUND_QUEUE_CAPACITY: usize = 1024;

/// Messages sent from connection tasks to the main server loop
#[derive(Debug)]
pub enum NetworkEvent {
    PacketReceived { client_id: i32, packet: Packet },
    ClientDisconnected { client_id: i32 },
}

/// Messages produced by the game for delivery to connections
#[derive(Debug, Clone, PartialEq)]
pub enum GameMessage {
    SendPacket {
        packet: Packet,
        client_id: i32,
    },
    /// Delivered to every admitted client in join order
    BroadcastPacket {
        packet: Packet,
        exclude: Option<i32>,
    },
}

/// Ordered collection of messages produced while handling one event or tick
#[derive(Debug, Default)]
pub struct Outbox {
    messages: Vec<GameMessage>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn send(&mut self, client_id: i32, packet: Packet) {
        self.messages.push(GameMessage::SendPacket { packet, client_id });
    }

    pub fn broadcast(&mut self, packet: Packet) {
        self.messages.push(GameMessage::BroadcastPacket {
            packet,
            exclude: None,
        });
    }

    pub fn broadcast_except(&mut self, packet: Packet, exclude: i32) {
        self.messages.push(GameMessage::BroadcastPacket {
            packet,
            exclude: Some(exclude),
        });
    }

    pub fn send_payload<T: Serialize>(
        &mut self,
        client_id: i32,
        sender_id: i32,
        msg_type: ServerMessage,
        payload: &T,
    ) {
        if let Some(packet) = payload_packet(sender_id, msg_type, payload) {
            self.send(client_id, packet);
        }
    }

    pub fn broadcast_payload<T: Serialize>(
        &mut self,
        sender_id: i32,
        msg_type: ServerMessage,
        payload: &T,
    ) {
        if let Some(packet) = payload_packet(sender_id, msg_type, payload) {
            self.broadcast(packet);
        }
    }

    pub fn messages(&self) -> &[GameMessage] {
        &self.messages
    }

    pub fn take(&mut self) -> Vec<GameMessage> {
        std::mem::take(&mut self.messages)
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

/// Encodes a payload, logging instead of failing the caller
pub fn payload_packet<T: Serialize>(
    sender_id: i32,
    msg_type: ServerMessage,
    payload: &T,
) -> Option<Packet> {
    match Packet::with_payload(sender_id, msg_type, payload) {
        Ok(packet) => Some(packet),
        Err(e) => {
            error!("Failed to encode {:?} payload: {}", msg_type, e);
            None
        }
    }
}

struct Connection {
    sender: mpsc::Sender<Vec<u8>>,
    reader: JoinHandle<()>,
}

/// Main server coordinating connections and the room simulation
///
/// The server task is the only owner of the [`GameState`]: connection tasks
/// feed it decoded packets over a channel and it pushes encoded frames onto
/// each connection's outbound queue, so socket writes never block the room.
pub struct Server {
    listener: TcpListener,
    game_state: GameState,
    simulation: Simulation,
    poll_interval: Duration,
    connections: HashMap<i32, Connection>,

    // Communication channels
    server_tx: mpsc::UnboundedSender<NetworkEvent>,
    server_rx: mpsc::UnboundedReceiver<NetworkEvent>,
}

impl Server {
    pub async fn new(
        addr: &str,
        game_state: GameState,
        simulation: Simulation,
        poll_interval: Duration,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let listener = TcpListener::bind(addr).await?;
        info!("Server listening on {}", listener.local_addr()?);

        let (server_tx, server_rx) = mpsc::unbounded_channel();

        Ok(Server {
            listener,
            game_state,
            simulation,
            poll_interval: poll_interval.max(Duration::from_millis(1)),
            connections: HashMap::new(),
            server_tx,
            server_rx,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Admits or rejects a freshly accepted connection
    fn handle_accept(&mut self, stream: TcpStream, addr: SocketAddr) {
        if let Err(e) = stream.set_nodelay(true) {
            debug!("Failed to set TCP_NODELAY for {}: {}", addr, e);
        }

        let mut outbox = Outbox::new();
        match self.game_state.accept(addr, &mut outbox) {
            Admission::Rejected => {
                tokio::spawn(reject_connection(stream, addr));
            }
            Admission::Admitted(client_id) => {
                let (read_half, write_half) = stream.into_split();
                let (sender, receiver) = mpsc::channel(OUTBOUND_QUEUE_CAPACITY);

                spawn_writer(client_id, write_half, receiver, self.server_tx.clone());
                let reader = spawn_reader(client_id, read_half, self.server_tx.clone());
                self.connections.insert(client_id, Connection { sender, reader });

                self.deliver(outbox);
            }
        }
    }

    fn handle_event(&mut self, event: NetworkEvent) {
        match event {
            NetworkEvent::PacketReceived { client_id, packet } => {
                // Frames still queued from a connection we already dropped
                if !self.connections.contains_key(&client_id) {
                    return;
                }
                let mut outbox = Outbox::new();
                dispatch(&mut self.game_state, client_id, &packet, &mut outbox);
                self.deliver(outbox);
            }
            NetworkEvent::ClientDisconnected { client_id } => {
                self.drop_client(client_id);
            }
        }
    }

    /// Tears down a connection and removes its player from the room
    fn drop_client(&mut self, client_id: i32) {
        let Some(connection) = self.connections.remove(&client_id) else {
            return;
        };
        connection.reader.abort();

        let mut outbox = Outbox::new();
        self.game_state.leave(client_id, &mut outbox);
        self.deliver(outbox);
    }

    fn tick(&mut self, dt: f32) {
        let mut outbox = Outbox::new();
        self.simulation.update(&mut self.game_state, dt, &mut outbox);
        self.deliver(outbox);
    }

    /// Pushes every queued message onto the outbound queues
    ///
    /// Peers whose queue is full or closed are dropped afterwards, which may
    /// in turn produce Disconnect/NewOwner broadcasts for the others.
    fn deliver(&mut self, mut outbox: Outbox) {
        let mut failed = Vec::new();

        for message in outbox.take() {
            match message {
                GameMessage::SendPacket { packet, client_id } => {
                    if let Some(bytes) = encode_frame(&packet) {
                        self.push(client_id, bytes, &mut failed);
                    }
                }
                GameMessage::BroadcastPacket { packet, exclude } => {
                    let Some(bytes) = encode_frame(&packet) else {
                        continue;
                    };
                    for client_id in self.game_state.clients.ids() {
                        if Some(client_id) == exclude {
                            continue;
                        }
                        self.push(client_id, bytes.clone(), &mut failed);
                    }
                }
            }
        }

        for client_id in failed {
            self.drop_client(client_id);
        }
    }

    fn push(&self, client_id: i32, bytes: Vec<u8>, failed: &mut Vec<i32>) {
        let Some(connection) = self.connections.get(&client_id) else {
            return;
        };
        if failed.contains(&client_id) {
            return;
        }

        match connection.sender.try_send(bytes) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("Dropping slow client {}: outbound queue full", client_id);
                failed.push(client_id);
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("Outbound queue for client {} already closed", client_id);
                failed.push(client_id);
            }
        }
    }

    /// Main server loop coordinating all operations
    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        let mut tick_interval = interval(self.poll_interval);
        tick_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last_tick = Instant::now();

        info!("Server started successfully");

        loop {
            tokio::select! {
                // Handle new connections
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, addr)) => self.handle_accept(stream, addr),
                        Err(e) => {
                            error!("Error accepting connection: {}", e);
                            tokio::time::sleep(Duration::from_millis(10)).await;
                        }
                    }
                },

                // Handle connection events
                event = self.server_rx.recv() => {
                    match event {
                        Some(event) => self.handle_event(event),
                        None => {
                            info!("Server shutting down");
                            break;
                        }
                    }
                },

                // Handle simulation ticks
                _ = tick_interval.tick() => {
                    let now = Instant::now();
                    let dt = now.duration_since(last_tick).as_secs_f32();
                    last_tick = now;

                    self.tick(dt);
                },
            }
        }

        Ok(())
    }
}

fn encode_frame(packet: &Packet) -> Option<Vec<u8>> {
    match packet.encode() {
        Ok(bytes) => Some(bytes),
        Err(e) => {
            error!("Failed to encode packet type {}: {}", packet.msg_type, e);
            None
        }
    }
}

/// Spawns the task that decodes frames from one connection
///
/// The task ends on the first failed or short read; that is the only way a
/// connection closes from the peer's side.
fn spawn_reader(
    client_id: i32,
    read_half: OwnedReadHalf,
    events: mpsc::UnboundedSender<NetworkEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut reader = BufReader::new(read_half);

        loop {
            match read_packet(&mut reader).await {
                Ok(packet) => {
                    if events
                        .send(NetworkEvent::PacketReceived { client_id, packet })
                        .is_err()
                    {
                        return;
                    }
                }
                Err(e) => {
                    debug!("Connection to client {} ended: {}", client_id, e);
                    break;
                }
            }
        }

        let _ = events.send(NetworkEvent::ClientDisconnected { client_id });
    })
}

/// Spawns the task that drains one connection's outbound queue
fn spawn_writer(
    client_id: i32,
    mut write_half: OwnedWriteHalf,
    mut receiver: mpsc::Receiver<Vec<u8>>,
    events: mpsc::UnboundedSender<NetworkEvent>,
) {
    tokio::spawn(async move {
        while let Some(bytes) = receiver.recv().await {
            if let Err(e) = write_half.write_all(&bytes).await {
                warn!("Failed to send to client {}: {}", client_id, e);
                let _ = events.send(NetworkEvent::ClientDisconnected { client_id });
                return;
            }
        }

        let _ = write_half.shutdown().await;
    });
}

async fn reject_connection(mut stream: TcpStream, addr: SocketAddr) {
    info!("Rejecting connection from {}: room is full", addr);

    let packet = Packet::with_text(
        SERVER_SENDER_ID,
        ServerMessage::ConnectedReject,
        ROOM_FULL_MESSAGE,
    );
    if let Err(e) = write_packet(&mut stream, &packet).await {
        debug!("Failed to send rejection to {}: {}", addr, e);
    }
    let _ = stream.shutdown().await;
}
