//! Headless bot that joins the room, readies up and races until game over.
//!
//! Useful for exercising a running server by hand: start a few bots, and the
//! one that ends up owning the room starts the race once the others are ready.

use clap::Parser;
use shared::{
    read_packet, write_packet, ClientMessage, ItemPick, Packet, PlayerScalar, RoomSnapshot,
    ServerMessage, StartAck, DEFAULT_PORT, NONE_ID,
};
use tokio::io::BufReader;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::{interval, sleep, Duration};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short, long, default_value_t = format!("127.0.0.1:{}", DEFAULT_PORT))]
    server: String,

    /// Character index to pick
    #[arg(short, long, default_value = "0")]
    character: i32,

    /// Item indices for the loadout slots, in slot order
    #[arg(short, long, value_delimiter = ',')]
    items: Vec<i32>,

    /// Seconds to wait before the owner sends Start
    #[arg(long, default_value = "2")]
    start_delay: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let stream = TcpStream::connect(&args.server).await?;
    println!("Connected to {}", args.server);
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    let mut client_id = NONE_ID;
    let mut owner_id = NONE_ID;

    // Admission: Connected followed by the lobby snapshot, or a rejection
    loop {
        let packet = read_packet(&mut reader).await?;
        match packet.server_message() {
            Some(ServerMessage::Connected) => {
                client_id = packet.payload()?;
                println!("Assigned client id {}", client_id);
            }
            Some(ServerMessage::RoomFullInfo) => {
                let snapshot = RoomSnapshot::decode(&packet.body)?;
                owner_id = snapshot.owner_id.unwrap_or(NONE_ID);
                println!(
                    "Room: owner {}, map {}, {} players",
                    owner_id,
                    snapshot.map_id,
                    snapshot.players.len()
                );
                break;
            }
            Some(ServerMessage::ConnectedReject) => {
                println!("Rejected: {}", packet.text().unwrap_or_default());
                return Ok(());
            }
            _ => {}
        }
    }

    let send = |msg: ClientMessage| Packet::empty(client_id, msg);
    write_packet(
        &mut write_half,
        &Packet::with_payload(client_id, ClientMessage::PickCharacter, &args.character)?,
    )
    .await?;
    for (slot, item_id) in args.items.iter().enumerate().take(shared::ITEM_SLOT_COUNT) {
        let pick = ItemPick {
            slot: slot as i32,
            item_id: *item_id,
        };
        write_packet(
            &mut write_half,
            &Packet::with_payload(client_id, ClientMessage::PickItem, &pick)?,
        )
        .await?;
    }
    write_packet(&mut write_half, &send(ClientMessage::Ready)).await?;

    if owner_id == client_id {
        println!("Owning the room, starting in {}s", args.start_delay);
        sleep(Duration::from_secs(args.start_delay)).await;
        write_packet(&mut write_half, &send(ClientMessage::Start)).await?;
    }

    // Reads run on their own task so a heartbeat never interrupts a frame
    let (packet_tx, mut packet_rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        while let Ok(packet) = read_packet(&mut reader).await {
            if packet_tx.send(packet).is_err() {
                break;
            }
        }
    });

    let mut heartbeat = interval(Duration::from_secs(1));
    let mut moving_up = false;

    loop {
        tokio::select! {
            packet = packet_rx.recv() => {
                let Some(packet) = packet else {
                    println!("Server closed the connection");
                    return Ok(());
                };
                match packet.server_message() {
                    Some(ServerMessage::StartAck) => {
                        let ack: StartAck = packet.payload()?;
                        println!("Start {}", if ack.success { "accepted" } else { "refused" });
                    }
                    Some(ServerMessage::NewOwner) => {
                        owner_id = packet.payload()?;
                        println!("Client {} now owns the room", owner_id);
                        if owner_id == client_id {
                            write_packet(&mut write_half, &send(ClientMessage::Start)).await?;
                        }
                    }
                    Some(ServerMessage::CountdownFinished) => println!("Go!"),
                    Some(ServerMessage::PlayerDistance) => {
                        let distance: PlayerScalar = packet.payload()?;
                        if distance.id == client_id {
                            println!("Distance {:.1}", distance.value);
                        }
                    }
                    Some(ServerMessage::PlayerDead) => {
                        println!("Client {} died", packet.sender_id);
                    }
                    Some(ServerMessage::GameOver) => {
                        println!("{}", packet.text().unwrap_or_default());
                        return Ok(());
                    }
                    _ => {}
                }
            }
            _ = heartbeat.tick() => {
                write_packet(&mut write_half, &send(ClientMessage::Heartbeat)).await?;

                moving_up = !moving_up;
                let direction = if moving_up {
                    ClientMessage::MoveUp
                } else {
                    ClientMessage::MoveDown
                };
                write_packet(&mut write_half, &send(direction)).await?;
            }
        }
    }
}
