//! Binary framing and payload layouts for the session protocol.
//!
//! Every frame is a 12-byte header (`sender_id`, `msg_type`, `body_len`, all
//! `i32`) followed by exactly `body_len` bytes. Bodies are fixed-layout records
//! whose shape is implied by the message type. Integers and floats travel in
//! the host's native byte order; peers are expected to share it.

use bincode::Options;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::{ITEM_SLOT_COUNT, MAX_PLAYERS, NONE_ID};

pub const HEADER_LEN: usize = 12;
/// Upper bound on a declared body length. Larger frames are treated as a
/// framing error rather than an allocation request.
pub const MAX_BODY_LEN: usize = 64 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid body length {0}")]
    InvalidBodyLength(i32),
    #[error("body of {0} bytes exceeds the frame limit")]
    BodyTooLarge(usize),
    #[error("malformed payload: {0}")]
    Payload(#[from] bincode::Error),
    #[error("invalid player count {0}")]
    InvalidPlayerCount(i32),
    #[error("{0} trailing bytes after payload")]
    TrailingBytes(usize),
}

/// Fixed-width integers in native byte order, no trailing bytes allowed.
fn wire_options() -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .with_native_endian()
}

/// Messages a client may send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ClientMessage {
    Heartbeat = 0,
    Start = 1,
    PickCharacter = 2,
    PickItem = 3,
    PickMap = 4,
    Ready = 5,
    Unready = 6,
    MoveUp = 7,
    MoveDown = 8,
    PlayerDead = 9,
    TakeDamage = 10,
    BoostOn = 11,
    BoostOff = 12,
}

impl TryFrom<i32> for ClientMessage {
    type Error = i32;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        use ClientMessage::*;
        Ok(match value {
            0 => Heartbeat,
            1 => Start,
            2 => PickCharacter,
            3 => PickItem,
            4 => PickMap,
            5 => Ready,
            6 => Unready,
            7 => MoveUp,
            8 => MoveDown,
            9 => PlayerDead,
            10 => TakeDamage,
            11 => BoostOn,
            12 => BoostOff,
            other => return Err(other),
        })
    }
}

impl From<ClientMessage> for i32 {
    fn from(message: ClientMessage) -> Self {
        message as i32
    }
}

/// Messages the server emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ServerMessage {
    Connected = 0,
    NewOwner = 1,
    HeartbeatAck = 2,
    StartAck = 3,
    Join = 4,
    Disconnect = 5,
    ConnectedReject = 6,
    RoomFullInfo = 7,
    PickCharacter = 8,
    PickItem = 9,
    PickMap = 10,
    Ready = 11,
    Unready = 12,
    MoveUp = 13,
    MoveDown = 14,
    PlayerDead = 15,
    GameOver = 16,
    PlayerDistance = 17,
    PlayerHp = 18,
    PlayerPosition = 19,
    PlayerStun = 20,
    CountdownFinished = 21,
    BoostOn = 22,
    BoostOff = 23,
}

impl TryFrom<i32> for ServerMessage {
    type Error = i32;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        use ServerMessage::*;
        Ok(match value {
            0 => Connected,
            1 => NewOwner,
            2 => HeartbeatAck,
            3 => StartAck,
            4 => Join,
            5 => Disconnect,
            6 => ConnectedReject,
            7 => RoomFullInfo,
            8 => PickCharacter,
            9 => PickItem,
            10 => PickMap,
            11 => Ready,
            12 => Unready,
            13 => MoveUp,
            14 => MoveDown,
            15 => PlayerDead,
            16 => GameOver,
            17 => PlayerDistance,
            18 => PlayerHp,
            19 => PlayerPosition,
            20 => PlayerStun,
            21 => CountdownFinished,
            22 => BoostOn,
            23 => BoostOff,
            other => return Err(other),
        })
    }
}

impl From<ServerMessage> for i32 {
    fn from(message: ServerMessage) -> Self {
        message as i32
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct MessageHeader {
    pub sender_id: i32,
    pub msg_type: i32,
    pub body_len: i32,
}

impl MessageHeader {
    pub fn decode(bytes: &[u8; HEADER_LEN]) -> Result<Self, ProtocolError> {
        Ok(wire_options().deserialize(bytes)?)
    }

    /// Validated body length, rejecting negative or oversized declarations.
    pub fn body_len(&self) -> Result<usize, ProtocolError> {
        let len = usize::try_from(self.body_len)
            .map_err(|_| ProtocolError::InvalidBodyLength(self.body_len))?;
        if len > MAX_BODY_LEN {
            return Err(ProtocolError::InvalidBodyLength(self.body_len));
        }
        Ok(len)
    }
}

/// A single framed message: header fields plus the raw body.
#[derive(Debug, Clone, PartialEq)]
pub struct Packet {
    pub sender_id: i32,
    pub msg_type: i32,
    pub body: Vec<u8>,
}

impl Packet {
    pub fn new(sender_id: i32, msg_type: impl Into<i32>, body: Vec<u8>) -> Self {
        Self {
            sender_id,
            msg_type: msg_type.into(),
            body,
        }
    }

    pub fn empty(sender_id: i32, msg_type: impl Into<i32>) -> Self {
        Self::new(sender_id, msg_type, Vec::new())
    }

    pub fn with_payload<T: Serialize>(
        sender_id: i32,
        msg_type: impl Into<i32>,
        payload: &T,
    ) -> Result<Self, ProtocolError> {
        let body = wire_options().serialize(payload)?;
        Ok(Self::new(sender_id, msg_type, body))
    }

    /// Text bodies are NUL-terminated so C-string readers can consume them.
    pub fn with_text(sender_id: i32, msg_type: impl Into<i32>, text: &str) -> Self {
        let mut body = Vec::with_capacity(text.len() + 1);
        body.extend_from_slice(text.as_bytes());
        body.push(0);
        Self::new(sender_id, msg_type, body)
    }

    pub fn client_message(&self) -> Option<ClientMessage> {
        ClientMessage::try_from(self.msg_type).ok()
    }

    pub fn server_message(&self) -> Option<ServerMessage> {
        ServerMessage::try_from(self.msg_type).ok()
    }

    /// Decodes the body as `T`; the body must match the layout exactly.
    pub fn payload<T: DeserializeOwned>(&self) -> Result<T, ProtocolError> {
        Ok(wire_options().deserialize(&self.body)?)
    }

    pub fn text(&self) -> Option<&str> {
        let bytes = self.body.strip_suffix(&[0]).unwrap_or(&self.body);
        std::str::from_utf8(bytes).ok()
    }

    pub fn header(&self) -> Result<MessageHeader, ProtocolError> {
        if self.body.len() > MAX_BODY_LEN {
            return Err(ProtocolError::BodyTooLarge(self.body.len()));
        }
        Ok(MessageHeader {
            sender_id: self.sender_id,
            msg_type: self.msg_type,
            body_len: self.body.len() as i32,
        })
    }

    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        let header = self.header()?;
        let mut bytes = wire_options().serialize(&header)?;
        bytes.extend_from_slice(&self.body);
        Ok(bytes)
    }
}

/// Reads one complete frame. Any short read surfaces as an error; callers
/// treat it as the end of the connection.
pub async fn read_packet<R>(reader: &mut R) -> Result<Packet, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    let mut header_bytes = [0u8; HEADER_LEN];
    reader.read_exact(&mut header_bytes).await?;
    let header = MessageHeader::decode(&header_bytes)?;

    let mut body = vec![0u8; header.body_len()?];
    reader.read_exact(&mut body).await?;

    Ok(Packet {
        sender_id: header.sender_id,
        msg_type: header.msg_type,
        body,
    })
}

pub async fn write_packet<W>(writer: &mut W, packet: &Packet) -> Result<(), ProtocolError>
where
    W: AsyncWrite + Unpin,
{
    let bytes = packet.encode()?;
    writer.write_all(&bytes).await?;
    writer.flush().await?;
    Ok(())
}

/// Per-player value broadcast on the fixed step (distance, position, HP).
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct PlayerScalar {
    pub id: i32,
    pub value: f32,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct ItemPick {
    pub slot: i32,
    pub item_id: i32,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct StartAck {
    pub success: bool,
}

/// Lobby view of one player inside a [`RoomSnapshot`].
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct PlayerSummary {
    pub id: i32,
    pub ready: bool,
    pub character_id: i32,
    pub item_slots: [i32; ITEM_SLOT_COUNT],
}

#[derive(Debug, Serialize, Deserialize)]
struct SnapshotHead {
    owner_id: i32,
    map_id: i32,
    player_count: i32,
}

/// Full lobby state sent to a connection right after it is admitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomSnapshot {
    pub owner_id: Option<i32>,
    pub map_id: i32,
    pub players: Vec<PlayerSummary>,
}

impl RoomSnapshot {
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        if self.players.len() > MAX_PLAYERS {
            return Err(ProtocolError::InvalidPlayerCount(self.players.len() as i32));
        }

        let head = SnapshotHead {
            owner_id: self.owner_id.unwrap_or(NONE_ID),
            map_id: self.map_id,
            player_count: self.players.len() as i32,
        };

        let mut bytes = wire_options().serialize(&head)?;
        for player in &self.players {
            bytes.extend(wire_options().serialize(player)?);
        }
        Ok(bytes)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let mut reader = bytes;
        let head: SnapshotHead = wire_options().deserialize_from(&mut reader)?;

        let count = usize::try_from(head.player_count)
            .ok()
            .filter(|count| *count <= MAX_PLAYERS)
            .ok_or(ProtocolError::InvalidPlayerCount(head.player_count))?;

        let mut players = Vec::with_capacity(count);
        for _ in 0..count {
            let player: PlayerSummary = wire_options().deserialize_from(&mut reader)?;
            players.push(player);
        }

        if !reader.is_empty() {
            return Err(ProtocolError::TrailingBytes(reader.len()));
        }

        Ok(Self {
            owner_id: (head.owner_id != NONE_ID).then_some(head.owner_id),
            map_id: head.map_id,
            players,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    fn lobby_snapshot() -> RoomSnapshot {
        RoomSnapshot {
            owner_id: Some(1),
            map_id: 2,
            players: vec![
                PlayerSummary {
                    id: 1,
                    ready: false,
                    character_id: 0,
                    item_slots: [1, NONE_ID, NONE_ID],
                },
                PlayerSummary {
                    id: 3,
                    ready: true,
                    character_id: 2,
                    item_slots: [0, 2, 1],
                },
            ],
        }
    }

    #[test]
    fn test_header_is_three_native_i32() {
        let packet = Packet::new(7, ServerMessage::Join, 7i32.to_ne_bytes().to_vec());
        let bytes = packet.encode().unwrap();

        assert_eq!(bytes.len(), HEADER_LEN + 4);
        assert_eq!(&bytes[0..4], &7i32.to_ne_bytes());
        assert_eq!(&bytes[4..8], &(ServerMessage::Join as i32).to_ne_bytes());
        assert_eq!(&bytes[8..12], &4i32.to_ne_bytes());
        assert_eq!(&bytes[12..], &7i32.to_ne_bytes());
    }

    #[test]
    fn test_scalar_payload_layout() {
        let packet = Packet::with_payload(
            4,
            ServerMessage::PlayerDistance,
            &PlayerScalar { id: 4, value: 12.5 },
        )
        .unwrap();

        let mut expected = 4i32.to_ne_bytes().to_vec();
        expected.extend_from_slice(&12.5f32.to_ne_bytes());
        assert_eq!(packet.body, expected);

        let decoded: PlayerScalar = packet.payload().unwrap();
        assert_eq!(decoded.id, 4);
        assert_approx_eq!(decoded.value, 12.5);
    }

    #[test]
    fn test_payload_length_mismatch_is_rejected() {
        let short = Packet::new(1, ClientMessage::PickItem, 0i32.to_ne_bytes().to_vec());
        assert!(short.payload::<ItemPick>().is_err());

        let mut long_body = 0i32.to_ne_bytes().to_vec();
        long_body.push(9);
        let long = Packet::new(1, ClientMessage::PickCharacter, long_body);
        assert!(long.payload::<i32>().is_err());
    }

    #[test]
    fn test_text_body_is_nul_terminated() {
        let packet = Packet::with_text(0, ServerMessage::ConnectedReject, "Room is full.");
        assert_eq!(packet.body.last(), Some(&0));
        assert_eq!(packet.text(), Some("Room is full."));
    }

    #[test]
    fn test_room_snapshot_roundtrip() {
        let snapshot = lobby_snapshot();
        let bytes = snapshot.encode().unwrap();

        // head + two players of (id, ready, character, 3 slots)
        assert_eq!(bytes.len(), 12 + 2 * (4 + 1 + 4 + 12));
        assert_eq!(RoomSnapshot::decode(&bytes).unwrap(), snapshot);
    }

    #[test]
    fn test_room_snapshot_without_owner() {
        let snapshot = RoomSnapshot {
            owner_id: None,
            map_id: 0,
            players: vec![],
        };
        let bytes = snapshot.encode().unwrap();
        assert_eq!(&bytes[0..4], &NONE_ID.to_ne_bytes());
        assert_eq!(RoomSnapshot::decode(&bytes).unwrap(), snapshot);
    }

    #[test]
    fn test_room_snapshot_rejects_bad_counts_and_trailing_bytes() {
        let mut bytes = lobby_snapshot().encode().unwrap();
        bytes.push(0);
        assert!(matches!(
            RoomSnapshot::decode(&bytes),
            Err(ProtocolError::TrailingBytes(1))
        ));

        let mut negative = Vec::new();
        negative.extend_from_slice(&1i32.to_ne_bytes());
        negative.extend_from_slice(&0i32.to_ne_bytes());
        negative.extend_from_slice(&(-2i32).to_ne_bytes());
        assert!(matches!(
            RoomSnapshot::decode(&negative),
            Err(ProtocolError::InvalidPlayerCount(-2))
        ));
    }

    #[test]
    fn test_message_type_conversions() {
        for code in 0..=12 {
            let message = ClientMessage::try_from(code).unwrap();
            assert_eq!(i32::from(message), code);
        }
        for code in 0..=23 {
            let message = ServerMessage::try_from(code).unwrap();
            assert_eq!(i32::from(message), code);
        }
        assert_eq!(ClientMessage::try_from(13), Err(13));
        assert_eq!(ServerMessage::try_from(-1), Err(-1));
    }

    #[test]
    fn test_read_packet_from_stream() {
        let first = Packet::with_payload(
            9,
            ClientMessage::PickItem,
            &ItemPick {
                slot: 1,
                item_id: 4,
            },
        )
        .unwrap();
        let second = Packet::empty(9, ClientMessage::Ready);

        let mut stream = first.encode().unwrap();
        stream.extend(second.encode().unwrap());

        let mut reader = stream.as_slice();
        let decoded_first = tokio_test::block_on(read_packet(&mut reader)).unwrap();
        let decoded_second = tokio_test::block_on(read_packet(&mut reader)).unwrap();

        assert_eq!(decoded_first, first);
        assert_eq!(decoded_second, second);
        assert!(tokio_test::block_on(read_packet(&mut reader)).is_err());
    }

    #[test]
    fn test_read_packet_short_body_is_an_error() {
        let mut bytes = Packet::new(1, ClientMessage::PickMap, vec![1, 2, 3, 4])
            .encode()
            .unwrap();
        bytes.truncate(HEADER_LEN + 2);

        let mut reader = bytes.as_slice();
        let result = tokio_test::block_on(read_packet(&mut reader));
        assert!(matches!(result, Err(ProtocolError::Io(_))));
    }

    #[test]
    fn test_read_packet_rejects_negative_length() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&1i32.to_ne_bytes());
        bytes.extend_from_slice(&0i32.to_ne_bytes());
        bytes.extend_from_slice(&(-5i32).to_ne_bytes());

        let mut reader = bytes.as_slice();
        let result = tokio_test::block_on(read_packet(&mut reader));
        assert!(matches!(result, Err(ProtocolError::InvalidBodyLength(-5))));
    }

    #[test]
    fn test_write_packet_matches_encode() {
        let packet = Packet::with_payload(0, ServerMessage::NewOwner, &3i32).unwrap();
        let mut sink: Vec<u8> = Vec::new();
        tokio_test::block_on(write_packet(&mut sink, &packet)).unwrap();
        assert_eq!(sink, packet.encode().unwrap());
    }
}
