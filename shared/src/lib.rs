//! Wire protocol and content table types shared by the lane race server and
//! its clients.

pub mod content;
pub mod protocol;

pub use content::{
    CharacterInfo, GameConfig, ItemInfo, LaneNode, MapInfo, SpriteAtlasInfo, SpriteSheetInfo,
    StatType, StatTypeInfo,
};
pub use protocol::{
    read_packet, write_packet, ClientMessage, ItemPick, MessageHeader, Packet, PlayerScalar,
    PlayerSummary, ProtocolError, RoomSnapshot, ServerMessage, StartAck,
};

pub const DEFAULT_PORT: u16 = 12345;
pub const MAX_PLAYERS: usize = 5;
pub const ITEM_SLOT_COUNT: usize = 3;

/// Marker for an unset owner, character selection or item slot on the wire.
pub const NONE_ID: i32 = -1;
/// Sender id used for messages originating from the server itself.
pub const SERVER_SENDER_ID: i32 = 0;

pub const PROTECTION_DURATION: f32 = 2.0;
pub const BOOST_MULTIPLIER: f32 = 2.0;
pub const SCREEN_HEIGHT: f32 = 720.0;
pub const LANE_HALF_HEIGHT: f32 = SCREEN_HEIGHT / 2.0;

pub const COUNTDOWN_SECONDS: f32 = 3.0;
pub const BROADCAST_RATE: u32 = 30;
pub const HP_DECAY_PER_SECOND: f32 = 10.0;

pub const ROOM_FULL_MESSAGE: &str = "Room is full.";
pub const GAME_OVER_MESSAGE: &str = "All players dead. Game over.";
