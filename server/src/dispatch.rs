//! Routes decoded client messages to room operations

use crate::game::GameState;
use crate::network::Outbox;
use crate::stats::StatController;
use log::debug;
use shared::{ClientMessage, ItemPick, Packet, ProtocolError, ServerMessage};

/// Applies one message from `client_id` to the room
///
/// The connection's id is authoritative; the sender id in the header is
/// ignored. Malformed bodies drop the message and leave the connection open.
pub fn dispatch(state: &mut GameState, client_id: i32, packet: &Packet, outbox: &mut Outbox) {
    let Some(message) = packet.client_message() else {
        debug!("Ignoring unknown message type {} from client {}", packet.msg_type, client_id);
        return;
    };

    if state.clients.get(client_id).is_none() {
        return;
    }

    if let Err(e) = handle(state, client_id, message, packet, outbox) {
        debug!("Dropping {:?} from client {}: {}", message, client_id, e);
    }
}

fn handle(
    state: &mut GameState,
    client_id: i32,
    message: ClientMessage,
    packet: &Packet,
    outbox: &mut Outbox,
) -> Result<(), ProtocolError> {
    match message {
        ClientMessage::Heartbeat => {
            expect_empty(packet)?;
            outbox.send(client_id, Packet::empty(client_id, ServerMessage::HeartbeatAck));
        }
        ClientMessage::Start => {
            expect_empty(packet)?;
            state.start(client_id, outbox);
        }
        ClientMessage::PickCharacter => {
            let character_id: i32 = packet.payload()?;
            if let Some(client) = state.clients.get_mut(client_id) {
                client.character_id = character_id;
            }
            outbox.broadcast_payload(client_id, ServerMessage::PickCharacter, &character_id);
        }
        ClientMessage::PickItem => {
            let pick: ItemPick = packet.payload()?;
            let stored = state
                .clients
                .get_mut(client_id)
                .is_some_and(|client| client.set_item(pick.slot, pick.item_id));
            if !stored {
                debug!("Client {} picked item into invalid slot {}", client_id, pick.slot);
                return Ok(());
            }
            outbox.broadcast_payload(client_id, ServerMessage::PickItem, &pick);
        }
        ClientMessage::PickMap => {
            let map_id: i32 = packet.payload()?;
            state.pick_map(client_id, map_id, outbox);
        }
        ClientMessage::Ready | ClientMessage::Unready => {
            expect_empty(packet)?;
            let ready = message == ClientMessage::Ready;
            if let Some(client) = state.clients.get_mut(client_id) {
                client.ready = ready;
            }
            let echo = if ready {
                ServerMessage::Ready
            } else {
                ServerMessage::Unready
            };
            outbox.broadcast(Packet::empty(client_id, echo));
        }
        ClientMessage::MoveUp | ClientMessage::MoveDown => {
            expect_empty(packet)?;
            let moving_up = message == ClientMessage::MoveUp;
            if let Some(client) = state.clients.get_mut(client_id) {
                client.moving_up = moving_up;
            }
            let echo = if moving_up {
                ServerMessage::MoveUp
            } else {
                ServerMessage::MoveDown
            };
            outbox.broadcast(Packet::empty(client_id, echo));
        }
        ClientMessage::BoostOn | ClientMessage::BoostOff => {
            expect_empty(packet)?;
            let boosted = message == ClientMessage::BoostOn;
            if let Some(client) = state.clients.get_mut(client_id) {
                client.set_boost(boosted);
            }
            let echo = if boosted {
                ServerMessage::BoostOn
            } else {
                ServerMessage::BoostOff
            };
            outbox.broadcast(Packet::empty(client_id, echo));
        }
        ClientMessage::TakeDamage => {
            expect_empty(packet)?;
            state.apply_collision(client_id, outbox);
        }
        ClientMessage::PlayerDead => {
            expect_empty(packet)?;
            let alive = state.clients.get(client_id).is_some_and(|c| c.alive);
            if state.race_underway() && alive {
                state.kill_player(client_id, outbox);
            }
        }
    }

    Ok(())
}

/// Messages without a body must arrive with bodyLen 0
fn expect_empty(packet: &Packet) -> Result<(), ProtocolError> {
    packet.payload::<()>()
}
