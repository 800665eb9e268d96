//! Room state machine: admission, ownership, start and game over

use crate::client_manager::ClientManager;
use crate::content::ContentProvider;
use crate::network::{payload_packet, Outbox};
use crate::simulation::RaceClock;
use crate::stats::{BaseStats, StatController};
use log::{debug, error, info, warn};
use shared::{
    Packet, PlayerScalar, RoomSnapshot, ServerMessage, StartAck, GAME_OVER_MESSAGE, MAX_PLAYERS,
    NONE_ID, SERVER_SENDER_ID,
};
use std::collections::BTreeSet;
use std::net::SocketAddr;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomPhase {
    Waiting,
    Running,
}

/// Outcome of offering a new connection to the room
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Admitted(i32),
    Rejected,
}

/// Session context for the single room
///
/// Owned by the server task; every mutation of players, room fields and
/// stats goes through here and reports its side effects into an [`Outbox`].
pub struct GameState {
    pub clients: ClientManager,
    pub map_id: i32,
    pub phase: RoomPhase,
    /// Players that died during the current race
    pub dead_players: BTreeSet<i32>,
    pub clock: RaceClock,
    content: Arc<dyn ContentProvider>,
}

impl GameState {
    pub fn new(content: Arc<dyn ContentProvider>) -> Self {
        Self {
            clients: ClientManager::new(MAX_PLAYERS),
            map_id: 0,
            phase: RoomPhase::Waiting,
            dead_players: BTreeSet::new(),
            clock: RaceClock::default(),
            content,
        }
    }

    pub fn content(&self) -> &dyn ContentProvider {
        self.content.as_ref()
    }

    pub fn is_running(&self) -> bool {
        self.phase == RoomPhase::Running
    }

    /// Running with the countdown over; only then do hits and deaths count
    pub fn race_underway(&self) -> bool {
        self.is_running() && self.clock.countdown_finished
    }

    /// Registers a new connection if the room has space
    ///
    /// The newcomer gets Connected followed by the full lobby snapshot, and
    /// everyone already in the room gets Join.
    pub fn accept(&mut self, addr: SocketAddr, outbox: &mut Outbox) -> Admission {
        let Some(client_id) = self.clients.add_client(addr) else {
            return Admission::Rejected;
        };

        // Late joiners spectate until the next start
        if self.is_running() {
            if let Some(client) = self.clients.get_mut(client_id) {
                client.alive = false;
            }
        }

        outbox.send_payload(client_id, client_id, ServerMessage::Connected, &client_id);
        match self.snapshot().encode() {
            Ok(body) => outbox.send(
                client_id,
                Packet::new(SERVER_SENDER_ID, ServerMessage::RoomFullInfo, body),
            ),
            Err(e) => error!("Failed to encode room snapshot: {}", e),
        }
        if let Some(join) = payload_packet(client_id, ServerMessage::Join, &client_id) {
            outbox.broadcast_except(join, client_id);
        }

        Admission::Admitted(client_id)
    }

    /// Removes a player, announcing the departure and any new owner
    ///
    /// Returns false if the player was not registered.
    pub fn leave(&mut self, client_id: i32, outbox: &mut Outbox) -> bool {
        let Some(departure) = self.clients.remove_client(client_id) else {
            return false;
        };

        outbox.broadcast_payload(client_id, ServerMessage::Disconnect, &client_id);
        if let Some(owner) = departure.new_owner {
            outbox.broadcast_payload(SERVER_SENDER_ID, ServerMessage::NewOwner, &owner);
        }

        if self.is_running() {
            self.check_game_over(outbox);
        }
        true
    }

    /// Handles a Start request
    ///
    /// Requests from anyone but the owner are ignored without a reply. The
    /// owner always gets a StartAck broadcast carrying the outcome.
    pub fn start(&mut self, requester: i32, outbox: &mut Outbox) -> bool {
        if !self.clients.is_owner(requester) {
            debug!("Ignoring start from non-owner {}", requester);
            return false;
        }

        let success = self.try_start();
        outbox.broadcast_payload(requester, ServerMessage::StartAck, &StartAck { success });
        success
    }

    fn try_start(&mut self) -> bool {
        if self.is_running() {
            debug!("Start requested while a race is running");
            return false;
        }

        let owner = self.clients.owner();
        if let Some(waiting) = self
            .clients
            .iter()
            .find(|c| Some(c.id) != owner && !c.ready)
        {
            info!("Cannot start: client {} is not ready", waiting.id);
            return false;
        }

        // Resolve every character before touching any state
        let content = Arc::clone(&self.content);
        let mut bases = Vec::with_capacity(self.clients.len());
        for client in self.clients.iter() {
            let index = if client.character_id == NONE_ID {
                0
            } else {
                client.character_id
            };
            match content.character(index) {
                Some(character) => bases.push(BaseStats::from(character)),
                None => {
                    warn!(
                        "Cannot start: client {} picked unknown character {}",
                        client.id, index
                    );
                    return false;
                }
            }
        }

        self.dead_players.clear();
        self.clock = RaceClock::default();

        for (client, base) in self.clients.iter_mut().zip(bases) {
            client.alive = true;
            client.moving_up = false;
            client.y_pos = 0.0;
            client.init_stat(base);

            let equipped: Vec<i32> = client.equipped_items().collect();
            for item_id in equipped {
                match content
                    .item(item_id)
                    .and_then(|item| item.stat().map(|stat| (stat, item.add_value)))
                {
                    Some((stat, value)) => client.add_value_by_stat(stat, value),
                    None => warn!(
                        "Client {} has unknown item {}, skipping",
                        client.id, item_id
                    ),
                }
            }
        }

        self.phase = RoomPhase::Running;
        info!(
            "Race started with {} players on map {}",
            self.clients.len(),
            self.map_id
        );
        true
    }

    /// Stores the owner's map choice; ignored for anyone else
    pub fn pick_map(&mut self, requester: i32, map_id: i32, outbox: &mut Outbox) -> bool {
        if !self.clients.is_owner(requester) {
            debug!("Ignoring map pick from non-owner {}", requester);
            return false;
        }

        self.map_id = map_id;
        outbox.broadcast_payload(SERVER_SENDER_ID, ServerMessage::PickMap, &map_id);
        true
    }

    /// Damage a collision deals on the selected map, 0 if it is unknown
    pub fn collision_damage(&self) -> f32 {
        match self.content.map(self.map_id) {
            Some(map) => map.collision_damage,
            None => {
                warn!("Unknown map {}, collisions deal no damage", self.map_id);
                0.0
            }
        }
    }

    /// Applies a reported obstacle hit to a player
    ///
    /// Only live, unprotected runners in a race past its countdown are
    /// affected. The stun is announced before the resulting HP.
    pub fn apply_collision(&mut self, client_id: i32, outbox: &mut Outbox) {
        if !self.race_underway() {
            return;
        }

        let damage = self.collision_damage();
        let Some(client) = self.clients.get_mut(client_id) else {
            return;
        };
        if !client.alive || client.is_protected() {
            debug!("Ignoring collision for client {}", client_id);
            return;
        }

        client.set_stun();
        let died = client.apply_flat_damage(damage);
        let hp = PlayerScalar {
            id: client_id,
            value: client.cur_hp(),
        };

        outbox.broadcast(Packet::empty(client_id, ServerMessage::PlayerStun));
        outbox.broadcast_payload(client_id, ServerMessage::PlayerHp, &hp);

        if died {
            self.kill_player(client_id, outbox);
        }
    }

    /// Death path shared by collisions and self-reports
    pub fn kill_player(&mut self, client_id: i32, outbox: &mut Outbox) {
        if self.record_death(client_id, outbox) {
            self.check_game_over(outbox);
        }
    }

    /// Marks a player dead and announces it without checking for game over
    pub(crate) fn record_death(&mut self, client_id: i32, outbox: &mut Outbox) -> bool {
        let Some(client) = self.clients.get_mut(client_id) else {
            return false;
        };

        client.alive = false;
        self.dead_players.insert(client_id);
        info!(
            "Client {} died at distance {:.1}",
            client_id,
            client.play_distance()
        );

        outbox.broadcast(Packet::empty(client_id, ServerMessage::PlayerDead));
        true
    }

    /// Ends the race once nobody is left alive
    ///
    /// Every player returns to its post-join lobby state.
    pub fn check_game_over(&mut self, outbox: &mut Outbox) -> bool {
        if !self.is_running() || self.clients.alive_count() > 0 {
            return false;
        }

        self.phase = RoomPhase::Waiting;
        for client in self.clients.iter_mut() {
            client.reset_runtime();
        }

        info!("All players dead, game over");
        outbox.broadcast(Packet::with_text(
            SERVER_SENDER_ID,
            ServerMessage::GameOver,
            GAME_OVER_MESSAGE,
        ));
        true
    }

    pub fn alive_count(&self) -> usize {
        self.clients.alive_count()
    }

    pub fn snapshot(&self) -> RoomSnapshot {
        RoomSnapshot {
            owner_id: self.clients.owner(),
            map_id: self.map_id,
            players: self.clients.iter().map(|c| c.summary()).collect(),
        }
    }
}
