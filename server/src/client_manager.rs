//! Connection registry and per-player lobby/runtime records
//!
//! This module tracks every admitted connection as a [`Client`], including:
//! - Id assignment (monotonic, never reused within a run)
//! - Capacity enforcement for the single room
//! - Room ownership and its hand-over when the owner leaves
//! - Lobby selections (ready flag, character, item loadout)
//! - Race runtime state (alive flag, lane position, stats)
//!
//! Clients are kept in join order; the oldest remaining client inherits
//! ownership, and broadcasts walk the list in that order.

use crate::stats::{StatController, StatState};
use log::info;
use shared::{PlayerSummary, ITEM_SLOT_COUNT, NONE_ID};
use std::net::SocketAddr;

/// An admitted connection and the player it controls
///
/// Each client carries:
/// - Connection metadata (id, peer address)
/// - Lobby choices that survive between races until game over
/// - Race state rebuilt at every start
#[derive(Debug, Clone)]
pub struct Client {
    /// Unique client identifier assigned by the server
    pub id: i32,
    /// Peer address, kept for logging
    pub addr: SocketAddr,
    pub ready: bool,
    pub alive: bool,
    /// Selected character index, `NONE_ID` when unpicked
    pub character_id: i32,
    /// Item loadout, each slot `NONE_ID` or an item index
    pub item_slots: [i32; ITEM_SLOT_COUNT],
    /// Direction of vertical travel; true climbs, false descends
    pub moving_up: bool,
    /// Vertical lane position, centered on 0
    pub y_pos: f32,
    pub stats: StatState,
}

impl Client {
    /// Creates a client in the default lobby state
    pub fn new(id: i32, addr: SocketAddr) -> Self {
        Self {
            id,
            addr,
            ready: false,
            alive: true,
            character_id: NONE_ID,
            item_slots: [NONE_ID; ITEM_SLOT_COUNT],
            moving_up: false,
            y_pos: 0.0,
            stats: StatState::default(),
        }
    }

    /// Returns the client to the state it had right after joining
    ///
    /// Used when a race ends: readiness and selections are cleared so the
    /// lobby starts over, and stats are dropped until the next start.
    pub fn reset_runtime(&mut self) {
        *self = Self::new(self.id, self.addr);
    }

    /// Stores an item in a loadout slot. Returns false if the slot is out of range.
    pub fn set_item(&mut self, slot: i32, item_id: i32) -> bool {
        match usize::try_from(slot) {
            Ok(slot) if slot < ITEM_SLOT_COUNT => {
                self.item_slots[slot] = item_id;
                true
            }
            _ => false,
        }
    }

    /// Items in populated slots, in slot order
    pub fn equipped_items(&self) -> impl Iterator<Item = i32> + '_ {
        self.item_slots
            .iter()
            .copied()
            .filter(|item| *item != NONE_ID)
    }

    pub fn summary(&self) -> PlayerSummary {
        PlayerSummary {
            id: self.id,
            ready: self.ready,
            character_id: self.character_id,
            item_slots: self.item_slots,
        }
    }
}

impl StatController for Client {
    fn stat_state(&self) -> &StatState {
        &self.stats
    }

    fn stat_state_mut(&mut self) -> &mut StatState {
        &mut self.stats
    }
}

/// Result of removing a client from the registry
#[derive(Debug)]
pub struct Departure {
    pub client: Client,
    /// Set when ownership passed to another client
    pub new_owner: Option<i32>,
}

/// Manages all admitted clients and room ownership
///
/// The ClientManager enforces the room's capacity, hands out ids that are
/// never reused, and keeps the ownership invariant: the owner is `None`
/// exactly when no clients remain, otherwise it names a registered client.
pub struct ClientManager {
    /// Admitted clients in join order
    clients: Vec<Client>,
    /// Next id to hand out; only ever increases
    next_client_id: i32,
    /// Maximum number of concurrent clients allowed
    max_clients: usize,
    owner: Option<i32>,
}

impl ClientManager {
    /// Creates an empty registry with the given capacity
    ///
    /// Client ids start from 1 and increment for each admitted connection.
    pub fn new(max_clients: usize) -> Self {
        Self {
            clients: Vec::new(),
            next_client_id: 1,
            max_clients,
            owner: None,
        }
    }

    /// Attempts to admit a new connection
    ///
    /// Returns Some(client_id) if admitted, None if the room is at capacity.
    /// The first client admitted into an empty room becomes its owner.
    pub fn add_client(&mut self, addr: SocketAddr) -> Option<i32> {
        if self.is_full() {
            return None;
        }

        let client_id = self.next_client_id;
        self.next_client_id += 1;

        self.clients.push(Client::new(client_id, addr));
        if self.owner.is_none() {
            self.owner = Some(client_id);
        }

        info!("Client {} connected from {}", client_id, addr);
        Some(client_id)
    }

    /// Removes a client from the room
    ///
    /// If the departing client owned the room, ownership moves to the oldest
    /// remaining client, or is cleared when none remain. Returns None if the
    /// client was already gone.
    pub fn remove_client(&mut self, client_id: i32) -> Option<Departure> {
        let index = self.clients.iter().position(|c| c.id == client_id)?;
        let client = self.clients.remove(index);
        info!("Client {} disconnected", client.id);

        let mut new_owner = None;
        if self.owner == Some(client_id) {
            self.owner = self.clients.first().map(|c| c.id);
            new_owner = self.owner;
            match self.owner {
                Some(owner) => info!("Client {} is now the room owner", owner),
                None => info!("Room is empty, no owner"),
            }
        }

        Some(Departure { client, new_owner })
    }

    pub fn get(&self, client_id: i32) -> Option<&Client> {
        self.clients.iter().find(|c| c.id == client_id)
    }

    pub fn get_mut(&mut self, client_id: i32) -> Option<&mut Client> {
        self.clients.iter_mut().find(|c| c.id == client_id)
    }

    /// Clients in join order
    pub fn iter(&self) -> impl Iterator<Item = &Client> {
        self.clients.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Client> {
        self.clients.iter_mut()
    }

    /// Ids in join order, used as the broadcast fan-out list
    pub fn ids(&self) -> Vec<i32> {
        self.clients.iter().map(|c| c.id).collect()
    }

    pub fn owner(&self) -> Option<i32> {
        self.owner
    }

    pub fn is_owner(&self, client_id: i32) -> bool {
        self.owner == Some(client_id)
    }

    pub fn alive_count(&self) -> usize {
        self.clients.iter().filter(|c| c.alive).count()
    }

    /// Returns the number of currently admitted clients
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// Returns true if no clients are currently admitted
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.clients.len() >= self.max_clients
    }
}

/// Test suite for the connection registry
///
/// Covers admission, capacity, id monotonicity and the ownership invariant
/// under arbitrary removal orders.
#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use shared::MAX_PLAYERS;

    fn test_addr() -> SocketAddr {
        "127.0.0.1:8080".parse().unwrap()
    }

    fn test_addr2() -> SocketAddr {
        "127.0.0.1:8081".parse().unwrap()
    }

    fn assert_owner_invariant(manager: &ClientManager) {
        match manager.owner() {
            None => assert!(manager.is_empty()),
            Some(owner) => assert!(manager.get(owner).is_some()),
        }
    }

    #[test]
    fn test_client_creation() {
        let addr = test_addr();
        let client = Client::new(1, addr);

        assert_eq!(client.id, 1);
        assert_eq!(client.addr, addr);
        assert!(!client.ready);
        assert!(client.alive);
        assert_eq!(client.character_id, NONE_ID);
        assert_eq!(client.item_slots, [NONE_ID; ITEM_SLOT_COUNT]);
        assert_eq!(client.y_pos, 0.0);
    }

    #[test]
    fn test_client_set_item_bounds() {
        let mut client = Client::new(1, test_addr());

        assert!(client.set_item(0, 4));
        assert!(client.set_item(2, 7));
        assert!(!client.set_item(3, 1));
        assert!(!client.set_item(-1, 1));

        assert_eq!(client.item_slots, [4, NONE_ID, 7]);
        assert_eq!(client.equipped_items().collect::<Vec<_>>(), vec![4, 7]);
    }

    #[test]
    fn test_client_reset_runtime() {
        let mut client = Client::new(3, test_addr());
        client.ready = true;
        client.alive = false;
        client.character_id = 2;
        client.set_item(1, 5);
        client.moving_up = true;
        client.y_pos = 120.0;
        client.set_boost(true);

        client.reset_runtime();

        assert_eq!(client.id, 3);
        assert!(!client.ready);
        assert!(client.alive);
        assert_eq!(client.character_id, NONE_ID);
        assert_eq!(client.item_slots, [NONE_ID; ITEM_SLOT_COUNT]);
        assert!(!client.moving_up);
        assert_eq!(client.y_pos, 0.0);
        assert!(!client.is_boosted());
    }

    #[test]
    fn test_client_summary() {
        let mut client = Client::new(2, test_addr());
        client.ready = true;
        client.character_id = 1;
        client.set_item(0, 3);

        let summary = client.summary();
        assert_eq!(summary.id, 2);
        assert!(summary.ready);
        assert_eq!(summary.character_id, 1);
        assert_eq!(summary.item_slots, [3, NONE_ID, NONE_ID]);
    }

    #[test]
    fn test_client_manager_creation() {
        let manager = ClientManager::new(5);
        assert_eq!(manager.max_clients, 5);
        assert!(manager.is_empty());
        assert_eq!(manager.len(), 0);
        assert_eq!(manager.owner(), None);
    }

    #[test]
    fn test_add_multiple_clients() {
        let mut manager = ClientManager::new(3);

        let client_id1 = manager.add_client(test_addr()).unwrap();
        let client_id2 = manager.add_client(test_addr2()).unwrap();
        let client_id3 = manager.add_client(test_addr2()).unwrap();

        assert_eq!((client_id1, client_id2, client_id3), (1, 2, 3));
        assert_eq!(manager.ids(), vec![1, 2, 3]);
        assert_eq!(manager.owner(), Some(1));
    }

    #[test]
    fn test_add_client_max_capacity() {
        let mut manager = ClientManager::new(MAX_PLAYERS);
        for _ in 0..MAX_PLAYERS {
            assert!(manager.add_client(test_addr()).is_some());
        }

        assert!(manager.is_full());
        assert!(manager.add_client(test_addr2()).is_none());
        assert_eq!(manager.len(), MAX_PLAYERS);
        assert_eq!(manager.ids(), vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_remove_nonexistent_client() {
        let mut manager = ClientManager::new(2);
        assert!(manager.remove_client(999).is_none());
        assert_eq!(manager.len(), 0);
    }

    #[test]
    fn test_remove_owner_passes_to_oldest() {
        let mut manager = ClientManager::new(5);
        manager.add_client(test_addr());
        manager.add_client(test_addr());
        manager.add_client(test_addr());

        let departure = manager.remove_client(1).unwrap();
        assert_eq!(departure.client.id, 1);
        assert_eq!(departure.new_owner, Some(2));
        assert_eq!(manager.owner(), Some(2));

        let departure = manager.remove_client(3).unwrap();
        assert_eq!(departure.new_owner, None);
        assert_eq!(manager.owner(), Some(2));

        let departure = manager.remove_client(2).unwrap();
        assert_eq!(departure.new_owner, None);
        assert_eq!(manager.owner(), None);
        assert!(manager.is_empty());
    }

    #[test]
    fn test_ids_not_reused_after_removal() {
        let mut manager = ClientManager::new(2);
        let first = manager.add_client(test_addr()).unwrap();
        manager.remove_client(first);

        let second = manager.add_client(test_addr()).unwrap();
        assert_eq!(second, 2);
        assert_eq!(manager.owner(), Some(2));
    }

    #[test]
    fn test_alive_count() {
        let mut manager = ClientManager::new(3);
        manager.add_client(test_addr());
        manager.add_client(test_addr());
        assert_eq!(manager.alive_count(), 2);

        manager.get_mut(1).unwrap().alive = false;
        assert_eq!(manager.alive_count(), 1);
    }

    #[test]
    fn test_random_churn_keeps_invariants() {
        let mut rng = StdRng::seed_from_u64(0x1a2e);
        let mut manager = ClientManager::new(MAX_PLAYERS);
        let mut issued = Vec::new();

        for _ in 0..2_000 {
            if manager.is_empty() || rng.gen_bool(0.55) {
                if let Some(id) = manager.add_client(test_addr()) {
                    assert!(!issued.contains(&id));
                    issued.push(id);
                }
            } else {
                let ids = manager.ids();
                let victim = ids[rng.gen_range(0..ids.len())];
                assert!(manager.remove_client(victim).is_some());
            }

            assert!(manager.len() <= MAX_PLAYERS);
            assert_owner_invariant(&manager);
        }
    }
}
