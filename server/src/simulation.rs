//! Race simulation driven by measured frame deltas

use crate::game::GameState;
use crate::network::Outbox;
use crate::stats::StatController;
use log::{info, warn};
use shared::{
    Packet, PlayerScalar, ServerMessage, BROADCAST_RATE, COUNTDOWN_SECONDS, HP_DECAY_PER_SECOND,
    LANE_HALF_HEIGHT, SERVER_SENDER_ID,
};
use std::time::Duration;

/// Tunables for the simulation loop
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationConfig {
    /// Sleep between iterations; the step itself uses the measured delta
    pub poll_interval: Duration,
    /// Seconds between the Running transition and the first update
    pub countdown: f32,
    /// Seconds per state broadcast
    pub broadcast_step: f32,
    pub hp_decay_per_second: f32,
    pub lane_half_height: f32,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(1),
            countdown: COUNTDOWN_SECONDS,
            broadcast_step: 1.0 / BROADCAST_RATE as f32,
            hp_decay_per_second: HP_DECAY_PER_SECOND,
            lane_half_height: LANE_HALF_HEIGHT,
        }
    }
}

/// Per-race timers, reset on every Running transition
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RaceClock {
    pub countdown_elapsed: f32,
    pub countdown_finished: bool,
    /// Time not yet consumed by state broadcasts
    pub accumulator: f32,
}

pub struct Simulation {
    config: SimulationConfig,
}

impl Simulation {
    pub fn new(mut config: SimulationConfig) -> Self {
        if config.broadcast_step.is_nan() || config.broadcast_step <= 0.0 {
            warn!(
                "Invalid broadcast step {}, using default",
                config.broadcast_step
            );
            config.broadcast_step = SimulationConfig::default().broadcast_step;
        }
        Self { config }
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Advances the race by `dt` seconds
    ///
    /// Nothing happens while waiting or during the countdown. The iteration
    /// on which the countdown elapses only announces CountdownFinished.
    pub fn update(&self, state: &mut GameState, dt: f32, outbox: &mut Outbox) {
        if !state.is_running() {
            return;
        }

        if !state.clock.countdown_finished {
            state.clock.countdown_elapsed += dt;
            if state.clock.countdown_elapsed < self.config.countdown {
                return;
            }
            state.clock.countdown_finished = true;
            info!("Countdown finished");
            outbox.broadcast(Packet::empty(
                SERVER_SENDER_ID,
                ServerMessage::CountdownFinished,
            ));
            return;
        }

        self.step_players(state, dt, outbox);

        // The race may have just ended
        if state.is_running() {
            self.broadcast_steps(state, dt, outbox);
        }
    }

    fn step_players(&self, state: &mut GameState, dt: f32, outbox: &mut Outbox) {
        let half_height = self.config.lane_half_height;
        let decay = self.config.hp_decay_per_second * dt;
        let mut deaths = Vec::new();

        for client in state.clients.iter_mut().filter(|c| c.alive) {
            if client.is_protected() {
                client.release_protection(dt);
            }
            if client.is_stunned() {
                client.release_stun(dt);
            }
            if client.is_stunned() {
                continue;
            }

            let direction = if client.moving_up { 1.0 } else { -1.0 };
            client.y_pos =
                (client.y_pos + client.dex() * dt * direction).clamp(-half_height, half_height);
            let distance = client.speed() * dt * client.boost_multiplier();
            client.add_play_distance(distance);

            if client.is_protected() {
                continue;
            }
            if client.apply_rate_damage(decay) {
                client.alive = false;
                deaths.push(client.id);
            }
        }

        if deaths.is_empty() {
            return;
        }
        for client_id in deaths {
            state.record_death(client_id, outbox);
        }
        state.check_game_over(outbox);
    }

    fn broadcast_steps(&self, state: &mut GameState, dt: f32, outbox: &mut Outbox) {
        let step = self.config.broadcast_step;
        state.clock.accumulator += dt;

        while state.clock.accumulator >= step {
            state.clock.accumulator -= step;

            for client in state.clients.iter().filter(|c| c.alive) {
                let id = client.id;
                outbox.broadcast_payload(
                    id,
                    ServerMessage::PlayerDistance,
                    &PlayerScalar {
                        id,
                        value: client.play_distance(),
                    },
                );
                outbox.broadcast_payload(
                    id,
                    ServerMessage::PlayerPosition,
                    &PlayerScalar {
                        id,
                        value: client.y_pos,
                    },
                );
                outbox.broadcast_payload(
                    id,
                    ServerMessage::PlayerHp,
                    &PlayerScalar {
                        id,
                        value: client.cur_hp(),
                    },
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::tests::{test_content, types};
    use crate::game::RoomPhase;
    use assert_approx_eq::assert_approx_eq;
    use std::net::SocketAddr;

    fn addr() -> SocketAddr {
        "127.0.0.1:9100".parse().unwrap()
    }

    fn quiet_config() -> SimulationConfig {
        SimulationConfig {
            countdown: 1.0,
            broadcast_step: 0.5,
            hp_decay_per_second: 0.0,
            ..SimulationConfig::default()
        }
    }

    fn running_room(players: usize) -> GameState {
        let mut state = GameState::new(test_content());
        let mut outbox = Outbox::new();
        for _ in 0..players {
            state.accept(addr(), &mut outbox);
        }
        for client in state.clients.iter_mut() {
            client.ready = true;
        }
        assert!(state.start(1, &mut outbox));
        state
    }

    fn finish_countdown(sim: &Simulation, state: &mut GameState) {
        let mut outbox = Outbox::new();
        sim.update(state, sim.config().countdown, &mut outbox);
        assert!(state.clock.countdown_finished);
    }

    #[test]
    fn test_default_config() {
        let config = SimulationConfig::default();
        assert_eq!(config.poll_interval, Duration::from_millis(1));
        assert_eq!(config.countdown, 3.0);
        assert_approx_eq!(config.broadcast_step, 1.0 / 30.0);
        assert_eq!(config.hp_decay_per_second, 10.0);
        assert_eq!(config.lane_half_height, 360.0);
    }

    #[test]
    fn test_invalid_broadcast_step_falls_back() {
        let sim = Simulation::new(SimulationConfig {
            broadcast_step: 0.0,
            ..SimulationConfig::default()
        });
        assert!(sim.config().broadcast_step > 0.0);
    }

    #[test]
    fn test_waiting_room_is_untouched() {
        let sim = Simulation::new(SimulationConfig::default());
        let mut state = GameState::new(test_content());
        let mut outbox = Outbox::new();
        state.accept(addr(), &mut outbox);

        let mut outbox = Outbox::new();
        sim.update(&mut state, 10.0, &mut outbox);
        assert!(outbox.is_empty());
        assert_eq!(state.clock, RaceClock::default());
    }

    #[test]
    fn test_countdown_finishes_exactly_once() {
        let sim = Simulation::new(SimulationConfig::default());
        let mut state = running_room(2);
        let mut outbox = Outbox::new();

        // Nothing before the countdown elapses
        for _ in 0..29 {
            sim.update(&mut state, 0.1, &mut outbox);
        }
        assert!(outbox.is_empty());
        assert_eq!(state.clients.get(1).unwrap().play_distance(), 0.0);
        assert_eq!(state.clients.get(1).unwrap().cur_hp(), 100.0);

        sim.update(&mut state, 0.2, &mut outbox);
        assert_eq!(types(&outbox), vec![ServerMessage::CountdownFinished]);

        let mut outbox = Outbox::new();
        for _ in 0..10 {
            sim.update(&mut state, 0.1, &mut outbox);
        }
        assert!(!types(&outbox).contains(&ServerMessage::CountdownFinished));
    }

    #[test]
    fn test_movement_and_distance() {
        let sim = Simulation::new(quiet_config());
        let mut state = running_room(1);
        finish_countdown(&sim, &mut state);

        let mut outbox = Outbox::new();
        state.clients.get_mut(1).unwrap().moving_up = true;
        sim.update(&mut state, 0.25, &mut outbox);

        let client = state.clients.get(1).unwrap();
        assert_approx_eq!(client.y_pos, 30.0);
        assert_approx_eq!(client.play_distance(), 150.0);

        state.clients.get_mut(1).unwrap().set_boost(true);
        state.clients.get_mut(1).unwrap().moving_up = false;
        sim.update(&mut state, 0.25, &mut outbox);

        let client = state.clients.get(1).unwrap();
        assert_approx_eq!(client.y_pos, 0.0);
        assert_approx_eq!(client.play_distance(), 450.0);
    }

    #[test]
    fn test_position_clamped_to_lane() {
        let sim = Simulation::new(quiet_config());
        let mut state = running_room(1);
        finish_countdown(&sim, &mut state);

        let mut outbox = Outbox::new();
        state.clients.get_mut(1).unwrap().moving_up = true;
        for _ in 0..20 {
            sim.update(&mut state, 1.0, &mut outbox);
        }
        assert_eq!(state.clients.get(1).unwrap().y_pos, 360.0);

        state.clients.get_mut(1).unwrap().moving_up = false;
        for _ in 0..20 {
            sim.update(&mut state, 1.0, &mut outbox);
        }
        assert_eq!(state.clients.get(1).unwrap().y_pos, -360.0);
    }

    #[test]
    fn test_stun_freezes_runner_then_protects() {
        let sim = Simulation::new(SimulationConfig {
            hp_decay_per_second: 10.0,
            ..quiet_config()
        });
        let mut state = running_room(1);
        finish_countdown(&sim, &mut state);
        state.clients.get_mut(1).unwrap().set_stun();

        let mut outbox = Outbox::new();
        sim.update(&mut state, 0.5, &mut outbox);
        let client = state.clients.get(1).unwrap();
        assert!(client.is_stunned());
        assert_eq!(client.play_distance(), 0.0);
        assert_eq!(client.cur_hp(), 100.0);

        // Stun (1.0s) expires, protection begins: movement resumes, no decay
        sim.update(&mut state, 0.6, &mut outbox);
        let client = state.clients.get(1).unwrap();
        assert!(!client.is_stunned());
        assert!(client.is_protected());
        assert!(client.play_distance() > 0.0);
        assert_eq!(client.cur_hp(), 100.0);
    }

    #[test]
    fn test_decay_death_fires_once() {
        let sim = Simulation::new(SimulationConfig {
            hp_decay_per_second: 100.0,
            ..quiet_config()
        });
        let mut state = running_room(2);
        state.clients.get_mut(2).unwrap().set_stun();
        finish_countdown(&sim, &mut state);

        // Defense 10 turns 100/s into 90/s
        let mut outbox = Outbox::new();
        for _ in 0..30 {
            sim.update(&mut state, 0.1, &mut outbox);
        }

        let deaths: Vec<_> = types(&outbox)
            .into_iter()
            .filter(|t| *t == ServerMessage::PlayerDead)
            .collect();
        assert_eq!(deaths.len(), 1);
        assert!(state.dead_players.contains(&1));
        assert!(!state.clients.get(1).unwrap().alive);
        assert_eq!(state.clients.get(1).unwrap().cur_hp(), 0.0);
        assert!(state.is_running());
    }

    #[test]
    fn test_last_death_triggers_game_over_without_broadcasts() {
        let sim = Simulation::new(SimulationConfig {
            hp_decay_per_second: 1000.0,
            ..quiet_config()
        });
        let mut state = running_room(1);
        finish_countdown(&sim, &mut state);

        let mut outbox = Outbox::new();
        sim.update(&mut state, 1.0, &mut outbox);
        assert_eq!(
            types(&outbox),
            vec![ServerMessage::PlayerDead, ServerMessage::GameOver]
        );
        assert_eq!(state.phase, RoomPhase::Waiting);
    }

    #[test]
    fn test_broadcast_catches_up_after_stall() {
        let sim = Simulation::new(quiet_config());
        let mut state = running_room(2);
        finish_countdown(&sim, &mut state);

        let mut outbox = Outbox::new();
        sim.update(&mut state, 1.6, &mut outbox);

        // Three steps of 0.5s, three messages per alive player each
        assert_eq!(outbox.messages().len(), 3 * 3 * 2);
        assert_eq!(
            &types(&outbox)[..3],
            &[
                ServerMessage::PlayerDistance,
                ServerMessage::PlayerPosition,
                ServerMessage::PlayerHp,
            ]
        );
        assert_approx_eq!(state.clock.accumulator, 0.1);
    }

    #[test]
    fn test_dead_players_not_broadcast() {
        let sim = Simulation::new(quiet_config());
        let mut state = running_room(2);
        finish_countdown(&sim, &mut state);
        let mut outbox = Outbox::new();
        state.kill_player(2, &mut outbox);

        let mut outbox = Outbox::new();
        sim.update(&mut state, 0.5, &mut outbox);
        assert_eq!(outbox.messages().len(), 3);
    }

    #[test]
    fn test_late_joiner_is_not_simulated() {
        let sim = Simulation::new(SimulationConfig {
            hp_decay_per_second: 10.0,
            ..quiet_config()
        });
        let mut state = running_room(1);
        finish_countdown(&sim, &mut state);

        let mut outbox = Outbox::new();
        state.accept(addr(), &mut outbox);

        let mut outbox = Outbox::new();
        sim.update(&mut state, 0.5, &mut outbox);
        assert!(!types(&outbox).contains(&ServerMessage::PlayerDead));
        assert!(!state.dead_players.contains(&2));
        assert_eq!(state.alive_count(), 1);
        assert!(state.is_running());

        // Only the runner shows up in the state broadcast
        assert_eq!(outbox.messages().len(), 3);
        assert_eq!(state.clients.get(2).unwrap().play_distance(), 0.0);
    }
}
