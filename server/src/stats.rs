//! Per-player derived stats and timed status effects.
//!
//! A [`StatState`] is rebuilt from a character's base stats at the start of
//! every race. Items add flat modifiers on top; HP is tracked separately and
//! may push the maximum upward when healed past it. Stun and protection are
//! timers counted up against their durations by the simulation.

use shared::{CharacterInfo, StatType, BOOST_MULTIPLIER, PROTECTION_DURATION};

/// Snapshot of a character's table stats taken when a race starts.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BaseStats {
    pub max_hp: f32,
    pub speed: f32,
    pub dex: f32,
    pub def: f32,
    pub stun_duration: f32,
}

impl From<&CharacterInfo> for BaseStats {
    fn from(character: &CharacterInfo) -> Self {
        Self {
            max_hp: character.hp,
            speed: character.speed,
            dex: character.dex,
            def: character.def,
            stun_duration: character.stun_duration,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatState {
    base: BaseStats,
    max_hp: f32,
    cur_hp: f32,
    added_speed: f32,
    added_dex: f32,
    added_def: f32,
    stun_elapsed: f32,
    protection_elapsed: f32,
    stunned: bool,
    protected: bool,
    boosted: bool,
    play_distance: f32,
    /// Set once this life's death has been reported.
    death_reported: bool,
}

/// Stat capability of anything that carries a [`StatState`].
///
/// Implementors only expose their state; all behavior is provided here so a
/// player record and a bare stat block behave identically.
pub trait StatController {
    fn stat_state(&self) -> &StatState;
    fn stat_state_mut(&mut self) -> &mut StatState;

    /// Resets every stat and status to a fresh life built from `base`.
    fn init_stat(&mut self, base: BaseStats) {
        *self.stat_state_mut() = StatState {
            base,
            max_hp: base.max_hp,
            cur_hp: base.max_hp,
            ..StatState::default()
        };
    }

    fn add_value_by_stat(&mut self, stat: StatType, value: f32) {
        match stat {
            StatType::Hp => self.add_hp(value),
            StatType::Speed => self.stat_state_mut().added_speed += value,
            StatType::Dex => self.stat_state_mut().added_dex += value,
            StatType::Def => self.stat_state_mut().added_def += value,
        }
    }

    /// Discrete hit: defense is subtracted from the raw amount.
    ///
    /// Returns true only on the call that ends this life.
    fn apply_flat_damage(&mut self, amount: f32) -> bool {
        let damage = (amount - self.def()).max(0.0);
        take_damage(self.stat_state_mut(), damage)
    }

    /// Continuous decay: defense is a percentage reduction of the amount.
    ///
    /// Returns true only on the call that ends this life.
    fn apply_rate_damage(&mut self, amount: f32) -> bool {
        let damage = (amount - amount * (self.def() * 0.01)).max(0.0);
        take_damage(self.stat_state_mut(), damage)
    }

    fn add_hp(&mut self, amount: f32) {
        let state = self.stat_state_mut();
        state.cur_hp = (state.cur_hp + amount).max(0.0);
        if state.cur_hp > state.max_hp {
            state.max_hp = state.cur_hp;
        }
    }

    fn set_stun(&mut self) {
        self.stat_state_mut().stunned = true;
    }

    /// Advances the stun timer; on expiry the protection window opens.
    fn release_stun(&mut self, dt: f32) {
        let state = self.stat_state_mut();
        if !state.stunned {
            return;
        }
        state.stun_elapsed += dt;
        if state.stun_elapsed > state.base.stun_duration {
            state.stun_elapsed = 0.0;
            state.stunned = false;
            state.protected = true;
            state.protection_elapsed = 0.0;
        }
    }

    fn release_protection(&mut self, dt: f32) {
        let state = self.stat_state_mut();
        if !state.protected {
            return;
        }
        state.protection_elapsed += dt;
        if state.protection_elapsed > PROTECTION_DURATION {
            state.protection_elapsed = 0.0;
            state.protected = false;
        }
    }

    fn set_boost(&mut self, boosted: bool) {
        self.stat_state_mut().boosted = boosted;
    }

    fn add_play_distance(&mut self, distance: f32) {
        self.stat_state_mut().play_distance += distance;
    }

    fn max_hp(&self) -> f32 {
        self.stat_state().max_hp
    }

    fn cur_hp(&self) -> f32 {
        self.stat_state().cur_hp
    }

    fn speed(&self) -> f32 {
        let state = self.stat_state();
        state.base.speed + state.added_speed
    }

    fn dex(&self) -> f32 {
        let state = self.stat_state();
        state.base.dex + state.added_dex
    }

    fn def(&self) -> f32 {
        let state = self.stat_state();
        state.base.def + state.added_def
    }

    fn stun_duration(&self) -> f32 {
        self.stat_state().base.stun_duration
    }

    fn is_stunned(&self) -> bool {
        self.stat_state().stunned
    }

    fn is_protected(&self) -> bool {
        self.stat_state().protected
    }

    fn is_boosted(&self) -> bool {
        self.stat_state().boosted
    }

    fn boost_multiplier(&self) -> f32 {
        if self.is_boosted() {
            BOOST_MULTIPLIER
        } else {
            1.0
        }
    }

    fn play_distance(&self) -> f32 {
        self.stat_state().play_distance
    }
}

impl StatController for StatState {
    fn stat_state(&self) -> &StatState {
        self
    }

    fn stat_state_mut(&mut self) -> &mut StatState {
        self
    }
}

fn take_damage(state: &mut StatState, damage: f32) -> bool {
    state.cur_hp -= damage;
    if state.cur_hp > 0.0 {
        return false;
    }
    state.cur_hp = 0.0;
    if state.death_reported {
        return false;
    }
    state.death_reported = true;
    true
}
