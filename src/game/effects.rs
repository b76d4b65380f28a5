//! Powerup Effects
//!
//! Expiring speed effects per player. Timers hold absolute expiry
//! timestamps; an effect is active while its expiry is later than `now`.

use std::collections::BTreeMap;

use crate::game::config::GameConfig;
use crate::game::state::{PlayerId, PlayerState, PowerupKind, PowerupTimers};

impl PowerupTimers {
    /// Boost active at `now`?
    #[inline]
    pub fn boost_active(&self, now: u64) -> bool {
        self.speed_boost > now
    }

    /// Penalty active at `now`?
    #[inline]
    pub fn penalty_active(&self, now: u64) -> bool {
        self.speed_penalty > now
    }

    /// Reset expired timers to 0. Returns true if anything changed.
    pub fn clear_expired(&mut self, now: u64) -> bool {
        let mut changed = false;
        if self.speed_boost != 0 && self.speed_boost <= now {
            self.speed_boost = 0;
            changed = true;
        }
        if self.speed_penalty != 0 && self.speed_penalty <= now {
            self.speed_penalty = 0;
            changed = true;
        }
        changed
    }
}

/// Movement per intent for `player` at `now`.
///
/// Boost is applied first; an active penalty then replaces the result
/// outright, so a penalized player moves at the penalty speed even
/// while boosted.
pub fn effective_speed(player: &PlayerState, now: u64, config: &GameConfig) -> f64 {
    let mut speed = player.speed;
    if player.powerups.boost_active(now) {
        speed = player.speed + config.speed_boost;
    }
    if player.powerups.penalty_active(now) {
        speed = config.penalty_speed;
    }
    speed
}

/// Apply a collected powerup.
///
/// Speed boosts the collector. Slow penalizes every other player and
/// leaves the collector untouched. Returns the players whose timers changed.
pub fn apply_powerup(
    players: &mut BTreeMap<PlayerId, PlayerState>,
    collector: PlayerId,
    kind: PowerupKind,
    now: u64,
    config: &GameConfig,
) -> Vec<PlayerId> {
    match kind {
        PowerupKind::Speed => match players.get_mut(&collector) {
            Some(player) => {
                player.powerups.speed_boost = now + config.boost_duration_ms;
                vec![collector]
            }
            None => Vec::new(),
        },
        PowerupKind::Slow => players
            .values_mut()
            .filter(|p| p.id != collector)
            .map(|p| {
                p.powerups.speed_penalty = now + config.penalty_duration_ms;
                p.id
            })
            .collect(),
    }
}
