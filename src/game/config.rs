//! Game Configuration
//!
//! Every tunable of a game, passed explicitly into `GameState::new_game`.
//! Nothing in the simulation reads process-wide state.

use serde::{Serialize, Deserialize};
use thiserror::Error;

/// Configuration for one game.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    /// Edge length of the square canvas
    pub canvas_size: f64,
    /// Edge length of a player square
    pub player_size: f64,
    /// Edge length of the shared object
    pub object_size: f64,
    /// Edge length of a powerup
    pub powerup_size: f64,
    /// Number of obstacles placed per game
    pub obstacle_count: usize,
    /// Number of powerups placed per game (split evenly by type)
    pub powerup_count: usize,
    /// Countdown length in seconds
    pub duration_secs: u32,
    /// Base movement per accepted intent
    pub base_speed: f64,
    /// Added to base speed while boosted
    pub speed_boost: f64,
    /// Speed while penalized (overrides, not added)
    pub penalty_speed: f64,
    /// Boost lifetime after pickup (ms)
    pub boost_duration_ms: u64,
    /// Penalty lifetime after an opponent's pickup (ms)
    pub penalty_duration_ms: u64,
    /// Minimum distance between any two powerups
    pub powerup_spacing: f64,
    /// Candidate positions tried per placed item before giving up
    pub max_layout_attempts: u32,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            canvas_size: 800.0,
            player_size: 30.0,
            object_size: 20.0,
            powerup_size: 30.0,
            obstacle_count: 18,
            powerup_count: 4,
            duration_secs: 60,
            base_speed: 10.0,
            speed_boost: 5.0,
            penalty_speed: 3.0,
            boost_duration_ms: 8_000,
            penalty_duration_ms: 10_000,
            powerup_spacing: 150.0,
            max_layout_attempts: 100_000,
        }
    }
}

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// A size is not a positive finite number.
    #[error("{field} must be positive, got {value}")]
    NonPositive {
        /// Offending field
        field: &'static str,
        /// Offending value
        value: f64,
    },

    /// Entities do not fit on the canvas.
    #[error("canvas of {canvas} cannot hold {what}")]
    CanvasTooSmall {
        /// Canvas edge length
        canvas: f64,
        /// What did not fit
        what: &'static str,
    },

    /// Powerups need at least one obstacle to anchor their sampling.
    #[error("powerups require at least one obstacle")]
    PowerupsWithoutObstacles,

    /// Rejection sampling needs a non-zero bound.
    #[error("max_layout_attempts must be non-zero")]
    ZeroAttempts,

    /// A game must last at least one second.
    #[error("duration_secs must be non-zero")]
    ZeroDuration,
}

impl GameConfig {
    /// Check the configuration is internally consistent.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let sizes = [
            ("canvas_size", self.canvas_size),
            ("player_size", self.player_size),
            ("object_size", self.object_size),
            ("powerup_size", self.powerup_size),
            ("base_speed", self.base_speed),
            ("penalty_speed", self.penalty_speed),
        ];
        for (field, value) in sizes {
            if !(value.is_finite() && value > 0.0) {
                return Err(ConfigError::NonPositive { field, value });
            }
        }
        if !(self.speed_boost.is_finite() && self.speed_boost >= 0.0) {
            return Err(ConfigError::NonPositive { field: "speed_boost", value: self.speed_boost });
        }

        // Obstacles are sampled in [0, canvas - 4 * player)
        if self.canvas_size <= self.player_size * 4.0 {
            return Err(ConfigError::CanvasTooSmall {
                canvas: self.canvas_size,
                what: "the obstacle sampling band",
            });
        }
        if self.canvas_size <= self.object_size {
            return Err(ConfigError::CanvasTooSmall {
                canvas: self.canvas_size,
                what: "the shared object",
            });
        }
        if self.powerup_count > 0 && self.obstacle_count == 0 {
            return Err(ConfigError::PowerupsWithoutObstacles);
        }
        if self.max_layout_attempts == 0 {
            return Err(ConfigError::ZeroAttempts);
        }
        if self.duration_secs == 0 {
            return Err(ConfigError::ZeroDuration);
        }
        Ok(())
    }

    /// Edge length of an obstacle.
    #[inline]
    pub fn obstacle_size(&self) -> f64 {
        self.player_size * 2.0
    }

    /// Largest valid coordinate for a player's top-left corner.
    #[inline]
    pub fn max_player_coord(&self) -> f64 {
        self.canvas_size - self.player_size
    }

    /// Shared object start: centred on the canvas.
    #[inline]
    pub fn object_start(&self) -> (f64, f64) {
        let c = self.canvas_size / 2.0 - self.object_size / 2.0;
        (c, c)
    }

    /// Apply overrides from `STAR_RUSH_*` environment variables.
    ///
    /// Unparseable values are ignored.
    pub fn with_env_overrides(mut self) -> Self {
        fn var<T: std::str::FromStr>(name: &str) -> Option<T> {
            std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
        }

        if let Some(v) = var("STAR_RUSH_DURATION") {
            self.duration_secs = v;
        }
        if let Some(v) = var("STAR_RUSH_OBSTACLES") {
            self.obstacle_count = v;
        }
        if let Some(v) = var("STAR_RUSH_POWERUPS") {
            self.powerup_count = v;
        }
        if let Some(v) = var("STAR_RUSH_CANVAS") {
            self.canvas_size = v;
        }
        if let Some(v) = var("STAR_RUSH_MAX_ATTEMPTS") {
            self.max_layout_attempts = v;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = GameConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.obstacle_size(), 60.0);
        assert_eq!(config.max_player_coord(), 770.0);
        assert_eq!(config.object_start(), (390.0, 390.0));
    }

    #[test]
    fn test_rejects_tiny_canvas() {
        let config = GameConfig { canvas_size: 100.0, ..Default::default() };
        assert!(matches!(config.validate(), Err(ConfigError::CanvasTooSmall { .. })));
    }

    #[test]
    fn test_rejects_non_positive_sizes() {
        let config = GameConfig { player_size: 0.0, ..Default::default() };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::NonPositive { field: "player_size", .. })
        ));

        let config = GameConfig { base_speed: f64::NAN, ..Default::default() };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_powerups_without_obstacles() {
        let config = GameConfig { obstacle_count: 0, ..Default::default() };
        assert_eq!(config.validate(), Err(ConfigError::PowerupsWithoutObstacles));

        let config = GameConfig { obstacle_count: 0, powerup_count: 0, ..Default::default() };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_zero_duration() {
        let config = GameConfig { duration_secs: 0, ..Default::default() };
        assert_eq!(config.validate(), Err(ConfigError::ZeroDuration));
        assert!(GameConfig { duration_secs: 1, ..Default::default() }.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: GameConfig = serde_json::from_str(r#"{"duration_secs": 30}"#).unwrap();
        assert_eq!(config.duration_secs, 30);
        assert_eq!(config.obstacle_count, 18);
    }
}
