//! Move Intents
//!
//! A move intent is one discrete step request `(player, dx, dy)` with each
//! axis in `{-1, 0, 1}`. Intents arrive raw from a driver and are validated
//! here before the simulation touches them.

use serde::{Serialize, Deserialize};

use crate::game::state::PlayerId;
use crate::game::tick::SimError;

/// Validated step direction. Each axis is -1, 0 or 1.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Direction {
    dx: i8,
    dy: i8,
}

impl Direction {
    /// No movement
    pub const NONE: Self = Self { dx: 0, dy: 0 };
    /// Toward y = 0
    pub const UP: Self = Self { dx: 0, dy: -1 };
    /// Away from y = 0
    pub const DOWN: Self = Self { dx: 0, dy: 1 };
    /// Toward x = 0
    pub const LEFT: Self = Self { dx: -1, dy: 0 };
    /// Away from x = 0
    pub const RIGHT: Self = Self { dx: 1, dy: 0 };

    /// Validate a raw step.
    pub fn new(dx: i32, dy: i32) -> Result<Self, SimError> {
        let axis = |v: i32| matches!(v, -1..=1);
        if axis(dx) && axis(dy) {
            Ok(Self { dx: dx as i8, dy: dy as i8 })
        } else {
            Err(SimError::InvalidIntent { dx, dy })
        }
    }

    /// Horizontal step.
    #[inline]
    pub fn dx(self) -> i8 {
        self.dx
    }

    /// Vertical step.
    #[inline]
    pub fn dy(self) -> i8 {
        self.dy
    }

    /// Is this the zero step?
    #[inline]
    pub fn is_none(self) -> bool {
        self == Self::NONE
    }
}

/// Raw move request as received from a driver.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveIntent {
    /// Requested player slot (not yet checked)
    pub player_id: u32,
    /// Horizontal step
    pub dx: i32,
    /// Vertical step
    pub dy: i32,
}

impl MoveIntent {
    /// Create an intent.
    pub const fn new(player_id: u32, dx: i32, dy: i32) -> Self {
        Self { player_id, dx, dy }
    }

    /// Intent for a known player and direction.
    pub fn from_parts(player: PlayerId, direction: Direction) -> Self {
        Self::new(player.get() as u32, direction.dx as i32, direction.dy as i32)
    }

    /// Check both the player id and the step.
    pub fn validate(&self) -> Result<(PlayerId, Direction), SimError> {
        let direction = Direction::new(self.dx, self.dy)?;
        let player = u8::try_from(self.player_id)
            .ok()
            .and_then(PlayerId::new)
            .ok_or(SimError::PlayerNotFound(self.player_id))?;
        Ok((player, direction))
    }
}
