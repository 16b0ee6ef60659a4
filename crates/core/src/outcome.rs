//! Typed outcomes for the core's public operations
//!
//! Nothing unwinds across the task loop. A failed operation is either a
//! player-visible recoverable error (returned as `success=false` with a
//! message), absorbed by fallback content, or one of the fatal states that
//! halt the world.

use thiserror::Error;

/// Player-visible, recoverable. No state change occurred.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ActionError {
    #[error("the way is blocked")]
    Blocked,
    #[error("not enough: {0}")]
    InsufficientResources(String),
    #[error("invalid target: {0}")]
    InvalidTarget(String),
    #[error("inventory is full")]
    InventoryFull,
    #[error("there is nothing here to {0}")]
    NothingHere(String),
    #[error("you are dead")]
    Dead,
}

impl ActionError {
    /// The line the player reads.
    pub fn player_message(&self) -> String {
        self.to_string()
    }
}

/// Fatal. The world halts; no further mutation is accepted.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FatalError {
    #[error("save file corrupt: {0}")]
    SaveCorrupt(String),
    #[error("legend mismatch: glyph {glyph:#06x} not in legend")]
    LegendMismatch { glyph: u32 },
    #[error("world invariant violated: {0}")]
    InvariantViolation(String),
}
