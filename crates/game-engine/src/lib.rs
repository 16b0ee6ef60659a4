//! Session engine for Tile-Crawler
//!
//! One `GameSession` per world: a task loop that owns the world store, the
//! player, narrative memory, and the intelligence core, processes player
//! actions strictly in submission order, and broadcasts delta bundles to
//! subscribers. External collaborators submit actions; nothing outside the
//! loop writes state.

pub mod action;
pub mod combat;
pub mod context_build;
pub mod session;
pub mod view;

pub use action::{PlayerAction, ResponseBundle};
pub use session::{GameSession, SessionError};
pub use view::{DeltaBundle, EnemyView, NpcView, PlayerView, RoomView, StateView};
