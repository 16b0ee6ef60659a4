//! Inbound player actions and the response bundle
//!
//! The action union is the whole inbound surface of the core. Every action
//! resolves to a `ResponseBundle`, whatever happened; errors the player can
//! recover from come back as `success=false` with a message.

use crate::view::StateView;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PlayerAction {
    Move { direction: crawler_core::Direction },
    Attack { target_id: Option<String> },
    Flee,
    Take { item_id: String },
    Use { item_id: String, target: Option<String> },
    Talk { npc_id: Option<String>, message: Option<String> },
    Rest,
    SaveGame { slot: u32 },
    LoadGame { slot: u32 },
    NewGame { player_name: Option<String>, seed: Option<String> },
}

impl PlayerAction {
    /// Short label recorded into the recent-actions context window.
    pub fn label(&self) -> String {
        match self {
            PlayerAction::Move { direction } => format!("moved {direction}"),
            PlayerAction::Attack { .. } => "attacked".to_string(),
            PlayerAction::Flee => "fled".to_string(),
            PlayerAction::Take { item_id } => format!("took {item_id}"),
            PlayerAction::Use { item_id, .. } => format!("used {item_id}"),
            PlayerAction::Talk { .. } => "talked".to_string(),
            PlayerAction::Rest => "rested".to_string(),
            PlayerAction::SaveGame { .. } => "saved".to_string(),
            PlayerAction::LoadGame { .. } => "loaded".to_string(),
            PlayerAction::NewGame { .. } => "started anew".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseBundle {
    pub success: bool,
    pub message: String,
    pub narrative: String,
    pub updated_state: StateView,
    pub audio_hint: Option<String>,
    pub dialogue: Option<String>,
}
