//! Typed response schemas - the only shapes that leave the validator
//!
//! Each kind is a closed struct: unknown fields from the model are
//! discarded at parse time, optional fields default, missing required
//! fields fail validation. Nothing downstream ever touches raw model text.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Closed vocabulary for a room's mood.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Atmosphere {
    Serene,
    Gloomy,
    Menacing,
    Ancient,
    Haunted,
    Vibrant,
    Desolate,
    Sacred,
}

impl Atmosphere {
    pub const ALL: [Atmosphere; 8] = [
        Atmosphere::Serene,
        Atmosphere::Gloomy,
        Atmosphere::Menacing,
        Atmosphere::Ancient,
        Atmosphere::Haunted,
        Atmosphere::Vibrant,
        Atmosphere::Desolate,
        Atmosphere::Sacred,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Atmosphere::Serene => "serene",
            Atmosphere::Gloomy => "gloomy",
            Atmosphere::Menacing => "menacing",
            Atmosphere::Ancient => "ancient",
            Atmosphere::Haunted => "haunted",
            Atmosphere::Vibrant => "vibrant",
            Atmosphere::Desolate => "desolate",
            Atmosphere::Sacred => "sacred",
        }
    }
}

impl fmt::Display for Atmosphere {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomDescriptionOut {
    pub description: String,
    pub atmosphere: Atmosphere,
    #[serde(default)]
    pub points_of_interest: Vec<String>,
    #[serde(default)]
    pub audio_hint: Option<String>,
    /// Models sometimes volunteer a tile grid. It is validated (rectangular,
    /// legend glyphs only) and then ignored; enrichment never touches tiles.
    #[serde(default)]
    pub tile_grid: Option<Vec<Vec<u32>>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Emotion {
    Neutral,
    Friendly,
    Wary,
    Hostile,
    Afraid,
    Amused,
    Solemn,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeOffer {
    pub item: String,
    pub price: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NpcDialogueOut {
    pub dialogue: String,
    pub emotion: Emotion,
    #[serde(default)]
    pub offers: Vec<TradeOffer>,
    #[serde(default)]
    pub reveals: Vec<String>,
    /// Must name a known quest template or stay null.
    #[serde(default)]
    pub quest_trigger: Option<String>,
    /// One line the NPC will remember about this exchange.
    #[serde(default)]
    pub memory_update: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombatNarrationOut {
    pub narrative: String,
    #[serde(default)]
    pub crit_flavor: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QuestRewardsOut {
    #[serde(default)]
    pub gold: u64,
    #[serde(default)]
    pub xp: u64,
    #[serde(default)]
    pub items: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestOut {
    pub title: String,
    pub description: String,
    pub objectives: Vec<String>,
    #[serde(default)]
    pub rewards: QuestRewardsOut,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryOut {
    pub summary: String,
}

/// Whatever came back, now trusted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ValidatedResponse {
    Room(RoomDescriptionOut),
    Dialogue(NpcDialogueOut),
    Combat(CombatNarrationOut),
    Quest(QuestOut),
    Summary(SummaryOut),
}

impl ValidatedResponse {
    pub fn as_room(&self) -> Option<&RoomDescriptionOut> {
        match self {
            ValidatedResponse::Room(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_dialogue(&self) -> Option<&NpcDialogueOut> {
        match self {
            ValidatedResponse::Dialogue(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_combat(&self) -> Option<&CombatNarrationOut> {
        match self {
            ValidatedResponse::Combat(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_quest(&self) -> Option<&QuestOut> {
        match self {
            ValidatedResponse::Quest(q) => Some(q),
            _ => None,
        }
    }

    pub fn as_summary(&self) -> Option<&SummaryOut> {
        match self {
            ValidatedResponse::Summary(s) => Some(s),
            _ => None,
        }
    }
}
