//! Quest model and the known template registry
//!
//! Generated quests must reference one of the known template ids; the
//! validator rejects dialogue that triggers anything else.

use serde::{Deserialize, Serialize};

/// Template ids the dialogue validator accepts in `quest_trigger`.
pub const QUEST_TEMPLATES: &[&str] = &[
    "lost_relic",
    "cull_the_dens",
    "carry_word",
    "shrine_offering",
    "missing_villager",
    "depth_survey",
];

pub fn is_known_template(id: &str) -> bool {
    QUEST_TEMPLATES.contains(&id)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QuestStatus {
    Active,
    Completed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestObjective {
    pub text: String,
    pub done: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QuestRewards {
    pub gold: u64,
    pub xp: u64,
    pub items: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quest {
    pub template_id: String,
    pub title: String,
    pub description: String,
    pub objectives: Vec<QuestObjective>,
    pub rewards: QuestRewards,
    pub status: QuestStatus,
    /// NPC that handed the quest out, when one did.
    pub giver: Option<String>,
}

impl Quest {
    pub fn is_complete(&self) -> bool {
        !self.objectives.is_empty() && self.objectives.iter().all(|o| o.done)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QuestLog {
    pub quests: Vec<Quest>,
}

impl QuestLog {
    pub fn active(&self) -> impl Iterator<Item = &Quest> {
        self.quests.iter().filter(|q| q.status == QuestStatus::Active)
    }

    pub fn add(&mut self, quest: Quest) {
        self.quests.push(quest);
    }

    /// Mark an objective done; completes the quest when all are.
    /// Returns true when the quest transitioned to Completed.
    pub fn complete_objective(&mut self, template_id: &str, objective_idx: usize) -> bool {
        let Some(quest) = self
            .quests
            .iter_mut()
            .find(|q| q.template_id == template_id && q.status == QuestStatus::Active)
        else {
            return false;
        };
        if let Some(obj) = quest.objectives.get_mut(objective_idx) {
            obj.done = true;
        }
        if quest.is_complete() {
            quest.status = QuestStatus::Completed;
            return true;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_templates() {
        assert!(is_known_template("lost_relic"));
        assert!(!is_known_template("totally_made_up"));
    }

    #[test]
    fn test_completing_last_objective_completes_quest() {
        let mut log = QuestLog::default();
        log.add(Quest {
            template_id: "carry_word".into(),
            title: "Carry Word South".into(),
            description: "Bring the hermit's letter to the shrine.".into(),
            objectives: vec![
                QuestObjective { text: "Take the letter".into(), done: true },
                QuestObjective { text: "Reach the shrine".into(), done: false },
            ],
            rewards: QuestRewards { gold: 30, xp: 50, items: vec![] },
            status: QuestStatus::Active,
            giver: Some("npc-0-0-0-0".into()),
        });
        assert!(!log.complete_objective("carry_word", 5));
        assert!(log.complete_objective("carry_word", 1));
        assert_eq!(log.quests[0].status, QuestStatus::Completed);
    }
}
