//! The per-session task loop
//!
//! One task owns everything: world store, player, narrative memory, quest
//! log, and the intelligence core. Player actions arrive on a command
//! channel and are processed strictly in submission order; completed
//! background work (enrichments, summaries) interleaves between actions.
//! No state is ever mutated from outside this loop.

use crate::action::{PlayerAction, ResponseBundle};
use crate::combat;
use crate::context_build;
use crate::view::{DeltaBundle, PlayerView, RoomView, StateView};
use ai_bridge::{
    Delivery, Fingerprint, Intelligence, LlmClient, NarrativeMemory, RequestContext,
    RequestKind, RequestPayload,
};
use crawler_core::{
    ActionError, ClassKind, Coord, CoreConfig, Direction, EventKind, ItemCatalog, ItemStack,
    NarrativeEvent, Player, Quest, QuestLog, QuestObjective, QuestRewards, QuestStatus,
};
use crawler_save::{load_from_path, save_to_path, SaveFile};
use crawler_world::{MoveOutcome, RoomChange, WorldStore};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde_json::json;
use std::collections::{HashSet, VecDeque};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session is closed")]
    Closed,
}

struct SessionCommand {
    action: PlayerAction,
    reply: oneshot::Sender<ResponseBundle>,
}

/// Handle to a running session. Cheap to clone; all writes happen inside
/// the session task.
#[derive(Clone)]
pub struct GameSession {
    id: Uuid,
    commands: mpsc::Sender<SessionCommand>,
    events: broadcast::Sender<DeltaBundle>,
    metrics: ai_bridge::MetricsSink,
}

impl GameSession {
    /// Spawn a session task. Must be called within a tokio runtime.
    pub fn spawn(
        config: CoreConfig,
        client: Arc<dyn LlmClient>,
        save_dir: impl Into<PathBuf>,
    ) -> anyhow::Result<Self> {
        let id = Uuid::new_v4();
        let (commands_tx, commands_rx) = mpsc::channel(64);
        let (events_tx, _) = broadcast::channel(256);

        let (intelligence, deliveries_rx) = Intelligence::new(config.clone(), client)?;
        let metrics = intelligence.metrics_sink();
        let state = SessionState::new(config, intelligence, save_dir.into(), events_tx.clone());
        tokio::spawn(run_session(state, commands_rx, deliveries_rx));

        info!(session = %id, "session spawned");
        Ok(Self { id, commands: commands_tx, events: events_tx, metrics })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Snapshot of the intelligence pipeline's metrics.
    pub fn metrics(&self) -> ai_bridge::MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Submit one action and await its response bundle. Actions from one
    /// handle resolve strictly in submission order.
    pub async fn submit(&self, action: PlayerAction) -> Result<ResponseBundle, SessionError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(SessionCommand { action, reply })
            .await
            .map_err(|_| SessionError::Closed)?;
        rx.await.map_err(|_| SessionError::Closed)
    }

    /// Subscribe to the outbound delta stream.
    pub fn subscribe(&self) -> broadcast::Receiver<DeltaBundle> {
        self.events.subscribe()
    }
}

async fn run_session(
    mut state: SessionState,
    mut commands_rx: mpsc::Receiver<SessionCommand>,
    mut deliveries_rx: mpsc::UnboundedReceiver<Delivery>,
) {
    loop {
        tokio::select! {
            command = commands_rx.recv() => match command {
                Some(SessionCommand { action, reply }) => {
                    let bundle = state.handle_action(action).await;
                    let _ = reply.send(bundle);
                }
                None => break,
            },
            delivery = deliveries_rx.recv() => {
                if let Some(delivery) = delivery {
                    state.apply_delivery(delivery);
                }
            }
        }
    }
    info!("session loop ended");
}

struct SessionState {
    config: CoreConfig,
    catalog: ItemCatalog,
    world: WorldStore,
    player: Player,
    memory: NarrativeMemory,
    quests: QuestLog,
    intelligence: Intelligence,
    turn: u64,
    rng: StdRng,
    recent_actions: VecDeque<String>,
    player_choices: Vec<String>,
    pinned_room: Option<Fingerprint>,
    save_dir: PathBuf,
    events_tx: broadcast::Sender<DeltaBundle>,
    game_over: bool,
    pending_save: Option<JoinHandle<()>>,
    /// Coordinates with an enrichment outstanding in THIS world. Deliveries
    /// for anything else (stale work from before a reset) are dropped.
    pending_enrichments: HashSet<Coord>,
    /// Room changes applied since the last broadcast.
    changes: Vec<(Coord, RoomChange)>,
    /// Narrative events appended since the last broadcast.
    new_events: Vec<NarrativeEvent>,
}

impl SessionState {
    fn new(
        config: CoreConfig,
        intelligence: Intelligence,
        save_dir: PathBuf,
        events_tx: broadcast::Sender<DeltaBundle>,
    ) -> Self {
        let seed = Uuid::new_v4().to_string();
        let mut state = Self {
            catalog: ItemCatalog::builtin(),
            world: WorldStore::new(&seed),
            player: Player::new("Adventurer", ClassKind::Warrior),
            memory: NarrativeMemory::new(config.memory.clone()),
            quests: QuestLog::default(),
            turn: 0,
            rng: StdRng::seed_from_u64(crawler_world::world_seed_from_text(&seed)),
            recent_actions: VecDeque::new(),
            player_choices: Vec::new(),
            pinned_room: None,
            save_dir,
            events_tx,
            game_over: false,
            pending_save: None,
            pending_enrichments: HashSet::new(),
            changes: Vec::new(),
            new_events: Vec::new(),
            intelligence,
            config,
        };
        state.start_world(None, None);
        state
    }

    /// Reset to a fresh world. Shared by construction and `NewGame`.
    fn start_world(&mut self, player_name: Option<String>, seed: Option<String>) {
        let seed = seed.unwrap_or_else(|| Uuid::new_v4().to_string());
        let name = player_name.unwrap_or_else(|| "Adventurer".to_string());

        self.world = WorldStore::new(&seed);
        self.player = Player::new(name, ClassKind::Warrior);
        self.memory = NarrativeMemory::new(self.config.memory.clone());
        self.quests = QuestLog::default();
        self.turn = 0;
        self.rng = StdRng::seed_from_u64(crawler_world::world_seed_from_text(&format!(
            "{seed}:session"
        )));
        self.recent_actions.clear();
        self.player_choices.clear();
        self.game_over = false;
        self.pending_enrichments.clear();
        self.changes.clear();
        self.new_events.clear();

        // starter kit
        let torch = self.catalog.get("torch").expect("torch defined");
        let _ = self.player.add_item(ItemStack::of(torch, 1), &self.catalog);
        let sword = self.catalog.get("rusty_sword").expect("sword defined");
        let _ = self.player.add_item(ItemStack::of(sword, 1), &self.catalog);

        let origin = Coord::ORIGIN;
        let _ = self.apply_change(origin, RoomChange::MarkVisited);
        self.record_event(
            EventKind::RoomEntered,
            format!("entered the world at {origin}"),
            json!({ "coord": origin }),
        );
        self.repin_and_enrich();
        self.schedule_prefetch();
        info!(seed = %self.world.seed_text(), "new world started");
    }

    async fn handle_action(&mut self, action: PlayerAction) -> ResponseBundle {
        self.turn += 1;
        let label = action.label();

        let bundle = match action {
            PlayerAction::Move { direction } => self.do_move(direction).await,
            PlayerAction::Attack { target_id } => self.do_attack(target_id).await,
            PlayerAction::Flee => self.do_flee().await,
            PlayerAction::Take { item_id } => self.do_take(&item_id).await,
            PlayerAction::Use { item_id, target } => self.do_use(&item_id, target).await,
            PlayerAction::Talk { npc_id, message } => self.do_talk(npc_id, message).await,
            PlayerAction::Rest => self.do_rest().await,
            PlayerAction::SaveGame { slot } => self.do_save(slot).await,
            PlayerAction::LoadGame { slot } => self.do_load(slot).await,
            PlayerAction::NewGame { player_name, seed } => {
                self.start_world(player_name, seed);
                self.ok_bundle("A new journey begins.".to_string(), None, None)
            }
        };

        self.recent_actions.push_back(label);
        while self.recent_actions.len() > self.config.context.recent_actions {
            self.recent_actions.pop_front();
        }
        self.maybe_condense();
        bundle
    }

    // ----- actions ------------------------------------------------------

    async fn do_move(&mut self, direction: Direction) -> ResponseBundle {
        if self.game_over {
            return self.error_bundle(ActionError::Dead);
        }
        match self.world.move_player(direction) {
            Ok(MoveOutcome::Blocked) => self.error_bundle(ActionError::Blocked),
            Ok(MoveOutcome::Moved { to, first_visit }) => {
                self.player.coord = to;
                if first_visit {
                    let _ = self.apply_change(to, RoomChange::MarkVisited);
                }
                self.player.tick_status_effects();

                let (description, biome) = {
                    let room = self.world.room(to).expect("moved into a generated room");
                    (room.description.clone(), room.biome.name())
                };
                self.record_event(
                    EventKind::RoomEntered,
                    format!("entered the {biome} at {to}"),
                    json!({ "coord": to }),
                );
                self.repin_and_enrich();
                self.schedule_prefetch();
                self.ok_bundle(format!("You move {direction}."), Some(description), None)
            }
            Err(e) => {
                // invariant violations are bugs: log, refuse, keep running
                error!(error = %e, "move refused");
                self.error_message_bundle(format!("the world refuses: {e}"))
            }
        }
    }

    async fn do_attack(&mut self, target_id: Option<String>) -> ResponseBundle {
        if self.game_over {
            return self.error_bundle(ActionError::Dead);
        }
        let here = self.world.player_coord();
        let target = {
            let room = self.world.room(here).expect("player room generated");
            let found = match &target_id {
                Some(id) => room.enemies.iter().find(|e| &e.id == id && !e.is_dead()),
                None => room.enemies.iter().find(|e| !e.is_dead()),
            };
            match found {
                Some(enemy) => enemy.clone(),
                None => {
                    return match target_id {
                        Some(id) => self.error_bundle(ActionError::InvalidTarget(id)),
                        None => self.error_bundle(ActionError::NothingHere("attack".into())),
                    };
                }
            }
        };

        let outcome = combat::player_attack(&self.player, &self.catalog, &target, &mut self.rng);
        let _ = self.apply_change(
            here,
            RoomChange::DamageEnemy { enemy_id: target.id.clone(), amount: outcome.damage },
        );

        let mut message = format!("You hit {} for {} damage.", target.name, outcome.damage);
        if outcome.killed {
            let _ = self.apply_change(here, RoomChange::RemoveEnemy { enemy_id: target.id.clone() });
            self.player.gold += target.gold_reward;
            let levels = self.player.gain_xp(target.xp_reward);
            self.world.set_player_level(self.player.level);
            message.push_str(&format!(" {} is slain.", target.name));
            if levels > 0 {
                message.push_str(&format!(" You reach level {}.", self.player.level));
            }
        }

        // survivors strike back
        let counterattackers: Vec<_> = {
            let room = self.world.room(here).expect("player room generated");
            room.enemies
                .iter()
                .filter(|e| !e.is_dead() && e.ai != crawler_core::AiType::Skittish)
                .cloned()
                .collect()
        };
        let mut taken = 0;
        for enemy in &counterattackers {
            taken += combat::enemy_attack(enemy, &self.player, &self.catalog, &mut self.rng);
        }
        if taken > 0 {
            self.player.take_damage(taken);
            message.push_str(&format!(" You take {taken} damage in return."));
        }

        let cleared = {
            let room = self.world.room(here).expect("player room generated");
            !room.has_hostiles() && !room.cleared
        };
        if cleared {
            let _ = self.apply_change(here, RoomChange::SetCleared);
        }

        let biome = self.world.room(here).expect("player room generated").biome.name();
        let narration_ctx = self.request_context(
            RequestKind::CombatNarration,
            context_build::combat_narration(
                &self.player.name,
                &target.name,
                "attack",
                outcome.damage,
                outcome.crit,
                outcome.killed,
                biome,
            ),
        );
        let narration = self.intelligence.request(narration_ctx).await;
        let narrative = match narration.response.as_combat() {
            Some(combat) => {
                let mut text = combat.narrative.clone();
                if let Some(flavor) = &combat.crit_flavor {
                    if outcome.crit {
                        text.push(' ');
                        text.push_str(flavor);
                    }
                }
                text
            }
            None => message.clone(),
        };

        self.record_event(
            EventKind::CombatResolved,
            format!(
                "fought {} ({} damage{})",
                target.name,
                outcome.damage,
                if outcome.killed { ", slain" } else { "" }
            ),
            json!({ "enemy_id": target.id, "damage": outcome.damage, "killed": outcome.killed }),
        );

        if self.player.is_dead() {
            self.game_over = true;
            self.record_event(EventKind::Death, "died in battle".to_string(), json!({}));
            return self.ok_bundle("You have died.".to_string(), Some(narrative), None);
        }
        self.ok_bundle(message, Some(narrative), None)
    }

    async fn do_flee(&mut self) -> ResponseBundle {
        if self.game_over {
            return self.error_bundle(ActionError::Dead);
        }
        let here = self.world.player_coord();
        let (has_hostiles, first_exit) = {
            let room = self.world.room(here).expect("player room generated");
            (room.has_hostiles(), room.exits.iter().next())
        };
        if !has_hostiles {
            return self.error_bundle(ActionError::NothingHere("flee from".into()));
        }
        let Some(exit) = first_exit else {
            return self.error_bundle(ActionError::Blocked);
        };

        if combat::flee_succeeds(&self.player, &mut self.rng) {
            self.record_event(
                EventKind::CombatResolved,
                "fled from battle".to_string(),
                json!({ "coord": here }),
            );
            return self.do_move(exit).await;
        }

        let attackers: Vec<_> = {
            let room = self.world.room(here).expect("player room generated");
            room.enemies.iter().filter(|e| !e.is_dead()).cloned().collect()
        };
        let mut taken = 0;
        for enemy in &attackers {
            taken += combat::enemy_attack(enemy, &self.player, &self.catalog, &mut self.rng);
        }
        self.player.take_damage(taken);
        self.record_event(
            EventKind::CombatResolved,
            format!("failed to flee ({taken} damage)"),
            json!({ "damage": taken }),
        );
        if self.player.is_dead() {
            self.game_over = true;
            self.record_event(EventKind::Death, "cut down while fleeing".to_string(), json!({}));
            return self.ok_bundle("You have died.".to_string(), None, None);
        }
        self.ok_bundle(format!("You fail to break away and take {taken} damage."), None, None)
    }

    async fn do_take(&mut self, item_id: &str) -> ResponseBundle {
        if self.game_over {
            return self.error_bundle(ActionError::Dead);
        }
        let here = self.world.player_coord();
        let stack = {
            let room = self.world.room(here).expect("player room generated");
            match room.items.iter().find(|s| s.def_id == item_id) {
                Some(stack) => stack.clone(),
                None => return self.error_bundle(ActionError::NothingHere(format!("take {item_id}"))),
            }
        };
        if let Err(e) = self.player.add_item(stack.clone(), &self.catalog) {
            return self.error_bundle(e);
        }
        let _ = self.apply_change(here, RoomChange::RemoveItem { def_id: item_id.to_string() });
        self.record_event(
            EventKind::ItemAcquired,
            format!("picked up {item_id}"),
            json!({ "item": item_id, "quantity": stack.quantity }),
        );
        self.ok_bundle(format!("You take the {item_id}."), None, None)
    }

    async fn do_use(&mut self, item_id: &str, _target: Option<String>) -> ResponseBundle {
        if self.game_over {
            return self.error_bundle(ActionError::Dead);
        }
        let Some(def) = self.catalog.get(item_id).cloned() else {
            return self.error_bundle(ActionError::InvalidTarget(item_id.to_string()));
        };
        use crawler_core::ItemCategory;
        match def.category {
            ItemCategory::Consumable => {
                if let Err(e) = self.player.remove_item(item_id, 1) {
                    return self.error_bundle(e);
                }
                self.player.heal(def.effects.heal_hp);
                self.player.derived.mp =
                    (self.player.derived.mp + def.effects.restore_mp).min(self.player.derived.max_mp);
                self.record_event(
                    EventKind::ItemAcquired,
                    format!("used {item_id}"),
                    json!({ "item": item_id, "consumed": true }),
                );
                self.ok_bundle(format!("You use the {}.", def.name), None, None)
            }
            ItemCategory::Weapon | ItemCategory::Armor => {
                if let Err(e) = self.player.equip(item_id, &self.catalog) {
                    return self.error_bundle(e);
                }
                self.record_event(
                    EventKind::ItemAcquired,
                    format!("equipped {item_id}"),
                    json!({ "item": item_id, "equipped": true }),
                );
                self.ok_bundle(format!("You equip the {}.", def.name), None, None)
            }
            _ => self.error_bundle(ActionError::InvalidTarget(format!(
                "{} cannot be used like that",
                def.name
            ))),
        }
    }

    async fn do_talk(&mut self, npc_id: Option<String>, message: Option<String>) -> ResponseBundle {
        if self.game_over {
            return self.error_bundle(ActionError::Dead);
        }
        let here = self.world.player_coord();
        let npc = {
            let room = self.world.room(here).expect("player room generated");
            let found = match &npc_id {
                Some(id) => room.npcs.iter().find(|n| &n.id == id),
                None => room.npcs.first(),
            };
            match found {
                Some(npc) => npc.clone(),
                None => {
                    return match npc_id {
                        Some(id) => self.error_bundle(ActionError::InvalidTarget(id)),
                        None => self.error_bundle(ActionError::NothingHere("talk to".into())),
                    };
                }
            }
        };
        let message = message.unwrap_or_else(|| "hello".to_string());

        let mut ctx = self.request_context(
            RequestKind::NpcDialogue,
            context_build::npc_dialogue(&npc, &self.player, &message),
        );
        ctx.facts = context_build::dialogue_facts(&npc, &self.quests);
        let result = self.intelligence.request(ctx).await;
        let Some(dialogue) = result.response.as_dialogue().cloned() else {
            warn!("dialogue request returned a non-dialogue response");
            return self.error_message_bundle("the conversation trails off".to_string());
        };

        let event = self.record_event(
            EventKind::NpcInteraction,
            format!("spoke with {}", npc.name),
            json!({ "npc_id": npc.id, "message": message }),
        );

        if let Some(note) = &dialogue.memory_update {
            let _ = self.apply_change(
                here,
                RoomChange::RecordNpcMemory {
                    npc_id: npc.id.clone(),
                    entry: crawler_core::NpcMemoryEntry {
                        turn: self.turn,
                        event_id: event.id,
                        note: note.clone(),
                    },
                },
            );
        }

        use ai_bridge::Emotion;
        let delta = match dialogue.emotion {
            Emotion::Friendly | Emotion::Amused => 2,
            Emotion::Hostile => -2,
            Emotion::Afraid => -1,
            _ => 0,
        };
        if delta != 0 {
            let mut personality = npc.personality.clone();
            personality.adjust_relationship(delta);
            let _ = self.apply_change(
                here,
                RoomChange::UpdateNpcPersonality { npc_id: npc.id.clone(), personality },
            );
        }

        if let Some(template_id) = &dialogue.quest_trigger {
            if !self.quests.quests.iter().any(|q| &q.template_id == template_id) {
                self.accept_quest(template_id.clone(), &npc.id, &npc.archetype).await;
            }
        }

        self.player_choices.push(format!("said {message:?} to {}", npc.name));
        self.ok_bundle(
            format!("{} responds.", npc.name),
            None,
            Some(dialogue.dialogue.clone()),
        )
    }

    /// Generate and log a quest from a dialogue trigger.
    async fn accept_quest(&mut self, template_id: String, giver_id: &str, archetype: &str) {
        let here = self.world.player_coord();
        let payload = {
            let room = self.world.room(here).expect("player room generated");
            context_build::quest_generation(room, archetype)
        };
        let ctx = self.request_context(RequestKind::QuestGeneration, payload);
        let result = self.intelligence.request(ctx).await;
        let Some(quest) = result.response.as_quest() else { return };

        self.quests.add(Quest {
            template_id: template_id.clone(),
            title: quest.title.clone(),
            description: quest.description.clone(),
            objectives: quest
                .objectives
                .iter()
                .map(|text| QuestObjective { text: text.clone(), done: false })
                .collect(),
            rewards: QuestRewards {
                gold: quest.rewards.gold,
                xp: quest.rewards.xp,
                items: quest.rewards.items.clone(),
            },
            status: QuestStatus::Active,
            giver: Some(giver_id.to_string()),
        });
        self.record_event(
            EventKind::QuestUpdated,
            format!("accepted quest: {}", quest.title),
            json!({ "template": template_id, "giver": giver_id }),
        );
    }

    async fn do_rest(&mut self) -> ResponseBundle {
        if self.game_over {
            return self.error_bundle(ActionError::Dead);
        }
        let here = self.world.player_coord();
        let (hostiles, campfire) = {
            let room = self.world.room(here).expect("player room generated");
            (room.has_hostiles(), room.features.campfire)
        };
        if hostiles {
            return self.error_bundle(ActionError::InsufficientResources(
                "safety to rest here".to_string(),
            ));
        }

        let message = if campfire {
            self.player.derived.hp = self.player.derived.max_hp;
            self.player.derived.mp = self.player.derived.max_mp;
            "You rest by the campfire and recover fully.".to_string()
        } else {
            let heal = self.player.derived.max_hp / 4;
            self.player.heal(heal);
            format!("You rest uneasily and recover {heal} HP.")
        };
        self.player.tick_status_effects();
        self.record_event(
            EventKind::Discovery,
            "rested and recovered".to_string(),
            json!({ "campfire": campfire }),
        );
        self.ok_bundle(message, None, None)
    }

    async fn do_save(&mut self, slot: u32) -> ResponseBundle {
        if let Some(pending) = self.pending_save.take() {
            let _ = pending.await;
        }
        let save = SaveFile::new(
            self.world.snapshot(),
            self.player.clone(),
            self.memory.to_record(),
            self.player_choices.clone(),
            self.quests.clone(),
        );
        let path = self.save_dir.join(format!("slot{slot}.sav"));
        self.pending_save = Some(tokio::task::spawn_blocking(move || {
            if let Err(e) = save_to_path(&path, &save) {
                error!(error = %e, "save failed");
            }
        }));
        self.ok_bundle(format!("Game saved to slot {slot}."), None, None)
    }

    async fn do_load(&mut self, slot: u32) -> ResponseBundle {
        if let Some(pending) = self.pending_save.take() {
            let _ = pending.await;
        }
        let path = self.save_dir.join(format!("slot{slot}.sav"));
        let save = match tokio::task::spawn_blocking(move || load_from_path(&path)).await {
            Ok(Ok(save)) => save,
            Ok(Err(e)) => {
                warn!(error = %e, "load refused");
                return self.error_message_bundle(format!("load refused: {e}"));
            }
            Err(e) => {
                error!(error = %e, "load task failed");
                return self.error_message_bundle("load failed".to_string());
            }
        };

        self.world = WorldStore::restore(save.world);
        self.player = save.player;
        self.memory = NarrativeMemory::from_record(save.narrative, self.config.memory.clone());
        self.quests = save.quests;
        self.player_choices = save.player_choices;
        self.world.set_player_level(self.player.level);
        self.game_over = self.player.is_dead();
        self.pending_enrichments.clear();
        self.turn = self.memory.short_term().map(|e| e.turn).max().unwrap_or(0);
        self.rng = StdRng::seed_from_u64(crawler_world::world_seed_from_text(&format!(
            "{}:session:{}",
            self.world.seed_text(),
            self.turn
        )));

        // emergency saves carry no rooms; regenerate under the player
        self.world.get_or_generate_room(self.world.player_coord());
        self.player.coord = self.world.player_coord();

        self.repin_and_enrich();
        self.schedule_prefetch();
        self.ok_bundle(format!("Game loaded from slot {slot}."), None, None)
    }

    // ----- plumbing -----------------------------------------------------

    fn apply_change(&mut self, coord: Coord, change: RoomChange) -> Result<bool, crawler_world::WorldError> {
        match self.world.apply_room_change(coord, change.clone()) {
            Ok(true) => {
                self.changes.push((coord, change));
                Ok(true)
            }
            Ok(false) => Ok(false),
            Err(e) => {
                warn!(error = %e, %coord, "room change refused");
                Err(e)
            }
        }
    }

    fn record_event(
        &mut self,
        kind: EventKind,
        summary: String,
        payload: serde_json::Value,
    ) -> NarrativeEvent {
        let event = self.memory.append(self.turn, kind, summary, payload);
        self.new_events.push(event.clone());
        event
    }

    /// Launch a condensation when the window has filled.
    fn maybe_condense(&mut self) {
        if let Some((events, upto)) = self.memory.begin_condensation() {
            let lines = events.iter().map(|e| e.one_line()).collect();
            self.intelligence.spawn_background(RequestContext::bare(
                RequestKind::Summarization,
                RequestPayload::Summarization { events: lines, upto_event_id: upto },
            ));
        }
    }

    /// Pin the current room's description fingerprint and kick enrichment
    /// if the room still shows its procedural placeholder.
    fn repin_and_enrich(&mut self) {
        let here = self.world.player_coord();
        let (enriched, ctx) = {
            let room = self.world.room(here).expect("player room generated");
            (
                room.enriched,
                RequestContext::bare(
                    RequestKind::Enrichment,
                    context_build::room_description(RequestKind::Enrichment, room),
                ),
            )
        };
        if let Some(old) = self.pinned_room.take() {
            self.intelligence.unpin(&old);
        }
        self.pinned_room = Some(self.intelligence.pin(&ctx));
        if !enriched {
            self.pending_enrichments.insert(here);
            self.intelligence.spawn_background(ctx);
        }
    }

    /// Generate prefetch targets and hand them to the scheduler.
    fn schedule_prefetch(&mut self) {
        let here = self.world.player_coord();
        let exits = match self.world.room(here) {
            Some(room) => room.exits,
            None => return,
        };
        for dir in exits.iter() {
            let neighbor = here.neighbor(dir);
            if self.world.room(neighbor).is_none() {
                self.world.get_or_generate_room(neighbor);
            }
        }
        let contexts = context_build::prefetch_candidates(&self.world);
        for ctx in &contexts {
            if let RequestPayload::RoomDescription { coord, .. } = &ctx.payload {
                self.pending_enrichments.insert(*coord);
            }
        }
        self.intelligence.schedule_prefetch(contexts);
    }

    fn apply_delivery(&mut self, delivery: Delivery) {
        match delivery {
            Delivery::Enrichment { coord, room } => {
                if !self.pending_enrichments.remove(&coord) || self.world.room(coord).is_none() {
                    return;
                }
                let audio = room.audio_hint.clone();
                let _ = self.apply_change(
                    coord,
                    RoomChange::SetDescription { text: room.description },
                );
                self.broadcast(audio);
            }
            Delivery::Summary { upto_event_id, text } => {
                self.memory.apply_condensation(upto_event_id, &text);
            }
        }
    }

    fn request_context(&self, kind: RequestKind, payload: RequestPayload) -> RequestContext {
        RequestContext {
            kind,
            payload,
            recent_actions: self.recent_actions.iter().cloned().collect(),
            short_term: self.memory.short_term_lines(),
            summary: self.memory.summary().to_string(),
            facts: Vec::new(),
            turn: self.turn,
        }
    }

    fn state_view(&self) -> StateView {
        StateView {
            turn: self.turn,
            player: PlayerView::of(&self.player),
            room: RoomView::of(self.world.current_room()),
        }
    }

    fn broadcast(&mut self, audio_hint: Option<String>) {
        let delta = DeltaBundle {
            state: self.state_view(),
            room_changes: std::mem::take(&mut self.changes),
            narrative: std::mem::take(&mut self.new_events),
            audio_hint,
        };
        let _ = self.events_tx.send(delta);
    }

    fn ok_bundle(
        &mut self,
        message: String,
        narrative: Option<String>,
        dialogue: Option<String>,
    ) -> ResponseBundle {
        let narrative = narrative.unwrap_or_default();
        let bundle = ResponseBundle {
            success: true,
            message,
            narrative,
            updated_state: self.state_view(),
            audio_hint: None,
            dialogue,
        };
        self.broadcast(None);
        bundle
    }

    fn error_bundle(&mut self, error: ActionError) -> ResponseBundle {
        self.error_message_bundle(error.player_message())
    }

    fn error_message_bundle(&mut self, message: String) -> ResponseBundle {
        ResponseBundle {
            success: false,
            message,
            narrative: String::new(),
            updated_state: self.state_view(),
            audio_hint: None,
            dialogue: None,
        }
    }
}
