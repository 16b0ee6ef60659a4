//! The player sheet: stats, equipment, inventory, progression

use crate::coord::{Coord, Direction};
use crate::item::{ItemCatalog, ItemCategory, ItemStack};
use crate::outcome::ActionError;
use serde::{Deserialize, Serialize};

pub const INVENTORY_SLOTS: usize = 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClassKind {
    Warrior,
    Rogue,
    Mage,
    Cleric,
}

impl ClassKind {
    pub fn name(self) -> &'static str {
        match self {
            ClassKind::Warrior => "Warrior",
            ClassKind::Rogue => "Rogue",
            ClassKind::Mage => "Mage",
            ClassKind::Cleric => "Cleric",
        }
    }

    fn base_stats(self) -> PrimaryStats {
        match self {
            ClassKind::Warrior => PrimaryStats { strength: 15, dexterity: 10, constitution: 14, intelligence: 8, wisdom: 9, charisma: 10 },
            ClassKind::Rogue => PrimaryStats { strength: 10, dexterity: 15, constitution: 11, intelligence: 11, wisdom: 10, charisma: 12 },
            ClassKind::Mage => PrimaryStats { strength: 8, dexterity: 11, constitution: 10, intelligence: 15, wisdom: 12, charisma: 10 },
            ClassKind::Cleric => PrimaryStats { strength: 11, dexterity: 9, constitution: 12, intelligence: 10, wisdom: 15, charisma: 12 },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrimaryStats {
    pub strength: u32,
    pub dexterity: u32,
    pub constitution: u32,
    pub intelligence: u32,
    pub wisdom: u32,
    pub charisma: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DerivedStats {
    pub hp: i32,
    pub max_hp: i32,
    pub mp: i32,
    pub max_mp: i32,
    pub attack: i32,
    pub defense: i32,
    pub crit_chance: f32,
    pub crit_multiplier: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatusKind {
    Poisoned,
    Blessed,
    Weakened,
    Shielded,
    Burning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusEffect {
    pub kind: StatusKind,
    pub remaining_turns: u32,
    pub magnitude: i32,
}

/// Equipped gear. Unequipped gear lives in the inventory.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Equipment {
    pub weapon: Option<ItemStack>,
    pub armor: Option<ItemStack>,
    pub trinket: Option<ItemStack>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Player {
    pub name: String,
    pub class: ClassKind,
    pub level: u32,
    pub xp: u64,
    pub stats: PrimaryStats,
    pub derived: DerivedStats,
    pub equipment: Equipment,
    pub inventory: Vec<ItemStack>,
    pub gold: u64,
    pub status_effects: Vec<StatusEffect>,
    pub coord: Coord,
    pub facing: Direction,
}

impl Player {
    pub fn new(name: impl Into<String>, class: ClassKind) -> Self {
        let stats = class.base_stats();
        let mut player = Self {
            name: name.into(),
            class,
            level: 1,
            xp: 0,
            stats,
            derived: DerivedStats {
                hp: 0,
                max_hp: 0,
                mp: 0,
                max_mp: 0,
                attack: 0,
                defense: 0,
                crit_chance: 0.0,
                crit_multiplier: 1.5,
            },
            equipment: Equipment::default(),
            inventory: Vec::new(),
            gold: 25,
            status_effects: Vec::new(),
            coord: Coord::ORIGIN,
            facing: Direction::South,
        };
        player.recompute_derived();
        player.derived.hp = player.derived.max_hp;
        player.derived.mp = player.derived.max_mp;
        player
    }

    /// Recalculate derived stats from primaries, level, and equipment.
    /// Current HP/MP are clamped, never refilled.
    pub fn recompute_derived(&mut self) {
        let s = &self.stats;
        let level = self.level as i32;

        let max_hp = 20 + s.constitution as i32 * 2 + level * 5;
        let max_mp = 5 + s.intelligence.max(s.wisdom) as i32 + level * 2;

        self.derived.max_hp = max_hp;
        self.derived.max_mp = max_mp;
        self.derived.attack = 1 + s.strength as i32 / 3 + level;
        self.derived.defense = s.constitution as i32 / 4;
        self.derived.crit_chance = (0.02 + s.dexterity as f32 * 0.005).min(0.35);
        self.derived.hp = self.derived.hp.min(max_hp);
        self.derived.mp = self.derived.mp.min(max_mp);
    }

    /// Attack value including equipped weapon.
    pub fn attack_value(&self, catalog: &ItemCatalog) -> i32 {
        let weapon = self
            .equipment
            .weapon
            .as_ref()
            .and_then(|w| catalog.get(&w.def_id))
            .map(|d| d.effects.attack)
            .unwrap_or(0);
        self.derived.attack + weapon
    }

    /// Defense value including equipped armor.
    pub fn defense_value(&self, catalog: &ItemCatalog) -> i32 {
        let armor = self
            .equipment
            .armor
            .as_ref()
            .and_then(|a| catalog.get(&a.def_id))
            .map(|d| d.effects.defense)
            .unwrap_or(0);
        self.derived.defense + armor
    }

    /// XP required to advance from `level` to `level + 1`.
    pub fn xp_for_level(level: u32) -> u64 {
        (level as u64) * 100 + (level as u64).pow(2) * 20
    }

    /// Grant XP; returns the number of levels gained.
    pub fn gain_xp(&mut self, amount: u64) -> u32 {
        self.xp += amount;
        let mut gained = 0;
        while self.xp >= Self::xp_for_level(self.level) {
            self.xp -= Self::xp_for_level(self.level);
            self.level += 1;
            gained += 1;
            self.stats.strength += 1;
            self.stats.constitution += 1;
            self.recompute_derived();
            // a level-up is a full refill
            self.derived.hp = self.derived.max_hp;
            self.derived.mp = self.derived.max_mp;
        }
        gained
    }

    pub fn take_damage(&mut self, amount: i32) {
        self.derived.hp = (self.derived.hp - amount.max(0)).max(0);
    }

    pub fn heal(&mut self, amount: i32) {
        self.derived.hp = (self.derived.hp + amount.max(0)).min(self.derived.max_hp);
    }

    pub fn is_dead(&self) -> bool {
        self.derived.hp <= 0
    }

    /// Add a stack to the inventory, merging into existing stacks first.
    pub fn add_item(&mut self, stack: ItemStack, catalog: &ItemCatalog) -> Result<(), ActionError> {
        let def = catalog
            .get(&stack.def_id)
            .ok_or_else(|| ActionError::InvalidTarget(format!("unknown item {}", stack.def_id)))?;

        let mut remaining = stack.quantity;
        for slot in &mut self.inventory {
            if slot.can_merge(&stack, def) {
                let room = def.max_stack - slot.quantity;
                let moved = remaining.min(room);
                slot.quantity += moved;
                remaining -= moved;
                if remaining == 0 {
                    return Ok(());
                }
            }
        }
        if self.inventory.len() >= INVENTORY_SLOTS {
            return Err(ActionError::InventoryFull);
        }
        self.inventory.push(ItemStack { quantity: remaining, ..stack });
        Ok(())
    }

    /// Remove `quantity` of an item; the whole stack when it reaches zero.
    pub fn remove_item(&mut self, def_id: &str, quantity: u32) -> Result<ItemStack, ActionError> {
        let idx = self
            .inventory
            .iter()
            .position(|s| s.def_id == def_id)
            .ok_or_else(|| ActionError::InvalidTarget(format!("not carrying {def_id}")))?;
        let slot = &mut self.inventory[idx];
        if slot.quantity < quantity {
            return Err(ActionError::InsufficientResources(format!(
                "only {} of {} held",
                slot.quantity, def_id
            )));
        }
        slot.quantity -= quantity;
        let mut taken = slot.clone();
        taken.quantity = quantity;
        if slot.quantity == 0 {
            self.inventory.remove(idx);
        }
        Ok(taken)
    }

    /// Equip a weapon or armor piece from the inventory, swapping out the
    /// previous piece if any.
    pub fn equip(&mut self, def_id: &str, catalog: &ItemCatalog) -> Result<(), ActionError> {
        let def = catalog
            .get(def_id)
            .ok_or_else(|| ActionError::InvalidTarget(format!("unknown item {def_id}")))?;
        let slot = match def.category {
            ItemCategory::Weapon => 0,
            ItemCategory::Armor => 1,
            _ => {
                return Err(ActionError::InvalidTarget(format!("{} cannot be equipped", def.name)));
            }
        };
        let stack = self.remove_item(def_id, 1)?;
        let previous = match slot {
            0 => self.equipment.weapon.replace(stack),
            _ => self.equipment.armor.replace(stack),
        };
        if let Some(prev) = previous {
            // swapping back never overflows: we just freed a slot
            let _ = self.add_item(prev, catalog);
        }
        self.recompute_derived();
        Ok(())
    }

    /// Tick status effects down one turn, dropping expired ones.
    pub fn tick_status_effects(&mut self) {
        for effect in &mut self.status_effects {
            effect.remaining_turns = effect.remaining_turns.saturating_sub(1);
        }
        self.status_effects.retain(|e| e.remaining_turns > 0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_player_starts_at_full_hp() {
        let player = Player::new("Hero", ClassKind::Warrior);
        assert_eq!(player.derived.hp, player.derived.max_hp);
        assert_eq!(player.level, 1);
        assert_eq!(player.coord, Coord::ORIGIN);
    }

    #[test]
    fn test_gain_xp_levels_up() {
        let mut player = Player::new("Hero", ClassKind::Rogue);
        let needed = Player::xp_for_level(1);
        let gained = player.gain_xp(needed);
        assert_eq!(gained, 1);
        assert_eq!(player.level, 2);
        assert_eq!(player.derived.hp, player.derived.max_hp);
    }

    #[test]
    fn test_inventory_merges_stacks() {
        let catalog = ItemCatalog::builtin();
        let mut player = Player::new("Hero", ClassKind::Mage);
        let potion = catalog.get("healing_potion").unwrap();
        player.add_item(ItemStack::of(potion, 4), &catalog).unwrap();
        player.add_item(ItemStack::of(potion, 3), &catalog).unwrap();
        assert_eq!(player.inventory.len(), 1);
        assert_eq!(player.inventory[0].quantity, 7);
    }

    #[test]
    fn test_inventory_full_is_recoverable() {
        let catalog = ItemCatalog::builtin();
        let mut player = Player::new("Hero", ClassKind::Warrior);
        let sword = catalog.get("rusty_sword").unwrap();
        for _ in 0..INVENTORY_SLOTS {
            player.add_item(ItemStack::of(sword, 1), &catalog).unwrap();
        }
        let err = player.add_item(ItemStack::of(sword, 1), &catalog).unwrap_err();
        assert!(matches!(err, ActionError::InventoryFull));
    }

    #[test]
    fn test_equip_swaps_previous_weapon() {
        let catalog = ItemCatalog::builtin();
        let mut player = Player::new("Hero", ClassKind::Warrior);
        player.add_item(ItemStack::of(catalog.get("rusty_sword").unwrap(), 1), &catalog).unwrap();
        player.add_item(ItemStack::of(catalog.get("iron_sword").unwrap(), 1), &catalog).unwrap();

        player.equip("rusty_sword", &catalog).unwrap();
        assert_eq!(player.equipment.weapon.as_ref().unwrap().def_id, "rusty_sword");

        player.equip("iron_sword", &catalog).unwrap();
        assert_eq!(player.equipment.weapon.as_ref().unwrap().def_id, "iron_sword");
        assert!(player.inventory.iter().any(|s| s.def_id == "rusty_sword"));
        assert_eq!(player.attack_value(&catalog), player.derived.attack + 6);
    }

    #[test]
    fn test_damage_floors_at_zero() {
        let mut player = Player::new("Hero", ClassKind::Mage);
        player.take_damage(10_000);
        assert_eq!(player.derived.hp, 0);
        assert!(player.is_dead());
    }
}
