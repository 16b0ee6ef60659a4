//! Item definitions and stacked instances
//!
//! Definitions are immutable and live in the catalog; what players carry and
//! rooms drop are `ItemStack` instances referencing a definition by id,
//! carrying the mutable bits (quantity, durability, enchantment).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ItemCategory {
    Weapon,
    Armor,
    Consumable,
    Quest,
    Key,
    Misc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Rarity {
    Common,
    Uncommon,
    Rare,
    Epic,
    Legendary,
}

/// Flat stat block an item contributes while equipped or consumed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemEffects {
    pub attack: i32,
    pub defense: i32,
    pub heal_hp: i32,
    pub restore_mp: i32,
}

/// Immutable item definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemDef {
    pub id: String,
    pub name: String,
    pub category: ItemCategory,
    /// Maximum stack size; 1 for unstackable gear.
    pub max_stack: u32,
    pub rarity: Rarity,
    pub effects: ItemEffects,
    /// Gear wears out; consumables and quest items do not.
    pub has_durability: bool,
    pub value: u32,
}

/// A held or dropped instance of a definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemStack {
    pub def_id: String,
    pub quantity: u32,
    pub durability: Option<u32>,
    pub enchantment: Option<String>,
}

impl ItemStack {
    pub fn of(def: &ItemDef, quantity: u32) -> Self {
        Self {
            def_id: def.id.clone(),
            quantity,
            durability: def.has_durability.then_some(100),
            enchantment: None,
        }
    }

    /// Whether another stack can merge into this one.
    pub fn can_merge(&self, other: &ItemStack, def: &ItemDef) -> bool {
        self.def_id == other.def_id
            && self.enchantment == other.enchantment
            && def.max_stack > 1
            && self.quantity < def.max_stack
    }
}

/// The immutable registry of every item definition in the game.
#[derive(Debug, Clone)]
pub struct ItemCatalog {
    defs: HashMap<String, ItemDef>,
}

impl ItemCatalog {
    /// Built-in catalog. Content packs would extend this; the core set is
    /// enough to exercise every spawn table and the starter kit.
    pub fn builtin() -> Self {
        let mut defs = HashMap::new();
        let mut add = |def: ItemDef| {
            defs.insert(def.id.clone(), def);
        };

        add(ItemDef {
            id: "torch".into(),
            name: "Torch".into(),
            category: ItemCategory::Misc,
            max_stack: 5,
            rarity: Rarity::Common,
            effects: ItemEffects::default(),
            has_durability: false,
            value: 2,
        });
        add(ItemDef {
            id: "rusty_sword".into(),
            name: "Rusty Sword".into(),
            category: ItemCategory::Weapon,
            max_stack: 1,
            rarity: Rarity::Common,
            effects: ItemEffects { attack: 3, ..Default::default() },
            has_durability: true,
            value: 10,
        });
        add(ItemDef {
            id: "iron_sword".into(),
            name: "Iron Sword".into(),
            category: ItemCategory::Weapon,
            max_stack: 1,
            rarity: Rarity::Uncommon,
            effects: ItemEffects { attack: 6, ..Default::default() },
            has_durability: true,
            value: 45,
        });
        add(ItemDef {
            id: "leather_armor".into(),
            name: "Leather Armor".into(),
            category: ItemCategory::Armor,
            max_stack: 1,
            rarity: Rarity::Common,
            effects: ItemEffects { defense: 2, ..Default::default() },
            has_durability: true,
            value: 20,
        });
        add(ItemDef {
            id: "chain_mail".into(),
            name: "Chain Mail".into(),
            category: ItemCategory::Armor,
            max_stack: 1,
            rarity: Rarity::Rare,
            effects: ItemEffects { defense: 5, ..Default::default() },
            has_durability: true,
            value: 80,
        });
        add(ItemDef {
            id: "healing_potion".into(),
            name: "Healing Potion".into(),
            category: ItemCategory::Consumable,
            max_stack: 10,
            rarity: Rarity::Common,
            effects: ItemEffects { heal_hp: 20, ..Default::default() },
            has_durability: false,
            value: 15,
        });
        add(ItemDef {
            id: "mana_draught".into(),
            name: "Mana Draught".into(),
            category: ItemCategory::Consumable,
            max_stack: 10,
            rarity: Rarity::Uncommon,
            effects: ItemEffects { restore_mp: 15, ..Default::default() },
            has_durability: false,
            value: 25,
        });
        add(ItemDef {
            id: "bone_key".into(),
            name: "Bone Key".into(),
            category: ItemCategory::Key,
            max_stack: 1,
            rarity: Rarity::Uncommon,
            effects: ItemEffects::default(),
            has_durability: false,
            value: 0,
        });
        add(ItemDef {
            id: "ancient_sigil".into(),
            name: "Ancient Sigil".into(),
            category: ItemCategory::Quest,
            max_stack: 1,
            rarity: Rarity::Rare,
            effects: ItemEffects::default(),
            has_durability: false,
            value: 0,
        });
        add(ItemDef {
            id: "gold_nugget".into(),
            name: "Gold Nugget".into(),
            category: ItemCategory::Misc,
            max_stack: 20,
            rarity: Rarity::Uncommon,
            effects: ItemEffects::default(),
            has_durability: false,
            value: 30,
        });

        Self { defs }
    }

    pub fn get(&self, id: &str) -> Option<&ItemDef> {
        self.defs.get(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.defs.keys().map(String::as_str)
    }
}
