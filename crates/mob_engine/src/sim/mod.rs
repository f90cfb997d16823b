mod combat;
mod entity;
mod events;
mod loot;
mod status;

pub use combat::{mitigate_damage, DamageSource, OUT_OF_COMBAT_SECONDS};
pub use entity::{
    ActionTimers, Capabilities, Entity, EntityId, EntityIdAllocator, MobProfile,
};
pub use events::{SimEvent, SimEventBus, SimEventCounts, SimEventKind};
pub use loot::{DropTable, ItemDrop, ItemStack, Loot, RollRange};
pub use status::{
    StatusApplyOutcome, StatusEffect, StatusEffectKind, StatusEffectManager, StatusPulse,
    StatusTick, BURN_EFFECT_ID, SLOW_EFFECT_ID,
};
