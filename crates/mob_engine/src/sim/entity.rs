use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::behavior::{self, BehaviorKind, BehaviorState};
use crate::world::GridPos;

use super::loot::DropTable;
use super::status::StatusEffectManager;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityId(pub u64);

impl EntityId {
    pub const UNASSIGNED: EntityId = EntityId(u64::MAX);
}

#[derive(Debug, Default)]
pub struct EntityIdAllocator {
    next: u64,
}

impl EntityIdAllocator {
    pub fn allocate(&mut self) -> EntityId {
        let id = EntityId(self.next);
        self.next = self.next.saturating_add(1);
        id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Capabilities {
    pub can_wander: bool,
    pub can_flee: bool,
    pub can_chase: bool,
    pub can_patrol: bool,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            can_wander: true,
            can_flee: true,
            can_chase: true,
            can_patrol: false,
        }
    }
}

/// Combat block carried by entities that can pick targets and attack.
#[derive(Debug, Clone, PartialEq)]
pub struct MobProfile {
    pub strength: f32,
    pub damage: f32,
    pub attack_speed: f32,
    pub attack_range: u32,
    pub aggro_range: u32,
    pub target: Option<EntityId>,
    pub patrol_center: Option<GridPos>,
    pub last_attack_at: Option<f64>,
}

impl Default for MobProfile {
    fn default() -> Self {
        Self {
            strength: 1.0,
            damage: 1.0,
            attack_speed: 1.0,
            attack_range: 1,
            aggro_range: 5,
            target: None,
            patrol_center: None,
            last_attack_at: None,
        }
    }
}

impl MobProfile {
    pub fn attack_interval_seconds(&self) -> f32 {
        if self.attack_speed > 0.0 {
            1.0 / self.attack_speed
        } else {
            f32::INFINITY
        }
    }

    pub fn attack_damage(&self) -> f32 {
        self.damage + (self.strength * 1.5) / 2.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActionTimers {
    pub last_attacked_at: Option<f64>,
    pub last_wander_at: Option<f64>,
    pub last_move_at: Option<f64>,
    pub regen_elapsed_seconds: f32,
}

impl Default for ActionTimers {
    fn default() -> Self {
        Self {
            last_attacked_at: None,
            last_wander_at: None,
            last_move_at: None,
            regen_elapsed_seconds: 1.0,
        }
    }
}

impl ActionTimers {
    pub fn seconds_since_attacked(&self, now_seconds: f64) -> Option<f64> {
        self.last_attacked_at.map(|at| now_seconds - at)
    }

    pub fn attacked_within(&self, now_seconds: f64, window_seconds: f64) -> bool {
        self.seconds_since_attacked(now_seconds)
            .is_some_and(|elapsed| elapsed < window_seconds)
    }

    pub fn move_delay_elapsed(&self, now_seconds: f64, delay_seconds: f64) -> bool {
        match self.last_move_at {
            None => delay_seconds.is_finite(),
            Some(last) => now_seconds - last >= delay_seconds,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Entity {
    pub(crate) id: EntityId,
    pub bestiary_id: String,
    pub name: String,
    pub level: u32,
    health: f32,
    pub max_health: f32,
    pub defence: f32,
    pub speed: f32,
    pub drops: DropTable,
    pub health_regeneration: f32,
    pub wandering_factor: f32,
    pub capabilities: Capabilities,
    pub mob: Option<MobProfile>,
    pub(crate) dead: bool,
    pub(crate) position: GridPos,
    pub(crate) timers: ActionTimers,
    pub(crate) attacker: Option<EntityId>,
    pub(crate) status_effects: StatusEffectManager,
    pub(crate) behavior: BehaviorState,
    pub(crate) queued_path: VecDeque<GridPos>,
}

impl Entity {
    pub fn new(name: impl Into<String>, max_health: f32) -> Self {
        let max_health = max_health.max(0.0);
        Self {
            id: EntityId::UNASSIGNED,
            bestiary_id: String::new(),
            name: name.into(),
            level: 1,
            health: max_health,
            max_health,
            defence: 0.0,
            speed: 1.0,
            drops: DropTable::default(),
            health_regeneration: 1.0,
            wandering_factor: 1.0,
            capabilities: Capabilities::default(),
            mob: None,
            dead: false,
            position: GridPos::default(),
            timers: ActionTimers::default(),
            attacker: None,
            status_effects: StatusEffectManager::default(),
            behavior: behavior::initial_state(),
            queued_path: VecDeque::new(),
        }
    }

    pub fn with_position(mut self, position: GridPos) -> Self {
        self.position = position;
        self
    }

    pub fn with_health(mut self, health: f32) -> Self {
        self.set_health(health);
        self
    }

    pub fn with_defence(mut self, defence: f32) -> Self {
        self.defence = defence;
        self
    }

    pub fn with_speed(mut self, speed: f32) -> Self {
        self.speed = speed;
        self
    }

    pub fn with_level(mut self, level: u32) -> Self {
        self.level = level;
        self
    }

    pub fn with_regeneration(mut self, health_regeneration: f32) -> Self {
        self.health_regeneration = health_regeneration;
        self
    }

    pub fn with_drops(mut self, drops: DropTable) -> Self {
        self.drops = drops;
        self
    }

    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn with_wandering_factor(mut self, wandering_factor: f32) -> Self {
        self.wandering_factor = wandering_factor;
        self
    }

    pub fn with_mob(mut self, mob: MobProfile) -> Self {
        self.mob = Some(mob);
        self
    }

    pub fn id(&self) -> EntityId {
        self.id
    }

    pub fn health(&self) -> f32 {
        self.health
    }

    pub(crate) fn set_health(&mut self, health: f32) {
        self.health = health.clamp(0.0, self.max_health.max(0.0));
    }

    pub fn is_dead(&self) -> bool {
        self.dead
    }

    pub fn position(&self) -> GridPos {
        self.position
    }

    pub fn timers(&self) -> &ActionTimers {
        &self.timers
    }

    pub fn attacker(&self) -> Option<EntityId> {
        self.attacker
    }

    pub fn target(&self) -> Option<EntityId> {
        self.mob.as_ref().and_then(|mob| mob.target)
    }

    pub fn status_effects(&self) -> &StatusEffectManager {
        &self.status_effects
    }

    pub fn behavior_kind(&self) -> BehaviorKind {
        self.behavior.kind()
    }

    pub fn behavior(&self) -> &BehaviorState {
        &self.behavior
    }

    pub fn queued_path(&self) -> impl Iterator<Item = &GridPos> {
        self.queued_path.iter()
    }

    pub fn health_fraction(&self) -> f32 {
        if self.max_health <= 0.0 {
            0.0
        } else {
            self.health / self.max_health
        }
    }

    pub fn effective_speed(&self) -> f32 {
        self.speed * self.status_effects.speed_multiplier()
    }

    /// Seconds between grid steps; infinite when the entity cannot move.
    pub fn move_delay_seconds(&self) -> f64 {
        let speed = self.effective_speed();
        if speed > 0.0 {
            1.0 / speed as f64
        } else {
            f64::INFINITY
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::StatusEffect;

    #[test]
    fn health_is_clamped_to_range() {
        let entity = Entity::new("slime", 50.0).with_health(80.0);
        assert_eq!(entity.health(), 50.0);
        let entity = Entity::new("slime", 50.0).with_health(-3.0);
        assert_eq!(entity.health(), 0.0);
    }

    #[test]
    fn mob_attack_damage_adds_scaled_strength() {
        let mob = MobProfile {
            damage: 10.0,
            strength: 2.0,
            ..MobProfile::default()
        };
        assert!((mob.attack_damage() - 11.5).abs() < f32::EPSILON);
    }

    #[test]
    fn attack_interval_is_inverse_of_attack_speed() {
        let mob = MobProfile {
            attack_speed: 2.0,
            ..MobProfile::default()
        };
        assert_eq!(mob.attack_interval_seconds(), 0.5);
        let idle = MobProfile {
            attack_speed: 0.0,
            ..MobProfile::default()
        };
        assert!(idle.attack_interval_seconds().is_infinite());
    }

    #[test]
    fn slow_halves_move_rate() {
        let mut entity = Entity::new("orc", 10.0).with_speed(2.0);
        assert!((entity.move_delay_seconds() - 0.5).abs() < 1e-9);
        entity
            .status_effects
            .apply(StatusEffect::slow(3.0, 1.0))
            .expect("slow");
        assert!((entity.move_delay_seconds() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn zero_speed_never_moves() {
        let entity = Entity::new("totem", 10.0).with_speed(0.0);
        assert!(entity.move_delay_seconds().is_infinite());
        assert!(!entity.timers().move_delay_elapsed(100.0, entity.move_delay_seconds()));
    }
}
