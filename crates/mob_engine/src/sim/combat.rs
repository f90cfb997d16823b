use tracing::{debug, info};

use crate::behavior::{self, BehaviorKind};
use crate::error::SimError;
use crate::world::GridWorld;

use super::entity::EntityId;
use super::events::SimEvent;
use super::loot::Loot;

/// Seconds without being hit before regeneration resumes.
pub const OUT_OF_COMBAT_SECONDS: f64 = 5.0;
const REGEN_INTERVAL_SECONDS: f32 = 1.0;
const FLEE_HEALTH_FRACTION: f32 = 0.2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DamageSource {
    Attack,
    StatusEffect,
}

/// `raw * (1 - d / (d + 100))` for attacks; status damage bypasses defence.
pub fn mitigate_damage(raw: f32, defence: f32, source: DamageSource) -> f32 {
    match source {
        DamageSource::StatusEffect => raw,
        DamageSource::Attack => {
            let defence = defence.max(0.0);
            raw * (1.0 - defence / (defence + 100.0))
        }
    }
}

impl GridWorld {
    /// Applies `amount` to `victim`. Returns the loot when this hit kills it.
    pub fn take_damage(
        &mut self,
        victim: EntityId,
        amount: f32,
        source: DamageSource,
    ) -> Result<Option<Loot>, SimError> {
        let slot = self.slot_of(victim).ok_or(SimError::UnknownEntity(victim))?;
        if self.entities[slot].dead {
            return Ok(None);
        }
        let amount = if amount.is_nan() { 0.0 } else { amount.max(0.0) };
        let attacker = match source {
            DamageSource::Attack => self.attribute_attacker(victim),
            DamageSource::StatusEffect => None,
        };

        let now = self.now_seconds;
        let entity = &mut self.entities[slot];
        entity.timers.last_attacked_at = Some(now);
        // status damage has no attacker and clears the last one
        entity.attacker = attacker;
        let actual = mitigate_damage(amount, entity.defence, source);
        let remaining = entity.health() - actual;
        entity.set_health(remaining);
        debug!(
            entity = %entity.name,
            amount = actual,
            health = entity.health(),
            status = source == DamageSource::StatusEffect,
            "entity_damaged"
        );
        let died = entity.health() <= 0.0;
        self.events.emit(SimEvent::EntityDamaged {
            entity_id: victim,
            attacker_id: attacker,
            amount: actual,
            from_status_effect: source == DamageSource::StatusEffect,
        });

        if died {
            return Ok(Some(self.process_death(victim)));
        }
        if source == DamageSource::Attack {
            self.retaliate(victim, attacker);
            self.maybe_flee(victim);
        }
        Ok(None)
    }

    /// First live entity, in registry order, whose target is `victim`.
    fn attribute_attacker(&self, victim: EntityId) -> Option<EntityId> {
        self.entities
            .iter()
            .find(|entity| !entity.dead && entity.id != victim && entity.target() == Some(victim))
            .map(|entity| entity.id)
    }

    fn retaliate(&mut self, victim: EntityId, attacker: Option<EntityId>) {
        let Some(attacker) = attacker else {
            return;
        };
        if !self.is_live(attacker) {
            return;
        }
        let Some(mob) = self.entity_mut(victim).and_then(|entity| entity.mob.as_mut()) else {
            return;
        };
        if mob.target == Some(attacker) {
            return;
        }
        mob.target = Some(attacker);
        self.events.emit(SimEvent::TargetAssigned {
            entity_id: victim,
            target_id: attacker,
        });
    }

    fn maybe_flee(&mut self, victim: EntityId) {
        let Some(entity) = self.entity(victim) else {
            return;
        };
        if !entity.capabilities.can_flee
            || entity.behavior_kind() == BehaviorKind::Flee
            || entity.health_fraction() > FLEE_HEALTH_FRACTION
        {
            return;
        }
        behavior::transition(self, victim, BehaviorKind::Flee);
    }

    fn process_death(&mut self, victim: EntityId) -> Loot {
        let Some(slot) = self.slot_of(victim) else {
            return Loot::default();
        };
        let entity = &mut self.entities[slot];
        let loot = entity.drops.roll(&mut self.rng);
        entity.status_effects.clear();
        entity.queued_path.clear();
        entity.dead = true;
        info!(
            entity = %entity.name,
            gold = loot.gold,
            experience = loot.experience,
            items = loot.items.len(),
            "entity_died"
        );
        self.events.emit(SimEvent::EntityDied {
            entity_id: victim,
            loot: loot.clone(),
        });
        self.remove_entity(victim);
        loot
    }

    /// Swings at the attacker's current target. Clears the target when the swing kills it.
    pub(crate) fn perform_attack(&mut self, attacker: EntityId) -> Option<Loot> {
        let now = self.now_seconds;
        let (target, damage) = {
            let mob = self.entity(attacker)?.mob.as_ref()?;
            (mob.target?, mob.attack_damage())
        };
        if !self.is_live(target) {
            return None;
        }

        let loot = self
            .take_damage(target, damage, DamageSource::Attack)
            .ok()
            .flatten();
        let target_alive = self.is_live(target);
        if let Some(mob) = self.entity_mut(attacker).and_then(|entity| entity.mob.as_mut()) {
            mob.last_attack_at = Some(now);
            if !target_alive {
                mob.target = None;
            }
        }
        debug!(
            attacker = attacker.0,
            target = target.0,
            damage,
            killed = !target_alive,
            "attack_resolved"
        );
        loot
    }

    /// Out-of-combat healing on a one-second cadence.
    pub(crate) fn regenerate(&mut self, id: EntityId, dt: f32) {
        let now = self.now_seconds;
        let Some(entity) = self.entity_mut(id) else {
            return;
        };
        if entity.dead || entity.health() >= entity.max_health {
            return;
        }
        entity.timers.regen_elapsed_seconds += dt;
        if entity.timers.attacked_within(now, OUT_OF_COMBAT_SECONDS)
            || entity.timers.regen_elapsed_seconds < REGEN_INTERVAL_SECONDS
        {
            return;
        }
        let before = entity.health();
        let healed = before + entity.health_regeneration;
        entity.set_health(healed);
        entity.timers.regen_elapsed_seconds = 0.0;
        let amount = entity.health() - before;
        self.events.emit(SimEvent::EntityRegenerated {
            entity_id: id,
            amount,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{DropTable, Entity, MobProfile, RollRange, StatusEffect};
    use crate::world::GridPos;

    fn approx(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-3
    }

    fn dummy(name: &str, x: i32, health: f32, defence: f32) -> Entity {
        Entity::new(name, health)
            .with_position(GridPos::new(x, 0))
            .with_defence(defence)
            .with_speed(0.0)
            .with_capabilities(crate::sim::Capabilities {
                can_wander: false,
                can_flee: false,
                can_chase: false,
                can_patrol: false,
            })
    }

    #[test]
    fn mitigation_formula_matches_reference_values() {
        assert!(approx(mitigate_damage(50.0, 100.0, DamageSource::Attack), 25.0));
        assert!(approx(mitigate_damage(50.0, 0.0, DamageSource::Attack), 50.0));
        assert!(approx(mitigate_damage(50.0, 100.0, DamageSource::StatusEffect), 50.0));
    }

    #[test]
    fn defence_ten_takes_twenty_raw_to_about_81_8() {
        let mut world = GridWorld::new("test", 4, 1, 1);
        let id = world.add_entity(dummy("target", 0, 100.0, 10.0)).expect("add");
        let loot = world
            .take_damage(id, 20.0, DamageSource::Attack)
            .expect("damage");
        assert!(loot.is_none());
        let health = world.entity(id).expect("alive").health();
        assert!(approx(health, 100.0 - 20.0 * (1.0 - 10.0 / 110.0)));
        assert!(approx(health, 81.818));
    }

    #[test]
    fn death_is_processed_once_and_frees_the_cell() {
        let mut world = GridWorld::new("test", 4, 1, 1);
        let drops = DropTable {
            gold: Some(RollRange::fixed(7)),
            experience: 3,
            items: Vec::new(),
        };
        let id = world
            .add_entity(dummy("victim", 1, 10.0, 0.0).with_drops(drops))
            .expect("add");
        world
            .apply_status_effect(id, StatusEffect::burn(5.0, 1.0))
            .expect("burn");

        let loot = world
            .take_damage(id, 50.0, DamageSource::Attack)
            .expect("damage")
            .expect("loot on death");
        assert_eq!(loot.gold, 7);
        assert_eq!(loot.experience, 3);
        assert!(world.entity(id).is_none());
        assert!(world.is_valid_move(GridPos::new(1, 0)));
        assert!(matches!(
            world.take_damage(id, 1.0, DamageSource::Attack),
            Err(SimError::UnknownEntity(_))
        ));
        let died = world
            .events
            .iter_emitted_so_far()
            .filter(|event| matches!(event, SimEvent::EntityDied { .. }))
            .count();
        assert_eq!(died, 1);
    }

    #[test]
    fn attack_attributes_first_targeting_entity_and_retaliates() {
        let mut world = GridWorld::new("test", 4, 1, 1);
        let first = world
            .add_entity(dummy("first", 0, 50.0, 0.0).with_mob(MobProfile::default()))
            .expect("add");
        let second = world
            .add_entity(dummy("second", 2, 50.0, 0.0).with_mob(MobProfile::default()))
            .expect("add");
        let victim = world
            .add_entity(dummy("victim", 1, 50.0, 0.0).with_mob(MobProfile::default()))
            .expect("add");
        world.set_target(second, victim).expect("target");
        world.set_target(first, victim).expect("target");

        world.perform_attack(second);
        let victim_entity = world.entity(victim).expect("alive");
        assert_eq!(victim_entity.attacker(), Some(first));
        assert_eq!(victim_entity.target(), Some(first));
        assert!(victim_entity.timers().last_attacked_at.is_some());
    }

    #[test]
    fn killing_blow_clears_attacker_target() {
        let mut world = GridWorld::new("test", 4, 1, 1);
        let attacker = world
            .add_entity(dummy("attacker", 0, 50.0, 0.0).with_mob(MobProfile {
                damage: 100.0,
                ..MobProfile::default()
            }))
            .expect("add");
        let victim = world.add_entity(dummy("victim", 1, 5.0, 0.0)).expect("add");
        world.set_target(attacker, victim).expect("target");

        let loot = world.perform_attack(attacker);
        assert!(loot.is_some());
        assert_eq!(world.entity(attacker).and_then(|e| e.target()), None);
        assert!(world
            .entity(attacker)
            .and_then(|e| e.mob.as_ref())
            .and_then(|mob| mob.last_attack_at)
            .is_some());
    }

    #[test]
    fn status_damage_does_not_attribute_or_retaliate() {
        let mut world = GridWorld::new("test", 4, 1, 1);
        let attacker = world
            .add_entity(dummy("attacker", 0, 50.0, 0.0).with_mob(MobProfile::default()))
            .expect("add");
        let victim = world
            .add_entity(dummy("victim", 1, 50.0, 100.0).with_mob(MobProfile::default()))
            .expect("add");
        world.set_target(attacker, victim).expect("target");
        world
            .take_damage(victim, 10.0, DamageSource::StatusEffect)
            .expect("damage");
        let entity = world.entity(victim).expect("alive");
        assert_eq!(entity.attacker(), None);
        assert_eq!(entity.target(), None);
        assert!(approx(entity.health(), 40.0));
    }

    #[test]
    fn status_damage_clears_previous_attacker() {
        let mut world = GridWorld::new("test", 4, 1, 1);
        let attacker = world
            .add_entity(dummy("attacker", 0, 50.0, 0.0).with_mob(MobProfile::default()))
            .expect("add");
        let victim = world.add_entity(dummy("victim", 1, 50.0, 0.0)).expect("add");
        world.set_target(attacker, victim).expect("target");

        world
            .take_damage(victim, 5.0, DamageSource::Attack)
            .expect("hit");
        assert_eq!(world.entity(victim).and_then(Entity::attacker), Some(attacker));

        world
            .take_damage(victim, 5.0, DamageSource::StatusEffect)
            .expect("burn");
        assert_eq!(world.entity(victim).and_then(Entity::attacker), None);
    }

    #[test]
    fn low_health_hit_enters_flee_when_capable() {
        let mut world = GridWorld::new("test", 4, 1, 1);
        let mut capabilities = crate::sim::Capabilities::default();
        capabilities.can_wander = false;
        let victim = world
            .add_entity(
                Entity::new("coward", 100.0)
                    .with_position(GridPos::new(1, 0))
                    .with_capabilities(capabilities),
            )
            .expect("add");
        world
            .take_damage(victim, 85.0, DamageSource::Attack)
            .expect("damage");
        assert_eq!(
            world.entity(victim).map(Entity::behavior_kind),
            Some(BehaviorKind::Flee)
        );
    }

    #[test]
    fn regeneration_waits_for_out_of_combat_window() {
        let mut world = GridWorld::new("test", 4, 1, 1);
        let id = world
            .add_entity(dummy("healer", 0, 100.0, 0.0).with_regeneration(2.0))
            .expect("add");
        world
            .take_damage(id, 10.0, DamageSource::StatusEffect)
            .expect("damage");

        for _ in 0..8 {
            world.tick(0.5).expect("tick");
        }
        assert!(approx(world.entity(id).expect("alive").health(), 90.0));

        for _ in 0..4 {
            world.tick(0.5).expect("tick");
        }
        let health = world.entity(id).expect("alive").health();
        assert!(health > 90.0 && health <= 100.0);

        for _ in 0..40 {
            world.tick(0.5).expect("tick");
        }
        assert!(approx(world.entity(id).expect("alive").health(), 100.0));
    }
}
