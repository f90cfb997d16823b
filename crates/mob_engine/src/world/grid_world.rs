use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::{debug, info, warn};

use crate::behavior::{self, BehaviorKind};
use crate::error::SimError;
use crate::sim::{
    DamageSource, Entity, EntityId, EntityIdAllocator, SimEvent, SimEventBus, SimEventCounts,
    StatusApplyOutcome, StatusEffect,
};

use super::grid::{GridPos, OccupancyGrid};
use super::nav::PathFinder;

/// One area of the simulation: the occupancy table, the live entity registry and the sim clock.
///
/// Entities are updated in insertion order. Only the entity being updated, or effects and attacks
/// aimed at it, mutate shared state during a tick.
#[derive(Debug)]
pub struct GridWorld {
    name: String,
    pub(crate) grid: OccupancyGrid,
    pub(crate) entities: Vec<Entity>,
    ids: EntityIdAllocator,
    pub(crate) now_seconds: f64,
    pub(crate) rng: ChaCha8Rng,
    pub(crate) events: SimEventBus,
}

impl GridWorld {
    pub fn new(name: impl Into<String>, width: u32, height: u32, seed: u64) -> Self {
        Self {
            name: name.into(),
            grid: OccupancyGrid::new(width, height),
            entities: Vec::new(),
            ids: EntityIdAllocator::default(),
            now_seconds: 0.0,
            rng: ChaCha8Rng::seed_from_u64(seed),
            events: SimEventBus::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn width(&self) -> u32 {
        self.grid.width()
    }

    pub fn height(&self) -> u32 {
        self.grid.height()
    }

    pub fn grid(&self) -> &OccupancyGrid {
        &self.grid
    }

    pub fn now_seconds(&self) -> f64 {
        self.now_seconds
    }

    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    pub(crate) fn slot_of(&self, id: EntityId) -> Option<usize> {
        self.entities.iter().position(|entity| entity.id == id)
    }

    pub fn entity(&self, id: EntityId) -> Option<&Entity> {
        self.entities.iter().find(|entity| entity.id == id)
    }

    pub fn entity_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        self.entities.iter_mut().find(|entity| entity.id == id)
    }

    pub fn entity_at(&self, pos: GridPos) -> Option<&Entity> {
        self.grid.occupant(pos).and_then(|id| self.entity(id))
    }

    pub fn find_by_name(&self, name: &str) -> Option<&Entity> {
        self.entities.iter().find(|entity| entity.name == name)
    }

    pub fn is_live(&self, id: EntityId) -> bool {
        self.entity(id).is_some_and(|entity| !entity.dead)
    }

    /// Inserts `entity` at its position. Nothing changes when the cell is off-grid or taken.
    pub fn add_entity(&mut self, mut entity: Entity) -> Result<EntityId, SimError> {
        let pos = entity.position;
        if let Err(err) = self.grid.check_insert(pos) {
            warn!(
                area = %self.name,
                entity = %entity.name,
                x = pos.x,
                y = pos.y,
                error = %err,
                "entity_insert_rejected"
            );
            return Err(err.into());
        }

        let id = self.ids.allocate();
        entity.id = id;
        entity.behavior = behavior::initial_state();
        self.grid.place(id, pos)?;
        info!(
            area = %self.name,
            entity = %entity.name,
            id = id.0,
            x = pos.x,
            y = pos.y,
            "entity_added"
        );
        self.entities.push(entity);
        self.events.emit(SimEvent::EntityAdded {
            entity_id: id,
            position: pos,
        });
        Ok(id)
    }

    /// Idempotent: a stale id is a no-op returning `None`.
    pub fn remove_entity(&mut self, id: EntityId) -> Option<Entity> {
        let slot = self.slot_of(id)?;
        let entity = self.entities.remove(slot);
        self.grid.clear_if(id, entity.position);
        debug!(area = %self.name, entity = %entity.name, id = id.0, "entity_removed");
        self.events.emit(SimEvent::EntityRemoved { entity_id: id });
        Some(entity)
    }

    /// Unchecked move: callers confirm `to` with [`GridWorld::is_valid_move`] first.
    pub fn move_entity(&mut self, id: EntityId, to: GridPos) -> bool {
        let Some(slot) = self.slot_of(id) else {
            return false;
        };
        let from = self.entities[slot].position;
        self.grid.relocate(id, from, to);
        self.entities[slot].position = to;
        self.events.emit(SimEvent::EntityMoved {
            entity_id: id,
            from,
            to,
        });
        true
    }

    pub fn neighbors(&self, pos: GridPos) -> Vec<GridPos> {
        self.grid.neighbors(pos)
    }

    pub fn is_valid_move(&self, pos: GridPos) -> bool {
        self.grid.is_valid_move(pos)
    }

    pub fn find_path(&self, start: GridPos, goal: GridPos) -> Option<Vec<GridPos>> {
        PathFinder::new(&self.grid).find_path(start, goal)
    }

    pub fn set_target(&mut self, attacker: EntityId, target: EntityId) -> Result<(), SimError> {
        if let Err(err) = self.validate_target(attacker, target) {
            warn!(
                area = %self.name,
                attacker = attacker.0,
                target = target.0,
                error = %err,
                "target_rejected"
            );
            return Err(err);
        }
        let Some(mob) = self
            .entity_mut(attacker)
            .and_then(|entity| entity.mob.as_mut())
        else {
            return Err(SimError::UnknownEntity(attacker));
        };
        mob.target = Some(target);
        debug!(attacker = attacker.0, target = target.0, "target_assigned");
        self.events.emit(SimEvent::TargetAssigned {
            entity_id: attacker,
            target_id: target,
        });
        Ok(())
    }

    fn validate_target(&self, attacker: EntityId, target: EntityId) -> Result<(), SimError> {
        let Some(attacker_entity) = self.entity(attacker) else {
            return Err(SimError::UnknownEntity(attacker));
        };
        if attacker == target {
            return Err(SimError::invalid_target(format!(
                "{} cannot target itself",
                attacker_entity.name
            )));
        }
        if attacker_entity.mob.is_none() {
            return Err(SimError::invalid_target(format!(
                "{} has no combat profile",
                attacker_entity.name
            )));
        }
        match self.entity(target) {
            None => Err(SimError::invalid_target(format!(
                "target {:?} is not in {}",
                target, self.name
            ))),
            Some(target_entity) if target_entity.dead => Err(SimError::invalid_target(format!(
                "{} is already dead",
                target_entity.name
            ))),
            Some(_) => Ok(()),
        }
    }

    pub fn clear_target(&mut self, attacker: EntityId) -> Result<(), SimError> {
        let entity = self
            .entity_mut(attacker)
            .ok_or(SimError::UnknownEntity(attacker))?;
        if let Some(mob) = entity.mob.as_mut() {
            mob.target = None;
        }
        Ok(())
    }

    /// Resolves the entity's target only when it is still registered and alive.
    pub fn live_target(&self, id: EntityId) -> Option<&Entity> {
        let target = self.entity(id)?.target()?;
        self.entity(target).filter(|entity| !entity.dead)
    }

    pub fn apply_status_effect(
        &mut self,
        id: EntityId,
        effect: StatusEffect,
    ) -> Result<StatusApplyOutcome, SimError> {
        let effect_id = effect.id.clone();
        let entity = self.entity_mut(id).ok_or(SimError::UnknownEntity(id))?;
        if entity.dead {
            return Err(SimError::UnknownEntity(id));
        }
        let outcome = entity.status_effects.apply(effect)?;
        debug!(entity = %entity.name, effect = %effect_id, ?outcome, "status_applied");
        self.events.emit(SimEvent::StatusApplied {
            entity_id: id,
            effect_id,
        });
        Ok(outcome)
    }

    pub fn remove_status_effect(
        &mut self,
        id: EntityId,
        effect_id: &str,
    ) -> Result<Option<StatusEffect>, SimError> {
        let entity = self.entity_mut(id).ok_or(SimError::UnknownEntity(id))?;
        Ok(entity.status_effects.remove(effect_id))
    }

    /// Host order: target `target` and start chasing it.
    pub fn order_attack(&mut self, actor: EntityId, target: EntityId) -> Result<(), SimError> {
        self.set_target(actor, target)?;
        if let Some(entity) = self.entity_mut(actor) {
            entity.queued_path.clear();
        }
        behavior::transition(self, actor, BehaviorKind::Chase);
        Ok(())
    }

    /// Host order: walk to `goal` along a freshly planned path, queued on an Idle entity.
    /// Returns the number of queued steps.
    pub fn order_move(&mut self, actor: EntityId, goal: GridPos) -> Result<usize, SimError> {
        let start = self
            .entity(actor)
            .ok_or(SimError::UnknownEntity(actor))?
            .position;
        let path = self.find_path(start, goal).unwrap_or_default();
        self.clear_target(actor)?;
        behavior::transition(self, actor, BehaviorKind::Idle);
        let entity = self
            .entity_mut(actor)
            .ok_or(SimError::UnknownEntity(actor))?;
        entity.queued_path = path.into_iter().skip(1).collect();
        let steps = entity.queued_path.len();
        debug!(
            entity = %entity.name,
            goal_x = goal.x,
            goal_y = goal.y,
            steps,
            "move_ordered"
        );
        Ok(steps)
    }

    /// Advances the clock by `dt` seconds, then updates every live entity in insertion order:
    /// status effects, behavior, regeneration.
    pub fn tick(&mut self, dt: f32) -> Result<(), SimError> {
        if !dt.is_finite() || dt < 0.0 {
            return Err(SimError::InvalidTimeStep(dt));
        }
        self.now_seconds += dt as f64;

        let order: Vec<EntityId> = self.entities.iter().map(|entity| entity.id).collect();
        for id in order {
            if !self.is_live(id) {
                continue;
            }
            self.update_status_effects(id, dt);
            if !self.is_live(id) {
                continue;
            }
            behavior::update(self, id, dt);
            if !self.is_live(id) {
                continue;
            }
            self.regenerate(id, dt);
        }

        self.events.finish_tick_rollover();
        Ok(())
    }

    fn update_status_effects(&mut self, id: EntityId, dt: f32) {
        let Some(entity) = self.entity_mut(id) else {
            return;
        };
        if entity.status_effects.is_empty() {
            return;
        }
        let tick = entity.status_effects.update(dt);
        for effect_id in tick.expired {
            debug!(entity = id.0, effect = %effect_id, "status_expired");
            self.events.emit(SimEvent::StatusExpired {
                entity_id: id,
                effect_id,
            });
        }
        for pulse in tick.pulses {
            if !self.is_live(id) {
                break;
            }
            if let Err(err) = self.take_damage(id, pulse.damage, DamageSource::StatusEffect) {
                warn!(
                    area = %self.name,
                    entity = id.0,
                    effect = ?pulse.kind,
                    error = %err,
                    "status_damage_rejected"
                );
            }
        }
    }

    pub fn last_tick_events(&self) -> &[SimEvent] {
        self.events.last_tick_events()
    }

    pub fn last_tick_counts(&self) -> SimEventCounts {
        self.events.last_tick_counts()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::MobProfile;
    use crate::world::GridError;

    fn assert_occupancy_consistent(world: &GridWorld) {
        for entity in world.entities() {
            assert!(!entity.is_dead());
            assert_eq!(world.grid().occupant(entity.position()), Some(entity.id()));
        }
        assert_eq!(world.grid().occupied_count(), world.entity_count());
    }

    fn rock(x: i32, y: i32) -> Entity {
        Entity::new("rock", 10.0)
            .with_position(GridPos::new(x, y))
            .with_speed(0.0)
    }

    #[test]
    fn add_entity_rejects_without_partial_state() {
        let mut world = GridWorld::new("test", 3, 3, 1);
        let first = world.add_entity(rock(1, 1)).expect("add");

        let err = world.add_entity(rock(1, 1)).expect_err("occupied");
        assert_eq!(
            err,
            SimError::Grid(GridError::CellOccupied {
                x: 1,
                y: 1,
                occupant: first
            })
        );
        let err = world.add_entity(rock(3, 0)).expect_err("out of bounds");
        assert!(matches!(err, SimError::Grid(GridError::OutOfBounds { .. })));

        assert_eq!(world.entity_count(), 1);
        assert_occupancy_consistent(&world);
    }

    #[test]
    fn remove_entity_is_idempotent() {
        let mut world = GridWorld::new("test", 3, 3, 1);
        let id = world.add_entity(rock(0, 0)).expect("add");
        assert!(world.remove_entity(id).is_some());
        assert!(world.remove_entity(id).is_none());
        assert!(world.is_valid_move(GridPos::new(0, 0)));
        assert_occupancy_consistent(&world);
    }

    #[test]
    fn occupancy_stays_exclusive_across_add_move_remove() {
        let mut world = GridWorld::new("test", 4, 4, 1);
        let a = world.add_entity(rock(0, 0)).expect("add");
        let b = world.add_entity(rock(1, 0)).expect("add");
        let c = world.add_entity(rock(2, 2)).expect("add");

        assert!(world.is_valid_move(GridPos::new(0, 1)));
        world.move_entity(a, GridPos::new(0, 1));
        assert_occupancy_consistent(&world);

        world.remove_entity(b);
        assert!(world.is_valid_move(GridPos::new(1, 0)));
        world.move_entity(c, GridPos::new(1, 0));
        assert_occupancy_consistent(&world);

        let d = world.add_entity(rock(2, 2)).expect("freed cell");
        assert_eq!(world.entity(d).map(Entity::position), Some(GridPos::new(2, 2)));
        assert_occupancy_consistent(&world);
    }

    #[test]
    fn tick_rejects_bad_time_steps() {
        let mut world = GridWorld::new("test", 2, 2, 1);
        assert_eq!(world.tick(-0.1), Err(SimError::InvalidTimeStep(-0.1)));
        assert!(matches!(
            world.tick(f32::NAN),
            Err(SimError::InvalidTimeStep(_))
        ));
        assert_eq!(world.now_seconds(), 0.0);
        world.tick(0.0).expect("zero step");
        world.tick(0.5).expect("step");
        assert_eq!(world.now_seconds(), 0.5);
    }

    #[test]
    fn burn_kill_reports_loot_through_died_event() {
        let mut world = GridWorld::new("test", 2, 2, 1);
        let id = world
            .add_entity(rock(0, 0).with_drops(crate::sim::DropTable {
                experience: 7,
                ..Default::default()
            }))
            .expect("add");
        world
            .apply_status_effect(id, StatusEffect::burn(5.0, 10.0))
            .expect("burn");

        world.tick(1.0).expect("tick");
        assert!(world.entity(id).is_none());
        let died = world.last_tick_events().iter().find_map(|event| match event {
            SimEvent::EntityDied { entity_id, loot } if *entity_id == id => Some(loot.clone()),
            _ => None,
        });
        assert_eq!(died.map(|loot| loot.experience), Some(7));
        assert_occupancy_consistent(&world);
    }

    #[test]
    fn set_target_validation_aborts_on_invalid_targets() {
        let mut world = GridWorld::new("test", 4, 4, 1);
        let mob = world
            .add_entity(rock(0, 0).with_mob(MobProfile::default()))
            .expect("add");
        let plain = world.add_entity(rock(1, 0)).expect("add");

        assert!(matches!(
            world.set_target(mob, mob),
            Err(SimError::InvalidTarget { .. })
        ));
        assert!(matches!(
            world.set_target(plain, mob),
            Err(SimError::InvalidTarget { .. })
        ));
        assert!(matches!(
            world.set_target(mob, EntityId(99)),
            Err(SimError::InvalidTarget { .. })
        ));
        assert_eq!(world.entity(mob).and_then(Entity::target), None);

        world.set_target(mob, plain).expect("valid target");
        assert_eq!(world.entity(mob).and_then(Entity::target), Some(plain));
    }

    #[test]
    fn order_move_queues_path_without_start_cell() {
        let mut world = GridWorld::new("test", 5, 5, 1);
        let walker = world
            .add_entity(
                Entity::new("walker", 10.0)
                    .with_position(GridPos::new(0, 0))
                    .with_capabilities(crate::sim::Capabilities {
                        can_wander: false,
                        ..Default::default()
                    }),
            )
            .expect("add");
        let steps = world.order_move(walker, GridPos::new(3, 0)).expect("order");
        assert_eq!(steps, 3);
        let queued: Vec<GridPos> = world
            .entity(walker)
            .expect("walker")
            .queued_path()
            .copied()
            .collect();
        assert_eq!(
            queued,
            vec![GridPos::new(1, 0), GridPos::new(2, 0), GridPos::new(3, 0)]
        );
    }
}
