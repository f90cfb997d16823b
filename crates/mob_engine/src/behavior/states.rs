use rand::Rng;
use tracing::debug;

use crate::sim::EntityId;
use crate::world::{GridPos, GridWorld};

use super::{BehaviorKind, BehaviorState};

const CALM_AFTER_HIT_SECONDS: f64 = 2.0;
const WANDER_COOLDOWN_SECONDS: f64 = 30.0;
const BASE_WANDER_SECONDS: f64 = 10.0;
const FLEE_CALM_SECONDS: f64 = 5.0;
const FLEE_RECOVERY_FRACTION: f32 = 0.2;
const PATROL_OFFSETS: [(i32, i32); 4] = [(-1, -1), (1, -1), (1, 1), (-1, 1)];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IdleState;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WanderState {
    pub started_at: f64,
    pub duration_seconds: f64,
    pub last_move_at: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PatrolState {
    pub center: GridPos,
    pub waypoints: [GridPos; 4],
    pub next_waypoint: usize,
    pub since_last_move: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChaseState {
    /// Aggro range captured on entry, doubled when the target was fleeing.
    pub aggro_range: u32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AttackState {
    pub since_last_attack: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FleeState {
    pub attacker: Option<EntityId>,
}

fn store(world: &mut GridWorld, id: EntityId, state: BehaviorState) {
    if let Some(entity) = world.entity_mut(id) {
        entity.behavior = state;
    }
}

/// Mob with chase capability whose live target sits within its aggro range.
fn target_in_aggro(world: &GridWorld, id: EntityId) -> bool {
    let Some(entity) = world.entity(id) else {
        return false;
    };
    let Some(mob) = entity.mob.as_ref() else {
        return false;
    };
    if !entity.capabilities.can_chase {
        return false;
    }
    world.live_target(id).is_some_and(|target| {
        target.position().manhattan_distance(entity.position()) <= mob.aggro_range
    })
}

fn step_to(world: &mut GridWorld, id: EntityId, to: GridPos, action: &'static str) -> bool {
    if !world.is_valid_move(to) {
        return false;
    }
    world.move_entity(id, to);
    let now = world.now_seconds;
    if let Some(entity) = world.entity_mut(id) {
        entity.timers.last_move_at = Some(now);
        debug!(entity = %entity.name, x = to.x, y = to.y, action, "entity_stepped");
    }
    true
}

pub(super) fn exit_noop(_world: &mut GridWorld, _id: EntityId) {}

pub(super) fn enter_idle(_world: &mut GridWorld, _id: EntityId) -> BehaviorState {
    BehaviorState::Idle(IdleState)
}

pub(super) fn update_idle(world: &mut GridWorld, id: EntityId, _dt: f32) -> Option<BehaviorKind> {
    if target_in_aggro(world, id) {
        return Some(BehaviorKind::Chase);
    }

    let now = world.now_seconds;
    let entity = world.entity(id)?;
    if !entity.queued_path.is_empty() {
        follow_queued_path(world, id);
        return None;
    }
    if entity.timers.attacked_within(now, CALM_AFTER_HIT_SECONDS) {
        return None;
    }
    let wander_due = entity
        .timers
        .last_wander_at
        .map_or(true, |at| now - at >= WANDER_COOLDOWN_SECONDS);
    if !wander_due {
        return None;
    }
    if entity.capabilities.can_patrol && entity.mob.is_some() {
        Some(BehaviorKind::Patrol)
    } else if entity.capabilities.can_wander {
        Some(BehaviorKind::Wander)
    } else {
        None
    }
}

fn follow_queued_path(world: &mut GridWorld, id: EntityId) {
    let now = world.now_seconds;
    let Some(entity) = world.entity(id) else {
        return;
    };
    if !entity
        .timers
        .move_delay_elapsed(now, entity.move_delay_seconds())
    {
        return;
    }
    let Some(next) = entity.queued_path.front().copied() else {
        return;
    };

    let moved = step_to(world, id, next, "walk");
    let Some(entity) = world.entity_mut(id) else {
        return;
    };
    if moved {
        entity.queued_path.pop_front();
    } else {
        entity.queued_path.clear();
        debug!(entity = %entity.name, x = next.x, y = next.y, "queued_path_blocked");
    }
}

pub(super) fn enter_wander(world: &mut GridWorld, id: EntityId) -> BehaviorState {
    let now = world.now_seconds;
    let mut factor = 1.0f32;
    if let Some(entity) = world.entity_mut(id) {
        entity.timers.last_wander_at = Some(now);
        if entity.wandering_factor.is_finite() && entity.wandering_factor > 0.0 {
            factor = entity.wandering_factor;
        }
    }
    BehaviorState::Wander(WanderState {
        started_at: now,
        duration_seconds: BASE_WANDER_SECONDS * factor as f64,
        last_move_at: None,
    })
}

pub(super) fn update_wander(world: &mut GridWorld, id: EntityId, _dt: f32) -> Option<BehaviorKind> {
    if target_in_aggro(world, id) {
        return Some(BehaviorKind::Chase);
    }

    let now = world.now_seconds;
    let entity = world.entity(id)?;
    if entity.timers.attacked_within(now, CALM_AFTER_HIT_SECONDS) {
        return Some(BehaviorKind::Idle);
    }
    let BehaviorState::Wander(mut state) = entity.behavior.clone() else {
        return None;
    };
    let delay = entity.move_delay_seconds();
    let position = entity.position();

    let move_due = match state.last_move_at {
        None => delay.is_finite(),
        Some(last) => now - last >= delay,
    };
    if move_due {
        let neighbors = world.neighbors(position);
        if !neighbors.is_empty() {
            let pick = world.rng.gen_range(0..neighbors.len());
            if step_to(world, id, neighbors[pick], "wander") {
                state.last_move_at = Some(now);
            }
        }
    }

    let finished = now - state.started_at >= state.duration_seconds;
    store(world, id, BehaviorState::Wander(state));
    finished.then_some(BehaviorKind::Idle)
}

pub(super) fn enter_patrol(world: &mut GridWorld, id: EntityId) -> BehaviorState {
    let center = world
        .entity(id)
        .map(|entity| {
            entity
                .mob
                .as_ref()
                .and_then(|mob| mob.patrol_center)
                .unwrap_or(entity.position())
        })
        .unwrap_or_default();
    BehaviorState::Patrol(PatrolState {
        center,
        waypoints: PATROL_OFFSETS.map(|(dx, dy)| center.offset(dx, dy)),
        next_waypoint: 0,
        since_last_move: 0.0,
    })
}

pub(super) fn update_patrol(world: &mut GridWorld, id: EntityId, dt: f32) -> Option<BehaviorKind> {
    if target_in_aggro(world, id) {
        return Some(BehaviorKind::Chase);
    }

    let now = world.now_seconds;
    let entity = world.entity(id)?;
    if entity.timers.attacked_within(now, CALM_AFTER_HIT_SECONDS) {
        return Some(BehaviorKind::Idle);
    }
    let BehaviorState::Patrol(mut state) = entity.behavior.clone() else {
        return None;
    };
    let delay = entity.move_delay_seconds();
    let position = entity.position();

    state.since_last_move += dt;
    if state.since_last_move as f64 >= delay {
        let waypoint = state.waypoints[state.next_waypoint];
        if let Some(path) = world.find_path(position, waypoint) {
            if let Some(next) = path.get(1).copied() {
                step_to(world, id, next, "patrol");
            }
        }
        if world.entity(id).map(|entity| entity.position()) == Some(waypoint) {
            state.next_waypoint = (state.next_waypoint + 1) % state.waypoints.len();
        }
        state.since_last_move = 0.0;
    }

    store(world, id, BehaviorState::Patrol(state));
    None
}

pub(super) fn enter_chase(world: &mut GridWorld, id: EntityId) -> BehaviorState {
    let base = world
        .entity(id)
        .and_then(|entity| entity.mob.as_ref())
        .map_or(0, |mob| mob.aggro_range);
    let target_fleeing = world
        .live_target(id)
        .is_some_and(|target| target.behavior_kind() == BehaviorKind::Flee);
    let aggro_range = if target_fleeing {
        base.saturating_mul(2)
    } else {
        base
    };
    BehaviorState::Chase(ChaseState { aggro_range })
}

pub(super) fn update_chase(world: &mut GridWorld, id: EntityId, _dt: f32) -> Option<BehaviorKind> {
    let now = world.now_seconds;
    let entity = world.entity(id)?;
    let Some(mob) = entity.mob.as_ref() else {
        return Some(BehaviorKind::Idle);
    };
    let Some(target) = world.live_target(id) else {
        return Some(BehaviorKind::Idle);
    };
    let BehaviorState::Chase(state) = &entity.behavior else {
        return None;
    };

    let start = entity.position();
    let goal = target.position();
    let distance = start.manhattan_distance(goal);
    if distance <= mob.attack_range {
        return Some(BehaviorKind::Attack);
    }
    if distance > state.aggro_range {
        return Some(BehaviorKind::Idle);
    }
    if !entity
        .timers
        .move_delay_elapsed(now, entity.move_delay_seconds())
    {
        return None;
    }

    if let Some(path) = world.find_path(start, goal) {
        if let Some(next) = path.get(1).copied() {
            step_to(world, id, next, "chase");
        }
    }
    None
}

pub(super) fn enter_attack(_world: &mut GridWorld, _id: EntityId) -> BehaviorState {
    BehaviorState::Attack(AttackState {
        since_last_attack: 0.0,
    })
}

pub(super) fn update_attack(world: &mut GridWorld, id: EntityId, dt: f32) -> Option<BehaviorKind> {
    let entity = world.entity(id)?;
    let Some(mob) = entity.mob.as_ref() else {
        return Some(BehaviorKind::Idle);
    };
    let Some(target) = world.live_target(id) else {
        return Some(BehaviorKind::Idle);
    };
    if entity.position().manhattan_distance(target.position()) > mob.attack_range {
        return Some(BehaviorKind::Chase);
    }
    let BehaviorState::Attack(mut state) = entity.behavior.clone() else {
        return None;
    };

    let interval = mob.attack_interval_seconds();
    state.since_last_attack += dt;
    let swing = state.since_last_attack >= interval;
    if swing {
        state.since_last_attack -= interval;
    }
    store(world, id, BehaviorState::Attack(state));
    if swing {
        world.perform_attack(id);
    }
    None
}

pub(super) fn enter_flee(world: &mut GridWorld, id: EntityId) -> BehaviorState {
    BehaviorState::Flee(FleeState {
        attacker: world.entity(id).and_then(|entity| entity.attacker),
    })
}

pub(super) fn update_flee(world: &mut GridWorld, id: EntityId, _dt: f32) -> Option<BehaviorKind> {
    let now = world.now_seconds;
    let entity = world.entity(id)?;
    if !entity.timers.attacked_within(now, FLEE_CALM_SECONDS)
        || entity.health_fraction() > FLEE_RECOVERY_FRACTION
    {
        return Some(BehaviorKind::Idle);
    }
    let BehaviorState::Flee(state) = &entity.behavior else {
        return None;
    };
    let threat = state.attacker.and_then(|attacker| world.entity(attacker))?;

    let position = entity.position();
    let away = position.offset(
        (position.x - threat.position().x).signum(),
        (position.y - threat.position().y).signum(),
    );
    if away != position {
        step_to(world, id, away, "flee");
    }
    None
}
