//! Per-entity finite-state controller.
//!
//! States are a closed set. Each [`BehaviorKind`] indexes one row of a handler table holding its
//! `enter`, `update` and `exit` functions. `update` never switches state itself; it returns the
//! requested next kind and the controller performs `exit` then `enter` before anything else runs.

mod states;

use tracing::debug;

use crate::sim::{EntityId, SimEvent};
use crate::world::GridWorld;

pub use states::{AttackState, ChaseState, FleeState, IdleState, PatrolState, WanderState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BehaviorKind {
    Idle,
    Wander,
    Patrol,
    Chase,
    Attack,
    Flee,
}

impl BehaviorKind {
    pub const ALL: [BehaviorKind; 6] = [
        BehaviorKind::Idle,
        BehaviorKind::Wander,
        BehaviorKind::Patrol,
        BehaviorKind::Chase,
        BehaviorKind::Attack,
        BehaviorKind::Flee,
    ];

    fn index(self) -> usize {
        match self {
            Self::Idle => 0,
            Self::Wander => 1,
            Self::Patrol => 2,
            Self::Chase => 3,
            Self::Attack => 4,
            Self::Flee => 5,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Wander => "wander",
            Self::Patrol => "patrol",
            Self::Chase => "chase",
            Self::Attack => "attack",
            Self::Flee => "flee",
        }
    }
}

/// Active state plus the data captured when it was entered.
#[derive(Debug, Clone, PartialEq)]
pub enum BehaviorState {
    Idle(IdleState),
    Wander(WanderState),
    Patrol(PatrolState),
    Chase(ChaseState),
    Attack(AttackState),
    Flee(FleeState),
}

impl BehaviorState {
    pub fn kind(&self) -> BehaviorKind {
        match self {
            Self::Idle(_) => BehaviorKind::Idle,
            Self::Wander(_) => BehaviorKind::Wander,
            Self::Patrol(_) => BehaviorKind::Patrol,
            Self::Chase(_) => BehaviorKind::Chase,
            Self::Attack(_) => BehaviorKind::Attack,
            Self::Flee(_) => BehaviorKind::Flee,
        }
    }
}

type EnterFn = fn(&mut GridWorld, EntityId) -> BehaviorState;
type UpdateFn = fn(&mut GridWorld, EntityId, f32) -> Option<BehaviorKind>;
type ExitFn = fn(&mut GridWorld, EntityId);

struct StateHandlers {
    enter: EnterFn,
    update: UpdateFn,
    exit: ExitFn,
}

static HANDLERS: [StateHandlers; 6] = [
    StateHandlers {
        enter: states::enter_idle,
        update: states::update_idle,
        exit: states::exit_noop,
    },
    StateHandlers {
        enter: states::enter_wander,
        update: states::update_wander,
        exit: states::exit_noop,
    },
    StateHandlers {
        enter: states::enter_patrol,
        update: states::update_patrol,
        exit: states::exit_noop,
    },
    StateHandlers {
        enter: states::enter_chase,
        update: states::update_chase,
        exit: states::exit_noop,
    },
    StateHandlers {
        enter: states::enter_attack,
        update: states::update_attack,
        exit: states::exit_noop,
    },
    StateHandlers {
        enter: states::enter_flee,
        update: states::update_flee,
        exit: states::exit_noop,
    },
];

fn handlers(kind: BehaviorKind) -> &'static StateHandlers {
    &HANDLERS[kind.index()]
}

pub(crate) fn initial_state() -> BehaviorState {
    BehaviorState::Idle(IdleState)
}

/// Runs the active state's `update` and applies the transition it asks for.
pub(crate) fn update(world: &mut GridWorld, id: EntityId, dt: f32) {
    let Some(kind) = world.entity(id).map(|entity| entity.behavior.kind()) else {
        return;
    };
    if let Some(next) = (handlers(kind).update)(world, id, dt) {
        transition(world, id, next);
    }
}

/// `exit` on the leaving state, then `enter` on `next`.
pub(crate) fn transition(world: &mut GridWorld, id: EntityId, next: BehaviorKind) {
    let Some(from) = world.entity(id).map(|entity| entity.behavior.kind()) else {
        return;
    };
    (handlers(from).exit)(world, id);
    let state = (handlers(next).enter)(world, id);
    let Some(entity) = world.entity_mut(id) else {
        return;
    };
    entity.behavior = state;
    debug!(
        entity = %entity.name,
        from = from.as_str(),
        to = next.as_str(),
        "state_changed"
    );
    world.events.emit(SimEvent::StateChanged {
        entity_id: id,
        from,
        to: next,
    });
}

#[cfg(test)]
mod tests {
    include!("tests.rs");
}
