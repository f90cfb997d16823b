use crate::behavior::BehaviorKind;
use crate::world::GridPos;

use super::entity::EntityId;
use super::loot::Loot;

#[derive(Debug, Clone, PartialEq)]
pub enum SimEvent {
    EntityAdded {
        entity_id: EntityId,
        position: GridPos,
    },
    EntityRemoved {
        entity_id: EntityId,
    },
    EntityMoved {
        entity_id: EntityId,
        from: GridPos,
        to: GridPos,
    },
    EntityDamaged {
        entity_id: EntityId,
        attacker_id: Option<EntityId>,
        amount: f32,
        from_status_effect: bool,
    },
    EntityDied {
        entity_id: EntityId,
        loot: Loot,
    },
    EntityRegenerated {
        entity_id: EntityId,
        amount: f32,
    },
    StateChanged {
        entity_id: EntityId,
        from: BehaviorKind,
        to: BehaviorKind,
    },
    StatusApplied {
        entity_id: EntityId,
        effect_id: String,
    },
    StatusExpired {
        entity_id: EntityId,
        effect_id: String,
    },
    TargetAssigned {
        entity_id: EntityId,
        target_id: EntityId,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimEventKind {
    EntityAdded,
    EntityRemoved,
    EntityMoved,
    EntityDamaged,
    EntityDied,
    EntityRegenerated,
    StateChanged,
    StatusApplied,
    StatusExpired,
    TargetAssigned,
}

impl SimEvent {
    pub fn kind(&self) -> SimEventKind {
        match self {
            Self::EntityAdded { .. } => SimEventKind::EntityAdded,
            Self::EntityRemoved { .. } => SimEventKind::EntityRemoved,
            Self::EntityMoved { .. } => SimEventKind::EntityMoved,
            Self::EntityDamaged { .. } => SimEventKind::EntityDamaged,
            Self::EntityDied { .. } => SimEventKind::EntityDied,
            Self::EntityRegenerated { .. } => SimEventKind::EntityRegenerated,
            Self::StateChanged { .. } => SimEventKind::StateChanged,
            Self::StatusApplied { .. } => SimEventKind::StatusApplied,
            Self::StatusExpired { .. } => SimEventKind::StatusExpired,
            Self::TargetAssigned { .. } => SimEventKind::TargetAssigned,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SimEventCounts {
    pub total: u32,
    pub entity_added: u32,
    pub entity_removed: u32,
    pub entity_moved: u32,
    pub entity_damaged: u32,
    pub entity_died: u32,
    pub entity_regenerated: u32,
    pub state_changed: u32,
    pub status_applied: u32,
    pub status_expired: u32,
    pub target_assigned: u32,
}

impl SimEventCounts {
    fn record(&mut self, kind: SimEventKind) {
        self.total = self.total.saturating_add(1);
        let slot = match kind {
            SimEventKind::EntityAdded => &mut self.entity_added,
            SimEventKind::EntityRemoved => &mut self.entity_removed,
            SimEventKind::EntityMoved => &mut self.entity_moved,
            SimEventKind::EntityDamaged => &mut self.entity_damaged,
            SimEventKind::EntityDied => &mut self.entity_died,
            SimEventKind::EntityRegenerated => &mut self.entity_regenerated,
            SimEventKind::StateChanged => &mut self.state_changed,
            SimEventKind::StatusApplied => &mut self.status_applied,
            SimEventKind::StatusExpired => &mut self.status_expired,
            SimEventKind::TargetAssigned => &mut self.target_assigned,
        };
        *slot = slot.saturating_add(1);
    }
}

/// Events emitted between two rollovers belong to the tick that ends with the second one.
#[derive(Debug, Default)]
pub struct SimEventBus {
    current_tick_events: Vec<SimEvent>,
    last_tick_events: Vec<SimEvent>,
    last_tick_counts: SimEventCounts,
}

impl SimEventBus {
    pub fn emit(&mut self, event: SimEvent) {
        self.current_tick_events.push(event);
    }

    pub fn iter_emitted_so_far(&self) -> impl Iterator<Item = &SimEvent> {
        self.current_tick_events.iter()
    }

    pub fn finish_tick_rollover(&mut self) {
        let mut counts = SimEventCounts::default();
        for event in &self.current_tick_events {
            counts.record(event.kind());
        }
        self.last_tick_counts = counts;
        self.last_tick_events = std::mem::take(&mut self.current_tick_events);
    }

    pub fn last_tick_events(&self) -> &[SimEvent] {
        &self.last_tick_events
    }

    pub fn last_tick_counts(&self) -> SimEventCounts {
        self.last_tick_counts
    }
}
