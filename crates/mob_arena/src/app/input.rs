use mob_engine::{EntityId, GridPos, GridWorld, SimError};
use tracing::debug;

use super::scenario::CellSize;

/// What a click turned into for the controlled entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ClickOrder {
    Attack { target: EntityId },
    Move { goal: GridPos, steps: usize },
    Ignored,
}

/// Window pixel to grid cell. The origin is the top-left corner of cell (0, 0).
pub(crate) fn screen_to_cell(x_px: f32, y_px: f32, cell: CellSize) -> Option<GridPos> {
    if !x_px.is_finite() || !y_px.is_finite() || x_px < 0.0 || y_px < 0.0 {
        return None;
    }
    Some(GridPos::new(
        (x_px / cell.width).floor() as i32,
        (y_px / cell.height).floor() as i32,
    ))
}

/// Occupied cell: chase its occupant. Free cell: walk there along a planned path.
pub(crate) fn apply_click(
    world: &mut GridWorld,
    actor: EntityId,
    cell: GridPos,
) -> Result<ClickOrder, SimError> {
    if !world.grid().in_bounds(cell) {
        debug!(x = cell.x, y = cell.y, "click_outside_grid");
        return Ok(ClickOrder::Ignored);
    }
    match world.entity_at(cell).map(|entity| entity.id()) {
        Some(occupant) if occupant == actor => Ok(ClickOrder::Ignored),
        Some(target) => {
            world.order_attack(actor, target)?;
            Ok(ClickOrder::Attack { target })
        }
        None => {
            let steps = world.order_move(actor, cell)?;
            Ok(ClickOrder::Move { goal: cell, steps })
        }
    }
}
