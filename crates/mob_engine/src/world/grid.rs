use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::sim::EntityId;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GridPos {
    pub x: i32,
    pub y: i32,
}

impl GridPos {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn manhattan_distance(self, other: GridPos) -> u32 {
        self.x.abs_diff(other.x).saturating_add(self.y.abs_diff(other.y))
    }

    pub fn offset(self, dx: i32, dy: i32) -> GridPos {
        GridPos {
            x: self.x.saturating_add(dx),
            y: self.y.saturating_add(dy),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum GridError {
    #[error("position ({x}, {y}) is outside the {width}x{height} grid")]
    OutOfBounds {
        x: i32,
        y: i32,
        width: u32,
        height: u32,
    },
    #[error("cell ({x}, {y}) is already occupied by {occupant:?}")]
    CellOccupied { x: i32, y: i32, occupant: EntityId },
}

/// Occupancy convention:
/// - cell `(x, y)` lives at row-major index `y * width + x`.
/// - the table holds non-owning entity ids; the entity registry owns the entities.
#[derive(Debug, Clone, PartialEq)]
pub struct OccupancyGrid {
    width: u32,
    height: u32,
    cells: Vec<Option<EntityId>>,
}

impl OccupancyGrid {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            cells: vec![None; width as usize * height as usize],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    pub fn in_bounds(&self, pos: GridPos) -> bool {
        pos.x >= 0 && pos.y >= 0 && (pos.x as u32) < self.width && (pos.y as u32) < self.height
    }

    pub fn index_of(&self, pos: GridPos) -> Option<usize> {
        if !self.in_bounds(pos) {
            return None;
        }
        Some(pos.y as usize * self.width as usize + pos.x as usize)
    }

    pub fn occupant(&self, pos: GridPos) -> Option<EntityId> {
        self.index_of(pos).and_then(|index| self.cells[index])
    }

    /// In-bounds and empty. Never allocates.
    pub fn is_valid_move(&self, pos: GridPos) -> bool {
        self.index_of(pos)
            .is_some_and(|index| self.cells[index].is_none())
    }

    /// Empty orthogonal neighbours in canonical order: left, right, up, down.
    pub fn neighbors(&self, pos: GridPos) -> Vec<GridPos> {
        [
            pos.offset(-1, 0),
            pos.offset(1, 0),
            pos.offset(0, -1),
            pos.offset(0, 1),
        ]
        .into_iter()
        .filter(|candidate| self.is_valid_move(*candidate))
        .collect()
    }

    pub fn check_insert(&self, pos: GridPos) -> Result<usize, GridError> {
        let Some(index) = self.index_of(pos) else {
            return Err(GridError::OutOfBounds {
                x: pos.x,
                y: pos.y,
                width: self.width,
                height: self.height,
            });
        };
        if let Some(occupant) = self.cells[index] {
            return Err(GridError::CellOccupied {
                x: pos.x,
                y: pos.y,
                occupant,
            });
        }
        Ok(index)
    }

    pub fn place(&mut self, id: EntityId, pos: GridPos) -> Result<(), GridError> {
        let index = self.check_insert(pos)?;
        self.cells[index] = Some(id);
        Ok(())
    }

    /// Clears `pos` only if it still points at `id`.
    pub fn clear_if(&mut self, id: EntityId, pos: GridPos) -> bool {
        let Some(index) = self.index_of(pos) else {
            return false;
        };
        if self.cells[index] == Some(id) {
            self.cells[index] = None;
            true
        } else {
            false
        }
    }

    /// Unchecked relocation; callers confirm `to` with `is_valid_move` first.
    pub(crate) fn relocate(&mut self, id: EntityId, from: GridPos, to: GridPos) {
        self.clear_if(id, from);
        if let Some(index) = self.index_of(to) {
            self.cells[index] = Some(id);
        }
    }

    pub fn occupied_count(&self) -> usize {
        self.cells.iter().filter(|cell| cell.is_some()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn neighbors_follow_left_right_up_down_order() {
        let grid = OccupancyGrid::new(3, 3);
        let neighbors = grid.neighbors(GridPos::new(1, 1));
        assert_eq!(
            neighbors,
            vec![
                GridPos::new(0, 1),
                GridPos::new(2, 1),
                GridPos::new(1, 0),
                GridPos::new(1, 2),
            ]
        );
    }

    #[test]
    fn neighbors_skip_occupied_and_out_of_bounds_cells() {
        let mut grid = OccupancyGrid::new(3, 3);
        grid.place(EntityId(7), GridPos::new(1, 0)).expect("place");
        let neighbors = grid.neighbors(GridPos::new(0, 0));
        assert_eq!(neighbors, vec![GridPos::new(0, 1)]);
    }

    #[test]
    fn place_rejects_out_of_bounds_and_occupied() {
        let mut grid = OccupancyGrid::new(2, 2);
        assert_eq!(
            grid.place(EntityId(1), GridPos::new(2, 0)),
            Err(GridError::OutOfBounds {
                x: 2,
                y: 0,
                width: 2,
                height: 2
            })
        );
        assert_eq!(
            grid.place(EntityId(1), GridPos::new(-1, 0)),
            Err(GridError::OutOfBounds {
                x: -1,
                y: 0,
                width: 2,
                height: 2
            })
        );
        grid.place(EntityId(1), GridPos::new(1, 1)).expect("place");
        assert_eq!(
            grid.place(EntityId(2), GridPos::new(1, 1)),
            Err(GridError::CellOccupied {
                x: 1,
                y: 1,
                occupant: EntityId(1)
            })
        );
        assert_eq!(grid.occupant(GridPos::new(1, 1)), Some(EntityId(1)));
    }

    #[test]
    fn clear_if_ignores_stale_owner() {
        let mut grid = OccupancyGrid::new(2, 1);
        grid.place(EntityId(1), GridPos::new(0, 0)).expect("place");
        assert!(!grid.clear_if(EntityId(2), GridPos::new(0, 0)));
        assert_eq!(grid.occupant(GridPos::new(0, 0)), Some(EntityId(1)));
        assert!(grid.clear_if(EntityId(1), GridPos::new(0, 0)));
        assert!(grid.is_valid_move(GridPos::new(0, 0)));
    }

    #[test]
    fn relocate_moves_occupant() {
        let mut grid = OccupancyGrid::new(3, 1);
        grid.place(EntityId(4), GridPos::new(0, 0)).expect("place");
        grid.relocate(EntityId(4), GridPos::new(0, 0), GridPos::new(1, 0));
        assert_eq!(grid.occupant(GridPos::new(0, 0)), None);
        assert_eq!(grid.occupant(GridPos::new(1, 0)), Some(EntityId(4)));
        assert_eq!(grid.occupied_count(), 1);
    }
}
