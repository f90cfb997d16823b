mod grid;
mod grid_world;
mod nav;

pub use grid::{GridError, GridPos, OccupancyGrid};
pub use grid_world::GridWorld;
pub use nav::PathFinder;
