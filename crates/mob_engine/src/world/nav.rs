use super::grid::{GridPos, OccupancyGrid};

#[derive(Debug, Clone, Copy)]
struct PathNode {
    pos: GridPos,
    g_cost: u32,
    h_cost: u32,
    f_cost: u32,
    parent: Option<usize>,
}

/// Stateless A* over the currently empty cells of an [`OccupancyGrid`].
#[derive(Debug, Clone, Copy)]
pub struct PathFinder<'a> {
    grid: &'a OccupancyGrid,
}

impl<'a> PathFinder<'a> {
    pub fn new(grid: &'a OccupancyGrid) -> Self {
        Self { grid }
    }

    /// Returns `start..=goal` when the goal is free and reachable. Otherwise returns the path to
    /// the explored node closest to the goal by heuristic. `None` only when `start` is off-grid.
    pub fn find_path(&self, start: GridPos, goal: GridPos) -> Option<Vec<GridPos>> {
        self.grid.index_of(start)?;

        let cell_count = self.grid.cell_count();
        let mut nodes = Vec::<PathNode>::new();
        let mut node_by_cell = vec![None::<usize>; cell_count];
        let mut closed = vec![false; cell_count];
        let mut open = Vec::<usize>::new();

        let start_h = start.manhattan_distance(goal);
        nodes.push(PathNode {
            pos: start,
            g_cost: 0,
            h_cost: start_h,
            f_cost: start_h,
            parent: None,
        });
        open.push(0);
        if let Some(start_index) = self.grid.index_of(start) {
            node_by_cell[start_index] = Some(0);
        }
        let mut best_node = 0usize;

        while !open.is_empty() {
            let open_slot = pick_lowest_f_slot(&nodes, &open);
            let current_id = open[open_slot];
            let current = nodes[current_id];

            if current.pos == goal && self.grid.is_valid_move(goal) {
                return Some(reconstruct_path(&nodes, current_id));
            }

            open.remove(open_slot);
            if let Some(cell) = self.grid.index_of(current.pos) {
                closed[cell] = true;
            }
            if current.h_cost < nodes[best_node].h_cost {
                best_node = current_id;
            }

            for neighbor in self.grid.neighbors(current.pos) {
                let Some(cell) = self.grid.index_of(neighbor) else {
                    continue;
                };
                if closed[cell] {
                    continue;
                }

                let tentative_g = current.g_cost.saturating_add(1);
                match node_by_cell[cell] {
                    None => {
                        let h_cost = neighbor.manhattan_distance(goal);
                        nodes.push(PathNode {
                            pos: neighbor,
                            g_cost: tentative_g,
                            h_cost,
                            f_cost: tentative_g.saturating_add(h_cost),
                            parent: Some(current_id),
                        });
                        let node_id = nodes.len() - 1;
                        node_by_cell[cell] = Some(node_id);
                        open.push(node_id);
                    }
                    Some(node_id) => {
                        let node = &mut nodes[node_id];
                        if tentative_g < node.g_cost {
                            node.g_cost = tentative_g;
                            node.f_cost = tentative_g.saturating_add(node.h_cost);
                            node.parent = Some(current_id);
                        }
                    }
                }
            }
        }

        Some(reconstruct_path(&nodes, best_node))
    }
}

fn pick_lowest_f_slot(nodes: &[PathNode], open: &[usize]) -> usize {
    let mut best_slot = 0usize;
    for slot in 1..open.len() {
        if nodes[open[slot]].f_cost < nodes[open[best_slot]].f_cost {
            best_slot = slot;
        }
    }
    best_slot
}

fn reconstruct_path(nodes: &[PathNode], end: usize) -> Vec<GridPos> {
    let mut path = Vec::new();
    let mut cursor = Some(end);
    while let Some(node_id) = cursor {
        let node = nodes[node_id];
        path.push(node.pos);
        cursor = node.parent;
    }
    path.reverse();
    path
}
