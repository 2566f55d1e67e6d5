//! Grid-world benchmark environments
use super::{BuildModel, Coordinates, EnvError, TabularMdp};
use ndarray::{Array1, Array2, Array3};
use serde::{Deserialize, Serialize};

/// Grid movement directions.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GridAction {
    Left,
    Down,
    Right,
    Up,
}

impl GridAction {
    /// Actions in index order.
    pub const ALL: [Self; 4] = [Self::Left, Self::Down, Self::Right, Self::Up];

    const fn offset(self) -> (isize, isize) {
        match self {
            Self::Left => (0, -1),
            Self::Down => (1, 0),
            Self::Right => (0, 1),
            Self::Up => (-1, 0),
        }
    }

    /// The two directions perpendicular to this one.
    const fn perpendicular(self) -> [Self; 2] {
        match self {
            Self::Left | Self::Right => [Self::Up, Self::Down],
            Self::Down | Self::Up => [Self::Left, Self::Right],
        }
    }
}

/// Rectangular grid geometry shared by the grid environments.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
struct Grid {
    rows: usize,
    cols: usize,
}

impl Grid {
    const fn num_cells(self) -> usize {
        self.rows * self.cols
    }

    const fn cell(self, row: usize, col: usize) -> usize {
        row * self.cols + col
    }

    const fn position(self, cell: usize) -> (usize, usize) {
        (cell / self.cols, cell % self.cols)
    }

    /// The cell reached by moving from `cell`; moves into a wall leave the position unchanged.
    fn neighbour(self, cell: usize, action: GridAction) -> usize {
        let (row, col) = self.position(cell);
        let (dr, dc) = action.offset();
        let clamp = |x: usize, dx: isize, len: usize| -> usize {
            match x.checked_add_signed(dx) {
                Some(y) if y < len => y,
                _ => x,
            }
        };
        self.cell(clamp(row, dr, self.rows), clamp(col, dc, self.cols))
    }

    /// Row and column normalized to `[0, 1)`.
    fn coordinates(self) -> Vec<Coordinates> {
        (0..self.num_cells())
            .map(|cell| {
                let (row, col) = self.position(cell);
                Coordinates::from_slice(&[
                    row as f64 / self.rows as f64,
                    col as f64 / self.cols as f64,
                ])
            })
            .collect()
    }
}

/// Cliff world.
///
/// The agent starts in the bottom-left corner and must reach the bottom-right corner.
/// The cells between them on the bottom row are a cliff: stepping into the cliff gives
/// `cliff_reward` and returns the agent to the start. Entering the goal gives `goal_reward`;
/// the goal is absorbing with zero reward afterwards. Moves are deterministic.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct CliffWorld {
    pub rows: usize,
    pub cols: usize,
    pub cliff_reward: f64,
    pub goal_reward: f64,
    pub discount_factor: f64,
}

impl Default for CliffWorld {
    fn default() -> Self {
        Self {
            rows: 3,
            cols: 7,
            cliff_reward: -100.0,
            goal_reward: 1.0,
            discount_factor: 0.9,
        }
    }
}

impl CliffWorld {
    const fn grid(&self) -> Grid {
        Grid {
            rows: self.rows,
            cols: self.cols,
        }
    }

    pub const fn start(&self) -> usize {
        self.grid().cell(self.rows - 1, 0)
    }

    pub const fn goal(&self) -> usize {
        self.grid().cell(self.rows - 1, self.cols - 1)
    }

    pub fn is_cliff(&self, cell: usize) -> bool {
        let (row, col) = self.grid().position(cell);
        row == self.rows - 1 && col > 0 && col < self.cols - 1
    }
}

impl BuildModel for CliffWorld {
    type Model = TabularMdp;

    fn build_model(&self) -> Result<TabularMdp, EnvError> {
        if self.rows < 1 || self.cols < 3 {
            return Err(EnvError::ShapeMismatch {
                name: "cliff world grid",
                got: vec![self.rows, self.cols],
                expected: vec![1, 3],
            });
        }
        let grid = self.grid();
        let num_states = grid.num_cells();
        let num_actions = GridAction::ALL.len();
        let mut transitions = Array3::zeros((num_states, num_actions, num_states));
        let mut rewards = Array2::zeros((num_states, num_actions));

        for state in 0..num_states {
            for (a, &action) in GridAction::ALL.iter().enumerate() {
                let (next, reward) = if state == self.goal() {
                    (state, 0.0)
                } else if self.is_cliff(state) {
                    // Never occupied from the start; treated like a fall
                    (self.start(), self.cliff_reward)
                } else {
                    let next = grid.neighbour(state, action);
                    if self.is_cliff(next) {
                        (self.start(), self.cliff_reward)
                    } else if next == self.goal() {
                        (next, self.goal_reward)
                    } else {
                        (next, 0.0)
                    }
                };
                transitions[(state, a, next)] = 1.0;
                rewards[(state, a)] = reward;
            }
        }

        let mut initial = Array1::zeros(num_states);
        initial[self.start()] = 1.0;
        TabularMdp::new(
            transitions,
            rewards,
            self.discount_factor,
            initial,
            grid.coordinates(),
        )
    }
}

/// Frozen lake.
///
/// Map rows use `S` (start), `F` (frozen), `H` (hole) and `G` (goal).
/// Reaching the goal gives reward 1; holes and the goal are absorbing with zero reward.
/// On slippery ice the agent moves in the intended direction or either perpendicular
/// direction with probability 1/3 each.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrozenLake {
    pub map: Vec<String>,
    pub slippery: bool,
    pub discount_factor: f64,
}

impl Default for FrozenLake {
    fn default() -> Self {
        Self {
            map: ["SFFF", "FHFH", "FFFH", "HFFG"]
                .iter()
                .map(|row| (*row).to_owned())
                .collect(),
            slippery: true,
            discount_factor: 0.9,
        }
    }
}

impl FrozenLake {
    fn tiles(&self) -> Result<(Grid, Vec<u8>), EnvError> {
        let rows = self.map.len();
        let cols = self.map.first().map_or(0, String::len);
        if rows == 0 || cols == 0 || self.map.iter().any(|row| row.len() != cols) {
            return Err(EnvError::ShapeMismatch {
                name: "frozen lake map",
                got: self.map.iter().map(String::len).collect(),
                expected: vec![cols; rows],
            });
        }
        let tiles = self.map.iter().flat_map(|row| row.bytes()).collect();
        Ok((Grid { rows, cols }, tiles))
    }
}

impl BuildModel for FrozenLake {
    type Model = TabularMdp;

    fn build_model(&self) -> Result<TabularMdp, EnvError> {
        let (grid, tiles) = self.tiles()?;
        let num_states = grid.num_cells();
        let num_actions = GridAction::ALL.len();
        let mut transitions = Array3::zeros((num_states, num_actions, num_states));
        let mut rewards = Array2::zeros((num_states, num_actions));

        for state in 0..num_states {
            for (a, &action) in GridAction::ALL.iter().enumerate() {
                if matches!(tiles[state], b'H' | b'G') {
                    transitions[(state, a, state)] = 1.0;
                    continue;
                }
                let outcomes: Vec<(GridAction, f64)> = if self.slippery {
                    let [p, q] = action.perpendicular();
                    vec![(action, 1.0 / 3.0), (p, 1.0 / 3.0), (q, 1.0 / 3.0)]
                } else {
                    vec![(action, 1.0)]
                };
                for (direction, prob) in outcomes {
                    let next = grid.neighbour(state, direction);
                    transitions[(state, a, next)] += prob;
                    if tiles[next] == b'G' {
                        rewards[(state, a)] += prob;
                    }
                }
            }
        }

        let starts = tiles.iter().filter(|t| **t == b'S').count();
        let mut initial = Array1::zeros(num_states);
        for (state, tile) in tiles.iter().enumerate() {
            if *tile == b'S' {
                initial[state] = 1.0 / starts as f64;
            }
        }
        TabularMdp::new(
            transitions,
            rewards,
            self.discount_factor,
            initial,
            grid.coordinates(),
        )
    }
}
