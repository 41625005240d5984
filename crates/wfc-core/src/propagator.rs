//! Arc-consistency engine: given a pattern removed at a cell, push that
//! removal's consequences through the neighbor graph until no more follow.
//!
//! The critical optimization is that `count[i][t][d]` tracks *how many*
//! still-possible neighbor patterns support `t` at `i` in direction `d`;
//! a removal only has to decrement counts and test against zero, never
//! rescan a whole neighborhood.

use tracing::{trace, warn};

use crate::direction::Direction;
use crate::wave::Wave;

/// `compat[t][d]` = patterns that may lie in direction `d` from pattern `t`.
pub type CompatTable = Vec<[Vec<usize>; 4]>;

#[derive(Debug)]
pub struct Propagator {
    width: usize,
    height: usize,
    num_patterns: usize,
    periodic: bool,
    compat: CompatTable,
    count: Vec<Vec<[u32; 4]>>,
    stack: Vec<(usize, usize)>,
}

impl Propagator {
    pub fn new(
        width: usize,
        height: usize,
        num_patterns: usize,
        periodic: bool,
        compat: CompatTable,
    ) -> Self {
        let count = Self::build_count(width, height, num_patterns, periodic, &compat);
        Self {
            width,
            height,
            num_patterns,
            periodic,
            compat,
            count,
            stack: Vec::with_capacity(width * height * num_patterns),
        }
    }

    fn build_count(
        width: usize,
        height: usize,
        num_patterns: usize,
        periodic: bool,
        compat: &CompatTable,
    ) -> Vec<Vec<[u32; 4]>> {
        let mut count = vec![vec![[0u32; 4]; num_patterns]; width * height];
        for i in 0..width * height {
            let x = i % width;
            let y = i / width;
            for d in Direction::ALL {
                let has_neighbor = Self::neighbor_index(x, y, width, height, periodic, d).is_some();
                for t in 0..num_patterns {
                    count[i][t][d.index()] = if has_neighbor {
                        compat[t][d.index()].len() as u32
                    } else {
                        0
                    };
                }
            }
        }
        count
    }

    fn neighbor_index(
        x: usize,
        y: usize,
        width: usize,
        height: usize,
        periodic: bool,
        d: Direction,
    ) -> Option<usize> {
        let nx = x as i32 + d.dx();
        let ny = y as i32 + d.dy();
        let (nx, ny) = if periodic {
            (nx.rem_euclid(width as i32), ny.rem_euclid(height as i32))
        } else {
            if nx < 0 || nx >= width as i32 || ny < 0 || ny >= height as i32 {
                return None;
            }
            (nx, ny)
        };
        Some(ny as usize * width + nx as usize)
    }

    /// Pushes `(i, t)` onto the work stack. The caller must have already
    /// removed `t` from cell `i`'s wave mask.
    pub fn add_to_propagate(&mut self, i: usize, t: usize) {
        self.stack.push((i, t));
    }

    /// Drains the work stack to a fixpoint. Returns `false` (and stops
    /// early) the moment any cell reaches zero remaining possibilities.
    pub fn propagate(&mut self, wave: &mut Wave) -> bool {
        while let Some((i, t)) = self.stack.pop() {
            let x = i % self.width;
            let y = i / self.width;

            for d in Direction::ALL {
                let Some(j) = Self::neighbor_index(x, y, self.width, self.height, self.periodic, d)
                else {
                    continue;
                };

                for &tp in &self.compat[t][d.index()] {
                    let c = &mut self.count[j][tp][d.opposite().index()];
                    if *c == 0 {
                        continue;
                    }
                    *c -= 1;
                    if *c == 0 && wave.get(j, tp) {
                        wave.remove(j, tp);
                        self.stack.push((j, tp));
                        trace!(cell = j, pattern = tp, "propagated removal");
                        if wave.remaining(j) == 0 {
                            warn!(cell = j, "contradiction during propagation");
                            self.stack.clear();
                            return false;
                        }
                    }
                }
            }
        }
        true
    }

    /// Rebuilds `count` from `compat` and clears the work stack, restoring
    /// the state as it was immediately after construction.
    pub fn reset(&mut self) {
        self.count = Self::build_count(
            self.width,
            self.height,
            self.num_patterns,
            self.periodic,
            &self.compat,
        );
        self.stack.clear();
    }

    pub fn compat(&self) -> &CompatTable {
        &self.compat
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wave::Wave;
    use pretty_assertions::assert_eq;

    /// Two patterns, only compatible with themselves in every direction —
    /// a 1D checkerboard-like constraint collapsed onto a 2-cell row.
    fn self_only_compat() -> CompatTable {
        vec![
            [vec![0], vec![0], vec![0], vec![0]],
            [vec![1], vec![1], vec![1], vec![1]],
        ]
    }

    #[test]
    fn non_periodic_boundary_counts_are_zero() {
        let prop = Propagator::new(2, 1, 2, false, self_only_compat());
        // cell 0 has no Left neighbor, cell 1 has no Right neighbor.
        assert_eq!(prop.count[0][0][Direction::Left.index()], 0);
        assert_eq!(prop.count[1][0][Direction::Right.index()], 0);
        assert_eq!(prop.count[0][0][Direction::Right.index()], 1);
    }

    #[test]
    fn propagate_forces_matching_neighbor() {
        let mut wave = Wave::new(2, 1, &[1.0, 1.0]).unwrap();
        let mut prop = Propagator::new(2, 1, 2, false, self_only_compat());
        wave.remove(0, 1);
        prop.add_to_propagate(0, 1);
        assert!(prop.propagate(&mut wave));
        assert_eq!(wave.possible(1), vec![0]);
    }

    #[test]
    fn propagate_detects_contradiction() {
        // Pattern 0 requires its Right neighbor to be pattern 1 and vice
        // versa; collapsing both cells to 0 is unsatisfiable.
        let compat = vec![
            [vec![], vec![], vec![1], vec![]],
            [vec![], vec![], vec![0], vec![]],
        ];
        let mut wave = Wave::new(2, 1, &[1.0, 1.0]).unwrap();
        let mut prop = Propagator::new(2, 1, 2, false, compat);
        wave.remove(1, 1);
        prop.add_to_propagate(1, 1);
        assert!(!prop.propagate(&mut wave));
        assert!(wave.has_contradiction());
    }

    #[test]
    fn reset_rebuilds_initial_counts() {
        let mut prop = Propagator::new(2, 1, 2, false, self_only_compat());
        prop.add_to_propagate(0, 1);
        prop.count[0][0][0] = 99;
        prop.reset();
        assert_eq!(prop.count[0][0][0], 0);
        assert!(prop.stack.is_empty());
    }
}
