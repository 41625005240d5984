//! The per-cell pattern-possibility table with incrementally maintained
//! Shannon entropy.
//!
//! This is the hot structure of the whole engine: `remove` is called for
//! every propagated constraint, so its memoized scalars (`sum`, `plogp_sum`,
//! `entropy`, `remaining`) are updated incrementally rather than recomputed
//! from the mask on every call.

use crate::error::{Result, WfcError};
use crate::random::Mulberry32;

/// Policy for choosing the next cell to collapse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Heuristic {
    Entropy,
    Mrv,
    Scanline,
}

/// Outcome of [`Wave::collapse`]: the chosen pattern and every pattern that
/// was removed as a side effect. The caller must push `(cell, t)` onto the
/// propagator for each entry in `removed`.
#[derive(Debug, Clone)]
pub struct Collapse {
    pub chosen: usize,
    pub removed: Vec<usize>,
}

#[derive(Debug)]
pub struct Wave {
    width: usize,
    height: usize,
    num_patterns: usize,

    weights: Vec<f64>,
    plogp: Vec<f64>,
    sum_weights: f64,
    starting_entropy: f64,
    noise_scale: f64,

    possible: Vec<Vec<bool>>,
    remaining: Vec<u32>,
    sum: Vec<f64>,
    plogp_sum: Vec<f64>,
    log_sum: Vec<f64>,
    entropy: Vec<f64>,

    scan_cursor: usize,
}

impl Wave {
    pub fn new(width: usize, height: usize, weights: &[f64]) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(WfcError::InvalidDimensions { width, height });
        }
        let sum_weights: f64 = weights.iter().sum();
        if sum_weights <= 0.0 {
            return Err(WfcError::ZeroWeightSum);
        }

        let plogp: Vec<f64> = weights
            .iter()
            .map(|&w| {
                if w > 0.0 {
                    let p = w / sum_weights;
                    p * p.ln()
                } else {
                    0.0
                }
            })
            .collect();
        let plogp_sum_total: f64 = plogp.iter().sum();
        let starting_entropy = sum_weights.ln() - plogp_sum_total;
        let noise_scale = weights
            .iter()
            .zip(&plogp)
            .filter(|(&w, _)| w > 0.0)
            .map(|(_, &pl)| pl.abs())
            .fold(f64::INFINITY, f64::min)
            / 2.0;

        let num_patterns = weights.len();
        let num_cells = width * height;

        Ok(Self {
            width,
            height,
            num_patterns,
            weights: weights.to_vec(),
            plogp,
            sum_weights,
            starting_entropy,
            noise_scale,
            possible: vec![vec![true; num_patterns]; num_cells],
            remaining: vec![num_patterns as u32; num_cells],
            sum: vec![sum_weights; num_cells],
            plogp_sum: vec![plogp_sum_total; num_cells],
            log_sum: vec![sum_weights.ln(); num_cells],
            entropy: vec![starting_entropy; num_cells],
            scan_cursor: 0,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn num_cells(&self) -> usize {
        self.width * self.height
    }

    pub fn num_patterns(&self) -> usize {
        self.num_patterns
    }

    pub fn get(&self, i: usize, t: usize) -> bool {
        self.possible[i][t]
    }

    pub fn possible(&self, i: usize) -> Vec<usize> {
        (0..self.num_patterns).filter(|&t| self.possible[i][t]).collect()
    }

    pub fn remaining(&self, i: usize) -> u32 {
        self.remaining[i]
    }

    pub fn entropy(&self, i: usize) -> f64 {
        self.entropy[i]
    }

    pub fn is_collapsed(&self, i: usize) -> bool {
        self.remaining[i] == 1
    }

    pub fn is_complete(&self) -> bool {
        self.remaining.iter().all(|&r| r == 1)
    }

    pub fn has_contradiction(&self) -> bool {
        self.remaining.iter().any(|&r| r == 0)
    }

    pub fn collapsed_count(&self) -> usize {
        self.remaining.iter().filter(|&&r| r == 1).count()
    }

    /// Idempotent: returns `false` if `t` was already absent from `i`.
    pub fn remove(&mut self, i: usize, t: usize) -> bool {
        if !self.possible[i][t] {
            return false;
        }
        self.possible[i][t] = false;
        self.plogp_sum[i] -= self.plogp[t];
        self.sum[i] -= self.weights[t];
        self.remaining[i] -= 1;

        if self.sum[i] > 0.0 {
            self.log_sum[i] = self.sum[i].ln();
            self.entropy[i] = self.log_sum[i] - self.plogp_sum[i] / self.sum[i];
        } else {
            self.entropy[i] = 0.0;
        }
        true
    }

    /// Draws a weighted-random still-possible pattern for cell `i` and bans
    /// every other still-possible pattern. Returns `None` if `i` already has
    /// zero possibilities (a prior contradiction).
    pub fn collapse(&mut self, i: usize, rng: &mut Mulberry32) -> Option<Collapse> {
        if self.remaining[i] == 0 {
            return None;
        }

        let target = rng.next() * self.sum[i];
        let mut acc = 0.0;
        let mut chosen = None;
        for t in 0..self.num_patterns {
            if self.possible[i][t] {
                acc += self.weights[t];
                if acc >= target {
                    chosen = Some(t);
                    break;
                }
            }
        }
        let chosen = chosen.unwrap_or_else(|| {
            (0..self.num_patterns)
                .rev()
                .find(|&t| self.possible[i][t])
                .expect("remaining[i] > 0 implies at least one possible pattern")
        });

        let mut removed = Vec::new();
        for t in 0..self.num_patterns {
            if t != chosen && self.possible[i][t] {
                self.remove(i, t);
                removed.push(t);
            }
        }

        Some(Collapse { chosen, removed })
    }

    /// Selects the next cell to collapse per `heuristic`.
    ///
    /// Returns `-1` once every cell is collapsed, `-2` if a contradiction is
    /// observed, otherwise the chosen cell index.
    pub fn select_cell(&mut self, heuristic: Heuristic, rng: &mut Mulberry32) -> i64 {
        match heuristic {
            Heuristic::Entropy => self.select_entropy(rng),
            Heuristic::Mrv => self.select_mrv(rng),
            Heuristic::Scanline => self.select_scanline(),
        }
    }

    fn select_entropy(&mut self, rng: &mut Mulberry32) -> i64 {
        let mut best: Option<usize> = None;
        let mut best_val = f64::INFINITY;
        let mut any_uncollapsed = false;

        for i in 0..self.num_cells() {
            if self.remaining[i] == 0 {
                return -2;
            }
            if self.remaining[i] == 1 {
                continue;
            }
            any_uncollapsed = true;

            let e = self.entropy[i];
            if e <= best_val {
                let noisy = e + rng.next() * self.noise_scale;
                if noisy < best_val {
                    best_val = noisy;
                    best = Some(i);
                }
            }
        }

        match best {
            Some(i) => i as i64,
            None => if any_uncollapsed { -2 } else { -1 },
        }
    }

    fn select_mrv(&mut self, rng: &mut Mulberry32) -> i64 {
        let mut best: Option<usize> = None;
        let mut best_remaining = u32::MAX;
        let mut ties = 0u32;
        let mut any_uncollapsed = false;

        for i in 0..self.num_cells() {
            let r = self.remaining[i];
            if r == 0 {
                return -2;
            }
            if r == 1 {
                continue;
            }
            any_uncollapsed = true;

            if r < best_remaining {
                best_remaining = r;
                best = Some(i);
                ties = 1;
            } else if r == best_remaining {
                ties += 1;
                if rng.next() < 1.0 / ties as f64 {
                    best = Some(i);
                }
            }
        }

        match best {
            Some(i) => i as i64,
            None => if any_uncollapsed { -2 } else { -1 },
        }
    }

    fn select_scanline(&mut self) -> i64 {
        let total = self.num_cells();
        while self.scan_cursor < total {
            let i = self.scan_cursor;
            self.scan_cursor += 1;
            if self.remaining[i] == 0 {
                return -2;
            }
            if self.remaining[i] > 1 {
                return i as i64;
            }
        }
        -1
    }

    /// Resets every cell back to the fully-unconstrained starting state.
    pub fn clear(&mut self) {
        let num_cells = self.num_cells();
        self.possible = vec![vec![true; self.num_patterns]; num_cells];
        self.remaining = vec![self.num_patterns as u32; num_cells];
        self.sum = vec![self.sum_weights; num_cells];
        self.plogp_sum = vec![self.plogp_sum_total(); num_cells];
        self.log_sum = vec![self.sum_weights.ln(); num_cells];
        self.entropy = vec![self.starting_entropy; num_cells];
        self.scan_cursor = 0;
    }

    fn plogp_sum_total(&self) -> f64 {
        self.plogp.iter().sum()
    }

    /// Recomputes `(remaining, sum, plogp_sum, entropy)` for cell `i` from the
    /// mask alone. Used by tests to check the memoized-scalar invariant.
    #[cfg(test)]
    fn recompute(&self, i: usize) -> (u32, f64, f64, f64) {
        let mut remaining = 0u32;
        let mut sum = 0.0;
        let mut plogp_sum = 0.0;
        for t in 0..self.num_patterns {
            if self.possible[i][t] {
                remaining += 1;
                sum += self.weights[t];
                plogp_sum += self.plogp[t];
            }
        }
        let entropy = if sum > 0.0 { sum.ln() - plogp_sum / sum } else { 0.0 };
        (remaining, sum, plogp_sum, entropy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn uniform_wave(cells: usize, patterns: usize) -> Wave {
        let w = (cells as f64).sqrt().ceil() as usize;
        Wave::new(w.max(1), cells.div_ceil(w.max(1)), &vec![1.0; patterns]).unwrap()
    }

    #[test]
    fn zero_weight_sum_rejected() {
        let err = Wave::new(2, 2, &[0.0, 0.0]).unwrap_err();
        assert_eq!(err, WfcError::ZeroWeightSum);
    }

    #[test]
    fn invalid_dimensions_rejected() {
        let err = Wave::new(0, 2, &[1.0]).unwrap_err();
        assert_eq!(err, WfcError::InvalidDimensions { width: 0, height: 2 });
    }

    #[test]
    fn remove_is_idempotent() {
        let mut wave = Wave::new(1, 1, &[1.0, 1.0, 1.0]).unwrap();
        assert!(wave.remove(0, 1));
        assert!(!wave.remove(0, 1));
    }

    #[test]
    fn memoized_scalars_match_recompute_after_each_remove() {
        let mut wave = Wave::new(1, 1, &[1.0, 2.0, 3.0, 4.0]).unwrap();
        for t in [2, 0, 3] {
            wave.remove(0, t);
            let (remaining, sum, plogp_sum, entropy) = wave.recompute(0);
            assert_eq!(wave.remaining(0), remaining);
            assert!((wave.sum[0] - sum).abs() < 1e-9);
            assert!((wave.plogp_sum[0] - plogp_sum).abs() < 1e-9);
            assert!((wave.entropy(0) - entropy).abs() < 1e-9);
        }
    }

    #[test]
    fn entropy_zero_once_collapsed_or_contradicted() {
        let mut wave = Wave::new(1, 1, &[1.0, 1.0]).unwrap();
        wave.remove(0, 0);
        assert_eq!(wave.entropy(0), 0.0);
        wave.remove(0, 1);
        assert_eq!(wave.entropy(0), 0.0);
        assert!(wave.has_contradiction());
    }

    #[test]
    fn collapse_leaves_exactly_one_possibility() {
        let mut wave = uniform_wave(9, 4);
        let mut rng = Mulberry32::new(7);
        let collapse = wave.collapse(0, &mut rng).unwrap();
        assert_eq!(wave.remaining(0), 1);
        assert!(wave.get(0, collapse.chosen));
        assert_eq!(collapse.removed.len(), 3);
    }

    #[test]
    fn entropy_heuristic_breaks_uniform_ties_by_seed_not_position() {
        // With no constraints every cell has identical entropy, so the
        // first pick is pure noise tie-break — it must not always land on
        // the same cell regardless of seed.
        let mut picks = std::collections::HashSet::new();
        for seed in 0..8 {
            let mut wave = uniform_wave(9, 4);
            let mut rng = Mulberry32::new(seed);
            picks.insert(wave.select_cell(Heuristic::Entropy, &mut rng));
        }
        assert!(picks.len() > 1, "entropy heuristic picked the same cell for every seed");
    }

    #[test]
    fn scanline_is_left_to_right_top_to_bottom_with_no_wrap() {
        let mut wave = Wave::new(3, 2, &[1.0, 1.0]).unwrap();
        let mut rng = Mulberry32::new(1);
        let mut order = Vec::new();
        loop {
            let cell = wave.select_cell(Heuristic::Scanline, &mut rng);
            if cell < 0 {
                break;
            }
            order.push(cell as usize);
            wave.collapse(cell as usize, &mut rng);
        }
        assert_eq!(order, vec![0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn clear_restores_starting_state() {
        let mut wave = Wave::new(2, 2, &[1.0, 2.0]).unwrap();
        wave.remove(0, 0);
        wave.remove(1, 1);
        wave.clear();
        for i in 0..4 {
            assert_eq!(wave.remaining(i), 2);
            assert_eq!(wave.entropy(i), wave.starting_entropy);
        }
    }
}
