//! Simple Tiled Model: builds a propagator from an explicit tileset and
//! neighbor rules (rather than extracting patterns from a sample) and
//! renders by stamping or blending `tile_side x tile_side` tile images.

use tracing::{debug, info};

use crate::error::Result;
use crate::model::{EntropyCell, ModelState, StepResult};
use crate::propagator::Propagator;
use crate::random::Mulberry32;
use crate::tileset::{self, NeighborRule, TileDef};
use crate::wave::{Heuristic, Wave};

#[derive(Clone)]
pub struct TiledOptions {
    pub periodic: bool,
    pub heuristic: Heuristic,
    pub seed: u32,
    pub width: usize,
    pub height: usize,
    /// When true, an uncollapsed cell renders as opaque black instead of a
    /// weighted blend of its still-possible tiles.
    pub black_background: bool,
}

pub struct SimpleTiledModel {
    options: TiledOptions,
    tile_side: usize,
    variant_pixels: Vec<Vec<u32>>,
    weights: Vec<f64>,
    wave: Wave,
    propagator: Propagator,
    rng: Mulberry32,
    last_collapsed: Option<usize>,
}

impl SimpleTiledModel {
    pub fn new(
        tiles: &[TileDef],
        rules: &[NeighborRule],
        options: TiledOptions,
    ) -> Result<Self> {
        Self::with_subset(tiles, rules, None, options)
    }

    /// Like [`Self::new`], but restricts the tileset to the named subset
    /// before assembling the propagator — the "optional subset filter by
    /// tile name" construction input.
    pub fn with_subset(
        tiles: &[TileDef],
        rules: &[NeighborRule],
        subset: Option<&[String]>,
        options: TiledOptions,
    ) -> Result<Self> {
        if options.width == 0 || options.height == 0 {
            return Err(crate::error::WfcError::InvalidDimensions {
                width: options.width,
                height: options.height,
            });
        }

        let data = tileset::assemble(tiles, rules, subset)?;
        info!(
            variants = data.weights.len(),
            tiles = tiles.len(),
            "assembled tileset"
        );

        let wave = Wave::new(options.width, options.height, &data.weights)?;
        let propagator = Propagator::new(
            options.width,
            options.height,
            data.weights.len(),
            options.periodic,
            data.compat,
        );

        Ok(Self {
            rng: Mulberry32::new(options.seed),
            options,
            tile_side: data.tile_side,
            variant_pixels: data.variant_pixels,
            weights: data.weights,
            wave,
            propagator,
            last_collapsed: None,
        })
    }

    pub fn step(&mut self) -> StepResult {
        if self.wave.has_contradiction() {
            return StepResult::Failure;
        }
        if self.wave.is_complete() {
            return StepResult::Success;
        }

        match self.wave.select_cell(self.options.heuristic, &mut self.rng) {
            -1 => StepResult::Success,
            -2 => StepResult::Failure,
            cell => {
                let cell = cell as usize;
                self.last_collapsed = Some(cell);
                let Some(collapse) = self.wave.collapse(cell, &mut self.rng) else {
                    return StepResult::Failure;
                };
                for t in collapse.removed {
                    self.propagator.add_to_propagate(cell, t);
                }
                debug!(cell, pattern = collapse.chosen, "collapsed cell");
                if !self.propagator.propagate(&mut self.wave) {
                    return StepResult::Failure;
                }
                if self.wave.is_complete() {
                    StepResult::Success
                } else {
                    StepResult::Continue
                }
            }
        }
    }

    pub fn run(&mut self, max_steps: usize) -> bool {
        for _ in 0..max_steps {
            match self.step() {
                StepResult::Success => return true,
                StepResult::Failure => return false,
                StepResult::Continue => {}
            }
        }
        self.wave.is_complete()
    }

    pub fn clear(&mut self) {
        self.wave.clear();
        self.propagator.reset();
        self.last_collapsed = None;
    }

    pub fn get_state(&self) -> ModelState {
        ModelState {
            total_cells: self.wave.num_cells(),
            collapsed_count: self.wave.collapsed_count(),
            pattern_count: self.wave.num_patterns(),
            is_complete: self.wave.is_complete(),
            has_contradiction: self.wave.has_contradiction(),
        }
    }

    pub fn get_entropy_data(&self) -> Vec<EntropyCell> {
        (0..self.wave.num_cells())
            .map(|i| EntropyCell {
                entropy: self.wave.entropy(i),
                remaining: self.wave.remaining(i),
                collapsed: self.wave.is_collapsed(i),
            })
            .collect()
    }

    pub fn last_collapsed(&self) -> Option<usize> {
        self.last_collapsed
    }

    pub fn tile_side(&self) -> usize {
        self.tile_side
    }

    /// Renders the current wave into an image `tile_side*width x
    /// tile_side*height` pixels wide/tall, packed little-endian
    /// `R | G<<8 | B<<16 | 0xFF<<24`. Uncollapsed cells blend the
    /// still-possible variants' pixels.
    pub fn render(&self, out: &mut [u32]) {
        let width = self.options.width;
        let height = self.options.height;
        let ts = self.tile_side;
        let out_width = width * ts;
        debug_assert_eq!(out.len(), out_width * height * ts);

        for cy in 0..height {
            for cx in 0..width {
                let cell = cy * width + cx;
                let possible = self.wave.possible(cell);
                for py in 0..ts {
                    for px in 0..ts {
                        let color = if possible.len() == 1 {
                            self.variant_pixels[possible[0]][px + py * ts]
                        } else if self.options.black_background {
                            0xFF000000
                        } else {
                            self.blend(&possible, px, py, ts)
                        };
                        let ox = cx * ts + px;
                        let oy = cy * ts + py;
                        out[oy * out_width + ox] = color;
                    }
                }
            }
        }
    }

    /// Weighted blend per spec: each still-possible tile contributes its
    /// pixel channels scaled by `w_t / Σ w_t` over the possible set — not a
    /// uniform average, so a heavily-weighted tile dominates the preview.
    fn blend(&self, possible: &[usize], px: usize, py: usize, ts: usize) -> u32 {
        let total: f64 = possible.iter().map(|&t| self.weights[t]).sum();
        if possible.is_empty() || total <= 0.0 {
            return 0xFF000000;
        }
        let mut r = 0.0f64;
        let mut g = 0.0f64;
        let mut b = 0.0f64;
        for &t in possible {
            let color = self.variant_pixels[t][px + py * ts];
            let w = self.weights[t] / total;
            r += (color & 0xFF) as f64 * w;
            g += (((color >> 8) & 0xFF) as f64) * w;
            b += (((color >> 16) & 0xFF) as f64) * w;
        }
        (r.round() as u32) | ((g.round() as u32) << 8) | ((b.round() as u32) << 16) | 0xFF000000
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tileset::SymmetryClass;
    use pretty_assertions::assert_eq;

    fn solid(name: &str, color: u32) -> TileDef {
        TileDef {
            name: name.to_string(),
            symmetry: SymmetryClass::X,
            weight: 1.0,
            pixels: vec![color; 4],
        }
    }

    fn two_color_rules() -> (Vec<TileDef>, Vec<NeighborRule>) {
        let tiles = vec![solid("a", 0xFFFF0000), solid("b", 0xFF0000FF)];
        let rules = vec![
            NeighborRule { left: "a".into(), left_variant: 0, right: "b".into(), right_variant: 0 },
            NeighborRule { left: "b".into(), left_variant: 0, right: "a".into(), right_variant: 0 },
        ];
        (tiles, rules)
    }

    fn options(width: usize, height: usize, seed: u32) -> TiledOptions {
        TiledOptions {
            periodic: true,
            heuristic: Heuristic::Entropy,
            seed,
            width,
            height,
            black_background: false,
        }
    }

    #[test]
    fn strict_two_coloring_collapses_without_contradiction() {
        let (tiles, rules) = two_color_rules();
        let mut model = SimpleTiledModel::new(&tiles, &rules, options(6, 6, 5)).unwrap();
        assert!(model.run(10_000));
        assert!(!model.get_state().has_contradiction);
        assert!(model.get_state().is_complete);
    }

    #[test]
    fn collapsed_grid_strictly_alternates_horizontally() {
        let (tiles, rules) = two_color_rules();
        let mut model = SimpleTiledModel::new(&tiles, &rules, options(6, 2, 9)).unwrap();
        assert!(model.run(10_000));

        for y in 0..2 {
            for x in 0..6 {
                let cell = y * 6 + x;
                let right = y * 6 + (x + 1) % 6;
                assert_ne!(
                    model.wave.possible(cell),
                    model.wave.possible(right),
                    "adjacent cells collapsed to the same tile"
                );
            }
        }
    }

    #[test]
    fn four_tile_strict_two_coloring_produces_alternating_pattern() {
        // A, C are one color class; B, D are the other. Every cross-class
        // pair is a valid neighbor, every same-class pair is not.
        let tiles = vec![
            solid("a", 0xFFFF0000),
            solid("b", 0xFF00FF00),
            solid("c", 0xFF0000FF),
            solid("d", 0xFFFFFF00),
        ];
        let class = |name: &str| matches!(name, "a" | "c");
        let mut rules = Vec::new();
        for left in ["a", "b", "c", "d"] {
            for right in ["a", "b", "c", "d"] {
                if class(left) != class(right) {
                    rules.push(NeighborRule {
                        left: left.into(),
                        left_variant: 0,
                        right: right.into(),
                        right_variant: 0,
                    });
                }
            }
        }

        let mut model = SimpleTiledModel::new(&tiles, &rules, options(6, 6, 7)).unwrap();
        assert!(model.run(10_000));
        assert!(!model.get_state().has_contradiction);

        let name_of = |variant: usize| match variant {
            0 => "a",
            1 => "b",
            2 => "c",
            3 => "d",
            _ => unreachable!(),
        };
        for y in 0..6 {
            for x in 0..6 {
                let cell = y * 6 + x;
                let right = y * 6 + (x + 1) % 6;
                let down = ((y + 1) % 6) * 6 + x;
                let this_class = class(name_of(model.wave.possible(cell)[0]));
                assert_ne!(this_class, class(name_of(model.wave.possible(right)[0])));
                assert_ne!(this_class, class(name_of(model.wave.possible(down)[0])));
            }
        }
    }

    #[test]
    fn render_fills_every_output_pixel() {
        let (tiles, rules) = two_color_rules();
        let mut model = SimpleTiledModel::new(&tiles, &rules, options(2, 2, 1)).unwrap();
        model.run(1_000);
        let ts = model.tile_side();
        let mut out = vec![0u32; (2 * ts) * (2 * ts)];
        model.render(&mut out);
        assert!(out.iter().all(|&p| p & 0xFF000000 == 0xFF000000));
    }

    #[test]
    fn black_background_stamps_uncollapsed_cells_opaque_black() {
        let (tiles, rules) = two_color_rules();
        let mut opts = options(2, 2, 1);
        opts.black_background = true;
        let mut model = SimpleTiledModel::new(&tiles, &rules, opts).unwrap();
        // Deliberately do not run: every cell stays uncollapsed, so every
        // stamped pixel must be opaque black rather than a blend.
        let ts = model.tile_side();
        let mut out = vec![0u32; (2 * ts) * (2 * ts)];
        model.render(&mut out);
        assert!(out.iter().all(|&p| p == 0xFF000000));
    }

    #[test]
    fn subset_filter_restricts_the_variant_set() {
        let tiles = vec![
            solid("a", 0xFFFF0000),
            solid("b", 0xFF0000FF),
            solid("c", 0xFF00FF00),
        ];
        let rules = vec![NeighborRule { left: "a".into(), left_variant: 0, right: "b".into(), right_variant: 0 }];
        let subset = vec!["a".to_string(), "b".to_string()];
        let model =
            SimpleTiledModel::with_subset(&tiles, &rules, Some(&subset), options(4, 4, 2)).unwrap();
        assert_eq!(model.get_state().pattern_count, 2);
    }

    #[test]
    fn zero_width_is_rejected() {
        let (tiles, rules) = two_color_rules();
        let mut opts = options(1, 1, 1);
        opts.width = 0;
        let err = SimpleTiledModel::new(&tiles, &rules, opts).unwrap_err();
        assert_eq!(
            err,
            crate::error::WfcError::InvalidDimensions { width: 0, height: 1 }
        );
    }
}
