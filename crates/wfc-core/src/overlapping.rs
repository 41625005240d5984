//! Overlapping model: extracts `N x N` patterns from a color-indexed
//! sample (with optional symmetry variants), builds an overlap-agreement
//! propagator, and renders by blending still-possible patterns.

use std::collections::HashMap;

use tracing::{debug, info};

use crate::direction::Direction;
use crate::error::{Result, WfcError};
use crate::model::{EntropyCell, ModelState, StepResult};
use crate::propagator::{CompatTable, Propagator};
use crate::random::Mulberry32;
use crate::wave::{Heuristic, Wave};

/// A packed-color index into the deduplicated sample palette.
type ColorIndex = u16;

#[derive(Clone)]
pub struct OverlappingOptions {
    pub pattern_size: usize,
    pub symmetry: u8,
    pub periodic_input: bool,
    pub periodic: bool,
    pub ground: bool,
    pub heuristic: Heuristic,
    pub seed: u32,
    pub width: usize,
    pub height: usize,
}

pub struct OverlappingModel {
    options: OverlappingOptions,
    n: usize,
    palette: Vec<u32>,
    patterns: Vec<Vec<ColorIndex>>,
    wave: Wave,
    propagator: Propagator,
    rng: Mulberry32,
    last_collapsed: Option<usize>,
    ground_pattern: Option<usize>,
}

impl OverlappingModel {
    pub fn new(
        pixels: &[u32],
        sample_width: usize,
        sample_height: usize,
        options: OverlappingOptions,
    ) -> Result<Self> {
        if options.pattern_size < 2 {
            return Err(WfcError::InvalidPatternSize(options.pattern_size));
        }
        if !matches!(options.symmetry, 1 | 2 | 8) {
            return Err(WfcError::InvalidSymmetry(options.symmetry));
        }
        if options.width == 0 || options.height == 0 {
            return Err(WfcError::InvalidDimensions {
                width: options.width,
                height: options.height,
            });
        }

        let (palette, sample) = quantize(pixels);
        let n = options.pattern_size;
        let (patterns, weights) = extract_patterns(&sample, sample_width, sample_height, n, &options);
        if patterns.is_empty() {
            return Err(WfcError::EmptyPatternSet);
        }
        info!(patterns = patterns.len(), colors = palette.len(), "extracted patterns");

        let compat = build_compat(&patterns, n);
        let wave = Wave::new(options.width, options.height, &weights)?;
        let propagator = Propagator::new(
            options.width,
            options.height,
            patterns.len(),
            options.periodic,
            compat,
        );
        let ground_pattern = if options.ground {
            Some(patterns.len() - 1)
        } else {
            None
        };

        let mut model = Self {
            rng: Mulberry32::new(options.seed),
            options,
            n,
            palette,
            patterns,
            wave,
            propagator,
            last_collapsed: None,
            ground_pattern,
        };
        model.apply_ground_constraint();
        Ok(model)
    }

    fn apply_ground_constraint(&mut self) {
        let Some(ground) = self.ground_pattern else {
            return;
        };
        let width = self.options.width;
        let height = self.options.height;

        for x in 0..width {
            let cell = (height - 1) * width + x;
            for t in 0..self.patterns.len() {
                if t != ground && self.wave.get(cell, t) {
                    self.wave.remove(cell, t);
                    self.propagator.add_to_propagate(cell, t);
                }
            }
        }
        for y in 0..height.saturating_sub(1) {
            for x in 0..width {
                let cell = y * width + x;
                if self.wave.get(cell, ground) {
                    self.wave.remove(cell, ground);
                    self.propagator.add_to_propagate(cell, ground);
                }
            }
        }
        self.propagator.propagate(&mut self.wave);
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
        self.apply_ground_constraint();
    }

    pub fn get_state(&self) -> ModelState {
        ModelState {
            total_cells: self.wave.num_cells(),
            collapsed_count: self.wave.collapsed_count(),
            pattern_count: self.patterns.len(),
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

    /// Renders the current wave state into `out`, packed little-endian
    /// `R | G<<8 | B<<16 | 0xFF<<24`.
    pub fn render(&self, out: &mut [u32]) {
        let width = self.options.width;
        let height = self.options.height;
        let n = self.n;
        debug_assert_eq!(out.len(), width * height);

        for y in 0..height {
            for x in 0..width {
                let cell = y * width + x;
                out[cell] = match self.wave.possible(cell).as_slice() {
                    // Collapsed: render the pattern's anchor (top-left) pixel.
                    [t] => self.palette[self.patterns[*t][0] as usize],
                    // Contradiction: no possibilities left to blend.
                    [] => 0xFF000000,
                    _ => self.blend_pixel(x, y),
                };
            }
        }
    }

    fn blend_pixel(&self, x: usize, y: usize) -> u32 {
        let width = self.options.width;
        let height = self.options.height;
        let n = self.n;

        let mut r = 0u64;
        let mut g = 0u64;
        let mut b = 0u64;
        let mut contributors = 0u64;

        for dy in 0..n {
            for dx in 0..n {
                let sx = x as i32 - dx as i32;
                let sy = y as i32 - dy as i32;
                let (sx, sy) = if self.options.periodic {
                    (sx.rem_euclid(width as i32), sy.rem_euclid(height as i32))
                } else {
                    if sx < 0 || sy < 0 {
                        continue;
                    }
                    (sx, sy)
                };
                let s = sy as usize * width + sx as usize;
                for t in self.wave.possible(s) {
                    let color = self.palette[self.patterns[t][dx + dy * n] as usize];
                    r += (color & 0xFF) as u64;
                    g += ((color >> 8) & 0xFF) as u64;
                    b += ((color >> 16) & 0xFF) as u64;
                    contributors += 1;
                }
            }
        }

        if contributors == 0 {
            return 0xFF000000;
        }
        let r = (r / contributors) as u32;
        let g = (g / contributors) as u32;
        let b = (b / contributors) as u32;
        r | (g << 8) | (b << 16) | 0xFF000000
    }
}

fn quantize(pixels: &[u32]) -> (Vec<u32>, Vec<usize>) {
    let mut palette = Vec::new();
    let mut index_of: HashMap<u32, usize> = HashMap::new();
    let mut sample = Vec::with_capacity(pixels.len());
    for &color in pixels {
        let idx = *index_of.entry(color).or_insert_with(|| {
            palette.push(color);
            palette.len() - 1
        });
        sample.push(idx);
    }
    (palette, sample)
}

fn patch_at(
    sample: &[usize],
    sample_width: usize,
    sample_height: usize,
    x: usize,
    y: usize,
    n: usize,
    periodic_input: bool,
) -> Vec<ColorIndex> {
    let mut patch = Vec::with_capacity(n * n);
    for dy in 0..n {
        for dx in 0..n {
            let sx = if periodic_input { (x + dx) % sample_width } else { x + dx };
            let sy = if periodic_input { (y + dy) % sample_height } else { y + dy };
            patch.push(sample[sy * sample_width + sx] as ColorIndex);
        }
    }
    patch
}

fn rotate(p: &[ColorIndex], n: usize) -> Vec<ColorIndex> {
    let mut r = vec![0; n * n];
    for y in 0..n {
        for x in 0..n {
            r[x + y * n] = p[(n - 1 - y) + x * n];
        }
    }
    r
}

fn reflect(p: &[ColorIndex], n: usize) -> Vec<ColorIndex> {
    let mut r = vec![0; n * n];
    for y in 0..n {
        for x in 0..n {
            r[x + y * n] = p[(n - 1 - x) + y * n];
        }
    }
    r
}

fn symmetry_variants(patch: &[ColorIndex], n: usize, symmetry: u8) -> Vec<Vec<ColorIndex>> {
    let p0 = patch.to_vec();
    let p1 = reflect(&p0, n);
    let p2 = rotate(&p0, n);
    let p3 = reflect(&p2, n);
    let p4 = rotate(&p2, n);
    let p5 = reflect(&p4, n);
    let p6 = rotate(&p4, n);
    let p7 = reflect(&p6, n);
    let all = [p0, p1, p2, p3, p4, p5, p6, p7];
    all.into_iter().take(symmetry as usize).collect()
}

/// Extracts patterns in first-occurrence order — *not* HashMap iteration
/// order, which would make runs non-deterministic across processes.
///
/// Per-origin patch extraction and symmetrization is embarrassingly
/// parallel (each origin only reads the sample); with the `parallel`
/// feature this runs on `rayon`'s pool. The fold into `patterns`/`weights`
/// stays sequential and origin-ordered so the result is identical either
/// way.
fn extract_patterns(
    sample: &[usize],
    sample_width: usize,
    sample_height: usize,
    n: usize,
    options: &OverlappingOptions,
) -> (Vec<Vec<ColorIndex>>, Vec<f64>) {
    let x_max = if options.periodic_input {
        sample_width
    } else {
        sample_width.saturating_sub(n - 1)
    };
    let y_max = if options.periodic_input {
        sample_height
    } else {
        sample_height.saturating_sub(n - 1)
    };

    let origins: Vec<(usize, usize)> = (0..y_max).flat_map(|y| (0..x_max).map(move |x| (x, y))).collect();

    #[cfg(feature = "parallel")]
    let per_origin: Vec<Vec<Vec<ColorIndex>>> = {
        use rayon::prelude::*;
        origins
            .par_iter()
            .map(|&(x, y)| {
                let patch = patch_at(sample, sample_width, sample_height, x, y, n, options.periodic_input);
                symmetry_variants(&patch, n, options.symmetry)
            })
            .collect()
    };
    #[cfg(not(feature = "parallel"))]
    let per_origin: Vec<Vec<Vec<ColorIndex>>> = origins
        .iter()
        .map(|&(x, y)| {
            let patch = patch_at(sample, sample_width, sample_height, x, y, n, options.periodic_input);
            symmetry_variants(&patch, n, options.symmetry)
        })
        .collect();

    let mut index_of: HashMap<Vec<ColorIndex>, usize> = HashMap::new();
    let mut patterns: Vec<Vec<ColorIndex>> = Vec::new();
    let mut weights: Vec<f64> = Vec::new();

    for variants in per_origin {
        for variant in variants {
            match index_of.get(&variant) {
                Some(&idx) => weights[idx] += 1.0,
                None => {
                    let idx = patterns.len();
                    index_of.insert(variant.clone(), idx);
                    patterns.push(variant);
                    weights.push(1.0);
                }
            }
        }
    }

    (patterns, weights)
}

fn agree(p: &[ColorIndex], q: &[ColorIndex], dx: i32, dy: i32, n: usize) -> bool {
    let xmin = dx.max(0) as usize;
    let xmax = (n as i32 + dx.min(0)) as usize;
    let ymin = dy.max(0) as usize;
    let ymax = (n as i32 + dy.min(0)) as usize;

    for y in ymin..ymax {
        for x in xmin..xmax {
            let x2 = (x as i32 - dx) as usize;
            let y2 = (y as i32 - dy) as usize;
            if p[x + y * n] != q[x2 + y2 * n] {
                return false;
            }
        }
    }
    true
}

fn build_compat(patterns: &[Vec<ColorIndex>], n: usize) -> CompatTable {
    let mut compat: CompatTable = vec![Default::default(); patterns.len()];
    for (t1, p1) in patterns.iter().enumerate() {
        for d in Direction::ALL {
            for (t2, p2) in patterns.iter().enumerate() {
                if agree(p1, p2, d.dx(), d.dy(), n) {
                    compat[t1][d.index()].push(t2);
                }
            }
        }
    }
    compat
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const BLACK: u32 = 0xFF000000;
    const WHITE: u32 = 0xFFFFFFFF;

    fn options(width: usize, height: usize, seed: u32) -> OverlappingOptions {
        OverlappingOptions {
            pattern_size: 2,
            symmetry: 8,
            periodic_input: true,
            periodic: true,
            ground: false,
            heuristic: Heuristic::Entropy,
            seed,
            width,
            height,
        }
    }

    #[test]
    fn checkerboard_collapses_to_strict_alternation() {
        let pixels = [BLACK, WHITE, WHITE, BLACK];
        let mut model = OverlappingModel::new(&pixels, 2, 2, options(4, 4, 1)).unwrap();
        assert!(model.run(10_000));

        let mut out = vec![0u32; 16];
        model.render(&mut out);
        for y in 0..4 {
            for x in 0..4 {
                let expected = if (x + y) % 2 == 0 { out[0] } else { out[1] };
                assert_eq!(out[y * 4 + x], expected, "cell ({x},{y}) breaks alternation");
            }
        }
    }

    #[test]
    fn ground_confines_anchor_pattern_to_bottom_row() {
        let sky = 0xFF3399FF;
        let ground = 0xFF228822;
        let pixels = [sky, sky, ground, ground];
        let mut opts = options(8, 8, 3);
        opts.pattern_size = 2;
        opts.symmetry = 1;
        opts.periodic_input = true;
        opts.periodic = false;
        opts.ground = true;
        let mut model = OverlappingModel::new(&pixels, 2, 2, opts).unwrap();
        assert!(model.run(10_000));

        let anchor = model.ground_pattern.unwrap();
        for x in 0..8 {
            let bottom = (8 - 1) * 8 + x;
            assert_eq!(model.wave.possible(bottom), vec![anchor]);
        }
        for y in 0..7 {
            for x in 0..8 {
                let cell = y * 8 + x;
                assert_ne!(model.wave.possible(cell), vec![anchor]);
            }
        }
    }

    #[test]
    fn single_color_sample_yields_empty_pattern_set() {
        let pixels = [BLACK];
        let mut opts = options(3, 3, 1);
        opts.periodic_input = false;
        let err = OverlappingModel::new(&pixels, 1, 1, opts).unwrap_err();
        assert_eq!(err, WfcError::EmptyPatternSet);
    }

    #[test]
    fn determinism_same_seed_same_render() {
        let pixels = [BLACK, WHITE, WHITE, BLACK, WHITE, BLACK, BLACK, WHITE, WHITE];
        let run = || {
            let mut model = OverlappingModel::new(&pixels, 3, 3, options(6, 6, 42)).unwrap();
            model.run(10_000);
            let mut out = vec![0u32; 36];
            model.render(&mut out);
            out
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn invalid_pattern_size_rejected() {
        let pixels = [BLACK, WHITE, WHITE, BLACK];
        let mut opts = options(4, 4, 1);
        opts.pattern_size = 1;
        let err = OverlappingModel::new(&pixels, 2, 2, opts).unwrap_err();
        assert_eq!(err, WfcError::InvalidPatternSize(1));
    }

    #[test]
    fn invalid_symmetry_rejected() {
        let pixels = [BLACK, WHITE, WHITE, BLACK];
        let mut opts = options(4, 4, 1);
        opts.symmetry = 3;
        let err = OverlappingModel::new(&pixels, 2, 2, opts).unwrap_err();
        assert_eq!(err, WfcError::InvalidSymmetry(3));
    }

    #[test]
    fn render_after_contradiction_does_not_panic() {
        let pixels = [BLACK, WHITE, WHITE, BLACK];
        let mut model = OverlappingModel::new(&pixels, 2, 2, options(4, 4, 1)).unwrap();
        for t in model.wave.possible(0) {
            model.wave.remove(0, t);
        }
        assert!(model.wave.has_contradiction());

        let mut out = vec![0u32; 16];
        model.render(&mut out);
        assert_eq!(out[0], 0xFF000000);
    }
}
