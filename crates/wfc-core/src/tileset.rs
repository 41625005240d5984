//! Tileset assembly: turns a list of tile definitions (name, symmetry
//! class, weight, pixels) plus neighbor rules into propagator data for
//! [`crate::tiled::SimpleTiledModel`].
//!
//! Symmetry classes expand each tile into `cardinality` pixel variants and
//! an 8-entry action table (the dihedral-ish group `{id, a, a², a³, b, ba,
//! ba², ba³}`) that lets a handful of neighbor rules on canonical variants
//! imply rules on every rotated/reflected variant without writing them out.

use std::collections::HashMap;

use crate::direction::Direction;
use crate::error::{Result, WfcError};
use crate::propagator::CompatTable;

/// How many distinct rotated/reflected variants a tile has, and how the
/// symmetry group acts on their indices. `Slash` is the `\` class from the
/// spec — backslash is not a legal Rust identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymmetryClass {
    X,
    I,
    Slash,
    L,
    T,
    F,
}

impl SymmetryClass {
    pub fn cardinality(self) -> u8 {
        match self {
            SymmetryClass::X => 1,
            SymmetryClass::I | SymmetryClass::Slash => 2,
            SymmetryClass::L | SymmetryClass::T => 4,
            SymmetryClass::F => 8,
        }
    }

    fn a(self, i: u8) -> u8 {
        match self {
            SymmetryClass::X => i,
            SymmetryClass::I => 1 - i,
            SymmetryClass::Slash => 1 - i,
            SymmetryClass::L => (i + 1) % 4,
            SymmetryClass::T => (i + 1) % 4,
            SymmetryClass::F => {
                if i < 4 {
                    (i + 1) % 4
                } else {
                    4 + (i - 1) % 4
                }
            }
        }
    }

    fn b(self, i: u8) -> u8 {
        match self {
            SymmetryClass::X => i,
            SymmetryClass::I => i,
            SymmetryClass::Slash => 1 - i,
            SymmetryClass::L => {
                if i % 2 == 0 {
                    i + 1
                } else {
                    i - 1
                }
            }
            SymmetryClass::T => {
                if i % 2 == 0 {
                    i
                } else {
                    4 - i
                }
            }
            SymmetryClass::F => {
                if i < 4 {
                    i + 4
                } else {
                    i - 4
                }
            }
        }
    }

    /// Applies symmetry-group element `s` (0..8: id, a, a², a³, b, ba, ba²,
    /// ba³) to local variant `t`.
    fn apply(self, t: u8, s: u8) -> u8 {
        match s {
            0 => t,
            1 => self.a(t),
            2 => self.a(self.a(t)),
            3 => self.a(self.a(self.a(t))),
            4 => self.b(t),
            5 => self.b(self.a(t)),
            6 => self.b(self.a(self.a(t))),
            7 => self.b(self.a(self.a(self.a(t)))),
            _ => panic!("symmetry operation index out of range: {s}"),
        }
    }
}

/// An externally-parsed tile: name, symmetry class, frequency weight, and
/// its `ts x ts` packed-RGBA pixel buffer in canonical (unrotated)
/// orientation.
#[derive(Clone)]
pub struct TileDef {
    pub name: String,
    pub symmetry: SymmetryClass,
    pub weight: f64,
    pub pixels: Vec<u32>,
}

/// A neighbor-adjacency rule: `left` (at symmetry operation `left_variant`)
/// may sit immediately to the left of `right` (at `right_variant`).
/// Variant indices are symmetry-group operation indices (`0..8`), not raw
/// cardinality — out-of-range combinations fold back via the class's `a`/`b`
/// maps.
#[derive(Clone)]
pub struct NeighborRule {
    pub left: String,
    pub left_variant: u8,
    pub right: String,
    pub right_variant: u8,
}

/// Output of [`assemble`]: one entry per *variant* (not per tile).
pub struct TilesetData {
    pub weights: Vec<f64>,
    pub compat: CompatTable,
    pub variant_pixels: Vec<Vec<u32>>,
    pub tile_of_variant: Vec<usize>,
    pub tile_side: usize,
}

/// Builds propagator data for `tiles` and `rules`. When `subset` is
/// `Some`, only tiles whose name appears in it are included — matching the
/// XML tileset convention of shipping one ruleset for a tile superset and
/// selecting a named subset per level. A rule naming a tile outside the
/// subset is then an [`WfcError::UnknownTile`], per the construction-time
/// error taxonomy.
pub fn assemble(
    tiles: &[TileDef],
    rules: &[NeighborRule],
    subset: Option<&[String]>,
) -> Result<TilesetData> {
    let selected: Vec<&TileDef> = match subset {
        Some(names) => tiles.iter().filter(|t| names.iter().any(|n| n == &t.name)).collect(),
        None => tiles.iter().collect(),
    };
    if selected.is_empty() {
        return Err(WfcError::EmptyPatternSet);
    }
    let tiles = selected;
    let tile_side = (tiles[0].pixels.len() as f64).sqrt().round() as usize;

    let mut base_of: HashMap<&str, usize> = HashMap::new();
    let mut bases = Vec::with_capacity(tiles.len());
    let mut total_variants = 0usize;
    for tile in &tiles {
        bases.push(total_variants);
        base_of.entry(tile.name.as_str()).or_insert(total_variants);
        total_variants += tile.symmetry.cardinality() as usize;
    }

    let mut action = vec![[0usize; 8]; total_variants];
    let mut weights = vec![0.0f64; total_variants];
    let mut variant_pixels = vec![Vec::new(); total_variants];
    let mut tile_of_variant = vec![0usize; total_variants];

    #[cfg(feature = "parallel")]
    let pixels_per_tile: Vec<Vec<Vec<u32>>> = {
        use rayon::prelude::*;
        tiles
            .par_iter()
            .map(|tile| variants_of(&tile.pixels, tile_side, tile.symmetry.cardinality()))
            .collect()
    };
    #[cfg(not(feature = "parallel"))]
    let pixels_per_tile: Vec<Vec<Vec<u32>>> = tiles
        .iter()
        .map(|tile| variants_of(&tile.pixels, tile_side, tile.symmetry.cardinality()))
        .collect();

    for (i, tile) in tiles.iter().enumerate() {
        let base = bases[i];
        let card = tile.symmetry.cardinality();
        let pixels_per_variant = &pixels_per_tile[i];
        for t in 0..card {
            let v = base + t as usize;
            for s in 0..8u8 {
                action[v][s as usize] = base + tile.symmetry.apply(t, s) as usize;
            }
            weights[v] = tile.weight;
            variant_pixels[v] = pixels_per_variant[t as usize].clone();
            tile_of_variant[v] = i;
        }
    }

    let mut dense_left = vec![vec![false; total_variants]; total_variants];
    let mut dense_down = vec![vec![false; total_variants]; total_variants];

    for rule in rules {
        let left_base = *base_of
            .get(rule.left.as_str())
            .ok_or_else(|| WfcError::UnknownTile(rule.left.clone()))?;
        let right_base = *base_of
            .get(rule.right.as_str())
            .ok_or_else(|| WfcError::UnknownTile(rule.right.clone()))?;

        let l = action[left_base][rule.left_variant as usize % 8];
        let r = action[right_base][rule.right_variant as usize % 8];
        let d = action[l][1];
        let u = action[r][1];

        let mut set = |m: &mut Vec<Vec<bool>>, row: usize, col: usize| m[row][col] = true;
        set(&mut dense_left, r, l);
        set(&mut dense_left, action[r][6], action[l][6]);
        set(&mut dense_left, action[l][4], action[r][4]);
        set(&mut dense_left, action[l][2], action[r][2]);

        set(&mut dense_down, u, d);
        set(&mut dense_down, action[u][6], action[d][6]);
        set(&mut dense_down, action[d][4], action[u][4]);
        set(&mut dense_down, action[d][2], action[u][2]);
    }

    let mut dense_right = vec![vec![false; total_variants]; total_variants];
    let mut dense_up = vec![vec![false; total_variants]; total_variants];
    for t1 in 0..total_variants {
        for t2 in 0..total_variants {
            dense_right[t2][t1] = dense_left[t1][t2];
            dense_up[t2][t1] = dense_down[t1][t2];
        }
    }

    let mut compat: CompatTable = vec![Default::default(); total_variants];
    for t in 0..total_variants {
        for t2 in 0..total_variants {
            if dense_left[t][t2] {
                compat[t][Direction::Left.index()].push(t2);
            }
            if dense_down[t][t2] {
                compat[t][Direction::Down.index()].push(t2);
            }
            if dense_right[t][t2] {
                compat[t][Direction::Right.index()].push(t2);
            }
            if dense_up[t][t2] {
                compat[t][Direction::Up.index()].push(t2);
            }
        }
    }

    Ok(TilesetData {
        weights,
        compat,
        variant_pixels,
        tile_of_variant,
        tile_side,
    })
}

fn rotate_cw(p: &[u32], ts: usize) -> Vec<u32> {
    let mut r = vec![0u32; ts * ts];
    for y in 0..ts {
        for x in 0..ts {
            r[x + y * ts] = p[(ts - 1 - y) + x * ts];
        }
    }
    r
}

fn reflect_h(p: &[u32], ts: usize) -> Vec<u32> {
    let mut r = vec![0u32; ts * ts];
    for y in 0..ts {
        for x in 0..ts {
            r[x + y * ts] = p[(ts - 1 - x) + y * ts];
        }
    }
    r
}

/// Generates the `card` pixel buffers for a tile's variants. Variants
/// `0..4` (when present) are successive 90° clockwise rotations of the
/// source; variants `4..8` are the same rotations of the horizontally
/// reflected source. Classes with `card` 1 or 2 only ever use the first
/// one or two of these.
fn variants_of(source: &[u32], ts: usize, card: u8) -> Vec<Vec<u32>> {
    match card {
        1 => vec![source.to_vec()],
        2 => vec![source.to_vec(), reflect_h(source, ts)],
        4 => {
            let mut out = Vec::with_capacity(4);
            let mut cur = source.to_vec();
            for _ in 0..4 {
                out.push(cur.clone());
                cur = rotate_cw(&cur, ts);
            }
            out
        }
        8 => {
            let mut out = Vec::with_capacity(8);
            let mut cur = source.to_vec();
            for _ in 0..4 {
                out.push(cur.clone());
                cur = rotate_cw(&cur, ts);
            }
            let mut cur = reflect_h(source, ts);
            for _ in 0..4 {
                out.push(cur.clone());
                cur = rotate_cw(&cur, ts);
            }
            out
        }
        _ => unreachable!("cardinality is always 1, 2, 4 or 8"),
    }
}
