//! `EngineContext`: the processing-window parameters and standing
//! regions shared by every engine operation (spec §3, §9).
//!
//! Replaces the original's cyclic back-references and global
//! `VERBOSE`/`OFFSET` counters with explicit state and `tracing` spans
//! (spec §9): nesting falls out of the span stack, verbosity out of the
//! ambient subscriber filter.

use crate::geom::{BBox, Point, PolygonSet};
use crate::mask::MaskSet;

/// Physical-unit (micrometres) to dbu conversion, spec §3: `floor(x /
/// dbu + 0.5)`.
pub fn um_to_dbu(x: f64, dbu: f64) -> i64 {
    (x / dbu + 0.5).floor() as i64
}

pub fn dbu_to_um(x: i64, dbu: f64) -> f64 {
    x as f64 * dbu
}

/// The processing window and standing regions owned by one engine
/// instance (spec §3's "Processing window" and "Standing regions").
#[derive(Debug, Clone)]
pub struct EngineContext {
    pub dbu: f64,
    pub width: i64,
    pub height: i64,
    pub depth: i64,
    pub below: i64,
    pub extend: i64,
    pub delta: i64,
    pub thickness_scale: f64,
    pub flipped: bool,
    pub roi: BBox,

    pub air: MaskSet,
    pub air_below: MaskSet,
    pub bulk: MaskSet,
}

impl EngineContext {
    /// Build a fresh context for a ruler spanning `[0, width]` in X, with
    /// all standing regions empty; callers (`ProcessRuntime::new`) seed
    /// `air`/`bulk` to the processing window per spec §3.
    pub fn new(dbu: f64, width: i64, height: i64, depth: i64, below: i64, extend: i64, delta: i64) -> Self {
        let roi = BBox::new(0, -(depth + below), width, height);
        EngineContext {
            dbu,
            width,
            height,
            depth,
            below,
            extend,
            delta,
            thickness_scale: 1.0,
            flipped: false,
            roi,
            air: MaskSet::empty(),
            air_below: MaskSet::empty(),
            bulk: MaskSet::empty(),
        }
    }

    /// The full processing window box, `[-(depth+below), height]` in Y
    /// and `[-extend, width+extend]` in X (spec §3's `MaskRegion`
    /// invariant).
    pub fn window(&self) -> BBox {
        BBox::new(
            -self.extend,
            -(self.depth + self.below),
            self.width + self.extend,
            self.height,
        )
    }

    /// Whichever air stack is "above" given the current `flipped` state
    /// (spec §3: "`air_below` (mirror)", "`flipped` flag that swaps the
    /// above/below air stacks for backside processing").
    pub fn active_air(&self) -> &MaskSet {
        if self.flipped {
            &self.air_below
        } else {
            &self.air
        }
    }

    pub fn active_air_mut(&mut self) -> &mut MaskSet {
        if self.flipped {
            &mut self.air_below
        } else {
            &mut self.air
        }
    }

    pub fn flip(&mut self) {
        self.flipped = !self.flipped;
    }
}

/// The ruler-box region of interest, in dbu (spec §3's `roi`).
pub fn roi_box(ruler_p1: Point, ruler_p2: Point, extend: i64, height: i64, depth: i64, below: i64) -> BBox {
    let w = (ruler_p2.x - ruler_p1.x).abs().max((ruler_p2.y - ruler_p1.y).abs());
    BBox::new(-extend, -(depth + below), w + extend, height)
}

/// Clip a `MaterialRegion`'s polygons to a bounding box, as `output()`
/// does before handing results to the collaborator (spec §4.7).
pub fn clip_to_box(p: &PolygonSet, b: BBox) -> PolygonSet {
    use crate::geom::{boolean, BooleanMode, Polygon};
    let window = PolygonSet::single(Polygon::box_(b.min.x, b.min.y, b.max.x, b.max.y));
    boolean(p, &window, BooleanMode::And)
}
