//! Integration tests exercising the concrete grow/etch/planarize scenarios
//! and cross-cutting invariants the engine core is expected to satisfy,
//! driven entirely through the public `xsection` API.

use xsection::context::EngineContext;
use xsection::geom::{boolean, build_kernel, BooleanMode, Edge, Point, Polygon, PolygonSet, ProfileMode};
use xsection::mask::MaskSet;
use xsection::slab::{Slab, SlabStack};
use xsection::slice_engine::{etch, grow, mask_to_seed, planarize as planarize_2d, GrowEtchArgs, PlanarizeTo};
use xsection::stack_engine::{planarize as planarize_3d, EngineContext3D, PlanarizeTo3D};

fn box_mask(x0: i64, y0: i64, x1: i64, y1: i64) -> MaskSet {
    MaskSet(PolygonSet::single(Polygon::box_(x0, y0, x1, y1)))
}

fn default_args() -> GrowEtchArgs<'static> {
    GrowEtchArgs {
        z_um: 0.0,
        xy_um: 0.0,
        into: Vec::new(),
        through: Vec::new(),
        on: Vec::new(),
        mode: ProfileMode::Square,
        taper_deg: None,
        bias_um: None,
        buried_um: None,
    }
}

/// S1 — flat deposit on empty air: `all()` seeded across the whole window,
/// grown 0.5µm into a deep initial air column, leaves exactly the bottom
/// 500dbu slice of air consumed and the rest standing.
#[test]
fn s1_flat_deposit_on_empty_air() {
    let mut ctx = EngineContext::new(0.001, 4000, 1000, 300, 200, 50, 1);
    ctx.air = box_mask(-50, 0, 4050, 1000);
    ctx.bulk = MaskSet::empty();

    let seed = xsection::slice_engine::MaskRegion {
        mask_polygons: box_mask(-50, -(ctx.depth + ctx.below), 4050, ctx.height),
        air_snapshot: ctx.air.clone(),
    };

    let args = GrowEtchArgs { z_um: 0.5, ..default_args() };
    let result = grow(&mut ctx, &seed, args).unwrap();

    let bbox = result.bbox().unwrap();
    assert_eq!((bbox.min.x, bbox.min.y, bbox.max.x, bbox.max.y), (-50, 0, 4050, 500));

    let air_bbox = ctx.air.bbox().unwrap();
    assert_eq!((air_bbox.min.x, air_bbox.min.y, air_bbox.max.x, air_bbox.max.y), (-50, 500, 4050, 1000));
}

/// S3 — etch into bulk: a mask-seeded etch removes a rectangle from
/// `bulk` and the identical rectangle reappears in `air` (invariant 6).
#[test]
fn s3_etch_into_bulk() {
    let mut ctx = EngineContext::new(0.001, 4000, 500, 300, 200, 50, 1);
    ctx.air = box_mask(-50, 0, 4050, 500);
    ctx.bulk = box_mask(-50, -300, 4050, 0);

    let ruler = Edge::new(Point::new(0, 0), Point::new(4000, 0));
    let mask = box_mask(1000, -10, 3000, 10);
    let seed = mask_to_seed(&ctx, &mask, ruler);

    let mut bulk = ctx.bulk.clone();
    let args = GrowEtchArgs { z_um: 0.3, into: vec![&mut bulk], ..default_args() };
    let result = etch(&mut ctx, &seed, args).unwrap();

    let bbox = result.bbox().unwrap();
    assert_eq!((bbox.min.x, bbox.min.y, bbox.max.x, bbox.max.y), (1000, -300, 3000, 0));

    let carved = boolean(&bulk.0, &PolygonSet::single(Polygon::box_(1000, -300, 3000, 0)), BooleanMode::And);
    assert!(carved.is_empty(), "etched rectangle must be fully removed from bulk");

    let air_bbox = ctx.air.bbox().unwrap();
    assert_eq!((air_bbox.min.x, air_bbox.min.y, air_bbox.max.x, air_bbox.max.y), (-50, -300, 4050, 500));
}

/// S4 — round vs square grow kernels: round/octagon approximate the
/// ellipse with many more vertices than the square's four corners, and
/// the round kernel's convex hull is never narrower than the square's
/// half-extents (edges, not vertices, touch the ellipse).
#[test]
fn s4_round_vs_square_kernel_shape() {
    let square = build_kernel(1000, 500, ProfileMode::Square, false);
    let octagon = build_kernel(1000, 500, ProfileMode::Octagon, false);
    let round = build_kernel(1000, 500, ProfileMode::Round, false);

    assert_eq!(square.exterior.len(), 4);
    assert_eq!(octagon.exterior.len(), 8);
    assert_eq!(round.exterior.len(), 64);

    let square_bbox = square.bbox().unwrap();
    let round_bbox = round.bbox().unwrap();
    assert!(round_bbox.max.x >= square_bbox.max.x);
    assert!(round_bbox.max.y >= square_bbox.max.y);
}

/// S6 — planarize-to: a single slab spanning the whole vertical window
/// is cut at an explicit level; material above the cut rejoins air and
/// the slab stack is left spanning exactly up to the cut.
#[test]
fn s6_planarize_to_cut_level() {
    let base = EngineContext::new(0.001, 4000, 1000, 300, 200, 50, 1);
    let mut ctx3d = EngineContext3D::new(base);
    ctx3d.air = SlabStack::new();

    let full = box_mask(-50, -50, 4050, 50);
    let mut material = SlabStack::single(Slab::new(full, 0, 1000));

    planarize_3d(&mut ctx3d, &mut [&mut material], PlanarizeTo3D::To(0.6), None).unwrap();

    assert_eq!(material.z_extent(), Some((0, 600)));
    assert_eq!(ctx3d.air.z_extent(), Some((600, 1000)));
}

/// Invariant: sizing is monotone in the grow distance — growing by a
/// larger `xy` always yields a superset of growing by a smaller one.
#[test]
fn sizing_monotonicity() {
    let a = box_mask(0, 0, 1000, 1000);
    let small = a.sized(0.01, None, 0.001);
    let large = a.sized(0.05, None, 0.001);

    let union = boolean(&small.0, &large.0, BooleanMode::Or);
    assert_eq!(union, large.0, "the larger sizing must already contain the smaller one");
}

/// Invariant: `grow` conserves area — the region it adds to `into` is
/// exactly the region it removes from `air`, whichever side of a ruler
/// the seed covers.
#[test]
fn grow_conservation_matches_air_loss() {
    let mut ctx = EngineContext::new(0.001, 4000, 500, 300, 200, 50, 1);
    ctx.air = box_mask(-50, 0, 4050, 500);
    ctx.bulk = MaskSet::empty();

    let ruler = Edge::new(Point::new(0, 0), Point::new(4000, 0));
    let mask = box_mask(500, -10, 1500, 10);
    let seed = mask_to_seed(&ctx, &mask, ruler);

    let air_before = ctx.air.clone();
    let args = GrowEtchArgs { z_um: 0.2, ..default_args() };
    let result = grow(&mut ctx, &seed, args).unwrap();

    let mut air_lost = air_before;
    air_lost.sub(&ctx.air);
    assert_eq!(air_lost.0, result.0, "air lost to grow must equal the produced geometry");
}

/// Invariant: normalizing an already-normalized stack is a no-op
/// (idempotence), exercised through `planarize`'s output rather than
/// `normalize` directly.
#[test]
fn planarize_output_is_already_normalized() {
    let base = EngineContext::new(0.001, 4000, 1000, 300, 200, 50, 1);
    let mut ctx3d = EngineContext3D::new(base);
    ctx3d.air = SlabStack::new();

    let full = box_mask(-50, -50, 4050, 50);
    let mut material = SlabStack::single(Slab::new(full, 0, 1000));
    planarize_3d(&mut ctx3d, &mut [&mut material], PlanarizeTo3D::To(0.6), None).unwrap();

    let renormalized = SlabStack::from_unnormalized(material.0.clone());
    assert_eq!(renormalized, material);
}

/// Invariant: 2D `planarize` mirrors the 3D one along `y` instead of
/// `z`, cutting a mask at an explicit level and returning the removed
/// area to air.
#[test]
fn planarize_2d_cuts_at_level() {
    let mut ctx = EngineContext::new(0.001, 4000, 1000, 300, 200, 50, 1);
    ctx.air = MaskSet::empty();

    let mut material = box_mask(-50, 0, 4050, 1000);
    planarize_2d(&mut ctx, &mut [&mut material], PlanarizeTo::To(0.6), None).unwrap();

    let bbox = material.bbox().unwrap();
    assert_eq!((bbox.min.x, bbox.min.y, bbox.max.x, bbox.max.y), (-50, 0, 4050, 600));

    let air_bbox = ctx.air.bbox().unwrap();
    assert_eq!((air_bbox.min.x, air_bbox.min.y, air_bbox.max.x, air_bbox.max.y), (-50, 600, 4050, 1000));
}
