//! `SliceEngine` (spec §4.4): the 2D cross-section core. Converts a
//! `MaskSet` crossing a ruler into a seeded `MaskRegion`, then drives
//! structured `grow`/`etch`/`planarize` over it.

use std::f64::consts::PI;

use tracing::{debug, instrument};

use crate::context::{um_to_dbu, EngineContext};
use crate::errors::{EngineError, Result};
use crate::geom::kernel::build_kernel;
use crate::geom::{boolean, edges_and_edges, edges_of, edges_sub_edges, minkowski_sum, size as geom_size, BooleanMode, Edge, Point, Polygon, PolygonSet, ProfileMode, SizeMode};
use crate::mask::MaskSet;

/// The merge batch size `produce_geom` uses to cap intermediate polygon
/// counts while sweeping round/octagon kernels (spec §4.4 step 7).
const MERGE_BATCH: usize = 10;

/// A mask pattern paired with the air polygons present at the moment it
/// was seeded (spec §4.4: "Pair them with the current air polygons to
/// form a MaskRegion seeded at the air-boundary"). The pairing is a
/// snapshot: later changes to the engine's live `air` do not retroactively
/// change `air_snapshot`, matching the original's seed-object semantics.
#[derive(Debug, Clone)]
pub struct MaskRegion {
    pub mask_polygons: MaskSet,
    pub air_snapshot: MaskSet,
}

/// Project `mask`'s edges onto `ruler` and sweep them into the
/// mask-polygon rectangles of spec §4.4's "Mask-to-seed conversion",
/// then pair with the engine's current air to produce the seed.
#[instrument(level = "debug", skip(ctx, mask))]
pub fn mask_to_seed(ctx: &EngineContext, mask: &MaskSet, ruler: Edge) -> MaskRegion {
    let length = ruler.length();
    let extend = ctx.extend;

    let mut points: Vec<(i64, i64)> = Vec::new();
    for e in edges_of(&mask.0) {
        if !ruler.crossed_by(&e) {
            continue;
        }
        if !(ruler.side_of(e.p1) > 0 || ruler.side_of(e.p2) > 0) {
            continue;
        }

        let num = e.dx() as f64 * (e.p1.y - ruler.p1.y) as f64 - e.dy() as f64 * (e.p1.x - ruler.p1.x) as f64;
        let den = e.dx() as f64 * (ruler.p2.y - ruler.p1.y) as f64 - e.dy() as f64 * (ruler.p2.x - ruler.p1.x) as f64;
        if den == 0.0 {
            continue;
        }
        let t = num / den;
        let mut z = (t * length + 0.5).floor() as i64;
        if z < -extend {
            z = -extend;
        } else if (z as f64) > length + extend as f64 {
            z = (length + extend as f64).round() as i64;
        }

        let v = e.dy() * ruler.dx() - e.dx() * ruler.dy();
        let s = v.signum();
        points.push((z, s));
    }

    points.sort_unstable();

    let mut compressed: Vec<(i64, i64)> = Vec::new();
    let mut last_z: Option<i64> = None;
    let mut sum_s: i64 = 0;
    for (z, s) in points {
        match last_z {
            Some(lz) if lz == z => sum_s += s,
            _ => {
                if sum_s != 0 {
                    compressed.push((last_z.unwrap(), sum_s));
                }
                last_z = Some(z);
                sum_s = s;
            },
        }
    }
    if let Some(lz) = last_z {
        if sum_s != 0 {
            compressed.push((lz, sum_s));
        }
    }

    let mut mask_polygons = PolygonSet::new();
    let mut running = 0i64;
    let mut interval_start = 0i64;
    for (z, s) in compressed {
        let prev = running;
        running += s;
        if prev <= 0 && running > 0 {
            interval_start = z;
        } else if prev > 0 && running <= 0 {
            mask_polygons.push(Polygon::box_(
                interval_start,
                -(ctx.depth + ctx.below),
                z,
                ctx.height,
            ));
        }
    }

    debug!(n_rects = mask_polygons.0.len(), "mask_to_seed swept rectangles");

    MaskRegion {
        mask_polygons: MaskSet(mask_polygons),
        air_snapshot: ctx.active_air().clone(),
    }
}

/// Shared grow/etch argument bundle (spec §4.4's "Argument validation
/// (shared)"). `into` carries mutable references so `grow`/`etch` can
/// consume the produced material directly from the targets named by the
/// script.
pub struct GrowEtchArgs<'a> {
    pub z_um: f64,
    pub xy_um: f64,
    pub into: Vec<&'a mut MaskSet>,
    pub through: Vec<MaskSet>,
    pub on: Vec<MaskSet>,
    pub mode: ProfileMode,
    pub taper_deg: Option<f64>,
    pub bias_um: Option<f64>,
    pub buried_um: Option<f64>,
}

impl<'a> GrowEtchArgs<'a> {
    fn validate(&self) -> Result<()> {
        if !self.on.is_empty() && (!self.into.is_empty() || !self.through.is_empty()) {
            return Err(EngineError::config("`on` cannot be combined with `into`/`through`"));
        }
        Ok(())
    }
}

fn union_all(sets: &[MaskSet]) -> PolygonSet {
    let mut acc = PolygonSet::new();
    for s in sets {
        acc = boolean(&acc, &s.0, BooleanMode::Or);
    }
    acc
}

/// `produce_geom` (spec §4.4 steps 1-9): build the swept body of new
/// material for a `grow`/`etch` step.
#[instrument(level = "debug", skip(ctx, seed, args))]
pub fn produce_geom(ctx: &EngineContext, seed: &MaskRegion, args: &GrowEtchArgs) -> Result<PolygonSet> {
    args.validate()?;

    let mut prebias = args.bias_um.unwrap_or(0.0);
    let mut xy = args.xy_um;
    if xy < 0.0 {
        xy = -xy;
        prebias += xy;
    }
    if let Some(taper) = args.taper_deg {
        let d = args.z_um * (PI / 180.0 * taper).tan();
        prebias += d - xy;
        xy = d;
    }

    let into_set = if args.into.is_empty() {
        ctx.active_air().0.clone()
    } else {
        union_all(&args.into.iter().map(|m| (**m).clone()).collect::<Vec<_>>())
    };
    let through_set = if args.through.is_empty() { None } else { Some(union_all(&args.through)) };
    let on_set = if args.on.is_empty() { None } else { Some(union_all(&args.on)) };

    let mut pi = um_to_dbu(prebias, ctx.dbu);
    let mut xyi = um_to_dbu(xy, ctx.dbu);
    let zi = um_to_dbu(args.z_um, ctx.dbu);

    for p in &seed.mask_polygons.0.0 {
        if let Some(bbox) = p.bbox() {
            if bbox.width() <= 2 * pi {
                pi = bbox.width() / 2 - 1;
                xyi = pi;
            }
        }
    }

    let mp = geom_size(&seed.mask_polygons.0, -pi, 0, SizeMode::Square);
    let air_masked = boolean(&seed.air_snapshot.0, &mp, BooleanMode::And);
    let mp_edges = edges_of(&mp);
    let mut me = edges_sub_edges(&edges_of(&air_masked), &mp_edges);

    let into_given = !args.into.is_empty();
    let through_given = !args.through.is_empty();
    let on_given = !args.on.is_empty();
    if into_given || through_given || on_given {
        let data = if on_given {
            on_set.clone().unwrap()
        } else if through_given {
            through_set.clone().unwrap()
        } else {
            into_set.clone()
        };
        me = if data.is_empty() { Vec::new() } else { edges_and_edges(&me, &edges_of(&data)) };
    }

    let tapered = args.taper_deg.is_some();
    let kernel = build_kernel(xyi, zi, args.mode, tapered);

    let mut body = PolygonSet::new();
    for (n, e) in me.into_iter().enumerate() {
        body.push(minkowski_sum(&kernel, e));
        if n > 0 && n % MERGE_BATCH == 0 {
            body = body.merged();
        }
    }
    body = body.merged();

    if let Some(buried) = args.buried_um {
        if buried.abs() > 1e-6 {
            let dz = um_to_dbu(buried, ctx.dbu);
            let t = crate::geom::Transform::translation(0, -dz);
            body = body.transformed(&t);
        }
    }

    if let Some(through) = &through_set {
        body = boolean(&body, through, BooleanMode::ASubB);
    }
    body = boolean(&body, &into_set, BooleanMode::And);

    Ok(body)
}

/// `grow` (spec §4.4 "Effect on air / into"): consumes `into` (or `air`
/// when `into` is empty) with the produced material.
#[instrument(level = "debug", skip(ctx, seed, args))]
pub fn grow(ctx: &mut EngineContext, seed: &MaskRegion, mut args: GrowEtchArgs) -> Result<MaskSet> {
    let geom = produce_geom(ctx, seed, &args)?;
    let result = MaskSet(geom);

    if args.into.is_empty() {
        ctx.active_air_mut().sub(&result);
    } else {
        for m in args.into.iter_mut() {
            m.sub(&result);
        }
    }
    Ok(result)
}

/// `etch` (spec §4.4): requires a non-empty `into`; the removed material
/// is added back to `air` (invariant 6: added-air == `into ∩ R` ==
/// `m_before ∖ m_after`).
#[instrument(level = "debug", skip(ctx, seed, args))]
pub fn etch(ctx: &mut EngineContext, seed: &MaskRegion, mut args: GrowEtchArgs) -> Result<MaskSet> {
    if args.into.is_empty() {
        return Err(EngineError::config("'etch' requires a non-empty `into`"));
    }
    let geom = produce_geom(ctx, seed, &args)?;
    let result = MaskSet(geom);

    for m in args.into.iter_mut() {
        let before = (**m).clone();
        m.sub(&result);
        let mut removed = before;
        removed.sub(m);
        ctx.active_air_mut().add(&removed);
    }
    Ok(result)
}

/// The cut-level specifier for [`planarize`].
pub enum PlanarizeTo<'a> {
    Downto(&'a [MaskSet]),
    To(f64),
}

/// `planarize(into, downto|to, less)` (spec §4.4). Fails with
/// `EngineError::Config` if `into` is empty.
#[instrument(level = "debug", skip(ctx, into))]
pub fn planarize(ctx: &mut EngineContext, into: &mut [&mut MaskSet], to: PlanarizeTo, less_um: Option<f64>) -> Result<()> {
    if into.is_empty() {
        return Err(EngineError::config("'planarize' requires a non-empty `into`"));
    }

    let mut cut_y = match to {
        PlanarizeTo::Downto(regions) => {
            let bbox = regions
                .iter()
                .filter_map(|m| m.bbox())
                .reduce(|a, b| a.union(&b))
                .ok_or_else(|| EngineError::config("'planarize' downto region is empty"))?;
            if ctx.flipped {
                bbox.min.y
            } else {
                bbox.max.y
            }
        },
        PlanarizeTo::To(to_um) => um_to_dbu(to_um, ctx.dbu),
    };

    if let Some(less_um) = less_um {
        let less_dbu = um_to_dbu(less_um, ctx.dbu);
        cut_y = if ctx.flipped { cut_y + less_dbu } else { cut_y - less_dbu };
    }

    let window = ctx.window();
    let removal_box = if ctx.flipped {
        Polygon::box_(window.min.x, window.min.y, window.max.x, cut_y)
    } else {
        Polygon::box_(window.min.x, cut_y, window.max.x, window.max.y)
    };
    let removal = PolygonSet::single(removal_box);

    for m in into.iter_mut() {
        let removed = boolean(&m.0, &removal, BooleanMode::And);
        if !removed.is_empty() {
            ctx.active_air_mut().add(&MaskSet(removed));
        }
        m.0 = boolean(&m.0, &removal, BooleanMode::ASubB);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::Polygon;

    fn ctx_for_ruler(width: i64) -> EngineContext {
        let mut ctx = EngineContext::new(0.001, width, 500, 300, 200, 50, 1);
        ctx.air = MaskSet(PolygonSet::single(Polygon::box_(-50, 0, width + 50, 500)));
        ctx.bulk = MaskSet(PolygonSet::single(Polygon::box_(-50, -300, width + 50, 0)));
        ctx
    }

    #[test]
    fn mask_to_seed_s2_single_polygon() {
        let ctx = ctx_for_ruler(4000);
        let ruler = Edge::new(Point::new(0, 0), Point::new(4000, 0));
        let mask = MaskSet(PolygonSet::single(Polygon::box_(1000, -10, 3000, 10)));
        let seed = mask_to_seed(&ctx, &mask, ruler);
        let bbox = seed.mask_polygons.bbox().unwrap();
        assert_eq!(bbox.min.x, 1000);
        assert_eq!(bbox.max.x, 3000);
    }

    #[test]
    fn grow_conserves_area_s2() {
        let mut ctx = ctx_for_ruler(4000);
        let ruler = Edge::new(Point::new(0, 0), Point::new(4000, 0));
        let mask = MaskSet(PolygonSet::single(Polygon::box_(1000, -10, 3000, 10)));
        let seed = mask_to_seed(&ctx, &mask, ruler);

        let args = GrowEtchArgs {
            z_um: 0.5,
            xy_um: 0.0,
            into: Vec::new(),
            through: Vec::new(),
            on: Vec::new(),
            mode: ProfileMode::Square,
            taper_deg: None,
            bias_um: None,
            buried_um: None,
        };
        let result = grow(&mut ctx, &seed, args).unwrap();
        let bbox = result.bbox().unwrap();
        assert_eq!((bbox.min.x, bbox.min.y, bbox.max.x, bbox.max.y), (1000, 0, 3000, 500));
    }

    #[test]
    fn etch_requires_into() {
        let mut ctx = ctx_for_ruler(4000);
        let ruler = Edge::new(Point::new(0, 0), Point::new(4000, 0));
        let mask = MaskSet(PolygonSet::single(Polygon::box_(1000, -10, 3000, 10)));
        let seed = mask_to_seed(&ctx, &mask, ruler);
        let args = GrowEtchArgs {
            z_um: 0.3,
            xy_um: 0.0,
            into: Vec::new(),
            through: Vec::new(),
            on: Vec::new(),
            mode: ProfileMode::Square,
            taper_deg: None,
            bias_um: None,
            buried_um: None,
        };
        assert!(etch(&mut ctx, &seed, args).is_err());
    }
}
