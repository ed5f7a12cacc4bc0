//! `StackEngine` (spec §4.6): the 3D analogue of `SliceEngine`. Converts
//! a mask to a thin seed slab at the current air boundary, then drives
//! `grow`/`etch`/`planarize` over `SlabStack`s.

use tracing::instrument;

use crate::context::{um_to_dbu, EngineContext};
use crate::errors::{EngineError, Result};
use crate::geom::{BooleanMode, ProfileMode};
use crate::mask::MaskSet;
use crate::slab::{normalize, Slab, SlabStack};

/// `mask_to_seed` (spec §4.6): a full-height slab of `mask`, restricted
/// to the air/material interface by sizing the air stack up by `delta`
/// in z, subtracting the original air, and intersecting with the
/// full-height mask slab.
#[instrument(level = "debug", skip(ctx, mask))]
pub fn mask_to_seed(ctx: &EngineContext, mask: &MaskSet, air: &SlabStack) -> SlabStack {
    let full_height = ctx.depth + ctx.below + ctx.height;
    let mask_slab = SlabStack::single(Slab::new(mask.clone(), -(ctx.depth + ctx.below), full_height));

    let air_sized = air.size(0, 0, ctx.delta);
    let air_border = air_sized.boolean(air, BooleanMode::ASubB);
    air_border.boolean(&mask_slab, BooleanMode::And)
}

pub struct GrowEtchArgs3D<'a> {
    pub z_um: f64,
    pub xy_um: f64,
    pub into: Vec<&'a mut SlabStack>,
    pub through: Vec<SlabStack>,
    pub on: Vec<SlabStack>,
    pub mode: ProfileMode,
    pub taper_deg: Option<f64>,
    pub bias_um: Option<f64>,
}

impl<'a> GrowEtchArgs3D<'a> {
    fn validate(&self) -> Result<()> {
        if !self.on.is_empty() && (!self.into.is_empty() || !self.through.is_empty()) {
            return Err(EngineError::config("`on` cannot be combined with `into`/`through`"));
        }
        if self.taper_deg.is_some() {
            return Err(EngineError::config("tapered 3D grow/etch is not supported"));
        }
        if self.mode == ProfileMode::Octagon {
            return Err(EngineError::config("octagon mode is not supported in 3D"));
        }
        Ok(())
    }
}

fn union_all(stacks: &[SlabStack]) -> SlabStack {
    let mut acc = SlabStack::new();
    for s in stacks {
        acc = acc.boolean(s, BooleanMode::Or);
    }
    acc
}

/// `produce_geom` at slab granularity (spec §4.6). `round` is treated
/// identically to `square` per the documented 3D compatibility note
/// (spec §9 Open Questions); positive `prebias` is rejected.
#[instrument(level = "debug", skip(ctx, seed, args))]
pub fn produce_geom(ctx: &EngineContext3D, seed: &SlabStack, args: &GrowEtchArgs3D) -> Result<SlabStack> {
    args.validate()?;
    let base = &ctx.base;

    let mut prebias = args.bias_um.unwrap_or(0.0);
    let mut xy = args.xy_um;
    if xy < 0.0 {
        xy = -xy;
        prebias += xy;
    }

    let into_set = if args.into.is_empty() {
        ctx.active_air_slabs().clone()
    } else {
        union_all(&args.into.iter().map(|s| (**s).clone()).collect::<Vec<_>>())
    };
    let through_set = if args.through.is_empty() { None } else { Some(union_all(&args.through)) };
    let on_set = if args.on.is_empty() { None } else { Some(union_all(&args.on)) };

    let mut offset = base.delta;
    let mut layers = seed.clone();

    let into_given = !args.into.is_empty();
    let through_given = !args.through.is_empty();
    let on_given = !args.on.is_empty();
    if into_given || through_given || on_given {
        if offset == 0 {
            offset = (base.delta as f64 / 2.0).max(1.0) as i64;
            layers = layers.size(0, 0, offset);
        }
        layers = if on_given {
            layers.boolean(on_set.as_ref().unwrap(), BooleanMode::And)
        } else if through_given {
            layers.boolean(through_set.as_ref().unwrap(), BooleanMode::And)
        } else {
            layers.boolean(&into_set, BooleanMode::And)
        };
    }

    let pi = um_to_dbu(prebias, base.dbu);
    if pi < 0 {
        layers = layers.size(-pi, -pi, 0);
    } else if pi > 0 {
        return Err(EngineError::config("positive prebias in 3D grow/etch is not supported"));
    }

    let xyi = um_to_dbu(xy, base.dbu);
    let zi = um_to_dbu(args.z_um, base.dbu) - offset;

    layers = if xyi <= 0 {
        layers.size(0, 0, zi)
    } else {
        // `round` and `square` are identical in 3D (spec §9 compatibility note).
        layers.size(xyi, xyi, zi)
    };

    if let Some(through) = &through_set {
        layers = layers.boolean(through, BooleanMode::ASubB);
    }
    layers = layers.boolean(&into_set, BooleanMode::And);

    Ok(layers)
}

/// `grow` in 3D: consumes `into` (or `air`) with the produced material.
#[instrument(level = "debug", skip(ctx, seed, args))]
pub fn grow(ctx: &mut EngineContext3D, seed: &SlabStack, mut args: GrowEtchArgs3D) -> Result<SlabStack> {
    let result = produce_geom(ctx, seed, &args)?;

    if args.into.is_empty() {
        let air = ctx.active_air_slabs_mut();
        *air = air.boolean(&result, BooleanMode::ASubB);
    } else {
        for m in args.into.iter_mut() {
            **m = m.boolean(&result, BooleanMode::ASubB);
        }
    }
    Ok(result)
}

/// `etch` in 3D: requires non-empty `into`; removed material rejoins air.
#[instrument(level = "debug", skip(ctx, seed, args))]
pub fn etch(ctx: &mut EngineContext3D, seed: &SlabStack, mut args: GrowEtchArgs3D) -> Result<SlabStack> {
    if args.into.is_empty() {
        return Err(EngineError::config("'etch' requires a non-empty `into`"));
    }
    let result = produce_geom(ctx, seed, &args)?;

    for m in args.into.iter_mut() {
        let before = (**m).clone();
        **m = m.boolean(&result, BooleanMode::ASubB);
        let removed = before.boolean(m, BooleanMode::ASubB);
        let air = ctx.active_air_slabs_mut();
        *air = air.boolean(&removed, BooleanMode::Or);
    }
    Ok(result)
}

/// 3D `EngineContext` wrapper: owns the standing `SlabStack`s
/// (`air`/`air_below`/`bulk`) alongside the shared scalar parameters in
/// [`EngineContext`]. Kept separate from the 2D engine's `MaskSet`
/// standing regions since `MaterialRegion` dispatches on dimensionality
/// at the `ProcessRuntime` layer, not inside `EngineContext` itself.
pub struct EngineContext3D {
    pub base: EngineContext,
    pub air: SlabStack,
    pub air_below: SlabStack,
    pub bulk: SlabStack,
}

impl EngineContext3D {
    pub fn new(base: EngineContext) -> Self {
        EngineContext3D {
            base,
            air: SlabStack::new(),
            air_below: SlabStack::new(),
            bulk: SlabStack::new(),
        }
    }

    pub fn active_air_slabs(&self) -> &SlabStack {
        if self.base.flipped {
            &self.air_below
        } else {
            &self.air
        }
    }

    pub fn active_air_slabs_mut(&mut self) -> &mut SlabStack {
        if self.base.flipped {
            &mut self.air_below
        } else {
            &mut self.air
        }
    }
}

pub fn normalize_stack(slabs: Vec<Slab>) -> SlabStack {
    normalize(slabs)
}

/// The cut-level specifier for 3D [`planarize`], mirroring the 2D variant
/// in `slice_engine` but operating on `z` instead of `y`.
pub enum PlanarizeTo3D<'a> {
    Downto(&'a [SlabStack]),
    To(f64),
}

/// `planarize(into, downto|to, less)` lifted to slab granularity (spec
/// §4.4, applied per component table §2's "grow/etch/planarize over
/// SlabStacks"). Fails with `EngineError::Config` if `into` is empty.
#[instrument(level = "debug", skip(ctx, into))]
pub fn planarize(ctx: &mut EngineContext3D, into: &mut [&mut SlabStack], to: PlanarizeTo3D, less_um: Option<f64>) -> Result<()> {
    if into.is_empty() {
        return Err(EngineError::config("'planarize' requires a non-empty `into`"));
    }
    let base = &ctx.base;

    let mut cut_z = match to {
        PlanarizeTo3D::Downto(stacks) => {
            let mut lo_hi: Option<(i64, i64)> = None;
            for s in stacks {
                if let Some((lo, hi)) = s.z_extent() {
                    lo_hi = Some(match lo_hi {
                        Some((l, h)) => (l.min(lo), h.max(hi)),
                        None => (lo, hi),
                    });
                }
            }
            let (lo, hi) = lo_hi.ok_or_else(|| EngineError::config("'planarize' downto region is empty"))?;
            if base.flipped { lo } else { hi }
        },
        PlanarizeTo3D::To(to_um) => um_to_dbu(to_um, base.dbu),
    };

    if let Some(less_um) = less_um {
        let less_dbu = um_to_dbu(less_um, base.dbu);
        cut_z = if base.flipped { cut_z + less_dbu } else { cut_z - less_dbu };
    }

    let window = base.window();
    let full_mask = MaskSet(crate::geom::PolygonSet::single(crate::geom::Polygon::box_(
        window.min.x,
        window.min.y,
        window.max.x,
        window.max.y,
    )));
    let z_lo = -(base.depth + base.below);
    let z_hi = base.height;
    let removal = if base.flipped {
        SlabStack::single(Slab::new(full_mask, z_lo, (cut_z - z_lo).max(1)))
    } else {
        SlabStack::single(Slab::new(full_mask, cut_z, (z_hi - cut_z).max(1)))
    };

    for m in into.iter_mut() {
        let removed = m.boolean(&removal, BooleanMode::And);
        if !removed.is_empty() {
            let air = ctx.active_air_slabs_mut();
            *air = air.boolean(&removed, BooleanMode::Or);
        }
        **m = m.boolean(&removal, BooleanMode::ASubB);
    }
    Ok(())
}
