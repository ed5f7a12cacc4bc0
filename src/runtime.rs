//! `ProcessRuntime` (spec §4.7): binds a process script to the engine's
//! `layer`/`mask`/`air`/`bulk`/`deposit`/`grow`/`etch`/`planarize`/`flip`/
//! `output` surface and executes the script with these names in scope.
//!
//! Per spec §9's "Dynamic script dispatch" note, the script surface is a
//! typed capability record rather than a dictionary of bound methods: the
//! capability functions are registered as native `rhai` functions and
//! methods on two opaque script-level types (`MaskSet`, `Material`), and
//! the interpreter evaluates the script text against that registration.
//! `rhai` is this corpus's embedded end-user scripting engine, matching
//! how other script-driven tools in the pack sandbox user code.

use std::sync::{Arc, Mutex};

use rhai::{Array, Engine, Map, Scope, FLOAT};
use tracing::instrument;

use crate::config::EngineConfig;
use crate::context::{um_to_dbu, EngineContext};
use crate::errors::{EngineError, Result};
use crate::export::{random_color, validate_color, OutputRecord, MIN_EXPORT_SLAB_THICKNESS};
use crate::geom::{boolean, BBox, BooleanMode, Edge, Polygon, PolygonSet, ProfileMode};
use crate::layer::LayerSpec;
use crate::layout::Layout;
use crate::mask::MaskSet;
use crate::region::MaterialRegion;
use crate::slab::{Slab, SlabStack};
use crate::slice_engine::{self, GrowEtchArgs, MaskRegion, PlanarizeTo};
use crate::stack_engine::{self, EngineContext3D, GrowEtchArgs3D, PlanarizeTo3D};

/// Which dimensionality the runtime was built for — a ruler segment
/// selects the 2D cross-section engine, its absence the full-layout 3D
/// engine (spec §1).
enum Mode {
    TwoD { ctx: EngineContext, ruler: Edge },
    ThreeD { ctx: EngineContext3D },
}

/// Tag for the two standing regions every engine instance owns (spec
/// §3). `air` resolves through `EngineContext::active_air` so a `flip()`
/// transparently swaps to `air_below`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StandingTag {
    Air,
    Bulk,
}

struct Inner {
    mode: Mode,
    layout: Box<dyn Layout + Send + Sync>,
    cell: usize,
    outputs: Vec<OutputRecord>,
}

impl Inner {
    fn get_standing(&self, tag: StandingTag) -> MaterialRegion {
        match (&self.mode, tag) {
            (Mode::TwoD { ctx, .. }, StandingTag::Air) => MaterialRegion::Mask(ctx.active_air().clone()),
            (Mode::TwoD { ctx, .. }, StandingTag::Bulk) => MaterialRegion::Mask(ctx.bulk.clone()),
            (Mode::ThreeD { ctx }, StandingTag::Air) => MaterialRegion::Slab(ctx.active_air_slabs().clone()),
            (Mode::ThreeD { ctx }, StandingTag::Bulk) => MaterialRegion::Slab(ctx.bulk.clone()),
        }
    }

    fn set_standing(&mut self, tag: StandingTag, region: MaterialRegion) {
        match (&mut self.mode, tag, region) {
            (Mode::TwoD { ctx, .. }, StandingTag::Air, MaterialRegion::Mask(m)) => *ctx.active_air_mut() = m,
            (Mode::TwoD { ctx, .. }, StandingTag::Bulk, MaterialRegion::Mask(m)) => ctx.bulk = m,
            (Mode::ThreeD { ctx }, StandingTag::Air, MaterialRegion::Slab(s)) => *ctx.active_air_slabs_mut() = s,
            (Mode::ThreeD { ctx }, StandingTag::Bulk, MaterialRegion::Slab(s)) => ctx.bulk = s,
            _ => unreachable!("standing region dimensionality mismatch"),
        }
    }

    fn dbu(&self) -> f64 {
        match &self.mode {
            Mode::TwoD { ctx, .. } => ctx.dbu,
            Mode::ThreeD { ctx } => ctx.base.dbu,
        }
    }

    fn roi(&self) -> BBox {
        match &self.mode {
            Mode::TwoD { ctx, .. } => ctx.window(),
            Mode::ThreeD { ctx } => ctx.base.window(),
        }
    }
}

/// A script-visible mask pattern: the raw polygon set named by `layer()`
/// or combined with set algebra, before it is seeded via `mask()`.
#[derive(Clone)]
pub struct MaskSetHandle(MaskSet);

/// A script-visible material: either a live alias of a standing region
/// (`air()`/`bulk()`) or an ordinary value produced by `mask()`,
/// `grow()`, `etch()`, or boolean combination.
#[derive(Clone)]
pub struct MaterialHandle {
    runtime: Arc<Mutex<Inner>>,
    slot: Slot,
}

#[derive(Clone)]
enum Slot {
    Standing(StandingTag),
    Seed(Arc<MaskRegion2DOr3D>),
    Detached(Arc<Mutex<MaterialRegion>>),
}

/// A seed (spec's "MaskRegion"): the mask-pattern/air-boundary pairing
/// `mask()`/`all()` produce, dimensionality-tagged. Seeds are immutable
/// values — `grow`/`etch` read them but never write back into them,
/// matching the original tool's seed-object semantics.
enum MaskRegion2DOr3D {
    TwoD(MaskRegion),
    ThreeD(SlabStack),
}

impl MaterialHandle {
    fn standing(runtime: Arc<Mutex<Inner>>, tag: StandingTag) -> Self {
        MaterialHandle { runtime, slot: Slot::Standing(tag) }
    }

    fn seed_2d(runtime: Arc<Mutex<Inner>>, region: MaskRegion) -> Self {
        MaterialHandle { runtime, slot: Slot::Seed(Arc::new(MaskRegion2DOr3D::TwoD(region))) }
    }

    fn seed_3d(runtime: Arc<Mutex<Inner>>, stack: SlabStack) -> Self {
        MaterialHandle { runtime, slot: Slot::Seed(Arc::new(MaskRegion2DOr3D::ThreeD(stack))) }
    }

    fn detached(runtime: Arc<Mutex<Inner>>, region: MaterialRegion) -> Self {
        MaterialHandle { runtime, slot: Slot::Detached(Arc::new(Mutex::new(region))) }
    }

    /// Read the current value, resolving a `Standing` alias against live
    /// engine state and a `Seed` to the mask_polygons/full-height slab it
    /// wraps (used when a seed is itself passed as an `into`/`through`
    /// target, which the grammar permits).
    fn get(&self) -> MaterialRegion {
        match &self.slot {
            Slot::Standing(tag) => self.runtime.lock().unwrap().get_standing(*tag),
            Slot::Detached(cell) => cell.lock().unwrap().clone(),
            Slot::Seed(region) => match region.as_ref() {
                MaskRegion2DOr3D::TwoD(r) => MaterialRegion::Mask(r.mask_polygons.clone()),
                MaskRegion2DOr3D::ThreeD(s) => MaterialRegion::Slab(s.clone()),
            },
        }
    }

    fn set(&self, region: MaterialRegion) {
        match &self.slot {
            Slot::Standing(tag) => self.runtime.lock().unwrap().set_standing(*tag, region),
            Slot::Detached(cell) => *cell.lock().unwrap() = region,
            Slot::Seed(_) => {}, // seeds are immutable; see `get`'s doc comment
        }
    }
}

/// `ProcessRuntime`: owns one engine instance and executes process
/// scripts against it (spec §4.7).
pub struct ProcessRuntime {
    inner: Arc<Mutex<Inner>>,
}

impl ProcessRuntime {
    /// Build a 2D (cross-section) runtime for the given ruler.
    pub fn new_2d(layout: Box<dyn Layout + Send + Sync>, ruler: Edge, config: &EngineConfig) -> Self {
        let width = ruler.dx().abs().max(ruler.dy().abs()).max(1);
        let mut ctx = EngineContext::new(
            config.dbu,
            width,
            um_to_dbu(config.height, config.dbu),
            um_to_dbu(config.depth, config.dbu),
            um_to_dbu(config.below, config.dbu),
            um_to_dbu(config.extend, config.dbu),
            um_to_dbu(config.delta, config.dbu),
        );
        ctx.thickness_scale = config.thickness_scale.unwrap_or(1.0);
        ctx.air = MaskSet(PolygonSet::single(Polygon::box_(-ctx.extend, 0, ctx.width + ctx.extend, ctx.height)));
        ctx.air_below = MaskSet(PolygonSet::single(Polygon::box_(
            -ctx.extend,
            -(ctx.depth + ctx.below),
            ctx.width + ctx.extend,
            0,
        )));
        ctx.bulk = MaskSet(PolygonSet::single(Polygon::box_(
            -ctx.extend,
            -(ctx.depth + ctx.below),
            ctx.width + ctx.extend,
            0,
        )));

        let inner = Inner { mode: Mode::TwoD { ctx, ruler }, layout, cell: 0, outputs: Vec::new() };
        ProcessRuntime { inner: Arc::new(Mutex::new(inner)) }
    }

    /// Build a 3D runtime over the layout's full bounding box (spec §1:
    /// "the full layout bounding box (in 3D mode)").
    pub fn new_3d(layout: Box<dyn Layout + Send + Sync>, width: i64, config: &EngineConfig) -> Self {
        let base = EngineContext::new(
            config.dbu,
            width,
            um_to_dbu(config.height, config.dbu),
            um_to_dbu(config.depth, config.dbu),
            um_to_dbu(config.below, config.dbu),
            um_to_dbu(config.extend, config.dbu),
            um_to_dbu(config.delta, config.dbu),
        );
        let mut ctx3d = EngineContext3D::new(base);
        let b = &ctx3d.base;
        let z_lo = -(b.depth + b.below);
        let full_box = MaskSet(PolygonSet::single(Polygon::box_(-b.extend, z_lo, b.width + b.extend, b.height)));
        ctx3d.air = SlabStack::single(Slab::new(full_box.clone(), 0, b.height.max(1)));
        ctx3d.air_below = SlabStack::single(Slab::new(full_box.clone(), z_lo, (0 - z_lo).max(1)));
        ctx3d.bulk = SlabStack::single(Slab::new(full_box, -b.depth, b.depth.max(1)));

        let inner = Inner { mode: Mode::ThreeD { ctx: ctx3d }, layout, cell: 0, outputs: Vec::new() };
        ProcessRuntime { inner: Arc::new(Mutex::new(inner)) }
    }

    /// Execute `src` against this runtime's capability record (spec
    /// §4.7). A Rhai evaluation error is wrapped as `EngineError::Script`.
    #[instrument(level = "info", skip(self, src))]
    pub fn run_script(&self, src: &str) -> Result<()> {
        let engine = self.build_engine();
        let mut scope = Scope::new();
        engine
            .run_with_scope(&mut scope, src)
            .map_err(|e| EngineError::Script(e.to_string()))
    }

    pub fn outputs(&self) -> Vec<OutputRecord> {
        self.inner.lock().unwrap().outputs.clone()
    }

    /// The wafer body's full extent, for the tech file's always-present
    /// substrate block (spec §6, grounded on the original always writing
    /// a layer-255 "Substrate" block regardless of explicit `output`
    /// calls on `bulk()`).
    pub fn substrate_block(&self) -> Option<(i64, i64, [f32; 4])> {
        let inner = self.inner.lock().unwrap();
        match &inner.mode {
            Mode::ThreeD { ctx } => {
                let (lo, hi) = ctx.bulk.z_extent()?;
                Some((lo, hi - lo, [0.3, 0.3, 0.3, 1.0]))
            },
            Mode::TwoD { .. } => None,
        }
    }

    fn build_engine(&self) -> Engine {
        let mut engine = Engine::new();
        engine.register_type_with_name::<MaskSetHandle>("MaskSet");
        engine.register_type_with_name::<MaterialHandle>("Material");

        let rt = self.inner.clone();

        let r = rt.clone();
        engine.register_result_fn("layer", move |spec: &str| -> std::result::Result<MaskSetHandle, Box<rhai::EvalAltResult>> {
            script_layer(&r, spec).map_err(to_rhai_err)
        });

        let r = rt.clone();
        engine.register_fn("mask", move |h: MaskSetHandle| -> MaterialHandle { script_mask(&r, &h.0) });

        let r = rt.clone();
        engine.register_fn("all", move || -> MaterialHandle { script_all(&r) });

        let r = rt.clone();
        engine.register_fn("air", move || -> MaterialHandle { MaterialHandle::standing(r.clone(), StandingTag::Air) });

        let r = rt.clone();
        engine.register_fn("bulk", move || -> MaterialHandle { MaterialHandle::standing(r.clone(), StandingTag::Bulk) });

        let r = rt.clone();
        engine.register_fn("flip", move || {
            let mut inner = r.lock().unwrap();
            match &mut inner.mode {
                Mode::TwoD { ctx, .. } => ctx.flip(),
                Mode::ThreeD { ctx } => ctx.base.flip(),
            }
        });

        register_mask_ops(&mut engine, &rt);
        register_grow_etch(&mut engine, &rt);
        register_planarize(&mut engine, &rt);
        register_output(&mut engine, &rt);
        register_setters(&mut engine, &rt);

        engine
    }
}

fn to_rhai_err(e: EngineError) -> Box<rhai::EvalAltResult> {
    e.to_string().into()
}

fn script_layer(rt: &Arc<Mutex<Inner>>, spec: &str) -> Result<MaskSetHandle> {
    let inner = rt.lock().unwrap();
    let bbox = inner.roi();
    MaskSet::load(inner.layout.as_ref(), inner.cell, bbox, spec).map(MaskSetHandle)
}

fn script_mask(rt: &Arc<Mutex<Inner>>, mask: &MaskSet) -> MaterialHandle {
    let inner = rt.lock().unwrap();
    match &inner.mode {
        Mode::TwoD { ctx, ruler } => {
            let region = slice_engine::mask_to_seed(ctx, mask, *ruler);
            drop(inner);
            MaterialHandle::seed_2d(rt.clone(), region)
        },
        Mode::ThreeD { ctx } => {
            let air = ctx.active_air_slabs().clone();
            let stack = stack_engine::mask_to_seed(&ctx.base, mask, &air);
            drop(inner);
            MaterialHandle::seed_3d(rt.clone(), stack)
        },
    }
}

/// `all()` (spec §4.7): a pseudo-mask covering the whole processing
/// window, pre-seeded at the air boundary.
fn script_all(rt: &Arc<Mutex<Inner>>) -> MaterialHandle {
    let inner = rt.lock().unwrap();
    match &inner.mode {
        Mode::TwoD { ctx, .. } => {
            let full = MaskSet(PolygonSet::single(Polygon::box_(
                -ctx.extend,
                -(ctx.depth + ctx.below),
                ctx.width + ctx.extend,
                ctx.height,
            )));
            let region = MaskRegion { mask_polygons: full, air_snapshot: ctx.active_air().clone() };
            drop(inner);
            MaterialHandle::seed_2d(rt.clone(), region)
        },
        Mode::ThreeD { ctx } => {
            let b = &ctx.base;
            let full =
                MaskSet(PolygonSet::single(Polygon::box_(-b.extend, -(b.depth + b.below), b.width + b.extend, b.height)));
            let air = ctx.active_air_slabs().clone();
            let stack = stack_engine::mask_to_seed(b, &full, &air);
            drop(inner);
            MaterialHandle::seed_3d(rt.clone(), stack)
        },
    }
}

fn register_mask_ops(engine: &mut Engine, rt: &Arc<Mutex<Inner>>) {
    engine.register_fn("and_", |a: &mut MaskSetHandle, b: MaskSetHandle| MaskSetHandle(a.0.and_(&b.0)));
    engine.register_fn("or_", |a: &mut MaskSetHandle, b: MaskSetHandle| MaskSetHandle(a.0.or_(&b.0)));
    engine.register_fn("not_", |a: &mut MaskSetHandle, b: MaskSetHandle| MaskSetHandle(a.0.not_(&b.0)));
    engine.register_fn("xor", |a: &mut MaskSetHandle, b: MaskSetHandle| MaskSetHandle(a.0.xor(&b.0)));
    engine.register_fn("+", |a: MaskSetHandle, b: MaskSetHandle| MaskSetHandle(a.0.or_(&b.0)));
    engine.register_fn("-", |a: MaskSetHandle, b: MaskSetHandle| MaskSetHandle(a.0.not_(&b.0)));
    engine.register_fn("&", |a: MaskSetHandle, b: MaskSetHandle| MaskSetHandle(a.0.and_(&b.0)));
    engine.register_fn("^", |a: MaskSetHandle, b: MaskSetHandle| MaskSetHandle(a.0.xor(&b.0)));
    engine.register_fn("close_gaps", |h: &mut MaskSetHandle| MaskSetHandle(h.0.close_gaps()));
    engine.register_fn("remove_slivers", |h: &mut MaskSetHandle| MaskSetHandle(h.0.remove_slivers()));

    let r = rt.clone();
    engine.register_fn("sized", move |h: &mut MaskSetHandle, dx_um: FLOAT| -> MaskSetHandle {
        let dbu = r.lock().unwrap().dbu();
        MaskSetHandle(h.0.sized(dx_um, None, dbu))
    });
}

/// Pull a `into`/`through`/`on` field (a single `Material` or an array of
/// them) out of a Rhai options map.
fn extract_materials(map: &Map, key: &str) -> Vec<MaterialHandle> {
    let Some(v) = map.get(key) else { return Vec::new() };
    if let Some(arr) = v.clone().try_cast::<Array>() {
        arr.into_iter().filter_map(|d| d.try_cast::<MaterialHandle>()).collect()
    } else if let Some(h) = v.clone().try_cast::<MaterialHandle>() {
        vec![h]
    } else {
        Vec::new()
    }
}

fn opt_float(map: &Map, key: &str) -> Option<f64> {
    map.get(key).and_then(|v| {
        if let Ok(f) = v.as_float() {
            Some(f)
        } else {
            v.as_int().ok().map(|i| i as f64)
        }
    })
}

fn opt_string(map: &Map, key: &str) -> Option<String> {
    map.get(key).and_then(|v| v.clone().into_string().ok())
}

fn parse_mode(map: &Map) -> Result<ProfileMode> {
    match opt_string(map, "mode").as_deref() {
        None => Ok(ProfileMode::Square),
        Some(s) => ProfileMode::parse(s).ok_or_else(|| EngineError::config(format!("unknown grow/etch mode {s:?}"))),
    }
}

fn register_grow_etch(engine: &mut Engine, rt: &Arc<Mutex<Inner>>) {
    for (name, is_etch) in [("grow", false), ("etch", true)] {
        let r = rt.clone();
        engine.register_result_fn(
            name,
            move |seed: &mut MaterialHandle, z_um: FLOAT, opts: Map| -> std::result::Result<MaterialHandle, Box<rhai::EvalAltResult>> {
                run_grow_etch(&r, seed, z_um, &opts, is_etch).map_err(to_rhai_err)
            },
        );
        let r = rt.clone();
        engine.register_result_fn(
            name,
            move |seed: &mut MaterialHandle, z_um: FLOAT| -> std::result::Result<MaterialHandle, Box<rhai::EvalAltResult>> {
                run_grow_etch(&r, seed, z_um, &Map::new(), is_etch).map_err(to_rhai_err)
            },
        );
    }

    // `deposit`/`diffuse`/`grow` alias to `all().grow(...)`; `etch` to
    // `all().etch(...)` (spec §4.7, grounded on the original's
    // `XSectionGenerator.deposit`/`diffuse`/`etch` delegating to
    // `self.all().grow(...)`/`self.all().etch(...)`).
    for (name, is_etch) in [("deposit", false), ("diffuse", false), ("grow", false), ("etch", true)] {
        let r = rt.clone();
        engine.register_result_fn(
            name,
            move |z_um: FLOAT, opts: Map| -> std::result::Result<MaterialHandle, Box<rhai::EvalAltResult>> {
                let seed = script_all(&r);
                run_grow_etch(&r, &seed, z_um, &opts, is_etch).map_err(to_rhai_err)
            },
        );
        let r = rt.clone();
        engine.register_result_fn(name, move |z_um: FLOAT| -> std::result::Result<MaterialHandle, Box<rhai::EvalAltResult>> {
            let seed = script_all(&r);
            run_grow_etch(&r, &seed, z_um, &Map::new(), is_etch).map_err(to_rhai_err)
        });
    }
}

fn run_grow_etch(rt: &Arc<Mutex<Inner>>, seed: &MaterialHandle, z_um: f64, opts: &Map, is_etch: bool) -> Result<MaterialHandle> {
    let into = extract_materials(opts, "into");
    let through = extract_materials(opts, "through");
    let on = extract_materials(opts, "on");
    let mode = parse_mode(opts)?;
    let taper = opt_float(opts, "taper");
    let bias = opt_float(opts, "bias");
    let buried = opt_float(opts, "buried");
    let xy = opt_float(opts, "xy").unwrap_or(0.0);

    // Resolve handle contents before taking `inner`'s lock: a `Standing`
    // handle's `get()` locks the same mutex, and `std::sync::Mutex` is not
    // reentrant (e.g. `etch(z, into=[bulk()])` would otherwise deadlock).
    let is_2d = matches!(rt.lock().unwrap().mode, Mode::TwoD { .. });

    if is_2d {
        let mut into_masks: Vec<MaskSet> = into.iter().map(|h| as_mask(h.get())).collect::<Result<_>>()?;
        let through_masks: Vec<MaskSet> = through.iter().map(|h| as_mask(h.get())).collect::<Result<_>>()?;
        let on_masks: Vec<MaskSet> = on.iter().map(|h| as_mask(h.get())).collect::<Result<_>>()?;

        let mut inner = rt.lock().unwrap();
        let Slot::Seed(region) = &seed.slot else {
            return Err(EngineError::config("grow/etch seed must come from mask() or all()"));
        };
        let MaskRegion2DOr3D::TwoD(region) = region.as_ref() else {
            return Err(EngineError::config("2D engine received a 3D seed"));
        };

        let Mode::TwoD { ctx, .. } = &mut inner.mode else { unreachable!() };
        let args = GrowEtchArgs {
            z_um,
            xy_um: xy,
            into: into_masks.iter_mut().collect(),
            through: through_masks,
            on: on_masks,
            mode,
            taper_deg: taper,
            bias_um: bias,
            buried_um: buried,
        };
        let result = if is_etch { slice_engine::etch(ctx, region, args)? } else { slice_engine::grow(ctx, region, args)? };
        drop(inner);
        for (h, m) in into.iter().zip(into_masks) {
            h.set(MaterialRegion::Mask(m));
        }
        Ok(MaterialHandle::detached(rt.clone(), MaterialRegion::Mask(result)))
    } else {
        let mut into_stacks: Vec<SlabStack> = into.iter().map(|h| as_slab(h.get())).collect::<Result<_>>()?;
        let through_stacks: Vec<SlabStack> = through.iter().map(|h| as_slab(h.get())).collect::<Result<_>>()?;
        let on_stacks: Vec<SlabStack> = on.iter().map(|h| as_slab(h.get())).collect::<Result<_>>()?;

        let mut inner = rt.lock().unwrap();
        let Slot::Seed(region) = &seed.slot else {
            return Err(EngineError::config("grow/etch seed must come from mask() or all()"));
        };
        let MaskRegion2DOr3D::ThreeD(region) = region.as_ref() else {
            return Err(EngineError::config("3D engine received a 2D seed"));
        };

        let Mode::ThreeD { ctx } = &mut inner.mode else { unreachable!() };
        let args = GrowEtchArgs3D {
            z_um,
            xy_um: xy,
            into: into_stacks.iter_mut().collect(),
            through: through_stacks,
            on: on_stacks,
            mode,
            taper_deg: taper,
            bias_um: bias,
        };
        let result = if is_etch { stack_engine::etch(ctx, region, args)? } else { stack_engine::grow(ctx, region, args)? };
        drop(inner);
        for (h, s) in into.iter().zip(into_stacks) {
            h.set(MaterialRegion::Slab(s));
        }
        Ok(MaterialHandle::detached(rt.clone(), MaterialRegion::Slab(result)))
    }
}

fn as_mask(r: MaterialRegion) -> Result<MaskSet> {
    r.as_mask().cloned().ok_or_else(|| EngineError::config("expected a 2D material"))
}

fn as_slab(r: MaterialRegion) -> Result<SlabStack> {
    r.as_slab().cloned().ok_or_else(|| EngineError::config("expected a 3D material"))
}

fn register_planarize(engine: &mut Engine, rt: &Arc<Mutex<Inner>>) {
    let r = rt.clone();
    engine.register_result_fn("planarize", move |opts: Map| -> std::result::Result<(), Box<rhai::EvalAltResult>> {
        run_planarize(&r, &opts).map_err(to_rhai_err)
    });
}

fn run_planarize(rt: &Arc<Mutex<Inner>>, opts: &Map) -> Result<()> {
    let into = extract_materials(opts, "into");
    let downto = extract_materials(opts, "downto");
    let to = opt_float(opts, "to");
    let less = opt_float(opts, "less");

    if into.is_empty() {
        return Err(EngineError::config("'planarize' requires a non-empty `into`"));
    }

    // As in `run_grow_etch`: resolve handles (which may re-lock `rt` for a
    // `Standing` alias) before taking the lock ourselves.
    let is_2d = matches!(rt.lock().unwrap().mode, Mode::TwoD { .. });

    if is_2d {
        let mut into_masks: Vec<MaskSet> = into.iter().map(|h| as_mask(h.get())).collect::<Result<_>>()?;
        let downto_masks: Vec<MaskSet> = downto.iter().map(|h| as_mask(h.get())).collect::<Result<_>>()?;
        let spec = if !downto_masks.is_empty() {
            PlanarizeTo::Downto(&downto_masks)
        } else {
            PlanarizeTo::To(to.ok_or_else(|| EngineError::config("'planarize' requires `to` or `downto`"))?)
        };
        let mut inner = rt.lock().unwrap();
        let Mode::TwoD { ctx, .. } = &mut inner.mode else { unreachable!() };
        let mut refs: Vec<&mut MaskSet> = into_masks.iter_mut().collect();
        slice_engine::planarize(ctx, &mut refs, spec, less)?;
        drop(inner);
        for (h, m) in into.iter().zip(into_masks) {
            h.set(MaterialRegion::Mask(m));
        }
    } else {
        let mut into_stacks: Vec<SlabStack> = into.iter().map(|h| as_slab(h.get())).collect::<Result<_>>()?;
        let downto_stacks: Vec<SlabStack> = downto.iter().map(|h| as_slab(h.get())).collect::<Result<_>>()?;
        let spec = if !downto_stacks.is_empty() {
            PlanarizeTo3D::Downto(&downto_stacks)
        } else {
            PlanarizeTo3D::To(to.ok_or_else(|| EngineError::config("'planarize' requires `to` or `downto`"))?)
        };
        let mut inner = rt.lock().unwrap();
        let Mode::ThreeD { ctx } = &mut inner.mode else { unreachable!() };
        let mut refs: Vec<&mut SlabStack> = into_stacks.iter_mut().collect();
        stack_engine::planarize(ctx, &mut refs, spec, less)?;
        drop(inner);
        for (h, s) in into.iter().zip(into_stacks) {
            h.set(MaterialRegion::Slab(s));
        }
    }
    Ok(())
}

fn register_output(engine: &mut Engine, rt: &Arc<Mutex<Inner>>) {
    let r = rt.clone();
    engine.register_result_fn(
        "output",
        move |spec: &str, material: MaterialHandle| -> std::result::Result<(), Box<rhai::EvalAltResult>> {
            run_output(&r, spec, &material, None).map_err(to_rhai_err)
        },
    );
    let r = rt.clone();
    engine.register_result_fn(
        "output",
        move |spec: &str, material: MaterialHandle, color: Array| -> std::result::Result<(), Box<rhai::EvalAltResult>> {
            let c = array_to_color(&color).map_err(to_rhai_err)?;
            run_output(&r, spec, &material, Some(c)).map_err(to_rhai_err)
        },
    );
}

fn array_to_color(a: &Array) -> Result<[f32; 4]> {
    if a.len() != 3 && a.len() != 4 {
        return Err(EngineError::config("color must be an array of 3 (rgb) or 4 (rgba) floats"));
    }
    let get = |i: usize| -> f32 { a.get(i).and_then(|d| d.as_float().ok()).unwrap_or(0.0) as f32 };
    let color = [get(0), get(1), get(2), if a.len() == 4 { get(3) } else { 1.0 }];
    validate_color(color)?;
    Ok(color)
}

fn run_output(rt: &Arc<Mutex<Inner>>, spec: &str, material: &MaterialHandle, color: Option<[f32; 4]>) -> Result<()> {
    let layer_spec = LayerSpec::parse(spec, true)?;
    let layer_no = layer_spec.layer.unwrap_or(0);
    let datatype = layer_spec.datatype.unwrap_or(0);
    let name = layer_spec.name.clone().unwrap_or_default();

    // Resolve the handle before locking: a `Standing` handle's `get()`
    // would otherwise re-lock this same mutex and deadlock.
    let region = material.get();
    let mut inner = rt.lock().unwrap();
    let roi = inner.roi();

    match region {
        MaterialRegion::Mask(m) => {
            let roi_poly = PolygonSet::single(Polygon::box_(roi.min.x, roi.min.y, roi.max.x, roi.max.y));
            let clipped = boolean(&m.0, &roi_poly, BooleanMode::And);
            for p in clipped.0 {
                inner.outputs.push(OutputRecord::Polygon2D {
                    layer: layer_no,
                    datatype,
                    name: name.clone(),
                    polygon: p,
                });
            }
        },
        MaterialRegion::Slab(stack) => {
            let roi_poly = PolygonSet::single(Polygon::box_(roi.min.x, roi.min.y, roi.max.x, roi.max.y));
            let color = color.unwrap_or_else(random_color);
            for (idx, slab) in stack.0.iter().enumerate() {
                if slab.thickness < MIN_EXPORT_SLAB_THICKNESS {
                    continue;
                }
                let clipped = boolean(&slab.mask.0, &roi_poly, BooleanMode::And);
                if clipped.is_empty() {
                    continue;
                }
                let layer_name = format!("{} ({}-{})", name, slab.z_bottom, slab.z_top());
                for p in clipped.0 {
                    inner.outputs.push(OutputRecord::Polygon2D {
                        layer: layer_no + idx as i64,
                        datatype,
                        name: layer_name.clone(),
                        polygon: p,
                    });
                }
                inner.outputs.push(OutputRecord::Slab3D {
                    layer: layer_no + idx as i64,
                    datatype,
                    name: layer_name,
                    z_bottom: slab.z_bottom,
                    thickness: slab.thickness,
                    color,
                });
            }
        },
    }
    Ok(())
}

fn register_setters(engine: &mut Engine, rt: &Arc<Mutex<Inner>>) {
    macro_rules! setter {
        ($name:literal, $field:ident) => {
            let r = rt.clone();
            engine.register_fn($name, move |v: FLOAT| {
                let mut inner = r.lock().unwrap();
                match &mut inner.mode {
                    Mode::TwoD { ctx, .. } => ctx.$field = um_to_dbu(v, ctx.dbu),
                    Mode::ThreeD { ctx } => ctx.base.$field = um_to_dbu(v, ctx.base.dbu),
                }
            });
        };
    }
    setter!("set_height", height);
    setter!("set_depth", depth);
    setter!("set_below", below);
    setter!("set_extend", extend);
    setter!("set_delta", delta);

    let r = rt.clone();
    engine.register_fn("set_dbu", move |v: FLOAT| {
        let mut inner = r.lock().unwrap();
        match &mut inner.mode {
            Mode::TwoD { ctx, .. } => ctx.dbu = v,
            Mode::ThreeD { ctx } => ctx.base.dbu = v,
        }
    });

    let r = rt.clone();
    engine.register_fn("set_thickness_scale", move |v: FLOAT| {
        let mut inner = r.lock().unwrap();
        match &mut inner.mode {
            Mode::TwoD { ctx, .. } => ctx.thickness_scale = v,
            Mode::ThreeD { ctx } => ctx.base.thickness_scale = v,
        }
    });
}
