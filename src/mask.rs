//! `MaskSet` (spec §4.3): a container of polygons representing a
//! top-view set, with set algebra, sizing, rigid transforms, and
//! morphological cleanup.
//!
//! Per spec §9's "Cyclic ownership" redesign note, `MaskSet` is a plain
//! value type; operations that need `dbu` or a background region (e.g.
//! `inverted`) take them as explicit arguments instead of holding a
//! back-reference to the owning engine.

use tracing::instrument;

use crate::context::um_to_dbu;
use crate::errors::Result;
use crate::geom::{boolean, size as geom_size, BooleanMode, BBox, PolygonSet, SizeMode, Transform};
use crate::layer::LayerSpec;
use crate::layout::Layout;

/// A top-view polygon set (spec §4.3).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MaskSet(pub PolygonSet);

impl MaskSet {
    pub fn empty() -> Self {
        MaskSet(PolygonSet::new())
    }

    pub fn from_polygons(p: PolygonSet) -> Self {
        MaskSet(p)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn bbox(&self) -> Option<BBox> {
        self.0.bbox()
    }

    /// `self ← self ∪ o`.
    pub fn add(&mut self, o: &MaskSet) {
        self.0 = boolean(&self.0, &o.0, BooleanMode::Or);
    }

    /// `self ← self ∖ o`.
    pub fn sub(&mut self, o: &MaskSet) {
        self.0 = boolean(&self.0, &o.0, BooleanMode::ASubB);
    }

    /// `self ← self ∩ o`.
    pub fn mask(&mut self, o: &MaskSet) {
        self.0 = boolean(&self.0, &o.0, BooleanMode::And);
    }

    pub fn and_(&self, o: &MaskSet) -> MaskSet {
        MaskSet(boolean(&self.0, &o.0, BooleanMode::And))
    }

    pub fn or_(&self, o: &MaskSet) -> MaskSet {
        MaskSet(boolean(&self.0, &o.0, BooleanMode::Or))
    }

    pub fn not_(&self, o: &MaskSet) -> MaskSet {
        MaskSet(boolean(&self.0, &o.0, BooleanMode::ASubB))
    }

    pub fn xor(&self, o: &MaskSet) -> MaskSet {
        MaskSet(boolean(&self.0, &o.0, BooleanMode::Xor))
    }

    /// `background ⊕ self` — symmetric difference with the engine's
    /// background region.
    pub fn inverted(&self, background: &MaskSet) -> MaskSet {
        self.xor(background)
    }

    /// Sized copy, `dx`/`dy` in micrometres (`dy` defaults to `dx`).
    #[instrument(level = "debug", skip(self))]
    pub fn sized(&self, dx_um: f64, dy_um: Option<f64>, dbu: f64) -> MaskSet {
        let dy_um = dy_um.unwrap_or(dx_um);
        let dx = um_to_dbu(dx_um, dbu);
        let dy = um_to_dbu(dy_um, dbu);
        MaskSet(geom_size(&self.0, dx, dy, SizeMode::Square))
    }

    /// Sized copy, already in dbu (used internally by `close_gaps` /
    /// `remove_slivers`, whose 1-dbu offsets are not expressed in µm).
    fn sized_dbu(&self, dx: i64, dy: i64) -> MaskSet {
        MaskSet(geom_size(&self.0, dx, dy, SizeMode::Square))
    }

    pub fn transform(&self, t: &Transform) -> MaskSet {
        MaskSet(self.0.transformed(t))
    }

    /// Close small gaps: grow then shrink by 1 dbu along y, then along x,
    /// in that exact sequence (mirrors the original's per-axis ordering).
    pub fn close_gaps(&self) -> MaskSet {
        self.sized_dbu(0, 1).sized_dbu(0, -1).sized_dbu(1, 0).sized_dbu(-1, 0)
    }

    /// Remove slivers at the default 1 dbu tolerance.
    pub fn remove_slivers(&self) -> MaskSet {
        self.remove_slivers_with_radius(1)
    }

    /// Remove slivers: shrink then grow by `radius` dbu along y, then
    /// along x — an opening, the dual of [`Self::close_gaps`]. `radius`
    /// is exposed as a parameter (spec §9 Open Questions: sliver removal
    /// should be a configurable tolerance, not a hard-coded 1 dbu).
    pub fn remove_slivers_with_radius(&self, radius: i64) -> MaskSet {
        self.sized_dbu(0, -radius)
            .sized_dbu(0, radius)
            .sized_dbu(-radius, 0)
            .sized_dbu(radius, 0)
    }

    /// Load all shapes touching `bbox` on the layer resolved by
    /// `layer_spec` against `layout`'s declared layers (spec §4.3).
    /// Non-strict resolution: an unmatched spec loads nothing rather
    /// than failing, matching `layer()`'s internal use of `load`.
    #[instrument(level = "debug", skip(layout))]
    pub fn load(layout: &dyn Layout, cell: usize, bbox: BBox, layer_spec: &str) -> Result<MaskSet> {
        let spec = LayerSpec::parse(layer_spec, false)?;
        let mut result = MaskSet::empty();

        let layer_index = layout
            .layers()
            .iter()
            .find(|li| spec.matches(Some(li.layer), Some(li.datatype), li.name.as_deref()))
            .map(|li| li.index);

        let Some(layer_index) = layer_index else {
            return Ok(result);
        };

        for shape in layout.shapes_touching(cell, layer_index, bbox) {
            let polygon = shape.polygon.transformed(&shape.transform);
            result.0.push(polygon);
        }

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::Polygon;

    fn square(x0: i64, y0: i64, x1: i64, y1: i64) -> MaskSet {
        MaskSet(PolygonSet::single(Polygon::box_(x0, y0, x1, y1)))
    }

    #[test]
    fn add_union_grows_bbox() {
        let mut a = square(0, 0, 10, 10);
        let b = square(5, 5, 15, 15);
        a.add(&b);
        let bb = a.bbox().unwrap();
        assert_eq!((bb.min.x, bb.min.y, bb.max.x, bb.max.y), (0, 0, 15, 15));
    }

    #[test]
    fn sub_self_is_empty() {
        let a = square(0, 0, 10, 10);
        let mut b = a.clone();
        b.sub(&a);
        assert!(b.is_empty());
    }

    #[test]
    fn xor_self_is_empty() {
        let a = square(0, 0, 10, 10);
        assert!(a.xor(&a).is_empty());
    }

    #[test]
    fn and_is_subset_of_self() {
        let a = square(0, 0, 10, 10);
        let b = square(5, 5, 15, 15);
        let anded = a.and_(&b);
        let bb = anded.bbox().unwrap();
        assert_eq!((bb.min.x, bb.min.y, bb.max.x, bb.max.y), (5, 5, 10, 10));
    }

    #[test]
    fn sized_grows_bbox_for_positive_delta() {
        let a = square(0, 0, 1000, 1000);
        let grown = a.sized(0.001, None, 0.001);
        let bb = grown.bbox().unwrap();
        assert_eq!((bb.min.x, bb.min.y, bb.max.x, bb.max.y), (-1, -1, 1001, 1001));
    }
}
