//! `Slab` / `SlabStack` (spec §4.5): the 3D analogue of `MaskSet`, an
//! ordered list of non-overlapping `(mask, z_bottom, thickness)`
//! vertical layers.
//!
//! `normalize` is reformulated here as a z-coordinate sweep rather than
//! the original's recursive worklist splitting (`split_overlapping_z` in
//! `geometry_3d.py`): collect every slab's bottom/top as breakpoints,
//! union the masks covering each elementary interval, then merge
//! same-mask adjacent runs. This produces the same sorted,
//! non-overlapping, same-mask-merged result (spec's invariants N1/N2)
//! with a plain sweep instead of list-splicing recursion.

use tracing::instrument;

use crate::geom::{size as geom_size, BooleanMode, SizeMode};
use crate::mask::MaskSet;

/// One vertical layer: a mask valid over `[z_bottom, z_bottom + thickness)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slab {
    pub mask: MaskSet,
    pub z_bottom: i64,
    pub thickness: i64,
}

impl Slab {
    pub fn new(mask: MaskSet, z_bottom: i64, thickness: i64) -> Self {
        debug_assert!(thickness > 0, "slab thickness must be positive");
        Slab { mask, z_bottom, thickness }
    }

    pub fn z_top(&self) -> i64 {
        self.z_bottom + self.thickness
    }

    fn z_overlaps(&self, other: &Slab) -> bool {
        self.z_bottom < other.z_top() && other.z_bottom < self.z_top()
    }
}

/// A sorted, normalized list of non-overlapping [`Slab`]s.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SlabStack(pub Vec<Slab>);

impl SlabStack {
    pub fn new() -> Self {
        SlabStack(Vec::new())
    }

    pub fn single(slab: Slab) -> Self {
        SlabStack(vec![slab])
    }

    pub fn from_unnormalized(slabs: Vec<Slab>) -> Self {
        normalize(slabs)
    }

    pub fn is_empty(&self) -> bool {
        self.0.iter().all(|s| s.mask.is_empty())
    }

    /// `(z_bottom, z_top)` spanning every slab, or `None` if empty.
    pub fn z_extent(&self) -> Option<(i64, i64)> {
        let lo = self.0.iter().map(|s| s.z_bottom).min()?;
        let hi = self.0.iter().map(|s| s.z_top()).max()?;
        Some((lo, hi))
    }

    #[instrument(level = "debug", skip(self, other))]
    pub fn boolean(&self, other: &SlabStack, mode: BooleanMode) -> SlabStack {
        boolean(&self.0, &other.0, mode)
    }

    /// `size(layers, dx, dy, dz)` — 2D-size every mask, expand the z
    /// range by `dz` on both ends, renormalize (spec §4.5 "Sizing").
    pub fn size(&self, dx: i64, dy: i64, dz: i64) -> SlabStack {
        let sized: Vec<Slab> = self
            .0
            .iter()
            .map(|s| {
                Slab::new(
                    MaskSet(geom_size(&s.mask.0, dx, dy, SizeMode::Square)),
                    s.z_bottom - dz,
                    s.thickness + 2 * dz,
                )
            })
            .collect();
        normalize(sized)
    }

    pub fn push_and_normalize(&mut self, slab: Slab) {
        let mut all = std::mem::take(&mut self.0);
        all.push(slab);
        *self = normalize(all);
    }
}

/// Normalization pipeline: sort, split overlapping z-ranges (union
/// masks per elementary interval), merge adjacent same-mask runs.
pub fn normalize(mut slabs: Vec<Slab>) -> SlabStack {
    slabs.retain(|s| s.thickness > 0);
    if slabs.is_empty() {
        return SlabStack::new();
    }

    let mut breakpoints: Vec<i64> = slabs.iter().flat_map(|s| [s.z_bottom, s.z_top()]).collect();
    breakpoints.sort_unstable();
    breakpoints.dedup();

    let mut out = Vec::new();
    for w in breakpoints.windows(2) {
        let (lo, hi) = (w[0], w[1]);
        let covering: Vec<&Slab> = slabs
            .iter()
            .filter(|s| s.z_bottom <= lo && hi <= s.z_top())
            .collect();
        if covering.is_empty() {
            continue;
        }
        let mut mask = covering[0].mask.clone();
        for s in &covering[1..] {
            mask.add(&s.mask);
        }
        if !mask.is_empty() {
            out.push(Slab::new(mask, lo, hi - lo));
        }
    }

    merge_same_mask(out)
}

/// Merge adjacent slabs (`a.top == b.bottom`) whose masks are identical
/// into one spanning slab (spec §4.5 step 3).
fn merge_same_mask(slabs: Vec<Slab>) -> SlabStack {
    let mut out: Vec<Slab> = Vec::new();
    for s in slabs {
        if let Some(last) = out.last_mut() {
            if last.z_top() == s.z_bottom && last.mask == s.mask {
                last.thickness += s.thickness;
                continue;
            }
        }
        out.push(s);
    }
    SlabStack(out)
}

/// `boolean(A, B, mode)`: paired z-interval walk (spec §4.5). Cursors
/// advance through both sorted lists; non-overlapping slabs go straight
/// to their side-only bucket; overlapping ranges are split at the
/// overlap edges and the 2D boolean computed per matched pair; the
/// mode-appropriate buckets are assembled and renormalized.
fn boolean(a: &[Slab], b: &[Slab], mode: BooleanMode) -> SlabStack {
    let mut a_only: Vec<Slab> = Vec::new();
    let mut b_only: Vec<Slab> = Vec::new();
    let mut overlaps: Vec<Slab> = Vec::new();

    let (mut ia, mut ib) = (0usize, 0usize);
    let mut cur_a: Option<Slab> = a.get(ia).cloned();
    let mut cur_b: Option<Slab> = b.get(ib).cloned();

    while let (Some(sa), Some(sb)) = (cur_a.clone(), cur_b.clone()) {
        if sa.z_top() <= sb.z_bottom {
            a_only.push(sa);
            ia += 1;
            cur_a = a.get(ia).cloned();
        } else if sb.z_top() <= sa.z_bottom {
            b_only.push(sb);
            ib += 1;
            cur_b = b.get(ib).cloned();
        } else if sa.z_bottom < sb.z_bottom {
            let top = sb.z_bottom;
            a_only.push(Slab::new(sa.mask.clone(), sa.z_bottom, top - sa.z_bottom));
            cur_a = Some(Slab::new(sa.mask.clone(), top, sa.z_top() - top));
        } else if sb.z_bottom < sa.z_bottom {
            let top = sa.z_bottom;
            b_only.push(Slab::new(sb.mask.clone(), sb.z_bottom, top - sb.z_bottom));
            cur_b = Some(Slab::new(sb.mask.clone(), top, sb.z_top() - top));
        } else {
            // equal bottoms
            let top = sa.z_top().min(sb.z_top());
            let overlap_mask = crate::geom::boolean(&sa.mask.0, &sb.mask.0, mode);
            if !overlap_mask.is_empty() {
                overlaps.push(Slab::new(MaskSet(overlap_mask), sa.z_bottom, top - sa.z_bottom));
            }
            if top < sa.z_top() {
                cur_a = Some(Slab::new(sa.mask.clone(), top, sa.z_top() - top));
            } else {
                ia += 1;
                cur_a = a.get(ia).cloned();
            }
            if top < sb.z_top() {
                cur_b = Some(Slab::new(sb.mask.clone(), top, sb.z_top() - top));
            } else {
                ib += 1;
                cur_b = b.get(ib).cloned();
            }
        }
    }
    if let Some(sa) = cur_a {
        a_only.push(sa);
        ia += 1;
    }
    if let Some(sb) = cur_b {
        b_only.push(sb);
        ib += 1;
    }
    a_only.extend_from_slice(&a[ia..]);
    b_only.extend_from_slice(&b[ib..]);

    use BooleanMode::*;
    let mut result = match mode {
        And => overlaps,
        Or | Xor => {
            let mut r = a_only;
            r.extend(overlaps);
            r.extend(b_only);
            r
        },
        ASubB => {
            let mut r = a_only;
            r.extend(overlaps);
            r
        },
        BSubA => {
            let mut r = overlaps;
            r.extend(b_only);
            r
        },
    };
    result.retain(|s| !s.mask.is_empty());
    normalize(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::{Point, Polygon, PolygonSet};

    fn mask_box(x0: i64, y0: i64, x1: i64, y1: i64) -> MaskSet {
        MaskSet(PolygonSet::single(Polygon::box_(x0, y0, x1, y1)))
    }

    #[test]
    fn normalize_splits_overlap_s5() {
        let m = mask_box(0, 0, 10, 10);
        let slabs = vec![Slab::new(m.clone(), 0, 100), Slab::new(m.clone(), 50, 100)];
        let stack = normalize(slabs);
        let spans: Vec<(i64, i64)> = stack.0.iter().map(|s| (s.z_bottom, s.thickness)).collect();
        assert_eq!(spans, vec![(0, 150)]);
    }

    #[test]
    fn normalize_is_idempotent() {
        let m = mask_box(0, 0, 10, 10);
        let slabs = vec![Slab::new(m.clone(), 0, 100), Slab::new(m.clone(), 50, 100)];
        let once = normalize(slabs);
        let twice = normalize(once.0.clone());
        assert_eq!(once, twice);
    }

    #[test]
    fn boolean_and_of_disjoint_z_is_empty() {
        let m = mask_box(0, 0, 10, 10);
        let a = SlabStack::single(Slab::new(m.clone(), 0, 100));
        let b = SlabStack::single(Slab::new(m, 100, 100));
        let r = a.boolean(&b, BooleanMode::And);
        assert!(r.is_empty());
    }

    #[test]
    fn boolean_or_preserves_disjoint_slabs() {
        let m = mask_box(0, 0, 10, 10);
        let a = SlabStack::single(Slab::new(m.clone(), 0, 100));
        let b = SlabStack::single(Slab::new(m, 200, 100));
        let r = a.boolean(&b, BooleanMode::Or);
        assert_eq!(r.0.len(), 2);
    }

    #[test]
    fn no_two_slabs_z_overlap_after_normalize() {
        let m = mask_box(0, 0, 10, 10);
        let slabs = vec![
            Slab::new(m.clone(), 0, 100),
            Slab::new(mask_box(5, 5, 15, 15), 30, 60),
        ];
        let stack = normalize(slabs);
        for w in stack.0.windows(2) {
            assert!(!w[0].z_overlaps(&w[1]));
        }
    }
}
