//! `MaterialRegion` (spec §9 "Polymorphism over mask/slab"): the tagged
//! variant uniting 2D `MaskSet` and 3D `SlabStack` behind a common
//! capability set so engine steps can branch on dimensionality once and
//! share the rest of their logic.

use crate::geom::{BooleanMode, Transform};
use crate::mask::MaskSet;
use crate::slab::SlabStack;

/// Either a 2D mask or a 3D slab stack — the two shapes `deposit` /
/// `grow` / `etch` / `planarize` operate on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MaterialRegion {
    Mask(MaskSet),
    Slab(SlabStack),
}

impl MaterialRegion {
    pub fn is_empty(&self) -> bool {
        match self {
            MaterialRegion::Mask(m) => m.is_empty(),
            MaterialRegion::Slab(s) => s.is_empty(),
        }
    }

    pub fn boolean(&self, other: &MaterialRegion, mode: BooleanMode) -> MaterialRegion {
        match (self, other) {
            (MaterialRegion::Mask(a), MaterialRegion::Mask(b)) => {
                let result = crate::geom::boolean(&a.0, &b.0, mode);
                MaterialRegion::Mask(MaskSet(result))
            },
            (MaterialRegion::Slab(a), MaterialRegion::Slab(b)) => MaterialRegion::Slab(a.boolean(b, mode)),
            _ => panic!("MaterialRegion::boolean called on mismatched 2D/3D operands"),
        }
    }

    pub fn size(&self, dx: i64, dy: i64, dz: i64) -> MaterialRegion {
        match self {
            MaterialRegion::Mask(m) => {
                MaterialRegion::Mask(MaskSet(crate::geom::size(&m.0, dx, dy, crate::geom::SizeMode::Square)))
            },
            MaterialRegion::Slab(s) => MaterialRegion::Slab(s.size(dx, dy, dz)),
        }
    }

    pub fn transform(&self, t: &Transform) -> MaterialRegion {
        match self {
            MaterialRegion::Mask(m) => MaterialRegion::Mask(m.transform(t)),
            MaterialRegion::Slab(s) => MaterialRegion::Slab(SlabStack(
                s.0.iter()
                    .map(|slab| crate::slab::Slab::new(slab.mask.transform(t), slab.z_bottom, slab.thickness))
                    .collect(),
            )),
        }
    }

    pub fn as_mask(&self) -> Option<&MaskSet> {
        match self {
            MaterialRegion::Mask(m) => Some(m),
            MaterialRegion::Slab(_) => None,
        }
    }

    pub fn as_slab(&self) -> Option<&SlabStack> {
        match self {
            MaterialRegion::Slab(s) => Some(s),
            MaterialRegion::Mask(_) => None,
        }
    }
}
