//! [`Polygon`] / [`PolygonSet`] and the `PolyOps` primitive operations:
//! boolean set algebra, directional sizing, Minkowski sum, and bounding
//! box, all delegated to the `geo` crate's `f64` boolean-ops kernel.
//!
//! Coordinates round-trip `i64 dbu -> f64 -> i64 dbu` at the boundary of
//! every call, rounding to the nearest integer on the way out. Since every
//! polygon this engine ever constructs is built from axis-aligned boxes
//! and vertex sums of integer kernels, the round trip is exact in
//! practice; see `DESIGN.md` for the substitution this makes for the
//! original's exact-integer clipper.

use geo::{BooleanOps, Coord, LineString, MultiPolygon as GeoMultiPolygon, Polygon as GeoPolygon};

use super::point::{BBox, Edge, Point, Transform};

/// A closed, possibly non-convex polygon with optional holes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Polygon {
    pub exterior: Vec<Point>,
    pub holes: Vec<Vec<Point>>,
}

impl Polygon {
    pub fn new(exterior: Vec<Point>) -> Self {
        Polygon {
            exterior,
            holes: Vec::new(),
        }
    }

    pub fn with_holes(exterior: Vec<Point>, holes: Vec<Vec<Point>>) -> Self {
        Polygon { exterior, holes }
    }

    /// Axis-aligned rectangle `[x0, y0] .. [x1, y1]`, corners in any order.
    pub fn box_(x0: i64, y0: i64, x1: i64, y1: i64) -> Self {
        let b = BBox::new(x0, y0, x1, y1);
        Polygon::new(b.corners().to_vec())
    }

    pub fn is_empty(&self) -> bool {
        self.exterior.len() < 3
    }

    pub fn bbox(&self) -> Option<BBox> {
        let mut it = self.exterior.iter();
        let first = *it.next()?;
        let mut b = BBox::new(first.x, first.y, first.x, first.y);
        for p in it {
            b = b.union(&BBox::new(p.x, p.y, p.x, p.y));
        }
        Some(b)
    }

    pub fn transformed(&self, t: &Transform) -> Polygon {
        Polygon {
            exterior: self.exterior.iter().map(|p| t.apply(*p)).collect(),
            holes: self
                .holes
                .iter()
                .map(|h| h.iter().map(|p| t.apply(*p)).collect())
                .collect(),
        }
    }

    fn ring_to_geo(ring: &[Point]) -> LineString<f64> {
        let mut coords: Vec<Coord<f64>> = ring
            .iter()
            .map(|p| Coord {
                x: p.x as f64,
                y: p.y as f64,
            })
            .collect();
        if coords.first() != coords.last() {
            coords.push(coords[0]);
        }
        LineString::new(coords)
    }

    fn to_geo(&self) -> GeoPolygon<f64> {
        GeoPolygon::new(
            Self::ring_to_geo(&self.exterior),
            self.holes.iter().map(|h| Self::ring_to_geo(h)).collect(),
        )
    }

    fn ring_from_geo(ring: &LineString<f64>) -> Vec<Point> {
        let coords = ring.0.as_slice();
        let n = if coords.len() > 1 && coords.first() == coords.last() {
            coords.len() - 1
        } else {
            coords.len()
        };
        coords[..n]
            .iter()
            .map(|c| Point::new(c.x.round() as i64, c.y.round() as i64))
            .collect()
    }

    fn from_geo(p: &GeoPolygon<f64>) -> Polygon {
        Polygon {
            exterior: Self::ring_from_geo(p.exterior()),
            holes: p.interiors().iter().map(Self::ring_from_geo).collect(),
        }
    }
}

/// An unordered multiset of polygons, interpreted as their union.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PolygonSet(pub Vec<Polygon>);

impl PolygonSet {
    pub fn new() -> Self {
        PolygonSet(Vec::new())
    }

    pub fn single(p: Polygon) -> Self {
        PolygonSet(vec![p])
    }

    pub fn is_empty(&self) -> bool {
        self.0.iter().all(Polygon::is_empty)
    }

    pub fn push(&mut self, p: Polygon) {
        if !p.is_empty() {
            self.0.push(p);
        }
    }

    pub fn extend(&mut self, other: PolygonSet) {
        self.0.extend(other.0);
    }

    pub(crate) fn to_geo(&self) -> GeoMultiPolygon<f64> {
        GeoMultiPolygon::new(self.0.iter().map(Polygon::to_geo).collect())
    }

    pub(crate) fn from_geo(mp: GeoMultiPolygon<f64>) -> PolygonSet {
        PolygonSet(mp.0.iter().map(Polygon::from_geo).collect())
    }

    /// Merge overlapping polygons into a canonical, non-redundant
    /// representation. `produce_geom` calls this after every batch of
    /// Minkowski-sum inserts to cap intermediate polygon counts (spec
    /// §4.4 step 7).
    pub fn merged(&self) -> PolygonSet {
        if self.0.is_empty() {
            return PolygonSet::new();
        }
        // Route through `geo`'s union kernel directly (rather than our own
        // `boolean()` wrapper, whose empty-operand shortcuts would just
        // hand back `self` unmerged) so overlapping polygons in the set
        // are actually coalesced.
        let dissolved = self.to_geo().union(&GeoMultiPolygon::new(Vec::new()));
        PolygonSet::from_geo(dissolved)
    }

    pub fn bbox(&self) -> Option<BBox> {
        self.0.iter().filter_map(Polygon::bbox).reduce(|a, b| a.union(&b))
    }

    pub fn transformed(&self, t: &Transform) -> PolygonSet {
        PolygonSet(self.0.iter().map(|p| p.transformed(t)).collect())
    }
}

/// The boolean set-operation mode. Names follow spec §4.1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BooleanMode {
    And,
    Or,
    Xor,
    ASubB,
    BSubA,
}

/// `boolean(A, B, mode)` — spec §4.1. Empty-input shortcuts are handled
/// explicitly so the engine never has to special-case them at call sites.
pub fn boolean(a: &PolygonSet, b: &PolygonSet, mode: BooleanMode) -> PolygonSet {
    use BooleanMode::*;
    match mode {
        And if a.is_empty() || b.is_empty() => return PolygonSet::new(),
        Or if a.is_empty() => return b.clone(),
        Or if b.is_empty() => return a.clone(),
        ASubB if b.is_empty() => return a.clone(),
        BSubA if a.is_empty() => return b.clone(),
        Xor if a.is_empty() => return b.clone(),
        Xor if b.is_empty() => return a.clone(),
        _ => {},
    }

    let ga = a.to_geo();
    let gb = b.to_geo();
    let result = match mode {
        And => ga.intersection(&gb),
        Or => ga.union(&gb),
        Xor => ga.xor(&gb),
        ASubB => ga.difference(&gb),
        BSubA => gb.difference(&ga),
    };
    PolygonSet::from_geo(result)
}

/// `edges_of(P)` — the edge set of a polygon list, exterior rings and
/// holes alike.
pub fn edges_of(p: &PolygonSet) -> Vec<Edge> {
    let mut edges = Vec::new();
    for poly in &p.0 {
        for ring in std::iter::once(&poly.exterior).chain(poly.holes.iter()) {
            if ring.len() < 2 {
                continue;
            }
            for i in 0..ring.len() {
                let p1 = ring[i];
                let p2 = ring[(i + 1) % ring.len()];
                if p1 != p2 {
                    edges.push(Edge::new(p1, p2));
                }
            }
        }
    }
    edges
}

/// `minkowski_sum(kernel_polygon, edge)` — the swept kernel along the
/// oriented edge.
///
/// Both the kernel and an edge's two endpoints are convex point sets, so
/// their Minkowski sum is exactly the convex hull of all pairwise vertex
/// sums (the identity this engine's teacher uses for 3D convex-hull
/// Minkowski sums, specialised to 2D here).
pub fn minkowski_sum(kernel: &Polygon, edge: Edge) -> Polygon {
    let endpoints = [edge.p1, edge.p2];
    let pts: Vec<Point> = kernel
        .exterior
        .iter()
        .flat_map(|k| endpoints.iter().map(move |e| *k + *e))
        .collect();
    convex_hull(&pts)
}

/// Andrew's monotone chain convex hull.
pub fn convex_hull(points: &[Point]) -> Polygon {
    let mut pts = points.to_vec();
    pts.sort();
    pts.dedup();
    if pts.len() < 3 {
        return Polygon::new(pts);
    }

    fn cross(o: Point, a: Point, b: Point) -> i64 {
        (a.x - o.x) * (b.y - o.y) - (a.y - o.y) * (b.x - o.x)
    }

    let mut lower: Vec<Point> = Vec::new();
    for &p in &pts {
        while lower.len() >= 2 && cross(lower[lower.len() - 2], lower[lower.len() - 1], p) <= 0 {
            lower.pop();
        }
        lower.push(p);
    }

    let mut upper: Vec<Point> = Vec::new();
    for &p in pts.iter().rev() {
        while upper.len() >= 2 && cross(upper[upper.len() - 2], upper[upper.len() - 1], p) <= 0 {
            upper.pop();
        }
        upper.push(p);
    }

    lower.pop();
    upper.pop();
    lower.extend(upper);
    Polygon::new(lower)
}

/// Dilate `p` by a segment of half-length `d` (`d >= 0`) along one axis,
/// via `produce_geom`'s own technique: sweep every edge by the segment
/// kernel and union with the original (spec §4.4 step 7's machinery,
/// reused here to implement generic `size`).
fn dilate_1d(p: &PolygonSet, d: i64, axis_x: bool) -> PolygonSet {
    if d == 0 || p.is_empty() {
        return p.clone();
    }
    let kernel = if axis_x {
        Polygon::new(vec![Point::new(-d, 0), Point::new(d, 0)])
    } else {
        Polygon::new(vec![Point::new(0, -d), Point::new(0, d)])
    };
    let mut swept = PolygonSet::new();
    swept.extend(p.clone());
    for e in edges_of(p) {
        swept.push(minkowski_sum(&kernel, e));
    }
    swept.merged()
}

/// Erode `p` by `d` (`d >= 0`) along one axis via the exact
/// complement-dilate-complement identity, computed inside a padded
/// universe so the far boundary never interferes with the result.
fn erode_1d(p: &PolygonSet, d: i64, axis_x: bool) -> PolygonSet {
    if d == 0 {
        return p.clone();
    }
    let Some(bbox) = p.bbox() else {
        return PolygonSet::new();
    };
    let margin = d + 1;
    let (mx, my) = if axis_x { (margin, 1) } else { (1, margin) };
    let universe_box = bbox.enlarged_xy(mx, my);
    let universe = PolygonSet::single(Polygon::box_(
        universe_box.min.x,
        universe_box.min.y,
        universe_box.max.x,
        universe_box.max.y,
    ));
    let complement = boolean(&universe, p, BooleanMode::ASubB);
    let dilated = dilate_1d(&complement, d, axis_x);
    boolean(&universe, &dilated, BooleanMode::ASubB)
}

/// Corner-shape selector for [`size`]. The engine only ever sizes with
/// `Square` (mode=2 in the original); `Round`/`Octagon` profiles are
/// produced by the structured grow/etch kernel builder instead (spec
/// §4.4 step 6), not by this primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeMode {
    Square,
}

/// `size(P, dx, dy, mode)` — directional grow (positive) or shrink
/// (negative), decomposed into two independent single-axis passes since a
/// box kernel is the Minkowski sum of its two orthogonal edge segments,
/// and both dilation and erosion distribute over that sum.
pub fn size(p: &PolygonSet, dx: i64, dy: i64, _mode: SizeMode) -> PolygonSet {
    let after_x = if dx >= 0 {
        dilate_1d(p, dx, true)
    } else {
        erode_1d(p, -dx, true)
    };
    if dy >= 0 {
        dilate_1d(&after_x, dy, false)
    } else {
        erode_1d(&after_x, -dy, false)
    }
}

pub fn bbox(p: &PolygonSet) -> Option<BBox> {
    p.bbox()
}

pub fn transform(p: &PolygonSet, t: &Transform) -> PolygonSet {
    p.transformed(t)
}
