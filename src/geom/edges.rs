//! Edge-set boolean algebra.
//!
//! `produce_geom`'s seed computation (spec §4.4 step 5) needs `AND` and
//! subtraction over *sets of edges* rather than polygons: the "mask
//! edges crossed by an `on`/`into` material edge" test reduces to
//! intersecting and subtracting collinear edge fragments. Since every
//! edge here is axis-derived from a polygon ring, edges collapse into
//! groups that lie on the same infinite line; within a group the
//! problem is exactly 1D interval algebra.

use std::collections::HashMap;

use super::point::{Edge, Point};

/// Canonical key for "lies on the same infinite line": the edge's
/// direction reduced to lowest terms with a fixed sign convention, plus
/// the line's offset from the origin under that normalised direction.
fn line_key(e: &Edge) -> (i64, i64, i64) {
    let (mut dx, mut dy) = (e.dx(), e.dy());
    let g = gcd(dx.abs(), dy.abs()).max(1);
    dx /= g;
    dy /= g;
    // Fix sign so direction and its reverse produce the same key.
    if dx < 0 || (dx == 0 && dy < 0) {
        dx = -dx;
        dy = -dy;
    }
    // Line offset: for points p on the line, dx*(p.y - e.p1.y) - dy*(p.x -
    // e.p1.x) == 0; the constant term identifies the line.
    let offset = dx * e.p1.y - dy * e.p1.x;
    (dx, dy, offset)
}

fn gcd(a: i64, b: i64) -> i64 {
    if b == 0 {
        a
    } else {
        gcd(b, a % b)
    }
}

/// Parametrize a point along a line with reduced direction `(dx, dy)`.
fn param(dx: i64, dy: i64, p: Point) -> i64 {
    dx * p.x + dy * p.y
}

/// An edge reduced to its `t`-interval on its line, endpoints tracked so
/// results can be reconstructed as concrete edges again.
struct Interval {
    lo: i64,
    hi: i64,
}

/// Group edges by line, reducing each to a set of `t`-intervals (one per
/// edge, oriented `lo <= hi`) plus a point lookup so intervals can be
/// turned back into `Point`s after interval algebra.
struct LineGroup {
    dx: i64,
    dy: i64,
    intervals: Vec<Interval>,
    points: HashMap<i64, Point>,
}

fn group_edges(edges: &[Edge]) -> HashMap<(i64, i64, i64), LineGroup> {
    let mut groups: HashMap<(i64, i64, i64), LineGroup> = HashMap::new();
    for e in edges {
        let key = line_key(e);
        let (dx, dy, _) = key;
        let group = groups.entry(key).or_insert_with(|| LineGroup {
            dx,
            dy,
            intervals: Vec::new(),
            points: HashMap::new(),
        });
        let t1 = param(dx, dy, e.p1);
        let t2 = param(dx, dy, e.p2);
        group.points.insert(t1, e.p1);
        group.points.insert(t2, e.p2);
        group.intervals.push(Interval {
            lo: t1.min(t2),
            hi: t1.max(t2),
        });
    }
    groups
}

/// Merge a line's intervals into a minimal sorted list of disjoint,
/// closed `[lo, hi]` runs (the "covered" set).
fn merge_intervals(mut ivs: Vec<Interval>) -> Vec<(i64, i64)> {
    ivs.sort_by_key(|iv| iv.lo);
    let mut out: Vec<(i64, i64)> = Vec::new();
    for iv in ivs {
        if iv.lo >= iv.hi {
            continue;
        }
        if let Some(last) = out.last_mut() {
            if iv.lo <= last.1 {
                last.1 = last.1.max(iv.hi);
                continue;
            }
        }
        out.push((iv.lo, iv.hi));
    }
    out
}

fn intersect_runs(a: &[(i64, i64)], b: &[(i64, i64)]) -> Vec<(i64, i64)> {
    let mut out = Vec::new();
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        let lo = a[i].0.max(b[j].0);
        let hi = a[i].1.min(b[j].1);
        if lo < hi {
            out.push((lo, hi));
        }
        if a[i].1 < b[j].1 {
            i += 1;
        } else {
            j += 1;
        }
    }
    out
}

fn subtract_runs(a: &[(i64, i64)], b: &[(i64, i64)]) -> Vec<(i64, i64)> {
    let mut out = Vec::new();
    for &(mut lo, hi) in a {
        for &(blo, bhi) in b {
            if blo >= hi || bhi <= lo {
                continue;
            }
            if blo > lo {
                out.push((lo, blo.min(hi)));
            }
            lo = lo.max(bhi);
            if lo >= hi {
                break;
            }
        }
        if lo < hi {
            out.push((lo, hi));
        }
    }
    out
}

/// Reconstruct an [`Edge`] from a `t`-run, looking up original endpoints
/// where possible and falling back to projecting along the line when a
/// run boundary was synthesised by interval clipping (it always lies
/// inside some original edge, so this never needs a third endpoint type
/// beyond what's already in the point map's convex span).
fn run_to_edge(g: &LineGroup, lo: i64, hi: i64) -> Edge {
    let p1 = lookup_or_interpolate(g, lo);
    let p2 = lookup_or_interpolate(g, hi);
    Edge::new(p1, p2)
}

fn lookup_or_interpolate(g: &LineGroup, t: i64) -> Point {
    if let Some(p) = g.points.get(&t) {
        return *p;
    }
    // t must lie strictly between two known endpoints on this line;
    // interpolate using any reference endpoint and the line's direction.
    // dx, dy are the line's reduced direction, with dx*dx+dy*dy == norm.
    let norm = g.dx * g.dx + g.dy * g.dy;
    let (&t0, &p0) = g
        .points
        .iter()
        .next()
        .expect("line group always has at least one endpoint");
    let dt = t - t0;
    Point::new(
        p0.x + g.dx * dt / norm,
        p0.y + g.dy * dt / norm,
    )
}

fn runs_to_edges(groups: HashMap<(i64, i64, i64), LineGroup>, runs_per_group: HashMap<(i64, i64, i64), Vec<(i64, i64)>>) -> Vec<Edge> {
    let mut out = Vec::new();
    for (key, g) in groups {
        if let Some(runs) = runs_per_group.get(&key) {
            for &(lo, hi) in runs {
                out.push(run_to_edge(&g, lo, hi));
            }
        }
    }
    out
}

/// `edges_and_edges(A, B)` — the edge fragments common to both sets,
/// per collinear-line group.
pub fn edges_and_edges(a: &[Edge], b: &[Edge]) -> Vec<Edge> {
    let ga = group_edges(a);
    let gb = group_edges(b);
    let mut runs_per_group = HashMap::new();
    for (key, group) in &ga {
        if let Some(other) = gb.get(key) {
            let ra = merge_intervals_ref(&group.intervals);
            let rb = merge_intervals_ref(&other.intervals);
            runs_per_group.insert(*key, intersect_runs(&ra, &rb));
        }
    }
    runs_to_edges(ga, runs_per_group)
}

/// `edges_sub_edges(A, B)` — the fragments of `A` not covered by `B`.
pub fn edges_sub_edges(a: &[Edge], b: &[Edge]) -> Vec<Edge> {
    let ga = group_edges(a);
    let gb = group_edges(b);
    let mut runs_per_group = HashMap::new();
    for (key, group) in &ga {
        let ra = merge_intervals_ref(&group.intervals);
        let rb = gb.get(key).map(|g| merge_intervals_ref(&g.intervals)).unwrap_or_default();
        runs_per_group.insert(*key, subtract_runs(&ra, &rb));
    }
    runs_to_edges(ga, runs_per_group)
}

fn merge_intervals_ref(ivs: &[Interval]) -> Vec<(i64, i64)> {
    let owned: Vec<Interval> = ivs.iter().map(|iv| Interval { lo: iv.lo, hi: iv.hi }).collect();
    merge_intervals(owned)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn and_of_overlapping_collinear_edges() {
        let a = vec![Edge::new(Point::new(0, 0), Point::new(10, 0))];
        let b = vec![Edge::new(Point::new(5, 0), Point::new(15, 0))];
        let r = edges_and_edges(&a, &b);
        assert_eq!(r.len(), 1);
        let e = &r[0];
        let (x0, x1) = (e.p1.x.min(e.p2.x), e.p1.x.max(e.p2.x));
        assert_eq!((x0, x1), (5, 10));
    }

    #[test]
    fn sub_of_overlapping_collinear_edges() {
        let a = vec![Edge::new(Point::new(0, 0), Point::new(10, 0))];
        let b = vec![Edge::new(Point::new(3, 0), Point::new(7, 0))];
        let r = edges_sub_edges(&a, &b);
        let mut spans: Vec<(i64, i64)> = r
            .iter()
            .map(|e| (e.p1.x.min(e.p2.x), e.p1.x.max(e.p2.x)))
            .collect();
        spans.sort();
        assert_eq!(spans, vec![(0, 3), (7, 10)]);
    }

    #[test]
    fn disjoint_lines_never_intersect() {
        let a = vec![Edge::new(Point::new(0, 0), Point::new(10, 0))];
        let b = vec![Edge::new(Point::new(0, 5), Point::new(10, 5))];
        assert!(edges_and_edges(&a, &b).is_empty());
    }
}
