//! Convex kernel polygons for structured grow/etch profiles (spec §4.4
//! step 6): the shape whose Minkowski sum with the seed edges realises a
//! square, round, octagon, or tapered etch/grow wall.

use std::f64::consts::PI;

use super::point::Point;
use super::polygon::Polygon;

/// Corner profile requested by a `grow`/`etch` step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileMode {
    Square,
    Round,
    Octagon,
}

impl ProfileMode {
    pub fn parse(s: &str) -> Option<ProfileMode> {
        match s {
            "square" => Some(ProfileMode::Square),
            "round" => Some(ProfileMode::Round),
            "octagon" => Some(ProfileMode::Octagon),
            _ => None,
        }
    }
}

/// Build the convex kernel polygon for the given lateral/vertical half
/// extents, profile, and whether a taper angle applies, following spec
/// §4.4 step 6 exactly.
///
/// `xyi`/`zi` are already in dbu. `taper` is `Some(_)` whenever a taper
/// angle applies (the 2D engine's tapered rhombus branch only fires when
/// `xyi > 0`, per spec).
pub fn build_kernel(xyi: i64, zi: i64, mode: ProfileMode, tapered: bool) -> Polygon {
    if tapered && xyi > 0 {
        return Polygon::new(vec![
            Point::new(-xyi, 0),
            Point::new(0, zi),
            Point::new(xyi, 0),
            Point::new(0, -zi),
        ]);
    }

    if xyi <= 0 {
        // Degenerate: a vertical line segment, encoded as a zero-width
        // box so the shared Minkowski-sum-over-edges machinery still
        // applies.
        return Polygon::new(vec![Point::new(0, -zi), Point::new(0, zi)]);
    }

    match mode {
        ProfileMode::Square => Polygon::new(vec![
            Point::new(-xyi, -zi),
            Point::new(-xyi, zi),
            Point::new(xyi, zi),
            Point::new(xyi, -zi),
        ]),
        ProfileMode::Round | ProfileMode::Octagon => {
            let n = if mode == ProfileMode::Round { 64 } else { 8 };
            n_gon_kernel(xyi, zi, n)
        },
    }
}

/// The regular `n`-gon inscribed in the ellipse of radii `(xyi, zi)`,
/// scaled by `1/cos(pi/n)` so that edges (not vertices) touch the
/// ellipse — spec §4.4 step 6's round/octagon case.
fn n_gon_kernel(xyi: i64, zi: i64, n: u32) -> Polygon {
    let da = 2.0 * PI / n as f64;
    let rf = 1.0 / (da * 0.5).cos();
    let pts: Vec<Point> = (0..n)
        .map(|i| {
            let theta = da * (i as f64 + 0.5);
            let x = xyi as f64 * rf * theta.cos();
            let y = zi as f64 * rf * theta.sin();
            Point::new(x.round() as i64, y.round() as i64)
        })
        .collect();
    Polygon::new(pts)
}
