//! Geometry kernel: planar primitives, polygon boolean algebra, edge-set
//! algebra, and the convex kernels used by structured grow/etch.

pub mod edges;
pub mod kernel;
pub mod point;
pub mod polygon;

pub use edges::{edges_and_edges, edges_sub_edges};
pub use kernel::{build_kernel, ProfileMode};
pub use point::{BBox, Edge, Point, Transform};
pub use polygon::{boolean, bbox, convex_hull, edges_of, minkowski_sum, size, transform, BooleanMode, Polygon, PolygonSet, SizeMode};
