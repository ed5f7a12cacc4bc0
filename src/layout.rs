//! The layout collaborator interface (spec §6) and a synthetic
//! in-memory implementation for the demo CLI and tests.
//!
//! The real host application (GDS reader, cell hierarchy, view
//! rendering) is an external collaborator per spec §1's Non-goals; the
//! core only needs the shapes-touching-a-box query below. `InMemoryLayout`
//! stands in for that collaborator in `main.rs` and the integration
//! tests, the way a test double substitutes for a UI host.

use crate::geom::{BBox, Point, Polygon, Transform};

/// One shape on a layer: already reduced to a polygon plus the instance
/// transform that should be applied when it is loaded (spec §4.3's
/// `load` applies "the iterator transform").
#[derive(Debug, Clone)]
pub struct Shape {
    pub polygon: Polygon,
    pub transform: Transform,
}

/// A declared layer: its numeric `(layer, datatype)` pair and optional
/// name, matched against a [`crate::layer::LayerSpec`] during `load`.
#[derive(Debug, Clone)]
pub struct LayerInfo {
    pub index: usize,
    pub layer: i64,
    pub datatype: i64,
    pub name: Option<String>,
}

/// The collaborator interface a mask layout must provide (spec §6):
/// `dbu`, a cell index, declared layers, and a shapes-touching-a-box
/// query.
pub trait Layout {
    fn dbu(&self) -> f64;
    fn cell_index(&self) -> usize;
    fn layers(&self) -> &[LayerInfo];
    fn shapes_touching(&self, cell: usize, layer_index: usize, bbox: BBox) -> Vec<Shape>;
}

/// A flat, single-cell, in-memory layout: every shape pre-placed on its
/// declared layer with an identity instance transform, no hierarchy.
/// Sufficient for the demo CLI's synthetic layout and for unit/
/// integration tests that don't need a real GDS reader.
#[derive(Debug, Clone, Default)]
pub struct InMemoryLayout {
    dbu: f64,
    layers: Vec<LayerInfo>,
    shapes: Vec<(usize, Shape)>,
}

impl InMemoryLayout {
    pub fn new(dbu: f64) -> Self {
        InMemoryLayout {
            dbu,
            layers: Vec::new(),
            shapes: Vec::new(),
        }
    }

    /// Declare a layer, returning its index for use with [`Self::add_shape`].
    pub fn declare_layer(&mut self, layer: i64, datatype: i64, name: Option<&str>) -> usize {
        let index = self.layers.len();
        self.layers.push(LayerInfo {
            index,
            layer,
            datatype,
            name: name.map(str::to_string),
        });
        index
    }

    pub fn add_shape(&mut self, layer_index: usize, polygon: Polygon) {
        self.shapes.push((
            layer_index,
            Shape {
                polygon,
                transform: Transform::identity(),
            },
        ));
    }

    pub fn add_shape_transformed(&mut self, layer_index: usize, polygon: Polygon, transform: Transform) {
        self.shapes.push((layer_index, Shape { polygon, transform }));
    }
}

impl Layout for InMemoryLayout {
    fn dbu(&self) -> f64 {
        self.dbu
    }

    fn cell_index(&self) -> usize {
        0
    }

    fn layers(&self) -> &[LayerInfo] {
        &self.layers
    }

    fn shapes_touching(&self, _cell: usize, layer_index: usize, bbox: BBox) -> Vec<Shape> {
        self.shapes
            .iter()
            .filter(|(li, _)| *li == layer_index)
            .filter(|(_, s)| shape_touches(s, &bbox))
            .map(|(_, s)| s.clone())
            .collect()
    }
}

fn shape_touches(s: &Shape, bbox: &BBox) -> bool {
    let transformed = s.polygon.transformed(&s.transform);
    let Some(shape_box) = transformed.bbox() else {
        return false;
    };
    boxes_overlap(&shape_box, bbox)
}

fn boxes_overlap(a: &BBox, b: &BBox) -> bool {
    a.min.x <= b.max.x && a.max.x >= b.min.x && a.min.y <= b.max.y && a.max.y >= b.min.y
}

/// A ruler segment: the 2D region-of-interest definition (spec §1, §3).
#[derive(Debug, Clone, Copy)]
pub struct Ruler {
    pub p1: Point,
    pub p2: Point,
}

impl Ruler {
    pub fn new(p1: Point, p2: Point) -> Self {
        Ruler { p1, p2 }
    }

    pub fn length(&self) -> f64 {
        crate::geom::Edge::new(self.p1, self.p2).length()
    }
}
