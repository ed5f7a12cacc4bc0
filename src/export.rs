//! `ExportTech` (spec §4.7 "Output", §6 tech-file format): turns
//! accumulated `output()` calls into the records a collaborator persists,
//! plus the line-oriented tech-file text an external 3D viewer reads.

use rand::Rng;

use crate::errors::{EngineError, Result};
use crate::geom::Polygon;

/// Minimum slab thickness (dbu) a 3D `output()` call will export as its
/// own layer (spec §4.7).
pub const MIN_EXPORT_SLAB_THICKNESS: i64 = 5;

/// A single record handed to the output collaborator (spec §6): either a
/// clipped 2D polygon, or one layer of a 3D slab stack.
#[derive(Debug, Clone)]
pub enum OutputRecord {
    Polygon2D {
        layer: i64,
        datatype: i64,
        name: String,
        polygon: Polygon,
    },
    Slab3D {
        layer: i64,
        datatype: i64,
        name: String,
        z_bottom: i64,
        thickness: i64,
        color: [f32; 4],
    },
}

/// Validate a color/alpha quadruple against spec §7's `ConfigError` on
/// out-of-range transparency or color.
pub fn validate_color(c: [f32; 4]) -> Result<()> {
    if c.iter().any(|v| !(0.0..=1.0).contains(v)) {
        return Err(EngineError::config(format!(
            "color/alpha components must be in [0, 1], got {c:?}"
        )));
    }
    Ok(())
}

/// A color chosen at random when `output()` is not given one explicitly
/// (spec §4.7: "RGBA color (random if unspecified)"), with full opacity.
pub fn random_color() -> [f32; 4] {
    let mut rng = rand::thread_rng();
    [rng.gen_range(0.2..1.0), rng.gen_range(0.2..1.0), rng.gen_range(0.2..1.0), 1.0]
}

/// One layer block of the tech file (spec §6). `LayerStart`/`LayerEnd`
/// bracket a blank-line-separated sequence of these.
struct TechBlock {
    name: String,
    layer_no: i64,
    height: i64,
    thickness: i64,
    color: [f32; 4],
    shortkey: Option<String>,
}

fn render_block(b: &TechBlock) -> String {
    let [r, g, bl, a] = b.color;
    let mut s = String::new();
    s.push_str(&format!("LayerStart: {} ({})\n", b.name, b.layer_no));
    s.push_str(&format!("Layer: {}\n", b.layer_no));
    s.push_str(&format!("Height: {}\n", b.height));
    s.push_str(&format!("Thickness: {}\n", b.thickness));
    s.push_str(&format!("Red: {r} Green: {g} Blue: {bl} Filter: {a}\n"));
    s.push_str("Metal: 0\n");
    if let Some(sk) = &b.shortkey {
        s.push_str(&format!("Shortkey: {sk}\n"));
    }
    s.push_str("Show: 1\n");
    s.push_str("LayerEnd\n");
    s
}

/// Build the tech-file text (spec §6) from the `Slab3D` records
/// accumulated by a 3D run, plus an optional substrate block describing
/// the wafer body (the original tool always emits one regardless of
/// whether `bulk` was explicitly passed to `output()`).
pub fn render_tech_file(records: &[OutputRecord], substrate: Option<(i64, i64, [f32; 4])>, producer: &str) -> String {
    let mut out = format!("# This file was generated automatically by {producer}.\n\n");

    if let Some((z_bottom, thickness, color)) = substrate {
        out.push_str(&render_block(&TechBlock {
            name: "Substrate".to_string(),
            layer_no: 255,
            height: z_bottom,
            thickness,
            color,
            shortkey: None,
        }));
        out.push('\n');
    }

    for rec in records {
        if let OutputRecord::Slab3D { layer, name, z_bottom, thickness, color, .. } = rec {
            out.push_str(&render_block(&TechBlock {
                name: name.clone(),
                layer_no: *layer,
                height: *z_bottom,
                thickness: *thickness,
                color: *color,
                shortkey: None,
            }));
            out.push('\n');
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_color_rejects_out_of_range() {
        assert!(validate_color([1.5, 0.0, 0.0, 1.0]).is_err());
        assert!(validate_color([0.0, 0.0, 0.0, -0.1]).is_err());
        assert!(validate_color([0.0, 0.2, 1.0, 1.0]).is_ok());
    }

    #[test]
    fn tech_file_has_layer_blocks_and_header() {
        let records = vec![OutputRecord::Slab3D {
            layer: 10,
            datatype: 0,
            name: "poly".to_string(),
            z_bottom: 0,
            thickness: 100,
            color: [0.5, 0.5, 0.5, 1.0],
        }];
        let text = render_tech_file(&records, None, "xsection");
        assert!(text.starts_with("# This file was generated"));
        assert!(text.contains("LayerStart: poly (10)"));
        assert!(text.contains("Height: 0"));
        assert!(text.contains("Thickness: 100"));
        assert!(text.contains("LayerEnd"));
    }

    #[test]
    fn tech_file_includes_substrate_block_first() {
        let text = render_tech_file(&[], Some((-500, 500, [0.3, 0.3, 0.3, 1.0])), "xsection");
        assert!(text.contains("LayerStart: Substrate (255)"));
    }
}
