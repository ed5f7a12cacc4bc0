//! CLI front-end for the process-emulation engine (spec §9's CLI/test
//! tooling section).
//!
//! `xsection` has no GDS/layout reader of its own (spec §1 Non-goals); it
//! builds a small synthetic [`InMemoryLayout`] from `--shape` flags so a
//! process script can be exercised end-to-end from the command line.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use xsection::geom::{Edge, Point, Polygon};
use xsection::{EngineConfig, InMemoryLayout, ProcessRuntime};

#[derive(Parser)]
#[command(name = "xsection", version, about = "Mask-to-cross-section/3D process emulation")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Increase logging verbosity (repeatable: -v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress all logging below error level.
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Run a process script over a synthetic layout.
    Run {
        /// Path to the process script (Rhai source).
        #[arg(long)]
        script: PathBuf,

        /// Ruler endpoints `x1,y1,x2,y2` in micrometres, selecting the 2D
        /// cross-section engine. Omit for 3D mode.
        #[arg(long, value_parser = parse_ruler)]
        ruler: Option<(f64, f64, f64, f64)>,

        /// Layout width in micrometres, required in 3D mode (no ruler).
        #[arg(long)]
        width: Option<f64>,

        /// Database unit in micrometres (spec §3).
        #[arg(long, default_value_t = 0.001)]
        dbu: f64,

        /// Optional JSON config file overriding window parameters.
        #[arg(long)]
        config: Option<PathBuf>,

        /// One rectangle on the synthetic layout: `layer,x0,y0,x1,y1`
        /// (micrometres). Repeatable.
        #[arg(long = "shape", value_parser = parse_shape)]
        shapes: Vec<(i64, f64, f64, f64, f64)>,

        /// Where to write the rendered tech file; stdout if omitted.
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

fn parse_ruler(s: &str) -> Result<(f64, f64, f64, f64), String> {
    let parts: Vec<&str> = s.split(',').collect();
    if parts.len() != 4 {
        return Err("expected `x1,y1,x2,y2`".to_string());
    }
    let nums: Result<Vec<f64>, _> = parts.iter().map(|p| p.trim().parse::<f64>()).collect();
    let nums = nums.map_err(|e| e.to_string())?;
    Ok((nums[0], nums[1], nums[2], nums[3]))
}

fn parse_shape(s: &str) -> Result<(i64, f64, f64, f64, f64), String> {
    let parts: Vec<&str> = s.split(',').collect();
    if parts.len() != 5 {
        return Err("expected `layer,x0,y0,x1,y1`".to_string());
    }
    let layer: i64 = parts[0].trim().parse().map_err(|e: std::num::ParseIntError| e.to_string())?;
    let nums: Result<Vec<f64>, _> = parts[1..].iter().map(|p| p.trim().parse::<f64>()).collect();
    let nums = nums.map_err(|e| e.to_string())?;
    Ok((layer, nums[0], nums[1], nums[2], nums[3]))
}

fn init_logging(verbose: u8, quiet: bool) {
    let default_level = if quiet {
        "error"
    } else {
        match verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    match cli.command {
        Command::Run { script, ruler, width, dbu, config, shapes, out } => run(script, ruler, width, dbu, config, shapes, out),
    }
}

fn run(
    script_path: PathBuf,
    ruler: Option<(f64, f64, f64, f64)>,
    width: Option<f64>,
    dbu: f64,
    config_path: Option<PathBuf>,
    shapes: Vec<(i64, f64, f64, f64, f64)>,
    out: Option<PathBuf>,
) -> anyhow::Result<()> {
    let mut config = match &config_path {
        Some(p) => EngineConfig::load(p)?,
        None => EngineConfig::default(),
    };
    config.dbu = dbu;

    let um_to_dbu = |x: f64| -> i64 { (x / config.dbu + 0.5).floor() as i64 };

    let mut layout = InMemoryLayout::new(config.dbu);
    let mut declared = std::collections::HashMap::new();
    for (layer, x0, y0, x1, y1) in &shapes {
        let idx = *declared.entry(*layer).or_insert_with(|| layout.declare_layer(*layer, 0, None));
        let poly = Polygon::box_(um_to_dbu(*x0), um_to_dbu(*y0), um_to_dbu(*x1), um_to_dbu(*y1));
        layout.add_shape(idx, poly);
    }

    let script_src = std::fs::read_to_string(&script_path)?;

    let runtime = match ruler {
        Some((x1, y1, x2, y2)) => {
            let edge = Edge::new(Point::new(um_to_dbu(x1), um_to_dbu(y1)), Point::new(um_to_dbu(x2), um_to_dbu(y2)));
            ProcessRuntime::new_2d(Box::new(layout), edge, &config)
        },
        None => {
            let width_um = width.ok_or_else(|| anyhow::anyhow!("3D mode (no --ruler) requires --width"))?;
            ProcessRuntime::new_3d(Box::new(layout), um_to_dbu(width_um), &config)
        },
    };

    runtime.run_script(&script_src)?;

    let text = xsection::export::render_tech_file(&runtime.outputs(), runtime.substrate_block(), "xsection");
    match out {
        Some(path) => std::fs::write(path, text)?,
        None => print!("{text}"),
    }
    Ok(())
}
