//! Insole CLI - embed pressure-zone corrections into insole meshes.
//!
//! Usage: insole <COMMAND> [OPTIONS]
//!
//! Run `insole --help` for available commands.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Instant;

use clap::{Parser, Subcommand};

use insole::algo::Progress;
use insole::annotation::AnnotationRecord;
use insole::config::CorrectionConfig;
use insole::io;
use insole::mesh::{validate_closed_manifold, HalfEdgeMesh};
use insole::pipeline::{run_feet, FootJob, FootReport, PipelineOptions};

#[derive(Parser)]
#[command(name = "insole")]
#[command(author, version, about = "Pressure-zone insole generator", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Display mesh information
    Info {
        /// Input mesh file
        input: PathBuf,
    },

    /// List the zone names in an annotation record
    Zones {
        /// COCO annotation file
        annotations: PathBuf,

        /// Correction config; marks zones without a policy and hides ignored categories
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Emboss pressure zones onto one or both insoles
    Generate {
        /// Correction config (JSON)
        #[arg(short, long)]
        config: PathBuf,

        /// Left foot: base mesh, annotations, output mesh
        #[arg(long, num_args = 3, value_names = ["MESH", "ANNOTATIONS", "OUTPUT"])]
        left: Option<Vec<PathBuf>>,

        /// Right foot: base mesh, annotations, output mesh
        #[arg(long, num_args = 3, value_names = ["MESH", "ANNOTATIONS", "OUTPUT"])]
        right: Option<Vec<PathBuf>>,

        /// Only process the named zones (repeatable)
        #[arg(short, long = "zone", value_name = "NAME")]
        zones: Vec<String>,

        /// Also write a PLY next to each output with pads coloured by category
        #[arg(long)]
        colors: bool,

        /// Use single-threaded execution (for benchmarking)
        #[arg(long)]
        sequential: bool,
    },
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    match run(cli) {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}

/// Returns `Ok(false)` when some foot failed.
fn run(cli: Cli) -> Result<bool, Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Info { input } => {
            cmd_info(&input)?;
            Ok(true)
        }
        Commands::Zones { annotations, config } => {
            cmd_zones(&annotations, config.as_ref())?;
            Ok(true)
        }
        Commands::Generate {
            config,
            left,
            right,
            zones,
            colors,
            sequential,
        } => cmd_generate(&config, left, right, zones, colors, sequential),
    }
}

const BAR_WIDTH: usize = 20;

/// Create a progress reporter that keeps one bar per foot on a single
/// terminal line. Messages arrive as `label: stage`.
fn create_progress(labels: &[String]) -> Progress {
    let bars = Mutex::new(labels.iter().map(|l| (l.clone(), 0)).collect::<BTreeMap<_, _>>());

    Progress::new(move |current, total, message| {
        if total == 0 {
            return;
        }
        let percent = if current >= total {
            100
        } else {
            ((current * 100) + (total / 2)) / total
        };
        let (label, stage) = message.split_once(": ").unwrap_or(("", message));

        let Ok(mut bars) = bars.lock() else {
            return;
        };
        let seen = bars.entry(label.to_string()).or_insert(0);
        // Each foot's bar only moves forward.
        if percent <= *seen && percent != 100 {
            return;
        }
        *seen = percent.max(*seen);

        eprint!("\r{}  {:<24}", render_bars(&bars), stage);
        let _ = std::io::stderr().flush();

        if bars.values().all(|&p| p == 100) {
            eprintln!();
        }
    })
}

fn render_bars(bars: &BTreeMap<String, usize>) -> String {
    bars.iter()
        .map(|(label, &percent)| {
            let filled = (percent * BAR_WIDTH) / 100;
            format!(
                "{} [{}{}] {:3}%",
                label,
                "=".repeat(filled),
                " ".repeat(BAR_WIDTH - filled),
                percent
            )
        })
        .collect::<Vec<_>>()
        .join("  ")
}

fn cmd_info(input: &PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let mesh: HalfEdgeMesh = io::load(input)?;

    println!("File: {}", input.display());
    println!("Vertices: {}", mesh.num_vertices());
    println!("Faces: {}", mesh.num_faces());
    println!("Half-edges: {}", mesh.num_halfedges());
    println!("Surface area: {:.3} mm^2", mesh.surface_area());

    if let Some((min, max)) = mesh.bounding_box() {
        println!(
            "Bounding box: ({:.3}, {:.3}, {:.3}) to ({:.3}, {:.3}, {:.3})",
            min.x, min.y, min.z, max.x, max.y, max.z
        );
        let diag = max - min;
        println!("Dimensions: {:.3} x {:.3} x {:.3}", diag.x, diag.y, diag.z);
    }

    match validate_closed_manifold(&mesh) {
        Ok(()) => {
            println!("Topology: Closed manifold");
            println!("Volume: {:.3} mm^3", mesh.signed_volume());
        }
        Err(e) => println!("Topology: Not watertight ({})", e),
    }

    Ok(())
}

fn cmd_zones(
    annotations: &PathBuf,
    config: Option<&PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let record = AnnotationRecord::from_file(annotations)?;
    let config = match config {
        Some(path) => Some(CorrectionConfig::from_file(path)?),
        None => None,
    };
    let ignored = config
        .as_ref()
        .map(|c| c.ignored_categories.clone())
        .unwrap_or_default();

    let names = record.zone_names(&ignored);
    println!("{} zones in {}", names.len(), annotations.display());
    for name in names {
        let count = record
            .annotations
            .iter()
            .filter(|a| {
                record
                    .category(a.category_id)
                    .is_some_and(|c| insole::annotation::normalize_name(&c.name) == name)
            })
            .count();
        let note = match &config {
            Some(c) if c.policy(&name).is_none() => "  (no policy)",
            _ => "",
        };
        println!("  {:<20} {:>3} annotation(s){}", name, count, note);
    }

    Ok(())
}

fn cmd_generate(
    config_path: &PathBuf,
    left: Option<Vec<PathBuf>>,
    right: Option<Vec<PathBuf>>,
    zones: Vec<String>,
    colors: bool,
    sequential: bool,
) -> Result<bool, Box<dyn std::error::Error>> {
    let config = CorrectionConfig::from_file(config_path)?;

    let jobs: Vec<FootJob> = [("left", left), ("right", right)]
        .into_iter()
        .filter_map(|(label, paths)| {
            let paths = paths?;
            let [mesh, annotations, output] = paths.as_slice() else {
                return None;
            };
            let job = FootJob::new(label, mesh, annotations, output).with_selection(zones.clone());
            Some(if colors {
                job.with_color_output(output.with_extension("ply"))
            } else {
                job
            })
        })
        .collect();

    if jobs.is_empty() {
        return Err("nothing to do: pass --left and/or --right".into());
    }

    let options = if sequential {
        PipelineOptions::default().sequential()
    } else {
        PipelineOptions::default()
    };
    let mode = if sequential { "sequential" } else { "parallel" };
    println!("Processing {} foot/feet ({})...", jobs.len(), mode);

    let labels: Vec<String> = jobs.iter().map(|job| job.label.clone()).collect();
    let progress = create_progress(&labels);
    let start = Instant::now();
    let results = run_feet(&jobs, &config, &options, &progress);
    let elapsed = start.elapsed();

    let mut all_ok = true;
    for (job, result) in jobs.iter().zip(results) {
        println!();
        match result {
            Ok(report) => print_report(&report),
            Err(e) => {
                all_ok = false;
                println!("{}: FAILED: {}", job.label, e);
            }
        }
    }
    println!("\nTotal: {:.2?}", elapsed);

    Ok(all_ok)
}

fn print_report(report: &FootReport) {
    println!("{}: {}", report.label, report.output_path.display());
    if let Some(path) = &report.color_output {
        println!("  Coloured: {}", path.display());
    }
    println!(
        "  Mapped vertices: {} of {} eligible",
        report.mapped_vertices, report.eligible_vertices
    );
    println!("  Zones: {}", report.zones.len());
    for zone in &report.zones {
        println!(
            "    {:<20} {:+6.2} mm  {:>6} vertices  coverage {:5.1}%",
            zone.category,
            zone.magnitude,
            zone.vertices,
            zone.coverage * 100.0
        );
    }
    println!("  Displaced vertices: {}", report.stats.vertices_displaced);
    println!("  Max displacement: {:.3} mm", report.stats.max_displacement);
    if report.stats.clamped > 0 {
        println!("  Clamped to keep the sole valid: {}", report.stats.clamped);
    }
    println!("  Warnings: {}", report.warnings.len());
    for warning in &report.warnings {
        println!("    - {}", warning);
    }
    println!("  Elapsed: {:.2?}", report.elapsed);
}
