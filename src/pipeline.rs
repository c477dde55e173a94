//! End-to-end processing of one or more feet.
//!
//! [`process_foot`] runs the in-memory stages: load zones, build profiles, map
//! the zones onto the mesh, deform. [`run_foot`] wraps it with file loading and
//! export, and [`run_feet`] runs several jobs in parallel. Each foot has its
//! own mesh, record and output; a failure in one never affects another.
//!
//! ```no_run
//! use insole::config::CorrectionConfig;
//! use insole::pipeline::{run_feet, FootJob, PipelineOptions};
//! use insole::algo::Progress;
//!
//! let config = CorrectionConfig::from_file("config/reflexology_zones.json").unwrap();
//! let jobs = vec![
//!     FootJob::new("left", "Sole_Left.stl", "Left_zones.json", "left_out.stl"),
//!     FootJob::new("right", "Sole_Right.stl", "Right_zones.json", "right_out.stl"),
//! ];
//!
//! for result in run_feet(&jobs, &config, &PipelineOptions::default(), &Progress::none()) {
//!     match result {
//!         Ok(report) => {
//!             println!("{}: {} vertices displaced", report.label, report.stats.vertices_displaced)
//!         }
//!         Err(e) => eprintln!("failed: {}", e),
//!     }
//! }
//! ```

use std::path::PathBuf;
use std::time::{Duration, Instant};

use rayon::prelude::*;

use crate::algo::deform::{deform, DeformOptions, DeformStats};
use crate::algo::mapping::{map_zones, MapOptions};
use crate::algo::parameterize::Projection;
use crate::algo::policy::build_profiles;
use crate::algo::Progress;
use crate::annotation::{load_zones, AnnotationRecord, ZoneSet};
use crate::config::CorrectionConfig;
use crate::error::Result;
use crate::io;
use crate::mesh::{validate_closed_manifold, HalfEdgeMesh};
use crate::warning::Warning;

const STAGES: usize = 5;

/// Execution options shared by all feet.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Whether to use parallel execution, across feet and within stages
    /// (default: true).
    pub parallel: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self { parallel: true }
    }
}

impl PipelineOptions {
    /// Create options for single-threaded execution.
    pub fn sequential(mut self) -> Self {
        self.parallel = false;
        self
    }
}

/// Input and output files for one foot.
#[derive(Debug, Clone)]
pub struct FootJob {
    /// Name used in logs and reports, e.g. `left`.
    pub label: String,
    /// Base insole mesh (STL or PLY).
    pub mesh_path: PathBuf,
    /// COCO annotation record.
    pub annotations_path: PathBuf,
    /// Output mesh (STL or PLY).
    pub output_path: PathBuf,
    /// Optional second output with pads coloured by category (PLY).
    pub color_output: Option<PathBuf>,
    /// Zone names to process; empty processes all.
    pub selection: Vec<String>,
}

impl FootJob {
    /// A job processing every zone.
    pub fn new(
        label: impl Into<String>,
        mesh_path: impl Into<PathBuf>,
        annotations_path: impl Into<PathBuf>,
        output_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            label: label.into(),
            mesh_path: mesh_path.into(),
            annotations_path: annotations_path.into(),
            output_path: output_path.into(),
            color_output: None,
            selection: Vec::new(),
        }
    }

    /// Also write a colour-coded copy of the output.
    pub fn with_color_output(mut self, path: impl Into<PathBuf>) -> Self {
        self.color_output = Some(path.into());
        self
    }

    /// Restrict the job to the named zones.
    pub fn with_selection(mut self, selection: Vec<String>) -> Self {
        self.selection = selection;
        self
    }
}

/// Per-zone outcome.
#[derive(Debug, Clone, PartialEq)]
pub struct ZoneSummary {
    /// Zone category.
    pub category: String,
    /// Signed magnitude applied inside the zone (mm).
    pub magnitude: f64,
    /// Vertices under the zone.
    pub vertices: usize,
    /// Sampled area over polygon area; see
    /// [`SurfaceRegion::coverage`](crate::algo::mapping::SurfaceRegion::coverage).
    pub coverage: f64,
}

/// In-memory result of [`process_foot`].
#[derive(Debug, Clone)]
pub struct FootOutput {
    /// The corrected mesh.
    pub mesh: HalfEdgeMesh,
    /// The projection that was used.
    pub projection: Projection,
    /// RGB per vertex: the colour of the pad it belongs to, or the base
    /// colour.
    pub colors: Vec<[u8; 3]>,
    /// One entry per zone, in load order.
    pub zones: Vec<ZoneSummary>,
    /// Vertices on the foot-support surface.
    pub eligible_vertices: usize,
    /// Eligible vertices under at least one zone.
    pub mapped_vertices: usize,
    /// Deformation statistics.
    pub stats: DeformStats,
    /// Every warning raised, in stage order.
    pub warnings: Vec<Warning>,
}

/// Outcome of [`run_foot`].
#[derive(Debug, Clone)]
pub struct FootReport {
    /// The job label.
    pub label: String,
    /// Where the mesh was written.
    pub output_path: PathBuf,
    /// Where the coloured mesh was written, if requested.
    pub color_output: Option<PathBuf>,
    /// One entry per zone, in load order.
    pub zones: Vec<ZoneSummary>,
    /// Vertices on the foot-support surface.
    pub eligible_vertices: usize,
    /// Eligible vertices under at least one zone.
    pub mapped_vertices: usize,
    /// Deformation statistics.
    pub stats: DeformStats,
    /// Every warning raised, in stage order.
    pub warnings: Vec<Warning>,
    /// Wall-clock time for the foot.
    pub elapsed: Duration,
}

/// Correct a mesh in memory.
///
/// Annotations are validated before the mesh is looked at, and the mesh is
/// validated before anything is deformed.
pub fn process_foot(
    mesh: &HalfEdgeMesh,
    record: &AnnotationRecord,
    selection: &[String],
    config: &CorrectionConfig,
    options: &PipelineOptions,
) -> Result<FootOutput> {
    let zone_set = load_zones(record, &config.load_options(selection))?;
    process_zones(mesh, zone_set, config, options)
}

/// Correct a mesh in memory from already loaded zones.
pub fn process_zones(
    mesh: &HalfEdgeMesh,
    zone_set: ZoneSet,
    config: &CorrectionConfig,
    options: &PipelineOptions,
) -> Result<FootOutput> {
    let (profiles, policy_warnings) = build_profiles(&zone_set.zones, config)?;

    validate_closed_manifold(mesh)?;

    let projection = match config.projection {
        Some(projection) => projection,
        None => Projection::fit_to_mesh(
            mesh,
            zone_set.image_width,
            zone_set.image_height,
            config.projection_offset,
        )?,
    };
    log::debug!("projection: {:?}", projection);

    let map_options = MapOptions::default()
        .with_min_facing(config.min_facing)
        .with_parallel(options.parallel);
    let mapping = map_zones(mesh, &zone_set.zones, &projection, &map_options);

    let deform_options = DeformOptions::default()
        .with_conflict(config.conflict)
        .with_min_thickness(config.min_thickness)
        .with_parallel(options.parallel);
    let output = deform(mesh, &mapping, &profiles, &deform_options)?;

    let zones = profiles
        .iter()
        .zip(mapping.regions.iter())
        .map(|(profile, region)| ZoneSummary {
            category: profile.category.clone(),
            magnitude: profile.magnitude,
            vertices: region.len(),
            coverage: region.coverage(),
        })
        .collect();

    let colors = output
        .owners
        .iter()
        .map(|owner| match owner {
            Some(zone) => config.color(&profiles[*zone].category),
            None => config.base_color,
        })
        .collect();

    let mut mapped = vec![false; mesh.num_vertices()];
    for rv in mapping.regions.iter().flat_map(|r| r.vertices.iter()) {
        mapped[rv.vertex.index()] = true;
    }
    let mapped_vertices = mapped.iter().filter(|&&m| m).count();
    let eligible_vertices = mapping.num_eligible();
    log::info!(
        "{} of {} eligible vertices under a zone",
        mapped_vertices,
        eligible_vertices
    );

    let mut warnings = zone_set.warnings;
    warnings.extend(policy_warnings);
    warnings.extend(mapping.warnings);
    warnings.extend(output.warnings.into_iter().map(Warning::from));

    Ok(FootOutput {
        mesh: output.mesh,
        projection,
        colors,
        zones,
        eligible_vertices,
        mapped_vertices,
        stats: output.stats,
        warnings,
    })
}

/// Load, correct and export one foot.
///
/// Nothing is written unless every stage before export succeeds.
pub fn run_foot(
    job: &FootJob,
    config: &CorrectionConfig,
    options: &PipelineOptions,
    progress: &Progress,
) -> Result<FootReport> {
    let start = Instant::now();
    let stage =
        |i: usize, what: &str| progress.report(i, STAGES, &format!("{}: {}", job.label, what));

    stage(0, "loading annotations");
    let record = AnnotationRecord::from_file(&job.annotations_path)?;
    let zone_set = load_zones(&record, &config.load_options(&job.selection))?;

    stage(1, "loading mesh");
    let mesh = io::load(&job.mesh_path)?;
    log::info!(
        "{}: loaded {} ({} vertices, {} faces)",
        job.label,
        job.mesh_path.display(),
        mesh.num_vertices(),
        mesh.num_faces()
    );

    stage(2, "mapping and deforming");
    let output = process_zones(&mesh, zone_set, config, options)?;

    stage(4, "exporting");
    match &job.color_output {
        Some(path) if *path == job.output_path => {
            io::save_with_colors(&output.mesh, &output.colors, path)?
        }
        Some(path) => {
            io::save(&output.mesh, &job.output_path)?;
            io::save_with_colors(&output.mesh, &output.colors, path)?;
        }
        None => io::save(&output.mesh, &job.output_path)?,
    }
    stage(5, "done");

    let elapsed = start.elapsed();
    log::info!(
        "{}: wrote {} ({} vertices displaced, {} warnings) in {:.2?}",
        job.label,
        job.output_path.display(),
        output.stats.vertices_displaced,
        output.warnings.len(),
        elapsed
    );

    Ok(FootReport {
        label: job.label.clone(),
        output_path: job.output_path.clone(),
        color_output: job.color_output.clone(),
        zones: output.zones,
        eligible_vertices: output.eligible_vertices,
        mapped_vertices: output.mapped_vertices,
        stats: output.stats,
        warnings: output.warnings,
        elapsed,
    })
}

/// Run several feet independently; results are in job order.
pub fn run_feet(
    jobs: &[FootJob],
    config: &CorrectionConfig,
    options: &PipelineOptions,
    progress: &Progress,
) -> Vec<Result<FootReport>> {
    let run_one = |job: &FootJob| {
        let result = run_foot(job, config, options, progress);
        if let Err(e) = &result {
            log::error!("{}: {}", job.label, e);
        }
        result
    };

    if options.parallel {
        jobs.par_iter().map(run_one).collect()
    } else {
        jobs.iter().map(run_one).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algo::policy::CategoryPolicy;
    use crate::error::{Error, MeshIntegrityError, SchemaError};
    use crate::mesh::fixtures::{create_slab, slab_arrays};
    use crate::mesh::build_from_triangles;
    use nalgebra::Point3;

    /// 40 x 40 px image over a 40 x 40 mm slab: one pixel per millimetre,
    /// rows flipped.
    fn record(segmentation: &str) -> AnnotationRecord {
        AnnotationRecord::from_json(&format!(
            r#"{{
                "images": [{{"id": 1, "width": 40, "height": 40}}],
                "categories": [{{"id": 1, "name": "LEFT_FOOT_ORGANS"}},
                               {{"id": 2, "name": "heel"}}],
                "annotations": [
                    {{"id": 1, "category_id": 1, "segmentation": [[0, 0, 40, 0, 40, 40, 0, 40]]}},
                    {{"id": 2, "category_id": 2, "segmentation": [{}]}}
                ]
            }}"#,
            segmentation
        ))
        .unwrap()
    }

    fn config() -> CorrectionConfig {
        let mut config = CorrectionConfig::default()
            .with_category("heel", CategoryPolicy::raise(2.0).with_falloff(5.0));
        config.colors.insert("heel".to_string(), [255, 0, 0]);
        config
    }

    fn write_job(dir: &std::path::Path, mesh: &HalfEdgeMesh, segmentation: &str) -> FootJob {
        let mesh_path = dir.join("base.ply");
        io::save(mesh, &mesh_path).unwrap();
        let annotations_path = dir.join("zones.json");
        let json = serde_json::to_string(&record(segmentation)).unwrap();
        std::fs::write(&annotations_path, json).unwrap();
        FootJob::new("left", mesh_path, annotations_path, dir.join("out.stl"))
    }

    #[test]
    fn test_process_foot_heel() {
        let mesh = create_slab(40, 40, 40.0, 40.0, 5.0);
        // Pixel rows are flipped: rows 14..28 map to y 26..12.
        let out = process_foot(
            &mesh,
            &record("[12, 28, 28, 28, 20, 14]"),
            &[],
            &config(),
            &PipelineOptions::default(),
        )
        .unwrap();

        assert_eq!(out.zones.len(), 1);
        assert_eq!(out.zones[0].category, "heel");
        assert_eq!(out.zones[0].magnitude, 2.0);
        assert!(out.zones[0].vertices > 0);
        assert!((out.stats.max_displacement - 2.0).abs() < 1e-9);
        assert!(out.warnings.is_empty());
        assert_eq!(out.mesh.num_faces(), mesh.num_faces());
        assert!(out.projection.flip_y);

        // Top surface is eligible; the heel covers part of it, densely.
        assert_eq!(out.eligible_vertices, 41 * 41);
        assert_eq!(out.mapped_vertices, out.zones[0].vertices);
        assert!(out.zones[0].coverage > 0.8 && out.zones[0].coverage < 1.5);

        // Pads and their falloff take the category colour, the rest stays grey.
        assert_eq!(out.colors.len(), mesh.num_vertices());
        let red = out.colors.iter().filter(|&&c| c == [255, 0, 0]).count();
        assert_eq!(red, out.stats.vertices_displaced);
        assert!(red > out.zones[0].vertices);
        assert!(out.colors.iter().all(|&c| c == [255, 0, 0] || c == [128, 128, 128]));
    }

    #[test]
    fn test_two_point_polygon_fails_before_mesh() {
        // An open mesh would fail integrity; the schema error must come first.
        let (vertices, mut faces) = slab_arrays(2, 2, 40.0, 40.0, 5.0);
        faces.pop();
        let open = build_from_triangles(&vertices, &faces).unwrap();

        let options = PipelineOptions::default();
        let err = process_foot(&open, &record("[0, 0, 10, 10]"), &[], &config(), &options)
            .unwrap_err();
        assert!(matches!(err, Error::Schema(SchemaError::TooFewPoints { .. })));
    }

    #[test]
    fn test_non_manifold_mesh_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let good = create_slab(4, 4, 40.0, 40.0, 5.0);
        let mut job = write_job(dir.path(), &good, "[12, 28, 28, 28, 20, 14]");

        // Replace the mesh with one that has an edge shared by three faces.
        let vertices = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
            Point3::new(0.0, -1.0, 0.0),
            Point3::new(0.0, 0.0, 1.0),
        ];
        let ply = dir.path().join("bad.ply");
        let text = format!(
            "ply\nformat ascii 1.0\nelement vertex {}\n\
             property double x\nproperty double y\nproperty double z\n\
             element face 3\nproperty list uchar int vertex_indices\nend_header\n\
             {}\n3 0 1 2\n3 1 0 3\n3 0 1 4\n",
            vertices.len(),
            vertices
                .iter()
                .map(|p| format!("{} {} {}", p.x, p.y, p.z))
                .collect::<Vec<_>>()
                .join("\n")
        );
        std::fs::write(&ply, text).unwrap();
        job.mesh_path = ply;

        let options = PipelineOptions::default();
        let err = run_foot(&job, &config(), &options, &Progress::none()).unwrap_err();
        assert!(matches!(
            err,
            Error::MeshIntegrity(MeshIntegrityError::NonManifoldEdge { .. })
        ));
        assert!(!job.output_path.exists());
    }

    #[test]
    fn test_run_feet_isolates_failures() {
        let dir = tempfile::tempdir().unwrap();
        let left_dir = dir.path().join("left");
        let right_dir = dir.path().join("right");
        std::fs::create_dir_all(&left_dir).unwrap();
        std::fs::create_dir_all(&right_dir).unwrap();

        let mesh = create_slab(8, 8, 40.0, 40.0, 5.0);
        let left = write_job(&left_dir, &mesh, "[12, 28, 28, 28, 20, 14]");
        let mut right = write_job(&right_dir, &mesh, "[12, 28, 28, 28, 20, 14]");
        right.label = "right".to_string();
        right.annotations_path = right_dir.join("missing.json");

        let options = PipelineOptions::default();
        let results = run_feet(&[left.clone(), right], &config(), &options, &Progress::none());
        assert_eq!(results.len(), 2);

        let report = results[0].as_ref().unwrap();
        assert_eq!(report.label, "left");
        assert!(left.output_path.exists());
        let reloaded = io::load(&left.output_path).unwrap();
        assert_eq!(reloaded.num_faces(), mesh.num_faces());

        assert!(matches!(results[1], Err(Error::Io(_))));
    }

    #[test]
    fn test_run_foot_writes_colored_copy() {
        let dir = tempfile::tempdir().unwrap();
        let mesh = create_slab(8, 8, 40.0, 40.0, 5.0);
        let job = write_job(dir.path(), &mesh, "[12, 28, 28, 28, 20, 14]")
            .with_color_output(dir.path().join("out_colored.ply"));

        let options = PipelineOptions::default();
        let report = run_foot(&job, &config(), &options, &Progress::none()).unwrap();
        assert_eq!(report.color_output.as_deref(), job.color_output.as_deref());
        assert!(job.output_path.exists());

        let text = std::fs::read_to_string(dir.path().join("out_colored.ply")).unwrap();
        assert!(text.contains("property uchar red"));
        assert!(text.contains(" 255 0 0\n"));
        assert!(text.contains(" 128 128 128\n"));
    }

    #[test]
    fn test_selection_warning_is_reported() {
        let mesh = create_slab(8, 8, 40.0, 40.0, 5.0);
        let out = process_foot(
            &mesh,
            &record("[12, 28, 28, 28, 20, 14]"),
            &["heel".to_string(), "kidney".to_string()],
            &config(),
            &PipelineOptions::default().sequential(),
        )
        .unwrap();
        assert_eq!(
            out.warnings,
            vec![Warning::UnknownSelection {
                name: "kidney".to_string()
            }]
        );
    }
}
