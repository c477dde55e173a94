//! Pressure-zone annotation loading.
//!
//! An [`AnnotationRecord`] is the raw COCO export for one foot. [`load_zones`]
//! validates it and turns every polygon ring into a [`PressureZone`], keeping
//! annotation order. Validation is strict: a malformed polygon or an unknown
//! category fails the whole record with a [`SchemaError`] rather than being
//! skipped.
//!
//! ```
//! use insole::annotation::{load_zones, AnnotationRecord, LoadOptions};
//!
//! let record = AnnotationRecord::from_json(r#"{
//!     "images": [{"width": 100, "height": 200}],
//!     "categories": [{"id": 1, "name": "Heel"}],
//!     "annotations": [{"id": 1, "category_id": 1,
//!                      "segmentation": [[10, 150, 90, 150, 50, 190]]}]
//! }"#).unwrap();
//!
//! let options = LoadOptions::new(["heel"]);
//! let zones = load_zones(&record, &options).unwrap();
//! assert_eq!(zones.zones.len(), 1);
//! assert_eq!(zones.zones[0].category, "heel");
//! ```

mod coco;

pub use coco::{Annotation, AnnotationRecord, CategoryInfo, ImageInfo};

use std::collections::BTreeSet;

use nalgebra::Point2;
use serde_json::Value;

use crate::error::{Result, SchemaError};
use crate::polygon::Polygon;
use crate::warning::Warning;

/// Lowercase, trimmed category name.
pub fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}

/// A labeled region of the sole in image pixel space.
#[derive(Debug, Clone, PartialEq)]
pub struct PressureZone {
    /// Id of the annotation the ring came from.
    pub id: u64,
    /// Normalized category name.
    pub category: String,
    /// Simple polygon with at least three distinct points.
    pub polygon: Polygon,
    /// Area in square pixels.
    pub area: f64,
    /// Optional pressure intensity multiplier.
    pub intensity: Option<f64>,
}

/// The validated zones of one record together with their pixel frame.
#[derive(Debug, Clone)]
pub struct ZoneSet {
    /// Width of the annotated image in pixels.
    pub image_width: f64,
    /// Height of the annotated image in pixels.
    pub image_height: f64,
    /// Zones in annotation order.
    pub zones: Vec<PressureZone>,
    /// Non-fatal conditions found while loading.
    pub warnings: Vec<Warning>,
}

/// What the loader accepts and which zones it keeps.
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Category names that have a correction policy.
    pub vocabulary: BTreeSet<String>,
    /// Categories skipped without error (umbrella labels).
    pub ignored: BTreeSet<String>,
    /// Zone names to keep; empty keeps all.
    pub selection: Vec<String>,
}

impl LoadOptions {
    /// Options accepting the given vocabulary.
    pub fn new<I, S>(vocabulary: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            vocabulary: vocabulary.into_iter().map(|s| normalize_name(s.as_ref())).collect(),
            ..Self::default()
        }
    }

    /// Skip the given categories.
    pub fn with_ignored<I, S>(mut self, ignored: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.ignored = ignored.into_iter().map(|s| normalize_name(s.as_ref())).collect();
        self
    }

    /// Keep only the named zones.
    pub fn with_selection<I, S>(mut self, selection: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.selection = selection.into_iter().map(|s| normalize_name(s.as_ref())).collect();
        self
    }
}

/// Validate a record and extract its pressure zones.
pub fn load_zones(record: &AnnotationRecord, options: &LoadOptions) -> Result<ZoneSet> {
    let image = record.images.first().ok_or(SchemaError::MissingImage)?;
    let valid = |size: f64| size.is_finite() && size > 0.0;
    if !(valid(image.width) && valid(image.height)) {
        return Err(SchemaError::InvalidImageSize {
            width: image.width,
            height: image.height,
        }
        .into());
    }

    let mut warnings = Vec::new();
    let selection: Vec<String> = options
        .selection
        .iter()
        .map(|s| normalize_name(s))
        .collect();
    if !selection.is_empty() {
        // Ignored umbrella categories are never loaded, so they cannot match.
        let ignored: Vec<String> = options.ignored.iter().cloned().collect();
        let available = record.zone_names(&ignored);
        let mut matched = 0;
        for name in &selection {
            if available.contains(name) {
                matched += 1;
            } else {
                let warning = Warning::UnknownSelection { name: name.clone() };
                log::warn!("{}", warning);
                warnings.push(warning);
            }
        }
        if matched == 0 {
            return Err(SchemaError::NoSelectedZones { selected: selection }.into());
        }
    }

    let mut zones = Vec::new();
    for annotation in &record.annotations {
        let category = record
            .category(annotation.category_id)
            .ok_or(SchemaError::UnknownCategoryId {
                annotation: annotation.id,
                category_id: annotation.category_id,
            })?;
        let name = normalize_name(&category.name);

        if options.ignored.contains(&name) {
            continue;
        }
        if !selection.is_empty() && !selection.contains(&name) {
            continue;
        }
        if !options.vocabulary.contains(&name) {
            return Err(SchemaError::UnrecognizedCategory {
                annotation: annotation.id,
                name,
            }
            .into());
        }

        let intensity = parse_intensity(annotation)?;

        for ring in &annotation.segmentation {
            let polygon = parse_ring(annotation.id, ring)?;
            let area = if annotation.segmentation.len() == 1 && annotation.area > 0.0 {
                annotation.area
            } else {
                polygon.area()
            };
            zones.push(PressureZone {
                id: annotation.id,
                category: name.clone(),
                polygon,
                area,
                intensity,
            });
        }
    }

    log::debug!(
        "loaded {} zones from {} annotations ({}x{} px)",
        zones.len(),
        record.annotations.len(),
        image.width,
        image.height
    );

    Ok(ZoneSet {
        image_width: image.width,
        image_height: image.height,
        zones,
        warnings,
    })
}

fn parse_intensity(annotation: &Annotation) -> std::result::Result<Option<f64>, SchemaError> {
    let Some(value) = annotation.intensity() else {
        return Ok(None);
    };
    let invalid = |value: f64| SchemaError::InvalidIntensity {
        annotation: annotation.id,
        value,
    };
    match value {
        Value::Null => Ok(None),
        Value::Number(n) => {
            let v = n.as_f64().ok_or_else(|| invalid(f64::NAN))?;
            if v.is_finite() && v >= 0.0 {
                Ok(Some(v))
            } else {
                Err(invalid(v))
            }
        }
        Value::String(s) => match s.trim().parse::<f64>() {
            Ok(v) if v.is_finite() && v >= 0.0 => Ok(Some(v)),
            Ok(v) => Err(invalid(v)),
            Err(_) => Err(invalid(f64::NAN)),
        },
        _ => Err(invalid(f64::NAN)),
    }
}

fn parse_ring(annotation: u64, ring: &[f64]) -> std::result::Result<Polygon, SchemaError> {
    if ring.len() % 2 != 0 {
        return Err(SchemaError::OddCoordinateCount {
            annotation,
            count: ring.len(),
        });
    }
    if ring.iter().any(|c| !c.is_finite()) {
        return Err(SchemaError::NonFiniteCoordinate { annotation });
    }

    // Drop consecutive repeats so a doubled click does not read as a spike.
    let mut points: Vec<Point2<f64>> = Vec::with_capacity(ring.len() / 2);
    for c in ring.chunks_exact(2) {
        let p = Point2::new(c[0], c[1]);
        if points.last() != Some(&p) {
            points.push(p);
        }
    }
    let polygon = Polygon::new(points);

    let distinct = polygon.distinct_points();
    if distinct < 3 {
        return Err(SchemaError::TooFewPoints {
            annotation,
            points: distinct,
        });
    }
    if !polygon.is_simple() {
        return Err(SchemaError::SelfIntersecting { annotation });
    }
    Ok(polygon)
}
