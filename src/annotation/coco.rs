//! COCO annotation records.
//!
//! Only the parts of the COCO layout the loader reads are modelled; unknown
//! keys are ignored. Pressure-scan exports carry one image per record.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Result, SchemaError};

use super::normalize_name;

/// A COCO-style annotation record for one foot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnnotationRecord {
    /// Annotated images; the first one defines the pixel frame.
    #[serde(default)]
    pub images: Vec<ImageInfo>,
    /// Declared categories.
    #[serde(default)]
    pub categories: Vec<CategoryInfo>,
    /// Region annotations.
    #[serde(default)]
    pub annotations: Vec<Annotation>,
}

/// Image entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageInfo {
    /// Image id.
    #[serde(default)]
    pub id: u64,
    /// Width in pixels.
    pub width: f64,
    /// Height in pixels.
    pub height: f64,
    /// Source image file name.
    #[serde(default)]
    pub file_name: String,
}

/// Category entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryInfo {
    /// Category id referenced by annotations.
    pub id: u64,
    /// Zone name.
    pub name: String,
    /// Grouping label.
    #[serde(default)]
    pub supercategory: String,
}

/// One annotated region.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Annotation {
    /// Annotation id.
    pub id: u64,
    /// Image the region is drawn on.
    #[serde(default)]
    pub image_id: u64,
    /// Category of the region.
    pub category_id: u64,
    /// Polygon rings as flat `[x0, y0, x1, y1, ...]` lists.
    pub segmentation: Vec<Vec<f64>>,
    /// Area in square pixels, `0` when the exporter left it out.
    #[serde(default)]
    pub area: f64,
    /// `[x, y, width, height]` in pixels.
    #[serde(default)]
    pub bbox: Vec<f64>,
    /// COCO crowd flag.
    #[serde(default)]
    pub iscrowd: u8,
    /// Free-form attributes; `intensity` is read when numeric.
    #[serde(default)]
    pub attributes: Map<String, Value>,
}

impl Annotation {
    /// The raw `attributes.intensity` value, if present.
    pub fn intensity(&self) -> Option<&Value> {
        self.attributes.get("intensity")
    }
}

impl AnnotationRecord {
    /// Parse a record from JSON text.
    pub fn from_json(text: &str) -> std::result::Result<Self, SchemaError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Read and parse a record from a file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Ok(Self::from_json(&text)?)
    }

    /// Look up a category by id.
    pub fn category(&self, id: u64) -> Option<&CategoryInfo> {
        self.categories.iter().find(|c| c.id == id)
    }

    /// Normalized names of the categories that annotations actually use, in
    /// first-use order, skipping `ignored` ones.
    pub fn zone_names(&self, ignored: &[String]) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for annotation in &self.annotations {
            let Some(category) = self.category(annotation.category_id) else {
                continue;
            };
            let name = normalize_name(&category.name);
            if ignored.contains(&name) || names.contains(&name) {
                continue;
            }
            names.push(name);
        }
        names
    }
}
