//! Correction configuration.
//!
//! A [`CorrectionConfig`] holds the per-category policy table and the global
//! deformation settings. It is read once from JSON, validated, and then passed
//! by reference to every stage; nothing mutates it afterwards.
//!
//! ```
//! use insole::config::CorrectionConfig;
//!
//! let config = CorrectionConfig::from_json(r#"{
//!     "categories": {
//!         "Heel": {"direction": "raise", "magnitude": 2.0, "falloff": 5.0, "priority": 1}
//!     },
//!     "max_displacement": 4.0
//! }"#).unwrap();
//!
//! assert!(config.policy("heel").is_some());
//! assert_eq!(config.falloff_margin, 5.0);
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::algo::parameterize::Projection;
use crate::algo::policy::{CategoryPolicy, ConflictPolicy, FalloffShape};
use crate::annotation::{normalize_name, LoadOptions};
use crate::error::{Error, Result};

/// Settings for turning pressure zones into surface corrections.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CorrectionConfig {
    /// Policy per category name.
    pub categories: BTreeMap<String, CategoryPolicy>,
    /// Lower bound on the absolute displacement of a zone (mm).
    pub min_displacement: f64,
    /// Upper bound on the absolute displacement of a zone (mm).
    pub max_displacement: f64,
    /// Falloff radius for categories that do not set one (mm).
    pub falloff_margin: f64,
    /// Falloff decay shape.
    pub falloff_shape: FalloffShape,
    /// How overlapping zones combine.
    pub conflict: ConflictPolicy,
    /// Minimum vertex-normal Z for a vertex to count as foot-support surface.
    pub min_facing: f64,
    /// Material kept between a recessed vertex and the opposite surface (mm).
    pub min_thickness: f64,
    /// Explicit pixel-to-mesh calibration; fitted to the mesh bounds when absent.
    pub projection: Option<Projection>,
    /// Offset added to the fitted projection origin (mm).
    pub projection_offset: [f64; 2],
    /// Umbrella categories skipped by the loader.
    pub ignored_categories: Vec<String>,
    /// RGB colour per category for coloured output.
    pub colors: BTreeMap<String, [u8; 3]>,
    /// Colour of vertices outside every pad.
    pub base_color: [u8; 3],
}

impl Default for CorrectionConfig {
    fn default() -> Self {
        Self {
            categories: BTreeMap::new(),
            min_displacement: 0.0,
            max_displacement: 6.0,
            falloff_margin: 5.0,
            falloff_shape: FalloffShape::default(),
            conflict: ConflictPolicy::default(),
            min_facing: 0.0,
            min_thickness: 0.5,
            projection: None,
            projection_offset: [0.0, 0.0],
            ignored_categories: vec![
                "left_foot_organs".to_string(),
                "right_foot_organs".to_string(),
            ],
            colors: BTreeMap::new(),
            base_color: [128, 128, 128],
        }
    }
}

impl CorrectionConfig {
    /// Parse and validate a configuration from JSON text.
    pub fn from_json(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text)?;
        let config = config.normalized();
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a configuration file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        let config = Self::from_json(&text)?;
        log::debug!(
            "loaded {} category policies from {}",
            config.categories.len(),
            path.display()
        );
        Ok(config)
    }

    /// Add or replace a category policy.
    pub fn with_category(mut self, name: &str, policy: CategoryPolicy) -> Self {
        self.categories.insert(normalize_name(name), policy);
        self
    }

    /// Set the conflict policy.
    pub fn with_conflict(mut self, conflict: ConflictPolicy) -> Self {
        self.conflict = conflict;
        self
    }

    /// Set the falloff shape.
    pub fn with_falloff_shape(mut self, shape: FalloffShape) -> Self {
        self.falloff_shape = shape;
        self
    }

    /// Set an explicit projection.
    pub fn with_projection(mut self, projection: Projection) -> Self {
        self.projection = Some(projection);
        self
    }

    fn normalized(mut self) -> Self {
        self.categories = self
            .categories
            .into_iter()
            .map(|(name, policy)| (normalize_name(&name), policy))
            .collect();
        self.ignored_categories = self
            .ignored_categories
            .iter()
            .map(|name| normalize_name(name))
            .collect();
        self.colors = self
            .colors
            .into_iter()
            .map(|(name, rgb)| (normalize_name(&name), rgb))
            .collect();
        self
    }

    /// Check every value is in range.
    pub fn validate(&self) -> Result<()> {
        for (name, policy) in &self.categories {
            if !(policy.magnitude.is_finite() && policy.magnitude > 0.0) {
                return Err(Error::invalid_param(
                    format!("categories.{}.magnitude", name),
                    policy.magnitude,
                    "must be positive and finite",
                ));
            }
            if let Some(falloff) = policy.falloff {
                if !(falloff.is_finite() && falloff >= 0.0) {
                    return Err(Error::invalid_param(
                        format!("categories.{}.falloff", name),
                        falloff,
                        "must be non-negative and finite",
                    ));
                }
            }
        }

        if !(self.min_displacement.is_finite() && self.min_displacement >= 0.0) {
            return Err(Error::invalid_param(
                "min_displacement",
                self.min_displacement,
                "must be non-negative and finite",
            ));
        }
        if !(self.max_displacement.is_finite() && self.max_displacement >= self.min_displacement) {
            return Err(Error::invalid_param(
                "max_displacement",
                self.max_displacement,
                "must be finite and at least min_displacement",
            ));
        }
        if !(self.falloff_margin.is_finite() && self.falloff_margin >= 0.0) {
            return Err(Error::invalid_param(
                "falloff_margin",
                self.falloff_margin,
                "must be non-negative and finite",
            ));
        }
        if !(self.min_facing.is_finite() && (-1.0..1.0).contains(&self.min_facing)) {
            return Err(Error::invalid_param("min_facing", self.min_facing, "must be in [-1, 1)"));
        }
        if !(self.min_thickness.is_finite() && self.min_thickness >= 0.0) {
            return Err(Error::invalid_param(
                "min_thickness",
                self.min_thickness,
                "must be non-negative and finite",
            ));
        }
        if !self.projection_offset.iter().all(|o| o.is_finite()) {
            return Err(Error::invalid_param(
                "projection_offset",
                format!("{:?}", self.projection_offset),
                "must be finite",
            ));
        }
        if let Some(projection) = &self.projection {
            projection.validate()?;
        }
        Ok(())
    }

    /// Policy for a category, matched case-insensitively.
    pub fn policy(&self, category: &str) -> Option<&CategoryPolicy> {
        self.categories.get(&normalize_name(category))
    }

    /// Colour of a category's pads, the base colour when it has none.
    pub fn color(&self, category: &str) -> [u8; 3] {
        self.colors
            .get(&normalize_name(category))
            .copied()
            .unwrap_or(self.base_color)
    }

    /// Category names that have a policy.
    pub fn vocabulary(&self) -> impl Iterator<Item = &str> + '_ {
        self.categories.keys().map(String::as_str)
    }

    /// Annotation loader options for this configuration and zone selection.
    pub fn load_options(&self, selection: &[String]) -> LoadOptions {
        LoadOptions::new(self.vocabulary())
            .with_ignored(&self.ignored_categories)
            .with_selection(selection)
    }
}
