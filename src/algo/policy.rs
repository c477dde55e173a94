//! Correction policy: from a zone's category to a deformation profile.
//!
//! The policy table maps each category to a [`CategoryPolicy`] (raise or
//! recess, base magnitude, falloff, priority). [`build_profiles`] turns the
//! loaded zones into one immutable [`DeformationProfile`] each, applying the
//! zone intensity and the global displacement limits.
//!
//! When several profiles reach the same vertex, a [`ConflictPolicy`] decides
//! the single displacement it receives.

use serde::{Deserialize, Serialize};

use crate::annotation::PressureZone;
use crate::config::CorrectionConfig;
use crate::error::{Result, SchemaError};
use crate::warning::Warning;

/// Whether a pad pushes the surface up or down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Raise the surface along its normal.
    Raise,
    /// Recess the surface against its normal.
    Recess,
}

impl Direction {
    /// `+1` for raise, `-1` for recess.
    pub fn sign(self) -> f64 {
        match self {
            Direction::Raise => 1.0,
            Direction::Recess => -1.0,
        }
    }
}

/// Correction rule for one category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CategoryPolicy {
    /// Raise or recess.
    pub direction: Direction,
    /// Base displacement in mm, positive.
    pub magnitude: f64,
    /// Falloff radius in mm; the global margin when absent.
    #[serde(default)]
    pub falloff: Option<f64>,
    /// Higher wins under [`ConflictPolicy::Priority`].
    #[serde(default)]
    pub priority: i32,
}

impl CategoryPolicy {
    /// A raise rule with default falloff and priority.
    pub fn raise(magnitude: f64) -> Self {
        Self {
            direction: Direction::Raise,
            magnitude,
            falloff: None,
            priority: 0,
        }
    }

    /// A recess rule with default falloff and priority.
    pub fn recess(magnitude: f64) -> Self {
        Self {
            direction: Direction::Recess,
            ..Self::raise(magnitude)
        }
    }

    /// Set the falloff radius.
    pub fn with_falloff(mut self, falloff: f64) -> Self {
        self.falloff = Some(falloff);
        self
    }

    /// Set the priority.
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

/// Shape of the decay from full strength to zero across the falloff band.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FalloffShape {
    /// `0.5 (1 + cos πt)`.
    #[default]
    Cosine,
    /// Gaussian rescaled to reach exactly zero at the radius.
    Gaussian,
    /// `1 - (3t² - 2t³)`.
    Smoothstep,
    /// `1 - t`.
    Linear,
}

impl FalloffShape {
    /// Weight at normalized distance `t`; 1 at `t <= 0`, 0 at `t >= 1`.
    pub fn weight(self, t: f64) -> f64 {
        if t <= 0.0 {
            return 1.0;
        }
        if t >= 1.0 {
            return 0.0;
        }
        match self {
            FalloffShape::Cosine => 0.5 * (1.0 + (std::f64::consts::PI * t).cos()),
            FalloffShape::Gaussian => {
                let floor = (-4.0f64).exp();
                ((-4.0 * t * t).exp() - floor) / (1.0 - floor)
            }
            FalloffShape::Smoothstep => 1.0 - t * t * (3.0 - 2.0 * t),
            FalloffShape::Linear => 1.0 - t,
        }
    }
}

/// How overlapping contributions on one vertex combine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    /// Largest absolute contribution wins; ties go to the zone the vertex
    /// lies deeper inside, then to the earliest zone.
    #[default]
    MaxMagnitude,
    /// Highest category priority wins, then largest magnitude, then depth,
    /// then earliest zone.
    Priority,
    /// Falloff-weighted average of all contributions.
    WeightedBlend,
}

/// One profile's effect on one vertex.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Contribution {
    /// Index of the zone (and profile).
    pub zone: usize,
    /// Signed displacement in mm.
    pub value: f64,
    /// Falloff weight in `[0, 1]`.
    pub weight: f64,
    /// Priority of the profile's category.
    pub priority: i32,
    /// Signed distance into the zone polygon (mm); negative outside.
    pub depth: f64,
}

impl ConflictPolicy {
    /// Combine contributions, given in zone order, into one displacement.
    ///
    /// Never sums: the result is bounded in magnitude by the largest
    /// contribution.
    pub fn resolve(self, contributions: &[Contribution]) -> f64 {
        match self {
            ConflictPolicy::MaxMagnitude | ConflictPolicy::Priority => {
                self.winner(contributions).map_or(0.0, |c| c.value)
            }
            ConflictPolicy::WeightedBlend => {
                let total: f64 = contributions.iter().map(|c| c.weight).sum();
                if total <= 0.0 {
                    return 0.0;
                }
                contributions.iter().map(|c| c.value * c.weight).sum::<f64>() / total
            }
        }
    }

    /// Zone whose pad the vertex belongs to: the winner, or for a blend the
    /// contribution with the largest weighted magnitude.
    pub fn owner(self, contributions: &[Contribution]) -> Option<usize> {
        self.winner(contributions).map(|c| c.zone)
    }

    fn winner(self, contributions: &[Contribution]) -> Option<&Contribution> {
        // Strictly better; an equal later zone never replaces an earlier one.
        let beats = |c: &Contribution, b: &Contribution| {
            let (cm, bm) = match self {
                ConflictPolicy::WeightedBlend => {
                    (c.weight * c.value.abs(), b.weight * b.value.abs())
                }
                _ => (c.value.abs(), b.value.abs()),
            };
            let by_priority = match self {
                ConflictPolicy::Priority => c.priority.cmp(&b.priority),
                _ => std::cmp::Ordering::Equal,
            };
            by_priority
                .then(cm.total_cmp(&bm))
                .then(c.depth.total_cmp(&b.depth))
                .is_gt()
        };

        contributions.iter().fold(None, |best, c| match best {
            Some(b) if !beats(c, b) => Some(b),
            _ => Some(c),
        })
    }
}

/// The correction to emboss for one zone.
#[derive(Debug, Clone, PartialEq)]
pub struct DeformationProfile {
    /// Index of the zone in load order.
    pub zone: usize,
    /// Zone category.
    pub category: String,
    /// Signed displacement in mm; positive raises.
    pub magnitude: f64,
    /// Distance over which the displacement decays to zero, in mm.
    pub falloff_radius: f64,
    /// Decay shape.
    pub shape: FalloffShape,
    /// Category priority.
    pub priority: i32,
}

impl DeformationProfile {
    /// Falloff weight at `distance` from the region; 0 beyond the radius.
    pub fn weight(&self, distance: f64) -> f64 {
        if distance <= 0.0 {
            1.0
        } else if self.falloff_radius <= 0.0 || distance >= self.falloff_radius {
            0.0
        } else {
            self.shape.weight(distance / self.falloff_radius)
        }
    }

    /// Contribution at `distance` from the region, `None` when out of reach.
    /// `depth` is the signed distance into the polygon, used to break ties.
    pub fn contribution(&self, distance: f64, depth: f64) -> Option<Contribution> {
        let weight = self.weight(distance);
        if weight <= 0.0 || self.magnitude == 0.0 {
            return None;
        }
        Some(Contribution {
            zone: self.zone,
            value: self.magnitude * weight,
            weight,
            priority: self.priority,
            depth,
        })
    }
}

/// Compute the profile for one zone.
///
/// Returns the profile and, if the magnitude had to be clamped into the
/// configured range, the corresponding warning.
pub fn profile_for(
    index: usize,
    zone: &PressureZone,
    config: &CorrectionConfig,
) -> Result<(DeformationProfile, Option<Warning>)> {
    let policy = config
        .policy(&zone.category)
        .ok_or_else(|| SchemaError::UnrecognizedCategory {
            annotation: zone.id,
            name: zone.category.clone(),
        })?;

    let requested = policy.magnitude * zone.intensity.unwrap_or(1.0);
    let clamped = requested.clamp(config.min_displacement, config.max_displacement);
    let sign = policy.direction.sign();

    let warning = if clamped != requested {
        Some(Warning::MagnitudeClamped {
            zone: index,
            category: zone.category.clone(),
            requested: sign * requested,
            applied: sign * clamped,
        })
    } else {
        None
    };

    let profile = DeformationProfile {
        zone: index,
        category: zone.category.clone(),
        magnitude: sign * clamped,
        falloff_radius: policy.falloff.unwrap_or(config.falloff_margin),
        shape: config.falloff_shape,
        priority: policy.priority,
    };
    Ok((profile, warning))
}

/// Compute profiles for all zones, in zone order.
pub fn build_profiles(
    zones: &[PressureZone],
    config: &CorrectionConfig,
) -> Result<(Vec<DeformationProfile>, Vec<Warning>)> {
    let mut profiles = Vec::with_capacity(zones.len());
    let mut warnings = Vec::new();

    for (i, zone) in zones.iter().enumerate() {
        let (profile, warning) = profile_for(i, zone, config)?;
        log::debug!(
            "zone {} ({}): magnitude {:+.3} mm, falloff {:.3} mm",
            i,
            profile.category,
            profile.magnitude,
            profile.falloff_radius
        );
        if let Some(w) = warning {
            log::warn!("{}", w);
            warnings.push(w);
        }
        profiles.push(profile);
    }

    Ok((profiles, warnings))
}
