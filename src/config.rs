//! Rating configuration.
//!
//! Loaded from an optional TOML file, then `RATING_*` environment variables.

use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct RatingConfig {
    /// Neighbors consulted per prediction
    #[serde(default = "default_k")]
    pub k: usize,

    #[serde(default = "default_attendance_weight")]
    pub attendance_weight: f64,

    #[serde(default = "default_kpi_weight")]
    pub kpi_weight: f64,

    #[serde(default = "default_overtime_weight")]
    pub overtime_weight: f64,

    /// Overtime that maps to the top of the 0-100 scale in weighted mode
    #[serde(default = "default_max_overtime_hours")]
    pub max_overtime_hours: f64,

    /// Apply the weights above to the neighbor distance. Off by default:
    /// plain Euclidean distance over raw features.
    #[serde(default)]
    pub weighted_distance: bool,

    /// Fall back to the built-in seed samples when history is thin
    #[serde(default = "default_synthetic_seed")]
    pub synthetic_seed: bool,
}

fn default_k() -> usize {
    3
}

fn default_attendance_weight() -> f64 {
    0.4
}

fn default_kpi_weight() -> f64 {
    0.5
}

fn default_overtime_weight() -> f64 {
    0.1
}

fn default_max_overtime_hours() -> f64 {
    40.0
}

fn default_synthetic_seed() -> bool {
    true
}

impl Default for RatingConfig {
    fn default() -> Self {
        Self {
            k: default_k(),
            attendance_weight: default_attendance_weight(),
            kpi_weight: default_kpi_weight(),
            overtime_weight: default_overtime_weight(),
            max_overtime_hours: default_max_overtime_hours(),
            weighted_distance: false,
            synthetic_seed: default_synthetic_seed(),
        }
    }
}

impl RatingConfig {
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = ::config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(::config::File::from(path).required(true));
        }
        let settings = builder
            .add_source(::config::Environment::with_prefix("RATING").try_parsing(true))
            .build()
            .context("failed to read rating configuration")?;

        let mut loaded: RatingConfig = settings
            .try_deserialize()
            .context("invalid rating configuration")?;
        if loaded.k == 0 {
            tracing::warn!("k = 0 is not usable, using 1");
            loaded.k = 1;
        }
        if loaded.max_overtime_hours.is_nan() || loaded.max_overtime_hours <= 0.0 {
            anyhow::bail!(
                "max_overtime_hours must be positive, got {}",
                loaded.max_overtime_hours
            );
        }
        for (name, weight) in [
            ("attendance_weight", loaded.attendance_weight),
            ("kpi_weight", loaded.kpi_weight),
            ("overtime_weight", loaded.overtime_weight),
        ] {
            if !weight.is_finite() || weight < 0.0 {
                anyhow::bail!("{name} must be a non-negative number, got {weight}");
            }
        }
        Ok(loaded)
    }
}
