use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::binning::{AnomalyThresholds, BinningOptions};
use crate::bounds::DefaultView;
use crate::centroid::{PointPolicy, RelocateOptions};
use crate::constants::*;
use crate::error::{GeoDeltaError, GeoDeltaResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisConfig {
    #[serde(default = "default_bin_width_km")]
    pub bin_width_km: f64,
    #[serde(default)]
    pub heterogeneous_only: bool,
    #[serde(default = "default_marginal_threshold_m")]
    pub marginal_threshold_m: f64,
    #[serde(default = "default_bad_threshold_m")]
    pub bad_threshold_m: f64,
    #[serde(default = "default_top_bins")]
    pub top_bins: usize,
    #[serde(default = "default_max_selection_items")]
    pub max_selection_items: usize,
    #[serde(default = "default_max_selection_points")]
    pub max_selection_points: usize,
    #[serde(default)]
    pub point_policy: PointPolicy,
    #[serde(default)]
    pub default_view: DefaultView,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            bin_width_km: DEFAULT_BIN_WIDTH_KM,
            heterogeneous_only: false,
            marginal_threshold_m: DEFAULT_MARGINAL_THRESHOLD_M,
            bad_threshold_m: DEFAULT_BAD_THRESHOLD_M,
            top_bins: DEFAULT_TOP_BINS,
            max_selection_items: DEFAULT_MAX_SELECTION_ITEMS,
            max_selection_points: DEFAULT_MAX_SELECTION_POINTS,
            point_policy: PointPolicy::default(),
            default_view: DefaultView::default(),
        }
    }
}

impl AnalysisConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> GeoDeltaResult<Self> {
        let data = fs::read(path)?;
        let cfg: AnalysisConfig = serde_json::from_slice(&data)?;
        Ok(cfg)
    }

    pub fn validate(&self) -> GeoDeltaResult<()> {
        if !self.bin_width_km.is_finite() || self.bin_width_km <= 0.0 {
            return Err(GeoDeltaError::InvalidBinWidth(self.bin_width_km));
        }
        if !(self.marginal_threshold_m >= 0.0 && self.bad_threshold_m >= self.marginal_threshold_m) {
            return Err(GeoDeltaError::Config(format!(
                "thresholds must satisfy 0 <= marginal ({}) <= bad ({})",
                self.marginal_threshold_m, self.bad_threshold_m
            )));
        }
        if self.max_selection_items == 0 {
            return Err(GeoDeltaError::Config(
                "maxSelectionItems must be > 0".to_string(),
            ));
        }
        if self.max_selection_points == 0 {
            return Err(GeoDeltaError::Config(
                "maxSelectionPoints must be > 0".to_string(),
            ));
        }
        Ok(())
    }

    pub fn thresholds(&self) -> AnomalyThresholds {
        AnomalyThresholds {
            marginal_m: self.marginal_threshold_m,
            bad_m: self.bad_threshold_m,
        }
    }

    pub fn binning_options(&self) -> BinningOptions {
        BinningOptions {
            bin_width_km: self.bin_width_km,
            heterogeneous_only: self.heterogeneous_only,
            thresholds: self.thresholds(),
        }
    }

    pub fn relocate_options(&self) -> RelocateOptions {
        RelocateOptions {
            policy: self.point_policy,
            max_items: self.max_selection_items,
            max_points: self.max_selection_points,
        }
    }
}

fn default_bin_width_km() -> f64 {
    DEFAULT_BIN_WIDTH_KM
}

fn default_marginal_threshold_m() -> f64 {
    DEFAULT_MARGINAL_THRESHOLD_M
}

fn default_bad_threshold_m() -> f64 {
    DEFAULT_BAD_THRESHOLD_M
}

fn default_top_bins() -> usize {
    DEFAULT_TOP_BINS
}

fn default_max_selection_items() -> usize {
    DEFAULT_MAX_SELECTION_ITEMS
}

fn default_max_selection_points() -> usize {
    DEFAULT_MAX_SELECTION_POINTS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_uses_defaults() {
        let cfg: AnalysisConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg, AnalysisConfig::default());
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn reads_camel_case_fields() {
        let cfg: AnalysisConfig = serde_json::from_str(
            r#"{"binWidthKm":0.25,"heterogeneousOnly":true,"pointPolicy":"usedOnly",
                "maxSelectionItems":100,"defaultView":{"lat":12.9,"lng":77.6,"zoom":8}}"#,
        )
        .unwrap();
        assert_eq!(cfg.bin_width_km, 0.25);
        assert!(cfg.binning_options().heterogeneous_only);
        assert_eq!(cfg.relocate_options().policy, PointPolicy::UsedOnly);
        assert_eq!(cfg.relocate_options().max_items, 100);
        assert_eq!(cfg.relocate_options().max_points, DEFAULT_MAX_SELECTION_POINTS);
        assert_eq!(cfg.default_view.zoom, 8);
        assert_eq!(cfg.bad_threshold_m, DEFAULT_BAD_THRESHOLD_M);
    }

    #[test]
    fn rejects_inverted_thresholds() {
        let cfg = AnalysisConfig {
            marginal_threshold_m: 2000.0,
            ..AnalysisConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(GeoDeltaError::Config(_))));
    }

    #[test]
    fn rejects_zero_width() {
        let cfg = AnalysisConfig {
            bin_width_km: 0.0,
            ..AnalysisConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(GeoDeltaError::InvalidBinWidth(_))));
    }

    #[test]
    fn load_reports_missing_file() {
        assert!(matches!(
            AnalysisConfig::load("/nonexistent/geodelta.json"),
            Err(GeoDeltaError::Io(_))
        ));
    }
}
