// ⚙️ Assignment Configuration - Business constants as data
// Thresholds and baseline window layout, loadable from JSON

use anyhow::{bail, Context as AnyhowContext, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

// ============================================================================
// CONFIG DEFINITION
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssignmentConfig {
    /// Total expenditure at or below this routes to an oversight agency
    pub cognizance_threshold: i64,

    /// Share of total (percent, inclusive) a direct-award agency needs
    /// to enter the tie-break pool
    pub direct_award_percent: i64,

    /// First audit year of the first baseline window
    pub baseline_start_year: i32,

    /// Length of each baseline window in audit years
    pub baseline_window_years: i32,

    /// Audit year whose records carry both ein/uei and a legacy key
    pub legacy_transition_year: i32,

    /// Source label written on new baseline records
    pub baseline_source: String,
}

impl Default for AssignmentConfig {
    fn default() -> Self {
        AssignmentConfig {
            cognizance_threshold: 50_000_000,
            direct_award_percent: 25,
            baseline_start_year: 2019,
            baseline_window_years: 5,
            legacy_transition_year: 2022,
            baseline_source: "GSAFAC".to_string(),
        }
    }
}

impl AssignmentConfig {
    /// Load config from JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;

        Self::from_json_str(&content)
    }

    /// Parse config from a JSON document (missing keys keep their defaults)
    pub fn from_json_str(content: &str) -> Result<Self> {
        let config: AssignmentConfig =
            serde_json::from_str(content).context("Failed to parse config JSON")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.baseline_window_years <= 0 {
            bail!(
                "baseline_window_years must be positive, got {}",
                self.baseline_window_years
            );
        }
        if !(0..=100).contains(&self.direct_award_percent) {
            bail!(
                "direct_award_percent must be within 0..=100, got {}",
                self.direct_award_percent
            );
        }
        if self.cognizance_threshold < 0 {
            bail!(
                "cognizance_threshold must be non-negative, got {}",
                self.cognizance_threshold
            );
        }
        if self.baseline_year(self.legacy_transition_year) != self.baseline_start_year {
            bail!(
                "legacy_transition_year {} is outside the first baseline window",
                self.legacy_transition_year
            );
        }
        Ok(())
    }

    /// First year of the baseline window containing `audit_year`
    ///
    /// Windows never overlap: [2019,2023], [2024,2028], ...
    pub fn baseline_year(&self, audit_year: i32) -> i32 {
        (audit_year - self.baseline_start_year).div_euclid(self.baseline_window_years)
            * self.baseline_window_years
            + self.baseline_start_year
    }

    /// Only the first window spans the identifier-scheme transition
    pub fn is_legacy_window(&self, baseline_year: i32) -> bool {
        baseline_year == self.baseline_start_year
    }

    /// Does this total route to the cognizant path?
    pub fn is_cognizant_total(&self, total_amount_expended: i64) -> bool {
        total_amount_expended > self.cognizance_threshold
    }

    /// Does a direct-award amount qualify for the tie-break pool?
    pub fn qualifies_as_direct(&self, direct_amount: i128, total_amount_expended: i64) -> bool {
        direct_amount * 100
            >= i128::from(total_amount_expended) * i128::from(self.direct_award_percent)
    }
}

// ============================================================================
// TESTS
// ============================================================================
