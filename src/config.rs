// ⚙️ Pipeline configuration - one run, one input/output directory pair

use std::path::PathBuf;

use chrono::NaiveDate;
use serde::Serialize;

/// Amount tolerance for receipt/premium concordance and tariff pricing.
pub const DEFAULT_TOLERANCE: f64 = 0.01;

/// Tolerance for premium component arithmetic (tax + fee + net).
pub const DEFAULT_COMPONENT_TOLERANCE: f64 = 1.0;

/// Discount applied to every contract of a customer except their most
/// expensive one.
pub const MULTI_CONTRACT_DISCOUNT: f64 = 0.15;

#[derive(Debug, Clone, Serialize)]
pub struct PipelineConfig {
    /// Directory holding the month's broker CSV extracts.
    pub input_dir: PathBuf,

    /// Directory receiving cleaned tables, logs and the report.
    pub output_dir: PathBuf,

    /// Amount tolerance, in currency units.
    pub tolerance: f64,

    /// Tolerance for premium = tax + fee + net.
    pub component_tolerance: f64,

    /// Multi-contract discount rate.
    pub multi_contract_discount: f64,

    /// Reference date for receipt schedules. Pinning this makes a run
    /// reproducible regardless of when it executes.
    pub as_of: NaiveDate,
}

impl PipelineConfig {
    pub fn new(input_dir: PathBuf, output_dir: PathBuf, as_of: NaiveDate) -> Self {
        PipelineConfig {
            input_dir,
            output_dir,
            tolerance: DEFAULT_TOLERANCE,
            component_tolerance: DEFAULT_COMPONENT_TOLERANCE,
            multi_contract_discount: MULTI_CONTRACT_DISCOUNT,
            as_of,
        }
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::new(
            PathBuf::from("in"),
            PathBuf::from("out"),
            NaiveDate::from_ymd_opt(2022, 1, 31).unwrap(),
        );

        assert_eq!(config.tolerance, DEFAULT_TOLERANCE);
        assert_eq!(config.component_tolerance, 1.0);
        assert_eq!(config.multi_contract_discount, 0.15);
    }

    #[test]
    fn test_with_tolerance() {
        let config = PipelineConfig::new(
            PathBuf::from("in"),
            PathBuf::from("out"),
            NaiveDate::from_ymd_opt(2022, 1, 31).unwrap(),
        )
        .with_tolerance(0.5);

        assert_eq!(config.tolerance, 0.5);
    }
}
