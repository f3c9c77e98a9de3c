// 📋 Run Report - one document describing the whole audit
//
// The report is the artifact a human reads first: per-table intake
// numbers, what the cleaner coerced, and every rule outcome. It is built
// once, after all engines have run, and serialized as-is to report.json.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::checker::{RuleReport, Severity};
use crate::cleaner::CleanLog;
use crate::config::PipelineConfig;
use crate::entities::{
    RawDataset, TABLE_CLAIMS, TABLE_CONTRACTS, TABLE_RECEIPTS, TABLE_TARIFFS,
};

// ============================================================================
// TABLE SUMMARY
// ============================================================================

/// Intake numbers for one source table.
#[derive(Debug, Clone, Serialize)]
pub struct TableSummary {
    pub table: String,
    pub source_file: String,
    pub rows: usize,
    /// Lines the loader repaired before parsing.
    pub repaired_lines: usize,
    /// Cells the cleaner coerced or found empty.
    pub coercions: usize,
}

// ============================================================================
// RUN REPORT
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// Random id naming this run in logs and filenames.
    pub run_id: String,
    pub generated_at: DateTime<Utc>,
    pub config: PipelineConfig,
    pub tables: Vec<TableSummary>,
    pub coercions_by_kind: BTreeMap<String, usize>,
    pub rules: Vec<RuleReport>,
    pub total_violations: usize,
}

impl RunReport {
    pub fn build(
        config: &PipelineConfig,
        raw: &RawDataset,
        log: &CleanLog,
        rules: Vec<RuleReport>,
    ) -> Self {
        let tables = vec![
            TableSummary {
                table: TABLE_CONTRACTS.to_string(),
                source_file: raw.contracts.source_file.clone(),
                rows: raw.contracts.rows.len(),
                repaired_lines: raw.contracts.repaired_lines,
                coercions: log.count_for_table(TABLE_CONTRACTS),
            },
            TableSummary {
                table: TABLE_RECEIPTS.to_string(),
                source_file: raw.receipts.source_file.clone(),
                rows: raw.receipts.rows.len(),
                repaired_lines: raw.receipts.repaired_lines,
                coercions: log.count_for_table(TABLE_RECEIPTS),
            },
            TableSummary {
                table: TABLE_CLAIMS.to_string(),
                source_file: raw.claims.source_file.clone(),
                rows: raw.claims.rows.len(),
                repaired_lines: raw.claims.repaired_lines,
                coercions: log.count_for_table(TABLE_CLAIMS),
            },
            TableSummary {
                table: TABLE_TARIFFS.to_string(),
                source_file: raw.tariffs.source_file.clone(),
                rows: raw.tariffs.rows.len(),
                repaired_lines: raw.tariffs.repaired_lines,
                coercions: log.count_for_table(TABLE_TARIFFS),
            },
        ];

        let coercions_by_kind = log
            .counts_by_kind()
            .into_iter()
            .map(|(kind, count)| (kind.to_string(), count))
            .collect();

        let total_violations = rules.iter().map(|r| r.violations.len()).sum();

        RunReport {
            run_id: Uuid::new_v4().to_string(),
            generated_at: Utc::now(),
            config: config.clone(),
            tables,
            coercions_by_kind,
            rules,
            total_violations,
        }
    }

    pub fn total_rows(&self) -> usize {
        self.tables.iter().map(|t| t.rows).sum()
    }

    pub fn total_coercions(&self) -> usize {
        self.tables.iter().map(|t| t.coercions).sum()
    }

    pub fn critical_violations(&self) -> usize {
        self.rules
            .iter()
            .filter(|r| r.severity == Severity::Critical)
            .map(|r| r.violations.len())
            .sum()
    }

    pub fn passed(&self) -> bool {
        self.total_violations == 0
    }

    pub fn summary(&self) -> String {
        format!(
            "{} rows audited, {} cells coerced, {} rules run, {} violation(s) ({} critical)",
            self.total_rows(),
            self.total_coercions(),
            self.rules.len(),
            self.total_violations,
            self.critical_violations()
        )
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checker::Violation;
    use crate::cleaner::{CleanEntry, CoercionKind};
    use crate::entities::{RawClaim, RawContract, RawReceipt, RawTariff, RawTable};
    use chrono::NaiveDate;

    fn create_test_raw() -> RawDataset {
        RawDataset {
            contracts: RawTable {
                source_file: "contracts.csv".to_string(),
                rows: vec![RawContract::default(), RawContract::default()],
                repaired_lines: 1,
            },
            receipts: RawTable {
                source_file: "quittances.csv".to_string(),
                rows: vec![RawReceipt::default()],
                repaired_lines: 0,
            },
            claims: RawTable {
                source_file: "claims.csv".to_string(),
                rows: vec![RawClaim::default()],
                repaired_lines: 0,
            },
            tariffs: RawTable {
                source_file: "tarifs.csv".to_string(),
                rows: vec![RawTariff::default()],
                repaired_lines: 0,
            },
        }
    }

    fn create_test_config() -> PipelineConfig {
        PipelineConfig::new(
            "in".into(),
            "out".into(),
            NaiveDate::from_ymd_opt(2021, 12, 31).unwrap(),
        )
    }

    #[test]
    fn test_report_aggregates_tables_and_rules() {
        let mut log = CleanLog::default();
        log.entries.push(CleanEntry {
            table: "contracts".to_string(),
            column: "coverStartDate".to_string(),
            row: 0,
            entity_id: "C1".to_string(),
            original: "not a date".to_string(),
            kind: CoercionKind::InvalidDate,
        });

        let mut failing = RuleReport::new("receipt_without_contract", "desc", Severity::Critical);
        failing.checked = 1;
        failing
            .violations
            .push(Violation::new("receipts", "R99", "references missing contract C404"));
        let passing = RuleReport::new("id_format", "desc", Severity::Warning);

        let report = RunReport::build(&create_test_config(), &create_test_raw(), &log, vec![failing, passing]);

        assert_eq!(report.tables.len(), 4);
        assert_eq!(report.total_rows(), 5);
        assert_eq!(report.tables[0].coercions, 1);
        assert_eq!(report.tables[0].repaired_lines, 1);
        assert_eq!(report.coercions_by_kind.get("invalid_date"), Some(&1));
        assert_eq!(report.total_violations, 1);
        assert_eq!(report.critical_violations(), 1);
        assert!(!report.passed());
    }

    #[test]
    fn test_clean_run_passes() {
        let report = RunReport::build(
            &create_test_config(),
            &create_test_raw(),
            &CleanLog::default(),
            vec![RuleReport::new("id_format", "desc", Severity::Warning)],
        );

        assert!(report.passed());
        assert_eq!(report.total_coercions(), 0);
    }

    #[test]
    fn test_summary_reads_like_a_sentence() {
        let report = RunReport::build(
            &create_test_config(),
            &create_test_raw(),
            &CleanLog::default(),
            Vec::new(),
        );

        let summary = report.summary();
        assert!(summary.contains("5 rows audited"));
        assert!(summary.contains("0 violation(s)"));
    }

    #[test]
    fn test_report_serializes_to_json() {
        let report = RunReport::build(
            &create_test_config(),
            &create_test_raw(),
            &CleanLog::default(),
            Vec::new(),
        );

        let json = serde_json::to_string_pretty(&report).unwrap();
        assert!(json.contains("\"run_id\""));
        assert!(json.contains("\"tables\""));
        assert!(json.contains("quittances.csv"));
    }
}
