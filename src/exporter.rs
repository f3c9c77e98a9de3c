// 📦 Exporter - columnar artifacts, written atomically
//
// Every artifact is built fully in memory, written to a sibling .tmp file
// and renamed into place, so a crash mid-export never leaves a
// half-written file under a final name. manifest.json goes last and
// carries a sha256 per artifact; its presence marks the run as complete.

use std::fs;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::array::{Array, ArrayRef, BooleanArray, Date32Array, Float64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::checker::{RuleReport, Severity};
use crate::cleaner::CleanLog;
use crate::entities::{Claim, CleanDataset, Contract, Receipt, Tariff};
use crate::error::ExportError;
use crate::report::RunReport;

// ============================================================================
// ARTIFACT NAMES
// ============================================================================

pub const CONTRACTS_PARQUET: &str = "contracts.parquet";
pub const RECEIPTS_PARQUET: &str = "receipts.parquet";
pub const CLAIMS_PARQUET: &str = "claims.parquet";
pub const TARIFFS_PARQUET: &str = "tariffs.parquet";
pub const CLEANING_LOG_CSV: &str = "cleaning_log.csv";
pub const VIOLATIONS_CSV: &str = "violations.csv";
pub const REPORT_JSON: &str = "report.json";
pub const MANIFEST_JSON: &str = "manifest.json";

// Date32 stores days since 1970-01-01; chrono counts from 0001-01-01.
const UNIX_EPOCH_DAYS: i32 = 719_163;

// ============================================================================
// MANIFEST
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct ArtifactEntry {
    pub file: String,
    pub bytes: usize,
    pub sha256: String,
}

/// Written last. A directory containing manifest.json holds a complete,
/// checksummed export.
#[derive(Debug, Clone, Serialize)]
pub struct ExportManifest {
    pub run_id: String,
    pub generated_at: DateTime<Utc>,
    pub artifacts: Vec<ArtifactEntry>,
}

// ============================================================================
// EXPORTER
// ============================================================================

pub struct Exporter {
    output_dir: PathBuf,
}

impl Exporter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Exporter {
            output_dir: output_dir.into(),
        }
    }

    /// Write the four cleaned tables, the cleaning log, the violations
    /// table, the run report and finally the manifest.
    pub fn export(
        &self,
        data: &CleanDataset,
        log: &CleanLog,
        report: &RunReport,
    ) -> Result<ExportManifest, ExportError> {
        fs::create_dir_all(&self.output_dir).map_err(|source| ExportError::Write {
            path: self.output_dir.clone(),
            source,
        })?;

        let artifacts: Vec<(&str, Vec<u8>)> = vec![
            (CONTRACTS_PARQUET, parquet_bytes(&contracts_batch(&data.contracts)?)?),
            (RECEIPTS_PARQUET, parquet_bytes(&receipts_batch(&data.receipts)?)?),
            (CLAIMS_PARQUET, parquet_bytes(&claims_batch(&data.claims)?)?),
            (TARIFFS_PARQUET, parquet_bytes(&tariffs_batch(&data.tariffs)?)?),
            (CLEANING_LOG_CSV, cleaning_log_bytes(log)?),
            (VIOLATIONS_CSV, violations_bytes(&report.rules)?),
            (REPORT_JSON, serde_json::to_vec_pretty(report)?),
        ];

        let mut manifest = ExportManifest {
            run_id: report.run_id.clone(),
            generated_at: Utc::now(),
            artifacts: Vec::new(),
        };

        for (name, bytes) in &artifacts {
            self.write_atomic(name, bytes)?;
            debug!(file = name, bytes = bytes.len(), "artifact written");
            manifest.artifacts.push(ArtifactEntry {
                file: name.to_string(),
                bytes: bytes.len(),
                sha256: checksum(bytes),
            });
        }

        let manifest_bytes = serde_json::to_vec_pretty(&manifest)?;
        self.write_atomic(MANIFEST_JSON, &manifest_bytes)?;

        info!(
            dir = %self.output_dir.display(),
            artifacts = manifest.artifacts.len() + 1,
            "export complete"
        );
        Ok(manifest)
    }

    fn write_atomic(&self, name: &str, bytes: &[u8]) -> Result<(), ExportError> {
        let final_path = self.output_dir.join(name);
        let tmp_path = self.output_dir.join(format!("{name}.tmp"));

        fs::write(&tmp_path, bytes).map_err(|source| ExportError::Write {
            path: tmp_path.clone(),
            source,
        })?;
        fs::rename(&tmp_path, &final_path).map_err(|source| ExportError::Rename {
            path: final_path.clone(),
            source,
        })?;
        Ok(())
    }
}

fn checksum(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

// ============================================================================
// DATE32 CONVERSION
// ============================================================================

fn date_to_days(date: NaiveDate) -> i32 {
    date.num_days_from_ce() - UNIX_EPOCH_DAYS
}

fn days_to_date(days: i32) -> Option<NaiveDate> {
    NaiveDate::from_num_days_from_ce_opt(days + UNIX_EPOCH_DAYS)
}

// ============================================================================
// RECORD BATCHES
// ============================================================================

fn contracts_batch(contracts: &[Contract]) -> Result<RecordBatch, ExportError> {
    let schema = Arc::new(Schema::new(vec![
        Field::new("cover_ref", DataType::Utf8, false),
        Field::new("customer_id", DataType::Utf8, false),
        Field::new("pet_name", DataType::Utf8, true),
        Field::new("pet_species", DataType::Utf8, true),
        Field::new("pet_birthdate", DataType::Date32, true),
        Field::new("pet_uuid", DataType::Utf8, true),
        Field::new("pet_uuid_type", DataType::Utf8, true),
        Field::new("tariff_ref", DataType::Utf8, false),
        Field::new("start_date", DataType::Date32, true),
        Field::new("end_date", DataType::Date32, true),
        Field::new("cover_rate", DataType::Float64, true),
        Field::new("annual_premium", DataType::Float64, true),
        Field::new("tax", DataType::Float64, true),
        Field::new("broker_fee", DataType::Float64, true),
        Field::new("net_premium", DataType::Float64, true),
    ]));

    let columns: Vec<ArrayRef> = vec![
        Arc::new(StringArray::from(
            contracts.iter().map(|c| c.cover_ref.as_str()).collect::<Vec<_>>(),
        )),
        Arc::new(StringArray::from(
            contracts.iter().map(|c| c.customer_id.as_str()).collect::<Vec<_>>(),
        )),
        Arc::new(StringArray::from(
            contracts.iter().map(|c| c.pet_name.as_deref()).collect::<Vec<_>>(),
        )),
        Arc::new(StringArray::from(
            contracts.iter().map(|c| c.pet_species.as_deref()).collect::<Vec<_>>(),
        )),
        Arc::new(Date32Array::from(
            contracts.iter().map(|c| c.pet_birthdate.map(date_to_days)).collect::<Vec<_>>(),
        )),
        Arc::new(StringArray::from(
            contracts.iter().map(|c| c.pet_uuid.as_deref()).collect::<Vec<_>>(),
        )),
        Arc::new(StringArray::from(
            contracts.iter().map(|c| c.pet_uuid_type.as_deref()).collect::<Vec<_>>(),
        )),
        Arc::new(StringArray::from(
            contracts.iter().map(|c| c.tariff_ref.as_str()).collect::<Vec<_>>(),
        )),
        Arc::new(Date32Array::from(
            contracts.iter().map(|c| c.start_date.map(date_to_days)).collect::<Vec<_>>(),
        )),
        Arc::new(Date32Array::from(
            contracts.iter().map(|c| c.end_date.map(date_to_days)).collect::<Vec<_>>(),
        )),
        Arc::new(Float64Array::from(
            contracts.iter().map(|c| c.cover_rate).collect::<Vec<_>>(),
        )),
        Arc::new(Float64Array::from(
            contracts.iter().map(|c| c.annual_premium).collect::<Vec<_>>(),
        )),
        Arc::new(Float64Array::from(
            contracts.iter().map(|c| c.tax).collect::<Vec<_>>(),
        )),
        Arc::new(Float64Array::from(
            contracts.iter().map(|c| c.broker_fee).collect::<Vec<_>>(),
        )),
        Arc::new(Float64Array::from(
            contracts.iter().map(|c| c.net_premium).collect::<Vec<_>>(),
        )),
    ];

    Ok(RecordBatch::try_new(schema, columns)?)
}

fn receipts_batch(receipts: &[Receipt]) -> Result<RecordBatch, ExportError> {
    let schema = Arc::new(Schema::new(vec![
        Field::new("receipt_id", DataType::Utf8, false),
        Field::new("cover_ref", DataType::Utf8, false),
        Field::new("issue_date", DataType::Date32, true),
        Field::new("amount", DataType::Float64, true),
        Field::new("tax", DataType::Float64, true),
        Field::new("broker_fee", DataType::Float64, true),
        Field::new("net_amount", DataType::Float64, true),
        Field::new("paid", DataType::Boolean, true),
    ]));

    let columns: Vec<ArrayRef> = vec![
        Arc::new(StringArray::from(
            receipts.iter().map(|r| r.receipt_id.as_str()).collect::<Vec<_>>(),
        )),
        Arc::new(StringArray::from(
            receipts.iter().map(|r| r.cover_ref.as_str()).collect::<Vec<_>>(),
        )),
        Arc::new(Date32Array::from(
            receipts.iter().map(|r| r.issue_date.map(date_to_days)).collect::<Vec<_>>(),
        )),
        Arc::new(Float64Array::from(
            receipts.iter().map(|r| r.amount).collect::<Vec<_>>(),
        )),
        Arc::new(Float64Array::from(
            receipts.iter().map(|r| r.tax).collect::<Vec<_>>(),
        )),
        Arc::new(Float64Array::from(
            receipts.iter().map(|r| r.broker_fee).collect::<Vec<_>>(),
        )),
        Arc::new(Float64Array::from(
            receipts.iter().map(|r| r.net_amount).collect::<Vec<_>>(),
        )),
        Arc::new(BooleanArray::from(
            receipts.iter().map(|r| r.paid).collect::<Vec<_>>(),
        )),
    ];

    Ok(RecordBatch::try_new(schema, columns)?)
}

fn claims_batch(claims: &[Claim]) -> Result<RecordBatch, ExportError> {
    let schema = Arc::new(Schema::new(vec![
        Field::new("claim_id", DataType::Utf8, false),
        Field::new("cover_ref", DataType::Utf8, false),
        Field::new("incident_date", DataType::Date32, true),
        Field::new("act_category", DataType::Utf8, true),
        Field::new("act_type", DataType::Utf8, true),
        Field::new("act_value", DataType::Float64, true),
        Field::new("paid_amount", DataType::Float64, true),
    ]));

    let columns: Vec<ArrayRef> = vec![
        Arc::new(StringArray::from(
            claims.iter().map(|c| c.claim_id.as_str()).collect::<Vec<_>>(),
        )),
        Arc::new(StringArray::from(
            claims.iter().map(|c| c.cover_ref.as_str()).collect::<Vec<_>>(),
        )),
        Arc::new(Date32Array::from(
            claims.iter().map(|c| c.incident_date.map(date_to_days)).collect::<Vec<_>>(),
        )),
        Arc::new(StringArray::from(
            claims.iter().map(|c| c.act_category.as_deref()).collect::<Vec<_>>(),
        )),
        Arc::new(StringArray::from(
            claims.iter().map(|c| c.act_type.as_deref()).collect::<Vec<_>>(),
        )),
        Arc::new(Float64Array::from(
            claims.iter().map(|c| c.act_value).collect::<Vec<_>>(),
        )),
        Arc::new(Float64Array::from(
            claims.iter().map(|c| c.paid_amount).collect::<Vec<_>>(),
        )),
    ];

    Ok(RecordBatch::try_new(schema, columns)?)
}

fn tariffs_batch(tariffs: &[Tariff]) -> Result<RecordBatch, ExportError> {
    let schema = Arc::new(Schema::new(vec![
        Field::new("tariff_ref", DataType::Utf8, false),
        Field::new("species", DataType::Utf8, true),
        Field::new("cover_rate", DataType::Float64, true),
        Field::new("monthly_net", DataType::Float64, true),
        Field::new("global_rate", DataType::Boolean, true),
    ]));

    let columns: Vec<ArrayRef> = vec![
        Arc::new(StringArray::from(
            tariffs.iter().map(|t| t.tariff_ref.as_str()).collect::<Vec<_>>(),
        )),
        Arc::new(StringArray::from(
            tariffs.iter().map(|t| t.species.as_deref()).collect::<Vec<_>>(),
        )),
        Arc::new(Float64Array::from(
            tariffs.iter().map(|t| t.cover_rate).collect::<Vec<_>>(),
        )),
        Arc::new(Float64Array::from(
            tariffs.iter().map(|t| t.monthly_net).collect::<Vec<_>>(),
        )),
        Arc::new(BooleanArray::from(
            tariffs.iter().map(|t| t.global_rate).collect::<Vec<_>>(),
        )),
    ];

    Ok(RecordBatch::try_new(schema, columns)?)
}

fn parquet_bytes(batch: &RecordBatch) -> Result<Vec<u8>, ExportError> {
    let mut buffer = Vec::new();
    let mut writer = ArrowWriter::try_new(&mut buffer, batch.schema(), None)?;
    writer.write(batch)?;
    writer.close()?;
    Ok(buffer)
}

// ============================================================================
// CSV ARTIFACTS
// ============================================================================

fn cleaning_log_bytes(log: &CleanLog) -> Result<Vec<u8>, ExportError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    // explicit header so a clean month still exports a well-formed file
    writer.write_record(["table", "column", "row", "entity_id", "original", "kind"])?;
    for entry in &log.entries {
        writer.serialize(entry)?;
    }
    writer
        .into_inner()
        .map_err(|e| ExportError::Csv(csv::Error::from(e.into_error())))
}

/// One flat row per violation, joined with its rule and severity.
#[derive(Serialize)]
struct ViolationRow<'a> {
    rule: &'a str,
    severity: &'a Severity,
    table: &'a str,
    entity_id: &'a str,
    detail: &'a str,
    amount: Option<f64>,
}

fn violations_bytes(rules: &[RuleReport]) -> Result<Vec<u8>, ExportError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(["rule", "severity", "table", "entity_id", "detail", "amount"])?;
    for rule in rules {
        for violation in &rule.violations {
            writer.serialize(ViolationRow {
                rule: &rule.rule,
                severity: &rule.severity,
                table: &violation.table,
                entity_id: &violation.entity_id,
                detail: &violation.detail,
                amount: violation.amount,
            })?;
        }
    }
    writer
        .into_inner()
        .map_err(|e| ExportError::Csv(csv::Error::from(e.into_error())))
}

// ============================================================================
// PARQUET READ-BACK
// ============================================================================

fn read_batches(path: &Path) -> Result<Vec<RecordBatch>, ExportError> {
    let file = File::open(path).map_err(|source| ExportError::ReadBack {
        path: path.to_path_buf(),
        source,
    })?;
    let reader = ParquetRecordBatchReaderBuilder::try_new(file)?.build()?;
    let mut batches = Vec::new();
    for batch in reader {
        batches.push(batch?);
    }
    Ok(batches)
}

fn string_col<'a>(
    batch: &'a RecordBatch,
    name: &str,
    path: &Path,
) -> Result<&'a StringArray, ExportError> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| ExportError::Schema {
            path: path.to_path_buf(),
            detail: format!("missing or mistyped string column '{name}'"),
        })
}

fn date_col<'a>(
    batch: &'a RecordBatch,
    name: &str,
    path: &Path,
) -> Result<&'a Date32Array, ExportError> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<Date32Array>())
        .ok_or_else(|| ExportError::Schema {
            path: path.to_path_buf(),
            detail: format!("missing or mistyped date column '{name}'"),
        })
}

fn float_col<'a>(
    batch: &'a RecordBatch,
    name: &str,
    path: &Path,
) -> Result<&'a Float64Array, ExportError> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<Float64Array>())
        .ok_or_else(|| ExportError::Schema {
            path: path.to_path_buf(),
            detail: format!("missing or mistyped float column '{name}'"),
        })
}

fn bool_col<'a>(
    batch: &'a RecordBatch,
    name: &str,
    path: &Path,
) -> Result<&'a BooleanArray, ExportError> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<BooleanArray>())
        .ok_or_else(|| ExportError::Schema {
            path: path.to_path_buf(),
            detail: format!("missing or mistyped boolean column '{name}'"),
        })
}

fn opt_string(array: &StringArray, i: usize) -> Option<String> {
    if array.is_null(i) {
        None
    } else {
        Some(array.value(i).to_string())
    }
}

fn opt_date(array: &Date32Array, i: usize) -> Option<NaiveDate> {
    if array.is_null(i) {
        None
    } else {
        days_to_date(array.value(i))
    }
}

fn opt_float(array: &Float64Array, i: usize) -> Option<f64> {
    if array.is_null(i) {
        None
    } else {
        Some(array.value(i))
    }
}

fn opt_bool(array: &BooleanArray, i: usize) -> Option<bool> {
    if array.is_null(i) {
        None
    } else {
        Some(array.value(i))
    }
}

pub fn read_contracts_parquet(path: &Path) -> Result<Vec<Contract>, ExportError> {
    let mut out = Vec::new();
    for batch in read_batches(path)? {
        let cover_ref = string_col(&batch, "cover_ref", path)?;
        let customer_id = string_col(&batch, "customer_id", path)?;
        let pet_name = string_col(&batch, "pet_name", path)?;
        let pet_species = string_col(&batch, "pet_species", path)?;
        let pet_birthdate = date_col(&batch, "pet_birthdate", path)?;
        let pet_uuid = string_col(&batch, "pet_uuid", path)?;
        let pet_uuid_type = string_col(&batch, "pet_uuid_type", path)?;
        let tariff_ref = string_col(&batch, "tariff_ref", path)?;
        let start_date = date_col(&batch, "start_date", path)?;
        let end_date = date_col(&batch, "end_date", path)?;
        let cover_rate = float_col(&batch, "cover_rate", path)?;
        let annual_premium = float_col(&batch, "annual_premium", path)?;
        let tax = float_col(&batch, "tax", path)?;
        let broker_fee = float_col(&batch, "broker_fee", path)?;
        let net_premium = float_col(&batch, "net_premium", path)?;

        for i in 0..batch.num_rows() {
            out.push(Contract {
                cover_ref: cover_ref.value(i).to_string(),
                customer_id: customer_id.value(i).to_string(),
                pet_name: opt_string(pet_name, i),
                pet_species: opt_string(pet_species, i),
                pet_birthdate: opt_date(pet_birthdate, i),
                pet_uuid: opt_string(pet_uuid, i),
                pet_uuid_type: opt_string(pet_uuid_type, i),
                tariff_ref: tariff_ref.value(i).to_string(),
                start_date: opt_date(start_date, i),
                end_date: opt_date(end_date, i),
                cover_rate: opt_float(cover_rate, i),
                annual_premium: opt_float(annual_premium, i),
                tax: opt_float(tax, i),
                broker_fee: opt_float(broker_fee, i),
                net_premium: opt_float(net_premium, i),
            });
        }
    }
    Ok(out)
}

pub fn read_receipts_parquet(path: &Path) -> Result<Vec<Receipt>, ExportError> {
    let mut out = Vec::new();
    for batch in read_batches(path)? {
        let receipt_id = string_col(&batch, "receipt_id", path)?;
        let cover_ref = string_col(&batch, "cover_ref", path)?;
        let issue_date = date_col(&batch, "issue_date", path)?;
        let amount = float_col(&batch, "amount", path)?;
        let tax = float_col(&batch, "tax", path)?;
        let broker_fee = float_col(&batch, "broker_fee", path)?;
        let net_amount = float_col(&batch, "net_amount", path)?;
        let paid = bool_col(&batch, "paid", path)?;

        for i in 0..batch.num_rows() {
            out.push(Receipt {
                receipt_id: receipt_id.value(i).to_string(),
                cover_ref: cover_ref.value(i).to_string(),
                issue_date: opt_date(issue_date, i),
                amount: opt_float(amount, i),
                tax: opt_float(tax, i),
                broker_fee: opt_float(broker_fee, i),
                net_amount: opt_float(net_amount, i),
                paid: opt_bool(paid, i),
            });
        }
    }
    Ok(out)
}

pub fn read_claims_parquet(path: &Path) -> Result<Vec<Claim>, ExportError> {
    let mut out = Vec::new();
    for batch in read_batches(path)? {
        let claim_id = string_col(&batch, "claim_id", path)?;
        let cover_ref = string_col(&batch, "cover_ref", path)?;
        let incident_date = date_col(&batch, "incident_date", path)?;
        let act_category = string_col(&batch, "act_category", path)?;
        let act_type = string_col(&batch, "act_type", path)?;
        let act_value = float_col(&batch, "act_value", path)?;
        let paid_amount = float_col(&batch, "paid_amount", path)?;

        for i in 0..batch.num_rows() {
            out.push(Claim {
                claim_id: claim_id.value(i).to_string(),
                cover_ref: cover_ref.value(i).to_string(),
                incident_date: opt_date(incident_date, i),
                act_category: opt_string(act_category, i),
                act_type: opt_string(act_type, i),
                act_value: opt_float(act_value, i),
                paid_amount: opt_float(paid_amount, i),
            });
        }
    }
    Ok(out)
}

pub fn read_tariffs_parquet(path: &Path) -> Result<Vec<Tariff>, ExportError> {
    let mut out = Vec::new();
    for batch in read_batches(path)? {
        let tariff_ref = string_col(&batch, "tariff_ref", path)?;
        let species = string_col(&batch, "species", path)?;
        let cover_rate = float_col(&batch, "cover_rate", path)?;
        let monthly_net = float_col(&batch, "monthly_net", path)?;
        let global_rate = bool_col(&batch, "global_rate", path)?;

        for i in 0..batch.num_rows() {
            out.push(Tariff {
                tariff_ref: tariff_ref.value(i).to_string(),
                species: opt_string(species, i),
                cover_rate: opt_float(cover_rate, i),
                monthly_net: opt_float(monthly_net, i),
                global_rate: opt_bool(global_rate, i),
            });
        }
    }
    Ok(out)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checker::Violation;
    use crate::cleaner::{CleanEntry, CoercionKind};
    use crate::config::PipelineConfig;
    use crate::entities::{RawClaim, RawContract, RawDataset, RawReceipt, RawTable, RawTariff};
    use tempfile::TempDir;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn create_test_dataset() -> CleanDataset {
        CleanDataset {
            contracts: vec![
                Contract {
                    cover_ref: "C1".to_string(),
                    customer_id: "CU1".to_string(),
                    pet_name: Some("Milo".to_string()),
                    pet_species: Some("cat".to_string()),
                    pet_birthdate: Some(date(2019, 6, 1)),
                    pet_uuid: Some("250269604123456".to_string()),
                    pet_uuid_type: Some("chip".to_string()),
                    tariff_ref: "T3".to_string(),
                    start_date: Some(date(2021, 1, 15)),
                    end_date: Some(date(2022, 1, 15)),
                    cover_rate: Some(0.8),
                    annual_premium: Some(360.0),
                    tax: Some(30.0),
                    broker_fee: Some(42.0),
                    net_premium: Some(288.0),
                },
                // a sparse row: every optional column null
                Contract {
                    cover_ref: "C2".to_string(),
                    customer_id: "CU2".to_string(),
                    pet_name: None,
                    pet_species: None,
                    pet_birthdate: None,
                    pet_uuid: None,
                    pet_uuid_type: None,
                    tariff_ref: "T4".to_string(),
                    start_date: None,
                    end_date: None,
                    cover_rate: None,
                    annual_premium: None,
                    tax: None,
                    broker_fee: None,
                    net_premium: None,
                },
            ],
            receipts: vec![Receipt {
                receipt_id: "R1".to_string(),
                cover_ref: "C1".to_string(),
                issue_date: Some(date(2021, 2, 15)),
                amount: Some(30.0),
                tax: Some(2.5),
                broker_fee: Some(3.5),
                net_amount: Some(24.0),
                paid: Some(true),
            }],
            claims: vec![Claim {
                claim_id: "S1".to_string(),
                cover_ref: "C1".to_string(),
                incident_date: Some(date(2021, 6, 20)),
                act_category: Some("MALADIE".to_string()),
                act_type: None,
                act_value: Some(200.0),
                paid_amount: Some(160.0),
            }],
            tariffs: vec![Tariff {
                tariff_ref: "T3".to_string(),
                species: Some("cat".to_string()),
                cover_rate: Some(0.8),
                monthly_net: Some(24.0),
                global_rate: None,
            }],
        }
    }

    fn create_test_log() -> CleanLog {
        let mut log = CleanLog::default();
        log.entries.push(CleanEntry {
            table: "contracts".to_string(),
            column: "coverStartDate".to_string(),
            row: 1,
            entity_id: "C2".to_string(),
            original: "not a date".to_string(),
            kind: CoercionKind::InvalidDate,
        });
        log
    }

    fn create_test_report(rules: Vec<RuleReport>) -> RunReport {
        let raw = RawDataset {
            contracts: RawTable {
                source_file: "contracts.csv".to_string(),
                rows: vec![RawContract::default(), RawContract::default()],
                repaired_lines: 0,
            },
            receipts: RawTable {
                source_file: "quittances.csv".to_string(),
                rows: vec![RawReceipt::default()],
                repaired_lines: 0,
            },
            claims: RawTable {
                source_file: "sinistres.csv".to_string(),
                rows: vec![RawClaim::default()],
                repaired_lines: 0,
            },
            tariffs: RawTable {
                source_file: "tarifs.csv".to_string(),
                rows: vec![RawTariff::default()],
                repaired_lines: 0,
            },
        };
        let config = PipelineConfig::new("in".into(), "out".into(), date(2021, 12, 31));
        RunReport::build(&config, &raw, &create_test_log(), rules)
    }

    #[test]
    fn test_export_then_read_back_is_identical() {
        let dir = TempDir::new().unwrap();
        let data = create_test_dataset();
        let report = create_test_report(Vec::new());

        Exporter::new(dir.path())
            .export(&data, &create_test_log(), &report)
            .unwrap();

        let read_back = CleanDataset {
            contracts: read_contracts_parquet(&dir.path().join(CONTRACTS_PARQUET)).unwrap(),
            receipts: read_receipts_parquet(&dir.path().join(RECEIPTS_PARQUET)).unwrap(),
            claims: read_claims_parquet(&dir.path().join(CLAIMS_PARQUET)).unwrap(),
            tariffs: read_tariffs_parquet(&dir.path().join(TARIFFS_PARQUET)).unwrap(),
        };

        assert_eq!(read_back, data);
    }

    #[test]
    fn test_export_writes_every_artifact_and_no_temp_files() {
        let dir = TempDir::new().unwrap();
        let data = create_test_dataset();
        let report = create_test_report(Vec::new());

        let manifest = Exporter::new(dir.path())
            .export(&data, &create_test_log(), &report)
            .unwrap();

        for name in [
            CONTRACTS_PARQUET,
            RECEIPTS_PARQUET,
            CLAIMS_PARQUET,
            TARIFFS_PARQUET,
            CLEANING_LOG_CSV,
            VIOLATIONS_CSV,
            REPORT_JSON,
            MANIFEST_JSON,
        ] {
            assert!(dir.path().join(name).exists(), "{name} missing");
        }

        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().map(|x| x == "tmp").unwrap_or(false))
            .collect();
        assert!(leftovers.is_empty(), "temp files left behind: {leftovers:?}");

        assert_eq!(manifest.artifacts.len(), 7);
        for artifact in &manifest.artifacts {
            assert_eq!(artifact.sha256.len(), 64);
            assert!(artifact.bytes > 0);
        }
    }

    #[test]
    fn test_manifest_checksums_match_files() {
        let dir = TempDir::new().unwrap();
        let data = create_test_dataset();
        let report = create_test_report(Vec::new());

        let manifest = Exporter::new(dir.path())
            .export(&data, &create_test_log(), &report)
            .unwrap();

        for artifact in &manifest.artifacts {
            let bytes = std::fs::read(dir.path().join(&artifact.file)).unwrap();
            assert_eq!(checksum(&bytes), artifact.sha256, "{} mismatch", artifact.file);
        }
    }

    #[test]
    fn test_cleaning_log_csv_layout() {
        let dir = TempDir::new().unwrap();
        let data = create_test_dataset();
        let report = create_test_report(Vec::new());

        Exporter::new(dir.path())
            .export(&data, &create_test_log(), &report)
            .unwrap();

        let text = std::fs::read_to_string(dir.path().join(CLEANING_LOG_CSV)).unwrap();
        assert!(text.starts_with("table,column,row,entity_id,original,kind"));
        assert!(text.contains("invalid_date"));
        assert!(text.contains("C2"));
    }

    #[test]
    fn test_violations_csv_joins_rule_and_severity() {
        let dir = TempDir::new().unwrap();
        let data = create_test_dataset();

        let mut rule = RuleReport::new(
            "receipt_without_contract",
            "Every receipt references a loaded contract",
            Severity::Critical,
        );
        rule.violations.push(Violation::with_amount(
            "receipts",
            "R99",
            "references missing contract C404",
            -12.5,
        ));
        let report = create_test_report(vec![rule]);

        Exporter::new(dir.path())
            .export(&data, &create_test_log(), &report)
            .unwrap();

        let text = std::fs::read_to_string(dir.path().join(VIOLATIONS_CSV)).unwrap();
        assert!(text.starts_with("rule,severity,table,entity_id,detail,amount"));
        assert!(text.contains("receipt_without_contract,Critical,receipts,R99"));
        assert!(text.contains("-12.5"));
    }

    #[test]
    fn test_unwritable_output_dir_is_an_export_error() {
        let dir = TempDir::new().unwrap();
        let blocking_file = dir.path().join("occupied");
        std::fs::write(&blocking_file, b"not a directory").unwrap();

        let data = create_test_dataset();
        let report = create_test_report(Vec::new());
        let result = Exporter::new(blocking_file.join("out")).export(
            &data,
            &create_test_log(),
            &report,
        );

        assert!(matches!(result, Err(ExportError::Write { .. })));
    }

    #[test]
    fn test_date32_round_trip() {
        let d = date(2021, 1, 15);
        assert_eq!(days_to_date(date_to_days(d)), Some(d));
        assert_eq!(date_to_days(date(1970, 1, 1)), 0);
    }

    #[test]
    fn test_empty_tables_export_cleanly() {
        let dir = TempDir::new().unwrap();
        let data = CleanDataset {
            contracts: Vec::new(),
            receipts: Vec::new(),
            claims: Vec::new(),
            tariffs: Vec::new(),
        };
        let report = create_test_report(Vec::new());

        Exporter::new(dir.path())
            .export(&data, &CleanLog::default(), &report)
            .unwrap();

        let contracts = read_contracts_parquet(&dir.path().join(CONTRACTS_PARQUET)).unwrap();
        assert!(contracts.is_empty());
    }
}
