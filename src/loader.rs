// 📥 Loader - locate and parse the month's broker extracts
//
// The input directory holds one CSV per table, named loosely ("Contrats
// 2021-12.csv", "receipts.csv", ...). Files are matched by substring, with
// both French and English names in circulation. All four tables must be
// present or the run aborts; extra CSVs are ignored with a warning.
//
// The feed occasionally arrives quote-mangled: whole lines wrapped in one
// pair of quotes, and decimal-comma cells double-quoted ("\"\"0,6\"\"").
// Those lines are repaired before the CSV reader sees them.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::de::DeserializeOwned;
use tracing::{info, warn};

use crate::entities::{
    RawClaim, RawContract, RawDataset, RawReceipt, RawTable, RawTariff, TABLE_CLAIMS,
    TABLE_CONTRACTS, TABLE_RECEIPTS, TABLE_TARIFFS,
};
use crate::error::{LoadError, Result};

// ============================================================================
// TABLE SPECS
// ============================================================================

struct TableSpec {
    table: &'static str,
    /// Filename substrings that identify the table, lowercased.
    hints: &'static [&'static str],
    /// Columns the file must expose to be usable at all.
    required_columns: &'static [&'static str],
}

const CONTRACTS: TableSpec = TableSpec {
    table: TABLE_CONTRACTS,
    hints: &["contract", "contrat"],
    required_columns: &["coverRef"],
};

const RECEIPTS: TableSpec = TableSpec {
    table: TABLE_RECEIPTS,
    hints: &["receipt", "quittance"],
    required_columns: &["receiptId", "coverRef"],
};

const CLAIMS: TableSpec = TableSpec {
    table: TABLE_CLAIMS,
    hints: &["claim", "sinistre"],
    required_columns: &["claimId", "coverRef"],
};

const TARIFFS: TableSpec = TableSpec {
    table: TABLE_TARIFFS,
    hints: &["tarif"],
    required_columns: &["tariffRef"],
};

const ALL_SPECS: [&TableSpec; 4] = [&CONTRACTS, &RECEIPTS, &CLAIMS, &TARIFFS];

// ============================================================================
// LOADING
// ============================================================================

/// Load all four tables for one month. Fails if a table is missing, a file
/// cannot be read, or a record cannot be parsed even after repair.
pub fn load_dataset(input_dir: &Path) -> Result<RawDataset> {
    info!("scanning {} for broker extracts", input_dir.display());
    let assigned = discover(input_dir)?;

    let contracts = load_table::<RawContract>(require(&assigned, &CONTRACTS, input_dir)?, &CONTRACTS)?;
    let receipts = load_table::<RawReceipt>(require(&assigned, &RECEIPTS, input_dir)?, &RECEIPTS)?;
    let claims = load_table::<RawClaim>(require(&assigned, &CLAIMS, input_dir)?, &CLAIMS)?;
    let tariffs = load_table::<RawTariff>(require(&assigned, &TARIFFS, input_dir)?, &TARIFFS)?;

    info!(
        "loaded {} contracts, {} receipts, {} claims, {} tariffs",
        contracts.rows.len(),
        receipts.rows.len(),
        claims.rows.len(),
        tariffs.rows.len()
    );

    Ok(RawDataset {
        contracts,
        receipts,
        claims,
        tariffs,
    })
}

/// Map each CSV in the directory to a table. First match per table wins
/// (deterministic: candidates are sorted by name).
fn discover(input_dir: &Path) -> Result<HashMap<&'static str, PathBuf>> {
    let entries = fs::read_dir(input_dir).map_err(|e| LoadError::Scan {
        dir: input_dir.to_path_buf(),
        source: e,
    })?;

    let mut candidates: Vec<PathBuf> = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| LoadError::Scan {
            dir: input_dir.to_path_buf(),
            source: e,
        })?;
        let path = entry.path();
        let is_csv = path
            .extension()
            .map(|ext| ext.to_string_lossy().eq_ignore_ascii_case("csv"))
            .unwrap_or(false);
        if path.is_file() && is_csv {
            candidates.push(path);
        }
    }
    candidates.sort();

    let mut assigned: HashMap<&'static str, PathBuf> = HashMap::new();
    for path in candidates {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        match classify(&name) {
            Some(spec) => {
                if assigned.contains_key(spec.table) {
                    warn!("ignoring duplicate {} file: {}", spec.table, path.display());
                } else {
                    assigned.insert(spec.table, path);
                }
            }
            None => warn!("ignoring unrecognized csv: {}", path.display()),
        }
    }
    Ok(assigned)
}

fn classify(lower_name: &str) -> Option<&'static TableSpec> {
    ALL_SPECS
        .into_iter()
        .find(|spec| spec.hints.iter().any(|hint| lower_name.contains(hint)))
}

fn require<'a>(
    assigned: &'a HashMap<&'static str, PathBuf>,
    spec: &TableSpec,
    input_dir: &Path,
) -> Result<&'a Path> {
    assigned
        .get(spec.table)
        .map(PathBuf::as_path)
        .ok_or_else(|| {
            LoadError::MissingTable {
                table: spec.table,
                dir: input_dir.to_path_buf(),
                hints: spec.hints.join(", "),
            }
            .into()
        })
}

fn load_table<T: DeserializeOwned>(path: &Path, spec: &TableSpec) -> Result<RawTable<T>> {
    let file = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());

    let bytes = fs::read(path).map_err(|e| LoadError::Read {
        path: path.to_path_buf(),
        source: e,
    })?;
    let text = String::from_utf8_lossy(&bytes);
    let (repaired_text, repaired_lines) = repair_lines(&text);
    if repaired_lines > 0 {
        warn!("{}: repaired {} mangled line(s)", file, repaired_lines);
    }

    let mut rdr = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(repaired_text.as_bytes());

    let headers = rdr
        .headers()
        .map_err(|e| LoadError::MalformedRecord {
            file: file.clone(),
            record: 1,
            source: e,
        })?
        .clone();
    let missing: Vec<&str> = spec
        .required_columns
        .iter()
        .filter(|col| !headers.iter().any(|h| h == **col))
        .copied()
        .collect();
    if !missing.is_empty() {
        return Err(LoadError::MissingColumns {
            file,
            columns: missing.join(", "),
        }
        .into());
    }

    let mut rows = Vec::new();
    for (i, result) in rdr.deserialize().enumerate() {
        let row: T = result.map_err(|e| LoadError::MalformedRecord {
            file: file.clone(),
            // 1-based, counting the header line
            record: i + 2,
            source: e,
        })?;
        rows.push(row);
    }

    info!("{}: {} {} row(s)", file, rows.len(), spec.table);

    Ok(RawTable {
        source_file: file,
        rows,
        repaired_lines,
    })
}

// ============================================================================
// LINE REPAIR
// ============================================================================

static QUOTED_DECIMAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""{2}(\d+),(\d+)"{2}"#).expect("valid pattern"));

/// Undo the feed's quote mangling, line by line. Lines containing brackets
/// come from an upstream JSON spill and are passed through untouched.
fn repair_lines(text: &str) -> (String, usize) {
    let mut repaired = 0usize;
    let mut out = String::with_capacity(text.len());

    for line in text.lines() {
        if line.contains('[') || line.contains(']') {
            out.push_str(line);
            out.push('\n');
            continue;
        }

        let trimmed = line.trim_end_matches('\r');
        let mut fixed = trimmed.to_string();
        if trimmed.len() >= 2 && trimmed.starts_with('"') && trimmed.ends_with('"') {
            let inner = &trimmed[1..trimmed.len() - 1];
            // only unwrap when the inner quotes are all doubled, so a
            // properly quoted csv line is left alone
            if quotes_all_doubled(inner) {
                fixed = inner.to_string();
            }
        }
        let after = QUOTED_DECIMAL.replace_all(&fixed, "${1}.${2}");

        if after != trimmed {
            repaired += 1;
        }
        out.push_str(&after);
        out.push('\n');
    }

    (out, repaired)
}

fn quotes_all_doubled(s: &str) -> bool {
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '"' {
            if chars.peek() == Some(&'"') {
                chars.next();
            } else {
                return false;
            }
        }
    }
    true
}

// ============================================================================
// TESTS
// ============================================================================
