// Entity models - the four broker tables
//
// Each table has two shapes:
// - Raw*: strings exactly as the feed delivered them, serde-bound to the
//   broker's camelCase headers
// - cleaned: typed values, Option for anything the feed left out or that
//   could not be coerced

pub mod claim;
pub mod contract;
pub mod receipt;
pub mod tariff;

pub use claim::{Claim, RawClaim};
pub use contract::{Contract, RawContract};
pub use receipt::{RawReceipt, Receipt};
pub use tariff::{RawTariff, Tariff};

use std::collections::HashMap;

/// Table names as they appear in logs, reports and violations.
pub const TABLE_CONTRACTS: &str = "contracts";
pub const TABLE_RECEIPTS: &str = "receipts";
pub const TABLE_CLAIMS: &str = "claims";
pub const TABLE_TARIFFS: &str = "tariffs";

/// One parsed CSV file, rows still verbatim.
#[derive(Debug, Clone)]
pub struct RawTable<T> {
    /// File the rows came from, relative to the input directory.
    pub source_file: String,
    pub rows: Vec<T>,
    /// Lines the loader had to repair before parsing.
    pub repaired_lines: usize,
}

/// Everything the loader found for one month.
#[derive(Debug, Clone)]
pub struct RawDataset {
    pub contracts: RawTable<RawContract>,
    pub receipts: RawTable<RawReceipt>,
    pub claims: RawTable<RawClaim>,
    pub tariffs: RawTable<RawTariff>,
}

/// The normalized month: what the checker audits and the exporter writes.
#[derive(Debug, Clone, PartialEq)]
pub struct CleanDataset {
    pub contracts: Vec<Contract>,
    pub receipts: Vec<Receipt>,
    pub claims: Vec<Claim>,
    pub tariffs: Vec<Tariff>,
}

impl CleanDataset {
    /// Contracts keyed by cover reference, for referential checks.
    pub fn contract_index(&self) -> HashMap<&str, &Contract> {
        self.contracts
            .iter()
            .map(|c| (c.cover_ref.as_str(), c))
            .collect()
    }

    /// Tariffs keyed by tariff reference.
    pub fn tariff_index(&self) -> HashMap<&str, &Tariff> {
        self.tariffs
            .iter()
            .map(|t| (t.tariff_ref.as_str(), t))
            .collect()
    }

    /// Receipts grouped by the contract they bill.
    pub fn receipts_by_contract(&self) -> HashMap<&str, Vec<&Receipt>> {
        let mut grouped: HashMap<&str, Vec<&Receipt>> = HashMap::new();
        for receipt in &self.receipts {
            grouped
                .entry(receipt.cover_ref.as_str())
                .or_default()
                .push(receipt);
        }
        grouped
    }

    pub fn total_rows(&self) -> usize {
        self.contracts.len() + self.receipts.len() + self.claims.len() + self.tariffs.len()
    }
}

// ============================================================================
// CANONICAL RENDERING
// ============================================================================
// Used by the entities' to_raw() methods. Cleaning the rendered strings again
// must give back the same typed values, so every renderer emits exactly what
// the cleaner's parsers accept.

pub(crate) fn render_date(d: Option<chrono::NaiveDate>) -> String {
    d.map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_default()
}

pub(crate) fn render_number(v: Option<f64>) -> String {
    v.map(|v| v.to_string()).unwrap_or_default()
}

pub(crate) fn render_bool(b: Option<bool>) -> String {
    b.map(|b| b.to_string()).unwrap_or_default()
}

pub(crate) fn render_text(t: &Option<String>) -> String {
    t.clone().unwrap_or_default()
}
