// 🧹 Cleaner - normalize raw broker extracts into typed tables
//
// The feed mixes French and ISO dates, decimal commas, percent signs,
// inconsistent identifier casing and the occasional double-encoded name.
// Cleaning coerces all of that into one canonical shape and logs every
// value it could not save. Rows are never dropped: a bad cell becomes a
// missing marker plus a log entry, and the audit keeps going.
//
// Cleaning is idempotent: rendering a cleaned table back to feed shape
// (entity to_raw()) and cleaning it again yields an equal table.

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;
use tracing::{debug, warn};

use crate::entities::{
    Claim, CleanDataset, Contract, RawClaim, RawContract, RawDataset, RawReceipt, RawTariff,
    Receipt, Tariff, TABLE_CLAIMS, TABLE_CONTRACTS, TABLE_RECEIPTS, TABLE_TARIFFS,
};
use crate::error::{CleanError, Result};

// ============================================================================
// COERCION LOG
// ============================================================================

/// Why a cell ended up as a missing marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CoercionKind {
    InvalidDate,
    InvalidBoolean,
    InvalidNumber,
    MissingValue,
}

impl CoercionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CoercionKind::InvalidDate => "invalid_date",
            CoercionKind::InvalidBoolean => "invalid_boolean",
            CoercionKind::InvalidNumber => "invalid_number",
            CoercionKind::MissingValue => "missing_value",
        }
    }
}

impl fmt::Display for CoercionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One cell the cleaner had to coerce or found empty.
#[derive(Debug, Clone, Serialize)]
pub struct CleanEntry {
    pub table: String,
    pub column: String,
    /// 0-based data row in the source table.
    pub row: usize,
    /// Canonical id of the row the cell belongs to, empty when the row has
    /// no usable identifier.
    pub entity_id: String,
    pub original: String,
    pub kind: CoercionKind,
}

/// Everything the cleaner had to say about one month.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CleanLog {
    pub entries: Vec<CleanEntry>,
}

impl CleanLog {
    pub fn push(&mut self, entry: CleanEntry) {
        match entry.kind {
            CoercionKind::MissingValue => debug!(
                "{}.{} row {} ({}): missing value",
                entry.table, entry.column, entry.row, entry.entity_id
            ),
            kind => warn!(
                "{}.{} row {} ({}): {} '{}'",
                entry.table, entry.column, entry.row, entry.entity_id, kind, entry.original
            ),
        }
        self.entries.push(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entry counts per kind, in stable order for the report.
    pub fn counts_by_kind(&self) -> BTreeMap<&'static str, usize> {
        let mut counts = BTreeMap::new();
        for entry in &self.entries {
            *counts.entry(entry.kind.as_str()).or_insert(0) += 1;
        }
        counts
    }

    pub fn count_for_table(&self, table: &str) -> usize {
        self.entries.iter().filter(|e| e.table == table).count()
    }

    /// Ids of rows in `table` whose date cells were unparseable. Rules that
    /// reason about durations skip these rows rather than double-report.
    pub fn date_flagged(&self, table: &str) -> HashSet<String> {
        self.entries
            .iter()
            .filter(|e| e.table == table && e.kind == CoercionKind::InvalidDate)
            .map(|e| e.entity_id.clone())
            .collect()
    }
}

// ============================================================================
// VALUE PARSERS
// ============================================================================

const TRUE_WORDS: [&str; 5] = ["true", "vrai", "1", "yes", "oui"];
const FALSE_WORDS: [&str; 5] = ["false", "faux", "0", "no", "non"];

/// Parse a feed date. Values containing '/' are day-first French style
/// (15/01/2021); everything else is ISO, with a time suffix tolerated.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let t = raw.trim();
    if t.is_empty() {
        return None;
    }
    if t.contains('/') {
        return NaiveDate::parse_from_str(t, "%d/%m/%Y").ok();
    }
    NaiveDate::parse_from_str(t, "%Y-%m-%d")
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(t, "%Y-%m-%d %H:%M:%S")
                .ok()
                .map(|dt| dt.date())
        })
        .or_else(|| {
            NaiveDateTime::parse_from_str(t, "%Y-%m-%dT%H:%M:%S")
                .ok()
                .map(|dt| dt.date())
        })
}

/// Parse a feed boolean. French and English words are both current in the
/// extracts.
pub fn parse_bool(raw: &str) -> Option<bool> {
    let t = raw.trim().to_lowercase();
    if TRUE_WORDS.contains(&t.as_str()) {
        Some(true)
    } else if FALSE_WORDS.contains(&t.as_str()) {
        Some(false)
    } else {
        None
    }
}

/// Parse an amount. Decimal commas are accepted ("12,50" is 12.5).
pub fn parse_amount(raw: &str) -> Option<f64> {
    let t = raw.trim().replace(',', ".");
    if t.is_empty() {
        return None;
    }
    t.parse::<f64>().ok()
}

/// Parse a rate into a ratio in [0, 1].
///
/// "80%" and "0,8" both mean 0.8. A bare number above 1 is read as a
/// percentage ("80" means 80%), at or below 1 as a ratio already. Anything
/// that does not land in [0, 1] is rejected.
pub fn parse_rate(raw: &str) -> Option<f64> {
    let t = raw.trim();
    if t.is_empty() {
        return None;
    }
    let value = if let Some(stripped) = t.strip_suffix('%') {
        parse_amount(stripped)? / 100.0
    } else {
        let v = parse_amount(t)?;
        if v > 1.0 {
            v / 100.0
        } else {
            v
        }
    };
    (0.0..=1.0).contains(&value).then_some(value)
}

/// Canonical identifier: trim, uppercase, drop separators, strip leading
/// zeros from the trailing digit run. " C-001 ", "c001" and "C001" all
/// canonicalize to "C1".
pub fn canonical_id(raw: &str) -> String {
    let compact: String = raw
        .trim()
        .chars()
        .filter(|c| !matches!(c, '-' | '_' | '.' | ' '))
        .flat_map(char::to_uppercase)
        .collect();

    let digit_run = compact
        .chars()
        .rev()
        .take_while(|c| c.is_ascii_digit())
        .count();
    if digit_run == 0 {
        return compact;
    }

    let head_len = compact.chars().count() - digit_run;
    let head: String = compact.chars().take(head_len).collect();
    let tail: String = compact.chars().skip(head_len).collect();
    let trimmed = tail.trim_start_matches('0');
    if trimmed.is_empty() {
        format!("{head}0")
    } else {
        format!("{head}{trimmed}")
    }
}

/// Canonical pet identifier (chip or tattoo code): uppercase, no spaces.
/// Leading zeros are significant here, so this is deliberately lighter than
/// canonical_id.
pub fn canonical_pet_uuid(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_uppercase)
        .collect()
}

/// Repair the classic double-encoding where UTF-8 bytes were re-read as
/// Latin-1 ("BÃ©bÃ©" for "Bébé"). Strings without the telltale markers pass
/// through untouched, which also makes the repair idempotent.
pub fn fix_mojibake(raw: &str) -> String {
    if !raw.contains('Ã') && !raw.contains('Â') {
        return raw.to_string();
    }
    let bytes: Option<Vec<u8>> = raw
        .chars()
        .map(|c| {
            let v = c as u32;
            if v <= 0xFF {
                Some(v as u8)
            } else {
                None
            }
        })
        .collect();
    match bytes.and_then(|b| String::from_utf8(b).ok()) {
        Some(fixed) => fixed,
        None => raw.to_string(),
    }
}

/// Harmonize a species label: the feed writes "Chat"/"Chien", the catalog
/// "cat"/"dog". Unknown species are kept, lowercased.
pub fn harmonize_species(raw: &str) -> String {
    let t = fix_mojibake(raw).trim().to_lowercase();
    match t.as_str() {
        "chat" => "cat".to_string(),
        "chien" => "dog".to_string(),
        _ => t,
    }
}

/// Harmonize a pet identification type to the feed's vocabulary: "chip" or
/// "tatoo" (that spelling is what the upstream systems emit and match on).
pub fn harmonize_uuid_type(raw: &str) -> String {
    let t = raw.trim().to_lowercase();
    if t == "tattoo" {
        "tatoo".to_string()
    } else {
        t
    }
}

// ============================================================================
// TABLE CLEANERS
// ============================================================================

/// Per-row cleaning context: applies the parsers and files log entries with
/// the right table/row/id coordinates.
struct RowCleaner<'a> {
    table: &'static str,
    row: usize,
    entity_id: String,
    log: &'a mut CleanLog,
}

impl<'a> RowCleaner<'a> {
    fn new(table: &'static str, row: usize, entity_id: String, log: &'a mut CleanLog) -> Self {
        RowCleaner {
            table,
            row,
            entity_id,
            log,
        }
    }

    fn record(&mut self, column: &'static str, original: &str, kind: CoercionKind) {
        self.log.push(CleanEntry {
            table: self.table.to_string(),
            column: column.to_string(),
            row: self.row,
            entity_id: self.entity_id.clone(),
            original: original.trim().to_string(),
            kind,
        });
    }

    fn missing(&mut self, column: &'static str) {
        self.record(column, "", CoercionKind::MissingValue);
    }

    fn date(&mut self, column: &'static str, raw: &str) -> Option<NaiveDate> {
        if raw.trim().is_empty() {
            self.missing(column);
            return None;
        }
        match parse_date(raw) {
            Some(d) => Some(d),
            None => {
                self.record(column, raw, CoercionKind::InvalidDate);
                None
            }
        }
    }

    fn money(&mut self, column: &'static str, raw: &str) -> Option<f64> {
        if raw.trim().is_empty() {
            self.missing(column);
            return None;
        }
        match parse_amount(raw) {
            Some(v) => Some(v),
            None => {
                self.record(column, raw, CoercionKind::InvalidNumber);
                None
            }
        }
    }

    fn rate(&mut self, column: &'static str, raw: &str) -> Option<f64> {
        if raw.trim().is_empty() {
            self.missing(column);
            return None;
        }
        match parse_rate(raw) {
            Some(v) => Some(v),
            None => {
                self.record(column, raw, CoercionKind::InvalidNumber);
                None
            }
        }
    }

    fn boolean(&mut self, column: &'static str, raw: &str) -> Option<bool> {
        if raw.trim().is_empty() {
            self.missing(column);
            return None;
        }
        match parse_bool(raw) {
            Some(b) => Some(b),
            None => {
                self.record(column, raw, CoercionKind::InvalidBoolean);
                None
            }
        }
    }

    fn id(&mut self, column: &'static str, raw: &str) -> String {
        let canonical = canonical_id(raw);
        if canonical.is_empty() {
            self.missing(column);
        }
        canonical
    }

    fn text(&mut self, column: &'static str, raw: &str) -> Option<String> {
        let t = fix_mojibake(raw).trim().to_string();
        if t.is_empty() {
            self.missing(column);
            None
        } else {
            Some(t)
        }
    }

    fn species(&mut self, column: &'static str, raw: &str) -> Option<String> {
        let t = harmonize_species(raw);
        if t.is_empty() {
            self.missing(column);
            None
        } else {
            Some(t)
        }
    }

    fn uuid(&mut self, column: &'static str, raw: &str) -> Option<String> {
        let t = canonical_pet_uuid(raw);
        if t.is_empty() {
            self.missing(column);
            None
        } else {
            Some(t)
        }
    }

    fn uuid_type(&mut self, column: &'static str, raw: &str) -> Option<String> {
        let t = harmonize_uuid_type(raw);
        if t.is_empty() {
            self.missing(column);
            None
        } else {
            Some(t)
        }
    }

    /// Act codes and similar enumerated values: trimmed, uppercased.
    fn code(&mut self, column: &'static str, raw: &str) -> Option<String> {
        let t = raw.trim().to_uppercase();
        if t.is_empty() {
            self.missing(column);
            None
        } else {
            Some(t)
        }
    }
}

pub fn clean_contracts(rows: &[RawContract], log: &mut CleanLog) -> Vec<Contract> {
    rows.iter()
        .enumerate()
        .map(|(row, raw)| {
            let mut rc = RowCleaner::new(TABLE_CONTRACTS, row, canonical_id(&raw.cover_ref), log);
            Contract {
                cover_ref: rc.id("coverRef", &raw.cover_ref),
                customer_id: rc.id("customerId", &raw.customer_id),
                pet_name: rc.text("petName", &raw.pet_name),
                pet_species: rc.species("petType", &raw.pet_type),
                pet_birthdate: rc.date("petBirthday", &raw.pet_birthday),
                pet_uuid: rc.uuid("petUuid", &raw.pet_uuid),
                pet_uuid_type: rc.uuid_type("petUuidType", &raw.pet_uuid_type),
                tariff_ref: rc.id("tariffRef", &raw.tariff_ref),
                start_date: rc.date("coverStartDate", &raw.cover_start_date),
                end_date: rc.date("coverEndDate", &raw.cover_end_date),
                cover_rate: rc.rate("coverRate", &raw.cover_rate),
                annual_premium: rc.money("healthPremiumInclTax", &raw.health_premium_incl_tax),
                tax: rc.money("healthTax", &raw.health_tax),
                broker_fee: rc.money("healthBrokerFee", &raw.health_broker_fee),
                net_premium: rc.money("healthHthc", &raw.health_hthc),
            }
        })
        .collect()
}

pub fn clean_receipts(rows: &[RawReceipt], log: &mut CleanLog) -> Vec<Receipt> {
    rows.iter()
        .enumerate()
        .map(|(row, raw)| {
            let mut rc = RowCleaner::new(TABLE_RECEIPTS, row, canonical_id(&raw.receipt_id), log);
            Receipt {
                receipt_id: rc.id("receiptId", &raw.receipt_id),
                cover_ref: rc.id("coverRef", &raw.cover_ref),
                issue_date: rc.date("issuanceDate", &raw.issuance_date),
                amount: rc.money("healthPremiumInclTax", &raw.health_premium_incl_tax),
                tax: rc.money("healthTax", &raw.health_tax),
                broker_fee: rc.money("healthBrokerFee", &raw.health_broker_fee),
                net_amount: rc.money("healthHthc", &raw.health_hthc),
                paid: rc.boolean("paidStatus", &raw.paid_status),
            }
        })
        .collect()
}

pub fn clean_claims(rows: &[RawClaim], log: &mut CleanLog) -> Vec<Claim> {
    rows.iter()
        .enumerate()
        .map(|(row, raw)| {
            let mut rc = RowCleaner::new(TABLE_CLAIMS, row, canonical_id(&raw.claim_id), log);
            Claim {
                claim_id: rc.id("claimId", &raw.claim_id),
                cover_ref: rc.id("coverRef", &raw.cover_ref),
                incident_date: rc.date("incidentDate", &raw.incident_date),
                act_category: rc.code("actCategory", &raw.act_category),
                act_type: rc.code("actType", &raw.act_type),
                act_value: rc.money("actValue", &raw.act_value),
                paid_amount: rc.money("claimPaid", &raw.claim_paid),
            }
        })
        .collect()
}

pub fn clean_tariffs(rows: &[RawTariff], log: &mut CleanLog) -> Vec<Tariff> {
    rows.iter()
        .enumerate()
        .map(|(row, raw)| {
            let mut rc = RowCleaner::new(TABLE_TARIFFS, row, canonical_id(&raw.tariff_ref), log);
            Tariff {
                tariff_ref: rc.id("tariffRef", &raw.tariff_ref),
                species: rc.species("animal", &raw.animal),
                cover_rate: rc.rate("taux", &raw.taux),
                monthly_net: rc.money("healthHthcMonthly", &raw.health_hthc_monthly),
                global_rate: rc.boolean("globalRate", &raw.global_rate),
            }
        })
        .collect()
}

/// Clean all four tables. Infallible for bad values (those go to the log);
/// errors only if a table-level invariant breaks.
pub fn clean_dataset(raw: &RawDataset) -> Result<(CleanDataset, CleanLog)> {
    let mut log = CleanLog::default();

    let contracts = clean_contracts(&raw.contracts.rows, &mut log);
    ensure_row_count(TABLE_CONTRACTS, raw.contracts.rows.len(), contracts.len())?;

    let receipts = clean_receipts(&raw.receipts.rows, &mut log);
    ensure_row_count(TABLE_RECEIPTS, raw.receipts.rows.len(), receipts.len())?;

    let claims = clean_claims(&raw.claims.rows, &mut log);
    ensure_row_count(TABLE_CLAIMS, raw.claims.rows.len(), claims.len())?;

    let tariffs = clean_tariffs(&raw.tariffs.rows, &mut log);
    ensure_row_count(TABLE_TARIFFS, raw.tariffs.rows.len(), tariffs.len())?;

    Ok((
        CleanDataset {
            contracts,
            receipts,
            claims,
            tariffs,
        },
        log,
    ))
}

fn ensure_row_count(table: &'static str, before: usize, after: usize) -> Result<()> {
    if before != after {
        return Err(CleanError::RowCountDrift {
            table,
            before,
            after,
        }
        .into());
    }
    Ok(())
}

// ============================================================================
// TESTS
// ============================================================================
