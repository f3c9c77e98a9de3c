// ✅ Quality Checker - rule-based audit of the cleaned month
//
// Every rule runs over every applicable row and reports all findings
// together; nothing short-circuits. Checking never mutates the dataset and
// never drops a row: a violation is a finding for the report, not a reason
// to stop the run.

use std::collections::BTreeMap;

use chrono::{Months, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::cleaner::CleanLog;
use crate::entities::{
    CleanDataset, TABLE_CLAIMS, TABLE_CONTRACTS, TABLE_RECEIPTS, TABLE_TARIFFS,
};

// ============================================================================
// VIOLATIONS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Severity {
    Critical, // Broken reference or impossible data
    Warning,  // Suspect data worth a manual look
    Info,     // Cosmetic
}

/// One finding: which row of which table, and what is wrong with it.
#[derive(Debug, Clone, Serialize)]
pub struct Violation {
    pub table: String,
    pub entity_id: String,
    pub detail: String,
    /// Signed amount where the finding is about money (deltas, negative
    /// values). None for structural findings.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<f64>,
}

impl Violation {
    pub fn new(table: &str, entity_id: &str, detail: impl Into<String>) -> Self {
        Violation {
            table: table.to_string(),
            entity_id: entity_id.to_string(),
            detail: detail.into(),
            amount: None,
        }
    }

    pub fn with_amount(table: &str, entity_id: &str, detail: impl Into<String>, amount: f64) -> Self {
        Violation {
            amount: Some(amount),
            ..Violation::new(table, entity_id, detail)
        }
    }
}

/// The outcome of one rule over the whole dataset.
#[derive(Debug, Clone, Serialize)]
pub struct RuleReport {
    pub rule: String,
    pub description: String,
    pub severity: Severity,
    /// Rows (or cells, for sweeps) the rule examined.
    pub checked: usize,
    pub violations: Vec<Violation>,
}

impl RuleReport {
    pub fn new(rule: &str, description: &str, severity: Severity) -> Self {
        RuleReport {
            rule: rule.to_string(),
            description: description.to_string(),
            severity,
            checked: 0,
            violations: Vec::new(),
        }
    }

    pub fn passed(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn summary(&self) -> String {
        format!(
            "{}: {} checked, {} violation(s)",
            self.rule,
            self.checked,
            self.violations.len()
        )
    }
}

// ============================================================================
// PATTERNS
// ============================================================================

// Identifiers are canonical (uppercased) before any rule sees them.
static PLACEHOLDER_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Z]+$").expect("valid pattern"));
static CHIP_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Z0-9]{15}$").expect("valid pattern"));
static TATTOO_GENERIC_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{3}[A-Z]{3}$").expect("valid pattern"));
static TATTOO_CAT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Z]{3}\d{3}$").expect("valid pattern"));
static TATTOO_DOG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^2[A-Z]{3}\d{3}$").expect("valid pattern"));

// ============================================================================
// QUALITY CHECKER
// ============================================================================

pub struct QualityChecker {
    /// Minimum pet age at cover start, in years (3 months).
    pub min_pet_age_years: f64,

    /// Maximum pet age at cover start, in years.
    pub max_pet_age_years: f64,

    /// Waiting period for ACCIDENT / ACCIDENTO claims, in days.
    pub accident_waiting_days: i64,

    /// Waiting period for MALADIE claims, in days.
    pub illness_waiting_days: i64,

    /// Waiting period for MALADIE claims with a hospital stay, in days.
    pub hospital_waiting_days: i64,

    /// Reference date: a cover is considered active once it has started by
    /// this date.
    pub as_of: NaiveDate,
}

impl QualityChecker {
    pub fn new(as_of: NaiveDate) -> Self {
        QualityChecker {
            min_pet_age_years: 0.25,
            max_pet_age_years: 9.0,
            accident_waiting_days: 2,
            illness_waiting_days: 45,
            hospital_waiting_days: 120,
            as_of,
        }
    }

    /// Run every referential, format and temporal rule. Always returns one
    /// report per rule, in a fixed order.
    pub fn run(&self, data: &CleanDataset, log: &CleanLog) -> Vec<RuleReport> {
        vec![
            self.check_duplicate_identifiers(data),
            self.check_id_format(data),
            self.check_receipt_without_contract(data),
            self.check_claim_without_contract(data),
            self.check_contract_without_receipt(data),
            self.check_coverage_period(data, log),
            self.check_claim_outside_coverage(data),
            self.check_waiting_period(data),
            self.check_pet_eligibility(data),
            self.check_negative_amount(data),
        ]
    }

    // ========================================================================
    // REFERENTIAL RULES
    // ========================================================================

    /// Rule 1: primary identifiers are unique within their table.
    fn check_duplicate_identifiers(&self, data: &CleanDataset) -> RuleReport {
        let mut report = RuleReport::new(
            "duplicate_identifiers",
            "Primary identifiers are unique within their table",
            Severity::Critical,
        );
        report.checked = data.total_rows();

        let per_table: [(&str, Vec<&str>); 4] = [
            (
                TABLE_CONTRACTS,
                data.contracts.iter().map(|c| c.cover_ref.as_str()).collect(),
            ),
            (
                TABLE_RECEIPTS,
                data.receipts.iter().map(|r| r.receipt_id.as_str()).collect(),
            ),
            (
                TABLE_CLAIMS,
                data.claims.iter().map(|c| c.claim_id.as_str()).collect(),
            ),
            (
                TABLE_TARIFFS,
                data.tariffs.iter().map(|t| t.tariff_ref.as_str()).collect(),
            ),
        ];

        for (table, ids) in per_table {
            let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
            for id in ids {
                if !id.is_empty() {
                    *counts.entry(id).or_insert(0) += 1;
                }
            }
            for (id, n) in counts {
                if n > 1 {
                    report
                        .violations
                        .push(Violation::new(table, id, format!("identifier appears {n} times")));
                }
            }
        }
        report
    }

    /// Rule 2: identifier columns hold real references, not letters-only
    /// placeholders like "UNKNOWN".
    fn check_id_format(&self, data: &CleanDataset) -> RuleReport {
        let mut report = RuleReport::new(
            "id_format",
            "Identifier columns hold real references, not placeholders",
            Severity::Warning,
        );

        let mut scan = |table: &str, entity_id: &str, column: &str, value: &str| {
            report.checked += 1;
            if !value.is_empty() && PLACEHOLDER_ID_RE.is_match(value) {
                report.violations.push(Violation::new(
                    table,
                    entity_id,
                    format!("{column} holds placeholder value '{value}'"),
                ));
            }
        };

        for c in &data.contracts {
            scan(TABLE_CONTRACTS, &c.cover_ref, "coverRef", &c.cover_ref);
            scan(TABLE_CONTRACTS, &c.cover_ref, "customerId", &c.customer_id);
            scan(TABLE_CONTRACTS, &c.cover_ref, "tariffRef", &c.tariff_ref);
        }
        for r in &data.receipts {
            scan(TABLE_RECEIPTS, &r.receipt_id, "receiptId", &r.receipt_id);
            scan(TABLE_RECEIPTS, &r.receipt_id, "coverRef", &r.cover_ref);
        }
        for cl in &data.claims {
            scan(TABLE_CLAIMS, &cl.claim_id, "claimId", &cl.claim_id);
            scan(TABLE_CLAIMS, &cl.claim_id, "coverRef", &cl.cover_ref);
        }
        for t in &data.tariffs {
            scan(TABLE_TARIFFS, &t.tariff_ref, "tariffRef", &t.tariff_ref);
        }
        report
    }

    /// Rule 3: every receipt belongs to a loaded contract. An orphaned
    /// receipt yields exactly one violation naming that receipt.
    fn check_receipt_without_contract(&self, data: &CleanDataset) -> RuleReport {
        let mut report = RuleReport::new(
            "receipt_without_contract",
            "Every receipt references a loaded contract",
            Severity::Critical,
        );
        report.checked = data.receipts.len();

        let index = data.contract_index();
        for r in &data.receipts {
            if r.cover_ref.is_empty() {
                report.violations.push(Violation::new(
                    TABLE_RECEIPTS,
                    &r.receipt_id,
                    "receipt has no contract reference",
                ));
            } else if !index.contains_key(r.cover_ref.as_str()) {
                report.violations.push(Violation::new(
                    TABLE_RECEIPTS,
                    &r.receipt_id,
                    format!("references missing contract {}", r.cover_ref),
                ));
            }
        }
        report
    }

    /// Rule 4: every claim belongs to a loaded contract.
    fn check_claim_without_contract(&self, data: &CleanDataset) -> RuleReport {
        let mut report = RuleReport::new(
            "claim_without_contract",
            "Every claim references a loaded contract",
            Severity::Critical,
        );
        report.checked = data.claims.len();

        let index = data.contract_index();
        for cl in &data.claims {
            if cl.cover_ref.is_empty() {
                report.violations.push(Violation::new(
                    TABLE_CLAIMS,
                    &cl.claim_id,
                    "claim has no contract reference",
                ));
            } else if !index.contains_key(cl.cover_ref.as_str()) {
                report.violations.push(Violation::new(
                    TABLE_CLAIMS,
                    &cl.claim_id,
                    format!("references missing contract {}", cl.cover_ref),
                ));
            }
        }
        report
    }

    /// Rule 5: a cover that has started collects premiums, so it should
    /// have at least one receipt.
    fn check_contract_without_receipt(&self, data: &CleanDataset) -> RuleReport {
        let mut report = RuleReport::new(
            "contract_without_receipt",
            "Started covers have at least one receipt",
            Severity::Warning,
        );
        report.checked = data.contracts.len();

        let by_contract = data.receipts_by_contract();
        for c in &data.contracts {
            let started = c.start_date.map(|s| s <= self.as_of).unwrap_or(false);
            if started && !by_contract.contains_key(c.cover_ref.as_str()) {
                let start = c.start_date.unwrap_or(self.as_of);
                report.violations.push(Violation::new(
                    TABLE_CONTRACTS,
                    &c.cover_ref,
                    format!("cover started {start} but has no receipts"),
                ));
            }
        }
        report
    }

    // ========================================================================
    // TEMPORAL RULES
    // ========================================================================

    /// Rule 6: coverage windows are sane: end after start, a one-year term,
    /// and no overlap for the same pet. Rows whose dates failed cleaning are
    /// skipped rather than double-reported.
    fn check_coverage_period(&self, data: &CleanDataset, log: &CleanLog) -> RuleReport {
        let mut report = RuleReport::new(
            "coverage_period",
            "Coverage windows are one-year terms that do not overlap per pet",
            Severity::Critical,
        );
        report.checked = data.contracts.len();

        let date_flagged = log.date_flagged(TABLE_CONTRACTS);
        for c in &data.contracts {
            let (start, end) = match (c.start_date, c.end_date) {
                (Some(s), Some(e)) => (s, e),
                _ => continue,
            };
            if end < start {
                report.violations.push(Violation::new(
                    TABLE_CONTRACTS,
                    &c.cover_ref,
                    format!("cover ends {end} before it starts {start}"),
                ));
                continue;
            }
            if date_flagged.contains(&c.cover_ref) {
                continue;
            }
            if let Some(expected) = start.checked_add_months(Months::new(12)) {
                if end != expected {
                    report.violations.push(Violation::new(
                        TABLE_CONTRACTS,
                        &c.cover_ref,
                        format!("cover runs {start} to {end}, expected a one-year term ending {expected}"),
                    ));
                }
            }
        }

        let mut windows: Vec<(&str, NaiveDate, NaiveDate, &str)> = data
            .contracts
            .iter()
            .filter_map(|c| match (&c.pet_uuid, c.start_date, c.end_date) {
                (Some(uuid), Some(start), Some(end)) => {
                    Some((uuid.as_str(), start, end, c.cover_ref.as_str()))
                }
                _ => None,
            })
            .collect();
        windows.sort();
        // A window can overlap any earlier window for the pet, not just its
        // neighbour, so sweep in start order carrying the furthest end seen.
        let mut open: Option<(&str, NaiveDate, &str)> = None;
        for (uuid, start, end, cover_ref) in windows {
            match open {
                Some((open_uuid, open_end, open_ref)) if open_uuid == uuid => {
                    if start <= open_end && cover_ref != open_ref {
                        report.violations.push(Violation::new(
                            TABLE_CONTRACTS,
                            cover_ref,
                            format!(
                                "coverage from {start} overlaps contract {open_ref} for the same pet"
                            ),
                        ));
                    }
                    if end > open_end {
                        open = Some((uuid, end, cover_ref));
                    }
                }
                _ => open = Some((uuid, end, cover_ref)),
            }
        }
        report
    }

    /// Rule 7: incidents happen inside the coverage window.
    fn check_claim_outside_coverage(&self, data: &CleanDataset) -> RuleReport {
        let mut report = RuleReport::new(
            "claim_outside_coverage",
            "Incidents fall inside the contract's coverage window",
            Severity::Critical,
        );
        report.checked = data.claims.len();

        let index = data.contract_index();
        for cl in &data.claims {
            let contract = match index.get(cl.cover_ref.as_str()) {
                Some(c) => c,
                None => continue, // claim_without_contract owns this case
            };
            let incident = match cl.incident_date {
                Some(d) => d,
                None => continue,
            };
            if let Some(start) = contract.start_date {
                if incident < start {
                    report.violations.push(Violation::new(
                        TABLE_CLAIMS,
                        &cl.claim_id,
                        format!("incident {incident} predates cover start {start}"),
                    ));
                    continue;
                }
            }
            if let Some(end) = contract.end_date {
                if incident > end {
                    report.violations.push(Violation::new(
                        TABLE_CLAIMS,
                        &cl.claim_id,
                        format!("incident {incident} is after cover end {end}"),
                    ));
                }
            }
        }
        report
    }

    /// Rule 8: the waiting period for the claim's act category has elapsed.
    fn check_waiting_period(&self, data: &CleanDataset) -> RuleReport {
        let mut report = RuleReport::new(
            "waiting_period",
            "Claims respect the waiting period of their act category",
            Severity::Warning,
        );
        report.checked = data.claims.len();

        let index = data.contract_index();
        for cl in &data.claims {
            let contract = match index.get(cl.cover_ref.as_str()) {
                Some(c) => c,
                None => continue,
            };
            let (incident, start) = match (cl.incident_date, contract.start_date) {
                (Some(i), Some(s)) => (i, s),
                _ => continue,
            };
            if incident < start {
                continue; // claim_outside_coverage owns this case
            }

            let category = match cl.act_category.as_deref() {
                Some(c) => c,
                None => continue,
            };
            let required = match category {
                "ACCIDENT" | "ACCIDENTO" => self.accident_waiting_days,
                "MALADIE" => {
                    if cl.act_type.as_deref() == Some("HOSP") {
                        self.hospital_waiting_days
                    } else {
                        self.illness_waiting_days
                    }
                }
                // PREVENTION and unknown codes carry no waiting period
                _ => continue,
            };

            let elapsed = (incident - start).num_days();
            if elapsed < required {
                report.violations.push(Violation::new(
                    TABLE_CLAIMS,
                    &cl.claim_id,
                    format!(
                        "{category} incident {elapsed} day(s) after cover start, waiting period is {required} day(s)"
                    ),
                ));
            }
        }
        report
    }

    // ========================================================================
    // PET RULES
    // ========================================================================

    /// Rule 9: the pet was insurable at cover start and carries a
    /// well-formed identification.
    fn check_pet_eligibility(&self, data: &CleanDataset) -> RuleReport {
        let mut report = RuleReport::new(
            "pet_eligibility",
            "Pets are of insurable age and properly identified",
            Severity::Warning,
        );
        report.checked = data.contracts.len();

        for c in &data.contracts {
            if let (Some(birth), Some(start)) = (c.pet_birthdate, c.start_date) {
                let age_years = (start - birth).num_days() as f64 / 365.25;
                if age_years < self.min_pet_age_years {
                    report.violations.push(Violation::new(
                        TABLE_CONTRACTS,
                        &c.cover_ref,
                        format!(
                            "pet was {age_years:.2} years old at cover start, minimum is {}",
                            self.min_pet_age_years
                        ),
                    ));
                } else if age_years > self.max_pet_age_years {
                    report.violations.push(Violation::new(
                        TABLE_CONTRACTS,
                        &c.cover_ref,
                        format!(
                            "pet was {age_years:.2} years old at cover start, maximum is {}",
                            self.max_pet_age_years
                        ),
                    ));
                }
            }

            match (&c.pet_uuid, &c.pet_uuid_type) {
                (Some(uuid), Some(kind)) if kind == "chip" => {
                    if !CHIP_RE.is_match(uuid) {
                        report.violations.push(Violation::new(
                            TABLE_CONTRACTS,
                            &c.cover_ref,
                            format!("chip id '{uuid}' is not 15 alphanumeric characters"),
                        ));
                    }
                }
                (Some(uuid), Some(kind)) if kind == "tatoo" => {
                    if !tattoo_matches(uuid, c.pet_species.as_deref()) {
                        let species = c.pet_species.as_deref().unwrap_or("unknown species");
                        report.violations.push(Violation::new(
                            TABLE_CONTRACTS,
                            &c.cover_ref,
                            format!("tattoo id '{uuid}' does not match the {species} pattern"),
                        ));
                    }
                }
                (Some(_), Some(kind)) => {
                    report.violations.push(Violation::new(
                        TABLE_CONTRACTS,
                        &c.cover_ref,
                        format!("unknown identification type '{kind}'"),
                    ));
                }
                (Some(_), None) => {
                    report.violations.push(Violation::new(
                        TABLE_CONTRACTS,
                        &c.cover_ref,
                        "pet has an identifier but no identification type",
                    ));
                }
                // no identifier at all: the cleaning log already carries it
                _ => {}
            }
        }
        report
    }

    // ========================================================================
    // AMOUNT SWEEP
    // ========================================================================

    /// Rule 10: money is never negative, anywhere.
    fn check_negative_amount(&self, data: &CleanDataset) -> RuleReport {
        let mut report = RuleReport::new(
            "negative_amount",
            "Monetary columns hold non-negative values",
            Severity::Critical,
        );

        let mut sweep = |table: &str, entity_id: &str, column: &str, value: Option<f64>| {
            if let Some(v) = value {
                report.checked += 1;
                if v < 0.0 {
                    report.violations.push(Violation::with_amount(
                        table,
                        entity_id,
                        format!("{column} is negative"),
                        v,
                    ));
                }
            }
        };

        for c in &data.contracts {
            sweep(TABLE_CONTRACTS, &c.cover_ref, "healthPremiumInclTax", c.annual_premium);
            sweep(TABLE_CONTRACTS, &c.cover_ref, "healthTax", c.tax);
            sweep(TABLE_CONTRACTS, &c.cover_ref, "healthBrokerFee", c.broker_fee);
            sweep(TABLE_CONTRACTS, &c.cover_ref, "healthHthc", c.net_premium);
        }
        for r in &data.receipts {
            sweep(TABLE_RECEIPTS, &r.receipt_id, "healthPremiumInclTax", r.amount);
            sweep(TABLE_RECEIPTS, &r.receipt_id, "healthTax", r.tax);
            sweep(TABLE_RECEIPTS, &r.receipt_id, "healthBrokerFee", r.broker_fee);
            sweep(TABLE_RECEIPTS, &r.receipt_id, "healthHthc", r.net_amount);
        }
        for cl in &data.claims {
            sweep(TABLE_CLAIMS, &cl.claim_id, "actValue", cl.act_value);
            sweep(TABLE_CLAIMS, &cl.claim_id, "claimPaid", cl.paid_amount);
        }
        for t in &data.tariffs {
            sweep(TABLE_TARIFFS, &t.tariff_ref, "healthHthcMonthly", t.monthly_net);
        }
        report
    }
}

fn tattoo_matches(uuid: &str, species: Option<&str>) -> bool {
    if TATTOO_GENERIC_RE.is_match(uuid) {
        return true;
    }
    match species {
        Some("cat") => TATTOO_CAT_RE.is_match(uuid),
        Some("dog") => TATTOO_DOG_RE.is_match(uuid),
        _ => TATTOO_CAT_RE.is_match(uuid) || TATTOO_DOG_RE.is_match(uuid),
    }
}

// ============================================================================
// TESTS
// ============================================================================
