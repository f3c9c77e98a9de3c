// 💰 Reconciliation - amount concordance across the month
//
// Where the checker audits structure, this engine audits money: component
// sums, billing schedules, annual totals, tariff pricing and claim
// reimbursements. Every comparison carries a tolerance and reports the
// signed delta so a finding can be triaged without reopening the sources.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use chrono::{Datelike, Months, NaiveDate};

use crate::checker::{RuleReport, Severity, Violation};
use crate::config::{DEFAULT_COMPONENT_TOLERANCE, DEFAULT_TOLERANCE, MULTI_CONTRACT_DISCOUNT};
use crate::entities::{CleanDataset, Contract, TABLE_CLAIMS, TABLE_CONTRACTS, TABLE_RECEIPTS};

// ============================================================================
// RECONCILIATION ENGINE
// ============================================================================

pub struct ReconciliationEngine {
    /// Tolerance in euros for receipt totals, tariff pricing and claim
    /// reimbursements (default: 0.01).
    pub tolerance: f64,

    /// Looser tolerance in euros for premium component sums, which carry
    /// per-line rounding (default: 1.00).
    pub component_tolerance: f64,

    /// Discount applied to every contract of a customer except their most
    /// expensive one (default: 0.15).
    pub multi_contract_discount: f64,

    /// Billing months are only expected up to this date.
    pub as_of: NaiveDate,
}

impl ReconciliationEngine {
    pub fn new(as_of: NaiveDate) -> Self {
        ReconciliationEngine {
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

    /// Run every amount rule. Like the checker, reconciliation reads and
    /// reports; it never adjusts a value.
    pub fn run(&self, data: &CleanDataset) -> Vec<RuleReport> {
        vec![
            self.check_premium_components(data),
            self.check_receipt_schedule(data),
            self.check_receipt_concordance(data),
            self.check_tariff_application(data),
            self.check_claim_reimbursement(data),
        ]
    }

    /// Rule 11: premium incl. tax breaks down into tax + broker fee + net.
    /// Rows with no component at all are left to the missing-value log.
    fn check_premium_components(&self, data: &CleanDataset) -> RuleReport {
        let mut report = RuleReport::new(
            "premium_components",
            "Premium incl. tax equals tax + broker fee + net premium",
            Severity::Warning,
        );

        let mut audit = |table: &str,
                         entity_id: &str,
                         premium: Option<f64>,
                         tax: Option<f64>,
                         fee: Option<f64>,
                         net: Option<f64>| {
            let total = match premium {
                Some(v) => v,
                None => return,
            };
            if tax.is_none() && fee.is_none() && net.is_none() {
                return;
            }
            report.checked += 1;
            let expected = tax.unwrap_or(0.0) + fee.unwrap_or(0.0) + net.unwrap_or(0.0);
            let delta = total - expected;
            if delta.abs() > self.component_tolerance {
                report.violations.push(Violation::with_amount(
                    table,
                    entity_id,
                    format!("premium {total:.2} but components sum to {expected:.2}"),
                    delta,
                ));
            }
        };

        for c in &data.contracts {
            audit(TABLE_CONTRACTS, &c.cover_ref, c.annual_premium, c.tax, c.broker_fee, c.net_premium);
        }
        for r in &data.receipts {
            audit(TABLE_RECEIPTS, &r.receipt_id, r.amount, r.tax, r.broker_fee, r.net_amount);
        }
        report
    }

    /// Rule 12: every billing month between cover start and the reference
    /// date has a receipt. Contracts with no receipts at all belong to the
    /// contract_without_receipt rule instead.
    fn check_receipt_schedule(&self, data: &CleanDataset) -> RuleReport {
        let mut report = RuleReport::new(
            "receipt_schedule",
            "Every billing month inside the coverage window has a receipt",
            Severity::Warning,
        );

        let by_contract = data.receipts_by_contract();
        for c in &data.contracts {
            let receipts = match by_contract.get(c.cover_ref.as_str()) {
                Some(r) => r,
                None => continue,
            };
            let start = match c.start_date {
                Some(s) => s,
                None => continue,
            };
            let horizon = match c.end_date {
                Some(end) => end.min(self.as_of),
                None => self.as_of,
            };
            if horizon < start {
                continue;
            }
            report.checked += 1;

            let billed: HashSet<(i32, u32)> = receipts
                .iter()
                .filter_map(|r| r.issue_date)
                .map(|d| (d.year(), d.month()))
                .collect();

            let mut missing: Vec<String> = Vec::new();
            let mut offset = 0u32;
            while let Some(anchor) = start.checked_add_months(Months::new(offset)) {
                if anchor > horizon {
                    break;
                }
                if !billed.contains(&(anchor.year(), anchor.month())) {
                    missing.push(format!("{}-{:02}", anchor.year(), anchor.month()));
                }
                offset += 1;
            }

            if !missing.is_empty() {
                report.violations.push(Violation::new(
                    TABLE_CONTRACTS,
                    &c.cover_ref,
                    format!("billing months with no receipt: {}", missing.join(", ")),
                ));
            }
        }
        report
    }

    /// Rule 13: the receipts of a contract add up to its annual premium.
    /// The violation carries the signed delta: positive means the cover was
    /// under-billed, negative over-billed.
    fn check_receipt_concordance(&self, data: &CleanDataset) -> RuleReport {
        let mut report = RuleReport::new(
            "receipt_concordance",
            "Receipt amounts add up to the contract's annual premium",
            Severity::Critical,
        );

        let by_contract = data.receipts_by_contract();
        for c in &data.contracts {
            let annual = match c.annual_premium {
                Some(v) => v,
                None => continue,
            };
            let receipts = match by_contract.get(c.cover_ref.as_str()) {
                Some(r) => r,
                None => continue,
            };
            report.checked += 1;

            let billed: f64 = receipts.iter().filter_map(|r| r.amount).sum();
            let delta = annual - billed;
            if delta.abs() > self.tolerance {
                report.violations.push(Violation::with_amount(
                    TABLE_CONTRACTS,
                    &c.cover_ref,
                    format!("annual premium {annual:.2} but receipts total {billed:.2}"),
                    delta,
                ));
            }
        }
        report
    }

    /// Rule 14: the contract applies its tariff: right species, right cover
    /// rate, and a net premium of twelve months of the catalog price, minus
    /// the multi-contract discount where it applies.
    fn check_tariff_application(&self, data: &CleanDataset) -> RuleReport {
        let mut report = RuleReport::new(
            "tariff_application",
            "Contracts price according to their tariff",
            Severity::Warning,
        );

        let tariffs = data.tariff_index();
        let discounted = self.discounted_covers(data);

        for c in &data.contracts {
            if c.tariff_ref.is_empty() {
                continue;
            }
            report.checked += 1;

            let tariff = match tariffs.get(c.tariff_ref.as_str()) {
                Some(t) => t,
                None => {
                    report.violations.push(Violation::new(
                        TABLE_CONTRACTS,
                        &c.cover_ref,
                        format!("references unknown tariff {}", c.tariff_ref),
                    ));
                    continue;
                }
            };

            if let (Some(species), Some(expected)) = (c.pet_species.as_deref(), tariff.species.as_deref()) {
                if species != expected {
                    report.violations.push(Violation::new(
                        TABLE_CONTRACTS,
                        &c.cover_ref,
                        format!("covers a {species} on tariff {} reserved for {expected}", tariff.tariff_ref),
                    ));
                }
            }

            if let (Some(rate), Some(expected)) = (c.cover_rate, tariff.cover_rate) {
                if (rate - expected).abs() > 1e-9 {
                    report.violations.push(Violation::new(
                        TABLE_CONTRACTS,
                        &c.cover_ref,
                        format!("cover rate {rate} differs from tariff rate {expected}"),
                    ));
                }
            }

            if let (Some(net), Some(monthly)) = (c.net_premium, tariff.monthly_net) {
                let mut expected = 12.0 * monthly;
                if discounted.contains(c.cover_ref.as_str()) {
                    expected *= 1.0 - self.multi_contract_discount;
                }
                let delta = net - expected;
                if delta.abs() > self.tolerance {
                    report.violations.push(Violation::with_amount(
                        TABLE_CONTRACTS,
                        &c.cover_ref,
                        format!("net premium {net:.2} but tariff implies {expected:.2}"),
                        delta,
                    ));
                }
            }
        }
        report
    }

    /// Covers that should carry the multi-contract discount: every contract
    /// of a customer except their most expensive one. Ties rank by cover
    /// reference so the outcome is stable; a contract with no premium never
    /// ranks first.
    fn discounted_covers<'a>(&self, data: &'a CleanDataset) -> HashSet<&'a str> {
        let mut by_customer: HashMap<&str, Vec<&Contract>> = HashMap::new();
        for c in &data.contracts {
            if !c.customer_id.is_empty() {
                by_customer.entry(c.customer_id.as_str()).or_default().push(c);
            }
        }

        let mut discounted = HashSet::new();
        for (_customer, mut group) in by_customer {
            if group.len() < 2 {
                continue;
            }
            group.sort_by(|a, b| {
                let premium_a = a.annual_premium.unwrap_or(0.0);
                let premium_b = b.annual_premium.unwrap_or(0.0);
                premium_b
                    .partial_cmp(&premium_a)
                    .unwrap_or(Ordering::Equal)
                    .then_with(|| a.cover_ref.cmp(&b.cover_ref))
            });
            for c in group.iter().skip(1) {
                discounted.insert(c.cover_ref.as_str());
            }
        }
        discounted
    }

    /// Rule 15: a paid claim reimburses the act value at the contract's
    /// cover rate. Prevention packages settle on their own scale and are
    /// not reconciled here.
    fn check_claim_reimbursement(&self, data: &CleanDataset) -> RuleReport {
        let mut report = RuleReport::new(
            "claim_reimbursement",
            "Paid claims match act value times the cover rate",
            Severity::Warning,
        );

        let index = data.contract_index();
        for cl in &data.claims {
            match cl.act_category.as_deref() {
                Some("MALADIE") | Some("ACCIDENT") | Some("ACCIDENTO") => {}
                _ => continue,
            }
            let contract = match index.get(cl.cover_ref.as_str()) {
                Some(c) => c,
                None => continue,
            };
            let (paid, act, rate) = match (cl.paid_amount, cl.act_value, contract.cover_rate) {
                (Some(p), Some(a), Some(r)) => (p, a, r),
                _ => continue,
            };
            report.checked += 1;

            let expected = act * rate;
            let delta = paid - expected;
            if delta.abs() > self.tolerance {
                report.violations.push(Violation::with_amount(
                    TABLE_CLAIMS,
                    &cl.claim_id,
                    format!("paid {paid:.2} for a {act:.2} act at rate {rate}, expected {expected:.2}"),
                    delta,
                ));
            }
        }
        report
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{Claim, Receipt, Tariff};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn create_test_contract(cover_ref: &str) -> Contract {
        Contract {
            cover_ref: cover_ref.to_string(),
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
        }
    }

    fn create_test_receipt(receipt_id: &str, cover_ref: &str, month: u32, amount: f64) -> Receipt {
        Receipt {
            receipt_id: receipt_id.to_string(),
            cover_ref: cover_ref.to_string(),
            issue_date: Some(date(2021, month, 15)),
            amount: Some(amount),
            tax: Some(2.5),
            broker_fee: Some(3.5),
            net_amount: Some(amount - 6.0),
            paid: Some(true),
        }
    }

    fn create_test_tariff(tariff_ref: &str, monthly_net: f64) -> Tariff {
        Tariff {
            tariff_ref: tariff_ref.to_string(),
            species: Some("cat".to_string()),
            cover_rate: Some(0.8),
            monthly_net: Some(monthly_net),
            global_rate: Some(false),
        }
    }

    /// A contract billed monthly for a full year, priced exactly on its
    /// tariff, with one correctly reimbursed claim.
    fn create_test_dataset() -> CleanDataset {
        let receipts = (1..=12)
            .map(|m| create_test_receipt(&format!("R{m}"), "C1", m, 30.0))
            .collect();
        CleanDataset {
            contracts: vec![create_test_contract("C1")],
            receipts,
            claims: vec![Claim {
                claim_id: "S1".to_string(),
                cover_ref: "C1".to_string(),
                incident_date: Some(date(2021, 6, 20)),
                act_category: Some("MALADIE".to_string()),
                act_type: Some("CONSULT".to_string()),
                act_value: Some(200.0),
                paid_amount: Some(160.0),
            }],
            tariffs: vec![create_test_tariff("T3", 24.0)],
        }
    }

    fn engine() -> ReconciliationEngine {
        ReconciliationEngine::new(date(2021, 12, 31))
    }

    fn find<'a>(reports: &'a [RuleReport], rule: &str) -> &'a RuleReport {
        reports
            .iter()
            .find(|r| r.rule == rule)
            .unwrap_or_else(|| panic!("no report for rule {rule}"))
    }

    #[test]
    fn test_balanced_month_passes_every_rule() {
        let data = create_test_dataset();
        let reports = engine().run(&data);

        assert_eq!(reports.len(), 5);
        for report in &reports {
            assert!(report.passed(), "unexpected violations: {:?}", report.violations);
        }

        println!("✅ Balanced month reconciles clean");
    }

    #[test]
    fn test_receipt_concordance_accepts_exact_total() {
        // 12 receipts of 100 against an annual premium of 1200
        let mut data = create_test_dataset();
        data.contracts[0].annual_premium = Some(1200.0);
        data.receipts = (1..=12)
            .map(|m| create_test_receipt(&format!("R{m}"), "C1", m, 100.0))
            .collect();

        let reports = engine().run(&data);

        assert!(find(&reports, "receipt_concordance").passed());
    }

    #[test]
    fn test_receipt_concordance_reports_missing_receipt_delta() {
        // 11 receipts of 100 against an annual premium of 1200
        let mut data = create_test_dataset();
        data.contracts[0].annual_premium = Some(1200.0);
        data.receipts = (1..=11)
            .map(|m| create_test_receipt(&format!("R{m}"), "C1", m, 100.0))
            .collect();

        let reports = engine().run(&data);
        let report = find(&reports, "receipt_concordance");

        assert_eq!(report.violations.len(), 1);
        assert_eq!(report.violations[0].entity_id, "C1");
        let delta = report.violations[0].amount.unwrap();
        assert!((delta - 100.0).abs() < 1e-9);

        println!("✅ Under-billing surfaces as a +100.00 delta");
    }

    #[test]
    fn test_premium_components_flag_broken_sum() {
        let mut data = create_test_dataset();
        data.contracts[0].tax = Some(90.0); // components now sum to 420

        let reports = engine().run(&data);
        let report = find(&reports, "premium_components");

        assert_eq!(report.violations.len(), 1);
        assert_eq!(report.violations[0].table, "contracts");
        let delta = report.violations[0].amount.unwrap();
        assert!((delta - (-60.0)).abs() < 1e-9);
    }

    #[test]
    fn test_premium_components_tolerate_rounding() {
        let mut data = create_test_dataset();
        data.contracts[0].tax = Some(30.5); // off by 0.5, inside the 1 euro tolerance

        let reports = engine().run(&data);

        assert!(find(&reports, "premium_components").passed());
    }

    #[test]
    fn test_premium_components_skip_rows_without_breakdown() {
        let mut data = create_test_dataset();
        data.contracts[0].tax = None;
        data.contracts[0].broker_fee = None;
        data.contracts[0].net_premium = None;

        let reports = engine().run(&data);
        let report = find(&reports, "premium_components");

        // only the 12 receipts were auditable
        assert_eq!(report.checked, 12);
        assert!(report.passed());
    }

    #[test]
    fn test_receipt_schedule_flags_the_missing_month() {
        let mut data = create_test_dataset();
        data.receipts.retain(|r| r.receipt_id != "R3");

        let reports = engine().run(&data);
        let report = find(&reports, "receipt_schedule");

        assert_eq!(report.violations.len(), 1);
        assert_eq!(report.violations[0].entity_id, "C1");
        assert!(report.violations[0].detail.contains("2021-03"));
        assert!(!report.violations[0].detail.contains("2021-04"));
    }

    #[test]
    fn test_receipt_schedule_stops_at_the_reference_date() {
        // audit as of end of March: April onwards is not expected yet
        let mut data = create_test_dataset();
        data.receipts.retain(|r| matches!(r.receipt_id.as_str(), "R1" | "R2" | "R3"));

        let reports = ReconciliationEngine::new(date(2021, 3, 31)).run(&data);

        assert!(find(&reports, "receipt_schedule").passed());
    }

    #[test]
    fn test_receipt_schedule_leaves_receiptless_contracts_alone() {
        let mut data = create_test_dataset();
        data.receipts.clear();

        let reports = engine().run(&data);
        let report = find(&reports, "receipt_schedule");

        assert_eq!(report.checked, 0);
        assert!(report.passed());
    }

    #[test]
    fn test_tariff_application_unknown_reference() {
        let mut data = create_test_dataset();
        data.contracts[0].tariff_ref = "T404".to_string();

        let reports = engine().run(&data);
        let report = find(&reports, "tariff_application");

        assert_eq!(report.violations.len(), 1);
        assert!(report.violations[0].detail.contains("unknown tariff T404"));
    }

    #[test]
    fn test_tariff_application_species_mismatch() {
        let mut data = create_test_dataset();
        data.tariffs[0].species = Some("dog".to_string());

        let reports = engine().run(&data);
        let report = find(&reports, "tariff_application");

        assert_eq!(report.violations.len(), 1);
        assert!(report.violations[0].detail.contains("reserved for dog"));
    }

    #[test]
    fn test_tariff_application_rate_mismatch() {
        let mut data = create_test_dataset();
        data.contracts[0].cover_rate = Some(0.7);

        let reports = engine().run(&data);
        let report = find(&reports, "tariff_application");

        assert_eq!(report.violations.len(), 1);
        assert!(report.violations[0].detail.contains("cover rate 0.7"));
    }

    #[test]
    fn test_tariff_net_premium_off_catalog() {
        let mut data = create_test_dataset();
        data.contracts[0].net_premium = Some(300.0); // tariff implies 288

        let reports = engine().run(&data);
        let report = find(&reports, "tariff_application");

        assert_eq!(report.violations.len(), 1);
        let delta = report.violations[0].amount.unwrap();
        assert!((delta - 12.0).abs() < 1e-9);
    }

    #[test]
    fn test_second_contract_of_customer_gets_the_discount() {
        let mut data = create_test_dataset();
        let mut second = create_test_contract("C2");
        second.annual_premium = Some(300.0);
        second.net_premium = Some(244.8); // 12 * 24 * 0.85
        second.pet_uuid = Some("250269604999999".to_string());
        second.start_date = Some(date(2022, 2, 1));
        second.end_date = Some(date(2023, 2, 1));
        data.contracts.push(second);

        let reports = engine().run(&data);

        assert!(find(&reports, "tariff_application").passed());

        println!("✅ Discounted sibling contract prices at 85% of catalog");
    }

    #[test]
    fn test_discount_on_the_most_expensive_contract_is_flagged() {
        let mut data = create_test_dataset();
        let mut second = create_test_contract("C2");
        second.annual_premium = Some(300.0);
        second.net_premium = Some(244.8);
        second.start_date = Some(date(2022, 2, 1));
        second.end_date = Some(date(2023, 2, 1));
        data.contracts.push(second);
        // C1 is the most expensive cover of CU1, so it must be full price
        data.contracts[0].net_premium = Some(244.8);

        let reports = engine().run(&data);
        let report = find(&reports, "tariff_application");

        assert_eq!(report.violations.len(), 1);
        assert_eq!(report.violations[0].entity_id, "C1");
    }

    #[test]
    fn test_claim_reimbursement_at_cover_rate() {
        let mut data = create_test_dataset();
        data.claims[0].paid_amount = Some(150.0); // 200 * 0.8 = 160 expected

        let reports = engine().run(&data);
        let report = find(&reports, "claim_reimbursement");

        assert_eq!(report.violations.len(), 1);
        let delta = report.violations[0].amount.unwrap();
        assert!((delta - (-10.0)).abs() < 1e-9);
    }

    #[test]
    fn test_prevention_claims_are_not_reconciled() {
        let mut data = create_test_dataset();
        data.claims[0].act_category = Some("PREVENTION".to_string());
        data.claims[0].paid_amount = Some(15.0);

        let reports = engine().run(&data);
        let report = find(&reports, "claim_reimbursement");

        assert_eq!(report.checked, 0);
        assert!(report.passed());
    }

    #[test]
    fn test_with_tolerance_loosens_the_comparison() {
        let mut data = create_test_dataset();
        data.contracts[0].net_premium = Some(289.0); // 1 euro off catalog

        let strict = engine().run(&data);
        assert!(!find(&strict, "tariff_application").passed());

        let loose = engine().with_tolerance(2.0).run(&data);
        assert!(find(&loose, "tariff_application").passed());
    }
}
