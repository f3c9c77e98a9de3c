// 🐾 Contract - one pet health cover sold through the broker

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::{render_date, render_number, render_text};

/// A contract row exactly as the broker extract delivers it.
///
/// Every field is a string: the feed mixes date styles, decimal commas and
/// percent signs, and the cleaner is the only place allowed to interpret
/// them.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawContract {
    #[serde(rename = "coverRef")]
    pub cover_ref: String,

    #[serde(rename = "customerId")]
    pub customer_id: String,

    #[serde(rename = "petName")]
    pub pet_name: String,

    #[serde(rename = "petType")]
    pub pet_type: String,

    #[serde(rename = "petBirthday")]
    pub pet_birthday: String,

    #[serde(rename = "petUuid")]
    pub pet_uuid: String,

    #[serde(rename = "petUuidType")]
    pub pet_uuid_type: String,

    #[serde(rename = "tariffRef")]
    pub tariff_ref: String,

    #[serde(rename = "coverStartDate")]
    pub cover_start_date: String,

    #[serde(rename = "coverEndDate")]
    pub cover_end_date: String,

    #[serde(rename = "coverRate")]
    pub cover_rate: String,

    #[serde(rename = "healthPremiumInclTax")]
    pub health_premium_incl_tax: String,

    #[serde(rename = "healthTax")]
    pub health_tax: String,

    #[serde(rename = "healthBrokerFee")]
    pub health_broker_fee: String,

    #[serde(rename = "healthHthc")]
    pub health_hthc: String,
}

/// A normalized contract.
///
/// Identifiers are canonical (see cleaner::canonical_id), dates are typed,
/// rates are ratios in [0, 1], and anything the feed could not express is
/// `None`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Contract {
    pub cover_ref: String,
    pub customer_id: String,
    pub pet_name: Option<String>,
    /// Harmonized species: "cat", "dog", or a lowercased other value.
    pub pet_species: Option<String>,
    pub pet_birthdate: Option<NaiveDate>,
    pub pet_uuid: Option<String>,
    /// "chip" or "tatoo" (the feed's spelling).
    pub pet_uuid_type: Option<String>,
    pub tariff_ref: String,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    /// Reimbursement rate as a ratio, e.g. 0.8 for 80%.
    pub cover_rate: Option<f64>,
    /// Annual premium including tax.
    pub annual_premium: Option<f64>,
    pub tax: Option<f64>,
    pub broker_fee: Option<f64>,
    /// Annual premium net of tax and fee (HTHC).
    pub net_premium: Option<f64>,
}

impl Contract {
    /// Render back to feed shape using canonical strings. Cleaning the
    /// result reproduces `self` exactly.
    pub fn to_raw(&self) -> RawContract {
        RawContract {
            cover_ref: self.cover_ref.clone(),
            customer_id: self.customer_id.clone(),
            pet_name: render_text(&self.pet_name),
            pet_type: render_text(&self.pet_species),
            pet_birthday: render_date(self.pet_birthdate),
            pet_uuid: render_text(&self.pet_uuid),
            pet_uuid_type: render_text(&self.pet_uuid_type),
            tariff_ref: self.tariff_ref.clone(),
            cover_start_date: render_date(self.start_date),
            cover_end_date: render_date(self.end_date),
            cover_rate: render_number(self.cover_rate),
            health_premium_incl_tax: render_number(self.annual_premium),
            health_tax: render_number(self.tax),
            health_broker_fee: render_number(self.broker_fee),
            health_hthc: render_number(self.net_premium),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_raw_renders_canonical_strings() {
        let contract = Contract {
            cover_ref: "C12".to_string(),
            customer_id: "CU7".to_string(),
            pet_name: Some("Milo".to_string()),
            pet_species: Some("cat".to_string()),
            pet_birthdate: NaiveDate::from_ymd_opt(2019, 6, 1),
            pet_uuid: Some("250269604123456".to_string()),
            pet_uuid_type: Some("chip".to_string()),
            tariff_ref: "T3".to_string(),
            start_date: NaiveDate::from_ymd_opt(2021, 1, 15),
            end_date: NaiveDate::from_ymd_opt(2022, 1, 15),
            cover_rate: Some(0.8),
            annual_premium: Some(360.0),
            tax: Some(30.0),
            broker_fee: Some(42.0),
            net_premium: Some(288.0),
        };

        let raw = contract.to_raw();

        assert_eq!(raw.cover_start_date, "2021-01-15");
        assert_eq!(raw.cover_rate, "0.8");
        assert_eq!(raw.pet_type, "cat");
    }

    #[test]
    fn test_to_raw_renders_missing_as_empty() {
        let contract = Contract {
            cover_ref: "C1".to_string(),
            customer_id: String::new(),
            pet_name: None,
            pet_species: None,
            pet_birthdate: None,
            pet_uuid: None,
            pet_uuid_type: None,
            tariff_ref: "T1".to_string(),
            start_date: None,
            end_date: None,
            cover_rate: None,
            annual_premium: None,
            tax: None,
            broker_fee: None,
            net_premium: None,
        };

        let raw = contract.to_raw();

        assert_eq!(raw.pet_birthday, "");
        assert_eq!(raw.health_tax, "");
    }
}
