// 💶 Tariff - a priced cover formula from the product catalog

use serde::{Deserialize, Serialize};

use super::{render_bool, render_number, render_text};

/// A tariff row as delivered by the catalog extract.
///
/// The catalog says `taux` and `animal` where the contract extract says
/// `coverRate` and `petType`; the serde renames pin that mismatch here so
/// nothing downstream has to know about it.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawTariff {
    #[serde(rename = "tariffRef")]
    pub tariff_ref: String,

    #[serde(rename = "animal")]
    pub animal: String,

    #[serde(rename = "taux")]
    pub taux: String,

    #[serde(rename = "healthHthcMonthly")]
    pub health_hthc_monthly: String,

    #[serde(rename = "globalRate")]
    pub global_rate: String,
}

/// A normalized tariff.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Tariff {
    pub tariff_ref: String,
    /// Species the formula is priced for: "cat" or "dog".
    pub species: Option<String>,
    /// Reimbursement rate as a ratio.
    pub cover_rate: Option<f64>,
    /// Monthly premium net of tax and fee.
    pub monthly_net: Option<f64>,
    /// Catalog flag carried through untouched; no rule consumes it today.
    pub global_rate: Option<bool>,
}

impl Tariff {
    pub fn to_raw(&self) -> RawTariff {
        RawTariff {
            tariff_ref: self.tariff_ref.clone(),
            animal: render_text(&self.species),
            taux: render_number(self.cover_rate),
            health_hthc_monthly: render_number(self.monthly_net),
            global_rate: render_bool(self.global_rate),
        }
    }
}
