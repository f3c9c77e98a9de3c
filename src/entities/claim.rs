// 🩺 Claim - one veterinary act (sinistre) submitted for reimbursement

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::{render_date, render_number, render_text};

/// A claim row as delivered by the feed.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawClaim {
    #[serde(rename = "claimId")]
    pub claim_id: String,

    #[serde(rename = "coverRef")]
    pub cover_ref: String,

    #[serde(rename = "incidentDate")]
    pub incident_date: String,

    #[serde(rename = "actCategory")]
    pub act_category: String,

    #[serde(rename = "actType")]
    pub act_type: String,

    #[serde(rename = "actValue")]
    pub act_value: String,

    #[serde(rename = "claimPaid")]
    pub claim_paid: String,
}

/// A normalized claim.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Claim {
    pub claim_id: String,
    pub cover_ref: String,
    pub incident_date: Option<NaiveDate>,
    /// MALADIE, ACCIDENT, ACCIDENTO or PREVENTION, uppercased.
    pub act_category: Option<String>,
    /// Finer act code, e.g. HOSP for a hospital stay.
    pub act_type: Option<String>,
    /// Invoiced value of the act.
    pub act_value: Option<f64>,
    /// Amount actually reimbursed.
    pub paid_amount: Option<f64>,
}

impl Claim {
    pub fn to_raw(&self) -> RawClaim {
        RawClaim {
            claim_id: self.claim_id.clone(),
            cover_ref: self.cover_ref.clone(),
            incident_date: render_date(self.incident_date),
            act_category: render_text(&self.act_category),
            act_type: render_text(&self.act_type),
            act_value: render_number(self.act_value),
            claim_paid: render_number(self.paid_amount),
        }
    }
}
