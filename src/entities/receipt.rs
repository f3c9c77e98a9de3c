// 🧾 Receipt - one monthly premium collection (quittance) for a contract

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::{render_bool, render_date, render_number};

/// A receipt row as delivered by the feed.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawReceipt {
    #[serde(rename = "receiptId")]
    pub receipt_id: String,

    #[serde(rename = "coverRef")]
    pub cover_ref: String,

    #[serde(rename = "issuanceDate")]
    pub issuance_date: String,

    #[serde(rename = "healthPremiumInclTax")]
    pub health_premium_incl_tax: String,

    #[serde(rename = "healthTax")]
    pub health_tax: String,

    #[serde(rename = "healthBrokerFee")]
    pub health_broker_fee: String,

    #[serde(rename = "healthHthc")]
    pub health_hthc: String,

    #[serde(rename = "paidStatus")]
    pub paid_status: String,
}

/// A normalized receipt.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Receipt {
    pub receipt_id: String,
    pub cover_ref: String,
    pub issue_date: Option<NaiveDate>,
    /// Amount collected, including tax.
    pub amount: Option<f64>,
    pub tax: Option<f64>,
    pub broker_fee: Option<f64>,
    pub net_amount: Option<f64>,
    pub paid: Option<bool>,
}

impl Receipt {
    pub fn to_raw(&self) -> RawReceipt {
        RawReceipt {
            receipt_id: self.receipt_id.clone(),
            cover_ref: self.cover_ref.clone(),
            issuance_date: render_date(self.issue_date),
            health_premium_incl_tax: render_number(self.amount),
            health_tax: render_number(self.tax),
            health_broker_fee: render_number(self.broker_fee),
            health_hthc: render_number(self.net_amount),
            paid_status: render_bool(self.paid),
        }
    }
}
