use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Vendor directory id. Numeric so that rank tie-breaks order naturally.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VendorId(pub i64);

impl fmt::Display for VendorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Contact projection read from the vendor directory.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VendorContact {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub company: Option<String>,
    pub address: Option<String>,
}

/// Reputation inputs for the quality policy.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VendorAttributes {
    pub email_verified: bool,
    pub phone_verified: bool,
    pub business_verified: bool,
    /// 0..=5
    pub overall_rating: Decimal,
    /// Percentage, 0..=100
    pub on_time_delivery_rate: Decimal,
}

impl Default for VendorAttributes {
    fn default() -> Self {
        Self {
            email_verified: false,
            phone_verified: false,
            business_verified: false,
            overall_rating: Decimal::ZERO,
            on_time_delivery_rate: Decimal::ZERO,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VendorProfile {
    pub id: VendorId,
    pub contact: VendorContact,
    pub attributes: VendorAttributes,
}
