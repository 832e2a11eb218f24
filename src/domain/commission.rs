use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use uuid::Uuid;

status_enum! {
    /// `voided` marks a commission whose order was cancelled before it matured.
    CommissionStatus {
        Pending => "pending",
        Available => "available",
        Requested => "requested",
        Paid => "paid",
        Voided => "voided",
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Commission {
    pub id: Uuid,
    pub vendor_id: Uuid,
    pub order_id: Uuid,
    pub doctor_id: Option<Uuid>,
    pub amount: BigDecimal,
    pub percentage: BigDecimal,
    pub status: CommissionStatus,
    pub created_at: DateTime<Utc>,
    pub available_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
}

/// Vendor capability record joined to the user by id.
#[derive(Debug, Clone, PartialEq)]
pub struct VendorProfile {
    pub vendor_id: Uuid,
    pub commission_percent: BigDecimal,
    pub active: bool,
}

/// Doctor capability record joined to the user by id.
#[derive(Debug, Clone, PartialEq)]
pub struct DoctorProfile {
    pub doctor_id: Uuid,
    pub name: String,
    pub registration: String,
    pub jurisdiction: String,
    pub platform_registered: bool,
    pub approved: bool,
}

impl DoctorProfile {
    pub fn is_attributable(&self) -> bool {
        self.platform_registered && self.approved
    }
}

/// Summary of one maturation sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReleaseReport {
    pub released: usize,
    pub voided: usize,
}
