use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

status_enum! {
    PrescriptionStatus {
        Pending => "pending",
        Approved => "approved",
        Rejected => "rejected",
    }
}

/// Prescriber as written on the document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrescriberIdentity {
    pub name: String,
    pub registration: String,
    pub jurisdiction: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Prescription {
    pub id: Uuid,
    pub order_id: Uuid,
    /// Reference returned by the document storage collaborator.
    pub file_reference: String,
    pub prescriber: PrescriberIdentity,
    pub status: PrescriptionStatus,
    pub rejection_reason: Option<String>,
    pub reviewed_by: Option<Uuid>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct PrescriptionUpload {
    pub file_reference: String,
    pub prescriber: PrescriberIdentity,
}
