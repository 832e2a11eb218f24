use uuid::Uuid;

use crate::domain::context::RequestContext;
use crate::domain::errors::DomainError;
use crate::domain::order::Order;
use crate::domain::ports::PrescriptionStore;
use crate::domain::prescription::{Prescription, PrescriptionStatus, PrescriptionUpload};
use crate::domain::Outcome;

/// Compliance checkpoint: one pending document per order, reviewed once.
#[derive(Debug, Clone, Default)]
pub struct PrescriptionGate;

impl PrescriptionGate {
    pub fn new() -> Self {
        Self
    }

    /// Records a new document for the order. A resubmission is only accepted
    /// after the previous document was rejected; the old row is kept.
    pub fn submit<S: PrescriptionStore + ?Sized>(
        &self,
        tx: &mut S,
        ctx: &RequestContext,
        order: &Order,
        upload: PrescriptionUpload,
    ) -> Result<Prescription, DomainError> {
        if upload.file_reference.trim().is_empty() {
            return Err(DomainError::InvalidInput("file reference is required".to_string()));
        }
        let prescriber = &upload.prescriber;
        if prescriber.name.trim().is_empty()
            || prescriber.registration.trim().is_empty()
            || prescriber.jurisdiction.trim().is_empty()
        {
            return Err(DomainError::InvalidInput(
                "prescriber name, registration and jurisdiction are required".to_string(),
            ));
        }

        if let Some(current) = self.current(tx, order)? {
            if current.status != PrescriptionStatus::Rejected {
                return Err(DomainError::Conflict(format!(
                    "order {} already has a {} prescription",
                    order.id, current.status
                )));
            }
        }

        let prescription = Prescription {
            id: Uuid::new_v4(),
            order_id: order.id,
            file_reference: upload.file_reference,
            prescriber: upload.prescriber,
            status: PrescriptionStatus::Pending,
            rejection_reason: None,
            reviewed_by: None,
            reviewed_at: None,
            created_at: ctx.now,
        };
        tx.insert_prescription(&prescription)?;
        Ok(prescription)
    }

    /// Approval is permanent; approving twice is a no-op.
    pub fn approve<S: PrescriptionStore + ?Sized>(
        &self,
        tx: &mut S,
        ctx: &RequestContext,
        prescription_id: Uuid,
    ) -> Result<Outcome<Prescription>, DomainError> {
        ctx.require_admin("prescription approval")?;
        let mut prescription = load(tx, prescription_id)?;
        match prescription.status {
            PrescriptionStatus::Approved => Ok(Outcome::NoOp(prescription)),
            PrescriptionStatus::Rejected => Err(DomainError::transition(
                "prescription",
                PrescriptionStatus::Rejected,
                PrescriptionStatus::Approved,
            )),
            PrescriptionStatus::Pending => {
                prescription.status = PrescriptionStatus::Approved;
                prescription.reviewed_by = Some(ctx.actor.id);
                prescription.reviewed_at = Some(ctx.now);
                tx.update_prescription(&prescription)?;
                Ok(Outcome::Applied(prescription))
            }
        }
    }

    pub fn reject<S: PrescriptionStore + ?Sized>(
        &self,
        tx: &mut S,
        ctx: &RequestContext,
        prescription_id: Uuid,
        reason: &str,
    ) -> Result<Prescription, DomainError> {
        ctx.require_admin("prescription rejection")?;
        if reason.trim().is_empty() {
            return Err(DomainError::InvalidInput("a rejection reason is required".to_string()));
        }
        let mut prescription = load(tx, prescription_id)?;
        if prescription.status != PrescriptionStatus::Pending {
            return Err(DomainError::transition(
                "prescription",
                prescription.status,
                PrescriptionStatus::Rejected,
            ));
        }
        prescription.status = PrescriptionStatus::Rejected;
        prescription.rejection_reason = Some(reason.trim().to_string());
        prescription.reviewed_by = Some(ctx.actor.id);
        prescription.reviewed_at = Some(ctx.now);
        tx.update_prescription(&prescription)?;
        Ok(prescription)
    }

    pub fn current<S: PrescriptionStore + ?Sized>(
        &self,
        tx: &mut S,
        order: &Order,
    ) -> Result<Option<Prescription>, DomainError> {
        match order.prescription_id {
            Some(id) => tx.find_prescription(id),
            None => Ok(None),
        }
    }

    pub fn is_approved<S: PrescriptionStore + ?Sized>(
        &self,
        tx: &mut S,
        order: &Order,
    ) -> Result<bool, DomainError> {
        Ok(self
            .current(tx, order)?
            .is_some_and(|p| p.status == PrescriptionStatus::Approved))
    }
}

fn load<S: PrescriptionStore + ?Sized>(tx: &mut S, id: Uuid) -> Result<Prescription, DomainError> {
    tx.find_prescription(id)?
        .ok_or(DomainError::NotFound("prescription"))
}
