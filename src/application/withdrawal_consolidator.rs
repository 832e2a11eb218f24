use std::collections::BTreeSet;

use bigdecimal::{BigDecimal, Zero};
use serde_json::Value;
use uuid::Uuid;

use super::commission_engine::CommissionEngine;
use crate::domain::commission::{Commission, CommissionStatus};
use crate::domain::context::RequestContext;
use crate::domain::errors::DomainError;
use crate::domain::ports::{CommissionStore, WithdrawalStore};
use crate::domain::withdrawal::{
    CommissionSelection, FeePolicy, Withdrawal, WithdrawalDecision, WithdrawalItem, WithdrawalStatus,
};

/// Batches available commissions into one payout request with a single fee.
#[derive(Debug, Clone)]
pub struct WithdrawalConsolidator {
    fee_policy: FeePolicy,
}

impl WithdrawalConsolidator {
    pub fn new(fee_policy: FeePolicy) -> Self {
        Self { fee_policy }
    }

    pub fn fee_policy(&self) -> &FeePolicy {
        &self.fee_policy
    }

    /// Creates the withdrawal, its items and flips every selected commission
    /// to `requested`. Statuses are re-read under lock, so a commission that
    /// matured or was taken by another request meanwhile is judged by its
    /// current state.
    pub fn request<S: CommissionStore + WithdrawalStore + ?Sized>(
        &self,
        tx: &mut S,
        ctx: &RequestContext,
        vendor_id: Uuid,
        selection: CommissionSelection,
        bank_details: Value,
    ) -> Result<(Withdrawal, Vec<WithdrawalItem>), DomainError> {
        let commissions = match selection {
            CommissionSelection::AllAvailable => {
                tx.lock_vendor_commissions(vendor_id, CommissionStatus::Available)?
            }
            CommissionSelection::Ids(ids) => {
                let ids: Vec<Uuid> = ids.into_iter().collect::<BTreeSet<_>>().into_iter().collect();
                if ids.is_empty() {
                    return Err(DomainError::InvalidInput(
                        "a withdrawal needs at least one commission".to_string(),
                    ));
                }
                let found = tx.lock_commissions(&ids)?;
                if let Some(missing) = ids.iter().find(|id| !found.iter().any(|c| c.id == **id)) {
                    return Err(DomainError::InvalidCommissionState {
                        commission_id: *missing,
                        status: "missing".to_string(),
                    });
                }
                found
            }
        };
        if commissions.is_empty() {
            return Err(DomainError::InvalidInput("no available commissions to withdraw".to_string()));
        }
        for c in &commissions {
            ensure_withdrawable(c, vendor_id)?;
        }

        let gross = commissions
            .iter()
            .fold(BigDecimal::zero(), |acc, c| acc + &c.amount);
        if gross <= BigDecimal::zero() {
            return Err(DomainError::InvalidInput("withdrawal amount must be positive".to_string()));
        }
        let fee = self.fee_policy.fee_for(&gross);
        let net = &gross - &fee;
        if net <= BigDecimal::zero() {
            return Err(DomainError::InvalidInput(format!(
                "withdrawal of {} does not cover the {} fee",
                gross, fee
            )));
        }

        let withdrawal = Withdrawal {
            id: Uuid::new_v4(),
            vendor_id,
            gross_amount: gross,
            fee,
            net_amount: net,
            status: WithdrawalStatus::Pending,
            bank_details,
            rejection_reason: None,
            requested_at: ctx.now,
            processed_at: None,
            processed_by: None,
        };
        let items: Vec<WithdrawalItem> = commissions
            .iter()
            .map(|c| WithdrawalItem {
                id: Uuid::new_v4(),
                withdrawal_id: withdrawal.id,
                commission_id: c.id,
                amount: c.amount.clone(),
            })
            .collect();

        tx.insert_withdrawal(&withdrawal, &items)?;
        for c in &commissions {
            if !tx.transition_commission(c.id, CommissionStatus::Available, CommissionStatus::Requested, None)? {
                return Err(DomainError::InvalidCommissionState {
                    commission_id: c.id,
                    status: "changed concurrently".to_string(),
                });
            }
        }
        log::info!(
            "Withdrawal {} requested by vendor {}: gross {}, fee {}, net {} over {} commissions",
            withdrawal.id,
            vendor_id,
            withdrawal.gross_amount,
            withdrawal.fee,
            withdrawal.net_amount,
            items.len()
        );
        Ok((withdrawal, items))
    }

    /// Admin decision on a pending withdrawal; cascades to its commissions.
    pub fn process<S: CommissionStore + WithdrawalStore + ?Sized>(
        &self,
        tx: &mut S,
        ctx: &RequestContext,
        commissions: &CommissionEngine,
        withdrawal_id: Uuid,
        decision: WithdrawalDecision,
    ) -> Result<Withdrawal, DomainError> {
        ctx.require_admin("withdrawal processing")?;
        let mut withdrawal = tx
            .lock_withdrawal(withdrawal_id)?
            .ok_or(DomainError::NotFound("withdrawal"))?;
        let target = match &decision {
            WithdrawalDecision::Processed => WithdrawalStatus::Processed,
            WithdrawalDecision::Rejected { .. } => WithdrawalStatus::Rejected,
        };
        if withdrawal.status != WithdrawalStatus::Pending {
            return Err(DomainError::transition("withdrawal", withdrawal.status, target));
        }

        let items = tx.withdrawal_items(withdrawal_id)?;
        match decision {
            WithdrawalDecision::Processed => {
                for item in &items {
                    commissions.mark_paid(tx, ctx, item.commission_id)?;
                }
            }
            WithdrawalDecision::Rejected { reason } => {
                if reason.trim().is_empty() {
                    return Err(DomainError::InvalidInput("a rejection reason is required".to_string()));
                }
                for item in &items {
                    commissions.return_to_available(tx, item.commission_id)?;
                }
                withdrawal.rejection_reason = Some(reason.trim().to_string());
            }
        }
        withdrawal.status = target;
        withdrawal.processed_at = Some(ctx.now);
        withdrawal.processed_by = Some(ctx.actor.id);
        tx.update_withdrawal(&withdrawal)?;
        log::info!("Withdrawal {} {} by {}", withdrawal.id, withdrawal.status, ctx.actor.id);
        Ok(withdrawal)
    }
}

fn ensure_withdrawable(commission: &Commission, vendor_id: Uuid) -> Result<(), DomainError> {
    if commission.vendor_id != vendor_id {
        return Err(DomainError::InvalidCommissionState {
            commission_id: commission.id,
            status: "owned by another vendor".to_string(),
        });
    }
    if commission.status != CommissionStatus::Available {
        return Err(DomainError::InvalidCommissionState {
            commission_id: commission.id,
            status: commission.status.to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::context::{Actor, Role};
    use crate::infrastructure::MemoryState;
    use serde_json::json;

    fn dec(s: &str) -> BigDecimal {
        s.parse().unwrap()
    }

    fn consolidator() -> WithdrawalConsolidator {
        WithdrawalConsolidator::new(FeePolicy {
            fixed_fee: dec("5.00"),
            fee_rate: dec("0.02"),
        })
    }

    fn seed(store: &mut MemoryState, vendor_id: Uuid, amount: &str, status: CommissionStatus) -> Uuid {
        let now = RequestContext::system().now;
        let commission = Commission {
            id: Uuid::new_v4(),
            vendor_id,
            order_id: Uuid::new_v4(),
            doctor_id: None,
            amount: dec(amount),
            percentage: dec("10"),
            status,
            created_at: now,
            available_at: now,
            paid_at: None,
        };
        store.insert_commission(&commission).unwrap();
        commission.id
    }

    fn status_of(store: &MemoryState, id: Uuid) -> CommissionStatus {
        store.commissions().iter().find(|c| c.id == id).unwrap().status
    }

    #[test]
    fn consolidates_available_commissions_under_one_fee() {
        let vendor = Uuid::new_v4();
        let ctx = RequestContext::new(Actor::new(vendor, Role::Vendor));
        let mut store = MemoryState::default();
        let a = seed(&mut store, vendor, "10.00", CommissionStatus::Available);
        let b = seed(&mut store, vendor, "40.00", CommissionStatus::Available);
        let pending = seed(&mut store, vendor, "99.00", CommissionStatus::Pending);

        let (w, items) = consolidator()
            .request(&mut store, &ctx, vendor, CommissionSelection::AllAvailable, json!({"pix": "key"}))
            .unwrap();

        assert_eq!(w.gross_amount, dec("50.00"));
        assert_eq!(w.fee, dec("5.00"));
        assert_eq!(w.net_amount, dec("45.00"));
        assert_eq!(w.status, WithdrawalStatus::Pending);
        assert_eq!(items.len(), 2);
        assert_eq!(status_of(&store, a), CommissionStatus::Requested);
        assert_eq!(status_of(&store, b), CommissionStatus::Requested);
        assert_eq!(status_of(&store, pending), CommissionStatus::Pending);
    }

    #[test]
    fn selection_of_unavailable_or_foreign_commission_is_refused() {
        let vendor = Uuid::new_v4();
        let ctx = RequestContext::new(Actor::new(vendor, Role::Vendor));
        let mut store = MemoryState::default();
        let mine = seed(&mut store, vendor, "30.00", CommissionStatus::Available);
        let pending = seed(&mut store, vendor, "30.00", CommissionStatus::Pending);
        let foreign = seed(&mut store, Uuid::new_v4(), "30.00", CommissionStatus::Available);

        for ids in [vec![mine, pending], vec![mine, foreign], vec![mine, Uuid::new_v4()]] {
            let err = consolidator()
                .request(&mut store, &ctx, vendor, CommissionSelection::Ids(ids), json!({}))
                .unwrap_err();
            assert!(matches!(err, DomainError::InvalidCommissionState { .. }), "{:?}", err);
        }
        assert_eq!(status_of(&store, mine), CommissionStatus::Available);
    }

    #[test]
    fn amount_that_does_not_cover_the_fee_is_refused() {
        let vendor = Uuid::new_v4();
        let ctx = RequestContext::new(Actor::new(vendor, Role::Vendor));
        let mut store = MemoryState::default();
        seed(&mut store, vendor, "5.00", CommissionStatus::Available);

        let err = consolidator()
            .request(&mut store, &ctx, vendor, CommissionSelection::AllAvailable, json!({}))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvalidInput(_)));
    }

    #[test]
    fn processing_pays_and_rejection_returns_commissions() {
        let vendor = Uuid::new_v4();
        let vendor_ctx = RequestContext::new(Actor::new(vendor, Role::Vendor));
        let admin = RequestContext::new(Actor::new(Uuid::new_v4(), Role::Admin));
        let engine = CommissionEngine::default();
        let mut store = MemoryState::default();
        let first = seed(&mut store, vendor, "20.00", CommissionStatus::Available);

        let (w, _) = consolidator()
            .request(&mut store, &vendor_ctx, vendor, CommissionSelection::Ids(vec![first]), json!({}))
            .unwrap();
        let err = consolidator()
            .process(&mut store, &vendor_ctx, &engine, w.id, WithdrawalDecision::Processed)
            .unwrap_err();
        assert!(matches!(err, DomainError::UnauthorizedAction(_)));

        let rejected = consolidator()
            .process(
                &mut store,
                &admin,
                &engine,
                w.id,
                WithdrawalDecision::Rejected {
                    reason: "bank account mismatch".to_string(),
                },
            )
            .unwrap();
        assert_eq!(rejected.status, WithdrawalStatus::Rejected);
        assert_eq!(status_of(&store, first), CommissionStatus::Available);

        let (w, _) = consolidator()
            .request(&mut store, &vendor_ctx, vendor, CommissionSelection::Ids(vec![first]), json!({}))
            .unwrap();
        let processed = consolidator()
            .process(&mut store, &admin, &engine, w.id, WithdrawalDecision::Processed)
            .unwrap();
        assert_eq!(processed.status, WithdrawalStatus::Processed);
        assert_eq!(processed.processed_by, Some(admin.actor.id));
        assert_eq!(status_of(&store, first), CommissionStatus::Paid);

        let err = consolidator()
            .process(&mut store, &admin, &engine, w.id, WithdrawalDecision::Processed)
            .unwrap_err();
        assert!(matches!(err, DomainError::InvalidStateTransition { .. }));
    }
}
