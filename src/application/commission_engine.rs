use bigdecimal::{BigDecimal, RoundingMode};
use chrono::Duration;
use uuid::Uuid;

use crate::domain::commission::{Commission, CommissionStatus, ReleaseReport};
use crate::domain::context::RequestContext;
use crate::domain::errors::DomainError;
use crate::domain::order::{Order, OrderStatus};
use crate::domain::ports::{CommissionStore, OrderStore, PartyStore};

pub const DEFAULT_MATURITY_DAYS: i64 = 30;
/// Upper bound on any holding period, configured or passed to a sweep.
pub const MAX_MATURITY_DAYS: i64 = 3650;

/// Vendor commission: one per shipped order, held for a maturity period
/// before it can be withdrawn.
#[derive(Debug, Clone)]
pub struct CommissionEngine {
    maturity_days: i64,
}

impl Default for CommissionEngine {
    fn default() -> Self {
        Self::new(DEFAULT_MATURITY_DAYS)
    }
}

impl CommissionEngine {
    pub fn new(maturity_days: i64) -> Self {
        Self { maturity_days }
    }

    pub fn maturity_days(&self) -> i64 {
        self.maturity_days
    }

    pub fn calculate<S: CommissionStore + PartyStore + ?Sized>(
        &self,
        tx: &mut S,
        ctx: &RequestContext,
        order: &Order,
    ) -> Result<Commission, DomainError> {
        if tx.find_commission_by_order(order.id)?.is_some() {
            return Err(DomainError::DuplicateCommission(order.id));
        }
        let vendor = tx
            .find_vendor(order.vendor_id)?
            .ok_or(DomainError::NotFound("vendor"))?;
        let doctor_id = match order.doctor_id {
            Some(id) => tx
                .find_doctor(id)?
                .filter(|d| d.is_attributable())
                .map(|d| d.doctor_id),
            None => None,
        };

        let available_at = ctx
            .now
            .checked_add_signed(maturity_period(self.maturity_days)?)
            .ok_or_else(|| DomainError::InvalidInput("maturity date is out of range".to_string()))?;

        let commission = Commission {
            id: Uuid::new_v4(),
            vendor_id: order.vendor_id,
            order_id: order.id,
            doctor_id,
            amount: commission_amount(&order.total, &vendor.commission_percent),
            percentage: vendor.commission_percent.clone(),
            status: CommissionStatus::Pending,
            created_at: ctx.now,
            available_at,
            paid_at: None,
        };
        // A concurrent insert for the same order trips the unique index here.
        tx.insert_commission(&commission)?;
        log::info!(
            "Commission {} of {} created for order {} (vendor {})",
            commission.id,
            commission.amount,
            order.id,
            order.vendor_id
        );
        Ok(commission)
    }

    /// Moves every `pending` commission older than `maturity_days` to
    /// `available`. Commissions whose order was cancelled are voided instead.
    pub fn release_pending<S: CommissionStore + OrderStore + ?Sized>(
        &self,
        tx: &mut S,
        ctx: &RequestContext,
        maturity_days: i64,
    ) -> Result<ReleaseReport, DomainError> {
        let cutoff = ctx
            .now
            .checked_sub_signed(maturity_period(maturity_days)?)
            .ok_or_else(|| DomainError::InvalidInput("maturity cutoff is out of range".to_string()))?;
        let mut report = ReleaseReport::default();
        for commission in tx.pending_commissions_created_before(cutoff)? {
            let cancelled = tx
                .find_order(commission.order_id)?
                .is_some_and(|o| o.status == OrderStatus::Cancelled);
            let target = if cancelled {
                CommissionStatus::Voided
            } else {
                CommissionStatus::Available
            };
            if !tx.transition_commission(commission.id, CommissionStatus::Pending, target, None)? {
                continue;
            }
            if cancelled {
                log::warn!(
                    "Commission {} voided during maturation: order {} was cancelled",
                    commission.id,
                    commission.order_id
                );
                report.voided += 1;
            } else {
                report.released += 1;
            }
        }
        Ok(report)
    }

    /// `requested -> paid`; the only way in is through a processed withdrawal.
    pub fn mark_paid<S: CommissionStore + ?Sized>(
        &self,
        tx: &mut S,
        ctx: &RequestContext,
        commission_id: Uuid,
    ) -> Result<(), DomainError> {
        let moved = tx.transition_commission(
            commission_id,
            CommissionStatus::Requested,
            CommissionStatus::Paid,
            Some(ctx.now),
        )?;
        if moved {
            Ok(())
        } else {
            Err(invalid_state(tx, commission_id)?)
        }
    }

    /// `requested -> available`, used when a withdrawal is rejected.
    pub fn return_to_available<S: CommissionStore + ?Sized>(
        &self,
        tx: &mut S,
        commission_id: Uuid,
    ) -> Result<(), DomainError> {
        let moved = tx.transition_commission(
            commission_id,
            CommissionStatus::Requested,
            CommissionStatus::Available,
            None,
        )?;
        if moved {
            Ok(())
        } else {
            Err(invalid_state(tx, commission_id)?)
        }
    }

    /// Voids the order's commission while it is still pending.
    pub fn void_for_order<S: CommissionStore + ?Sized>(
        &self,
        tx: &mut S,
        order_id: Uuid,
    ) -> Result<Option<Commission>, DomainError> {
        let Some(mut commission) = tx.find_commission_by_order(order_id)? else {
            return Ok(None);
        };
        if commission.status != CommissionStatus::Pending {
            log::warn!(
                "Order {} cancelled but its commission {} is already {}",
                order_id,
                commission.id,
                commission.status
            );
            return Ok(None);
        }
        if !tx.transition_commission(commission.id, CommissionStatus::Pending, CommissionStatus::Voided, None)? {
            return Ok(None);
        }
        commission.status = CommissionStatus::Voided;
        Ok(Some(commission))
    }
}

/// Holding period as a duration, refusing negative or oversized day counts.
pub fn maturity_period(days: i64) -> Result<Duration, DomainError> {
    if !(0..=MAX_MATURITY_DAYS).contains(&days) {
        return Err(DomainError::InvalidInput(format!(
            "maturity days must be between 0 and {}, got {}",
            MAX_MATURITY_DAYS, days
        )));
    }
    Duration::try_days(days)
        .ok_or_else(|| DomainError::InvalidInput(format!("maturity of {} days is out of range", days)))
}

pub fn commission_amount(total: &BigDecimal, percent: &BigDecimal) -> BigDecimal {
    (total * percent / BigDecimal::from(100)).with_scale_round(2, RoundingMode::HalfUp)
}

fn invalid_state<S: CommissionStore + ?Sized>(tx: &mut S, commission_id: Uuid) -> Result<DomainError, DomainError> {
    let current = tx
        .lock_commissions(&[commission_id])?
        .into_iter()
        .next()
        .ok_or(DomainError::NotFound("commission"))?;
    Ok(DomainError::InvalidCommissionState {
        commission_id,
        status: current.status.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> BigDecimal {
        s.parse().unwrap()
    }

    #[test]
    fn ten_percent_of_one_hundred_is_ten() {
        assert_eq!(commission_amount(&dec("100.00"), &dec("10")), dec("10.00"));
    }

    #[test]
    fn maturity_period_is_bounded() {
        assert_eq!(maturity_period(30).unwrap(), Duration::days(30));
        assert!(matches!(maturity_period(-1), Err(DomainError::InvalidInput(_))));
        assert!(matches!(
            maturity_period(MAX_MATURITY_DAYS + 1),
            Err(DomainError::InvalidInput(_))
        ));
        assert!(matches!(
            maturity_period(1_000_000_000_000_000),
            Err(DomainError::InvalidInput(_))
        ));
    }

    #[test]
    fn amounts_round_half_up_to_cents() {
        assert_eq!(commission_amount(&dec("33.35"), &dec("10")), dec("3.34"));
        assert_eq!(commission_amount(&dec("199.99"), &dec("12.5")), dec("25.00"));
    }
}
