use bigdecimal::{BigDecimal, RoundingMode};
use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

status_enum! {
    WithdrawalStatus {
        Pending => "pending",
        Processed => "processed",
        Rejected => "rejected",
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Withdrawal {
    pub id: Uuid,
    pub vendor_id: Uuid,
    pub gross_amount: BigDecimal,
    pub fee: BigDecimal,
    pub net_amount: BigDecimal,
    pub status: WithdrawalStatus,
    /// Opaque payout details, passed through for manual settlement.
    pub bank_details: Value,
    pub rejection_reason: Option<String>,
    pub requested_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub processed_by: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WithdrawalItem {
    pub id: Uuid,
    pub withdrawal_id: Uuid,
    pub commission_id: Uuid,
    pub amount: BigDecimal,
}

#[derive(Debug, Clone)]
pub enum CommissionSelection {
    AllAvailable,
    Ids(Vec<Uuid>),
}

#[derive(Debug, Clone)]
pub enum WithdrawalDecision {
    Processed,
    Rejected { reason: String },
}

/// Payout fee: the larger of a fixed fee and a rate over the gross amount.
#[derive(Debug, Clone, PartialEq)]
pub struct FeePolicy {
    pub fixed_fee: BigDecimal,
    pub fee_rate: BigDecimal,
}

impl FeePolicy {
    pub fn fee_for(&self, gross: &BigDecimal) -> BigDecimal {
        let proportional = (gross * &self.fee_rate).with_scale_round(2, RoundingMode::HalfUp);
        if proportional > self.fixed_fee {
            proportional
        } else {
            self.fixed_fee.with_scale_round(2, RoundingMode::HalfUp)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> BigDecimal {
        s.parse().unwrap()
    }

    #[test]
    fn fixed_fee_wins_on_small_amounts() {
        let policy = FeePolicy {
            fixed_fee: dec("5.00"),
            fee_rate: dec("0.02"),
        };
        assert_eq!(policy.fee_for(&dec("10.00")), dec("5.00"));
    }

    #[test]
    fn rate_wins_on_large_amounts() {
        let policy = FeePolicy {
            fixed_fee: dec("5.00"),
            fee_rate: dec("0.02"),
        };
        assert_eq!(policy.fee_for(&dec("1000.00")), dec("20.00"));
        assert_eq!(policy.fee_for(&dec("333.33")), dec("6.67"));
    }
}
