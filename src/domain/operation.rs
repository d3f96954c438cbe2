use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Cents;

pub type OperationId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationType {
    /// Cash handed in at the counter
    Deposit,
    /// Cash paid out at the counter
    Withdrawal,
    /// Correction to a counted amount during reconciliation
    Adjustment,
    /// Opening float recorded when the session starts
    Open,
    /// Final amount recorded when the session ends
    Close,
}

impl OperationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationType::Deposit => "deposit",
            OperationType::Withdrawal => "withdrawal",
            OperationType::Adjustment => "adjustment",
            OperationType::Open => "open",
            OperationType::Close => "close",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "deposit" => Some(OperationType::Deposit),
            "withdrawal" => Some(OperationType::Withdrawal),
            "adjustment" => Some(OperationType::Adjustment),
            "open" => Some(OperationType::Open),
            "close" => Some(OperationType::Close),
            _ => None,
        }
    }
}

impl std::fmt::Display for OperationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Which way a reconciliation moved the balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdjustmentDirection {
    Add,
    Remove,
}

impl AdjustmentDirection {
    /// Direction for a reconciliation difference. Zero counts as `Add`.
    pub fn from_difference(difference: Cents) -> Self {
        if difference >= 0 {
            AdjustmentDirection::Add
        } else {
            AdjustmentDirection::Remove
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AdjustmentDirection::Add => "add",
            AdjustmentDirection::Remove => "remove",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "add" => Some(AdjustmentDirection::Add),
            "remove" => Some(AdjustmentDirection::Remove),
            _ => None,
        }
    }
}

impl std::fmt::Display for AdjustmentDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single balance-affecting event on a cash register.
/// Operations are immutable; a mistake is corrected by a later adjustment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CashOperation {
    pub id: OperationId,
    /// Position in the register's log, starting at 1
    pub sequence: i64,
    pub op_type: OperationType,
    /// Only set for adjustments
    pub direction: Option<AdjustmentDirection>,
    /// Always non-negative; the sign comes from `op_type` and `direction`
    pub amount_cents: Cents,
    pub currency: String,
    pub timestamp: DateTime<Utc>,
    pub performed_by: String,
    pub description: String,
    /// Receipt number, slip id, etc.
    pub reference: Option<String>,
}

impl CashOperation {
    pub fn new(
        sequence: i64,
        op_type: OperationType,
        amount_cents: Cents,
        currency: impl Into<String>,
        timestamp: DateTime<Utc>,
        performed_by: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            sequence,
            op_type,
            direction: None,
            amount_cents,
            currency: currency.into(),
            timestamp,
            performed_by: performed_by.into(),
            description: description.into(),
            reference: None,
        }
    }

    pub fn with_direction(mut self, direction: AdjustmentDirection) -> Self {
        self.direction = Some(direction);
        self
    }

    pub fn with_reference(mut self, reference: Option<String>) -> Self {
        self.reference = reference;
        self
    }

    /// Effect of this operation on the running balance.
    /// `Open` seeds the balance, so it counts as a positive amount in a replay.
    pub fn signed_amount(&self) -> Cents {
        match self.op_type {
            OperationType::Open | OperationType::Deposit => self.amount_cents,
            OperationType::Withdrawal => self.amount_cents.saturating_neg(),
            OperationType::Adjustment => match self.direction {
                Some(AdjustmentDirection::Remove) => self.amount_cents.saturating_neg(),
                _ => self.amount_cents,
            },
            OperationType::Close => 0,
        }
    }
}
