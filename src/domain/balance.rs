use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Cents;

/// Amount of one currency currently held in a register.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CashBalance {
    pub currency: String,
    pub amount_cents: Cents,
    pub last_updated: DateTime<Utc>,
}

impl CashBalance {
    pub fn new(currency: impl Into<String>, amount_cents: Cents, at: DateTime<Utc>) -> Self {
        Self {
            currency: currency.into(),
            amount_cents,
            last_updated: at,
        }
    }

    pub(crate) fn set(&mut self, amount_cents: Cents, at: DateTime<Utc>) {
        self.amount_cents = amount_cents;
        self.last_updated = at;
    }
}
