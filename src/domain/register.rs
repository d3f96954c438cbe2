use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use super::{
    format_cents, normalize_currency, AdjustmentDirection, CashBalance, CashOperation, Cents,
    OperationType,
};

pub type RegisterId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegisterStatus {
    Open,
    Closed,
}

impl RegisterStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RegisterStatus::Open => "open",
            RegisterStatus::Closed => "closed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "open" => Some(RegisterStatus::Open),
            "closed" => Some(RegisterStatus::Closed),
            _ => None,
        }
    }
}

impl std::fmt::Display for RegisterStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegisterError {
    #[error("Invalid amount: {}", format_cents(*.0))]
    InvalidAmount(Cents),

    #[error(
        "Insufficient {currency} in register: balance {}, requested {}",
        format_cents(*balance),
        format_cents(*requested)
    )]
    InsufficientFunds {
        currency: String,
        balance: Cents,
        requested: Cents,
    },

    #[error(
        "Depositing {} would overflow the {currency} balance of {}",
        format_cents(*requested),
        format_cents(*balance)
    )]
    AmountTooLarge {
        currency: String,
        balance: Cents,
        requested: Cents,
    },

    #[error("Cannot reconcile {currency} to a negative amount ({})", format_cents(*amount))]
    NegativeReconciliation { currency: String, amount: Cents },

    #[error("Invalid currency code: '{0}'")]
    InvalidCurrency(String),

    #[error("Currency {0} appears more than once in the opening float")]
    DuplicateCurrency(String),

    #[error("Register is closed")]
    RegisterClosed,
}

/// Who performs an operation, when, and under which external reference.
/// Passed in explicitly so that transitions stay deterministic.
#[derive(Debug, Clone)]
pub struct OperationContext {
    pub performed_by: String,
    pub timestamp: DateTime<Utc>,
    pub reference: Option<String>,
}

impl OperationContext {
    pub fn new(performed_by: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            performed_by: performed_by.into(),
            timestamp,
            reference: None,
        }
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }
}

/// A cash movement requested at the counter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CashAction {
    AddCash {
        amount_cents: Cents,
        currency: String,
        description: String,
    },
    RemoveCash {
        amount_cents: Cents,
        currency: String,
        description: String,
    },
    ReconcileCash {
        new_amount_cents: Cents,
        currency: String,
    },
}

pub fn add_cash(
    amount_cents: Cents,
    currency: impl Into<String>,
    description: impl Into<String>,
) -> CashAction {
    CashAction::AddCash {
        amount_cents,
        currency: currency.into(),
        description: description.into(),
    }
}

pub fn remove_cash(
    amount_cents: Cents,
    currency: impl Into<String>,
    description: impl Into<String>,
) -> CashAction {
    CashAction::RemoveCash {
        amount_cents,
        currency: currency.into(),
        description: description.into(),
    }
}

pub fn reconcile_cash(new_amount_cents: Cents, currency: impl Into<String>) -> CashAction {
    CashAction::ReconcileCash {
        new_amount_cents,
        currency: currency.into(),
    }
}

/// New register state plus the operations the transition recorded.
/// `operations` is empty for a zero-difference reconciliation.
#[derive(Debug, Clone)]
pub struct Transition {
    pub register: CashRegister,
    pub operations: Vec<CashOperation>,
}

impl Transition {
    /// The single operation of an add/remove/reconcile transition, if any.
    pub fn operation(&self) -> Option<&CashOperation> {
        self.operations.first()
    }
}

/// State of one till session: the balance store and its operation log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CashRegister {
    pub id: RegisterId,
    pub status: RegisterStatus,
    pub opened_by: String,
    pub opened_at: DateTime<Utc>,
    pub closed_by: Option<String>,
    pub closed_at: Option<DateTime<Utc>>,
    pub balances: BTreeMap<String, CashBalance>,
    /// Newest first
    pub operations: Vec<CashOperation>,
}

impl CashRegister {
    /// Start a session with an opening float, recording one `Open` operation per currency.
    pub fn open(float: &[(String, Cents)], ctx: &OperationContext) -> Result<Self, RegisterError> {
        let mut register = Self {
            id: Uuid::new_v4(),
            status: RegisterStatus::Open,
            opened_by: ctx.performed_by.clone(),
            opened_at: ctx.timestamp,
            closed_by: None,
            closed_at: None,
            balances: BTreeMap::new(),
            operations: Vec::new(),
        };

        let mut seeds: Vec<(String, Cents)> = Vec::with_capacity(float.len());
        for (currency, amount) in float {
            let currency = parse_currency(currency)?;
            if *amount < 0 {
                return Err(RegisterError::InvalidAmount(*amount));
            }
            if seeds.iter().any(|(c, _)| *c == currency) {
                return Err(RegisterError::DuplicateCurrency(currency));
            }
            seeds.push((currency, *amount));
        }

        for (currency, amount) in seeds {
            register
                .balances
                .insert(currency.clone(), CashBalance::new(&currency, amount, ctx.timestamp));
            let op = register.new_operation(
                OperationType::Open,
                amount,
                &currency,
                "Opening float",
                ctx,
            );
            register.operations.insert(0, op);
        }

        Ok(register)
    }

    pub fn is_open(&self) -> bool {
        self.status == RegisterStatus::Open
    }

    /// Current amount of a currency; a currency never seen holds zero.
    pub fn balance(&self, currency: &str) -> Cents {
        self.balances
            .get(currency)
            .map(|b| b.amount_cents)
            .unwrap_or(0)
    }

    /// Sequence number the next recorded operation will get.
    pub fn next_sequence(&self) -> i64 {
        self.operations
            .iter()
            .map(|op| op.sequence)
            .max()
            .unwrap_or(0)
            + 1
    }

    /// Apply a cash action, returning the new state. `self` is left untouched,
    /// and on error nothing has been recorded.
    pub fn apply(
        &self,
        action: &CashAction,
        ctx: &OperationContext,
    ) -> Result<Transition, RegisterError> {
        if !self.is_open() {
            return Err(RegisterError::RegisterClosed);
        }

        let mut next = self.clone();
        let operation = match action {
            CashAction::AddCash {
                amount_cents,
                currency,
                description,
            } => {
                let currency = parse_currency(currency)?;
                if *amount_cents <= 0 {
                    return Err(RegisterError::InvalidAmount(*amount_cents));
                }
                let balance = next.balance(&currency);
                let new_balance = balance.checked_add(*amount_cents).ok_or_else(|| {
                    RegisterError::AmountTooLarge {
                        currency: currency.clone(),
                        balance,
                        requested: *amount_cents,
                    }
                })?;
                let op = next.new_operation(
                    OperationType::Deposit,
                    *amount_cents,
                    &currency,
                    description,
                    ctx,
                );
                next.record(op, new_balance)
            }

            CashAction::RemoveCash {
                amount_cents,
                currency,
                description,
            } => {
                let currency = parse_currency(currency)?;
                if *amount_cents <= 0 {
                    return Err(RegisterError::InvalidAmount(*amount_cents));
                }
                let balance = next.balance(&currency);
                if *amount_cents > balance {
                    return Err(RegisterError::InsufficientFunds {
                        currency,
                        balance,
                        requested: *amount_cents,
                    });
                }
                let op = next.new_operation(
                    OperationType::Withdrawal,
                    *amount_cents,
                    &currency,
                    description,
                    ctx,
                );
                next.record(op, balance - amount_cents)
            }

            CashAction::ReconcileCash {
                new_amount_cents,
                currency,
            } => {
                let currency = parse_currency(currency)?;
                if *new_amount_cents < 0 {
                    return Err(RegisterError::NegativeReconciliation {
                        currency,
                        amount: *new_amount_cents,
                    });
                }
                let expected = next.balance(&currency);
                let difference = new_amount_cents - expected;
                if difference == 0 {
                    return Ok(Transition {
                        register: next,
                        operations: Vec::new(),
                    });
                }
                let description = format!(
                    "Reconciliation: expected {}, counted {}",
                    format_cents(expected),
                    format_cents(*new_amount_cents)
                );
                let op = next
                    .new_operation(
                        OperationType::Adjustment,
                        difference.abs(),
                        &currency,
                        &description,
                        ctx,
                    )
                    .with_direction(AdjustmentDirection::from_difference(difference));
                next.record(op, *new_amount_cents)
            }
        };

        Ok(Transition {
            register: next,
            operations: vec![operation],
        })
    }

    /// End the session. Records one `Close` operation per currency carrying the
    /// final balance, then freezes the register.
    pub fn close(&self, ctx: &OperationContext) -> Result<Transition, RegisterError> {
        if !self.is_open() {
            return Err(RegisterError::RegisterClosed);
        }

        let mut next = self.clone();
        let finals: Vec<(String, Cents)> = next
            .balances
            .values()
            .map(|b| (b.currency.clone(), b.amount_cents))
            .collect();

        let mut recorded = Vec::with_capacity(finals.len());
        for (currency, amount) in finals {
            let op =
                next.new_operation(OperationType::Close, amount, &currency, "Closing balance", ctx);
            next.operations.insert(0, op.clone());
            recorded.push(op);
        }

        next.status = RegisterStatus::Closed;
        next.closed_by = Some(ctx.performed_by.clone());
        next.closed_at = Some(ctx.timestamp);

        Ok(Transition {
            register: next,
            operations: recorded,
        })
    }

    fn new_operation(
        &self,
        op_type: OperationType,
        amount_cents: Cents,
        currency: &str,
        description: &str,
        ctx: &OperationContext,
    ) -> CashOperation {
        CashOperation::new(
            self.next_sequence(),
            op_type,
            amount_cents,
            currency,
            ctx.timestamp,
            &ctx.performed_by,
            description,
        )
        .with_reference(ctx.reference.clone())
    }

    /// Prepend `op` to the log and set the balance it affects.
    fn record(&mut self, op: CashOperation, new_balance: Cents) -> CashOperation {
        self.balances
            .entry(op.currency.clone())
            .and_modify(|b| b.set(new_balance, op.timestamp))
            .or_insert_with(|| CashBalance::new(&op.currency, new_balance, op.timestamp));
        self.operations.insert(0, op.clone());
        op
    }
}

/// Normalise a currency code, reporting a bad one as `InvalidCurrency`.
pub(crate) fn parse_currency(currency: &str) -> Result<String, RegisterError> {
    normalize_currency(currency).map_err(|_| RegisterError::InvalidCurrency(currency.to_string()))
}
