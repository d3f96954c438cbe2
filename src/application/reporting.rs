use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{
    CashRegister, Cents, OperationType, RegisterId, RegisterStatus,
};

/// End-of-day style breakdown of a register session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterSummary {
    pub register_id: RegisterId,
    pub status: RegisterStatus,
    pub opened_by: String,
    pub opened_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub operation_count: usize,
    pub currencies: Vec<CurrencySummary>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrencySummary {
    pub currency: String,
    pub opening: Cents,
    pub deposits: Cents,
    pub deposit_count: i64,
    pub withdrawals: Cents,
    pub withdrawal_count: i64,
    /// Signed sum of reconciliation adjustments
    pub adjustments: Cents,
    pub adjustment_count: i64,
    pub balance: Cents,
}

impl CurrencySummary {
    /// Cash that moved through the counter, excluding the float and adjustments.
    pub fn net_flow(&self) -> Cents {
        self.deposits.saturating_sub(self.withdrawals)
    }
}

pub fn build_summary(register: &CashRegister) -> RegisterSummary {
    let mut rows: BTreeMap<String, CurrencySummary> = BTreeMap::new();

    for op in &register.operations {
        let row = rows
            .entry(op.currency.clone())
            .or_insert_with(|| CurrencySummary {
                currency: op.currency.clone(),
                ..Default::default()
            });
        match op.op_type {
            OperationType::Open => row.opening = row.opening.saturating_add(op.amount_cents),
            OperationType::Deposit => {
                row.deposits = row.deposits.saturating_add(op.amount_cents);
                row.deposit_count += 1;
            }
            OperationType::Withdrawal => {
                row.withdrawals = row.withdrawals.saturating_add(op.amount_cents);
                row.withdrawal_count += 1;
            }
            OperationType::Adjustment => {
                row.adjustments = row.adjustments.saturating_add(op.signed_amount());
                row.adjustment_count += 1;
            }
            OperationType::Close => {}
        }
    }

    for balance in register.balances.values() {
        rows.entry(balance.currency.clone())
            .or_insert_with(|| CurrencySummary {
                currency: balance.currency.clone(),
                ..Default::default()
            })
            .balance = balance.amount_cents;
    }

    RegisterSummary {
        register_id: register.id,
        status: register.status,
        opened_by: register.opened_by.clone(),
        opened_at: register.opened_at,
        closed_at: register.closed_at,
        operation_count: register.operations.len(),
        currencies: rows.into_values().collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{add_cash, reconcile_cash, remove_cash, OperationContext};

    #[test]
    fn test_build_summary() {
        let ctx = OperationContext::new("carol", Utc::now());
        let float = vec![("USD".to_string(), 500000)];
        let mut register = CashRegister::open(&float, &ctx).unwrap();
        for action in [
            add_cash(10000, "USD", "a"),
            add_cash(5000, "USD", "b"),
            remove_cash(3000, "USD", "c"),
            reconcile_cash(511000, "USD"),
            add_cash(700, "EUR", "d"),
        ] {
            register = register.apply(&action, &ctx).unwrap().register;
        }

        let summary = build_summary(&register);

        assert_eq!(summary.operation_count, 6);
        assert_eq!(summary.currencies.len(), 2);
        assert_eq!(summary.currencies[0].currency, "EUR");

        let usd = &summary.currencies[1];
        assert_eq!(usd.opening, 500000);
        assert_eq!(usd.deposits, 15000);
        assert_eq!(usd.deposit_count, 2);
        assert_eq!(usd.withdrawals, 3000);
        assert_eq!(usd.withdrawal_count, 1);
        assert_eq!(usd.adjustments, -1000);
        assert_eq!(usd.balance, 511000);
        assert_eq!(usd.net_flow(), 12000);
        assert_eq!(
            usd.opening + usd.net_flow() + usd.adjustments,
            usd.balance
        );
    }

    #[test]
    fn test_summary_totals_saturate() {
        let ctx = OperationContext::new("carol", Utc::now());
        let mut register = CashRegister::open(&[], &ctx).unwrap();
        for action in [
            add_cash(Cents::MAX, "USD", "in"),
            remove_cash(Cents::MAX, "USD", "out"),
            add_cash(Cents::MAX, "USD", "in again"),
        ] {
            register = register.apply(&action, &ctx).unwrap().register;
        }

        let usd = &build_summary(&register).currencies[0];

        assert_eq!(usd.deposits, Cents::MAX);
        assert_eq!(usd.deposit_count, 2);
        assert_eq!(usd.withdrawals, Cents::MAX);
        assert_eq!(usd.balance, Cents::MAX);
    }
}
