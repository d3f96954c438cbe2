use std::collections::BTreeMap;

use serde::Serialize;

use super::{format_cents, CashOperation, CashRegister, Cents};

/// Replay an operation log into per-currency balances.
/// Balance = opening float + deposits - withdrawals +/- adjustments.
/// Order of `operations` does not matter; they are replayed by sequence.
pub fn compute_balances(operations: &[CashOperation]) -> BTreeMap<String, Cents> {
    let mut ordered: Vec<&CashOperation> = operations.iter().collect();
    ordered.sort_by_key(|op| op.sequence);

    // Saturates so a corrupted log shows up as a mismatch instead of wrapping
    let mut balances: BTreeMap<String, Cents> = BTreeMap::new();
    for op in ordered {
        let balance = balances.entry(op.currency.clone()).or_insert(0);
        *balance = balance.saturating_add(op.signed_amount());
    }
    balances
}

/// Result of checking a register's balance store against its operation log.
#[derive(Debug, Clone, Serialize)]
pub struct IntegrityReport {
    pub operation_count: usize,
    pub currency_count: usize,
    /// Balances as recomputed from the log
    pub replayed: BTreeMap<String, Cents>,
    pub issues: Vec<String>,
}

impl IntegrityReport {
    pub fn is_healthy(&self) -> bool {
        self.issues.is_empty()
    }
}

pub fn build_integrity_report(register: &CashRegister) -> IntegrityReport {
    let replayed = compute_balances(&register.operations);
    let mut issues = Vec::new();

    for (currency, balance) in &register.balances {
        let expected = replayed.get(currency).copied().unwrap_or(0);
        if balance.amount_cents != expected {
            issues.push(format!(
                "{} balance is {} but operations add up to {}",
                currency,
                format_cents(balance.amount_cents),
                format_cents(expected)
            ));
        }
        if balance.amount_cents < 0 {
            issues.push(format!(
                "{} balance is negative ({})",
                currency,
                format_cents(balance.amount_cents)
            ));
        }
    }
    for currency in replayed.keys() {
        if !register.balances.contains_key(currency) {
            issues.push(format!("{} has operations but no balance entry", currency));
        }
    }

    let mut sequences: Vec<i64> = register.operations.iter().map(|op| op.sequence).collect();
    sequences.sort_unstable();
    if sequences.iter().zip(1..).any(|(seq, expected)| *seq != expected) {
        issues.push("Operation sequence has gaps or duplicates".to_string());
    }

    let invalid_amounts = register
        .operations
        .iter()
        .filter(|op| op.amount_cents < 0)
        .count();
    if invalid_amounts > 0 {
        issues.push(format!(
            "{} operation(s) have a negative amount",
            invalid_amounts
        ));
    }

    IntegrityReport {
        operation_count: register.operations.len(),
        currency_count: register.balances.len(),
        replayed,
        issues,
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::domain::{add_cash, reconcile_cash, remove_cash, CashAction, OperationContext};

    fn ctx() -> OperationContext {
        OperationContext::new("bob", Utc::now())
    }

    fn busy_register() -> CashRegister {
        let float = vec![("USD".to_string(), 320000), ("EUR".to_string(), 180050)];
        let mut register = CashRegister::open(&float, &ctx()).unwrap();
        for action in [
            add_cash(100000, "USD", "Deposit"),
            remove_cash(50000, "EUR", "Withdrawal"),
            add_cash(2500, "GBP", "Walk-in"),
            reconcile_cash(419000, "USD"),
            remove_cash(12000, "USD", "Payout"),
        ] {
            register = register.apply(&action, &ctx()).unwrap().register;
        }
        register
    }

    #[test]
    fn test_compute_balances_empty() {
        assert!(compute_balances(&[]).is_empty());
    }

    #[test]
    fn test_balances_match_replay() {
        let register = busy_register();
        let replayed = compute_balances(&register.operations);

        // 3200 + 1000 -> reconciled to 4190 -> -120
        assert_eq!(replayed["USD"], 407000);
        assert_eq!(replayed["EUR"], 130050);
        assert_eq!(replayed["GBP"], 2500);
        for (currency, balance) in &register.balances {
            assert_eq!(replayed[currency], balance.amount_cents);
        }
    }

    /// Small deterministic xorshift generator, enough to vary the action mix.
    struct Rng(u64);

    impl Rng {
        fn next(&mut self) -> u64 {
            self.0 ^= self.0 << 13;
            self.0 ^= self.0 >> 7;
            self.0 ^= self.0 << 17;
            self.0
        }

        fn below(&mut self, bound: u64) -> i64 {
            (self.next() % bound) as i64
        }
    }

    fn random_action(rng: &mut Rng, register: &CashRegister) -> CashAction {
        let currency = ["USD", "EUR", "GBP", "CHF"][rng.below(4) as usize];
        let balance = register.balance(currency);
        match rng.below(3) {
            0 => add_cash(1 + rng.below(500_000), currency, "Deposit"),
            1 if balance > 0 => remove_cash(1 + rng.below(balance as u64), currency, "Withdrawal"),
            1 => add_cash(1 + rng.below(10_000), currency, "Deposit"),
            _ => {
                // Counts land near the expected balance, sometimes exactly on it
                let drift = rng.below(2_001) - 1_000;
                reconcile_cash((balance + drift).max(0), currency)
            }
        }
    }

    #[test]
    fn test_replay_matches_balances_over_generated_sequences() {
        for seed in [1_u64, 7, 42, 2024, 0x5eed] {
            let mut rng = Rng(seed);
            let float = vec![("USD".to_string(), 320000), ("EUR".to_string(), 180050)];
            let mut register = CashRegister::open(&float, &ctx()).unwrap();

            for step in 0..300 {
                let action = random_action(&mut rng, &register);
                register = register.apply(&action, &ctx()).unwrap().register;

                let replayed = compute_balances(&register.operations);
                let stored: BTreeMap<String, Cents> = register
                    .balances
                    .values()
                    .map(|b| (b.currency.clone(), b.amount_cents))
                    .collect();
                assert_eq!(replayed, stored, "seed {seed}, step {step}, after {action:?}");
                assert!(stored.values().all(|amount| *amount >= 0));
                assert!(build_integrity_report(&register).is_healthy());
            }
        }
    }

    #[test]
    fn test_replay_saturates_on_corrupted_log() {
        let mut register = busy_register();
        let mut forged = register.operations[0].clone();
        forged.sequence = register.next_sequence();
        forged.op_type = crate::domain::OperationType::Deposit;
        forged.currency = "USD".into();
        forged.amount_cents = Cents::MAX;
        register.operations.insert(0, forged);

        let report = build_integrity_report(&register);

        assert_eq!(report.replayed["USD"], Cents::MAX);
        assert!(!report.is_healthy());
    }

    #[test]
    fn test_closed_register_replays_to_final_balances() {
        let register = busy_register().close(&ctx()).unwrap().register;
        let report = build_integrity_report(&register);

        assert!(report.is_healthy(), "{:?}", report.issues);
        assert_eq!(report.replayed["USD"], 407000);
    }

    #[test]
    fn test_integrity_report_healthy() {
        let report = build_integrity_report(&busy_register());

        assert!(report.is_healthy(), "{:?}", report.issues);
        assert_eq!(report.operation_count, 7);
        assert_eq!(report.currency_count, 3);
    }

    #[test]
    fn test_integrity_report_detects_tampered_balance() {
        let mut register = busy_register();
        register.balances.get_mut("EUR").unwrap().amount_cents += 1;

        let report = build_integrity_report(&register);

        assert!(!report.is_healthy());
        assert!(report.issues[0].starts_with("EUR balance is 1300.51"));
    }

    #[test]
    fn test_integrity_report_detects_sequence_gap() {
        let mut register = busy_register();
        register.operations.remove(1);

        let report = build_integrity_report(&register);

        assert!(report
            .issues
            .iter()
            .any(|issue| issue.contains("sequence")));
    }
}
