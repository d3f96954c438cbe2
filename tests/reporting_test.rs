mod common;

use anyhow::Result;
use common::{db_path, open_standard, test_service, TELLER};
use sqlx::SqlitePool;
use tillbook::application::AppError;
use tillbook::domain::RegisterStatus;

#[tokio::test]
async fn test_summary_breaks_down_each_currency() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let register = open_standard(&service).await?;

    service.add_cash(100000, "USD", "Deposit", TELLER, None).await?;
    service.add_cash(25000, "USD", "Deposit", TELLER, None).await?;
    service.remove_cash(40000, "USD", "Payout", TELLER, None).await?;
    service.remove_cash(20000, "EUR", "Payout", TELLER, None).await?;
    service.reconcile_cash(404500, "USD", TELLER).await?;

    let summary = service.summary(None).await?;
    assert_eq!(summary.register_id, register.id);
    assert_eq!(summary.status, RegisterStatus::Open);
    assert_eq!(summary.operation_count, 7);
    assert_eq!(summary.currencies.len(), 2);

    let eur = &summary.currencies[0];
    assert_eq!(eur.currency, "EUR");
    assert_eq!(eur.opening, 180050);
    assert_eq!(eur.withdrawals, 20000);
    assert_eq!(eur.withdrawal_count, 1);
    assert_eq!(eur.balance, 160050);

    let usd = &summary.currencies[1];
    assert_eq!(usd.currency, "USD");
    assert_eq!(usd.opening, 320000);
    assert_eq!(usd.deposits, 125000);
    assert_eq!(usd.deposit_count, 2);
    assert_eq!(usd.withdrawals, 40000);
    assert_eq!(usd.net_flow(), 85000);
    // 3200 + 1250 - 400 = 4050, counted 4045
    assert_eq!(usd.adjustments, -500);
    assert_eq!(usd.adjustment_count, 1);
    assert_eq!(usd.balance, 404500);
    assert_eq!(
        usd.opening + usd.net_flow() + usd.adjustments,
        usd.balance
    );

    Ok(())
}

#[tokio::test]
async fn test_summary_of_closed_register() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let register = open_standard(&service).await?;
    service.add_cash(5000, "EUR", "Deposit", TELLER, None).await?;
    service.close_register(TELLER).await?;

    assert!(matches!(
        service.summary(None).await,
        Err(AppError::NoOpenRegister)
    ));

    let summary = service.summary(Some(register.id)).await?;
    assert_eq!(summary.status, RegisterStatus::Closed);
    assert!(summary.closed_at.is_some());
    assert_eq!(summary.currencies[0].balance, 185050);

    let unknown = uuid::Uuid::new_v4();
    assert!(matches!(
        service.summary(Some(unknown)).await,
        Err(AppError::RegisterNotFound(_))
    ));

    Ok(())
}

#[tokio::test]
async fn test_integrity_check_passes_after_activity() -> Result<()> {
    let (service, _temp) = test_service().await?;
    open_standard(&service).await?;
    service.add_cash(100000, "USD", "Deposit", TELLER, None).await?;
    service.remove_cash(180050, "EUR", "Empty drawer", TELLER, None).await?;
    service.reconcile_cash(419999, "USD", TELLER).await?;

    let report = service.check_integrity(None).await?;
    assert!(report.is_healthy(), "issues: {:?}", report.issues);
    assert_eq!(report.operation_count, 5);
    assert_eq!(report.currency_count, 2);
    assert_eq!(report.replayed["USD"], 419999);
    assert_eq!(report.replayed["EUR"], 0);

    Ok(())
}

#[tokio::test]
async fn test_integrity_check_detects_tampered_balance() -> Result<()> {
    let (service, temp) = test_service().await?;
    let register = open_standard(&service).await?;
    service.add_cash(100000, "USD", "Deposit", TELLER, None).await?;

    let pool = SqlitePool::connect(&format!("sqlite:{}", db_path(&temp))).await?;
    sqlx::query("UPDATE cash_balances SET amount_cents = ? WHERE register_id = ? AND currency = 'USD'")
        .bind(999_i64)
        .bind(register.id.to_string())
        .execute(&pool)
        .await?;
    pool.close().await;

    let report = service.check_integrity(Some(register.id)).await?;
    assert!(!report.is_healthy());
    assert_eq!(report.issues.len(), 1);
    assert!(report.issues[0].starts_with("USD balance is 9.99"));
    assert_eq!(report.replayed["USD"], 420000);

    Ok(())
}
