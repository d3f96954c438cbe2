use std::collections::BTreeMap;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnection, SqliteRow};
use sqlx::{Row, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use crate::domain::{
    AdjustmentDirection, CashBalance, CashOperation, CashRegister, OperationId, OperationType,
    RegisterId, RegisterStatus,
};

use super::MIGRATION_001_INITIAL;

const OPERATION_COLUMNS: &str = "id, register_id, sequence, op_type, direction, amount_cents, currency, timestamp, performed_by, description, reference";

/// Repository for persisting and querying registers, balances and operations.
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    /// Create a new repository with the given SQLite connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to a SQLite database.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = SqlitePool::connect(database_url)
            .await
            .context("Failed to connect to database")?;
        Ok(Self::new(pool))
    }

    /// Run database migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::raw_sql(MIGRATION_001_INITIAL)
            .execute(&self.pool)
            .await
            .context("Failed to run migration 001")?;
        Ok(())
    }

    /// Initialize a new database (connect + migrate).
    pub async fn init(database_url: &str) -> Result<Self> {
        let repo = Self::connect(database_url).await?;
        repo.migrate().await?;
        Ok(repo)
    }

    // ========================
    // Register operations
    // ========================

    /// Insert a freshly opened register together with its opening float.
    pub async fn save_new_register(&self, register: &CashRegister) -> Result<()> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;

        sqlx::query(
            r#"
            INSERT INTO registers (id, status, opened_by, opened_at, closed_by, closed_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(register.id.to_string())
        .bind(register.status.as_str())
        .bind(&register.opened_by)
        .bind(register.opened_at.to_rfc3339())
        .bind(&register.closed_by)
        .bind(register.closed_at.map(|dt| dt.to_rfc3339()))
        .execute(&mut *tx)
        .await
        .context("Failed to save register")?;

        let mut operations: Vec<&CashOperation> = register.operations.iter().collect();
        operations.sort_by_key(|op| op.sequence);
        for op in operations {
            insert_operation(&mut tx, register.id, op).await?;
        }
        for balance in register.balances.values() {
            upsert_balance(&mut tx, register.id, balance).await?;
        }

        tx.commit().await.context("Failed to commit register")?;
        debug!(register_id = %register.id, "saved new register");
        Ok(())
    }

    /// Persist the outcome of a transition: the new operations, the balances
    /// they touched, and the register status.
    ///
    /// Runs in one transaction. A concurrent writer that recorded the same
    /// sequence number first makes the insert fail and nothing is written.
    pub async fn save_transition(
        &self,
        register: &CashRegister,
        operations: &[CashOperation],
    ) -> Result<()> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;

        for op in operations {
            insert_operation(&mut tx, register.id, op).await?;
            if let Some(balance) = register.balances.get(&op.currency) {
                upsert_balance(&mut tx, register.id, balance).await?;
            }
        }

        if register.status == RegisterStatus::Closed {
            let result = sqlx::query(
                "UPDATE registers SET status = ?, closed_by = ?, closed_at = ? WHERE id = ? AND status = 'open'",
            )
            .bind(register.status.as_str())
            .bind(&register.closed_by)
            .bind(register.closed_at.map(|dt| dt.to_rfc3339()))
            .bind(register.id.to_string())
            .execute(&mut *tx)
            .await
            .context("Failed to close register")?;

            if result.rows_affected() != 1 {
                anyhow::bail!("Register {} is not open", register.id);
            }
        }

        tx.commit().await.context("Failed to commit transition")?;
        debug!(
            register_id = %register.id,
            operations = operations.len(),
            "saved transition"
        );
        Ok(())
    }

    /// Load the currently open register, if any.
    pub async fn get_open_register(&self) -> Result<Option<CashRegister>> {
        let row = sqlx::query(
            "SELECT id, status, opened_by, opened_at, closed_by, closed_at FROM registers WHERE status = 'open'",
        )
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch open register")?;

        match row {
            Some(row) => Ok(Some(self.load_register(&row).await?)),
            None => Ok(None),
        }
    }

    /// Load a register by ID.
    pub async fn get_register(&self, id: RegisterId) -> Result<Option<CashRegister>> {
        let row = sqlx::query(
            "SELECT id, status, opened_by, opened_at, closed_by, closed_at FROM registers WHERE id = ?",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch register")?;

        match row {
            Some(row) => Ok(Some(self.load_register(&row).await?)),
            None => Ok(None),
        }
    }

    /// List all registers, most recently opened first.
    pub async fn list_registers(&self) -> Result<Vec<CashRegister>> {
        let rows = sqlx::query(
            "SELECT id, status, opened_by, opened_at, closed_by, closed_at FROM registers ORDER BY rowid DESC",
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to list registers")?;

        let mut registers = Vec::with_capacity(rows.len());
        for row in &rows {
            registers.push(self.load_register(row).await?);
        }
        Ok(registers)
    }

    async fn load_register(&self, row: &SqliteRow) -> Result<CashRegister> {
        let id_str: String = row.get("id");
        let status_str: String = row.get("status");
        let id = Uuid::parse_str(&id_str).context("Invalid register ID")?;

        let balances = self
            .list_balances(id)
            .await?
            .into_iter()
            .map(|b| (b.currency.clone(), b))
            .collect::<BTreeMap<_, _>>();
        let operations = self
            .list_operations_filtered(id, None, None, None)
            .await?;

        Ok(CashRegister {
            id,
            status: RegisterStatus::from_str(&status_str)
                .ok_or_else(|| anyhow::anyhow!("Invalid register status: {}", status_str))?,
            opened_by: row.get("opened_by"),
            opened_at: parse_timestamp(row.get("opened_at")).context("Invalid opened_at")?,
            closed_by: row.get("closed_by"),
            closed_at: row
                .get::<Option<String>, _>("closed_at")
                .map(parse_timestamp)
                .transpose()
                .context("Invalid closed_at")?,
            balances,
            operations,
        })
    }

    // ========================
    // Balance operations
    // ========================

    /// List the balances of a register, ordered by currency.
    pub async fn list_balances(&self, register_id: RegisterId) -> Result<Vec<CashBalance>> {
        let rows = sqlx::query(
            r#"
            SELECT currency, amount_cents, last_updated
            FROM cash_balances
            WHERE register_id = ?
            ORDER BY currency
            "#,
        )
        .bind(register_id.to_string())
        .fetch_all(&self.pool)
        .await
        .context("Failed to list balances")?;

        rows.iter()
            .map(|row| {
                Ok(CashBalance {
                    currency: row.get("currency"),
                    amount_cents: row.get("amount_cents"),
                    last_updated: parse_timestamp(row.get("last_updated"))
                        .context("Invalid last_updated")?,
                })
            })
            .collect()
    }

    // ========================
    // Operation queries
    // ========================

    /// Get an operation by ID, along with the register it belongs to.
    pub async fn get_operation(
        &self,
        id: OperationId,
    ) -> Result<Option<(RegisterId, CashOperation)>> {
        let query = format!("SELECT {} FROM cash_operations WHERE id = ?", OPERATION_COLUMNS);
        let row = sqlx::query(&query)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch operation")?;

        match row {
            Some(row) => {
                let register_str: String = row.get("register_id");
                let register_id =
                    Uuid::parse_str(&register_str).context("Invalid register ID")?;
                Ok(Some((register_id, Self::row_to_operation(&row)?)))
            }
            None => Ok(None),
        }
    }

    /// List operations of a register with optional filters, newest first.
    pub async fn list_operations_filtered(
        &self,
        register_id: RegisterId,
        currency: Option<&str>,
        op_type: Option<OperationType>,
        limit: Option<usize>,
    ) -> Result<Vec<CashOperation>> {
        let mut query = format!(
            "SELECT {} FROM cash_operations WHERE register_id = ?",
            OPERATION_COLUMNS
        );
        if currency.is_some() {
            query.push_str(" AND currency = ?");
        }
        if op_type.is_some() {
            query.push_str(" AND op_type = ?");
        }
        query.push_str(" ORDER BY sequence DESC");
        if let Some(lim) = limit {
            query.push_str(&format!(" LIMIT {}", lim));
        }

        let mut sql_query = sqlx::query(&query).bind(register_id.to_string());
        if let Some(cur) = currency {
            sql_query = sql_query.bind(cur);
        }
        if let Some(ot) = op_type {
            sql_query = sql_query.bind(ot.as_str());
        }

        let rows = sql_query
            .fetch_all(&self.pool)
            .await
            .context("Failed to list operations")?;

        rows.iter().map(Self::row_to_operation).collect()
    }

    fn row_to_operation(row: &SqliteRow) -> Result<CashOperation> {
        let id_str: String = row.get("id");
        let op_type_str: String = row.get("op_type");
        let direction_str: Option<String> = row.get("direction");

        Ok(CashOperation {
            id: Uuid::parse_str(&id_str).context("Invalid operation ID")?,
            sequence: row.get("sequence"),
            op_type: OperationType::from_str(&op_type_str)
                .ok_or_else(|| anyhow::anyhow!("Invalid operation type: {}", op_type_str))?,
            direction: direction_str
                .map(|s| {
                    AdjustmentDirection::from_str(&s)
                        .ok_or_else(|| anyhow::anyhow!("Invalid adjustment direction: {}", s))
                })
                .transpose()?,
            amount_cents: row.get("amount_cents"),
            currency: row.get("currency"),
            timestamp: parse_timestamp(row.get("timestamp")).context("Invalid timestamp")?,
            performed_by: row.get("performed_by"),
            description: row.get("description"),
            reference: row.get("reference"),
        })
    }
}

async fn insert_operation(
    conn: &mut SqliteConnection,
    register_id: RegisterId,
    op: &CashOperation,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO cash_operations (id, register_id, sequence, op_type, direction, amount_cents, currency, timestamp, performed_by, description, reference)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(op.id.to_string())
    .bind(register_id.to_string())
    .bind(op.sequence)
    .bind(op.op_type.as_str())
    .bind(op.direction.map(|d| d.as_str()))
    .bind(op.amount_cents)
    .bind(&op.currency)
    .bind(op.timestamp.to_rfc3339())
    .bind(&op.performed_by)
    .bind(&op.description)
    .bind(&op.reference)
    .execute(&mut *conn)
    .await
    .with_context(|| format!("Failed to save operation #{}", op.sequence))?;
    Ok(())
}

async fn upsert_balance(
    conn: &mut SqliteConnection,
    register_id: RegisterId,
    balance: &CashBalance,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO cash_balances (register_id, currency, amount_cents, last_updated)
        VALUES (?, ?, ?, ?)
        ON CONFLICT (register_id, currency)
        DO UPDATE SET amount_cents = excluded.amount_cents, last_updated = excluded.last_updated
        "#,
    )
    .bind(register_id.to_string())
    .bind(&balance.currency)
    .bind(balance.amount_cents)
    .bind(balance.last_updated.to_rfc3339())
    .execute(&mut *conn)
    .await
    .with_context(|| format!("Failed to save {} balance", balance.currency))?;
    Ok(())
}

fn parse_timestamp(s: String) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(&s)?.with_timezone(&Utc))
}
