use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::Write;

use crate::application::RegisterService;
use crate::domain::{CashRegister, RegisterId};

/// Database snapshot for full export
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSnapshot {
    pub version: String,
    pub exported_at: DateTime<Utc>,
    pub registers: Vec<CashRegister>,
}

/// Exporter for converting register data to CSV and JSON
pub struct Exporter<'a> {
    service: &'a RegisterService,
}

impl<'a> Exporter<'a> {
    pub fn new(service: &'a RegisterService) -> Self {
        Self { service }
    }

    async fn register(&self, register_id: Option<RegisterId>) -> Result<CashRegister> {
        Ok(match register_id {
            Some(id) => self.service.get_register(id).await?,
            None => self.service.current_register().await?,
        })
    }

    /// Export a register's operation log to CSV, oldest first
    pub async fn export_operations_csv<W: Write>(
        &self,
        writer: W,
        register_id: Option<RegisterId>,
    ) -> Result<usize> {
        let register = self.register(register_id).await?;
        let mut csv_writer = csv::Writer::from_writer(writer);

        csv_writer.write_record([
            "id",
            "sequence",
            "timestamp",
            "type",
            "direction",
            "currency",
            "amount_cents",
            "performed_by",
            "description",
            "reference",
        ])?;

        let mut count = 0;
        for op in register.operations.iter().rev() {
            csv_writer.write_record([
                op.id.to_string(),
                op.sequence.to_string(),
                op.timestamp.to_rfc3339(),
                op.op_type.as_str().to_string(),
                op.direction
                    .map(|d| d.as_str().to_string())
                    .unwrap_or_default(),
                op.currency.clone(),
                op.amount_cents.to_string(),
                op.performed_by.clone(),
                op.description.clone(),
                op.reference.clone().unwrap_or_default(),
            ])?;
            count += 1;
        }

        csv_writer.flush()?;
        Ok(count)
    }

    /// Export a register's balances to CSV
    pub async fn export_balances_csv<W: Write>(
        &self,
        writer: W,
        register_id: Option<RegisterId>,
    ) -> Result<usize> {
        let register = self.register(register_id).await?;
        let mut csv_writer = csv::Writer::from_writer(writer);

        csv_writer.write_record(["currency", "amount_cents", "last_updated"])?;

        let mut count = 0;
        for balance in register.balances.values() {
            csv_writer.write_record([
                balance.currency.clone(),
                balance.amount_cents.to_string(),
                balance.last_updated.to_rfc3339(),
            ])?;
            count += 1;
        }

        csv_writer.flush()?;
        Ok(count)
    }

    /// Export every register session as a JSON snapshot
    pub async fn export_full_json<W: Write>(&self, mut writer: W) -> Result<DatabaseSnapshot> {
        let registers = self.service.list_registers().await?;

        let snapshot = DatabaseSnapshot {
            version: env!("CARGO_PKG_VERSION").to_string(),
            exported_at: Utc::now(),
            registers,
        };

        let json = serde_json::to_string_pretty(&snapshot)?;
        writer.write_all(json.as_bytes())?;
        writer.flush()?;

        Ok(snapshot)
    }
}
