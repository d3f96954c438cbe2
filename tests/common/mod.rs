// Allow dead_code because these helpers are used across different test files
// which are compiled separately
#![allow(dead_code)]

use anyhow::Result;
use tempfile::TempDir;
use tillbook::application::RegisterService;
use tillbook::domain::{CashRegister, Cents};

pub const TELLER: &str = "alice";

/// Helper to create a test service with a temporary database
pub async fn test_service() -> Result<(RegisterService, TempDir)> {
    let temp_dir = TempDir::new()?;
    let db_path = temp_dir.path().join("test.db");
    let service = RegisterService::init(db_path.to_str().unwrap()).await?;
    Ok((service, temp_dir))
}

/// Path of the database inside a test directory
pub fn db_path(temp_dir: &TempDir) -> String {
    temp_dir.path().join("test.db").to_str().unwrap().to_string()
}

pub fn float(entries: &[(&str, Cents)]) -> Vec<(String, Cents)> {
    entries.iter().map(|(c, a)| (c.to_string(), *a)).collect()
}

/// Open a register holding USD 3200.00 and EUR 1800.50
pub async fn open_standard(service: &RegisterService) -> Result<CashRegister> {
    let register = service
        .open_register(TELLER, &float(&[("USD", 320000), ("EUR", 180050)]))
        .await?;
    Ok(register)
}
