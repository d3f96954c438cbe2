use thiserror::Error;

use crate::domain::{OperationId, RegisterError, RegisterId};

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Register(#[from] RegisterError),

    #[error("No register is open. Open one with `tillbook open`")]
    NoOpenRegister,

    #[error("Register {0} is already open; close it before opening a new one")]
    RegisterAlreadyOpen(RegisterId),

    #[error("Register not found: {0}")]
    RegisterNotFound(String),

    #[error("Operation not found: {0}")]
    OperationNotFound(OperationId),

    #[error("Database error: {0}")]
    Database(#[from] anyhow::Error),
}
