use chrono::Utc;
use tracing::{info, warn};

use crate::domain::{
    add_cash, build_integrity_report, parse_currency, reconcile_cash, remove_cash, CashAction,
    CashBalance, CashOperation, CashRegister, Cents, IntegrityReport, OperationContext,
    OperationId, OperationType, RegisterId, Transition,
};
use crate::storage::Repository;

use super::{build_summary, AppError, RegisterSummary};

/// Application service for the teller's cash register.
/// This is the primary interface for any client (CLI, tests, ...).
pub struct RegisterService {
    repo: Repository,
}

/// Result of a deposit or withdrawal
#[derive(Debug)]
pub struct OperationResult {
    pub operation: CashOperation,
    pub balance: Cents,
}

/// Result of reconciling a currency against a physical count
#[derive(Debug)]
pub struct ReconcileResult {
    pub currency: String,
    pub previous_balance: Cents,
    pub balance: Cents,
    /// `None` when the count matched the expected balance
    pub adjustment: Option<CashOperation>,
}

/// Detailed operation information
#[derive(Debug)]
pub struct OperationInfo {
    pub operation: CashOperation,
    pub register_id: RegisterId,
}

/// Filter for querying the current register's operations
#[derive(Debug, Default)]
pub struct OperationFilter {
    pub currency: Option<String>,
    pub op_type: Option<OperationType>,
    pub limit: Option<usize>,
}

impl RegisterService {
    /// Create a new register service with the given repository.
    pub fn new(repo: Repository) -> Self {
        Self { repo }
    }

    /// Initialize a new database at the given path.
    pub async fn init(database_path: &str) -> Result<Self, AppError> {
        let db_url = format!("sqlite:{}?mode=rwc", database_path);
        let repo = Repository::init(&db_url).await?;
        Ok(Self::new(repo))
    }

    /// Connect to an existing database.
    pub async fn connect(database_path: &str) -> Result<Self, AppError> {
        let db_url = format!("sqlite:{}", database_path);
        let repo = Repository::connect(&db_url).await?;
        Ok(Self::new(repo))
    }

    // ========================
    // Session lifecycle
    // ========================

    /// Open a new register session with the given opening float.
    pub async fn open_register(
        &self,
        performed_by: &str,
        float: &[(String, Cents)],
    ) -> Result<CashRegister, AppError> {
        if let Some(open) = self.repo.get_open_register().await? {
            return Err(AppError::RegisterAlreadyOpen(open.id));
        }

        let ctx = OperationContext::new(performed_by, Utc::now());
        let register = CashRegister::open(float, &ctx)?;
        self.repo.save_new_register(&register).await?;

        info!(
            register_id = %register.id,
            performed_by,
            currencies = register.balances.len(),
            "register opened"
        );
        Ok(register)
    }

    /// Close the open register, freezing its balances.
    pub async fn close_register(&self, performed_by: &str) -> Result<CashRegister, AppError> {
        let register = self.current_register().await?;
        let ctx = OperationContext::new(performed_by, Utc::now());
        let transition = register.close(&ctx)?;
        self.repo
            .save_transition(&transition.register, &transition.operations)
            .await?;

        info!(register_id = %register.id, performed_by, "register closed");
        Ok(transition.register)
    }

    /// Get the open register.
    pub async fn current_register(&self) -> Result<CashRegister, AppError> {
        self.repo
            .get_open_register()
            .await?
            .ok_or(AppError::NoOpenRegister)
    }

    /// Get any register, open or closed.
    pub async fn get_register(&self, id: RegisterId) -> Result<CashRegister, AppError> {
        self.repo
            .get_register(id)
            .await?
            .ok_or_else(|| AppError::RegisterNotFound(id.to_string()))
    }

    /// List all register sessions, newest first.
    pub async fn list_registers(&self) -> Result<Vec<CashRegister>, AppError> {
        Ok(self.repo.list_registers().await?)
    }

    // ========================
    // Cash operations
    // ========================

    /// Record cash handed in at the counter.
    pub async fn add_cash(
        &self,
        amount_cents: Cents,
        currency: &str,
        description: &str,
        performed_by: &str,
        reference: Option<String>,
    ) -> Result<OperationResult, AppError> {
        let action = add_cash(amount_cents, currency, description);
        self.apply_movement(action, performed_by, reference).await
    }

    /// Record cash paid out at the counter.
    pub async fn remove_cash(
        &self,
        amount_cents: Cents,
        currency: &str,
        description: &str,
        performed_by: &str,
        reference: Option<String>,
    ) -> Result<OperationResult, AppError> {
        let action = remove_cash(amount_cents, currency, description);
        self.apply_movement(action, performed_by, reference).await
    }

    /// Set a currency's balance to the physically counted amount.
    pub async fn reconcile_cash(
        &self,
        counted_cents: Cents,
        currency: &str,
        performed_by: &str,
    ) -> Result<ReconcileResult, AppError> {
        let register = self.current_register().await?;
        let ctx = OperationContext::new(performed_by, Utc::now());
        let transition = self.apply(&register, &reconcile_cash(counted_cents, currency), &ctx)?;

        let adjustment = transition.operation().cloned();
        let currency = match &adjustment {
            Some(op) => op.currency.clone(),
            None => parse_currency(currency)?,
        };

        if adjustment.is_some() {
            self.repo
                .save_transition(&transition.register, &transition.operations)
                .await?;
        }

        let result = ReconcileResult {
            previous_balance: register.balance(&currency),
            balance: transition.register.balance(&currency),
            currency,
            adjustment,
        };
        info!(
            register_id = %register.id,
            currency = %result.currency,
            expected = result.previous_balance,
            counted = result.balance,
            adjusted = result.adjustment.is_some(),
            "cash reconciled"
        );
        Ok(result)
    }

    async fn apply_movement(
        &self,
        action: CashAction,
        performed_by: &str,
        reference: Option<String>,
    ) -> Result<OperationResult, AppError> {
        let register = self.current_register().await?;
        let mut ctx = OperationContext::new(performed_by, Utc::now());
        ctx.reference = reference;

        let transition = self.apply(&register, &action, &ctx)?;
        self.repo
            .save_transition(&transition.register, &transition.operations)
            .await?;

        let operation = transition
            .operation()
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("Cash movement recorded no operation"))?;
        let balance = transition.register.balance(&operation.currency);

        info!(
            register_id = %register.id,
            op_type = %operation.op_type,
            currency = %operation.currency,
            amount_cents = operation.amount_cents,
            balance,
            "cash operation applied"
        );
        Ok(OperationResult { operation, balance })
    }

    /// Run the pure transition, logging rejections.
    fn apply(
        &self,
        register: &CashRegister,
        action: &CashAction,
        ctx: &OperationContext,
    ) -> Result<Transition, AppError> {
        register.apply(action, ctx).map_err(|err| {
            warn!(register_id = %register.id, action = ?action, error = %err, "cash operation rejected");
            AppError::from(err)
        })
    }

    // ========================
    // Queries
    // ========================

    /// Get the open register's balance for one currency.
    pub async fn get_balance(&self, currency: &str) -> Result<CashBalance, AppError> {
        let register = self.current_register().await?;
        let currency = parse_currency(currency)?;
        Ok(register
            .balances
            .get(&currency)
            .cloned()
            .unwrap_or_else(|| CashBalance::new(&currency, 0, register.opened_at)))
    }

    /// Get all balances of the open register, ordered by currency.
    pub async fn get_balances(&self) -> Result<Vec<CashBalance>, AppError> {
        let register = self.current_register().await?;
        Ok(register.balances.into_values().collect())
    }

    /// List operations of the open register, newest first.
    pub async fn list_operations(
        &self,
        filter: OperationFilter,
    ) -> Result<Vec<CashOperation>, AppError> {
        let register = self.current_register().await?;
        let currency = filter.currency.as_deref().map(parse_currency).transpose()?;
        Ok(self
            .repo
            .list_operations_filtered(register.id, currency.as_deref(), filter.op_type, filter.limit)
            .await?)
    }

    /// Get an operation from any register.
    pub async fn get_operation(&self, id: OperationId) -> Result<OperationInfo, AppError> {
        let (register_id, operation) = self
            .repo
            .get_operation(id)
            .await?
            .ok_or(AppError::OperationNotFound(id))?;
        Ok(OperationInfo {
            operation,
            register_id,
        })
    }

    /// Summarise the open register, or the given one.
    pub async fn summary(&self, register_id: Option<RegisterId>) -> Result<RegisterSummary, AppError> {
        let register = match register_id {
            Some(id) => self.get_register(id).await?,
            None => self.current_register().await?,
        };
        Ok(build_summary(&register))
    }

    /// Check the open register, or the given one, against its operation log.
    pub async fn check_integrity(
        &self,
        register_id: Option<RegisterId>,
    ) -> Result<IntegrityReport, AppError> {
        let register = match register_id {
            Some(id) => self.get_register(id).await?,
            None => self.current_register().await?,
        };
        let report = build_integrity_report(&register);
        if !report.is_healthy() {
            warn!(register_id = %register.id, issues = report.issues.len(), "integrity check failed");
        }
        Ok(report)
    }
}
