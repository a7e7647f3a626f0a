use async_trait::async_trait;
use chrono::NaiveDate;
use derive_more::Display;

use crate::model::payroll::{
    PaymentFilter, PaymentPage, PaymentRecord, PaymentStatus, PayrollEntry, StoredPayroll,
};
use crate::payroll::calc::PayrollComputation;

#[cfg(test)]
pub mod memory;
pub mod mysql;

pub use mysql::MySqlPayrollStore;

#[derive(Debug, Display)]
pub enum StoreError {
    #[display(fmt = "payment record {} not found", _0)]
    NotFound(u64),

    #[display(fmt = "conflicting payroll entry: {}", _0)]
    Conflict(String),

    #[display(fmt = "payroll store timed out")]
    Timeout,

    #[display(fmt = "payroll store unavailable: {}", _0)]
    Unavailable(String),

    #[display(fmt = "corrupt payroll row: {}", _0)]
    Corrupt(String),

    #[display(fmt = "database error: {}", _0)]
    Database(sqlx::Error),
}

impl std::error::Error for StoreError {}

impl StoreError {
    /// Failures worth retrying; a rolled-back transaction left nothing behind.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Timeout | StoreError::Unavailable(_))
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut => StoreError::Timeout,
            sqlx::Error::Io(e) => StoreError::Unavailable(e.to_string()),
            sqlx::Error::PoolClosed => StoreError::Unavailable("connection pool closed".into()),
            sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some("23000") => {
                StoreError::Conflict(db_err.message().to_string())
            }
            other => StoreError::Database(other),
        }
    }
}

/// Persistence boundary for payroll entries. Every method that touches more
/// than one row must commit all of them or none.
#[async_trait]
pub trait PayrollStore: Send + Sync {
    async fn insert_payroll(
        &self,
        entry: &PayrollEntry,
        computation: &PayrollComputation,
    ) -> Result<StoredPayroll, StoreError>;

    async fn update_payroll(
        &self,
        id: u64,
        entry: &PayrollEntry,
        computation: &PayrollComputation,
    ) -> Result<StoredPayroll, StoreError>;

    async fn get_payroll(&self, id: u64) -> Result<Option<StoredPayroll>, StoreError>;

    /// The entry for one employee and pay period, if any.
    async fn find_payroll(
        &self,
        employee_id: u64,
        pay_period: NaiveDate,
    ) -> Result<Option<StoredPayroll>, StoreError>;

    async fn list_payments(&self, filter: &PaymentFilter) -> Result<PaymentPage, StoreError>;

    async fn set_status(
        &self,
        id: u64,
        status: PaymentStatus,
    ) -> Result<Option<PaymentRecord>, StoreError>;
}
