use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::mysql::MySqlRow;
use sqlx::{Executor, MySql, MySqlPool, Row, Transaction};
use tracing::debug;

use super::{PayrollStore, StoreError};
use crate::model::payroll::{
    PaymentFilter, PaymentPage, PaymentRecord, PaymentStatus, PayrollEntry, StoredPayroll,
};
use crate::payroll::calc::{
    AllowancePolicy, FixedDeductions, LineItem, PayComponents, PayrollComputation, SalaryBasis,
};

const EARNING: &str = "earning";
const DEDUCTION: &str = "deduction";

const HEADER_COLUMNS: &str = "id, employee_id, employee_name, pay_period, payment_date, \
     payment_amount, status, created_at";

const SELECT_HEADER: &str = "SELECT id, employee_id, employee_name, pay_period, payment_date, \
     payment_amount, status, created_at FROM payment_records WHERE id = ?";

pub struct MySqlPayrollStore {
    pool: MySqlPool,
}

impl MySqlPayrollStore {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

// Helper enum for typed SQLx binding
#[derive(Debug, PartialEq)]
enum FilterValue<'a> {
    U64(u64),
    Str(&'a str),
    Date(NaiveDate),
}

fn filter_clause(filter: &PaymentFilter) -> (String, Vec<FilterValue<'_>>) {
    let mut where_sql = String::from(" WHERE 1=1");
    let mut args = Vec::new();

    if let Some(employee_id) = filter.employee_id {
        where_sql.push_str(" AND employee_id = ?");
        args.push(FilterValue::U64(employee_id));
    }
    if let Some(status) = filter.status.as_ref() {
        where_sql.push_str(" AND status = ?");
        args.push(FilterValue::Str(status.as_ref()));
    }
    if let Some(from) = filter.period_from {
        where_sql.push_str(" AND pay_period >= ?");
        args.push(FilterValue::Date(from));
    }
    if let Some(to) = filter.period_to {
        where_sql.push_str(" AND pay_period <= ?");
        args.push(FilterValue::Date(to));
    }

    (where_sql, args)
}

fn record_from_row(row: &MySqlRow) -> Result<PaymentRecord, StoreError> {
    let status: String = row.try_get("status")?;
    let status = status
        .parse::<PaymentStatus>()
        .map_err(|_| StoreError::Corrupt(format!("unknown payment status '{status}'")))?;

    Ok(PaymentRecord {
        id: row.try_get("id")?,
        employee_id: row.try_get("employee_id")?,
        employee_name: row.try_get("employee_name")?,
        pay_period: row.try_get("pay_period")?,
        payment_date: row.try_get("payment_date")?,
        payment_amount: row.try_get("payment_amount")?,
        status,
        created_at: row.try_get("created_at")?,
    })
}

fn basis_from_row(row: &MySqlRow) -> Result<SalaryBasis, StoreError> {
    let basis_type: String = row.try_get("basis_type")?;
    let text = |column: &str| -> Result<String, StoreError> {
        Ok(row
            .try_get::<Option<String>, _>(column)?
            .unwrap_or_default())
    };

    match basis_type.as_str() {
        "ctc" => Ok(SalaryBasis::Ctc {
            annual_ctc: text("annual_ctc")?,
            basic_percent: text("basic_percent")?,
        }),
        "hourly" => Ok(SalaryBasis::Hourly {
            hourly_rate: text("hourly_rate")?,
            hours_worked: text("hours_worked")?,
        }),
        other => Err(StoreError::Corrupt(format!("unknown salary basis '{other}'"))),
    }
}

async fn fetch_header<'c, E>(executor: E, id: u64) -> Result<Option<PaymentRecord>, StoreError>
where
    E: Executor<'c, Database = MySql>,
{
    let row = sqlx::query(SELECT_HEADER)
        .bind(id)
        .fetch_optional(executor)
        .await?;
    row.as_ref().map(record_from_row).transpose()
}

fn item_position(position: usize) -> Result<i32, StoreError> {
    i32::try_from(position)
        .map_err(|_| StoreError::Corrupt(format!("custom item position {position} out of range")))
}

/// Writes the earnings, deductions and custom-item rows for one payment.
async fn insert_detail_rows(
    tx: &mut Transaction<'_, MySql>,
    payment_id: u64,
    entry: &PayrollEntry,
    computation: &PayrollComputation,
) -> Result<(), StoreError> {
    let components = &entry.components;
    let adjusted = &computation.proration.adjusted;

    let (annual_ctc, basic_percent, hourly_rate, hours_worked) = match &components.salary_basis {
        SalaryBasis::Ctc {
            annual_ctc,
            basic_percent,
        } => (Some(annual_ctc.as_str()), Some(basic_percent.as_str()), None, None),
        SalaryBasis::Hourly {
            hourly_rate,
            hours_worked,
        } => (None, None, Some(hourly_rate.as_str()), Some(hours_worked.as_str())),
    };

    sqlx::query(
        r#"
        INSERT INTO employee_salary_earnings
            (payment_id, basis_type, annual_ctc, basic_percent, hourly_rate, hours_worked,
             hra_percent, conveyance_percent,
             basic_salary, hra, conveyance_allowance, fixed_allowance,
             lop_deduction, paid_days, lop_days, total_earnings)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(payment_id)
    .bind(components.salary_basis.kind())
    .bind(annual_ctc)
    .bind(basic_percent)
    .bind(hourly_rate)
    .bind(hours_worked)
    .bind(computation.policy.hra_percent)
    .bind(computation.policy.conveyance_percent)
    .bind(adjusted.basic)
    .bind(adjusted.hra)
    .bind(adjusted.conveyance)
    .bind(adjusted.fixed)
    .bind(computation.proration.lop_deduction)
    .bind(components.paid_days)
    .bind(components.lop_days)
    .bind(computation.totals.gross_earnings)
    .execute(&mut **tx)
    .await?;

    let deductions = &components.fixed_deductions;
    sqlx::query(
        r#"
        INSERT INTO employee_salary_deductions
            (payment_id, provident_fund, income_tax, professional_tax, loan_deduction, total_deductions)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(payment_id)
    .bind(deductions.epf)
    .bind(deductions.income_tax)
    .bind(deductions.professional_tax)
    .bind(deductions.loan_deduction)
    .bind(computation.totals.total_deductions)
    .execute(&mut **tx)
    .await?;

    let custom = components
        .custom_earnings
        .iter()
        .enumerate()
        .map(|(pos, item)| (EARNING, pos, item))
        .chain(
            components
                .custom_deductions
                .iter()
                .enumerate()
                .map(|(pos, item)| (DEDUCTION, pos, item)),
        );

    for (kind, position, item) in custom {
        sqlx::query(
            r#"
            INSERT INTO payment_custom_items (payment_id, kind, position, name, amount)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(payment_id)
        .bind(kind)
        .bind(item_position(position)?)
        .bind(&item.name)
        .bind(item.amount)
        .execute(&mut **tx)
        .await?;
    }

    Ok(())
}

#[async_trait]
impl PayrollStore for MySqlPayrollStore {
    async fn insert_payroll(
        &self,
        entry: &PayrollEntry,
        computation: &PayrollComputation,
    ) -> Result<StoredPayroll, StoreError> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            INSERT INTO payment_records
                (employee_id, employee_name, pay_period, payment_date, payment_amount, status)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(entry.employee_id)
        .bind(&entry.employee_name)
        .bind(entry.pay_period)
        .bind(entry.payment_date)
        .bind(computation.totals.net_pay)
        .bind(PaymentStatus::Pending.as_ref())
        .execute(&mut *tx)
        .await?;

        let payment_id = result.last_insert_id();
        insert_detail_rows(&mut tx, payment_id, entry, computation).await?;
        let record = fetch_header(&mut *tx, payment_id)
            .await?
            .ok_or(StoreError::NotFound(payment_id))?;
        tx.commit().await?;

        debug!(payment_id, "Payroll rows committed");

        Ok(StoredPayroll {
            record,
            components: entry.components.clone(),
            policy: computation.policy,
        })
    }

    async fn update_payroll(
        &self,
        id: u64,
        entry: &PayrollEntry,
        computation: &PayrollComputation,
    ) -> Result<StoredPayroll, StoreError> {
        let mut tx = self.pool.begin().await?;

        let exists = sqlx::query("SELECT id FROM payment_records WHERE id = ? FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;
        if exists.is_none() {
            return Err(StoreError::NotFound(id));
        }

        sqlx::query(
            r#"
            UPDATE payment_records
            SET employee_id = ?, employee_name = ?, pay_period = ?, payment_date = ?, payment_amount = ?
            WHERE id = ?
            "#,
        )
        .bind(entry.employee_id)
        .bind(&entry.employee_name)
        .bind(entry.pay_period)
        .bind(entry.payment_date)
        .bind(computation.totals.net_pay)
        .bind(id)
        .execute(&mut *tx)
        .await?;

        for table in [
            "employee_salary_earnings",
            "employee_salary_deductions",
            "payment_custom_items",
        ] {
            let sql = format!("DELETE FROM {table} WHERE payment_id = ?");
            sqlx::query(&sql).bind(id).execute(&mut *tx).await?;
        }

        insert_detail_rows(&mut tx, id, entry, computation).await?;
        let record = fetch_header(&mut *tx, id)
            .await?
            .ok_or(StoreError::NotFound(id))?;
        tx.commit().await?;

        debug!(payment_id = id, "Payroll rows replaced");

        Ok(StoredPayroll {
            record,
            components: entry.components.clone(),
            policy: computation.policy,
        })
    }

    async fn get_payroll(&self, id: u64) -> Result<Option<StoredPayroll>, StoreError> {
        let Some(record) = fetch_header(&self.pool, id).await? else {
            return Ok(None);
        };

        let earnings = sqlx::query(
            r#"
            SELECT basis_type, annual_ctc, basic_percent, hourly_rate, hours_worked,
                   hra_percent, conveyance_percent, paid_days, lop_days
            FROM employee_salary_earnings
            WHERE payment_id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::Corrupt(format!("payment {id} has no earnings row")))?;

        let deductions = sqlx::query(
            r#"
            SELECT provident_fund, income_tax, professional_tax, loan_deduction
            FROM employee_salary_deductions
            WHERE payment_id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::Corrupt(format!("payment {id} has no deductions row")))?;

        let items = sqlx::query(
            r#"
            SELECT kind, name, amount
            FROM payment_custom_items
            WHERE payment_id = ?
            ORDER BY kind, position
            "#,
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        let mut custom_earnings = Vec::new();
        let mut custom_deductions = Vec::new();
        for row in &items {
            let kind: String = row.try_get("kind")?;
            let item = LineItem::new(row.try_get::<String, _>("name")?, row.try_get("amount")?);
            match kind.as_str() {
                EARNING => custom_earnings.push(item),
                DEDUCTION => custom_deductions.push(item),
                other => {
                    return Err(StoreError::Corrupt(format!(
                        "unknown custom item kind '{other}'"
                    )));
                }
            }
        }

        let components = PayComponents {
            salary_basis: basis_from_row(&earnings)?,
            custom_earnings,
            custom_deductions,
            fixed_deductions: FixedDeductions {
                epf: deductions.try_get("provident_fund")?,
                income_tax: deductions.try_get("income_tax")?,
                professional_tax: deductions.try_get("professional_tax")?,
                loan_deduction: deductions.try_get("loan_deduction")?,
            },
            paid_days: earnings.try_get("paid_days")?,
            lop_days: earnings.try_get("lop_days")?,
        };
        let policy = AllowancePolicy {
            hra_percent: earnings.try_get("hra_percent")?,
            conveyance_percent: earnings.try_get("conveyance_percent")?,
        };

        Ok(Some(StoredPayroll {
            record,
            components,
            policy,
        }))
    }

    async fn find_payroll(
        &self,
        employee_id: u64,
        pay_period: NaiveDate,
    ) -> Result<Option<StoredPayroll>, StoreError> {
        let id = sqlx::query_scalar::<_, u64>(
            "SELECT id FROM payment_records WHERE employee_id = ? AND pay_period = ?",
        )
        .bind(employee_id)
        .bind(pay_period)
        .fetch_optional(&self.pool)
        .await?;

        match id {
            Some(id) => self.get_payroll(id).await,
            None => Ok(None),
        }
    }

    async fn list_payments(&self, filter: &PaymentFilter) -> Result<PaymentPage, StoreError> {
        let (page, per_page, offset) = filter.paging();
        let (where_sql, args) = filter_clause(filter);

        let count_sql = format!("SELECT COUNT(*) FROM payment_records{where_sql}");
        let mut count_q = sqlx::query_scalar::<_, i64>(&count_sql);
        for arg in &args {
            count_q = match arg {
                FilterValue::U64(v) => count_q.bind(*v),
                FilterValue::Str(s) => count_q.bind(*s),
                FilterValue::Date(d) => count_q.bind(*d),
            };
        }
        let total = count_q.fetch_one(&self.pool).await?;

        let data_sql = format!(
            "SELECT {HEADER_COLUMNS} FROM payment_records{where_sql} \
             ORDER BY pay_period DESC, id DESC LIMIT ? OFFSET ?"
        );
        debug!(sql = %data_sql, page, per_page, "Fetching payment records");

        let mut data_q = sqlx::query(&data_sql);
        for arg in args {
            data_q = match arg {
                FilterValue::U64(v) => data_q.bind(v),
                FilterValue::Str(s) => data_q.bind(s),
                FilterValue::Date(d) => data_q.bind(d),
            };
        }

        let rows = data_q
            .bind(u64::from(per_page))
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;

        let data = rows
            .iter()
            .map(record_from_row)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(PaymentPage {
            data,
            page,
            per_page,
            total,
        })
    }

    async fn set_status(
        &self,
        id: u64,
        status: PaymentStatus,
    ) -> Result<Option<PaymentRecord>, StoreError> {
        sqlx::query("UPDATE payment_records SET status = ? WHERE id = ?")
            .bind(status.as_ref())
            .bind(id)
            .execute(&self.pool)
            .await?;

        fetch_header(&self.pool, id).await
    }
}
