use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use utoipa::{IntoParams, ToSchema};

use crate::payroll::calc::{AllowancePolicy, PayComponents, PayPeriodCalculation};

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
    ToSchema,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Failed,
}

/// One payroll entry as submitted by the entry form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PayrollEntry {
    #[schema(example = 1001)]
    pub employee_id: u64,

    #[schema(example = "John Doe")]
    pub employee_name: String,

    /// Any day of the month being paid; stored as the first of that month.
    #[schema(example = "2026-01-01", value_type = String, format = "date")]
    pub pay_period: NaiveDate,

    #[schema(example = "2026-01-31", value_type = String, format = "date")]
    pub payment_date: NaiveDate,

    pub components: PayComponents,
}

impl PayrollEntry {
    pub fn normalized(mut self) -> Self {
        self.employee_name = self.employee_name.trim().to_string();
        self.pay_period = first_of_month(self.pay_period);
        for item in self
            .components
            .custom_earnings
            .iter_mut()
            .chain(self.components.custom_deductions.iter_mut())
        {
            item.name = item.name.trim().to_string();
        }
        self
    }
}

pub fn first_of_month(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

/// Header row of `payment_records`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PaymentRecord {
    #[schema(example = 1)]
    pub id: u64,
    #[schema(example = 1001)]
    pub employee_id: u64,
    #[schema(example = "John Doe")]
    pub employee_name: String,
    #[schema(example = "2026-01-01", value_type = String, format = "date")]
    pub pay_period: NaiveDate,
    #[schema(example = "2026-01-31", value_type = String, format = "date")]
    pub payment_date: NaiveDate,
    /// Net pay for the period.
    #[schema(example = 68571.43)]
    pub payment_amount: f64,
    pub status: PaymentStatus,
    #[schema(example = "2026-01-31T00:00:00Z", format = "date-time", value_type = String)]
    pub created_at: DateTime<Utc>,
}

/// A payment header together with the components rehydrated from its
/// earnings, deductions and custom-item rows.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct StoredPayroll {
    pub record: PaymentRecord,
    pub components: PayComponents,
    /// Allowance split in force when the entry was saved. Figures for a saved
    /// entry are always recomputed under this policy, not the current one.
    pub policy: AllowancePolicy,
}

impl StoredPayroll {
    /// True when this row holds exactly what `entry` would have written.
    pub fn holds(&self, entry: &PayrollEntry) -> bool {
        self.record.employee_id == entry.employee_id
            && self.record.employee_name == entry.employee_name
            && self.record.pay_period == entry.pay_period
            && self.record.payment_date == entry.payment_date
            && self.components == entry.components
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct PayrollDetail {
    pub record: PaymentRecord,
    pub components: PayComponents,
    pub calculation: PayPeriodCalculation,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Deserialize, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct PaymentFilter {
    #[schema(example = 1001)]
    /// Filter by employee ID
    pub employee_id: Option<u64>,
    /// Filter by payment status
    pub status: Option<PaymentStatus>,
    #[schema(example = "2026-01-01", value_type = Option<String>, format = "date")]
    /// Earliest pay period (inclusive)
    pub period_from: Option<NaiveDate>,
    #[schema(example = "2026-12-01", value_type = Option<String>, format = "date")]
    /// Latest pay period (inclusive)
    pub period_to: Option<NaiveDate>,
    #[schema(example = 1)]
    /// Pagination page number (start with 1)
    pub page: Option<u32>,
    #[schema(example = 10)]
    /// Items per page
    pub per_page: Option<u32>,
}

impl PaymentFilter {
    /// Resolves paging defaults so equivalent queries share one cache key.
    pub fn normalized(mut self) -> Self {
        self.page = Some(self.page.unwrap_or(1).max(1));
        self.per_page = Some(self.per_page.unwrap_or(10).clamp(1, 100));
        self.period_from = self.period_from.map(first_of_month);
        self.period_to = self.period_to.map(first_of_month);
        self
    }

    /// `(page, per_page, offset)`
    pub fn paging(&self) -> (u32, u32, u64) {
        let page = self.page.unwrap_or(1).max(1);
        let per_page = self.per_page.unwrap_or(10).clamp(1, 100);
        let offset = u64::from(page - 1) * u64::from(per_page);
        (page, per_page, offset)
    }

    pub fn matches(&self, record: &PaymentRecord) -> bool {
        self.employee_id.is_none_or(|id| id == record.employee_id)
            && self.status.is_none_or(|status| status == record.status)
            && self.period_from.is_none_or(|from| record.pay_period >= from)
            && self.period_to.is_none_or(|to| record.pay_period <= to)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct PaymentPage {
    pub data: Vec<PaymentRecord>,
    #[schema(example = 1)]
    pub page: u32,
    #[schema(example = 10)]
    pub per_page: u32,
    #[schema(example = 1)]
    pub total: i64,
}
