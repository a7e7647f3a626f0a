//! Payroll arithmetic for one employee and one pay period.
//!
//! Everything here is pure and permissive: inputs that cannot be computed yet
//! (blank or malformed form fields) come back as `None` so the entry form can
//! render them as empty cells. Save-time checks live in
//! [`crate::payroll::validation`].

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

const MONTHS_PER_YEAR: f64 = 12.0;

/// Share of basic pay granted as HRA and conveyance allowance. Whatever is left
/// of the basic after those two becomes the fixed allowance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct AllowancePolicy {
    #[schema(example = 50.0)]
    pub hra_percent: f64,
    #[schema(example = 10.0)]
    pub conveyance_percent: f64,
}

impl AllowancePolicy {
    /// Both shares finite and non-negative, and together no more than the basic.
    pub fn is_valid(&self) -> bool {
        let (hra, conveyance) = (self.hra_percent, self.conveyance_percent);
        hra.is_finite()
            && conveyance.is_finite()
            && hra >= 0.0
            && conveyance >= 0.0
            && hra + conveyance <= 100.0
    }
}

impl Default for AllowancePolicy {
    fn default() -> Self {
        Self {
            hra_percent: 50.0,
            conveyance_percent: 10.0,
        }
    }
}

/// How the monthly basic is derived. Values are kept as the raw form strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SalaryBasis {
    Ctc {
        #[schema(example = "1200000")]
        annual_ctc: String,
        #[schema(example = "40")]
        basic_percent: String,
    },
    Hourly {
        #[schema(example = "500")]
        hourly_rate: String,
        #[schema(example = "160")]
        hours_worked: String,
    },
}

impl SalaryBasis {
    pub fn basic_pay(&self) -> Option<f64> {
        match self {
            SalaryBasis::Ctc {
                annual_ctc,
                basic_percent,
            } => compute_basic_from_ctc(annual_ctc, basic_percent),
            SalaryBasis::Hourly {
                hourly_rate,
                hours_worked,
            } => compute_basic_from_hourly(hourly_rate, hours_worked),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            SalaryBasis::Ctc { .. } => "ctc",
            SalaryBasis::Hourly { .. } => "hourly",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize, ToSchema)]
pub struct Allowances {
    pub hra: f64,
    pub conveyance: f64,
    pub fixed: f64,
}

/// The four standard earning components.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize, ToSchema)]
pub struct StandardEarnings {
    #[schema(example = 40000.0)]
    pub basic: f64,
    #[schema(example = 20000.0)]
    pub hra: f64,
    #[schema(example = 4000.0)]
    pub conveyance: f64,
    #[schema(example = 16000.0)]
    pub fixed: f64,
}

impl StandardEarnings {
    pub fn from_basic(basic: f64, policy: &AllowancePolicy) -> Self {
        let allowances = compute_allowances(basic, policy);
        Self {
            basic,
            hra: allowances.hra,
            conveyance: allowances.conveyance,
            fixed: allowances.fixed,
        }
    }

    pub fn total(&self) -> f64 {
        self.basic + self.hra + self.conveyance + self.fixed
    }

    fn scaled_down(&self, deduction: f64) -> Self {
        let total = self.total();
        let share = |component: f64| component - deduction * (component / total);
        Self {
            basic: share(self.basic),
            hra: share(self.hra),
            conveyance: share(self.conveyance),
            fixed: share(self.fixed),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, ToSchema)]
pub struct LineItem {
    #[schema(example = "Performance bonus")]
    pub name: String,
    #[schema(example = 2500.0)]
    pub amount: f64,
}

impl LineItem {
    pub fn new(name: impl Into<String>, amount: f64) -> Self {
        Self {
            name: name.into(),
            amount,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct FixedDeductions {
    #[schema(example = 1800.0)]
    pub epf: f64,
    #[schema(example = 3000.0)]
    pub income_tax: f64,
    #[schema(example = 200.0)]
    pub professional_tax: f64,
    #[schema(example = 0.0)]
    pub loan_deduction: f64,
}

impl FixedDeductions {
    pub fn total(&self) -> f64 {
        self.epf + self.income_tax + self.professional_tax + self.loan_deduction
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct LopProration {
    pub adjusted: StandardEarnings,
    #[schema(example = 11428.57)]
    pub lop_deduction: f64,
}

/// Totals for one employee and period, computed from post-LOP earnings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PayPeriodResult {
    pub adjusted: StandardEarnings,
    pub custom_earnings_total: f64,
    pub statutory_deductions_total: f64,
    pub custom_deductions_total: f64,
    pub gross_earnings: f64,
    pub total_deductions: f64,
    pub net_pay: f64,
}

/// A complete computation, tagged with the allowance policy it was made under.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PayrollComputation {
    pub policy: AllowancePolicy,
    pub standard: StandardEarnings,
    pub proration: LopProration,
    pub totals: PayPeriodResult,
}

/// Live-preview output. Anything that cannot be computed yet is `null`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, ToSchema)]
pub struct PayPeriodCalculation {
    pub standard: Option<StandardEarnings>,
    pub adjusted: Option<StandardEarnings>,
    pub lop_deduction: Option<f64>,
    pub custom_earnings_total: f64,
    pub total_deductions: f64,
    pub gross_earnings: Option<f64>,
    pub net_pay: Option<f64>,
}

/// Everything the payroll entry form captures for one employee and period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PayComponents {
    pub salary_basis: SalaryBasis,
    #[serde(default)]
    pub custom_earnings: Vec<LineItem>,
    #[serde(default)]
    pub custom_deductions: Vec<LineItem>,
    #[serde(default)]
    pub fixed_deductions: FixedDeductions,
    #[schema(example = 30)]
    pub paid_days: i32,
    #[serde(default)]
    #[schema(example = 0)]
    pub lop_days: i32,
}

impl PayComponents {
    pub fn standard_earnings(&self, policy: &AllowancePolicy) -> Option<StandardEarnings> {
        self.salary_basis
            .basic_pay()
            .map(|basic| StandardEarnings::from_basic(basic, policy))
    }

    /// Recompute-on-change entry point: computes what it can.
    pub fn calculate(&self, policy: &AllowancePolicy) -> PayPeriodCalculation {
        let custom_earnings_total = sum_items(&self.custom_earnings);
        let total_deductions =
            self.fixed_deductions.total() + sum_items(&self.custom_deductions);

        match self.finalize(policy) {
            Some(computation) => PayPeriodCalculation {
                standard: Some(computation.standard),
                adjusted: Some(computation.proration.adjusted),
                lop_deduction: Some(computation.proration.lop_deduction),
                custom_earnings_total,
                total_deductions,
                gross_earnings: Some(computation.totals.gross_earnings),
                net_pay: Some(computation.totals.net_pay),
            },
            None => PayPeriodCalculation {
                custom_earnings_total,
                total_deductions,
                ..PayPeriodCalculation::default()
            },
        }
    }

    /// Full computation, or `None` while the salary basis is incomplete.
    pub fn finalize(&self, policy: &AllowancePolicy) -> Option<PayrollComputation> {
        let standard = self.standard_earnings(policy)?;
        let proration = apply_lop_proration(&standard, self.paid_days, self.lop_days);
        let totals = compute_totals(
            &proration.adjusted,
            &self.custom_earnings,
            &self.fixed_deductions,
            &self.custom_deductions,
        );
        Some(PayrollComputation {
            policy: *policy,
            standard,
            proration,
            totals,
        })
    }
}

/// Parses a form amount. Grouping commas are ignored; blanks, garbage and
/// non-finite values yield `None`.
pub fn parse_amount(input: &str) -> Option<f64> {
    let cleaned: String = input.trim().chars().filter(|c| *c != ',').collect();
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

fn parse_positive(input: &str) -> Option<f64> {
    parse_amount(input).filter(|v| *v > 0.0)
}

/// `(ctc / 12) * (basic_percent / 100)`.
pub fn compute_basic_from_ctc(ctc: &str, basic_percent: &str) -> Option<f64> {
    let ctc = parse_positive(ctc)?;
    let percent = parse_amount(basic_percent).filter(|p| (0.0..=100.0).contains(p))?;
    Some((ctc / MONTHS_PER_YEAR) * (percent / 100.0))
}

/// `hourly_rate * hours_worked`; hours must be a whole number.
pub fn compute_basic_from_hourly(hourly_rate: &str, hours_worked: &str) -> Option<f64> {
    let rate = parse_positive(hourly_rate)?;
    let hours: u32 = hours_worked.trim().parse().ok()?;
    Some(rate * f64::from(hours))
}

pub fn compute_allowances(basic_pay: f64, policy: &AllowancePolicy) -> Allowances {
    let hra = basic_pay * policy.hra_percent / 100.0;
    let conveyance = basic_pay * policy.conveyance_percent / 100.0;
    Allowances {
        hra,
        conveyance,
        fixed: basic_pay - (hra + conveyance),
    }
}

/// Spreads the loss-of-pay deduction over the standard components in
/// proportion to each component's share of the standard total.
pub fn apply_lop_proration(
    standard: &StandardEarnings,
    paid_days: i32,
    lop_days: i32,
) -> LopProration {
    let total = standard.total();
    if lop_days <= 0 || paid_days <= 0 || total == 0.0 {
        return LopProration {
            adjusted: *standard,
            lop_deduction: 0.0,
        };
    }

    let working_days = f64::from(paid_days) + f64::from(lop_days);
    let per_day_salary = total / working_days;
    let lop_deduction = per_day_salary * f64::from(lop_days);

    LopProration {
        adjusted: standard.scaled_down(lop_deduction),
        lop_deduction,
    }
}

pub fn compute_totals(
    adjusted: &StandardEarnings,
    custom_earnings: &[LineItem],
    fixed_deductions: &FixedDeductions,
    custom_deductions: &[LineItem],
) -> PayPeriodResult {
    let custom_earnings_total = sum_items(custom_earnings);
    let custom_deductions_total = sum_items(custom_deductions);
    let statutory_deductions_total = fixed_deductions.total();

    let gross_earnings = adjusted.total() + custom_earnings_total;
    let total_deductions = statutory_deductions_total + custom_deductions_total;

    PayPeriodResult {
        adjusted: *adjusted,
        custom_earnings_total,
        statutory_deductions_total,
        custom_deductions_total,
        gross_earnings,
        total_deductions,
        net_pay: gross_earnings - total_deductions,
    }
}

fn sum_items(items: &[LineItem]) -> f64 {
    items.iter().map(|item| item.amount).sum()
}
