//! Payslip rendering for a saved payroll entry.

use chrono::NaiveDate;
use serde::Serialize;
use std::fmt::Write;
use utoipa::ToSchema;

use crate::model::payroll::{PaymentStatus, StoredPayroll};
use crate::payroll::calc::PayrollComputation;

const WIDTH: usize = 50;
const LABEL_WIDTH: usize = 34;

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct PayslipLine {
    #[schema(example = "Basic")]
    pub label: String,
    #[schema(example = 34285.71)]
    pub amount: f64,
}

impl PayslipLine {
    fn new(label: impl Into<String>, amount: f64) -> Self {
        Self {
            label: label.into(),
            amount,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct Payslip {
    pub payment_id: u64,
    pub employee_id: u64,
    pub employee_name: String,
    #[schema(example = "2026-01-01", value_type = String, format = "date")]
    pub pay_period: NaiveDate,
    #[schema(example = "2026-01-31", value_type = String, format = "date")]
    pub payment_date: NaiveDate,
    pub status: PaymentStatus,
    pub paid_days: i32,
    pub lop_days: i32,
    /// Already taken out of the standard earnings below.
    pub lop_deduction: f64,
    pub earnings: Vec<PayslipLine>,
    pub deductions: Vec<PayslipLine>,
    pub gross_earnings: f64,
    pub total_deductions: f64,
    pub net_pay: f64,
    #[schema(example = "Rupees Sixty Eight Thousand Five Hundred Seventy One and Forty Three Paise Only")]
    pub net_pay_in_words: String,
}

impl Payslip {
    pub fn new(stored: &StoredPayroll, computation: &PayrollComputation) -> Self {
        let components = &stored.components;
        let adjusted = &computation.proration.adjusted;
        let totals = &computation.totals;

        let mut earnings = vec![
            PayslipLine::new("Basic", adjusted.basic),
            PayslipLine::new("House Rent Allowance", adjusted.hra),
            PayslipLine::new("Conveyance Allowance", adjusted.conveyance),
            PayslipLine::new("Fixed Allowance", adjusted.fixed),
        ];
        earnings.extend(
            components
                .custom_earnings
                .iter()
                .map(|item| PayslipLine::new(item.name.clone(), item.amount)),
        );

        let fixed = &components.fixed_deductions;
        let mut deductions = vec![
            PayslipLine::new("EPF", fixed.epf),
            PayslipLine::new("Income Tax", fixed.income_tax),
            PayslipLine::new("Professional Tax", fixed.professional_tax),
            PayslipLine::new("Loan Deduction", fixed.loan_deduction),
        ];
        deductions.extend(
            components
                .custom_deductions
                .iter()
                .map(|item| PayslipLine::new(item.name.clone(), item.amount)),
        );

        Self {
            payment_id: stored.record.id,
            employee_id: stored.record.employee_id,
            employee_name: stored.record.employee_name.clone(),
            pay_period: stored.record.pay_period,
            payment_date: stored.record.payment_date,
            status: stored.record.status,
            paid_days: components.paid_days,
            lop_days: components.lop_days,
            lop_deduction: computation.proration.lop_deduction,
            earnings,
            deductions,
            gross_earnings: totals.gross_earnings,
            total_deductions: totals.total_deductions,
            net_pay: totals.net_pay,
            net_pay_in_words: amount_in_words(totals.net_pay),
        }
    }

    pub fn render_text(&self) -> String {
        let heavy = "=".repeat(WIDTH);
        let light = "-".repeat(WIDTH);
        let mut out = String::new();

        // Writing into a String cannot fail.
        let _ = writeln!(out, "{heavy}");
        let _ = writeln!(
            out,
            "PAYSLIP FOR {}",
            self.pay_period.format("%B %Y").to_string().to_uppercase()
        );
        let _ = writeln!(out, "{heavy}");
        let _ = writeln!(out, "Employee   : {} (#{})", self.employee_name, self.employee_id);
        let _ = writeln!(out, "Payment ID : {}", self.payment_id);
        let _ = writeln!(out, "Pay date   : {}", self.payment_date);
        let _ = writeln!(out, "Status     : {}", self.status);
        let _ = writeln!(out, "Paid days  : {}", self.paid_days);
        let _ = writeln!(out, "LOP days   : {}", self.lop_days);

        let _ = writeln!(out, "{light}");
        let _ = writeln!(out, "{:<LABEL_WIDTH$}{:>16}", "EARNINGS", "AMOUNT");
        for line in &self.earnings {
            let _ = writeln!(out, "{}", amount_row(&line.label, line.amount));
        }
        let _ = writeln!(out, "{}", amount_row("Gross Earnings", self.gross_earnings));
        if self.lop_deduction > 0.0 {
            let _ = writeln!(out, "{}", amount_row("(LOP already deducted)", self.lop_deduction));
        }

        let _ = writeln!(out, "{light}");
        let _ = writeln!(out, "{:<LABEL_WIDTH$}{:>16}", "DEDUCTIONS", "AMOUNT");
        for line in &self.deductions {
            let _ = writeln!(out, "{}", amount_row(&line.label, line.amount));
        }
        let _ = writeln!(out, "{}", amount_row("Total Deductions", self.total_deductions));

        let _ = writeln!(out, "{heavy}");
        let _ = writeln!(out, "{}", amount_row("NET PAY", self.net_pay));
        let _ = writeln!(out, "{}", self.net_pay_in_words);
        let _ = writeln!(out, "{heavy}");
        out
    }
}

fn amount_row(label: &str, amount: f64) -> String {
    format!("{label:<LABEL_WIDTH$}{amount:>16.2}")
}

const ONES: [&str; 20] = [
    "Zero", "One", "Two", "Three", "Four", "Five", "Six", "Seven", "Eight", "Nine", "Ten",
    "Eleven", "Twelve", "Thirteen", "Fourteen", "Fifteen", "Sixteen", "Seventeen", "Eighteen",
    "Nineteen",
];

const TENS: [&str; 10] = [
    "", "", "Twenty", "Thirty", "Forty", "Fifty", "Sixty", "Seventy", "Eighty", "Ninety",
];

fn below_hundred(n: u64) -> String {
    let n = n as usize;
    if n < 20 {
        return ONES[n].to_string();
    }
    match n % 10 {
        0 => TENS[n / 10].to_string(),
        unit => format!("{} {}", TENS[n / 10], ONES[unit]),
    }
}

fn below_thousand(n: u64) -> String {
    let hundreds = n / 100;
    let rest = n % 100;
    match (hundreds, rest) {
        (0, rest) => below_hundred(rest),
        (h, 0) => format!("{} Hundred", ONES[h as usize]),
        (h, rest) => format!("{} Hundred {}", ONES[h as usize], below_hundred(rest)),
    }
}

/// Indian grouping: crore (10^7), lakh (10^5), thousand.
fn integer_words(n: u64) -> String {
    if n == 0 {
        return ONES[0].to_string();
    }

    let mut parts = Vec::new();
    let crore = n / 10_000_000;
    let rest = n % 10_000_000;
    if crore > 0 {
        parts.push(format!("{} Crore", integer_words(crore)));
    }

    let lakh = rest / 100_000;
    let thousand = (rest % 100_000) / 1_000;
    let remainder = rest % 1_000;
    if lakh > 0 {
        parts.push(format!("{} Lakh", below_hundred(lakh)));
    }
    if thousand > 0 {
        parts.push(format!("{} Thousand", below_hundred(thousand)));
    }
    if remainder > 0 {
        parts.push(below_thousand(remainder));
    }
    parts.join(" ")
}

/// Spells out a rupee amount, rounded to the paisa.
pub fn amount_in_words(amount: f64) -> String {
    if !amount.is_finite() {
        return String::new();
    }

    let total_paise = (amount.abs() * 100.0).round() as u64;
    let rupees = total_paise / 100;
    let paise = total_paise % 100;

    let mut words = String::new();
    if amount < 0.0 && total_paise > 0 {
        words.push_str("Minus ");
    }
    words.push_str("Rupees ");
    words.push_str(&integer_words(rupees));
    if paise > 0 {
        words.push_str(" and ");
        words.push_str(&below_hundred(paise));
        words.push_str(" Paise");
    }
    words.push_str(" Only");
    words
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::payroll::PaymentRecord;
    use crate::payroll::calc::{
        AllowancePolicy, FixedDeductions, LineItem, PayComponents, SalaryBasis,
    };
    use chrono::{TimeZone, Utc};

    fn stored(lop_days: i32) -> StoredPayroll {
        StoredPayroll {
            record: PaymentRecord {
                id: 9,
                employee_id: 1001,
                employee_name: "Asha Rao".into(),
                pay_period: NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
                payment_date: NaiveDate::from_ymd_opt(2026, 1, 31).unwrap(),
                payment_amount: 0.0,
                status: PaymentStatus::Paid,
                created_at: Utc.with_ymd_and_hms(2026, 1, 31, 0, 0, 0).unwrap(),
            },
            components: PayComponents {
                salary_basis: SalaryBasis::Ctc {
                    annual_ctc: "1200000".into(),
                    basic_percent: "40".into(),
                },
                custom_earnings: vec![LineItem::new("Night shift", 1_500.0)],
                custom_deductions: vec![LineItem::new("Canteen", 250.0)],
                fixed_deductions: FixedDeductions {
                    epf: 1_800.0,
                    income_tax: 2_000.0,
                    professional_tax: 200.0,
                    loan_deduction: 0.0,
                },
                paid_days: 30,
                lop_days,
            },
            policy: AllowancePolicy::default(),
        }
    }

    fn payslip(lop_days: i32) -> Payslip {
        let stored = stored(lop_days);
        let computation = stored.components.finalize(&stored.policy).unwrap();
        Payslip::new(&stored, &computation)
    }

    #[test]
    fn words_use_indian_grouping() {
        assert_eq!(amount_in_words(0.0), "Rupees Zero Only");
        assert_eq!(amount_in_words(40_000.0), "Rupees Forty Thousand Only");
        assert_eq!(
            amount_in_words(1_234_567.5),
            "Rupees Twelve Lakh Thirty Four Thousand Five Hundred Sixty Seven and Fifty Paise Only"
        );
        assert_eq!(amount_in_words(100_000_000.0), "Rupees Ten Crore Only");
        assert_eq!(amount_in_words(101.05), "Rupees One Hundred One and Five Paise Only");
        assert_eq!(amount_in_words(-19.0), "Minus Rupees Nineteen Only");
    }

    #[test]
    fn lines_follow_entry_order() {
        let slip = payslip(0);
        let labels: Vec<_> = slip.earnings.iter().map(|l| l.label.as_str()).collect();
        assert_eq!(
            labels,
            [
                "Basic",
                "House Rent Allowance",
                "Conveyance Allowance",
                "Fixed Allowance",
                "Night shift"
            ]
        );
        assert_eq!(slip.deductions.last().unwrap().label, "Canteen");
        assert_eq!(slip.gross_earnings, 81_500.0);
        assert_eq!(slip.total_deductions, 4_250.0);
        assert_eq!(slip.net_pay, 77_250.0);
        assert_eq!(
            slip.net_pay_in_words,
            "Rupees Seventy Seven Thousand Two Hundred Fifty Only"
        );
    }

    #[test]
    fn lines_add_up_to_totals() {
        let slip = payslip(5);
        let earned: f64 = slip.earnings.iter().map(|l| l.amount).sum();
        let deducted: f64 = slip.deductions.iter().map(|l| l.amount).sum();
        assert!((earned - slip.gross_earnings).abs() < 1e-6);
        assert!((deducted - slip.total_deductions).abs() < 1e-6);
        assert!(slip.lop_deduction > 0.0);
    }

    #[test]
    fn text_rendering_contains_period_and_net_pay() {
        let text = payslip(5).render_text();
        assert!(text.contains("PAYSLIP FOR JANUARY 2026"));
        assert!(text.contains("Employee   : Asha Rao (#1001)"));
        assert!(text.contains("(LOP already deducted)"));
        assert!(text.lines().any(|l| l.starts_with("NET PAY") && l.ends_with("65821.43")));
    }
}
