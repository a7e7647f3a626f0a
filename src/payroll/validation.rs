use crate::error::PayrollError;
use crate::payroll::calc::{
    AllowancePolicy, LineItem, PayComponents, PayrollComputation, SalaryBasis,
};

/// Save-time gate for a payroll entry. Returns the finished computation when
/// the entry may be persisted, or every problem found as one user-facing
/// validation error.
pub fn validate_for_save(
    components: &PayComponents,
    policy: &AllowancePolicy,
) -> Result<PayrollComputation, PayrollError> {
    let mut problems = Vec::new();

    if components.paid_days < 0 {
        problems.push("Paid days cannot be negative".to_string());
    }
    if components.lop_days < 0 {
        problems.push("LOP days cannot be negative".to_string());
    }
    if components.lop_days > components.paid_days {
        problems.push("LOP days cannot exceed paid days".to_string());
    }

    let deductions = &components.fixed_deductions;
    for (label, amount) in [
        ("EPF", deductions.epf),
        ("Income tax", deductions.income_tax),
        ("Professional tax", deductions.professional_tax),
        ("Loan deduction", deductions.loan_deduction),
    ] {
        if !amount.is_finite() || amount < 0.0 {
            problems.push(format!("{label} must be a non-negative amount"));
        }
    }

    check_line_items("earning", &components.custom_earnings, &mut problems);
    check_line_items("deduction", &components.custom_deductions, &mut problems);

    let computation = components.finalize(policy);
    if computation.is_none() {
        problems.push(salary_basis_problem(&components.salary_basis).to_string());
    }

    match computation {
        Some(computation) if problems.is_empty() => Ok(computation),
        _ => Err(PayrollError::Validation(problems.join("; "))),
    }
}

fn check_line_items(kind: &str, items: &[LineItem], problems: &mut Vec<String>) {
    for (index, item) in items.iter().enumerate() {
        if item.name.trim().is_empty() {
            problems.push(format!("Custom {kind} #{} needs a name", index + 1));
        }
        if !item.amount.is_finite() || item.amount < 0.0 {
            problems.push(format!(
                "Custom {kind} '{}' must be a non-negative amount",
                item.name.trim()
            ));
        }
    }
}

fn salary_basis_problem(basis: &SalaryBasis) -> &'static str {
    match basis {
        SalaryBasis::Ctc { .. } => {
            "Enter a positive annual CTC and a basic percentage between 0 and 100"
        }
        SalaryBasis::Hourly { .. } => {
            "Enter a positive hourly rate and a whole number of hours worked"
        }
    }
}
