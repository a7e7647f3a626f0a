pub mod calc;
pub mod payslip;
pub mod validation;
