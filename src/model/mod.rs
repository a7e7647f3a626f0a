pub mod payroll;
pub mod role;
