use crate::error::PayrollError;
use crate::model::role::Role;
use actix_web::{FromRequest, HttpMessage, HttpRequest, dev::Payload};
use futures::future::{Ready, ready};

#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: u64,
    pub username: String,
    pub role: Role,

    /// Present only if this user is linked to an employee record
    pub employee_id: Option<u64>,
}

impl FromRequest for AuthUser {
    type Error = PayrollError;
    type Future = Ready<Result<Self, Self::Error>>;

    /// The auth middleware has already verified the token; this only picks up
    /// the user it stored on the request.
    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        match req.extensions().get::<AuthUser>() {
            Some(user) => ready(Ok(user.clone())),
            None => ready(Err(PayrollError::Unauthorized("Missing token".into()))),
        }
    }
}

impl AuthUser {
    pub fn require_hr_or_admin(&self) -> Result<(), PayrollError> {
        if self.is_hr_or_admin() {
            Ok(())
        } else {
            Err(PayrollError::Forbidden("HR/Admin only".into()))
        }
    }

    pub fn is_hr_or_admin(&self) -> bool {
        self.role.manages_payroll()
    }

    /// Returns true if the user is an employee
    pub fn is_employee(&self) -> bool {
        self.role == Role::Employee
    }

    /// HR/Admin may read any payroll record; employees only their own.
    pub fn require_payroll_reader(&self, employee_id: u64) -> Result<(), PayrollError> {
        if self.is_hr_or_admin() || (self.is_employee() && self.employee_id == Some(employee_id)) {
            Ok(())
        } else {
            Err(payslip_forbidden())
        }
    }

    /// Employees linked to an employee record may ask for payslips; which
    /// ones is checked against the record itself.
    pub fn require_payslip_access(&self) -> Result<(), PayrollError> {
        if self.is_hr_or_admin() || (self.is_employee() && self.employee_id.is_some()) {
            Ok(())
        } else {
            Err(payslip_forbidden())
        }
    }
}

pub fn payslip_forbidden() -> PayrollError {
    PayrollError::Forbidden("Not allowed to view this payslip".into())
}
