use crate::api::payroll::{PayslipFormat, UpdatePaymentStatus};
use crate::model::payroll::{
    PaymentPage, PaymentRecord, PaymentStatus, PayrollDetail, PayrollEntry, StoredPayroll,
};
use crate::payroll::calc::{
    AllowancePolicy, FixedDeductions, LineItem, LopProration, PayComponents, PayPeriodCalculation,
    PayPeriodResult, PayrollComputation, SalaryBasis, StandardEarnings,
};
use crate::payroll::payslip::{Payslip, PayslipLine};
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Payroll Service API",
        version = "1.0.0",
        description = r#"
## Payroll entry and payslips

Payroll for the HR line-of-business application.

### Key Features
- **Live calculation**
  - CTC or hourly basic, HRA / conveyance / fixed allowances, LOP proration
- **Payroll entry**
  - Create and edit entries; header, earnings, deductions and custom lines are saved atomically
- **Payments**
  - Filtered, paginated listing and status changes
- **Payslips**
  - JSON or plain text, with net pay in words

### Security
Every endpoint needs a **JWT Bearer** access token. Payroll entry is limited to
**Admin** and **HR**; employees may read their own payslips.

---
Built with **Rust**, **Actix Web**, **SQLx**, and **Utoipa**.
"#,
    ),
    paths(
        crate::api::payroll::calculate_payroll,
        crate::api::payroll::create_payroll,
        crate::api::payroll::update_payroll,
        crate::api::payroll::get_payroll,
        crate::api::payroll::list_payrolls,
        crate::api::payroll::update_payment_status,
        crate::api::payroll::get_payslip
    ),
    components(
        schemas(
            AllowancePolicy,
            SalaryBasis,
            LineItem,
            FixedDeductions,
            StandardEarnings,
            LopProration,
            PayComponents,
            PayPeriodCalculation,
            PayPeriodResult,
            PayrollComputation,
            PayrollEntry,
            PaymentStatus,
            PaymentRecord,
            StoredPayroll,
            PayrollDetail,
            PaymentPage,
            UpdatePaymentStatus,
            PayslipFormat,
            PayslipLine,
            Payslip
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Payroll", description = "Payroll calculation, entry and payslip APIs"),
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}
