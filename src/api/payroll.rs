use actix_web::{HttpResponse, Responder, http::header::ContentType, web};
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};

use crate::auth::auth::{AuthUser, payslip_forbidden};
use crate::error::PayrollError;
use crate::model::payroll::{
    PaymentFilter, PaymentPage, PaymentRecord, PaymentStatus, PayrollDetail, PayrollEntry,
    StoredPayroll,
};
use crate::payroll::calc::{PayComponents, PayPeriodCalculation};
use crate::payroll::payslip::Payslip;
use crate::services::payroll::PayrollService;

#[derive(Deserialize, ToSchema)]
pub struct UpdatePaymentStatus {
    #[schema(example = "paid")]
    pub status: PaymentStatus,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum PayslipFormat {
    #[default]
    Json,
    Text,
}

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PayslipQuery {
    /// `json` (default) or `text`
    pub format: Option<PayslipFormat>,
}

/// Live recalculation while the entry form is being edited
#[utoipa::path(
    post,
    path = "/api/payroll/calculate",
    request_body = PayComponents,
    responses(
        (status = 200, description = "Figures that can be computed so far; the rest are null", body = PayPeriodCalculation),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden")
    ),
    security(("bearer_auth" = [])),
    tag = "Payroll"
)]
pub async fn calculate_payroll(
    auth: AuthUser,
    service: web::Data<PayrollService>,
    payload: web::Json<PayComponents>,
) -> actix_web::Result<impl Responder> {
    auth.require_hr_or_admin()?;

    Ok(HttpResponse::Ok().json(service.preview(&payload)))
}

#[utoipa::path(
    post,
    path = "/api/payroll",
    request_body = PayrollEntry,
    responses(
        (status = 201, description = "Payroll saved", body = StoredPayroll),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 409, description = "Entry already exists for the employee and period", body = Object, example = json!({
            "message": "A payroll entry already exists for this employee and pay period"
        })),
        (status = 422, description = "Validation failed", body = Object, example = json!({
            "message": "LOP days cannot exceed paid days"
        })),
        (status = 504, description = "Store did not respond in time")
    ),
    security(("bearer_auth" = [])),
    tag = "Payroll"
)]
pub async fn create_payroll(
    auth: AuthUser,
    service: web::Data<PayrollService>,
    payload: web::Json<PayrollEntry>,
) -> actix_web::Result<impl Responder> {
    auth.require_hr_or_admin()?;

    let stored = service.create(payload.into_inner()).await?;

    Ok(HttpResponse::Created().json(stored))
}

#[utoipa::path(
    put,
    path = "/api/payroll/{payment_id}",
    request_body = PayrollEntry,
    params(
        ("payment_id" = u64, Path, description = "Payment record ID")
    ),
    responses(
        (status = 200, description = "Payroll updated", body = StoredPayroll),
        (status = 404, description = "Payroll not found"),
        (status = 409, description = "Another entry exists for the employee and period"),
        (status = 422, description = "Validation failed")
    ),
    security(("bearer_auth" = [])),
    tag = "Payroll"
)]
pub async fn update_payroll(
    auth: AuthUser,
    service: web::Data<PayrollService>,
    path: web::Path<u64>,
    body: web::Json<PayrollEntry>,
) -> actix_web::Result<impl Responder> {
    auth.require_hr_or_admin()?;

    let payment_id = path.into_inner();
    let stored = service.update(payment_id, body.into_inner()).await?;

    Ok(HttpResponse::Ok().json(stored))
}

/// Entry rehydrated for editing, with recomputed figures
#[utoipa::path(
    get,
    path = "/api/payroll/{payment_id}",
    params(
        ("payment_id" = u64, Path, description = "Payment record ID")
    ),
    responses(
        (status = 200, body = PayrollDetail),
        (status = 404, description = "Payroll not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Payroll"
)]
pub async fn get_payroll(
    auth: AuthUser,
    service: web::Data<PayrollService>,
    path: web::Path<u64>,
) -> actix_web::Result<impl Responder> {
    auth.require_hr_or_admin()?;

    let detail = service.get(path.into_inner()).await?;

    Ok(HttpResponse::Ok().json(detail))
}

#[utoipa::path(
    get,
    path = "/api/payroll",
    params(PaymentFilter),
    responses(
        (status = 200, body = PaymentPage)
    ),
    security(("bearer_auth" = [])),
    tag = "Payroll"
)]
pub async fn list_payrolls(
    auth: AuthUser,
    service: web::Data<PayrollService>,
    query: web::Query<PaymentFilter>,
) -> actix_web::Result<impl Responder> {
    auth.require_hr_or_admin()?;

    let page = service.list(query.into_inner()).await?;

    Ok(HttpResponse::Ok().json(page.as_ref()))
}

#[utoipa::path(
    put,
    path = "/api/payroll/{payment_id}/status",
    request_body = UpdatePaymentStatus,
    params(
        ("payment_id" = u64, Path, description = "Payment record ID")
    ),
    responses(
        (status = 200, description = "Status changed", body = PaymentRecord),
        (status = 404, description = "Payroll not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Payroll"
)]
pub async fn update_payment_status(
    auth: AuthUser,
    service: web::Data<PayrollService>,
    path: web::Path<u64>,
    body: web::Json<UpdatePaymentStatus>,
) -> actix_web::Result<impl Responder> {
    auth.require_hr_or_admin()?;

    let record = service.set_status(path.into_inner(), body.status).await?;

    Ok(HttpResponse::Ok().json(record))
}

/// Payslip for one payment, as JSON or plain text
#[utoipa::path(
    get,
    path = "/api/payroll/{payment_id}/payslip",
    params(
        ("payment_id" = u64, Path, description = "Payment record ID"),
        PayslipQuery
    ),
    responses(
        (status = 200, description = "Payslip", body = Payslip),
        (status = 403, description = "Employees may only read their own payslip; unknown ids are reported the same way"),
        (status = 404, description = "Payroll not found (HR/Admin only)")
    ),
    security(("bearer_auth" = [])),
    tag = "Payroll"
)]
pub async fn get_payslip(
    auth: AuthUser,
    service: web::Data<PayrollService>,
    path: web::Path<u64>,
    query: web::Query<PayslipQuery>,
) -> actix_web::Result<impl Responder> {
    auth.require_payslip_access()?;

    let payslip = match service.payslip(path.into_inner()).await {
        Err(PayrollError::NotFound(_)) if !auth.is_hr_or_admin() => {
            return Err(payslip_forbidden().into());
        }
        result => result?,
    };
    auth.require_payroll_reader(payslip.employee_id)?;

    Ok(match query.format.unwrap_or_default() {
        PayslipFormat::Json => HttpResponse::Ok().json(payslip),
        PayslipFormat::Text => HttpResponse::Ok()
            .content_type(ContentType::plaintext())
            .body(payslip.render_text()),
    })
}
