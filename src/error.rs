use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use derive_more::Display;
use serde_json::json;

use crate::store::StoreError;

#[derive(Debug, Display)]
pub enum PayrollError {
    #[display(fmt = "{}", _0)]
    Unauthorized(String),

    #[display(fmt = "{}", _0)]
    Forbidden(String),

    #[display(fmt = "{}", _0)]
    Validation(String),

    #[display(fmt = "Payroll record {} not found", _0)]
    NotFound(u64),

    #[display(fmt = "A payroll entry already exists for this employee and pay period")]
    Duplicate,

    #[display(fmt = "The payroll store did not respond in time, please retry")]
    Timeout,

    #[display(fmt = "Something went wrong, Contact with system admin")]
    Store(StoreError),
}

impl std::error::Error for PayrollError {}

impl From<StoreError> for PayrollError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => PayrollError::NotFound(id),
            StoreError::Conflict(_) => PayrollError::Duplicate,
            StoreError::Timeout => PayrollError::Timeout,
            other => PayrollError::Store(other),
        }
    }
}

impl ResponseError for PayrollError {
    fn status_code(&self) -> StatusCode {
        match self {
            PayrollError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            PayrollError::Forbidden(_) => StatusCode::FORBIDDEN,
            PayrollError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            PayrollError::NotFound(_) => StatusCode::NOT_FOUND,
            PayrollError::Duplicate => StatusCode::CONFLICT,
            PayrollError::Timeout => StatusCode::GATEWAY_TIMEOUT,
            PayrollError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(json!({
            "message": self.to_string()
        }))
    }
}
