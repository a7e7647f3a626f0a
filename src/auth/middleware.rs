use actix_web::middleware::Next;
use actix_web::{
    Error, HttpMessage,
    body::BoxBody,
    dev::{ServiceRequest, ServiceResponse},
    http::header::{AUTHORIZATION, HeaderMap},
    web::Data,
};

use crate::auth::auth::AuthUser;
use crate::auth::jwt::verify_access_token;
use crate::config::Config;
use crate::error::PayrollError;
use crate::model::role::Role;

fn bearer_token(headers: &HeaderMap) -> Result<&str, PayrollError> {
    let value = headers
        .get(AUTHORIZATION)
        .ok_or_else(|| PayrollError::Unauthorized("Missing Authorization header".into()))?
        .to_str()
        .map_err(|_| {
            PayrollError::Unauthorized("Invalid Authorization header encoding".into())
        })?;

    value
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| {
            PayrollError::Unauthorized("Authorization header must be 'Bearer <token>'".into())
        })
}

/// Resolves the caller from a bearer token minted by the identity service.
fn authenticate(headers: &HeaderMap, secret: &str) -> Result<AuthUser, PayrollError> {
    let claims = verify_access_token(bearer_token(headers)?, secret)
        .map_err(|e| PayrollError::Unauthorized(format!("Invalid or expired token: {e}")))?;
    let role = Role::from_id(claims.role)
        .ok_or_else(|| PayrollError::Unauthorized(format!("Unknown role id {}", claims.role)))?;

    Ok(AuthUser {
        user_id: claims.user_id,
        username: claims.sub,
        role,
        employee_id: claims.employee_id,
    })
}

pub async fn auth_middleware(
    req: ServiceRequest,
    next: Next<BoxBody>,
) -> Result<ServiceResponse<BoxBody>, Error> {
    let config = req
        .app_data::<Data<Config>>()
        .ok_or_else(|| actix_web::error::ErrorInternalServerError("App config missing"))?;

    match authenticate(req.headers(), &config.jwt_secret) {
        Ok(user) => {
            tracing::debug!(user_id = user.user_id, role = ?user.role, "Request authenticated");
            req.extensions_mut().insert(user);
            next.call(req).await
        }
        Err(e) => {
            tracing::debug!(path = %req.path(), error = %e, "Request rejected");
            Ok(req.error_response(e))
        }
    }
}
