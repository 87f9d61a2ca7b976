// HTTP API Error Types
use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::{json, Value};
use std::collections::HashMap;

use crate::services::plan_gate::LimitExceeded;

/// HTTP API error with appropriate status codes and client-friendly messages
#[derive(Debug)]
pub enum ApiError {
    // 400 Bad Request
    BadRequest(String),
    ValidationError {
        message: String,
        field_errors: Option<HashMap<String, String>>,
    },
    InvalidJson(String),

    // 401 Unauthorized (no valid session)
    Unauthorized(String),

    // 403 Forbidden (session is valid, membership or role is not)
    Forbidden(String),

    // 403 Forbidden with quota details
    LimitExceeded(LimitExceeded),

    // 404 Not Found (also used for resources outside the caller's tenant)
    NotFound(String),

    // 409 Conflict
    Conflict(String),

    // 409 Conflict, stored integration credential must be renewed
    ReauthorizeRequired(String),

    // 500 Internal Server Error
    InternalServerError(String),

    // 502 Bad Gateway (external service issues)
    BadGateway(String),

    // 503 Service Unavailable
    ServiceUnavailable(String),
}

impl ApiError {
    pub fn status_code(&self) -> u16 {
        match self {
            ApiError::BadRequest(_) => 400,
            ApiError::ValidationError { .. } => 400,
            ApiError::InvalidJson(_) => 400,
            ApiError::Unauthorized(_) => 401,
            ApiError::Forbidden(_) => 403,
            ApiError::LimitExceeded(_) => 403,
            ApiError::NotFound(_) => 404,
            ApiError::Conflict(_) => 409,
            ApiError::ReauthorizeRequired(_) => 409,
            ApiError::InternalServerError(_) => 500,
            ApiError::BadGateway(_) => 502,
            ApiError::ServiceUnavailable(_) => 503,
        }
    }

    /// Client-safe error message
    pub fn message(&self) -> String {
        match self {
            ApiError::BadRequest(msg) => msg.clone(),
            ApiError::ValidationError { message, .. } => message.clone(),
            ApiError::InvalidJson(msg) => msg.clone(),
            ApiError::Unauthorized(msg) => msg.clone(),
            ApiError::Forbidden(msg) => msg.clone(),
            ApiError::LimitExceeded(limit) => limit.to_string(),
            ApiError::NotFound(msg) => msg.clone(),
            ApiError::Conflict(msg) => msg.clone(),
            ApiError::ReauthorizeRequired(msg) => msg.clone(),
            ApiError::InternalServerError(msg) => msg.clone(),
            ApiError::BadGateway(msg) => msg.clone(),
            ApiError::ServiceUnavailable(msg) => msg.clone(),
        }
    }

    /// Stable error code for client handling
    pub fn error_code(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "BAD_REQUEST",
            ApiError::ValidationError { .. } => "VALIDATION_ERROR",
            ApiError::InvalidJson(_) => "INVALID_JSON",
            ApiError::Unauthorized(_) => "UNAUTHORIZED",
            ApiError::Forbidden(_) => "FORBIDDEN",
            ApiError::LimitExceeded(_) => "LIMIT_EXCEEDED",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::Conflict(_) => "CONFLICT",
            ApiError::ReauthorizeRequired(_) => "REAUTHORIZE_REQUIRED",
            ApiError::InternalServerError(_) => "INTERNAL_SERVER_ERROR",
            ApiError::BadGateway(_) => "BAD_GATEWAY",
            ApiError::ServiceUnavailable(_) => "SERVICE_UNAVAILABLE",
        }
    }

    /// Convert to JSON response body
    pub fn to_json(&self) -> Value {
        let mut body = json!({
            "error": self.message(),
            "code": self.error_code(),
        });

        match self {
            ApiError::ValidationError { field_errors: Some(field_errors), .. } => {
                body["field_errors"] = json!(field_errors);
            }
            ApiError::LimitExceeded(limit) => {
                body["dimension"] = json!(limit.dimension);
                body["usage"] = json!(limit.usage);
                body["limit"] = json!(limit.limit);
                body["planCode"] = json!(limit.plan_code);
            }
            _ => {}
        }

        body
    }
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::BadRequest(message.into())
    }

    pub fn validation_error(
        message: impl Into<String>,
        field_errors: Option<HashMap<String, String>>,
    ) -> Self {
        ApiError::ValidationError {
            message: message.into(),
            field_errors,
        }
    }

    /// Validation failure on a single named field
    pub fn invalid_field(field: &str, problem: impl Into<String>) -> Self {
        let mut field_errors = HashMap::new();
        field_errors.insert(field.to_string(), problem.into());
        ApiError::validation_error("Invalid field", Some(field_errors))
    }

    pub fn invalid_json(message: impl Into<String>) -> Self {
        ApiError::InvalidJson(message.into())
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        ApiError::Unauthorized(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        ApiError::Forbidden(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        ApiError::NotFound(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        ApiError::Conflict(message.into())
    }

    pub fn reauthorize(message: impl Into<String>) -> Self {
        ApiError::ReauthorizeRequired(message.into())
    }

    pub fn internal_server_error(message: impl Into<String>) -> Self {
        ApiError::InternalServerError(message.into())
    }

    pub fn bad_gateway(message: impl Into<String>) -> Self {
        ApiError::BadGateway(message.into())
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        ApiError::ServiceUnavailable(message.into())
    }
}

impl From<LimitExceeded> for ApiError {
    fn from(err: LimitExceeded) -> Self {
        ApiError::LimitExceeded(err)
    }
}

impl From<crate::database::DatabaseError> for ApiError {
    fn from(err: crate::database::DatabaseError) -> Self {
        use crate::database::DatabaseError;

        match err {
            DatabaseError::NotFound(msg) => ApiError::not_found(msg),
            // Uniqueness violations carry a message that is safe to show
            DatabaseError::Conflict(msg) => ApiError::conflict(msg),
            DatabaseError::LastOwner => {
                ApiError::bad_request("An organization must keep at least one owner")
            }
            DatabaseError::ConfigMissing(_) | DatabaseError::InvalidDatabaseUrl => {
                tracing::error!("Database configuration error: {}", err);
                ApiError::service_unavailable("Database temporarily unavailable")
            }
            DatabaseError::Corrupt(msg) => {
                tracing::error!("Stored document could not be decoded: {}", msg);
                ApiError::internal_server_error("An error occurred while processing your request")
            }
            DatabaseError::Migration(e) => {
                tracing::error!("Migration error: {}", e);
                ApiError::service_unavailable("Service is being updated, please try again later")
            }
            DatabaseError::Sqlx(sqlx_err) => {
                // Log the real error but return generic message
                tracing::error!("SQLx error: {}", sqlx_err);
                ApiError::internal_server_error("Database error occurred")
            }
        }
    }
}

impl From<crate::auth::AuthError> for ApiError {
    fn from(err: crate::auth::AuthError) -> Self {
        use crate::auth::AuthError;

        match err {
            AuthError::MissingToken => ApiError::unauthorized("Authentication required"),
            AuthError::InvalidToken(msg) => {
                tracing::debug!("Rejected session token: {}", msg);
                ApiError::unauthorized("Invalid or expired session")
            }
            AuthError::InvalidCredentials => ApiError::unauthorized("Invalid email or password"),
            AuthError::InvalidSecret | AuthError::TokenGeneration(_) | AuthError::Random(_) => {
                tracing::error!("Session machinery failure: {}", err);
                ApiError::internal_server_error("Unable to establish a session")
            }
        }
    }
}

impl From<crate::scene::SceneError> for ApiError {
    fn from(err: crate::scene::SceneError) -> Self {
        ApiError::invalid_field("sceneData", err.to_string())
    }
}

impl From<crate::integrations::ion::IonError> for ApiError {
    fn from(err: crate::integrations::ion::IonError) -> Self {
        use crate::integrations::ion::IonError;

        match err {
            IonError::Unauthorized => {
                ApiError::reauthorize("Cesium ion token was rejected, reauthorize the integration")
            }
            other => {
                tracing::error!("Cesium ion request failed: {}", other);
                ApiError::bad_gateway("Cesium ion is unavailable, try again later")
            }
        }
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for ApiError {}

// Automatic HTTP response conversion for Axum
impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self.to_json())).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::DatabaseError;
    use crate::services::plan_gate::QuotaDimension;

    #[test]
    fn taxonomy_status_codes() {
        assert_eq!(ApiError::unauthorized("x").status_code(), 401);
        assert_eq!(ApiError::forbidden("x").status_code(), 403);
        assert_eq!(ApiError::not_found("x").status_code(), 404);
        assert_eq!(ApiError::invalid_field("title", "too long").status_code(), 400);
        assert_eq!(ApiError::internal_server_error("x").status_code(), 500);
    }

    #[test]
    fn body_always_carries_error_string() {
        let body = ApiError::forbidden("Not a member of this organization").to_json();
        assert_eq!(body["error"], "Not a member of this organization");
        assert_eq!(body["code"], "FORBIDDEN");
    }

    #[test]
    fn limit_exceeded_is_structured() {
        let err: ApiError = LimitExceeded {
            dimension: QuotaDimension::Projects,
            usage: 11,
            limit: 10,
            plan_code: "free".to_string(),
        }
        .into();
        let body = err.to_json();
        assert_eq!(err.status_code(), 403);
        assert_eq!(body["code"], "LIMIT_EXCEEDED");
        assert_eq!(body["dimension"], "projects");
        assert_eq!(body["usage"], 11);
        assert_eq!(body["limit"], 10);
        assert!(body["error"].as_str().unwrap().contains("projects"));
    }

    #[test]
    fn sqlx_errors_are_not_exposed() {
        let err: ApiError = DatabaseError::Sqlx(sqlx::Error::PoolTimedOut).into();
        assert_eq!(err.status_code(), 500);
        assert_eq!(err.message(), "Database error occurred");
    }

    #[test]
    fn conflicts_pass_their_message_through() {
        let err: ApiError = DatabaseError::Conflict("Slug 'acme' is already taken".into()).into();
        assert_eq!(err.status_code(), 409);
        assert_eq!(err.message(), "Slug 'acme' is already taken");
    }
}
