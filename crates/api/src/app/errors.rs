use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::{json, Map, Value};

use rolegate_auth::ValidationErrors;
use rolegate_infra::LifecycleError;

pub const VALIDATION_FAILED: &str = "VALIDATION_FAILED";
pub const CUSTOM_ROLE_NOT_FOUND: &str = "CUSTOM_ROLE_NOT_FOUND";
pub const ROLE_HAS_ASSIGNED_USERS: &str = "ROLE_HAS_ASSIGNED_USERS";
pub const ACCESS_DENIED: &str = "ACCESS_DENIED";
pub const FEATURE_NOT_ENABLED: &str = "FEATURE_NOT_ENABLED";
pub const UNAUTHENTICATED: &str = "UNAUTHENTICATED";
pub const PRINCIPAL_NOT_FOUND: &str = "PRINCIPAL_NOT_FOUND";
pub const INVALID_REQUEST: &str = "INVALID_REQUEST";
pub const CONFLICT: &str = "CONFLICT";
pub const INTERNAL_ERROR: &str = "INTERNAL_ERROR";

/// Plan tier that unlocks custom roles, reported with `FEATURE_NOT_ENABLED`.
pub const REQUIRED_PLAN: &str = "Business or Enterprise plan required";

/// Error returned by handlers and gates; renders as
/// `{error, message, details?, field_errors?}`.
#[derive(Debug)]
pub enum ApiError {
    Validation(ValidationErrors),
    RoleNotFound,
    PrincipalNotFound,
    RoleInUse { assigned_users_count: u64 },
    AccessDenied,
    FeatureNotEnabled,
    Unauthenticated(String),
    InvalidRequest(String),
    Conflict(String),
    Internal(String),
}

impl From<LifecycleError> for ApiError {
    fn from(value: LifecycleError) -> Self {
        match value {
            LifecycleError::Validation(errors) => ApiError::Validation(errors),
            LifecycleError::NotFound => ApiError::RoleNotFound,
            LifecycleError::PrincipalNotFound => ApiError::PrincipalNotFound,
            LifecycleError::RoleInUse(in_use) => ApiError::RoleInUse {
                assigned_users_count: in_use.bound_principals,
            },
            LifecycleError::Conflict(msg) => ApiError::Conflict(msg),
            LifecycleError::Resolution(err) => ApiError::Internal(err.to_string()),
            LifecycleError::Store(err) => ApiError::Internal(err.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Validation(errors) => {
                let field_errors = serde_json::to_value(&errors).unwrap_or(Value::Null);
                json_error_with(
                    StatusCode::UNPROCESSABLE_ENTITY,
                    VALIDATION_FAILED,
                    "The custom role could not be saved due to validation errors.",
                    Some(json!(errors.full_messages())),
                    Some(field_errors),
                )
            }
            ApiError::RoleNotFound => json_error(
                StatusCode::NOT_FOUND,
                CUSTOM_ROLE_NOT_FOUND,
                "The requested custom role could not be found.",
            ),
            ApiError::PrincipalNotFound => json_error(
                StatusCode::NOT_FOUND,
                PRINCIPAL_NOT_FOUND,
                "The requested principal is not a member of this account.",
            ),
            ApiError::RoleInUse { assigned_users_count } => json_error_with(
                StatusCode::UNPROCESSABLE_ENTITY,
                ROLE_HAS_ASSIGNED_USERS,
                "Cannot delete custom role as it has users assigned to it. Please reassign users before deleting.",
                Some(json!({ "assigned_users_count": assigned_users_count })),
                None,
            ),
            ApiError::AccessDenied => json_error(
                StatusCode::FORBIDDEN,
                ACCESS_DENIED,
                "Only administrators can manage custom roles.",
            ),
            ApiError::FeatureNotEnabled => json_error_with(
                StatusCode::FORBIDDEN,
                FEATURE_NOT_ENABLED,
                "Custom roles feature is not enabled for this account.",
                Some(json!({ "required_plan": REQUIRED_PLAN })),
                None,
            ),
            ApiError::Unauthenticated(msg) => json_error(StatusCode::UNAUTHORIZED, UNAUTHENTICATED, msg),
            ApiError::InvalidRequest(msg) => json_error(StatusCode::BAD_REQUEST, INVALID_REQUEST, msg),
            ApiError::Conflict(msg) => json_error(StatusCode::CONFLICT, CONFLICT, msg),
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "request failed");
                json_error(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    INTERNAL_ERROR,
                    "An unexpected error occurred.",
                )
            }
        }
    }
}

pub fn json_error(status: StatusCode, code: &'static str, message: impl Into<String>) -> Response {
    json_error_with(status, code, message, None, None)
}

pub fn json_error_with(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
    details: Option<Value>,
    field_errors: Option<Value>,
) -> Response {
    let mut body = Map::new();
    body.insert("error".to_string(), Value::from(code));
    body.insert("message".to_string(), Value::from(message.into()));
    if let Some(details) = details {
        body.insert("details".to_string(), details);
    }
    if let Some(field_errors) = field_errors {
        body.insert("field_errors".to_string(), field_errors);
    }

    (status, axum::Json(Value::Object(body))).into_response()
}
