//! Request gates for account-scoped routes.
//!
//! Order: account id from the path, capability (feature) gate, caller
//! identity from `x-principal-id`, administrator gate. On success the
//! [`AccountContext`] and [`PrincipalContext`] are inserted as extensions.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::HeaderMap,
    middleware::Next,
    response::{IntoResponse, Response},
};

use tracing::Instrument;

use rolegate_core::{AccountId, PrincipalId};
use rolegate_infra::LifecycleError;

use crate::app::errors::ApiError;
use crate::app::services::AppServices;
use crate::context::{AccountContext, PrincipalContext};

pub const PRINCIPAL_HEADER: &str = "x-principal-id";

/// One span per request; logs the response status.
pub async fn trace_requests(req: axum::http::Request<axum::body::Body>, next: Next) -> Response {
    let span = tracing::info_span!("request", method = %req.method(), path = %req.uri().path());
    async move {
        let response = next.run(req).await;
        tracing::info!(status = response.status().as_u16(), "request completed");
        response
    }
    .instrument(span)
    .await
}

pub async fn account_gate(
    State(services): State<Arc<AppServices>>,
    Path(params): Path<HashMap<String, String>>,
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Response {
    match admit(&services, &params, req.headers()).await {
        Ok((account, principal)) => {
            req.extensions_mut().insert(account);
            req.extensions_mut().insert(principal);
            next.run(req).await
        }
        Err(err) => err.into_response(),
    }
}

async fn admit(
    services: &AppServices,
    params: &HashMap<String, String>,
    headers: &HeaderMap,
) -> Result<(AccountContext, PrincipalContext), ApiError> {
    let account_id: AccountId = params
        .get("account_id")
        .ok_or_else(|| ApiError::InvalidRequest("missing account id".to_string()))?
        .parse()
        .map_err(|_| ApiError::InvalidRequest("invalid account id".to_string()))?;

    if !services.features.custom_roles_enabled_for(account_id) {
        tracing::debug!(%account_id, "custom roles feature disabled");
        return Err(ApiError::FeatureNotEnabled);
    }

    let principal_id = extract_principal_id(headers)?;

    let principal = match services.roles.resolve_principal(account_id, principal_id).await {
        Ok(principal) => principal,
        // Not a member of this account: same answer as a non-administrator.
        Err(LifecycleError::PrincipalNotFound) => return Err(ApiError::AccessDenied),
        Err(err) => return Err(err.into()),
    };

    if !principal.is_administrator() {
        tracing::info!(%account_id, %principal_id, "custom role management denied");
        return Err(ApiError::AccessDenied);
    }

    Ok((AccountContext::new(account_id), PrincipalContext::new(principal)))
}

fn extract_principal_id(headers: &HeaderMap) -> Result<PrincipalId, ApiError> {
    let value = headers
        .get(PRINCIPAL_HEADER)
        .ok_or_else(|| ApiError::Unauthenticated(format!("missing {PRINCIPAL_HEADER} header")))?;

    let value = value
        .to_str()
        .map_err(|_| ApiError::Unauthenticated(format!("invalid {PRINCIPAL_HEADER} header")))?;

    value
        .parse()
        .map_err(|_| ApiError::Unauthenticated(format!("invalid {PRINCIPAL_HEADER} header")))
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    #[test]
    fn principal_header_is_required_and_parsed() {
        let mut headers = HeaderMap::new();
        assert!(matches!(
            extract_principal_id(&headers),
            Err(ApiError::Unauthenticated(_))
        ));

        headers.insert(PRINCIPAL_HEADER, HeaderValue::from_static("not-a-uuid"));
        assert!(matches!(
            extract_principal_id(&headers),
            Err(ApiError::Unauthenticated(_))
        ));

        let id = PrincipalId::new();
        headers.insert(PRINCIPAL_HEADER, HeaderValue::from_str(&id.to_string()).unwrap());
        assert_eq!(extract_principal_id(&headers).unwrap(), id);
    }
}
