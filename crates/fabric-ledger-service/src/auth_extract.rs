//! Pulls a [`Credential`] off incoming request headers and resolves it to
//! a tenant, matching the original `get_current_tenant` dependency shape.

use axum::http::HeaderMap;
use fabric_auth::{AuthError, Credential, TenantResolver};
use fabric_types::TenantId;

pub fn credential_from_headers(headers: &HeaderMap) -> Option<Credential> {
    if let Some(key) = headers.get("x-api-key").and_then(|v| v.to_str().ok()) {
        return Some(Credential::ApiKey(key.to_string()));
    }
    let auth = headers.get(axum::http::header::AUTHORIZATION)?.to_str().ok()?;
    let token = auth.strip_prefix("Bearer ")?;
    Some(Credential::Bearer(token.to_string()))
}

pub async fn resolve_tenant(
    resolver: &dyn TenantResolver,
    headers: &HeaderMap,
) -> Result<TenantId, AuthError> {
    let credential = credential_from_headers(headers).ok_or(AuthError::Unauthorized)?;
    resolver.resolve(&credential).await
}
