//! Authn/Tenant Resolver (§4.6).
//!
//! The resolver is specified abstractly: an opaque credential maps to a
//! tenant identifier or the request fails `unauthorized`. [`ApiKeyResolver`]
//! is the one concrete implementation this fabric ships — the same
//! API-key-to-tenant map the original coordinator and ledger services used
//! (`auth.py`'s `API_KEY_TENANT_MAP`), generalized into configuration. It is
//! deliberately the simplest resolver satisfying the trait; concrete auth
//! schemes beyond this are out of scope.

use std::collections::HashMap;

use async_trait::async_trait;
use fabric_types::TenantId;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("unauthorized: missing or unmapped credential")]
    Unauthorized,
}

/// A credential presented by a request: either an `X-API-Key` header value
/// or an `Authorization: Bearer <token>` token, which the MVP resolver
/// treats as occupying the same key space (mirrors `get_current_tenant` /
/// `get_current_tenant` falling back to `get_tenant_from_bearer`).
#[derive(Debug, Clone)]
pub enum Credential {
    ApiKey(String),
    Bearer(String),
}

#[async_trait]
pub trait TenantResolver: Send + Sync {
    async fn resolve(&self, credential: &Credential) -> Result<TenantId, AuthError>;

    /// Resolves without failing the request; used by read paths that allow
    /// an anonymous caller to see nothing rather than being rejected.
    async fn resolve_optional(&self, credential: Option<&Credential>) -> Option<TenantId> {
        match credential {
            Some(c) => self.resolve(c).await.ok(),
            None => None,
        }
    }
}

/// Maps API keys (and bearer tokens, treated identically) to tenant ids via
/// a configured lookup table.
#[derive(Debug, Clone, Default)]
pub struct ApiKeyResolver {
    key_to_tenant: HashMap<String, TenantId>,
}

impl ApiKeyResolver {
    pub fn new(key_to_tenant: HashMap<String, TenantId>) -> Self {
        Self { key_to_tenant }
    }

    pub fn with_key(mut self, key: impl Into<String>, tenant: TenantId) -> Self {
        self.key_to_tenant.insert(key.into(), tenant);
        self
    }
}

#[async_trait]
impl TenantResolver for ApiKeyResolver {
    async fn resolve(&self, credential: &Credential) -> Result<TenantId, AuthError> {
        let key = match credential {
            Credential::ApiKey(k) => k,
            Credential::Bearer(t) => t,
        };
        self.key_to_tenant.get(key).cloned().ok_or(AuthError::Unauthorized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn known_api_key_resolves_to_its_tenant() {
        let resolver = ApiKeyResolver::default().with_key("secret", TenantId::new("tenant-a"));
        let tenant = resolver.resolve(&Credential::ApiKey("secret".to_string())).await.unwrap();
        assert_eq!(tenant.as_str(), "tenant-a");
    }

    #[tokio::test]
    async fn bearer_token_shares_the_api_key_space() {
        let resolver = ApiKeyResolver::default().with_key("secret", TenantId::new("tenant-a"));
        let tenant = resolver.resolve(&Credential::Bearer("secret".to_string())).await.unwrap();
        assert_eq!(tenant.as_str(), "tenant-a");
    }

    #[tokio::test]
    async fn unknown_credential_is_unauthorized() {
        let resolver = ApiKeyResolver::default();
        let err = resolver.resolve(&Credential::ApiKey("nope".to_string())).await.unwrap_err();
        assert_eq!(err, AuthError::Unauthorized);
    }
}
