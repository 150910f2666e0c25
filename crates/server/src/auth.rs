//! Credential resolution.
//!
//! No session cookie is assumed anywhere: every widget request carries the
//! tenant's API key and every console request carries the operator token,
//! as `Authorization: Bearer <token>` (or `?token=<token>` for the
//! WebSocket upgrade, which cannot set headers from a browser).

use axum::http::HeaderMap;

use crate::error::ApiError;
use crate::store::{OperatorRow, Store, TenantRow};

pub fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get("authorization")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::to_string)
}

/// Resolve the tenant credential on a widget-facing request.
pub async fn tenant_from_headers(
    store: &Store,
    headers: &HeaderMap,
) -> Result<TenantRow, ApiError> {
    let token = bearer_token(headers).ok_or(ApiError::Unauthorized)?;
    store
        .tenant_by_api_key(token)
        .await?
        .ok_or(ApiError::Unauthorized)
}

/// Resolve the operator credential on a console-facing request.
pub async fn operator_from_headers(
    store: &Store,
    headers: &HeaderMap,
) -> Result<OperatorRow, ApiError> {
    let token = bearer_token(headers).ok_or(ApiError::Unauthorized)?;
    operator_from_token(store, token).await
}

/// Resolve an operator token directly (WebSocket `?token=` path).
pub async fn operator_from_token(store: &Store, token: String) -> Result<OperatorRow, ApiError> {
    store
        .operator_by_token(token)
        .await?
        .ok_or(ApiError::Unauthorized)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn bearer_token_requires_prefix() {
        let mut headers = HeaderMap::new();
        assert!(bearer_token(&headers).is_none());

        headers.insert("authorization", HeaderValue::from_static("Basic abc"));
        assert!(bearer_token(&headers).is_none());

        headers.insert("authorization", HeaderValue::from_static("Bearer secret"));
        assert_eq!(bearer_token(&headers).as_deref(), Some("secret"));
    }

    #[tokio::test]
    async fn credentials_resolve_against_store() {
        let (store, _dir) = crate::store::tests::test_store().await;

        let mut headers = HeaderMap::new();
        headers.insert(
            "authorization",
            HeaderValue::from_static("Bearer tenant-key-1"),
        );
        let tenant = tenant_from_headers(&store, &headers).await.unwrap();
        assert_eq!(tenant.id, "t1");

        // A tenant key is not an operator token
        assert!(matches!(
            operator_from_headers(&store, &headers).await,
            Err(ApiError::Unauthorized)
        ));

        headers.insert(
            "authorization",
            HeaderValue::from_static("Bearer op-token-1"),
        );
        let operator = operator_from_headers(&store, &headers).await.unwrap();
        assert_eq!(operator.id, "op1");
    }
}
