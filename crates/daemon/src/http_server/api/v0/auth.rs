use axum::async_trait;
use axum::extract::FromRequestParts;
use axum_extra::extract::CookieJar;
use http::header::AUTHORIZATION;
use http::request::Parts;
use http::HeaderMap;

use common::account::AccountId;
use common::reason::ErrorCode;
use common::store::MetadataStore;

use super::ApiError;
use crate::ServiceState;

pub const ACCESS_TOKEN_COOKIE: &str = "access-token";

/// Credential from the `Authorization` header (bare or `Bearer `
///  prefixed), falling back to the access token cookie
pub fn credential(headers: &HeaderMap) -> Option<String> {
    let header = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.strip_prefix("Bearer ").unwrap_or(value).trim())
        .filter(|value| !value.is_empty());
    if let Some(header) = header {
        return Some(header.to_string());
    }

    CookieJar::from_headers(headers)
        .get(ACCESS_TOKEN_COOKIE)
        .map(|cookie| cookie.value().to_string())
        .filter(|value| !value.is_empty())
}

/// Verify the caller and charge one request
pub async fn authenticate(state: &ServiceState, headers: &HeaderMap) -> Result<AccountId, ApiError> {
    let credential = credential(headers).ok_or(ErrorCode::UnavailableToken)?;
    let account = state
        .verifier()
        .verify(&credential)
        .await
        .ok_or(ErrorCode::UnavailableToken)?;

    if !state.requests().admit(&account, 1).await {
        return Err(ErrorCode::TooManyRequests.into());
    }
    Ok(account)
}

/// [`authenticate`], then require a completed registration
pub async fn authorize(state: &ServiceState, headers: &HeaderMap) -> Result<AccountId, ApiError> {
    let account = authenticate(state, headers).await?;
    match state.database().is_registered(&account).await {
        Ok(true) => Ok(account),
        Ok(false) => Err(ErrorCode::NotRegistered.into()),
        Err(e) => {
            tracing::warn!(account = %account, error = %e, "failed to check registration");
            Err(ErrorCode::UnknownError.into())
        }
    }
}

/// A verified caller, registered or not
#[derive(Debug, Clone)]
pub struct Caller(pub AccountId);

#[async_trait]
impl FromRequestParts<ServiceState> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &ServiceState,
    ) -> Result<Self, Self::Rejection> {
        authenticate(state, &parts.headers).await.map(Caller)
    }
}

/// A verified, registered caller
#[derive(Debug, Clone)]
pub struct Member(pub AccountId);

#[async_trait]
impl FromRequestParts<ServiceState> for Member {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &ServiceState,
    ) -> Result<Self, Self::Rejection> {
        authorize(state, &parts.headers).await.map(Member)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(&'static str, &str)]) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for (name, value) in pairs {
            headers.append(*name, value.parse().unwrap());
        }
        headers
    }

    #[test]
    fn test_credential_sources() {
        assert_eq!(
            credential(&headers(&[("authorization", "abc")])),
            Some("abc".to_string())
        );
        assert_eq!(
            credential(&headers(&[("authorization", "Bearer abc")])),
            Some("abc".to_string())
        );
        assert_eq!(
            credential(&headers(&[("cookie", "theme=dark; access-token=xyz")])),
            Some("xyz".to_string())
        );
        // the header wins over the cookie
        assert_eq!(
            credential(&headers(&[
                ("authorization", "abc"),
                ("cookie", "access-token=xyz")
            ])),
            Some("abc".to_string())
        );
        assert_eq!(credential(&headers(&[])), None);
    }
}
