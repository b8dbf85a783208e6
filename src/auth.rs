/// Authentication extractors and utilities
use crate::{
    authenticator::Principal,
    context::AppContext,
    error::GateError,
};
use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{request::Parts, HeaderMap},
    response::{IntoResponse, Response},
};

/// Extract the bearer token from the Authorization header
pub fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get("authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(str::to_string)
}

/// Render a rejection, with its reason only in trusted debug mode
fn rejection(state: &AppContext, err: GateError) -> Response {
    if state.config.service.debug_reasons {
        err.with_detail().into_response()
    } else {
        err.into_response()
    }
}

/// Authenticated context - extracts and validates session from request
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub principal: Principal,
}

#[async_trait]
impl FromRequestParts<AppContext> for AuthContext {
    type Rejection = Response;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppContext,
    ) -> Result<Self, Self::Rejection> {
        let token = extract_bearer_token(&parts.headers).ok_or_else(|| {
            rejection(
                state,
                GateError::InvalidToken("missing authorization header".to_string()),
            )
        })?;

        let principal = state
            .authenticator
            .authenticate(&token)
            .await
            .map_err(|e| rejection(state, e))?;

        Ok(AuthContext { principal })
    }
}

/// Optional authenticated context - does not fail if no auth provided
#[derive(Debug, Clone)]
pub struct OptionalAuthContext {
    pub principal: Option<Principal>,
}

#[async_trait]
impl FromRequestParts<AppContext> for OptionalAuthContext {
    type Rejection = Response;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppContext,
    ) -> Result<Self, Self::Rejection> {
        let token = extract_bearer_token(&parts.headers);
        let principal = state
            .authenticator
            .authenticate_optional(token.as_deref())
            .await;

        Ok(OptionalAuthContext { principal })
    }
}
