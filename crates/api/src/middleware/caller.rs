//! Caller identity extractors.
//!
//! Identity is established upstream (gateway / session layer) and passed in
//! the `X-User-Id` header. Handlers receive it explicitly as an extractor
//! instead of reading ambient request state.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use uuid::Uuid;

use courier_common::error::AppError;

pub const USER_ID_HEADER: &str = "x-user-id";

/// Signed-in caller. Rejects the request when the header is missing.
#[derive(Debug, Clone, Copy)]
pub struct Caller {
    pub user_id: Uuid,
}

/// Caller that may not be signed in yet (e.g. device registration before login).
#[derive(Debug, Clone, Copy)]
pub struct OptionalCaller(pub Option<Uuid>);

fn user_id_from(parts: &Parts) -> Result<Option<Uuid>, AppError> {
    let Some(raw) = parts.headers.get(USER_ID_HEADER) else {
        return Ok(None);
    };

    let value = raw
        .to_str()
        .map_err(|_| AppError::Validation("X-User-Id must be ASCII".to_string()))?;
    let user_id = Uuid::parse_str(value.trim())
        .map_err(|_| AppError::Validation("X-User-Id must be a UUID".to_string()))?;

    Ok(Some(user_id))
}

impl<S: Send + Sync> FromRequestParts<S> for Caller {
    type Rejection = AppError;

    fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> impl std::future::Future<Output = Result<Self, Self::Rejection>> + Send {
        let user_id = user_id_from(parts);

        async move {
            match user_id? {
                Some(user_id) => Ok(Caller { user_id }),
                None => Err(AppError::Unauthorized(
                    "Missing X-User-Id header".to_string(),
                )),
            }
        }
    }
}

impl<S: Send + Sync> FromRequestParts<S> for OptionalCaller {
    type Rejection = AppError;

    fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> impl std::future::Future<Output = Result<Self, Self::Rejection>> + Send {
        let user_id = user_id_from(parts);
        async move { Ok(OptionalCaller(user_id?)) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn parts_with(header: Option<&str>) -> Parts {
        let mut builder = Request::builder().uri("/");
        if let Some(value) = header {
            builder = builder.header(USER_ID_HEADER, value);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[tokio::test]
    async fn test_caller_from_header() {
        let user_id = Uuid::new_v4();
        let mut parts = parts_with(Some(&user_id.to_string()));
        let caller = Caller::from_request_parts(&mut parts, &()).await.unwrap();
        assert_eq!(caller.user_id, user_id);
    }

    #[tokio::test]
    async fn test_missing_header_rejected() {
        let mut parts = parts_with(None);
        let result = Caller::from_request_parts(&mut parts, &()).await;
        assert!(matches!(result, Err(AppError::Unauthorized(_))));
    }

    #[tokio::test]
    async fn test_optional_caller_allows_anonymous() {
        let mut parts = parts_with(None);
        let caller = OptionalCaller::from_request_parts(&mut parts, &()).await.unwrap();
        assert!(caller.0.is_none());
    }

    #[tokio::test]
    async fn test_malformed_header_rejected() {
        let mut parts = parts_with(Some("not-a-uuid"));
        let result = OptionalCaller::from_request_parts(&mut parts, &()).await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }
}
