// handlers/extract.rs - request extractors shared by the resource handlers

use std::marker::PhantomData;

use axum::{
    async_trait,
    extract::{rejection::JsonRejection, FromRequest, FromRequestParts, Path, Query, Request},
    http::request::Parts,
    Json,
};

use crate::config::AppConfig;
use crate::error::ApiError;
use crate::filter::{FieldSet, Filter, ListQuery};
use crate::state::AppState;

/// JSON body whose rejections become BadRequest envelopes.
///
/// The body extractor has to come last, so handlers that take one validate
/// it first and then call `DbConn::acquire` themselves.
pub struct ValidJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for ValidJson<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(request: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(request, state).await?;
        Ok(Self(value))
    }
}

/// Positive integer `:idx` path segment.
#[derive(Debug, Clone, Copy)]
pub struct IdxPath(pub i64);

#[async_trait]
impl<S> FromRequestParts<S> for IdxPath
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(raw) = Path::<String>::from_request_parts(parts, state)
            .await
            .map_err(|_| ApiError::bad_request("idx is irregular value"))?;
        parse_idx(&raw).map(IdxPath)
    }
}

pub fn parse_idx(raw: &str) -> Result<i64, ApiError> {
    match raw.parse::<i64>() {
        Ok(idx) if idx > 0 => Ok(idx),
        _ => Err(ApiError::bad_request("idx is irregular value")),
    }
}

/// Allow-list and page size of one list endpoint.
pub trait ListSpec: Send + Sync + 'static {
    fn fields() -> &'static FieldSet;
    fn default_limit(config: &AppConfig) -> i64;
}

/// Validated `offset`/`limit`/`sorts`/`filter` query. Declared before
/// `DbConn` in a handler so that an invalid request never takes a
/// connection.
pub struct Listing<L: ListSpec> {
    pub filter: Filter,
    _spec: PhantomData<L>,
}

#[async_trait]
impl<L: ListSpec> FromRequestParts<AppState> for Listing<L> {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let Query(query) = Query::<ListQuery>::from_request_parts(parts, state).await?;
        let filter = Filter::from_query(
            &query,
            L::fields(),
            L::default_limit(&state.config),
            &state.config.filter,
        )?;
        Ok(Self {
            filter,
            _spec: PhantomData,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::parse_idx;

    #[test]
    fn idx_must_be_a_positive_integer() {
        assert_eq!(parse_idx("12").unwrap(), 12);
        assert!(parse_idx("0").is_err());
        assert!(parse_idx("-3").is_err());
        assert!(parse_idx("abc").is_err());
        assert!(parse_idx("1.5").is_err());
    }
}
