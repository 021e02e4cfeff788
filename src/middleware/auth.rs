use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
    middleware::Next,
    response::Response,
};
use futures::future::BoxFuture;

use crate::auth::is_token_fresh;
use crate::database::{models::user, DbConn};
use crate::error::ApiError;
use crate::state::AppState;
use crate::types::Role;

/// Identity attached by [`authenticate`].
#[derive(Clone, Debug, PartialEq)]
pub struct AuthUser {
    pub idx: i64,
    pub role: Role,
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// The caller is `idx` or an admin.
    pub fn can_act_on(&self, idx: i64) -> bool {
        self.idx == idx || self.is_admin()
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthUser>()
            .cloned()
            .ok_or_else(|| ApiError::unauthenticated("authorization required"))
    }
}

/// Verify the bearer token, load the user and reject tokens issued before
/// the last password change. The connection is released before the inner
/// handler runs.
pub async fn authenticate(State(state): State<AppState>, mut request: Request, next: Next) -> Result<Response, ApiError> {
    let claims = {
        let token = bearer_token(request.headers())?;
        state.tokens.verify_access(token)?
    };

    let auth_user = {
        let mut conn = DbConn::acquire(&state.pool).await?;
        let credentials = user::credentials_by_idx(&mut conn, claims.idx)
            .await?
            .ok_or_else(|| ApiError::unauthenticated("user not exists"))?;

        if !is_token_fresh(claims.iat, credentials.password_updated_at) {
            return Err(ApiError::unauthenticated("User recently changed password. Signin again."));
        }

        AuthUser {
            idx: credentials.idx,
            role: credentials.role()?,
        }
    };

    tracing::debug!("Authenticated user {} ({})", auth_user.idx, auth_user.role);
    request.extensions_mut().insert(auth_user);
    Ok(next.run(request).await)
}

/// Role gate for use after [`authenticate`]:
///
/// ```ignore
/// .route_layer(middleware::from_fn(authorize(&[Role::Admin, Role::Editor])))
/// ```
pub fn authorize(
    roles: &'static [Role],
) -> impl Fn(Request, Next) -> BoxFuture<'static, Result<Response, ApiError>> + Clone + Send + Sync + 'static {
    move |request: Request, next: Next| -> BoxFuture<'static, Result<Response, ApiError>> {
        Box::pin(async move {
            let user = request
                .extensions()
                .get::<AuthUser>()
                .ok_or_else(|| ApiError::unauthenticated("authorization required"))?;
            if !roles.contains(&user.role) {
                return Err(ApiError::unauthorized("user has no permission"));
            }
            Ok(next.run(request).await)
        })
    }
}

fn bearer_token(headers: &HeaderMap) -> Result<&str, ApiError> {
    let header = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| ApiError::unauthenticated("authorization required"))?;

    let token = header
        .strip_prefix("Bearer ")
        .ok_or_else(|| ApiError::unauthenticated("authorization required"))?
        .trim();

    if token.is_empty() {
        return Err(ApiError::unauthenticated("tokens required"));
    }
    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(value: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static(value));
        headers
    }

    #[test]
    fn bearer_prefix_is_required() {
        assert_eq!(bearer_token(&headers("Bearer abc.def")).unwrap(), "abc.def");
        assert!(bearer_token(&headers("Token abc")).is_err());
        assert!(bearer_token(&headers("Bearerabc")).is_err());
        assert_eq!(
            bearer_token(&headers("Bearer  ")).unwrap_err(),
            ApiError::unauthenticated("tokens required")
        );
        assert!(bearer_token(&HeaderMap::new()).is_err());
    }

    #[test]
    fn self_or_admin() {
        let writer = AuthUser { idx: 4, role: Role::Writer };
        assert!(writer.can_act_on(4));
        assert!(!writer.can_act_on(5));
        let admin = AuthUser { idx: 1, role: Role::Admin };
        assert!(admin.can_act_on(5));
    }
}
