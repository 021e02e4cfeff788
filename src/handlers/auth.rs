// handlers/auth.rs - POST /auth, /auth/email, /auth/refresh
//
// Sign-in returns the access token in the body and sets the refresh token as
// an http-only cookie. Passwords arrive AES-encrypted and are checked
// against the stored bcrypt hash.

use axum::extract::State;
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::Deserialize;

use crate::auth::IssuedTokens;
use crate::database::models::user;
use crate::database::DbConn;
use crate::error::ApiError;
use crate::middleware::ApiResponse;
use crate::state::AppState;

use super::extract::ValidJson;
use super::validate::{check_email, required};

pub const REFRESH_COOKIE: &str = "refresh_token";

/// Response of every endpoint that starts a session.
pub type SessionResponse = Result<(CookieJar, ApiResponse<IssuedTokens>), ApiError>;

#[derive(Debug, Deserialize)]
pub struct SignInBody {
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct EmailBody {
    pub email: Option<String>,
}

/// Issue a token pair for `idx`: 201 with the access token, refresh token in
/// the cookie jar.
pub fn start_session(state: &AppState, jar: CookieJar, idx: i64) -> SessionResponse {
    let tokens = state.tokens.issue(idx)?;
    let cookie = Cookie::build((REFRESH_COOKIE, tokens.refresh_token.clone()))
        .http_only(true)
        .secure(state.config.security.secure_cookies)
        .same_site(SameSite::Lax)
        .path("/")
        .max_age(time::Duration::seconds(state.tokens.refresh_lifetime_secs()))
        .build();
    Ok((jar.add(cookie), ApiResponse::created(tokens)))
}

/// POST /auth - sign in
pub async fn sign_in(
    State(state): State<AppState>,
    jar: CookieJar,
    ValidJson(body): ValidJson<SignInBody>,
) -> SessionResponse {
    let email = required(body.email, "email")?;
    let password = required(body.password, "password")?;
    check_email(&email)?;

    let mut conn = DbConn::acquire(&state.pool).await?;
    let found = user::credentials_by_email(&mut conn, &email)
        .await?
        .ok_or_else(|| ApiError::not_found("user not found"))?;
    drop(conn);

    let plaintext = state.passwords.decrypt(&password)?;
    if !state.passwords.verify(plaintext, found.password.clone()).await? {
        tracing::info!("Failed sign-in for user {}", found.idx);
        return Err(ApiError::unauthenticated("passwords are not matched"));
    }

    tracing::info!("User {} signed in", found.idx);
    start_session(&state, jar, found.idx)
}

/// POST /auth/email - 201 when the address is still free
pub async fn check_email_available(
    State(state): State<AppState>,
    ValidJson(body): ValidJson<EmailBody>,
) -> Result<ApiResponse<()>, ApiError> {
    let email = body
        .email
        .filter(|e| !e.is_empty())
        .ok_or_else(|| ApiError::bad_request("email is required"))?;
    check_email(&email)?;

    let mut conn = DbConn::acquire(&state.pool).await?;
    if user::email_taken(&mut conn, &email).await? {
        return Err(ApiError::duplication("email already exists"));
    }
    Ok(ApiResponse::created(()))
}

/// POST /auth/refresh - rotate both tokens from the refresh cookie
pub async fn refresh(State(state): State<AppState>, jar: CookieJar) -> SessionResponse {
    let token = jar
        .get(REFRESH_COOKIE)
        .map(|cookie| cookie.value().to_string())
        .filter(|value| !value.is_empty())
        .ok_or_else(|| ApiError::bad_request("no token"))?;

    let claims = state.tokens.verify_refresh(&token)?;
    let mut conn = DbConn::acquire(&state.pool).await?;
    let found = user::credentials_by_idx(&mut conn, claims.idx)
        .await?
        .ok_or_else(|| ApiError::unauthenticated("user not found"))?;
    drop(conn);

    start_session(&state, jar, found.idx)
}
