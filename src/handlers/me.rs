// handlers/me.rs - GET /me

use crate::database::models::user::{self, UserView};
use crate::database::DbConn;
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult, AuthUser};

/// Profile of the authenticated caller.
pub async fn get(user: AuthUser, mut conn: DbConn) -> ApiResult<UserView> {
    let found = user::find_view(&mut conn, user.idx)
        .await?
        .ok_or_else(|| ApiError::not_found("user not found"))?;
    Ok(ApiResponse::success(found))
}
