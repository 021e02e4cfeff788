// handlers/images.rs - /imgs/avatars, /imgs/insights, /imgs/thumbnails
//
// Multipart uploads forwarded to the blob store. Avatar uploads also update
// the caller's profile.

use axum::{
    extract::{multipart::MultipartRejection, Multipart, State},
    response::{IntoResponse, Response},
};
use chrono::Utc;
use serde::Serialize;

use crate::database::models::user;
use crate::database::DbConn;
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult, AuthUser};
use crate::services::blob_store::{file_stem, public_id_from_url, Destroyed};
use crate::state::AppState;

const AVATARS: &str = "avatars";
const INSIGHTS: &str = "insights";
const THUMBNAILS: &str = "thumbnails";

#[derive(Debug, Serialize)]
pub struct Uploaded {
    pub url: String,
}

struct UploadedFile {
    file_name: String,
    content_type: Option<String>,
    bytes: Vec<u8>,
}

/// First part named `field`.
async fn take_file(
    multipart: Result<Multipart, MultipartRejection>,
    field: &str,
) -> Result<UploadedFile, ApiError> {
    let mut multipart = multipart?;
    while let Some(part) = multipart.next_field().await? {
        if part.name() != Some(field) {
            continue;
        }
        let file_name = part.file_name().unwrap_or(field).to_string();
        let content_type = part.content_type().map(str::to_string);
        let bytes = part.bytes().await?.to_vec();
        if bytes.is_empty() {
            break;
        }
        return Ok(UploadedFile {
            file_name,
            content_type,
            bytes,
        });
    }
    Err(ApiError::bad_request("No files were uploaded"))
}

/// `{stem}_{user}_{millis}` keeps names unique per uploader.
fn public_id(file_name: &str, user_idx: i64) -> String {
    format!("{}_{}_{}", file_stem(file_name), user_idx, Utc::now().timestamp_millis())
}

async fn store(state: &AppState, folder: &str, user: &AuthUser, file: UploadedFile) -> Result<String, ApiError> {
    let id = public_id(&file.file_name, user.idx);
    let url = state
        .blobs
        .upload(folder, &id, file.bytes, file.content_type.as_deref())
        .await?;
    tracing::debug!("User {} uploaded {}/{}", user.idx, folder, id);
    Ok(url)
}

/// POST /imgs/avatars - upload and set as the caller's avatar
pub async fn upload_avatar(
    State(state): State<AppState>,
    user: AuthUser,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<Uploaded> {
    let file = take_file(multipart, "avatar").await?;
    let url = store(&state, AVATARS, &user, file).await?;
    let mut conn = DbConn::acquire(&state.pool).await?;
    user::set_avatar(&mut conn, user.idx, Some(&url)).await?;
    Ok(ApiResponse::created(Uploaded { url }))
}

/// DELETE /imgs/avatars - remove the caller's avatar; 204 when there was
/// nothing stored
pub async fn delete_avatar(
    State(state): State<AppState>,
    user: AuthUser,
    mut conn: DbConn,
) -> Result<Response, ApiError> {
    let found = user::find(&mut conn, user.idx)
        .await?
        .ok_or_else(|| ApiError::not_found("user not found"))?;
    let Some(url) = found.avatar else {
        return Ok(ApiResponse::<()>::no_content().into_response());
    };

    let outcome = state.blobs.destroy(AVATARS, public_id_from_url(&url)).await?;
    user::set_avatar(&mut conn, user.idx, None).await?;

    Ok(match outcome {
        Destroyed::Deleted => ApiResponse::success(Uploaded { url }).into_response(),
        Destroyed::NotFound => {
            tracing::warn!("Avatar {} of user {} was already gone", url, user.idx);
            ApiResponse::<()>::no_content().into_response()
        }
    })
}

/// POST /imgs/insights - image embedded in insight content
pub async fn upload_insight_image(
    State(state): State<AppState>,
    user: AuthUser,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<Uploaded> {
    let file = take_file(multipart, "image").await?;
    let url = store(&state, INSIGHTS, &user, file).await?;
    Ok(ApiResponse::created(Uploaded { url }))
}

/// POST /imgs/thumbnails
pub async fn upload_thumbnail(
    State(state): State<AppState>,
    user: AuthUser,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<Uploaded> {
    let file = take_file(multipart, "thumbnail").await?;
    let url = store(&state, THUMBNAILS, &user, file).await?;
    Ok(ApiResponse::created(Uploaded { url }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn public_id_keeps_stem_and_uploader() {
        let id = public_id("portrait.final.png", 7);
        assert!(id.starts_with("portrait_7_"));
        assert!(id.rsplit('_').next().unwrap().parse::<i64>().is_ok());
    }
}
