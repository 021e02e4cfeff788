// handlers/users.rs - /users and /users/:idx
//
// Sign-up is public, starts a session and always creates a plain user.
// Updates and deletes are allowed for the user themself or an admin; only
// admins may change a role.

use axum::extract::State;
use axum_extra::extract::cookie::CookieJar;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::config::AppConfig;
use crate::database::models::user::{self, NewUser, UserRow, UserView};
use crate::database::models::Topic;
use crate::database::query_builder::{fetch_page, ListSource, UpdateBuilder};
use crate::database::{transaction, DbConn};
use crate::error::ApiError;
use crate::filter::FieldSet;
use crate::middleware::{ApiResponse, ApiResult, AuthUser, ListResponse};
use crate::state::AppState;
use crate::types::{Patch, Role};

use super::auth::{start_session, SessionResponse};
use super::extract::{IdxPath, ListSpec, Listing, ValidJson};
use super::validate::{check_email, check_name, required};

pub struct UserList;

impl ListSpec for UserList {
    fn fields() -> &'static FieldSet {
        &user::USER_FIELDS
    }

    fn default_limit(config: &AppConfig) -> i64 {
        config.limits.users
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateUser {
    pub email: Option<String>,
    pub password: Option<String>,
    pub password_confirm: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub avatar: Option<String>,
    pub job_title: Option<String>,
    pub biography: Option<String>,
    pub careers: Option<Vec<String>>,
    pub topics: Option<Vec<i64>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct UpdateUser {
    pub past_password: Option<String>,
    pub password: Option<String>,
    pub password_confirm: Option<String>,
    pub first_name: Patch<String>,
    pub last_name: Patch<String>,
    pub role: Option<String>,
    pub avatar: Patch<String>,
    pub job_title: Patch<String>,
    pub biography: Patch<String>,
    pub careers: Patch<Vec<String>>,
    pub topics: Option<Vec<i64>>,
}

/// Password change request: all three fields or none.
struct PasswordChange {
    past: String,
    new: String,
    confirm: String,
}

impl UpdateUser {
    fn password_change(&mut self) -> Result<Option<PasswordChange>, ApiError> {
        match (self.past_password.take(), self.password.take(), self.password_confirm.take()) {
            (None, None, None) => Ok(None),
            (Some(past), Some(new), Some(confirm)) => Ok(Some(PasswordChange { past, new, confirm })),
            _ => Err(ApiError::bad_request(
                "all password info(past password, new password, new password confirm) required",
            )),
        }
    }
}

fn parse_role(role: Option<String>) -> Result<Option<Role>, ApiError> {
    role.map(|r| Role::try_from(r.as_str()).map_err(|_| ApiError::bad_request("role is not valid")))
        .transpose()
}

async fn ensure_topics_exist(conn: &mut sqlx::PgConnection, topics: &[i64]) -> Result<(), ApiError> {
    let missing = Topic::missing(conn, topics).await?;
    if let Some(idx) = missing.first() {
        return Err(ApiError::not_found(format!("topic {} not exist", idx)));
    }
    Ok(())
}

/// POST /users - sign up. A `role` in the body is ignored.
pub async fn create(
    State(state): State<AppState>,
    jar: CookieJar,
    ValidJson(body): ValidJson<CreateUser>,
) -> SessionResponse {
    let email = required(body.email, "email")?;
    let password = required(body.password, "password")?;
    let password_confirm = required(body.password_confirm, "password_confirm")?;
    let first_name = required(body.first_name, "first_name")?;
    let last_name = required(body.last_name, "last_name")?;
    check_email(&email)?;
    check_name(&first_name, "first_name")?;
    check_name(&last_name, "last_name")?;
    let role = Role::User;

    // Both are ciphertexts of the same key and IV, so equal plaintexts give
    // equal ciphertexts.
    if password != password_confirm {
        return Err(ApiError::unprocessable("password is not matched"));
    }

    let mut conn = DbConn::acquire(&state.pool).await?;
    if user::email_taken(&mut conn, &email).await? {
        return Err(ApiError::duplication("email already exists"));
    }

    let plaintext = state.passwords.decrypt(&password)?;
    let password_hash = state.passwords.hash(plaintext).await?;

    let new = NewUser {
        email,
        password_hash,
        first_name,
        last_name,
        role,
        job_title: body.job_title,
        biography: body.biography,
        careers: body.careers,
        avatar: body.avatar,
    };
    let topics = body.topics.unwrap_or_default();

    let idx = transaction(&mut conn, move |tx| {
        Box::pin(async move {
            let idx = user::insert(&mut *tx, &new).await?;
            ensure_topics_exist(&mut *tx, &topics).await?;
            user::set_topics(&mut *tx, idx, &topics).await?;
            Ok(idx)
        })
    })
    .await?;
    drop(conn);

    tracing::info!("Created user {} with role {}", idx, role);
    start_session(&state, jar, idx)
}

/// GET /users - page of users with their topics
pub async fn list(listing: Listing<UserList>, mut conn: DbConn) -> ApiResult<ListResponse<UserView>> {
    let filter = listing.filter;
    let source = ListSource {
        select: user::USER_SELECT,
        from: user::USER_FROM,
        base: &[user::ACTIVE],
    };
    let (rows, total) = fetch_page::<UserRow>(&mut conn, &filter, &source).await?;

    let idxs: Vec<i64> = rows.iter().map(|row| row.idx).collect();
    let mut topics = user::topics_for(&mut conn, &idxs).await?;
    let data = rows
        .into_iter()
        .map(|row| {
            let user_topics = topics.remove(&row.idx).unwrap_or_default();
            row.into_view(user_topics)
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(ApiResponse::success(ListResponse::page(data, total, filter.offset(), filter.limit())))
}

/// GET /users/:idx
pub async fn get(IdxPath(idx): IdxPath, mut conn: DbConn) -> ApiResult<UserView> {
    let found = user::find_view(&mut conn, idx)
        .await?
        .ok_or_else(|| ApiError::not_found("user not found"))?;
    Ok(ApiResponse::success(found))
}

/// PATCH /users/:idx
pub async fn update(
    State(state): State<AppState>,
    caller: AuthUser,
    IdxPath(idx): IdxPath,
    ValidJson(mut body): ValidJson<UpdateUser>,
) -> ApiResult<UserView> {
    if !caller.can_act_on(idx) {
        return Err(ApiError::unauthorized("user has no permission"));
    }
    let role = parse_role(body.role.take())?;
    if role.is_some() && !caller.is_admin() {
        return Err(ApiError::unauthorized("only admin can change roles"));
    }
    let password_change = body.password_change()?;

    let mut conn = DbConn::acquire(&state.pool).await?;
    let stored = user::credentials_by_idx(&mut conn, idx)
        .await?
        .ok_or_else(|| ApiError::not_found("user not found"))?;

    let new_hash = match password_change {
        Some(change) => {
            let past = state.passwords.decrypt(&change.past)?;
            let new = state.passwords.decrypt(&change.new)?;
            if !state.passwords.verify(past, stored.password.clone()).await? {
                return Err(ApiError::unprocessable(
                    "passwords are not matched with the past one. cannot be updated",
                ));
            }
            if change.new != change.confirm {
                return Err(ApiError::bad_request("password should be confirmed correctly"));
            }
            if change.past == change.new {
                return Err(ApiError::duplication(
                    "new password should not be the same with the existing one",
                ));
            }
            Some(state.passwords.hash(new).await?)
        }
        None => None,
    };

    let mut update = UpdateBuilder::new("users");
    update
        .set_opt("first_name", body.first_name.required("first_name").map_err(ApiError::bad_request)?)
        .set_opt("last_name", body.last_name.required("last_name").map_err(ApiError::bad_request)?)
        .patch("avatar", body.avatar)
        .patch("job_title", body.job_title)
        .patch("biography", body.biography)
        .patch("careers", body.careers.map(sqlx::types::Json))
        .set_opt("role", role.map(|r| r.as_str().to_string()));
    if let Some(hash) = new_hash {
        update.set("password", hash).set_expr("password_updated_at", "now()");
    }
    update.set_expr("updated_at", "now()");

    let topics = body.topics;
    transaction(&mut conn, move |tx| {
        Box::pin(async move {
            update.execute(&mut *tx, "idx", idx, Some("del_at IS NULL")).await?;
            if let Some(topics) = topics {
                ensure_topics_exist(&mut *tx, &topics).await?;
                user::set_topics(&mut *tx, idx, &topics).await?;
            }
            Ok(())
        })
    })
    .await?;

    if stored.idx == caller.idx {
        tracing::debug!("User {} updated their profile", idx);
    } else {
        tracing::info!("Admin {} updated user {}", caller.idx, idx);
    }

    let updated = user::find_view(&mut conn, idx)
        .await?
        .ok_or_else(|| ApiError::not_found("user not found"))?;
    Ok(ApiResponse::success(updated))
}

/// DELETE /users/:idx - soft delete and drop topic links
pub async fn remove(caller: AuthUser, IdxPath(idx): IdxPath, mut conn: DbConn) -> ApiResult<Value> {
    if !caller.can_act_on(idx) {
        return Err(ApiError::unauthorized("user has no permission"));
    }

    let removed = transaction(&mut conn, move |tx| {
        Box::pin(async move { Ok(user::soft_delete(&mut *tx, idx).await?) })
    })
    .await?;

    if removed == 0 {
        return Err(ApiError::not_found("user not found"));
    }
    tracing::info!("User {} deleted by {}", idx, caller.idx);
    Ok(ApiResponse::success(json!({ "idx": idx })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_fields_are_all_or_none() {
        let mut none = UpdateUser::default();
        assert!(none.password_change().unwrap().is_none());

        let mut partial: UpdateUser = serde_json::from_str(r#"{"password": "x"}"#).unwrap();
        assert!(partial.password_change().is_err());

        let mut full: UpdateUser =
            serde_json::from_str(r#"{"past_password": "a", "password": "b", "password_confirm": "b"}"#).unwrap();
        assert!(full.password_change().unwrap().is_some());
    }

    #[test]
    fn roles_are_validated() {
        assert_eq!(parse_role(Some("writer".to_string())).unwrap(), Some(Role::Writer));
        assert!(parse_role(Some("root".to_string())).is_err());
        assert_eq!(parse_role(None).unwrap(), None);
    }
}
