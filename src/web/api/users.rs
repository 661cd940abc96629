//! Staff administration (admin only).

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::access::{authorize, Action, Resource};
use crate::activity::{self, EventType};
use crate::context::AppContext;
use crate::error::{Error, Result};
use crate::identity::{users, NewUser, Role, UserUpdate};
use crate::web::auth::{hash_password_async, CurrentUser};

#[derive(Deserialize)]
pub struct CreateUserRequest {
    pub username: String,
    pub name: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub role: Role,
    pub department_id: Option<i64>,
}

/// Partial update. An explicit `"department_id": null` clears the department.
#[derive(Deserialize)]
pub struct UpdateUserRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub role: Option<Role>,
    #[serde(default, deserialize_with = "present")]
    pub department_id: Option<Option<i64>>,
    pub is_active: Option<bool>,
}

/// Distinguishes a field sent as `null` from an absent one.
fn present<'de, D>(deserializer: D) -> std::result::Result<Option<Option<i64>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Option::<i64>::deserialize(deserializer).map(Some)
}

pub async fn list_users(
    State(ctx): State<AppContext>,
    CurrentUser(actor): CurrentUser,
) -> Result<Json<Value>> {
    authorize(&actor, Action::ManageUsers, Resource::System)?;
    let conn = ctx.db.connect()?;
    Ok(Json(json!({ "users": users::list_users(&conn)? })))
}

pub async fn get_user(
    State(ctx): State<AppContext>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<i64>,
) -> Result<Json<Value>> {
    authorize(&actor, Action::ManageUsers, Resource::System)?;
    let conn = ctx.db.connect()?;
    Ok(Json(json!({ "user": users::require_user(&conn, id)? })))
}

pub async fn create_user(
    State(ctx): State<AppContext>,
    CurrentUser(actor): CurrentUser,
    Json(payload): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<Value>)> {
    authorize(&actor, Action::ManageUsers, Resource::System)?;
    if payload.password.is_empty() {
        return Err(Error::invalid("password is required"));
    }

    let new = NewUser {
        username: payload.username,
        name: payload.name,
        email: payload.email,
        password_hash: hash_password_async(&payload.password).await?,
        role: payload.role,
        department_id: payload.department_id,
    };
    let conn = ctx.db.connect()?;
    let user = users::create_user(&conn, &new)?;
    drop(conn);

    activity::record(
        &ctx.db,
        EventType::UserCreated,
        Some(actor.id),
        &format!("User '{}' was created", user.name),
    );
    Ok((StatusCode::CREATED, Json(json!({ "user": user }))))
}

pub async fn update_user(
    State(ctx): State<AppContext>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateUserRequest>,
) -> Result<Json<Value>> {
    authorize(&actor, Action::ManageUsers, Resource::System)?;
    if id == actor.id && payload.is_active == Some(false) {
        return Err(Error::invalid("you cannot deactivate your own account"));
    }

    let password_hash = match payload.password.filter(|p| !p.is_empty()) {
        Some(password) => Some(hash_password_async(&password).await?),
        None => None,
    };
    let update = UserUpdate {
        name: payload.name,
        email: payload.email,
        password_hash,
        role: payload.role,
        department_id: payload.department_id,
        is_active: payload.is_active,
    };
    let conn = ctx.db.connect()?;
    let user = users::update_user(&conn, id, &update)?;
    drop(conn);

    activity::record(
        &ctx.db,
        EventType::UserUpdated,
        Some(actor.id),
        &format!("User '{}' was updated", user.name),
    );
    Ok(Json(json!({ "user": user })))
}
