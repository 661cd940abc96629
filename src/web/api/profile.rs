//! Self-service profile edits.

use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::context::AppContext;
use crate::error::{Error, Result};
use crate::identity::{users, UserUpdate};
use crate::web::auth::{hash_password_async, verify_password_async, CurrentUser};

#[derive(Deserialize)]
pub struct ProfileUpdate {
    pub name: Option<String>,
    pub current_password: Option<String>,
    pub new_password: Option<String>,
}

/// Update the caller's own name and password. Changing the password
/// requires the current one.
pub async fn update_me(
    State(ctx): State<AppContext>,
    CurrentUser(user): CurrentUser,
    Json(payload): Json<ProfileUpdate>,
) -> Result<Json<Value>> {
    let mut update = UserUpdate {
        name: payload.name,
        ..Default::default()
    };

    if let Some(new_password) = payload.new_password.filter(|p| !p.is_empty()) {
        let current = payload
            .current_password
            .filter(|p| !p.is_empty())
            .ok_or_else(|| Error::invalid("current_password is required to change the password"))?;
        if !verify_password_async(&current, &user.password_hash).await {
            return Err(Error::invalid("current password is incorrect"));
        }
        update.password_hash = Some(hash_password_async(&new_password).await?);
    }

    let conn = ctx.db.connect()?;
    let updated = users::update_user(&conn, user.id, &update)?;
    Ok(Json(json!({ "message": "profile updated", "user": updated })))
}
