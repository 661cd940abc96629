//! Login, logout and the current session.

use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::context::AppContext;
use crate::error::{Error, Result};
use crate::identity::users;
use crate::web::auth::{generate_token, verify_password_async, CurrentUser};

#[derive(Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

fn invalid_credentials() -> Error {
    Error::Unauthenticated("invalid username or password".to_string())
}

/// Exchange credentials for a bearer token.
pub async fn login(
    State(ctx): State<AppContext>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<Value>> {
    let found = {
        let conn = ctx.db.connect()?;
        users::find_by_username(&conn, payload.username.trim())?
    };
    let user = found.ok_or_else(invalid_credentials)?;
    if !verify_password_async(&payload.password, &user.password_hash).await {
        return Err(invalid_credentials());
    }
    if !user.is_active {
        return Err(Error::Unauthenticated("account is deactivated".to_string()));
    }

    let auth = &ctx.settings.auth;
    let token = generate_token(&auth.jwt_secret, &user, auth.token_ttl_hours)?;
    tracing::info!("User {} logged in", user.username);
    Ok(Json(json!({ "token": token, "user": user })))
}

/// Tokens are stateless; logging out is the client dropping its token.
pub async fn logout(CurrentUser(user): CurrentUser) -> Json<Value> {
    tracing::debug!("User {} logged out", user.username);
    Json(json!({ "message": "logged out" }))
}

pub async fn me(CurrentUser(user): CurrentUser) -> Json<Value> {
    Json(json!({ "user": user }))
}
