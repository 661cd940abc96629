//! Admin-managed key/value settings.

use std::collections::BTreeMap;

use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};

use crate::access::{authorize, Action, Resource};
use crate::activity::{self, EventType};
use crate::context::AppContext;
use crate::error::Result;
use crate::system_settings::{self, SettingsMap};
use crate::web::auth::CurrentUser;

pub async fn get_settings(
    State(ctx): State<AppContext>,
    CurrentUser(actor): CurrentUser,
) -> Result<Json<SettingsMap>> {
    authorize(&actor, Action::ManageSettings, Resource::System)?;
    let conn = ctx.db.connect()?;
    Ok(Json(system_settings::load_all(&conn)?))
}

pub async fn update_settings(
    State(ctx): State<AppContext>,
    CurrentUser(actor): CurrentUser,
    Json(payload): Json<BTreeMap<String, Value>>,
) -> Result<Json<Value>> {
    authorize(&actor, Action::ManageSettings, Resource::System)?;
    let mut conn = ctx.db.connect()?;
    let settings = system_settings::upsert(&mut conn, &payload)?;
    drop(conn);

    let keys: Vec<&str> = payload.keys().map(|k| k.trim()).collect();
    activity::record(
        &ctx.db,
        EventType::SettingsUpdated,
        Some(actor.id),
        &format!("Settings updated: {}", keys.join(", ")),
    );
    Ok(Json(json!({ "message": "settings updated", "settings": settings })))
}
