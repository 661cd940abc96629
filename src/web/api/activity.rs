//! Recent activity feed.

use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::access::{authorize, Action, Resource};
use crate::activity;
use crate::context::AppContext;
use crate::error::Result;
use crate::web::auth::CurrentUser;

const DEFAULT_LIMIT: u32 = 5;
const MAX_LIMIT: u32 = 100;

#[derive(Deserialize)]
pub struct RecentQuery {
    pub limit: Option<u32>,
}

pub async fn recent(
    State(ctx): State<AppContext>,
    CurrentUser(user): CurrentUser,
    Query(query): Query<RecentQuery>,
) -> Result<Json<Value>> {
    authorize(&user, Action::ViewActivity, Resource::System)?;
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    Ok(Json(json!({ "activities": activity::recent(&ctx.db, limit)? })))
}
