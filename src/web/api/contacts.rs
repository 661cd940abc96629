//! Address book and agent-initiated conversations.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde_json::{json, Value};

use crate::activity::{self, EventType};
use crate::context::AppContext;
use crate::conversation::{contacts, NewContact};
use crate::error::Result;
use crate::web::auth::CurrentUser;

pub async fn list_contacts(
    State(ctx): State<AppContext>,
    CurrentUser(_user): CurrentUser,
) -> Result<Json<Value>> {
    let conn = ctx.db.connect()?;
    Ok(Json(json!({ "contacts": contacts::list_contacts(&conn)? })))
}

pub async fn create_contact(
    State(ctx): State<AppContext>,
    CurrentUser(user): CurrentUser,
    Json(payload): Json<NewContact>,
) -> Result<(StatusCode, Json<Value>)> {
    let conn = ctx.db.connect()?;
    let contact = contacts::create_contact(&conn, &payload, Some(user.id))?;
    drop(conn);

    activity::record(
        &ctx.db,
        EventType::ContactCreated,
        Some(user.id),
        &format!("{} added contact '{}'", user.name, contact.name),
    );
    Ok((StatusCode::CREATED, Json(json!({ "contact": contact }))))
}

pub async fn start_conversation(
    State(ctx): State<AppContext>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<i64>,
) -> Result<(StatusCode, Json<Value>)> {
    let conversation = ctx.engine.start_conversation(id, &user)?;
    Ok((StatusCode::CREATED, Json(json!({ "conversation": conversation }))))
}
