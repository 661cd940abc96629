//! Conversation endpoints. All policy lives in the engine.

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::context::AppContext;
use crate::conversation::{ConversationStatus, OutgoingMessage, SendOutcome, TransferRequest};
use crate::error::{Error, Result};
use crate::web::auth::CurrentUser;

#[derive(Deserialize)]
pub struct ListQuery {
    pub status: Option<String>,
}

pub async fn list_conversations(
    State(ctx): State<AppContext>,
    CurrentUser(user): CurrentUser,
    Query(query): Query<ListQuery>,
) -> Result<Json<Value>> {
    let status = match query.status.as_deref().filter(|s| !s.is_empty()) {
        Some(raw) => Some(raw.parse::<ConversationStatus>().map_err(Error::InvalidArgument)?),
        None => None,
    };
    let conversations = ctx.engine.list_conversations(&user, status)?;
    Ok(Json(json!({ "conversations": conversations })))
}

pub async fn get_conversation(
    State(ctx): State<AppContext>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<i64>,
) -> Result<Json<Value>> {
    let detail = ctx.engine.conversation_detail(id, &user)?;
    Ok(Json(json!({
        "conversation": detail.conversation,
        "messages": detail.messages,
        "transfers": detail.transfers,
    })))
}

pub async fn delete_conversation(
    State(ctx): State<AppContext>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<i64>,
) -> Result<Json<Value>> {
    ctx.engine.delete_conversation(id, &user)?;
    Ok(Json(json!({ "message": "conversation deleted" })))
}

pub async fn send_message(
    State(ctx): State<AppContext>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<i64>,
    Json(payload): Json<OutgoingMessage>,
) -> Result<Json<SendOutcome>> {
    let outcome = ctx.engine.send_agent_message(id, &user, payload).await?;
    Ok(Json(outcome))
}

pub async fn transfer(
    State(ctx): State<AppContext>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<i64>,
    Json(payload): Json<TransferRequest>,
) -> Result<Json<Value>> {
    let transfer = ctx.engine.transfer(id, &user, &payload)?;
    Ok(Json(json!({ "transfer": transfer })))
}

pub async fn close(
    State(ctx): State<AppContext>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<i64>,
) -> Result<Json<Value>> {
    let conversation = ctx.engine.close(id, &user)?;
    Ok(Json(json!({ "conversation": conversation })))
}

pub async fn reopen(
    State(ctx): State<AppContext>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<i64>,
) -> Result<Json<Value>> {
    let conversation = ctx.engine.reopen(id, &user)?;
    Ok(Json(json!({ "conversation": conversation })))
}
