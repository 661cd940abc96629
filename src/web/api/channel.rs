//! Channel connections and the inbound webhooks.

use std::collections::HashMap;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde_json::{json, Value};

use crate::access::{authorize, Action, Resource};
use crate::activity::{self, EventType};
use crate::channel::{connections, inbound, CloudPayload, DeliveryReport, GatewayPayload, NewConnection};
use crate::context::AppContext;
use crate::error::Result;
use crate::web::auth::CurrentUser;

pub async fn connect(
    State(ctx): State<AppContext>,
    CurrentUser(actor): CurrentUser,
    Json(payload): Json<NewConnection>,
) -> Result<(StatusCode, Json<Value>)> {
    authorize(&actor, Action::ManageChannels, Resource::System)?;
    let conn = ctx.db.connect()?;
    let connection = connections::connect(&conn, &payload)?;
    drop(conn);

    activity::record(
        &ctx.db,
        EventType::ChannelConnected,
        Some(actor.id),
        &format!("Number {} was connected", connection.phone_number),
    );
    Ok((StatusCode::CREATED, Json(json!({ "connection": connection }))))
}

pub async fn status(
    State(ctx): State<AppContext>,
    CurrentUser(_user): CurrentUser,
) -> Result<Json<Value>> {
    let conn = ctx.db.connect()?;
    let active = connections::list_active(&conn)?;
    Ok(Json(json!({
        "connected": !active.is_empty(),
        "connections": active,
    })))
}

pub async fn disconnect(
    State(ctx): State<AppContext>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<i64>,
) -> Result<Json<Value>> {
    authorize(&actor, Action::ManageChannels, Resource::System)?;
    let conn = ctx.db.connect()?;
    let connection = connections::disconnect(&conn, id)?;
    drop(conn);

    activity::record(
        &ctx.db,
        EventType::ChannelDisconnected,
        Some(actor.id),
        &format!("Number {} was disconnected", connection.phone_number),
    );
    Ok(Json(json!({ "connection": connection })))
}

/// Provider verification handshake; answers the bare challenge.
pub async fn verify(
    State(ctx): State<AppContext>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<String> {
    inbound::verify_webhook(
        &ctx.db,
        params.get("hub.mode").map(String::as_str),
        params.get("hub.verify_token").map(String::as_str),
        params.get("hub.challenge").map(String::as_str),
    )
}

/// Cloud webhook batch. Always acknowledged so the provider does not retry
/// messages that were already stored.
pub async fn receive(
    State(ctx): State<AppContext>,
    Json(payload): Json<CloudPayload>,
) -> Json<DeliveryReport> {
    let messages = inbound::normalize_cloud_payload(&payload);
    Json(inbound::deliver(&ctx.engine, messages))
}

/// Single message from the local gateway.
pub async fn receive_internal(
    State(ctx): State<AppContext>,
    Json(payload): Json<GatewayPayload>,
) -> Result<Json<Value>> {
    let message = ctx
        .engine
        .ingest_customer_message(inbound::normalize_gateway_payload(&payload))?;
    Ok(Json(json!({ "status": "received", "message": message })))
}
