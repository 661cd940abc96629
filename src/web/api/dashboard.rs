//! Dashboard counters.

use axum::extract::State;
use axum::Json;
use serde::Serialize;
use serde_json::{json, Value};

use crate::context::AppContext;
use crate::error::Result;
use crate::store;
use crate::web::auth::CurrentUser;

#[derive(Serialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub total_users: i64,
    pub total_departments: i64,
    pub active_conversations: i64,
    pub total_transfers: i64,
}

pub fn collect_stats(conn: &rusqlite::Connection) -> Result<DashboardStats> {
    Ok(DashboardStats {
        total_users: store::count(conn, "SELECT COUNT(*) FROM users WHERE is_active = 1", [])?,
        total_departments: store::count(conn, "SELECT COUNT(*) FROM departments WHERE is_active = 1", [])?,
        active_conversations: store::count(
            conn,
            "SELECT COUNT(*) FROM conversations WHERE status IN ('open', 'transferred')",
            [],
        )?,
        total_transfers: store::count(conn, "SELECT COUNT(*) FROM transfers", [])?,
    })
}

pub async fn stats(
    State(ctx): State<AppContext>,
    CurrentUser(_user): CurrentUser,
) -> Result<Json<Value>> {
    let conn = ctx.db.connect()?;
    Ok(Json(json!({ "stats": collect_stats(&conn)? })))
}
