//! Department listing and administration.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::access::{authorize, Action, Resource};
use crate::activity::{self, EventType};
use crate::context::AppContext;
use crate::error::Result;
use crate::identity::{departments, users, DepartmentUpdate};
use crate::web::auth::CurrentUser;

#[derive(Deserialize)]
pub struct CreateDepartmentRequest {
    pub name: String,
    pub description: Option<String>,
}

#[derive(Deserialize)]
pub struct UpdateDepartmentRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub is_active: Option<bool>,
}

pub async fn list_departments(
    State(ctx): State<AppContext>,
    CurrentUser(_user): CurrentUser,
) -> Result<Json<Value>> {
    let conn = ctx.db.connect()?;
    Ok(Json(json!({ "departments": departments::list_departments(&conn)? })))
}

/// Active members of a department, used to pick a transfer target.
pub async fn list_members(
    State(ctx): State<AppContext>,
    CurrentUser(_user): CurrentUser,
    Path(id): Path<i64>,
) -> Result<Json<Value>> {
    let conn = ctx.db.connect()?;
    departments::require_department(&conn, id)?;
    Ok(Json(json!({ "users": users::list_department_members(&conn, id)? })))
}

pub async fn create_department(
    State(ctx): State<AppContext>,
    CurrentUser(actor): CurrentUser,
    Json(payload): Json<CreateDepartmentRequest>,
) -> Result<(StatusCode, Json<Value>)> {
    authorize(&actor, Action::ManageDepartments, Resource::System)?;
    let conn = ctx.db.connect()?;
    let department =
        departments::create_department(&conn, &payload.name, payload.description.as_deref())?;
    drop(conn);

    activity::record(
        &ctx.db,
        EventType::DepartmentCreated,
        Some(actor.id),
        &format!("Department '{}' was created", department.name),
    );
    Ok((StatusCode::CREATED, Json(json!({ "department": department }))))
}

pub async fn update_department(
    State(ctx): State<AppContext>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateDepartmentRequest>,
) -> Result<Json<Value>> {
    authorize(&actor, Action::ManageDepartments, Resource::System)?;
    let update = DepartmentUpdate {
        name: payload.name,
        description: payload.description,
        is_active: payload.is_active,
    };
    let conn = ctx.db.connect()?;
    let department = departments::update_department(&conn, id, &update)?;
    drop(conn);

    activity::record(
        &ctx.db,
        EventType::DepartmentUpdated,
        Some(actor.id),
        &format!("Department '{}' was updated", department.name),
    );
    Ok(Json(json!({ "department": department })))
}

pub async fn delete_department(
    State(ctx): State<AppContext>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<i64>,
) -> Result<Json<Value>> {
    authorize(&actor, Action::ManageDepartments, Resource::System)?;
    let conn = ctx.db.connect()?;
    let department = departments::delete_department(&conn, id)?;
    drop(conn);

    activity::record(
        &ctx.db,
        EventType::DepartmentDeleted,
        Some(actor.id),
        &format!("Department '{}' was deleted", department.name),
    );
    Ok(Json(json!({ "message": "department deleted" })))
}
