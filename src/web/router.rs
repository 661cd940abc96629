//! Route definitions for web server.

use axum::{
    routing::{delete, get, post, put},
    Router,
};

use crate::context::AppContext;

use super::api;

/// Create the API router.
pub fn create_api_router() -> Router<AppContext> {
    Router::new()
        // Session
        .route("/auth/login", post(api::session::login))
        .route("/auth/logout", post(api::session::logout))
        .route("/auth/me", get(api::session::me))
        .route("/profile/me", put(api::profile::update_me))

        // Staff and departments
        .route("/users", get(api::users::list_users).post(api::users::create_user))
        .route("/users/:id", get(api::users::get_user).put(api::users::update_user))
        .route(
            "/departments",
            get(api::departments::list_departments).post(api::departments::create_department),
        )
        .route(
            "/departments/:id",
            put(api::departments::update_department).delete(api::departments::delete_department),
        )
        .route("/departments/:id/members", get(api::departments::list_members))

        // Conversations
        .route("/conversations", get(api::conversations::list_conversations))
        .route(
            "/conversations/:id",
            get(api::conversations::get_conversation).delete(api::conversations::delete_conversation),
        )
        .route("/conversations/:id/messages", post(api::conversations::send_message))
        .route("/conversations/:id/transfer", post(api::conversations::transfer))
        .route("/conversations/:id/close", post(api::conversations::close))
        .route("/conversations/:id/reopen", post(api::conversations::reopen))
        .route("/contacts", get(api::contacts::list_contacts).post(api::contacts::create_contact))
        .route("/contacts/:id/start_conversation", post(api::contacts::start_conversation))

        // Reporting
        .route("/activity/recent", get(api::activity::recent))
        .route("/dashboard/stats", get(api::dashboard::stats))

        // System settings
        .route(
            "/settings",
            get(api::settings::get_settings).post(api::settings::update_settings),
        )

        // Channel
        .route("/channel/connect", post(api::channel::connect))
        .route("/channel/status", get(api::channel::status))
        .route("/channel/connections/:id", delete(api::channel::disconnect))
        .route("/channel/webhook_internal", post(api::channel::receive_internal))
        .route("/webhook", get(api::channel::verify).post(api::channel::receive))
}

/// Create the full app router.
pub fn create_app_router(ctx: AppContext) -> Router {
    Router::new()
        .nest("/api", create_api_router())
        .route("/health", get(health_check))
        .with_state(ctx)
}

/// Health check endpoint.
async fn health_check() -> &'static str {
    "OK"
}
