//! HTTP surface (Axum + JSON API).

pub mod api;
pub mod auth;
pub mod response;
pub mod router;
pub mod server;

pub use server::run_server;
