//! Switchboard library root.

pub mod access;
pub mod activity;
pub mod channel;
pub mod cli;
pub mod config;
pub mod context;
pub mod conversation;
pub mod error;
pub mod identity;
pub mod logging;
pub mod notify;
pub mod phone;
pub mod store;
pub mod system_settings;
pub mod web;

#[cfg(test)]
mod testing;

pub use cli::Commands;
pub use config::{load_settings, Settings};
pub use context::AppContext;
pub use conversation::ConversationEngine;
pub use error::{Error, Result};
pub use web::run_server;
