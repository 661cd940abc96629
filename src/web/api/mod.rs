//! JSON API handlers.

pub mod activity;
pub mod channel;
pub mod contacts;
pub mod conversations;
pub mod dashboard;
pub mod departments;
pub mod profile;
pub mod session;
pub mod settings;
pub mod users;
