//! Application context shared by every request handler.

use std::sync::Arc;
use std::time::Duration;

use crate::channel::{ChannelRelay, GatewayRelay};
use crate::config::Settings;
use crate::conversation::ConversationEngine;
use crate::error::Result;
use crate::notify::Notifier;
use crate::store::Database;

/// Built once at startup and handed to axum as router state.
#[derive(Clone)]
pub struct AppContext {
    pub settings: Arc<Settings>,
    pub db: Database,
    pub notifier: Notifier,
    pub engine: ConversationEngine,
}

impl AppContext {
    /// Open the database and wire the gateway relay from `settings`.
    pub fn new(settings: Settings) -> Result<Self> {
        let db = Database::open(settings.database.resolved_path()?)?;
        let relay = GatewayRelay::new(
            settings.channel.gateway_url.clone(),
            Duration::from_secs(settings.channel.relay_timeout_secs),
        )?;
        Ok(Self::from_parts(settings, db, Notifier::new(), Arc::new(relay)))
    }

    pub fn from_parts(
        settings: Settings,
        db: Database,
        notifier: Notifier,
        relay: Arc<dyn ChannelRelay>,
    ) -> Self {
        let engine = ConversationEngine::new(
            db.clone(),
            notifier.clone(),
            relay,
            settings.channel.default_department.clone(),
        );
        Self {
            settings: Arc::new(settings),
            db,
            notifier,
            engine,
        }
    }
}
