//! Outbound relay to the messaging gateway.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;

use crate::error::{Error, Result};
use crate::phone::to_chat_id;

/// Delivers agent text to the customer's messaging channel.
#[async_trait]
pub trait ChannelRelay: Send + Sync {
    /// Relay name, for logs.
    fn name(&self) -> &str;

    /// Send `text` to the customer stored under the normalized number `to`.
    /// One attempt, no retries.
    async fn send_text(&self, to: &str, text: &str) -> Result<()>;
}

#[derive(Serialize)]
struct SendRequest<'a> {
    to: &'a str,
    text: &'a str,
}

/// Posts `{to, text}` JSON to the gateway's send endpoint, where `to` is
/// the customer's chat id (`5511999998888@c.us`).
pub struct GatewayRelay {
    client: Client,
    url: String,
}

impl GatewayRelay {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("relay client: {}", e)))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl ChannelRelay for GatewayRelay {
    fn name(&self) -> &str {
        "gateway"
    }

    async fn send_text(&self, to: &str, text: &str) -> Result<()> {
        let chat_id = to_chat_id(to);
        let response = self
            .client
            .post(&self.url)
            .json(&SendRequest { to: &chat_id, text })
            .send()
            .await
            .map_err(|e| Error::UpstreamRelayFailure(format!("gateway unreachable: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::UpstreamRelayFailure(format!(
                "gateway answered {}",
                status
            )));
        }

        tracing::debug!("Relayed {} chars to {}", text.len(), chat_id);
        Ok(())
    }
}
