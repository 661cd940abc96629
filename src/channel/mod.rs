//! Messaging channel boundary: inbound adapter, outbound relay and
//! registered business connections.

pub mod connections;
pub mod inbound;
pub mod relay;

pub use connections::{ChannelConnection, NewConnection};
pub use inbound::{deliver, verify_webhook, CloudPayload, DeliveryReport, GatewayPayload};
pub use relay::{ChannelRelay, GatewayRelay};
