//! Cross-process relay boundary.
//!
//! Every room broadcast is also published to the relay so that members
//! connected to another server process receive it. Events carry the
//! publishing instance's id so no instance re-delivers its own broadcasts.

pub mod local;

pub use local::LocalRelay;

use crate::types::{InstanceId, RoomId};
use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RelayError {
    #[error("relay unavailable: {0}")]
    Unavailable(String),
}

/// One relayed room broadcast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayEnvelope {
    /// Instance that published the event
    pub origin: InstanceId,
    pub room_id: RoomId,
    /// The encoded frame, exactly as delivered to local members
    pub frame: String,
}

/// Name of the pub/sub channel carrying a room's events.
pub fn channel_name(room_id: RoomId) -> String {
    format!("game:{}", room_id)
}

/// Publish/subscribe channel keyed by room.
#[async_trait]
pub trait Relay: Send + Sync {
    /// Health check used at startup.
    async fn ping(&self) -> Result<(), RelayError>;

    async fn publish(&self, envelope: RelayEnvelope) -> Result<(), RelayError>;

    /// Stream of events published to `room_id` from now on.
    async fn subscribe(&self, room_id: RoomId) -> Result<BoxStream<'static, RelayEnvelope>, RelayError>;
}
