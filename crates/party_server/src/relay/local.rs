//! In-process relay built on tokio broadcast channels.
//!
//! Several coordinators sharing one `LocalRelay` behave like several server
//! processes sharing one pub/sub broker.

use super::{channel_name, Relay, RelayEnvelope, RelayError};
use crate::types::RoomId;
use async_trait::async_trait;
use dashmap::DashMap;
use futures::stream::{self, BoxStream, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, warn};

const CHANNEL_CAPACITY: usize = 1024;

type Channels = Arc<DashMap<RoomId, broadcast::Sender<RelayEnvelope>>>;

#[derive(Debug)]
pub struct LocalRelay {
    channels: Channels,
    available: AtomicBool,
}

impl Default for LocalRelay {
    fn default() -> Self {
        Self {
            channels: Arc::new(DashMap::new()),
            available: AtomicBool::new(true),
        }
    }
}

impl LocalRelay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `ping` and `publish` fail while `false`.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), RelayError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(RelayError::Unavailable("local relay switched off".to_string()))
        }
    }

    /// Rooms with at least one live subscriber.
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }
}

/// A subscriber's receiver. The room's channel is dropped with its last one.
struct Subscription {
    receiver: broadcast::Receiver<RelayEnvelope>,
    room_id: RoomId,
    channels: Channels,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        // Our own receiver still counts here.
        self.channels
            .remove_if(&self.room_id, |_, sender| sender.receiver_count() <= 1);
    }
}

#[async_trait]
impl Relay for LocalRelay {
    async fn ping(&self) -> Result<(), RelayError> {
        self.check_available()
    }

    async fn publish(&self, envelope: RelayEnvelope) -> Result<(), RelayError> {
        self.check_available()?;
        let Some(sender) = self.channels.get(&envelope.room_id).map(|s| s.clone()) else {
            return Ok(());
        };
        if sender.send(envelope).is_err() {
            debug!("No relay subscribers left");
        }
        Ok(())
    }

    async fn subscribe(&self, room_id: RoomId) -> Result<BoxStream<'static, RelayEnvelope>, RelayError> {
        // Subscribe under the entry lock so a concurrent drop cannot remove the channel in between.
        let receiver = self
            .channels
            .entry(room_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe();
        let subscription = Subscription {
            receiver,
            room_id,
            channels: self.channels.clone(),
        };
        let channel = channel_name(room_id);

        let events = stream::unfold((subscription, channel), |(mut subscription, channel)| async move {
            loop {
                match subscription.receiver.recv().await {
                    Ok(envelope) => return Some((envelope, (subscription, channel))),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("📡 Relay subscriber on {} lagged, skipped {} event(s)", channel, skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        });
        Ok(events.boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::InstanceId;

    #[tokio::test]
    async fn subscribers_receive_events_for_their_room_only() {
        let relay = LocalRelay::new();
        let (room, other) = (RoomId::new(), RoomId::new());
        let mut events = relay.subscribe(room).await.unwrap();
        let _other_events = relay.subscribe(other).await.unwrap();

        let origin = InstanceId::new();
        relay
            .publish(RelayEnvelope { origin, room_id: other, frame: "elsewhere".into() })
            .await
            .unwrap();
        relay
            .publish(RelayEnvelope { origin, room_id: room, frame: "hello".into() })
            .await
            .unwrap();

        let received = events.next().await.unwrap();
        assert_eq!(received.frame, "hello");
        assert_eq!(received.origin, origin);
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_fine() {
        let relay = LocalRelay::new();
        let envelope = RelayEnvelope { origin: InstanceId::new(), room_id: RoomId::new(), frame: "x".into() };
        assert!(relay.publish(envelope.clone()).await.is_ok());

        relay.set_available(false);
        assert!(relay.publish(envelope).await.is_err());
        assert!(relay.ping().await.is_err());
    }

    #[tokio::test]
    async fn channel_is_dropped_with_its_last_subscriber() {
        let relay = LocalRelay::new();
        let room = RoomId::new();
        let first = relay.subscribe(room).await.unwrap();
        let second = relay.subscribe(room).await.unwrap();
        assert_eq!(relay.channel_count(), 1);

        drop(first);
        assert_eq!(relay.channel_count(), 1);
        drop(second);
        assert_eq!(relay.channel_count(), 0);

        let envelope = RelayEnvelope { origin: InstanceId::new(), room_id: room, frame: "late".into() };
        assert!(relay.publish(envelope).await.is_ok());
        assert_eq!(relay.channel_count(), 0);
    }

    #[test]
    fn channel_names_follow_room_ids() {
        let room = RoomId::new();
        assert_eq!(channel_name(room), format!("game:{}", room));
    }
}
