//! Client connection representation.
//!
//! A [`Connection`] is the hub-facing half of one socket: the player's
//! identity, the room it currently belongs to, and the sending side of its
//! bounded outbound queue. The socket itself stays with the connection's
//! reader and writer workers.

use crate::types::{next_connection_id, ConnectionId, PlayerId, RoomId};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::SystemTime;
use tokio::sync::{mpsc, watch};

/// Frames waiting to be written to the socket.
pub type Outbound = mpsc::Receiver<Arc<str>>;

/// Why a frame could not be queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueError {
    /// The queue is at capacity; the client is not keeping up.
    Full,
    /// The connection has been closed.
    Closed,
}

/// Represents one live client connection.
#[derive(Debug)]
pub struct Connection {
    id: ConnectionId,
    player_id: PlayerId,
    connected_at: SystemTime,
    /// Room this connection is a member of
    room: Mutex<Option<RoomId>>,
    /// `None` once closed; dropping the sender ends the writer
    outbound: Mutex<Option<mpsc::Sender<Arc<str>>>>,
    /// Flipped to `true` on close to stop the reader
    closed: watch::Sender<bool>,
}

fn locked<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl Connection {
    /// Creates a connection for `player_id` with an outbound queue of `capacity` frames.
    ///
    /// # Returns
    ///
    /// The shared connection handle and the receiving end of its queue, which
    /// belongs to the writer worker.
    pub fn new(player_id: PlayerId, capacity: usize) -> (Arc<Self>, Outbound) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let (closed, _) = watch::channel(false);
        let connection = Arc::new(Self {
            id: next_connection_id(),
            player_id,
            connected_at: SystemTime::now(),
            room: Mutex::new(None),
            outbound: Mutex::new(Some(tx)),
            closed,
        });
        (connection, rx)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn player_id(&self) -> &PlayerId {
        &self.player_id
    }

    pub fn connected_at(&self) -> SystemTime {
        self.connected_at
    }

    /// The room this connection currently belongs to.
    pub fn room(&self) -> Option<RoomId> {
        *locked(&self.room)
    }

    pub(crate) fn set_room(&self, room: Option<RoomId>) -> Option<RoomId> {
        std::mem::replace(&mut *locked(&self.room), room)
    }

    /// Clears the room only if it is still `room`.
    pub(crate) fn clear_room_if(&self, room: RoomId) {
        let mut current = locked(&self.room);
        if *current == Some(room) {
            *current = None;
        }
    }

    /// Takes the room, leaving the connection roomless.
    pub(crate) fn take_room(&self) -> Option<RoomId> {
        locked(&self.room).take()
    }

    /// Queues a frame without waiting.
    pub fn try_enqueue(&self, frame: Arc<str>) -> Result<(), EnqueueError> {
        let outbound = locked(&self.outbound);
        let sender = outbound.as_ref().ok_or(EnqueueError::Closed)?;
        sender.try_send(frame).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => EnqueueError::Full,
            mpsc::error::TrySendError::Closed(_) => EnqueueError::Closed,
        })
    }

    /// Closes the outbound queue and signals the reader to stop. Idempotent.
    ///
    /// Frames already queued are still flushed by the writer before it sends
    /// the close frame.
    pub fn close(&self) {
        locked(&self.outbound).take();
        self.closed.send_replace(true);
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    /// A receiver that observes `true` once the connection is closed.
    pub fn closed_signal(&self) -> watch::Receiver<bool> {
        self.closed.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn player(name: &str) -> PlayerId {
        PlayerId::parse(name).unwrap()
    }

    #[test]
    fn queue_overflow_is_reported() {
        let (conn, mut rx) = Connection::new(player("ann"), 2);
        assert!(conn.try_enqueue("a".into()).is_ok());
        assert!(conn.try_enqueue("b".into()).is_ok());
        assert_eq!(conn.try_enqueue("c".into()), Err(EnqueueError::Full));

        assert_eq!(rx.try_recv().unwrap().as_ref(), "a");
        assert!(conn.try_enqueue("c".into()).is_ok());
    }

    #[test]
    fn close_stops_queueing_but_keeps_pending_frames() {
        let (conn, mut rx) = Connection::new(player("ann"), 4);
        conn.try_enqueue("pending".into()).unwrap();
        conn.close();
        conn.close();

        assert!(conn.is_closed());
        assert_eq!(conn.try_enqueue("late".into()), Err(EnqueueError::Closed));
        assert_eq!(rx.try_recv().unwrap().as_ref(), "pending");
        assert!(matches!(rx.try_recv(), Err(mpsc::error::TryRecvError::Disconnected)));
    }

    #[test]
    fn room_bookkeeping() {
        let (conn, _rx) = Connection::new(player("ann"), 1);
        let room = RoomId::new();
        assert_eq!(conn.set_room(Some(room)), None);
        conn.clear_room_if(RoomId::new());
        assert_eq!(conn.room(), Some(room));
        assert_eq!(conn.take_room(), Some(room));
        assert_eq!(conn.room(), None);
    }

    #[tokio::test]
    async fn closed_signal_fires_on_close() {
        let (conn, _rx) = Connection::new(player("ann"), 1);
        let mut signal = conn.closed_signal();
        conn.close();
        assert!(signal.wait_for(|closed| *closed).await.is_ok());
    }
}
