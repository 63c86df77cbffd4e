//! Room registry and broadcast fan-out.
//!
//! The [`Hub`] is the authoritative record of which connections are live and
//! which room each belongs to. It knows nothing about game rules; it moves
//! already-encoded frames onto outbound queues.
//!
//! Lock order is `connections` before `rooms` before a single room's member
//! list, and no hub lock is held while another room's list is locked. Frames
//! are only ever queued with `try_send`, so no lock is held across a socket
//! write.

use crate::connection::{Connection, EnqueueError};
use crate::types::{PlayerId, RoomId, RoomStatus};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Membership failures. None of them leave side effects behind.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HubError {
    #[error("game {0} not found")]
    RoomNotFound(RoomId),
    #[error("game {room} is full ({max} players)")]
    RoomFull { room: RoomId, max: usize },
    #[error("game {room} is not accepting players (status: {status})")]
    RoomNotJoinable { room: RoomId, status: RoomStatus },
    #[error("player {0} is not connected")]
    NotConnected(PlayerId),
}

#[derive(Debug)]
struct RoomMembers {
    max_players: usize,
    state: RwLock<RoomState>,
}

#[derive(Debug)]
struct RoomState {
    status: RoomStatus,
    members: Vec<Arc<Connection>>,
}

/// Live connections and room membership.
#[derive(Debug, Default)]
pub struct Hub {
    connections: RwLock<HashMap<PlayerId, Arc<Connection>>>,
    rooms: RwLock<HashMap<RoomId, Arc<RoomMembers>>>,
}

impl Hub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a connection to the live set.
    ///
    /// Registering the same connection twice is a no-op. Registering a new
    /// connection for a player who is already connected replaces the old one:
    /// the old connection is closed and its room membership moves to the new
    /// connection without anyone leaving the room.
    ///
    /// # Returns
    ///
    /// The room the new connection inherited, if any.
    pub async fn register(&self, connection: Arc<Connection>) -> Option<RoomId> {
        let replaced = {
            let mut connections = self.connections.write().await;
            if let Some(existing) = connections.get(connection.player_id()) {
                if existing.id() == connection.id() {
                    return None;
                }
            }
            connections.insert(connection.player_id().clone(), connection.clone())
        };

        let previous = replaced?;
        previous.close();
        let room_id = previous.take_room()?;

        let room = self.rooms.read().await.get(&room_id).cloned()?;
        let mut state = room.state.write().await;
        let slot = state.members.iter_mut().find(|member| member.id() == previous.id())?;
        *slot = connection.clone();
        connection.set_room(Some(room_id));
        info!(
            "🔁 Player {} reconnected, connection {} replaces {} in game {}",
            connection.player_id(),
            connection.id(),
            previous.id(),
            room_id
        );
        Some(room_id)
    }

    /// Removes a connection from the live set and from its room, then closes it.
    ///
    /// Only the exact connection is removed; a newer connection registered for
    /// the same player is left alone. The connection's room is not cleared so
    /// that its teardown can still see which room it left.
    ///
    /// # Returns
    ///
    /// `true` if the connection was registered.
    pub async fn unregister(&self, connection: &Arc<Connection>) -> bool {
        let removed = {
            let mut connections = self.connections.write().await;
            match connections.get(connection.player_id()) {
                Some(current) if current.id() == connection.id() => {
                    connections.remove(connection.player_id());
                    true
                }
                _ => false,
            }
        };

        if let Some(room_id) = connection.room() {
            self.remove_member(room_id, connection).await;
        }
        connection.close();
        if removed {
            debug!("Connection {} for player {} unregistered", connection.id(), connection.player_id());
        }
        removed
    }

    /// Creates an empty room in the `waiting` state. Idempotent.
    pub async fn open_room(&self, room_id: RoomId, max_players: usize) {
        let mut rooms = self.rooms.write().await;
        rooms.entry(room_id).or_insert_with(|| {
            Arc::new(RoomMembers {
                max_players,
                state: RwLock::new(RoomState {
                    status: RoomStatus::Waiting,
                    members: Vec::new(),
                }),
            })
        });
    }

    /// Deletes a room, detaching every member from it.
    ///
    /// # Returns
    ///
    /// The players that were still members.
    pub async fn close_room(&self, room_id: RoomId) -> Vec<PlayerId> {
        let Some(room) = self.rooms.write().await.remove(&room_id) else {
            return Vec::new();
        };
        let mut state = room.state.write().await;
        state.status = RoomStatus::Finished;
        state
            .members
            .drain(..)
            .map(|member| {
                member.clear_room_if(room_id);
                member.player_id().clone()
            })
            .collect()
    }

    /// Sets a room's status; joins are only accepted while `waiting`.
    pub async fn set_status(&self, room_id: RoomId, status: RoomStatus) -> Result<(), HubError> {
        let room = self.room(room_id).await?;
        room.state.write().await.status = status;
        Ok(())
    }

    pub async fn room_status(&self, room_id: RoomId) -> Option<RoomStatus> {
        let room = self.rooms.read().await.get(&room_id).cloned()?;
        let status = room.state.read().await.status;
        Some(status)
    }

    async fn room(&self, room_id: RoomId) -> Result<Arc<RoomMembers>, HubError> {
        self.rooms
            .read()
            .await
            .get(&room_id)
            .cloned()
            .ok_or(HubError::RoomNotFound(room_id))
    }

    /// Adds a connection to a room's membership.
    ///
    /// Joining a room the connection is already in succeeds without change.
    /// A connection that was in another room is removed from it.
    ///
    /// # Errors
    ///
    /// * [`HubError::RoomNotFound`] if the room is not open
    /// * [`HubError::RoomNotJoinable`] unless the room is `waiting`
    /// * [`HubError::RoomFull`] if the room already holds `max_players`
    ///
    /// # Returns
    ///
    /// The member count after the join.
    pub async fn join(&self, room_id: RoomId, connection: &Arc<Connection>) -> Result<usize, HubError> {
        let room = self.room(room_id).await?;
        let (count, previous) = {
            let mut state = room.state.write().await;
            if Self::admit(room_id, &room, &state, connection)? {
                return Ok(state.members.len());
            }
            state.members.push(connection.clone());
            (state.members.len(), connection.set_room(Some(room_id)))
        };

        if let Some(previous) = previous.filter(|previous| *previous != room_id) {
            self.remove_member(previous, connection).await;
        }
        Ok(count)
    }

    /// Runs the checks of [`join`](Self::join) without joining.
    pub async fn check_join(&self, room_id: RoomId, connection: &Arc<Connection>) -> Result<(), HubError> {
        let room = self.room(room_id).await?;
        let state = room.state.read().await;
        Self::admit(room_id, &room, &state, connection).map(|_| ())
    }

    /// `Ok(true)` if already a member, `Ok(false)` if there is a free seat.
    fn admit(
        room_id: RoomId,
        room: &RoomMembers,
        state: &RoomState,
        connection: &Arc<Connection>,
    ) -> Result<bool, HubError> {
        if state.members.iter().any(|member| member.id() == connection.id()) {
            return Ok(true);
        }
        if state.status != RoomStatus::Waiting {
            return Err(HubError::RoomNotJoinable {
                room: room_id,
                status: state.status,
            });
        }
        if state.members.len() >= room.max_players {
            return Err(HubError::RoomFull {
                room: room_id,
                max: room.max_players,
            });
        }
        Ok(false)
    }

    /// Removes a connection from a room. Absent connections are a no-op.
    ///
    /// # Returns
    ///
    /// `true` if the connection was a member.
    pub async fn leave(&self, room_id: RoomId, connection: &Arc<Connection>) -> bool {
        let removed = self.remove_member(room_id, connection).await;
        connection.clear_room_if(room_id);
        removed
    }

    async fn remove_member(&self, room_id: RoomId, connection: &Arc<Connection>) -> bool {
        let Some(room) = self.rooms.read().await.get(&room_id).cloned() else {
            return false;
        };
        let mut state = room.state.write().await;
        let before = state.members.len();
        state.members.retain(|member| member.id() != connection.id());
        state.members.len() != before
    }

    /// Queues `frame` for every current member of a room.
    ///
    /// Members whose queue is full or closed are unregistered after the
    /// fan-out; everyone else still gets the frame.
    ///
    /// # Returns
    ///
    /// The number of members the frame was queued for.
    pub async fn broadcast(&self, room_id: RoomId, frame: Arc<str>) -> usize {
        let Some(room) = self.rooms.read().await.get(&room_id).cloned() else {
            return 0;
        };

        let mut delivered = 0;
        let mut dropped = Vec::new();
        {
            let state = room.state.read().await;
            for member in &state.members {
                match member.try_enqueue(frame.clone()) {
                    Ok(()) => delivered += 1,
                    Err(reason) => dropped.push((member.clone(), reason)),
                }
            }
        }

        for (member, reason) in dropped {
            self.drop_connection(&member, reason).await;
        }
        delivered
    }

    /// Queues `frame` for one player's live connection.
    pub async fn send_to(&self, player_id: &PlayerId, frame: Arc<str>) -> Result<(), HubError> {
        let connection = self
            .connection(player_id)
            .await
            .ok_or_else(|| HubError::NotConnected(player_id.clone()))?;
        self.send_to_connection(&connection, frame).await
    }

    /// Queues `frame` for a specific connection, dropping it on overflow.
    pub async fn send_to_connection(&self, connection: &Arc<Connection>, frame: Arc<str>) -> Result<(), HubError> {
        match connection.try_enqueue(frame) {
            Ok(()) => Ok(()),
            Err(reason) => {
                self.drop_connection(connection, reason).await;
                Err(HubError::NotConnected(connection.player_id().clone()))
            }
        }
    }

    async fn drop_connection(&self, connection: &Arc<Connection>, reason: EnqueueError) {
        if reason == EnqueueError::Full {
            warn!(
                "🐢 Outbound queue full for player {}, dropping connection {}",
                connection.player_id(),
                connection.id()
            );
        }
        self.unregister(connection).await;
    }

    pub async fn connection(&self, player_id: &PlayerId) -> Option<Arc<Connection>> {
        self.connections.read().await.get(player_id).cloned()
    }

    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }

    /// Players in a room, in join order.
    pub async fn members(&self, room_id: RoomId) -> Vec<PlayerId> {
        let Some(room) = self.rooms.read().await.get(&room_id).cloned() else {
            return Vec::new();
        };
        let state = room.state.read().await;
        state.members.iter().map(|member| member.player_id().clone()).collect()
    }

    pub async fn member_count(&self, room_id: RoomId) -> usize {
        let Some(room) = self.rooms.read().await.get(&room_id).cloned() else {
            return 0;
        };
        let count = room.state.read().await.members.len();
        count
    }

    pub async fn is_member(&self, room_id: RoomId, player_id: &PlayerId) -> bool {
        let Some(room) = self.rooms.read().await.get(&room_id).cloned() else {
            return false;
        };
        let state = room.state.read().await;
        state.members.iter().any(|member| member.player_id() == player_id)
    }

    /// Closes every live connection.
    pub async fn shutdown(&self) {
        let connections: Vec<Arc<Connection>> = self.connections.read().await.values().cloned().collect();
        info!("🔌 Closing {} connection(s)", connections.len());
        for connection in connections {
            connection.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::Outbound;

    fn connect(name: &str, capacity: usize) -> (Arc<Connection>, Outbound) {
        Connection::new(PlayerId::parse(name).unwrap(), capacity)
    }

    fn drain(rx: &mut Outbound) -> Vec<String> {
        let mut frames = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            frames.push(frame.to_string());
        }
        frames
    }

    #[tokio::test]
    async fn join_enforces_capacity_without_side_effects() {
        let hub = Hub::new();
        let room = RoomId::new();
        hub.open_room(room, 4).await;

        let mut conns = Vec::new();
        for name in ["a", "b", "c", "d", "e"] {
            let (conn, rx) = connect(name, 8);
            hub.register(conn.clone()).await;
            conns.push((conn, rx));
        }
        for (conn, _) in &conns[..4] {
            hub.join(room, conn).await.unwrap();
        }

        let (fifth, _) = &conns[4];
        assert_eq!(hub.check_join(room, &conns[0].0).await, Ok(()));
        assert_eq!(hub.check_join(room, fifth).await, Err(HubError::RoomFull { room, max: 4 }));
        let err = hub.join(room, fifth).await.unwrap_err();
        assert_eq!(err, HubError::RoomFull { room, max: 4 });
        assert_eq!(hub.member_count(room).await, 4);
        assert_eq!(fifth.room(), None);
    }

    #[tokio::test]
    async fn join_refuses_rooms_that_are_not_waiting() {
        let hub = Hub::new();
        let room = RoomId::new();
        hub.open_room(room, 4).await;
        hub.set_status(room, RoomStatus::Active).await.unwrap();

        let (conn, _rx) = connect("a", 8);
        assert!(matches!(
            hub.join(room, &conn).await,
            Err(HubError::RoomNotJoinable { status: RoomStatus::Active, .. })
        ));
        assert!(matches!(hub.join(RoomId::new(), &conn).await, Err(HubError::RoomNotFound(_))));
    }

    #[tokio::test]
    async fn joining_another_room_moves_the_connection() {
        let hub = Hub::new();
        let (first, second) = (RoomId::new(), RoomId::new());
        hub.open_room(first, 4).await;
        hub.open_room(second, 4).await;

        let (conn, _rx) = connect("a", 8);
        hub.join(first, &conn).await.unwrap();
        hub.join(second, &conn).await.unwrap();
        assert_eq!(conn.room(), Some(second));
        assert_eq!(hub.member_count(first).await, 0);
        assert_eq!(hub.member_count(second).await, 1);
    }

    #[tokio::test]
    async fn leave_is_idempotent() {
        let hub = Hub::new();
        let room = RoomId::new();
        hub.open_room(room, 4).await;
        let (conn, _rx) = connect("a", 8);
        hub.join(room, &conn).await.unwrap();

        assert!(hub.leave(room, &conn).await);
        assert!(!hub.leave(room, &conn).await);
        assert_eq!(conn.room(), None);
    }

    #[tokio::test]
    async fn broadcast_drops_slow_members_only() {
        let hub = Hub::new();
        let room = RoomId::new();
        hub.open_room(room, 4).await;

        let (fast, mut fast_rx) = connect("fast", 8);
        let (slow, _slow_rx) = connect("slow", 1);
        for conn in [&fast, &slow] {
            hub.register(conn.clone()).await;
            hub.join(room, conn).await.unwrap();
        }

        assert_eq!(hub.broadcast(room, "one".into()).await, 2);
        assert_eq!(hub.broadcast(room, "two".into()).await, 1);
        assert_eq!(hub.broadcast(room, "three".into()).await, 1);

        assert_eq!(drain(&mut fast_rx), vec!["one", "two", "three"]);
        assert!(slow.is_closed());
        assert_eq!(hub.members(room).await, vec![fast.player_id().clone()]);
        assert!(hub.connection(slow.player_id()).await.is_none());
    }

    #[tokio::test]
    async fn unregistered_connection_receives_nothing_further() {
        let hub = Hub::new();
        let room = RoomId::new();
        hub.open_room(room, 4).await;
        let (a, mut a_rx) = connect("a", 8);
        let (b, mut b_rx) = connect("b", 8);
        for conn in [&a, &b] {
            hub.register(conn.clone()).await;
            hub.join(room, conn).await.unwrap();
        }

        hub.unregister(&a).await;
        hub.broadcast(room, "after".into()).await;
        assert!(drain(&mut a_rx).is_empty());
        assert_eq!(drain(&mut b_rx), vec!["after"]);
        assert_eq!(a.room(), Some(room));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn unregister_during_broadcast_is_safe() {
        let hub = Arc::new(Hub::new());
        let room = RoomId::new();
        hub.open_room(room, 20).await;

        let mut receivers = Vec::new();
        let mut conns = Vec::new();
        for i in 0..20 {
            let (conn, rx) = connect(&format!("p{i}"), 1024);
            hub.register(conn.clone()).await;
            hub.join(room, &conn).await.unwrap();
            conns.push(conn);
            receivers.push(rx);
        }

        let broadcaster = {
            let hub = hub.clone();
            tokio::spawn(async move {
                for n in 0..200 {
                    hub.broadcast(room, format!("m{n}").into()).await;
                }
            })
        };
        for conn in conns.iter().step_by(2) {
            hub.unregister(conn).await;
        }
        broadcaster.await.expect("broadcaster must not panic");

        for (i, rx) in receivers.iter_mut().enumerate() {
            let frames = drain(rx);
            if i % 2 == 1 {
                assert_eq!(frames.len(), 200, "member {i} missed frames");
            }
        }
        assert_eq!(hub.member_count(room).await, 10);
    }

    #[tokio::test]
    async fn reconnect_transfers_membership() {
        let hub = Hub::new();
        let room = RoomId::new();
        hub.open_room(room, 4).await;

        let (old, _old_rx) = connect("ann", 8);
        hub.register(old.clone()).await;
        hub.join(room, &old).await.unwrap();
        assert_eq!(hub.register(old.clone()).await, None);

        let (new, mut new_rx) = connect("ann", 8);
        assert_eq!(hub.register(new.clone()).await, Some(room));
        assert!(old.is_closed());
        assert_eq!(old.room(), None);
        assert_eq!(new.room(), Some(room));
        assert_eq!(hub.member_count(room).await, 1);

        assert!(!hub.unregister(&old).await);
        assert_eq!(hub.connection_count().await, 1);

        hub.broadcast(room, "hello".into()).await;
        assert_eq!(drain(&mut new_rx), vec!["hello"]);
    }

    #[tokio::test]
    async fn close_room_detaches_members() {
        let hub = Hub::new();
        let room = RoomId::new();
        hub.open_room(room, 4).await;
        let (conn, _rx) = connect("a", 8);
        hub.join(room, &conn).await.unwrap();

        assert_eq!(hub.close_room(room).await, vec![conn.player_id().clone()]);
        assert_eq!(conn.room(), None);
        assert_eq!(hub.room_count().await, 0);
        assert_eq!(hub.room_status(room).await, None);
    }

    #[tokio::test]
    async fn send_to_requires_a_live_connection() {
        let hub = Hub::new();
        let (conn, mut rx) = connect("a", 8);
        hub.register(conn.clone()).await;
        hub.send_to(conn.player_id(), "direct".into()).await.unwrap();
        assert_eq!(drain(&mut rx), vec!["direct"]);

        let ghost = PlayerId::parse("ghost").unwrap();
        assert_eq!(
            hub.send_to(&ghost, "x".into()).await,
            Err(HubError::NotConnected(ghost.clone()))
        );
    }
}
