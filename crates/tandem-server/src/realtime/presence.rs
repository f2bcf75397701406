use std::collections::HashMap;
use std::fmt;

use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info};
use uuid::Uuid;

use tandem_shared::protocol::ServerEvent;
use tandem_shared::types::UserId;

/// Identifies one socket. A user who reconnects gets a new id, which is
/// what lets a late disconnect from the old socket be told apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The sending half of a live socket's outbound queue.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    pub id: ConnectionId,
    tx: mpsc::UnboundedSender<ServerEvent>,
}

impl ConnectionHandle {
    pub fn new(id: ConnectionId, tx: mpsc::UnboundedSender<ServerEvent>) -> Self {
        Self { id, tx }
    }

    /// Queue an event. `false` once the socket task has gone away.
    pub fn send(&self, event: ServerEvent) -> bool {
        self.tx.send(event).is_ok()
    }
}

/// Who is connected right now: at most one live handle per user.
///
/// Every mutation broadcasts the new online list before releasing the
/// write lock, so no other register/unregister can interleave between a
/// change and the announcement of that change. Sends are non-blocking
/// (unbounded queues), so nothing awaits while the lock is held.
#[derive(Debug, Default)]
pub struct PresenceRegistry {
    entries: RwLock<HashMap<UserId, ConnectionHandle>>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `handle` the live connection for `user`, replacing any earlier
    /// one, then announce the online list to everyone.
    pub async fn register(&self, user: UserId, handle: ConnectionHandle) {
        let mut entries = self.entries.write().await;
        let conn = handle.id;
        if let Some(previous) = entries.insert(user, handle) {
            debug!(user = %user, old = %previous.id, new = %conn, "Connection superseded");
        }
        info!(user = %user, conn = %conn, online = entries.len(), "User connected");
        broadcast_online(&entries);
    }

    /// Drop `user`'s entry, but only if it still belongs to `conn`. A
    /// disconnect from a superseded socket leaves the newer entry alone.
    pub async fn unregister(&self, user: UserId, conn: ConnectionId) -> bool {
        let mut entries = self.entries.write().await;
        match entries.get(&user) {
            Some(live) if live.id == conn => {
                entries.remove(&user);
                info!(user = %user, conn = %conn, online = entries.len(), "User disconnected");
                broadcast_online(&entries);
                true
            }
            Some(live) => {
                debug!(
                    user = %user,
                    stale = %conn,
                    live = %live.id,
                    "Ignoring disconnect from superseded connection"
                );
                false
            }
            None => false,
        }
    }

    pub async fn is_online(&self, user: UserId) -> bool {
        self.entries.read().await.contains_key(&user)
    }

    pub async fn lookup(&self, user: UserId) -> Option<ConnectionHandle> {
        self.entries.read().await.get(&user).cloned()
    }

    /// Online user ids, sorted so broadcasts are deterministic.
    pub async fn online_users(&self) -> Vec<UserId> {
        sorted_ids(&*self.entries.read().await)
    }

    /// Send `event` to every live connection.
    pub async fn broadcast(&self, event: &ServerEvent) -> usize {
        let entries = self.entries.read().await;
        send_all(&entries, event)
    }

    /// Drop every handle. Each socket task sees its queue close and exits.
    pub async fn clear(&self) {
        let mut entries = self.entries.write().await;
        let count = entries.len();
        entries.clear();
        info!(dropped = count, "Presence registry cleared");
    }
}

fn sorted_ids(entries: &HashMap<UserId, ConnectionHandle>) -> Vec<UserId> {
    let mut ids: Vec<UserId> = entries.keys().copied().collect();
    ids.sort();
    ids
}

fn send_all(entries: &HashMap<UserId, ConnectionHandle>, event: &ServerEvent) -> usize {
    entries
        .values()
        .filter(|handle| handle.send(event.clone()))
        .count()
}

fn broadcast_online(entries: &HashMap<UserId, ConnectionHandle>) {
    let event = ServerEvent::OnlineUsers(sorted_ids(entries));
    send_all(entries, &event);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle() -> (ConnectionHandle, mpsc::UnboundedReceiver<ServerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ConnectionHandle::new(ConnectionId::new(), tx), rx)
    }

    #[tokio::test]
    async fn test_register_announces_online_list() {
        let registry = PresenceRegistry::new();
        let user = UserId::new();
        let (h, mut rx) = handle();

        registry.register(user, h).await;

        assert!(registry.is_online(user).await);
        assert_eq!(rx.try_recv().unwrap(), ServerEvent::OnlineUsers(vec![user]));
    }

    #[tokio::test]
    async fn test_later_connection_replaces_earlier() {
        let registry = PresenceRegistry::new();
        let user = UserId::new();
        let (first, _rx1) = handle();
        let (second, _rx2) = handle();
        let (first_id, second_id) = (first.id, second.id);

        registry.register(user, first).await;
        registry.register(user, second).await;

        assert_eq!(registry.online_users().await, vec![user]);
        assert_eq!(registry.lookup(user).await.unwrap().id, second_id);

        // The superseded socket closing must not take the user offline.
        assert!(!registry.unregister(user, first_id).await);
        assert!(registry.is_online(user).await);

        assert!(registry.unregister(user, second_id).await);
        assert!(!registry.is_online(user).await);
    }

    #[tokio::test]
    async fn test_unregister_broadcasts_to_remaining() {
        let registry = PresenceRegistry::new();
        let (alice, bob) = (UserId::new(), UserId::new());
        let (ha, mut rx_a) = handle();
        let (hb, _rx_b) = handle();
        let hb_id = hb.id;

        registry.register(alice, ha).await;
        registry.register(bob, hb).await;
        registry.unregister(bob, hb_id).await;

        let mut last = None;
        while let Ok(event) = rx_a.try_recv() {
            last = Some(event);
        }
        assert_eq!(last, Some(ServerEvent::OnlineUsers(vec![alice])));
    }

    #[tokio::test]
    async fn test_clear_closes_queues() {
        let registry = PresenceRegistry::new();
        let (h, mut rx) = handle();
        registry.register(UserId::new(), h).await;
        registry.clear().await;

        assert!(registry.online_users().await.is_empty());
        // Drain the connect broadcast, then the queue reports closed.
        let _ = rx.recv().await;
        assert!(rx.recv().await.is_none());
    }
}
