use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::debug;

use tandem_shared::protocol::ServerEvent;
use tandem_shared::types::UserId;

use super::presence::{ConnectionHandle, ConnectionId, PresenceRegistry};

/// A socket's view of its registration: its id and the queue the
/// dispatcher fills.
pub struct Connection {
    pub id: ConnectionId,
    pub user: UserId,
    pub events: mpsc::UnboundedReceiver<ServerEvent>,
}

/// Routes outbound events to live connections.
///
/// Holds no state of its own beyond the registry it wraps, and is the only
/// way the rest of the server reaches that registry. Delivery is
/// best-effort: an event for a user with no live connection is dropped,
/// never queued or retried.
#[derive(Clone, Default)]
pub struct Dispatcher {
    registry: Arc<PresenceRegistry>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new socket for `user` and hand back its event queue.
    pub async fn connect(&self, user: UserId) -> Connection {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = ConnectionId::new();
        self.registry
            .register(user, ConnectionHandle::new(id, tx))
            .await;
        Connection {
            id,
            user,
            events: rx,
        }
    }

    /// Drop `conn`'s registration. A newer connection for the same user
    /// is left alone.
    pub async fn disconnect(&self, conn: &Connection) -> bool {
        self.registry.unregister(conn.user, conn.id).await
    }

    /// Send `event` to `user` if they are online. Returns whether it was
    /// handed to a live socket.
    pub async fn emit_to(&self, user: UserId, event: ServerEvent) -> bool {
        let kind = event.kind();
        let delivered = match self.registry.lookup(user).await {
            Some(handle) => handle.send(event),
            None => false,
        };
        debug!(user = %user, event = kind, delivered, "Dispatch");
        delivered
    }

    pub async fn broadcast(&self, event: ServerEvent) -> usize {
        let reached = self.registry.broadcast(&event).await;
        debug!(event = event.kind(), reached, "Broadcast");
        reached
    }

    pub async fn is_online(&self, user: UserId) -> bool {
        self.registry.is_online(user).await
    }

    pub async fn online_users(&self) -> Vec<UserId> {
        self.registry.online_users().await
    }

    /// Close every connection. Called once at shutdown.
    pub async fn shutdown(&self) {
        self.registry.clear().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tandem_shared::models::UserSummary;

    fn summary(id: UserId) -> UserSummary {
        UserSummary {
            id,
            full_name: "Someone".into(),
            avatar: None,
        }
    }

    fn drain(conn: &mut Connection) -> Vec<ServerEvent> {
        let mut out = Vec::new();
        while let Ok(event) = conn.events.try_recv() {
            out.push(event);
        }
        out
    }

    #[tokio::test]
    async fn test_emit_reaches_only_the_target() {
        let dispatcher = Dispatcher::new();
        let (alice, bob) = (UserId::new(), UserId::new());
        let mut a = dispatcher.connect(alice).await;
        let mut b = dispatcher.connect(bob).await;
        drain(&mut a);
        drain(&mut b);

        let event = ServerEvent::FriendRequest {
            from: summary(alice),
        };
        assert!(dispatcher.emit_to(bob, event.clone()).await);

        assert_eq!(drain(&mut b), vec![event]);
        assert!(drain(&mut a).is_empty());
    }

    #[tokio::test]
    async fn test_emit_to_offline_user_is_dropped() {
        let dispatcher = Dispatcher::new();
        let event = ServerEvent::FriendRequest {
            from: summary(UserId::new()),
        };
        assert!(!dispatcher.emit_to(UserId::new(), event).await);
    }

    #[tokio::test]
    async fn test_emit_after_socket_task_ended_is_dropped() {
        let dispatcher = Dispatcher::new();
        let user = UserId::new();
        let conn = dispatcher.connect(user).await;
        drop(conn);

        let event = ServerEvent::OnlineUsers(vec![]);
        assert!(!dispatcher.emit_to(user, event).await);
    }

    #[tokio::test]
    async fn test_reconnect_then_stale_disconnect() {
        let dispatcher = Dispatcher::new();
        let user = UserId::new();
        let old = dispatcher.connect(user).await;
        let new = dispatcher.connect(user).await;

        assert!(!dispatcher.disconnect(&old).await);
        assert!(dispatcher.is_online(user).await);

        assert!(dispatcher.disconnect(&new).await);
        assert!(!dispatcher.is_online(user).await);
        let mut new = dispatcher.connect(user).await;

        drain(&mut new);
        let event = ServerEvent::OnlineUsers(vec![user]);
        assert!(dispatcher.emit_to(user, event.clone()).await);
        assert_eq!(drain(&mut new), vec![event]);
    }

    #[tokio::test]
    async fn test_broadcast_and_shutdown() {
        let dispatcher = Dispatcher::new();
        let mut a = dispatcher.connect(UserId::new()).await;
        let mut b = dispatcher.connect(UserId::new()).await;
        drain(&mut a);
        drain(&mut b);

        let online = dispatcher.online_users().await;
        assert_eq!(online.len(), 2);
        assert_eq!(
            dispatcher.broadcast(ServerEvent::OnlineUsers(online)).await,
            2
        );

        dispatcher.shutdown().await;
        assert!(dispatcher.online_users().await.is_empty());
    }
}
