//! Friend-request state machine.
//!
//! A request is `pending` until its target accepts or rejects it; both
//! outcomes are terminal. Each request exists twice: in the target's
//! received collection and, under the same id, in the sender's sent
//! collection. The two sides are separate writes. When the second write
//! fails or finds nothing to update, the operation still succeeds for the
//! caller and the gap is logged for the repair pass to close.

use chrono::Utc;
use tracing::{error, info, warn};

use tandem_shared::api::{Candidate, PendingRequest};
use tandem_shared::models::{ReceivedRequest, SentRequest};
use tandem_shared::protocol::ServerEvent;
use tandem_shared::types::{RequestId, RequestStatus, UserId};
use tandem_store::StoreError;

use crate::db::SharedDb;
use crate::error::{ServiceError, ServiceResult};
use crate::realtime::Dispatcher;

#[derive(Clone)]
pub struct FriendService {
    db: SharedDb,
    dispatcher: Dispatcher,
    search_limit: usize,
}

impl FriendService {
    pub fn new(db: SharedDb, dispatcher: Dispatcher, search_limit: usize) -> Self {
        Self {
            db,
            dispatcher,
            search_limit,
        }
    }

    /// Open a new pending request from `sender` to `target`.
    pub async fn send_request(&self, sender: UserId, target: UserId) -> ServiceResult<RequestId> {
        if sender == target {
            return Err(ServiceError::SelfRequest);
        }

        let sender_profile = {
            let db = self.db.lock().await;
            if !db.user_exists(target)? {
                return Err(ServiceError::UnknownUser);
            }
            if db.is_friend(target, sender)? {
                return Err(ServiceError::AlreadyFriends);
            }
            if db.has_pending_request(sender, target)? {
                return Err(ServiceError::DuplicatePending);
            }
            db.get_profile(sender).map_err(|e| match e {
                StoreError::NotFound => ServiceError::Unauthorized,
                other => other.into(),
            })?
        };

        let id = RequestId::new();
        let now = Utc::now();

        // Target side first: its partial unique index is what settles two
        // racing sends between the same pair.
        self.db
            .lock()
            .await
            .insert_received_request(
                target,
                &ReceivedRequest {
                    id,
                    from: sender,
                    status: RequestStatus::Pending,
                    created_at: now,
                },
            )
            .map_err(|e| match e {
                StoreError::Conflict(_) => ServiceError::DuplicatePending,
                other => other.into(),
            })?;

        let mirrored = self.db.lock().await.insert_sent_request(
            sender,
            &SentRequest {
                id,
                to: target,
                status: RequestStatus::Pending,
                created_at: now,
            },
        );
        if let Err(e) = mirrored {
            // A request nobody sent must not stay visible to the target.
            error!(request = %id, sender = %sender, error = %e, "Failed to record sent request");
            if let Err(undo) = self.db.lock().await.delete_received_request(target, id) {
                error!(
                    request = %id,
                    target = %target,
                    error = %undo,
                    "Relationship anomaly: orphaned received request"
                );
            }
            return Err(e.into());
        }

        info!(request = %id, from = %sender, to = %target, "Friend request sent");

        self.dispatcher
            .emit_to(
                target,
                ServerEvent::FriendRequest {
                    from: sender_profile.summary(),
                },
            )
            .await;

        Ok(id)
    }

    /// Accept `request_id` from `owner`'s received collection.
    pub async fn accept_request(&self, owner: UserId, request_id: RequestId) -> ServiceResult<()> {
        let request = self.resolve(owner, request_id, RequestStatus::Accepted).await?;
        let sender = request.from;

        if let Err(e) = self.db.lock().await.add_friend(owner, sender) {
            // The request is already resolved but neither edge exists, so
            // the caller must see this one.
            error!(owner = %owner, friend = %sender, error = %e, "Failed to add friend");
            return Err(e.into());
        }
        if let Err(e) = self.db.lock().await.add_friend(sender, owner) {
            error!(
                user = %sender,
                friend = %owner,
                error = %e,
                "Relationship anomaly: reverse friendship not recorded"
            );
        }

        info!(request = %request_id, owner = %owner, sender = %sender, "Friend request accepted");

        self.notify_accepted(sender, owner).await;
        Ok(())
    }

    /// Tell `sender` that `owner` accepted. Skipped when the sender is
    /// offline; the store lock is released before emitting.
    async fn notify_accepted(&self, sender: UserId, owner: UserId) -> bool {
        if !self.dispatcher.is_online(sender).await {
            return false;
        }
        let profile = self.db.lock().await.get_profile(owner);
        match profile {
            Ok(profile) => {
                let event = ServerEvent::FriendRequestAccepted {
                    from: profile.summary(),
                };
                self.dispatcher.emit_to(sender, event).await
            }
            Err(e) => {
                warn!(owner = %owner, error = %e, "Skipping acceptance notification");
                false
            }
        }
    }

    /// Reject `request_id`. The sender is not told.
    pub async fn reject_request(&self, owner: UserId, request_id: RequestId) -> ServiceResult<()> {
        let request = self.resolve(owner, request_id, RequestStatus::Rejected).await?;
        info!(
            request = %request_id,
            owner = %owner,
            sender = %request.from,
            "Friend request rejected"
        );
        Ok(())
    }

    /// Move the owner's entry to `status`, then the sender's mirror.
    async fn resolve(
        &self,
        owner: UserId,
        request_id: RequestId,
        status: RequestStatus,
    ) -> ServiceResult<ReceivedRequest> {
        let request = {
            let db = self.db.lock().await;
            let request = db
                .find_pending_received(owner, request_id)?
                .ok_or(ServiceError::RequestNotFound)?;
            // Conditional on `pending`, so a concurrent accept/reject of the
            // same id cannot both land.
            if !db.resolve_received_request(owner, request_id, status)? {
                return Err(ServiceError::RequestNotFound);
            }
            request
        };

        match self
            .db
            .lock()
            .await
            .resolve_sent_request(request.from, request_id, status)
        {
            Ok(true) => {}
            Ok(false) => warn!(
                request = %request_id,
                sender = %request.from,
                status = %status,
                "Relationship anomaly: sender's mirror entry missing"
            ),
            Err(e) => error!(
                request = %request_id,
                sender = %request.from,
                error = %e,
                "Relationship anomaly: failed to update sender's mirror entry"
            ),
        }

        Ok(request)
    }

    /// Pending incoming requests, oldest first, with sender profiles.
    pub async fn list_pending_requests(&self, owner: UserId) -> ServiceResult<Vec<PendingRequest>> {
        let db = self.db.lock().await;
        let mut pending = Vec::new();
        for req in db.list_received_requests(owner)? {
            if req.status != RequestStatus::Pending {
                continue;
            }
            match db.get_profile(req.from) {
                Ok(from) => pending.push(PendingRequest {
                    id: req.id,
                    from,
                    status: req.status,
                    created_at: req.created_at,
                }),
                // Sender account is gone; nothing to show.
                Err(StoreError::NotFound) => {
                    warn!(request = %req.id, sender = %req.from, "Pending request from unknown user")
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(pending)
    }

    /// Users `owner` could send a request to, matching `query` by name or
    /// email. With `include_friends`, existing friends are returned too,
    /// flagged as such.
    pub async fn search_candidates(
        &self,
        owner: UserId,
        query: &str,
        include_friends: bool,
    ) -> ServiceResult<Vec<Candidate>> {
        let query = query.trim();
        if query.is_empty() {
            return Err(ServiceError::MissingField("query"));
        }

        let hits = self.db.lock().await.search_users(
            owner,
            query,
            include_friends,
            self.search_limit,
        )?;

        Ok(hits
            .into_iter()
            .map(|(user, is_friend)| Candidate { user, is_friend })
            .collect())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::accounts::tests::signup;
    use crate::accounts::AccountService;
    use crate::auth::TokenKeys;
    use crate::db::{self, SharedDb};
    use crate::realtime::Connection;

    pub(crate) struct Fixture {
        pub db: SharedDb,
        pub dispatcher: Dispatcher,
        pub accounts: AccountService,
        pub friends: FriendService,
    }

    impl Fixture {
        pub(crate) fn new() -> Self {
            let db = db::in_memory();
            let dispatcher = Dispatcher::new();
            Self {
                accounts: AccountService::new(db.clone(), TokenKeys::new("test-secret", 1)),
                friends: FriendService::new(db.clone(), dispatcher.clone(), 10),
                db,
                dispatcher,
            }
        }

        pub(crate) async fn user(&self, name: &str) -> UserId {
            self.accounts.sign_up(signup(name)).await.unwrap().0.id
        }

        pub(crate) async fn befriend(&self, a: UserId, b: UserId) {
            let id = self.friends.send_request(a, b).await.unwrap();
            self.friends.accept_request(b, id).await.unwrap();
        }
    }

    pub(crate) fn drain(conn: &mut Connection) -> Vec<ServerEvent> {
        let mut out = Vec::new();
        while let Ok(event) = conn.events.try_recv() {
            out.push(event);
        }
        out
    }

    #[tokio::test]
    async fn test_send_request_validation() {
        let fx = Fixture::new();
        let alice = fx.user("Alice").await;
        let bob = fx.user("Bob").await;

        assert!(matches!(
            fx.friends.send_request(alice, alice).await,
            Err(ServiceError::SelfRequest)
        ));
        assert!(matches!(
            fx.friends.send_request(alice, UserId::new()).await,
            Err(ServiceError::UnknownUser)
        ));

        fx.friends.send_request(alice, bob).await.unwrap();
        assert!(matches!(
            fx.friends.send_request(alice, bob).await,
            Err(ServiceError::DuplicatePending)
        ));
    }

    #[tokio::test]
    async fn test_alice_befriends_bob() {
        let fx = Fixture::new();
        let alice = fx.user("Alice").await;
        let bob = fx.user("Bob").await;
        let mut alice_conn = fx.dispatcher.connect(alice).await;
        let mut bob_conn = fx.dispatcher.connect(bob).await;
        drain(&mut alice_conn);
        drain(&mut bob_conn);

        let id = fx.friends.send_request(alice, bob).await.unwrap();

        let pending = fx.friends.list_pending_requests(bob).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, id);
        assert_eq!(pending[0].from.id, alice);
        match drain(&mut bob_conn).as_slice() {
            [ServerEvent::FriendRequest { from }] => assert_eq!(from.id, alice),
            other => panic!("unexpected events: {other:?}"),
        }

        fx.friends.accept_request(bob, id).await.unwrap();

        {
            let db = fx.db.lock().await;
            assert!(db.is_friend(alice, bob).unwrap());
            assert!(db.is_friend(bob, alice).unwrap());
            let sent = db.list_sent_requests(alice).unwrap();
            assert_eq!(sent.len(), 1);
            assert_eq!(sent[0].status, RequestStatus::Accepted);
        }
        assert!(fx.friends.list_pending_requests(bob).await.unwrap().is_empty());

        match drain(&mut alice_conn).as_slice() {
            [ServerEvent::FriendRequestAccepted { from }] => assert_eq!(from.id, bob),
            other => panic!("unexpected events: {other:?}"),
        }

        assert!(matches!(
            fx.friends.send_request(alice, bob).await,
            Err(ServiceError::AlreadyFriends)
        ));
    }

    #[tokio::test]
    async fn test_acceptance_notice_only_for_online_sender() {
        let fx = Fixture::new();
        let alice = fx.user("Alice").await;
        let bob = fx.user("Bob").await;

        assert!(!fx.friends.notify_accepted(alice, bob).await);

        let mut alice_conn = fx.dispatcher.connect(alice).await;
        drain(&mut alice_conn);
        assert!(fx.friends.notify_accepted(alice, bob).await);
        assert!(fx.db.try_lock().is_ok());
        match drain(&mut alice_conn).as_slice() {
            [ServerEvent::FriendRequestAccepted { from }] => {
                assert_eq!(from.id, bob);
                assert_eq!(from.full_name, "Bob");
            }
            other => panic!("unexpected events: {other:?}"),
        }

        // Unknown owner: nothing is sent.
        assert!(!fx.friends.notify_accepted(alice, UserId::new()).await);
        assert!(drain(&mut alice_conn).is_empty());
    }

    #[tokio::test]
    async fn test_terminal_states_do_not_transition() {
        let fx = Fixture::new();
        let alice = fx.user("Alice").await;
        let bob = fx.user("Bob").await;

        let id = fx.friends.send_request(alice, bob).await.unwrap();
        fx.friends.accept_request(bob, id).await.unwrap();

        assert!(matches!(
            fx.friends.accept_request(bob, id).await,
            Err(ServiceError::RequestNotFound)
        ));
        assert!(matches!(
            fx.friends.reject_request(bob, id).await,
            Err(ServiceError::RequestNotFound)
        ));
        // Only the owner can resolve it.
        assert!(matches!(
            fx.friends.accept_request(alice, id).await,
            Err(ServiceError::RequestNotFound)
        ));
    }

    #[tokio::test]
    async fn test_reject_is_silent_and_allows_resend() {
        let fx = Fixture::new();
        let alice = fx.user("Alice").await;
        let bob = fx.user("Bob").await;
        let mut alice_conn = fx.dispatcher.connect(alice).await;
        drain(&mut alice_conn);

        let first = fx.friends.send_request(alice, bob).await.unwrap();
        fx.friends.reject_request(bob, first).await.unwrap();

        assert!(drain(&mut alice_conn).is_empty());
        {
            let db = fx.db.lock().await;
            assert!(!db.is_friend(alice, bob).unwrap());
            assert_eq!(
                db.list_sent_requests(alice).unwrap()[0].status,
                RequestStatus::Rejected
            );
        }

        let second = fx.friends.send_request(alice, bob).await.unwrap();
        assert_ne!(first, second);
        let pending = fx.friends.list_pending_requests(bob).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, second);
    }

    #[tokio::test]
    async fn test_accept_succeeds_with_missing_mirror() {
        let fx = Fixture::new();
        let alice = fx.user("Alice").await;
        let bob = fx.user("Bob").await;
        let id = fx.friends.send_request(alice, bob).await.unwrap();

        fx.db
            .lock()
            .await
            .conn()
            .execute(
                "DELETE FROM sent_requests WHERE owner_id = ?1",
                [alice.to_string()],
            )
            .unwrap();

        fx.friends.accept_request(bob, id).await.unwrap();

        let db = fx.db.lock().await;
        assert!(db.is_friend(alice, bob).unwrap());
        assert!(db.is_friend(bob, alice).unwrap());
        assert_eq!(
            db.list_received_requests(bob).unwrap()[0].status,
            RequestStatus::Accepted
        );
    }

    #[tokio::test]
    async fn test_search_excludes_self_friends_and_pending() {
        let fx = Fixture::new();
        let me = fx.user("Mallory").await;
        let friend = fx.user("Martha").await;
        let asked = fx.user("Marcus").await;
        let asker = fx.user("Maria").await;
        let stranger = fx.user("Max").await;

        fx.befriend(me, friend).await;
        fx.friends.send_request(me, asked).await.unwrap();
        fx.friends.send_request(asker, me).await.unwrap();

        let ids = |hits: Vec<Candidate>| hits.into_iter().map(|c| c.user.id).collect::<Vec<_>>();

        let hits = fx.friends.search_candidates(me, "ma", false).await.unwrap();
        assert_eq!(ids(hits), vec![stranger]);

        let hits = fx.friends.search_candidates(me, "MA", true).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert!(hits.iter().any(|c| c.user.id == friend && c.is_friend));
        assert!(hits.iter().any(|c| c.user.id == stranger && !c.is_friend));

        assert!(matches!(
            fx.friends.search_candidates(me, "  ", false).await,
            Err(ServiceError::MissingField("query"))
        ));
    }
}
