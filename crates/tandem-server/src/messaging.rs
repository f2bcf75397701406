//! Direct messages between friends.

use std::collections::HashMap;

use chrono::Utc;
use tracing::{debug, info};

use tandem_shared::models::{Message, MessageContent, UserProfile};
use tandem_shared::protocol::ServerEvent;
use tandem_shared::types::{MessageId, UserId};

use crate::db::SharedDb;
use crate::error::{ServiceError, ServiceResult};
use crate::realtime::Dispatcher;

#[derive(Clone)]
pub struct MessagingService {
    db: SharedDb,
    dispatcher: Dispatcher,
}

impl MessagingService {
    pub fn new(db: SharedDb, dispatcher: Dispatcher) -> Self {
        Self { db, dispatcher }
    }

    /// Store a message from `sender` to `receiver` and push it to the
    /// receiver if they are connected.
    pub async fn send_message(
        &self,
        sender: UserId,
        receiver: UserId,
        text: Option<String>,
        image: Option<String>,
    ) -> ServiceResult<Message> {
        let content = MessageContent::new(text, image).map_err(|_| ServiceError::EmptyMessage)?;

        let message = Message {
            id: MessageId::new(),
            sender_id: sender,
            receiver_id: receiver,
            content,
            seen: false,
            created_at: Utc::now(),
        };

        {
            let db = self.db.lock().await;
            if !db.is_friend(sender, receiver)? {
                return Err(ServiceError::NotFriends);
            }
            db.insert_message(&message)?;
        }

        info!(message = %message.id, from = %sender, to = %receiver, "Message stored");

        self.dispatcher
            .emit_to(receiver, ServerEvent::NewMessage(message.clone()))
            .await;

        Ok(message)
    }

    /// Every message between `user` and `other`, oldest first. Messages
    /// `other` sent to `user` are marked seen afterwards; the returned
    /// copies keep the flag they had when read.
    pub async fn list_conversation(&self, user: UserId, other: UserId) -> ServiceResult<Vec<Message>> {
        let db = self.db.lock().await;
        let messages = db.conversation(user, other)?;
        let flipped = db.mark_conversation_seen(user, other)?;
        debug!(user = %user, other = %other, count = messages.len(), flipped, "Conversation read");
        Ok(messages)
    }

    /// Mark a single message addressed to `user` as seen.
    pub async fn mark_seen(&self, user: UserId, message_id: MessageId) -> ServiceResult<()> {
        if !self.db.lock().await.mark_message_seen(message_id, user)? {
            return Err(ServiceError::MessageNotFound);
        }
        debug!(user = %user, message = %message_id, "Message marked seen");
        Ok(())
    }

    /// Friend profiles for the sidebar, plus unseen counts keyed by friend.
    /// Friends with nothing unseen are absent from the map.
    pub async fn list_friends_with_unseen_counts(
        &self,
        user: UserId,
    ) -> ServiceResult<(Vec<UserProfile>, HashMap<UserId, u32>)> {
        let db = self.db.lock().await;
        let friends = db.list_friends(user)?;
        let mut unseen = db.unseen_counts(user)?;
        // Leftovers from a former friend stay in the store but not here.
        unseen.retain(|sender, count| *count > 0 && friends.iter().any(|f| f.id == *sender));
        Ok((friends, unseen))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::friends::tests::{drain, Fixture};

    fn messaging(fx: &Fixture) -> MessagingService {
        MessagingService::new(fx.db.clone(), fx.dispatcher.clone())
    }

    #[tokio::test]
    async fn test_non_friend_message_is_refused() {
        let fx = Fixture::new();
        let alice = fx.user("Alice").await;
        let carol = fx.user("Carol").await;
        let svc = messaging(&fx);

        let result = svc
            .send_message(alice, carol, Some("hey".into()), None)
            .await;
        assert!(matches!(result, Err(ServiceError::NotFriends)));
        assert!(fx.db.lock().await.conversation(alice, carol).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_message_is_refused() {
        let fx = Fixture::new();
        let alice = fx.user("Alice").await;
        let bob = fx.user("Bob").await;
        fx.befriend(alice, bob).await;
        let svc = messaging(&fx);

        assert!(matches!(
            svc.send_message(alice, bob, Some("   ".into()), None).await,
            Err(ServiceError::EmptyMessage)
        ));
        assert!(matches!(
            svc.send_message(alice, bob, None, None).await,
            Err(ServiceError::EmptyMessage)
        ));

        let sent = svc
            .send_message(alice, bob, None, Some("https://cdn/cat.png".into()))
            .await
            .unwrap();
        assert_eq!(sent.content.image(), Some("https://cdn/cat.png"));
        assert_eq!(sent.content.text(), None);
    }

    #[tokio::test]
    async fn test_dave_messages_erin() {
        let fx = Fixture::new();
        let dave = fx.user("Dave").await;
        let erin = fx.user("Erin").await;
        fx.befriend(dave, erin).await;
        let svc = messaging(&fx);

        let mut erin_conn = fx.dispatcher.connect(erin).await;
        drain(&mut erin_conn);

        for text in ["one", "two", "three"] {
            svc.send_message(dave, erin, Some(text.into()), None)
                .await
                .unwrap();
        }

        let received: Vec<_> = drain(&mut erin_conn)
            .into_iter()
            .map(|event| match event {
                ServerEvent::NewMessage(m) => m.content.text().map(str::to_string),
                other => panic!("unexpected event {other:?}"),
            })
            .collect();
        assert_eq!(
            received,
            vec![Some("one".into()), Some("two".into()), Some("three".into())]
        );

        let (friends, unseen) = svc.list_friends_with_unseen_counts(erin).await.unwrap();
        assert_eq!(friends.len(), 1);
        assert_eq!(friends[0].id, dave);
        assert_eq!(unseen.get(&dave), Some(&3));

        let first = svc.list_conversation(erin, dave).await.unwrap();
        assert_eq!(first.len(), 3);
        assert!(first.iter().all(|m| !m.seen));

        let (_, unseen) = svc.list_friends_with_unseen_counts(erin).await.unwrap();
        assert!(unseen.is_empty());

        let second = svc.list_conversation(erin, dave).await.unwrap();
        assert!(second.iter().all(|m| m.seen));
        assert_eq!(
            second.iter().map(|m| m.id).collect::<Vec<_>>(),
            first.iter().map(|m| m.id).collect::<Vec<_>>()
        );
    }

    #[tokio::test]
    async fn test_offline_receiver_still_gets_message_stored() {
        let fx = Fixture::new();
        let dave = fx.user("Dave").await;
        let erin = fx.user("Erin").await;
        fx.befriend(dave, erin).await;
        let svc = messaging(&fx);

        svc.send_message(dave, erin, Some("later".into()), None)
            .await
            .unwrap();
        assert_eq!(fx.db.lock().await.conversation(dave, erin).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_mark_seen() {
        let fx = Fixture::new();
        let dave = fx.user("Dave").await;
        let erin = fx.user("Erin").await;
        fx.befriend(dave, erin).await;
        let svc = messaging(&fx);

        let msg = svc
            .send_message(dave, erin, Some("hi".into()), None)
            .await
            .unwrap();

        // Only the receiver can mark it.
        assert!(matches!(
            svc.mark_seen(dave, msg.id).await,
            Err(ServiceError::MessageNotFound)
        ));
        assert!(matches!(
            svc.mark_seen(erin, MessageId::new()).await,
            Err(ServiceError::MessageNotFound)
        ));

        svc.mark_seen(erin, msg.id).await.unwrap();
        svc.mark_seen(erin, msg.id).await.unwrap();
        assert!(fx.db.lock().await.get_message(msg.id).unwrap().seen);
    }
}
