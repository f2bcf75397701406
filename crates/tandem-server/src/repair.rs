//! Convergence pass for the mirrored relationship data.
//!
//! Friend edges and request mirrors are written one side at a time, so a
//! failure between the two writes leaves them out of step. This pass finds
//! those gaps and closes them from the side that did land.

use std::time::Duration;

use tracing::{debug, info, warn};

use tandem_store::Database;

use crate::db::SharedDb;
use crate::error::ServiceResult;

/// What one pass fixed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RepairReport {
    pub reverse_edges_added: usize,
    pub mirrors_resolved: usize,
    pub self_friendships_removed: usize,
}

impl RepairReport {
    pub fn total(&self) -> usize {
        self.reverse_edges_added + self.mirrors_resolved + self.self_friendships_removed
    }
}

pub async fn repair_relationships(db: &SharedDb) -> ServiceResult<RepairReport> {
    let db = db.lock().await;
    let report = run(&db)?;
    if report.total() > 0 {
        info!(?report, "Relationship repair pass finished");
    } else {
        debug!("Relationship repair pass found nothing to fix");
    }
    Ok(report)
}

fn run(db: &Database) -> ServiceResult<RepairReport> {
    let mut report = RepairReport::default();

    for user in db.self_friendships()? {
        if db.remove_friend(user, user)? {
            warn!(user = %user, "Removed self-friendship");
            report.self_friendships_removed += 1;
        }
    }

    for (user, friend) in db.one_sided_friendships()? {
        if db.add_friend(friend, user)? {
            warn!(user = %friend, friend = %user, "Restored missing reverse friendship");
            report.reverse_edges_added += 1;
        }
    }

    for (sender, id, status) in db.stale_sent_mirrors()? {
        if db.resolve_sent_request(sender, id, status)? {
            warn!(request = %id, sender = %sender, status = %status, "Resolved stale sent request");
            report.mirrors_resolved += 1;
        }
    }

    Ok(report)
}

/// Run the pass every `every` until the task is dropped.
pub fn spawn_periodic(db: SharedDb, every: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        // The first tick completes immediately; startup already ran a pass.
        interval.tick().await;
        loop {
            interval.tick().await;
            if let Err(e) = repair_relationships(&db).await {
                tracing::error!(error = %e, "Relationship repair pass failed");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::friends::tests::Fixture;
    use tandem_shared::types::RequestStatus;

    #[tokio::test]
    async fn test_clean_store_needs_no_repair() {
        let fx = Fixture::new();
        let alice = fx.user("Alice").await;
        let bob = fx.user("Bob").await;
        fx.befriend(alice, bob).await;

        let report = repair_relationships(&fx.db).await.unwrap();
        assert_eq!(report, RepairReport::default());
    }

    #[tokio::test]
    async fn test_restores_one_sided_friendship() {
        let fx = Fixture::new();
        let alice = fx.user("Alice").await;
        let bob = fx.user("Bob").await;
        fx.befriend(alice, bob).await;
        fx.db.lock().await.remove_friend(alice, bob).unwrap();

        let report = repair_relationships(&fx.db).await.unwrap();
        assert_eq!(report.reverse_edges_added, 1);

        let db = fx.db.lock().await;
        assert!(db.is_friend(alice, bob).unwrap());
        assert!(db.is_friend(bob, alice).unwrap());
    }

    #[tokio::test]
    async fn test_resolves_stale_mirror_and_self_friendship() {
        let fx = Fixture::new();
        let alice = fx.user("Alice").await;
        let bob = fx.user("Bob").await;
        let id = fx.friends.send_request(alice, bob).await.unwrap();

        {
            // Bob's side moved on, Alice's mirror did not.
            let db = fx.db.lock().await;
            db.resolve_received_request(bob, id, RequestStatus::Rejected)
                .unwrap();
            db.add_friend(alice, alice).unwrap();
        }

        let report = repair_relationships(&fx.db).await.unwrap();
        assert_eq!(report.mirrors_resolved, 1);
        assert_eq!(report.self_friendships_removed, 1);
        assert_eq!(report.reverse_edges_added, 0);

        let db = fx.db.lock().await;
        assert_eq!(
            db.list_sent_requests(alice).unwrap()[0].status,
            RequestStatus::Rejected
        );
        assert!(!db.is_friend(alice, alice).unwrap());
    }
}
