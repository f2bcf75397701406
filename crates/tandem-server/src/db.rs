use std::sync::Arc;

use tokio::sync::Mutex;

use tandem_store::Database;

/// The single store connection, shared by every service.
///
/// Each store call takes the lock on its own. Two calls that belong
/// together (e.g. both sides of a friendship) are two lock acquisitions
/// and may interleave with other requests.
pub type SharedDb = Arc<Mutex<Database>>;

pub fn shared(db: Database) -> SharedDb {
    Arc::new(Mutex::new(db))
}

#[cfg(test)]
pub fn in_memory() -> SharedDb {
    shared(Database::open_in_memory().expect("in-memory database"))
}
