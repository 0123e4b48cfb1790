// Store-backed identifier allocation.
//
// Each id space (documents, bookmarks) owns one async lock. A lease holds the
// lock from the scan of today's ids until the caller has inserted the rows,
// so two requests in one process never receive the same id. The primary key
// still rejects duplicates written by other processes.

use sqlx::SqlitePool;
use tokio::sync::{Mutex, MutexGuard};
use zsk_common::{clock, ids};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdSpace {
    Documents,
    Bookmarks,
}

impl IdSpace {
    const fn scan_query(self) -> &'static str {
        match self {
            Self::Documents => "SELECT id FROM documents WHERE id LIKE ?",
            Self::Bookmarks => "SELECT id FROM bookmarks WHERE id LIKE ?",
        }
    }
}

#[derive(Debug)]
pub struct IdAllocator {
    space: IdSpace,
    lock: Mutex<()>,
}

/// Ids reserved for one insert. Drop it once the rows are written.
#[derive(Debug)]
pub struct IdLease<'a> {
    ids: Vec<String>,
    _guard: MutexGuard<'a, ()>,
}

impl IdLease<'_> {
    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    /// The first (for single inserts, the only) reserved id.
    pub fn first(&self) -> &str {
        self.ids.first().map(String::as_str).unwrap_or_default()
    }
}

impl IdAllocator {
    pub fn new(space: IdSpace) -> Self {
        Self { space, lock: Mutex::new(()) }
    }

    /// Reserve `count` consecutive ids for today.
    pub async fn lease(&self, pool: &SqlitePool, count: usize) -> Result<IdLease<'_>, sqlx::Error> {
        let guard = self.lock.lock().await;
        let date = clock::today();
        let pattern = format!("{}%", ids::day_prefix(date));

        let existing: Vec<String> =
            sqlx::query_scalar(self.space.scan_query()).bind(pattern).fetch_all(pool).await?;
        let ids = ids::allocate_batch(date, existing.iter().map(String::as_str), count.max(1));

        tracing::debug!(space = ?self.space, first = %ids[0], count = ids.len(), "leased ids");
        Ok(IdLease { ids, _guard: guard })
    }
}
