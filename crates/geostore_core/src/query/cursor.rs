//! Lazy result sequences for the query engine.
//!
//! # Responsibility
//! - Fetch query results on demand instead of materializing them up front.
//!
//! # Invariants
//! - Dropping a cursor early fetches nothing more.
//! - A cursor never caches across queries; running the query again re-executes it.
//! - After the first error a cursor is finished.

use crate::db::Session;
use crate::repo::RepoResult;
use rusqlite::Connection;
use std::collections::VecDeque;

/// Loads one page after an optional keyset position: `(key, item)` pairs in key order.
pub(crate) type PageFetch<'s, K, T> =
    Box<dyn Fn(&Connection, Option<&K>, u32) -> RepoResult<Vec<(K, T)>> + 's>;

/// Turns one ranked key into zero or more results.
pub(crate) type Hydrate<'s, K, T> = Box<dyn Fn(&Connection, K) -> RepoResult<Vec<T>> + 's>;

/// Keyset-paginated cursor: fetches `page_size` rows per round trip.
///
/// Each page is a separate read; drain the cursor inside [`Session::read`]
/// to see all pages from one snapshot.
pub struct PagedCursor<'s, K, T> {
    session: &'s Session,
    fetch: PageFetch<'s, K, T>,
    after: Option<K>,
    buffer: VecDeque<T>,
    page_size: u32,
    exhausted: bool,
}

impl<'s, K: Clone, T> PagedCursor<'s, K, T> {
    pub(crate) fn new(session: &'s Session, fetch: PageFetch<'s, K, T>) -> Self {
        Self {
            session,
            fetch,
            after: None,
            buffer: VecDeque::new(),
            page_size: session.options().page_size.max(1),
            exhausted: false,
        }
    }

    fn fill(&mut self) -> RepoResult<()> {
        let page = (self.fetch)(self.session.conn(), self.after.as_ref(), self.page_size)?;
        if page.len() < self.page_size as usize {
            self.exhausted = true;
        }
        if let Some((key, _)) = page.last() {
            self.after = Some(key.clone());
        }
        self.buffer.extend(page.into_iter().map(|(_, item)| item));
        Ok(())
    }
}

impl<K: Clone, T> Iterator for PagedCursor<'_, K, T> {
    type Item = RepoResult<T>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buffer.is_empty() && !self.exhausted {
            if let Err(err) = self.fill() {
                self.exhausted = true;
                self.buffer.clear();
                return Some(Err(err));
            }
        }
        self.buffer.pop_front().map(Ok)
    }
}

/// Cursor over keys ranked up front; entities are loaded one key at a time.
///
/// Keys whose entity vanished since ranking yield nothing.
pub struct HydratingCursor<'s, K, T> {
    session: &'s Session,
    ranked: std::vec::IntoIter<K>,
    hydrate: Hydrate<'s, K, T>,
    buffer: VecDeque<T>,
    failed: bool,
}

impl<'s, K, T> HydratingCursor<'s, K, T> {
    pub(crate) fn new(session: &'s Session, ranked: Vec<K>, hydrate: Hydrate<'s, K, T>) -> Self {
        Self {
            session,
            ranked: ranked.into_iter(),
            hydrate,
            buffer: VecDeque::new(),
            failed: false,
        }
    }

    /// Number of ranked keys not yet hydrated.
    pub fn remaining_keys(&self) -> usize {
        self.ranked.len()
    }
}

impl<K, T> Iterator for HydratingCursor<'_, K, T> {
    type Item = RepoResult<T>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(item) = self.buffer.pop_front() {
                return Some(Ok(item));
            }
            if self.failed {
                return None;
            }
            let key = self.ranked.next()?;
            match (self.hydrate)(self.session.conn(), key) {
                Ok(items) => self.buffer.extend(items),
                Err(err) => {
                    self.failed = true;
                    return Some(Err(err));
                }
            }
        }
    }
}
