//! Cursor-based pagination.
//!
//! Every list-producing endpoint shares the same retrieval shape: request a
//! page, derive the next cursor from the *last* item of that page, repeat
//! until the backend sends an empty page or the caller's limit is reached.
//! [`PaginatedIter`] captures that shape once, over any page-fetch closure
//! (normally a [`crate::Client::invoke`] call plus a parse).
//!
//! The iterator is forward-only and not restartable; build a fresh one to
//! start over. It assumes the backend's cursor advances on every page — a
//! backend that keeps returning the same last item would loop forever.

use std::collections::VecDeque;

use crate::errors::InvocationError;

/// Upper bound on items requested per page, whatever the caller's limit.
pub const MAX_PAGE_SIZE: i32 = 100;

// Requested limits of zero or less mean "everything".
const UNBOUNDED: u64 = 1 << 31;

// ─── PaginatedIter ────────────────────────────────────────────────────────────

/// Forward-only iterator over a paginated result set.
///
/// `fetch` is called with the current cursor and a page size, and returns the
/// next page of items; `advance` derives the follow-up cursor from an item.
///
/// ```rust,no_run
/// # async fn demo() -> Result<(), courier_client::InvocationError> {
/// let mut pages = vec![vec![4i64, 5], vec![1, 2, 3]];
/// let mut iter = courier_client::PaginatedIter::new(
///     0,
///     0i64,
///     async move |_cursor: i64, _limit: i32| Ok(pages.pop().unwrap_or_default()),
///     |last: &i64| *last,
/// );
/// while let Some(item) = iter.next().await? {
///     println!("{item}");
/// }
/// # Ok(())
/// # }
/// ```
pub struct PaginatedIter<T, C, F, A> {
    fetch:     F,
    advance:   A,
    cursor:    C,
    buffer:    VecDeque<T>,
    remaining: u64,
    done:      bool,
}

impl<T, C, F, A> PaginatedIter<T, C, F, A>
where
    C: Clone,
    F: AsyncFnMut(C, i32) -> Result<Vec<T>, InvocationError>,
    A: FnMut(&T) -> C,
{
    /// Start a paginated fetch with the given starting cursor.
    ///
    /// `limit <= 0` means no bound: items are yielded until the backend
    /// returns an empty page.
    pub fn new(limit: i64, cursor: C, fetch: F, advance: A) -> Self {
        let remaining = if limit <= 0 { UNBOUNDED } else { limit as u64 };
        Self {
            fetch,
            advance,
            cursor,
            buffer: VecDeque::new(),
            remaining,
            done: false,
        }
    }

    /// Fetch the next item. Returns `None` once the sequence has ended.
    ///
    /// A failing page fetch surfaces here; items yielded before the failure
    /// remain valid.
    pub async fn next(&mut self) -> Result<Option<T>, InvocationError> {
        if self.done {
            return Ok(None);
        }

        if self.buffer.is_empty() {
            let limit = self.page_limit();
            let page  = (self.fetch)(self.cursor.clone(), limit).await?;
            let Some(last) = page.last() else {
                self.done = true;
                return Ok(None);
            };
            // The cursor moves to the last item of the page before any of
            // its items are handed out.
            self.cursor = (self.advance)(last);
            self.buffer.extend(page);
        }

        let item = self.buffer.pop_front();
        if item.is_some() {
            self.remaining -= 1;
            if self.remaining == 0 {
                self.done = true;
            }
        }
        Ok(item)
    }

    fn page_limit(&self) -> i32 {
        self.remaining.min(MAX_PAGE_SIZE as u64) as i32
    }
}
