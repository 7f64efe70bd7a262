//! Keyset pagination for listing and search operations.
//!
//! Pages are ordered by entry id. The continuation token is the id of the last
//! entry on the previous page, so pages stay stable while rows are inserted
//! behind the cursor.

use crate::entry::{Entry, EntryId};
use serde::Serialize;

/// Requested page: `size == 0` asks for everything in one page
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageRequest {
    pub size: usize,
    pub after: Option<EntryId>,
}

impl PageRequest {
    pub fn new(size: usize) -> Self {
        Self { size, after: None }
    }

    /// Everything, no continuation
    pub fn all() -> Self {
        Self::default()
    }

    /// Continue after a token returned by a previous page
    pub fn after(mut self, token: Option<EntryId>) -> Self {
        self.after = token;
        self
    }

    pub fn is_unbounded(&self) -> bool {
        self.size == 0
    }

    /// Row limit to request from storage: one extra row tells us whether a
    /// next page exists. `-1` is SQLite's "no limit", also used when the
    /// size does not fit a SQLite integer.
    pub(crate) fn fetch_limit(&self) -> i64 {
        if self.is_unbounded() {
            return -1;
        }
        i64::try_from(self.size)
            .ok()
            .and_then(|size| size.checked_add(1))
            .unwrap_or(-1)
    }

    pub(crate) fn after_id(&self) -> EntryId {
        self.after.unwrap_or(0)
    }
}

/// One page of results and the token for the next page, if any
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next: Option<EntryId>,
}

impl Page<Entry> {
    /// Trim an over-fetched row list (see [`PageRequest::fetch_limit`]) into a page
    pub(crate) fn from_overfetch(mut rows: Vec<Entry>, request: &PageRequest) -> Self {
        if request.is_unbounded() || rows.len() <= request.size {
            return Self {
                items: rows,
                next: None,
            };
        }

        rows.truncate(request.size);
        let next = rows.last().map(|e| e.id);
        Self { items: rows, next }
    }
}

impl<T> Page<T> {
    pub fn is_last(&self) -> bool {
        self.next.is_none()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
