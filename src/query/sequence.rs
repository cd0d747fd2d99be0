//! Lazy "next N" sequences.

use super::HistoricalQuery;
use crate::entry::HistoricalEntry;
use crate::error::Result;
use crate::merge::DuplicateFilteringMergeList;
use horizon_types::Timestamp;
use std::collections::VecDeque;
use std::iter::FusedIterator;
use std::sync::Arc;

/// Up to `n` entries after a key, fetched page by page as the sequence is
/// consumed.
///
/// The sequence is single-pass. It closes itself after the last entry, on
/// the first error, or when the next entry is suppressed by the query's
/// policy; a closed sequence yields nothing more.
pub struct NextEntries<'a, V> {
    query: HistoricalQuery<'a, V>,
    boundary: Option<Timestamp>,
    cursor: Timestamp,
    remaining: usize,
    buffer: VecDeque<Timestamp>,
    seen: DuplicateFilteringMergeList<Timestamp>,
    closed: bool,
}

impl<'a, V: Send + Sync + 'static> NextEntries<'a, V> {
    pub(crate) fn new(
        query: HistoricalQuery<'a, V>,
        after: Timestamp,
        count: usize,
        boundary: Option<Timestamp>,
    ) -> Self {
        Self {
            query,
            boundary,
            cursor: after,
            remaining: count,
            buffer: VecDeque::new(),
            seen: DuplicateFilteringMergeList::new(),
            closed: false,
        }
    }

    /// Entries still allowed to be produced.
    pub fn remaining(&self) -> usize {
        if self.closed { 0 } else { self.remaining }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Stop the sequence and release its buffers.
    pub fn close(&mut self) {
        if !self.closed {
            log::trace!("closing next-entries sequence at {}", self.cursor);
        }
        self.closed = true;
        self.remaining = 0;
        self.buffer = VecDeque::new();
        self.seen = DuplicateFilteringMergeList::new();
    }

    fn refill(&mut self) -> Result<()> {
        let page = self.query.next_page(self.cursor, self.remaining)?;
        let Some(&last) = page.last() else {
            return Ok(());
        };

        let fresh = self.seen.filter_batch(&page)?;
        self.seen.add_batch(page)?;
        let cursor = self.cursor;
        self.buffer
            .extend(fresh.into_iter().filter(|key| *key > cursor));
        self.cursor = cursor.max(last);
        Ok(())
    }
}

impl<V: Send + Sync + 'static> Iterator for NextEntries<'_, V> {
    type Item = Result<Arc<HistoricalEntry<V>>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.closed || self.remaining == 0 {
            self.close();
            return None;
        }

        if self.buffer.is_empty()
            && let Err(err) = self.refill()
        {
            self.close();
            return Some(Err(err));
        }

        let Some(key) = self.buffer.pop_front() else {
            self.close();
            return None;
        };
        self.remaining -= 1;

        match self.query.policy().assert_optional(self.boundary, key) {
            Ok(Some(key)) => {
                let entry = self.query.entry(key);
                if self.remaining == 0 {
                    self.close();
                }
                Some(Ok(entry))
            }
            Ok(None) => {
                self.close();
                None
            }
            Err(err) => {
                self.close();
                Some(Err(err))
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.remaining()))
    }
}

impl<V: Send + Sync + 'static> FusedIterator for NextEntries<'_, V> {}

impl<V> std::fmt::Debug for NextEntries<'_, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NextEntries")
            .field("cursor", &self.cursor)
            .field("remaining", &self.remaining)
            .field("buffered", &self.buffer.len())
            .field("closed", &self.closed)
            .finish()
    }
}

/// Values of a [`NextEntries`] sequence.
///
/// A value that fails to load ends the sequence after reporting the error.
#[derive(Debug)]
pub struct NextValues<'a, V> {
    entries: NextEntries<'a, V>,
}

impl<'a, V: Clone + Send + Sync + 'static> NextValues<'a, V> {
    pub(crate) fn new(entries: NextEntries<'a, V>) -> Self {
        Self { entries }
    }

    pub fn is_closed(&self) -> bool {
        self.entries.is_closed()
    }

    pub fn close(&mut self) {
        self.entries.close();
    }
}

impl<V: Clone + Send + Sync + 'static> Iterator for NextValues<'_, V> {
    type Item = Result<V>;

    fn next(&mut self) -> Option<Self::Item> {
        let loaded = self.entries.next()?.and_then(|entry| entry.value().cloned());
        if loaded.is_err() {
            self.entries.close();
        }
        Some(loaded)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.entries.size_hint()
    }
}

impl<V: Clone + Send + Sync + 'static> FusedIterator for NextValues<'_, V> {}
