//! Duplicate-filtering merge list for paged query results.
//!
//! Paging through a store returns ordered runs of entries that overlap at
//! their edges (an inclusive cursor comes back as the first element of the
//! next page). The merge list accumulates those runs into one de-duplicated
//! sequence, keeping the orientation of the first directed batch, without
//! rescanning what it already holds: incoming batches are compared against
//! the current minimum and maximum, and only keys inside that range are looked
//! up individually.

use crate::error::{HorizonError, Result};
use horizon_types::Timestamp;
use smallvec::SmallVec;
use std::cmp::Ordering;
use std::collections::VecDeque;
use std::sync::Arc;

/// Anything ordered by a timestamp key.
pub trait Keyed {
    fn key(&self) -> Timestamp;
}

impl Keyed for Timestamp {
    fn key(&self) -> Timestamp {
        *self
    }
}

impl<T: Keyed + ?Sized> Keyed for Arc<T> {
    fn key(&self) -> Timestamp {
        (**self).key()
    }
}

/// Direction of a batch or of the list's storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BatchShape {
    Single,
    Directed(Orientation),
}

/// Ordered, key-unique accumulator of paged batches.
///
/// # Examples
///
/// ```rust
/// use horizon::merge::DuplicateFilteringMergeList;
/// use horizon::Timestamp;
///
/// let ts = |s: i64| Timestamp::from_secs(s);
/// let mut list = DuplicateFilteringMergeList::new();
/// list.add_batch(vec![ts(5), ts(4), ts(3)])?;
/// // The cursor entry 3 comes back at the head of the next page.
/// assert_eq!(list.add_batch(vec![ts(3), ts(2), ts(1)])?, 2);
/// assert_eq!(list.into_vec(), vec![ts(5), ts(4), ts(3), ts(2), ts(1)]);
/// # Ok::<(), horizon::HorizonError>(())
/// ```
#[derive(Debug, Clone)]
pub struct DuplicateFilteringMergeList<T> {
    entries: VecDeque<T>,
    orientation: Option<Orientation>,
}

impl<T: Keyed> DuplicateFilteringMergeList<T> {
    pub fn new() -> Self {
        Self {
            entries: VecDeque::new(),
            orientation: None,
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            orientation: None,
        }
    }

    /// Orientation fixed by the first directed batch, if any.
    pub fn orientation(&self) -> Option<Orientation> {
        self.orientation
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entry with the smallest key.
    pub fn min_entry(&self) -> Option<&T> {
        match self.storage() {
            Orientation::Ascending => self.entries.front(),
            Orientation::Descending => self.entries.back(),
        }
    }

    /// Entry with the largest key.
    pub fn max_entry(&self) -> Option<&T> {
        match self.storage() {
            Orientation::Ascending => self.entries.back(),
            Orientation::Descending => self.entries.front(),
        }
    }

    /// Entries in list orientation.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> + ExactSizeIterator {
        self.entries.iter()
    }

    pub fn into_vec(self) -> Vec<T> {
        self.entries.into()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.orientation = None;
    }

    pub fn contains_key(&self, key: Timestamp) -> bool {
        self.search(key).is_ok()
    }

    /// Merge `batch` into the list and return how many entries were new.
    ///
    /// The batch must be strictly ascending or strictly descending by key and,
    /// once the list has an orientation, run in that same direction.
    pub fn add_batch(&mut self, batch: Vec<T>) -> Result<usize> {
        if batch.is_empty() {
            return Ok(0);
        }

        let shape = Self::shape(&batch)?;
        self.adopt(shape)?;

        let mut ascending = batch;
        if shape == BatchShape::Directed(Orientation::Descending) {
            ascending.reverse();
        }

        let (min, max) = match (self.min_entry(), self.max_entry()) {
            (Some(min), Some(max)) => (min.key(), max.key()),
            _ => {
                let added = ascending.len();
                self.extend_above(ascending);
                return Ok(added);
            }
        };

        let (lower_end, upper_start) = Self::split(&ascending, min, max);
        let above: SmallVec<[T; 8]> = ascending.drain(upper_start..).collect();
        let inner: SmallVec<[T; 8]> = ascending.drain(lower_end..).collect();
        let below = ascending;

        let mut added = below.len() + above.len();
        for entry in inner {
            let key = entry.key();
            if key == min || key == max {
                continue;
            }
            if let Err(position) = self.search(key) {
                self.entries.insert(position, entry);
                added += 1;
            }
        }

        self.extend_below(below);
        self.extend_above(above);
        Ok(added)
    }

    fn shape(batch: &[T]) -> Result<BatchShape> {
        let (Some(first), Some(last)) = (batch.first(), batch.last()) else {
            return Ok(BatchShape::Single);
        };
        if batch.len() == 1 {
            return Ok(BatchShape::Single);
        }

        let orientation = match first.key().cmp(&last.key()) {
            Ordering::Less => Orientation::Ascending,
            Ordering::Greater => Orientation::Descending,
            Ordering::Equal => {
                return Err(HorizonError::precondition(format!(
                    "batch of {} entries starts and ends on key {}",
                    batch.len(),
                    first.key()
                )));
            }
        };

        let expected = match orientation {
            Orientation::Ascending => Ordering::Less,
            Orientation::Descending => Ordering::Greater,
        };
        if let Some(pair) = batch
            .windows(2)
            .find(|pair| pair[0].key().cmp(&pair[1].key()) != expected)
        {
            return Err(HorizonError::precondition(format!(
                "batch is not strictly {:?}: {} followed by {}",
                orientation,
                pair[0].key(),
                pair[1].key()
            )));
        }

        Ok(BatchShape::Directed(orientation))
    }

    fn adopt(&mut self, shape: BatchShape) -> Result<()> {
        let BatchShape::Directed(incoming) = shape else {
            return Ok(());
        };
        match self.orientation {
            Some(existing) if existing != incoming => Err(HorizonError::precondition(format!(
                "{:?} batch does not match {:?} list",
                incoming, existing
            ))),
            Some(_) => Ok(()),
            None => {
                // Entries collected from single-element batches are stored
                // ascending until a direction is known.
                if incoming == Orientation::Descending {
                    self.entries.make_contiguous().reverse();
                }
                self.orientation = Some(incoming);
                Ok(())
            }
        }
    }

    fn storage(&self) -> Orientation {
        self.orientation.unwrap_or(Orientation::Ascending)
    }

    /// Index of the first entry not below `min` and of the first entry above
    /// `max`, scanning inward from both ends of an ascending batch.
    fn split(ascending: &[T], min: Timestamp, max: Timestamp) -> (usize, usize) {
        let lower_end = ascending
            .iter()
            .position(|entry| entry.key() >= min)
            .unwrap_or(ascending.len());
        let upper_start = ascending
            .iter()
            .rposition(|entry| entry.key() <= max)
            .map_or(lower_end, |index| index + 1)
            .max(lower_end);
        (lower_end, upper_start)
    }

    fn search(&self, key: Timestamp) -> std::result::Result<usize, usize> {
        match self.storage() {
            Orientation::Ascending => self.entries.binary_search_by(|probe| probe.key().cmp(&key)),
            Orientation::Descending => self.entries.binary_search_by(|probe| key.cmp(&probe.key())),
        }
    }

    /// Add keys below the current minimum, given in ascending order.
    fn extend_below(&mut self, ascending: impl IntoIterator<Item = T, IntoIter: DoubleEndedIterator>) {
        match self.storage() {
            Orientation::Ascending => {
                for entry in ascending.into_iter().rev() {
                    self.entries.push_front(entry);
                }
            }
            Orientation::Descending => {
                for entry in ascending.into_iter().rev() {
                    self.entries.push_back(entry);
                }
            }
        }
    }

    /// Add keys above the current maximum, given in ascending order.
    fn extend_above(&mut self, ascending: impl IntoIterator<Item = T>) {
        match self.storage() {
            Orientation::Ascending => self.entries.extend(ascending),
            Orientation::Descending => {
                for entry in ascending {
                    self.entries.push_front(entry);
                }
            }
        }
    }
}

impl<T: Keyed + Clone> DuplicateFilteringMergeList<T> {
    /// The part of `batch` that [`add_batch`](Self::add_batch) would add, in
    /// batch order, without modifying the list.
    pub fn filter_batch(&self, batch: &[T]) -> Result<Vec<T>> {
        if batch.is_empty() {
            return Ok(Vec::new());
        }

        if let (BatchShape::Directed(incoming), Some(existing)) =
            (Self::shape(batch)?, self.orientation)
            && incoming != existing
        {
            return Err(HorizonError::precondition(format!(
                "{:?} batch does not match {:?} list",
                incoming, existing
            )));
        }

        let bounds = self.min_entry().map(Keyed::key).zip(self.max_entry().map(Keyed::key));
        Ok(batch
            .iter()
            .filter(|entry| match bounds {
                None => true,
                Some((min, max)) => {
                    let key = entry.key();
                    key < min || key > max || (key != min && key != max && !self.contains_key(key))
                }
            })
            .cloned()
            .collect())
    }
}

impl<T: Keyed> Default for DuplicateFilteringMergeList<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(secs: i64) -> Timestamp {
        Timestamp::from_secs(secs)
    }

    fn keys(list: &DuplicateFilteringMergeList<Timestamp>) -> Vec<i64> {
        list.iter().map(|t| t.as_nanos() / 1_000_000_000).collect()
    }

    fn batch(secs: &[i64]) -> Vec<Timestamp> {
        secs.iter().copied().map(ts).collect()
    }

    #[test]
    fn test_descending_batches_extend_upwards() {
        let mut list = DuplicateFilteringMergeList::new();
        assert_eq!(list.add_batch(batch(&[5, 4, 3, 2, 1])).unwrap(), 5);
        assert_eq!(list.add_batch(batch(&[8, 7, 6])).unwrap(), 3);

        assert_eq!(keys(&list), vec![8, 7, 6, 5, 4, 3, 2, 1]);
        assert_eq!(list.min_entry(), Some(&ts(1)));
        assert_eq!(list.max_entry(), Some(&ts(8)));
        assert_eq!(list.orientation(), Some(Orientation::Descending));
    }

    #[test]
    fn test_same_batch_twice_is_idempotent() {
        let mut list = DuplicateFilteringMergeList::new();
        list.add_batch(batch(&[1, 2, 3, 4])).unwrap();
        let once = keys(&list);

        assert_eq!(list.add_batch(batch(&[1, 2, 3, 4])).unwrap(), 0);
        assert_eq!(keys(&list), once);
    }

    #[test]
    fn test_overlapping_pages() {
        let mut list = DuplicateFilteringMergeList::new();
        list.add_batch(batch(&[1, 2, 3])).unwrap();
        assert_eq!(list.add_batch(batch(&[3, 4, 5])).unwrap(), 2);
        assert_eq!(list.add_batch(batch(&[-1, 0, 1])).unwrap(), 2);
        assert_eq!(keys(&list), vec![-1, 0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_contained_batch_contributes_nothing() {
        let mut list = DuplicateFilteringMergeList::new();
        list.add_batch(batch(&[10, 20, 30, 40])).unwrap();
        assert_eq!(list.add_batch(batch(&[20, 30])).unwrap(), 0);
        assert_eq!(list.add_batch(batch(&[40])).unwrap(), 0);
        assert_eq!(list.add_batch(batch(&[10])).unwrap(), 0);
        assert_eq!(list.len(), 4);
    }

    #[test]
    fn test_unknown_inner_key_is_merged_in_place() {
        let mut list = DuplicateFilteringMergeList::new();
        list.add_batch(batch(&[50, 40, 10])).unwrap();
        assert_eq!(list.add_batch(batch(&[60, 30, 20])).unwrap(), 3);
        assert_eq!(keys(&list), vec![60, 50, 40, 30, 20, 10]);
    }

    #[test]
    fn test_contradicting_orientation_is_rejected() {
        let mut list = DuplicateFilteringMergeList::new();
        list.add_batch(batch(&[3, 2, 1])).unwrap();

        let err = list.add_batch(batch(&[4, 5])).unwrap_err();
        assert!(matches!(err, HorizonError::Precondition(_)));
        assert_eq!(keys(&list), vec![3, 2, 1]);
    }

    #[test]
    fn test_unordered_batch_is_rejected() {
        let mut list = DuplicateFilteringMergeList::new();
        assert!(list.add_batch(batch(&[1, 3, 2, 4])).is_err());
        assert!(list.add_batch(batch(&[2, 5, 2])).is_err());
        assert!(list.is_empty());
        assert_eq!(list.orientation(), None);
    }

    #[test]
    fn test_singles_then_descending_reorients() {
        let mut list = DuplicateFilteringMergeList::new();
        list.add_batch(batch(&[5])).unwrap();
        list.add_batch(batch(&[2])).unwrap();
        assert_eq!(list.orientation(), None);
        assert_eq!(keys(&list), vec![2, 5]);

        list.add_batch(batch(&[9, 8, 7])).unwrap();
        assert_eq!(keys(&list), vec![9, 8, 7, 5, 2]);
    }

    #[test]
    fn test_filter_batch_does_not_modify() {
        let mut list = DuplicateFilteringMergeList::new();
        list.add_batch(batch(&[1, 2, 3])).unwrap();

        let fresh = list.filter_batch(&batch(&[2, 3, 4, 5])).unwrap();
        assert_eq!(fresh, batch(&[4, 5]));
        assert_eq!(list.len(), 3);

        assert!(list.filter_batch(&batch(&[5, 4])).is_err());
    }

    #[test]
    fn test_clear_forgets_orientation() {
        let mut list = DuplicateFilteringMergeList::new();
        list.add_batch(batch(&[3, 2])).unwrap();
        list.clear();
        assert!(list.is_empty());
        list.add_batch(batch(&[1, 2])).unwrap();
        assert_eq!(list.orientation(), Some(Orientation::Ascending));
    }
}
