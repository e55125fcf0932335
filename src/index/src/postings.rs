// Copyright 2023 Greptime Team
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Postings index core: label terms mapped to ascending series id lists, and
//! the lazy set-algebra iterators that compose them.
//!
//! Every source of postings (an in-memory sorted array, a packed big-endian
//! byte slice from an index block, a roaring bitmap) presents the same
//! cursor contract ([`Postings`]), so the combinators ([`intersect`],
//! [`merge`], [`without`]) can drive heterogeneous inputs in lockstep
//! without materializing them.

pub mod error;
mod intersect;
mod list;
mod mem;
mod merge;
mod remove;
mod roaring;

use snafu::ensure;

pub use crate::postings::error::{Error, Result};
pub use crate::postings::intersect::intersect;
pub use crate::postings::list::{BigEndianPostings, ListPostings};
pub use crate::postings::mem::{LabelStats, MemPostings, MemPostingsBuilder};
pub use crate::postings::merge::merge;
pub use crate::postings::remove::without;
pub use crate::postings::roaring::{RoaringPostings, RoaringPostingsIter};

/// Identifier of a time series. Allocated densely by the series store.
pub type SeriesId = u64;

/// The reserved label pair whose posting list holds every live series id.
pub const ALL_POSTINGS_KEY: (&str, &str) = ("", "");

/// A `(name, value)` label pair keying one posting list.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LabelPair {
    pub name: String,
    pub value: String,
}

impl LabelPair {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> LabelPair {
        LabelPair {
            name: name.into(),
            value: value.into(),
        }
    }

    /// The all-postings sentinel pair.
    pub fn all_postings() -> LabelPair {
        LabelPair::new(ALL_POSTINGS_KEY.0, ALL_POSTINGS_KEY.1)
    }
}

/// A lazy cursor over an ascending sequence of series ids.
///
/// The values observed through `at` after successful `next`/`seek` calls are
/// strictly ascending; once a cursor reports exhaustion it stays exhausted.
pub trait Postings: Send {
    /// Advances to the next series id. Returns false at exhaustion.
    fn next(&mut self) -> bool;

    /// Advances to the smallest series id >= `id` and returns true, or
    /// exhausts and returns false. Seeking at or before the current position
    /// is a no-op returning true; seeking an exhausted cursor returns false.
    fn seek(&mut self, id: SeriesId) -> bool;

    /// The current series id. Meaningful only after a successful
    /// `next`/`seek`.
    fn at(&self) -> SeriesId;

    /// Any deferred error. `next`/`seek` return false once an error is set.
    fn error(&self) -> Option<Error> {
        None
    }

    /// True only for the shared empty sentinel; combinators short-circuit on
    /// it without draining it.
    fn is_empty_sentinel(&self) -> bool {
        false
    }
}

/// The empty sentinel: exhausts immediately and carries no error.
struct EmptyPostings;

impl Postings for EmptyPostings {
    fn next(&mut self) -> bool {
        false
    }

    fn seek(&mut self, _id: SeriesId) -> bool {
        false
    }

    fn at(&self) -> SeriesId {
        0
    }

    fn is_empty_sentinel(&self) -> bool {
        true
    }
}

/// Returns the empty sentinel.
pub fn empty_postings() -> Box<dyn Postings> {
    Box::new(EmptyPostings)
}

/// Drains `postings` into an ascending vec, enforcing strict ascent along the
/// way and surfacing the first deferred error.
pub fn expand_postings(postings: &mut dyn Postings) -> Result<Vec<SeriesId>> {
    let mut ids = Vec::new();
    while postings.next() {
        let id = postings.at();
        if let Some(&last) = ids.last() {
            ensure!(
                id > last,
                error::OutOfOrderPostingsSnafu {
                    current: last,
                    next: id
                }
            );
        }
        ids.push(id);
    }
    match postings.error() {
        Some(e) => Err(e),
        None => Ok(ids),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_postings_exhausts_immediately() {
        let mut p = empty_postings();
        assert!(p.is_empty_sentinel());
        assert!(!p.next());
        assert!(!p.seek(0));
        assert!(!p.seek(42));
        assert!(p.error().is_none());

        assert_eq!(expand_postings(p.as_mut()).unwrap(), Vec::<SeriesId>::new());
    }

    #[test]
    fn test_expand_postings() {
        let mut p = ListPostings::from_vec(vec![1, 3, 5, 1000]);
        assert_eq!(expand_postings(&mut p).unwrap(), vec![1, 3, 5, 1000]);
        // A drained cursor expands to nothing further.
        assert_eq!(expand_postings(&mut p).unwrap(), Vec::<SeriesId>::new());
    }

    /// A misbehaving source yielding a non-ascending sequence.
    struct OutOfOrder {
        values: Vec<SeriesId>,
        index: usize,
    }

    impl Postings for OutOfOrder {
        fn next(&mut self) -> bool {
            self.index += 1;
            self.index <= self.values.len()
        }

        fn seek(&mut self, _id: SeriesId) -> bool {
            self.next()
        }

        fn at(&self) -> SeriesId {
            self.values[self.index - 1]
        }
    }

    #[test]
    fn test_expand_postings_detects_order_violation() {
        let mut p = OutOfOrder {
            values: vec![1, 5, 3],
            index: 0,
        };
        let res = expand_postings(&mut p);
        assert!(matches!(res, Err(Error::OutOfOrderPostings { .. })));
    }

    /// A source that exhausts immediately with a deferred error set.
    struct FailingPostings;

    impl Postings for FailingPostings {
        fn next(&mut self) -> bool {
            false
        }

        fn seek(&mut self, _id: SeriesId) -> bool {
            false
        }

        fn at(&self) -> SeriesId {
            0
        }

        fn error(&self) -> Option<Error> {
            Some(error::MalformedPostingListSnafu { length: 3usize }.build())
        }
    }

    #[test]
    fn test_combinators_propagate_child_errors() {
        let healthy = || -> Box<dyn Postings> { Box::new(ListPostings::from_vec(vec![1, 2, 3])) };

        let mut merged = merge(vec![healthy(), Box::new(FailingPostings)]);
        assert!(matches!(
            expand_postings(merged.as_mut()),
            Err(Error::MalformedPostingList { .. })
        ));

        let mut intersected = intersect(vec![healthy(), Box::new(FailingPostings)]);
        assert!(matches!(
            expand_postings(intersected.as_mut()),
            Err(Error::MalformedPostingList { .. })
        ));

        let mut removed = without(healthy(), Box::new(FailingPostings));
        assert!(matches!(
            expand_postings(removed.as_mut()),
            Err(Error::MalformedPostingList { .. })
        ));
    }

    #[test]
    fn test_label_pair_all_postings() {
        let all = LabelPair::all_postings();
        assert_eq!(all.name, ALL_POSTINGS_KEY.0);
        assert_eq!(all.value, ALL_POSTINGS_KEY.1);
    }
}
