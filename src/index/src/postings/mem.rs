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

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use tracing::debug;

use crate::postings::{
    empty_postings, LabelPair, ListPostings, Postings, SeriesId, ALL_POSTINGS_KEY,
};

type PostingList = Arc<Vec<SeriesId>>;

/// `MemPostings` maps every `(label name, label value)` pair to the
/// ascending list of series ids carrying that pair, plus the reserved
/// all-postings pair holding every live id.
///
/// Readers and the writer may run concurrently: lists are `Arc`-shared and
/// never mutated once handed out, so a cursor obtained from [`Self::get`]
/// keeps observing its point-in-time snapshot across later `add`/`delete`
/// calls.
pub struct MemPostings {
    inner: RwLock<Inner>,
}

struct Inner {
    m: HashMap<String, HashMap<String, PostingList>>,
    ordered: bool,
}

impl Inner {
    fn new(ordered: bool) -> Inner {
        Inner {
            m: HashMap::new(),
            ordered,
        }
    }

    fn add_for(&mut self, id: SeriesId, name: &str, value: &str) {
        let list = self
            .m
            .entry(name.to_string())
            .or_default()
            .entry(value.to_string())
            .or_default();
        let list = Arc::make_mut(list);
        // Re-adding the id the list already ends with must not introduce a
        // duplicate.
        if list.last() == Some(&id) {
            return;
        }
        list.push(id);
    }

    fn ensure_ordered(&mut self) {
        if self.ordered {
            return;
        }
        for values in self.m.values_mut() {
            for list in values.values_mut() {
                let list = Arc::make_mut(list);
                list.sort_unstable();
                list.dedup();
            }
        }
        self.ordered = true;
    }
}

impl Default for MemPostings {
    fn default() -> MemPostings {
        MemPostings::new()
    }
}

impl MemPostings {
    /// An empty index. Callers promise monotonically increasing series ids
    /// across `add` calls; bulk loads with arbitrary id order go through
    /// [`MemPostingsBuilder`] instead.
    pub fn new() -> MemPostings {
        MemPostings {
            inner: RwLock::new(Inner::new(true)),
        }
    }

    /// Appends `id` to the list of every given label pair and to the
    /// all-postings list.
    pub fn add(&self, id: SeriesId, labels: &[LabelPair]) {
        let mut inner = self.inner.write().unwrap();
        for label in labels {
            inner.add_for(id, &label.name, &label.value);
        }
        inner.add_for(id, ALL_POSTINGS_KEY.0, ALL_POSTINGS_KEY.1);
    }

    /// Returns a cursor over a point-in-time snapshot of the pair's posting
    /// list, or the empty sentinel for an unknown pair.
    pub fn get(&self, name: &str, value: &str) -> Box<dyn Postings> {
        let inner = self.inner.read().unwrap();
        match inner.m.get(name).and_then(|values| values.get(value)) {
            Some(list) => Box::new(ListPostings::new(list.clone())),
            None => empty_postings(),
        }
    }

    /// Returns the cursor over every live series id.
    pub fn all(&self) -> Box<dyn Postings> {
        self.get(ALL_POSTINGS_KEY.0, ALL_POSTINGS_KEY.1)
    }

    /// Number of live series.
    pub fn series_count(&self) -> usize {
        let inner = self.inner.read().unwrap();
        inner
            .m
            .get(ALL_POSTINGS_KEY.0)
            .and_then(|values| values.get(ALL_POSTINGS_KEY.1))
            .map(|list| list.len())
            .unwrap_or(0)
    }

    /// Removes the given series ids from every posting list. Affected lists
    /// are rebuilt and published whole, so cursors handed out earlier keep
    /// their pre-delete snapshot; pairs whose list empties are dropped.
    pub fn delete(&self, deleted: &HashSet<SeriesId>) {
        if deleted.is_empty() {
            return;
        }
        let mut inner = self.inner.write().unwrap();
        inner.m.retain(|_, values| {
            values.retain(|_, list| {
                if !list.iter().any(|id| deleted.contains(id)) {
                    // Untouched lists keep their allocation.
                    return true;
                }
                let rebuilt: Vec<_> = list
                    .iter()
                    .filter(|id| !deleted.contains(id))
                    .copied()
                    .collect();
                if rebuilt.is_empty() {
                    return false;
                }
                *list = Arc::new(rebuilt);
                true
            });
            !values.is_empty()
        });
        debug!(deleted = deleted.len(), "deleted series from mem postings");
    }

    /// Sorts and deduplicates every list. Idempotent; a no-op on an index
    /// that is already ordered.
    pub fn ensure_ordered(&self) {
        let mut inner = self.inner.write().unwrap();
        inner.ensure_ordered();
    }

    /// Cardinality of a label name, for query planning.
    pub fn stats(&self, name: &str) -> LabelStats {
        let inner = self.inner.read().unwrap();
        let mut stats = LabelStats::default();
        let Some(values) = inner.m.get(name) else {
            return stats;
        };
        stats.value_count = values.len();
        for (value, list) in values {
            if list.len() > stats.max_series_count {
                stats.max_series_count = list.len();
                stats.max_value.clone_from(value);
            }
        }
        stats
    }

    /// Sorted distinct label names with at least one posting list, the
    /// all-postings name excluded.
    pub fn label_names(&self) -> Vec<String> {
        let inner = self.inner.read().unwrap();
        let mut names: Vec<String> = inner
            .m
            .iter()
            .filter(|(name, values)| name.as_str() != ALL_POSTINGS_KEY.0 && !values.is_empty())
            .map(|(name, _)| name.clone())
            .collect();
        names.sort_unstable();
        names
    }

    /// Sorted values indexed under `name`.
    pub fn label_values(&self, name: &str) -> Vec<String> {
        let inner = self.inner.read().unwrap();
        let mut values: Vec<String> = inner
            .m
            .get(name)
            .map(|values| values.keys().cloned().collect())
            .unwrap_or_default();
        values.sort_unstable();
        values
    }

    /// Every indexed label pair, the all-postings pair included, sorted by
    /// name then value. Index writers persist pairs in this order.
    pub fn sorted_label_pairs(&self) -> Vec<LabelPair> {
        let inner = self.inner.read().unwrap();
        let mut pairs: Vec<LabelPair> = inner
            .m
            .iter()
            .flat_map(|(name, values)| {
                values
                    .keys()
                    .map(|value| LabelPair::new(name.clone(), value.clone()))
            })
            .collect();
        pairs.sort_unstable();
        pairs
    }
}

/// Cardinality summary of one label name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelStats {
    /// Number of distinct values under the name.
    pub value_count: usize,
    /// Length of the largest posting list among those values.
    pub max_series_count: usize,
    /// The value owning the largest posting list.
    pub max_value: String,
}

/// Bulk-build path: accepts series in any id order and hands back an ordered
/// [`MemPostings`] after a single sort-and-dedup pass.
pub struct MemPostingsBuilder {
    inner: Inner,
}

impl Default for MemPostingsBuilder {
    fn default() -> MemPostingsBuilder {
        MemPostingsBuilder::new()
    }
}

impl MemPostingsBuilder {
    pub fn new() -> MemPostingsBuilder {
        MemPostingsBuilder {
            inner: Inner::new(false),
        }
    }

    /// Appends `id` under every given label pair; ids may arrive in any
    /// order and repeatedly.
    pub fn add(&mut self, id: SeriesId, labels: &[LabelPair]) {
        for label in labels {
            self.inner.add_for(id, &label.name, &label.value);
        }
        self.inner.add_for(id, ALL_POSTINGS_KEY.0, ALL_POSTINGS_KEY.1);
    }

    /// Sorts and deduplicates every list and returns the ordered index.
    pub fn finish(mut self) -> MemPostings {
        self.inner.ensure_ordered();
        debug!(
            names = self.inner.m.len(),
            "finished bulk mem postings build"
        );
        MemPostings {
            inner: RwLock::new(self.inner),
        }
    }
}
