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

//! Roaring-style compressed posting list.
//!
//! Series ids are partitioned on `id >> 16` into chunks; each chunk stores
//! the low 16 bits of its members in either a sorted array (sparse) or an
//! 8 KiB bitmap (dense). The container choice is internal: iteration and
//! membership behave identically either way.

use std::sync::Arc;

use crate::postings::{Postings, SeriesId};

/// A chunk keeps a sorted array while it holds at most this many members and
/// switches to the bitmap form beyond it.
const ARRAY_CONTAINER_MAX: usize = 4096;

const BITMAP_WORDS: usize = 1 << 16 >> 6;

#[derive(Debug, Clone)]
enum Container {
    /// Ascending low-16 values of a sparse chunk.
    Array(Vec<u16>),
    /// One bit per possible low-16 value of a dense chunk.
    Bitmap(Box<[u64; BITMAP_WORDS]>),
}

impl Container {
    fn new() -> Container {
        Container::Array(Vec::new())
    }

    /// Inserts `low` at its sorted position. Returns false if already
    /// present. Promotes the array form once it outgrows the threshold.
    fn add(&mut self, low: u16) -> bool {
        match self {
            Container::Array(values) => match values.binary_search(&low) {
                Ok(_) => false,
                Err(pos) => {
                    values.insert(pos, low);
                    if values.len() > ARRAY_CONTAINER_MAX {
                        let mut words = Box::new([0u64; BITMAP_WORDS]);
                        for &v in values.iter() {
                            words[usize::from(v >> 6)] |= 1 << (v & 63);
                        }
                        *self = Container::Bitmap(words);
                    }
                    true
                }
            },
            Container::Bitmap(words) => {
                let word = &mut words[usize::from(low >> 6)];
                let mask = 1u64 << (low & 63);
                let added = *word & mask == 0;
                *word |= mask;
                added
            }
        }
    }

    fn remove(&mut self, low: u16) -> bool {
        match self {
            Container::Array(values) => match values.binary_search(&low) {
                Ok(pos) => {
                    values.remove(pos);
                    true
                }
                Err(_) => false,
            },
            Container::Bitmap(words) => {
                let word = &mut words[usize::from(low >> 6)];
                let mask = 1u64 << (low & 63);
                let removed = *word & mask != 0;
                *word &= !mask;
                removed
            }
        }
    }

    fn contains(&self, low: u16) -> bool {
        match self {
            Container::Array(values) => values.binary_search(&low).is_ok(),
            Container::Bitmap(words) => words[usize::from(low >> 6)] & (1 << (low & 63)) != 0,
        }
    }

    fn cardinality(&self) -> usize {
        match self {
            Container::Array(values) => values.len(),
            Container::Bitmap(words) => words.iter().map(|w| w.count_ones() as usize).sum(),
        }
    }

    fn is_empty(&self) -> bool {
        match self {
            Container::Array(values) => values.is_empty(),
            Container::Bitmap(words) => words.iter().all(|&w| w == 0),
        }
    }

    /// Smallest member >= `low`, if any.
    fn seek(&self, low: u16) -> Option<u16> {
        match self {
            Container::Array(values) => {
                let pos = values.partition_point(|&v| v < low);
                values.get(pos).copied()
            }
            Container::Bitmap(words) => {
                let mut index = usize::from(low >> 6);
                let mut word = words[index] & (!0u64 << (low & 63));
                loop {
                    if word != 0 {
                        return Some(((index << 6) + word.trailing_zeros() as usize) as u16);
                    }
                    index += 1;
                    if index == BITMAP_WORDS {
                        return None;
                    }
                    word = words[index];
                }
            }
        }
    }

    fn min(&self) -> Option<u16> {
        self.seek(0)
    }

    /// Smallest member strictly greater than `low`, if any.
    fn next_after(&self, low: u16) -> Option<u16> {
        if low == u16::MAX {
            return None;
        }
        self.seek(low + 1)
    }

    /// Folds a sparse bitmap back into the array form.
    fn compact(&mut self) {
        if let Container::Bitmap(words) = self {
            let cardinality: usize = words.iter().map(|w| w.count_ones() as usize).sum();
            if cardinality > ARRAY_CONTAINER_MAX {
                return;
            }
            let mut values = Vec::with_capacity(cardinality);
            for (index, &word) in words.iter().enumerate() {
                let mut word = word;
                while word != 0 {
                    values.push(((index << 6) + word.trailing_zeros() as usize) as u16);
                    word &= word - 1;
                }
            }
            *self = Container::Array(values);
        }
    }
}

/// `RoaringPostings` is a compressed posting list: a sorted sequence of
/// chunks keyed on `id >> 16`, each chunk holding the low 16 bits of its
/// members. Adds in any order are supported; iteration is always ascending.
#[derive(Debug, Clone, Default)]
pub struct RoaringPostings {
    containers: Vec<(u64, Container)>,
}

impl RoaringPostings {
    pub fn new() -> RoaringPostings {
        RoaringPostings::default()
    }

    pub fn from_ids(ids: impl IntoIterator<Item = SeriesId>) -> RoaringPostings {
        let mut postings = RoaringPostings::new();
        for id in ids {
            postings.add(id);
        }
        postings
    }

    /// Adds `id`, returning false if it was already present.
    pub fn add(&mut self, id: SeriesId) -> bool {
        let (key, low) = Self::split(id);
        match self.containers.binary_search_by_key(&key, |&(k, _)| k) {
            Ok(pos) => self.containers[pos].1.add(low),
            Err(pos) => {
                let mut container = Container::new();
                container.add(low);
                self.containers.insert(pos, (key, container));
                true
            }
        }
    }

    /// Removes `id`, returning false if it was absent. A chunk left empty is
    /// dropped so iteration skips it.
    pub fn remove(&mut self, id: SeriesId) -> bool {
        let (key, low) = Self::split(id);
        match self.containers.binary_search_by_key(&key, |&(k, _)| k) {
            Ok(pos) => {
                let removed = self.containers[pos].1.remove(low);
                if removed && self.containers[pos].1.is_empty() {
                    self.containers.remove(pos);
                }
                removed
            }
            Err(_) => false,
        }
    }

    pub fn contains(&self, id: SeriesId) -> bool {
        let (key, low) = Self::split(id);
        match self.containers.binary_search_by_key(&key, |&(k, _)| k) {
            Ok(pos) => self.containers[pos].1.contains(low),
            Err(_) => false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.containers.is_empty()
    }

    pub fn cardinality(&self) -> usize {
        self.containers.iter().map(|(_, c)| c.cardinality()).sum()
    }

    /// Compacts dense containers whose cardinality has dropped back to the
    /// array range. Membership and iteration are unaffected.
    pub fn optimize(&mut self) {
        for (_, container) in &mut self.containers {
            container.compact();
        }
    }

    fn split(id: SeriesId) -> (u64, u16) {
        (id >> 16, id as u16)
    }
}

/// Ascending cursor over a shared [`RoaringPostings`] snapshot.
pub struct RoaringPostingsIter {
    postings: Arc<RoaringPostings>,
    /// Index of the chunk under the cursor.
    chunk: usize,
    /// Low-16 position within the chunk; `None` before the chunk's first
    /// member has been yielded.
    low: Option<u16>,
    cur: SeriesId,
    started: bool,
    exhausted: bool,
}

impl RoaringPostingsIter {
    pub fn new(postings: Arc<RoaringPostings>) -> RoaringPostingsIter {
        RoaringPostingsIter {
            postings,
            chunk: 0,
            low: None,
            cur: 0,
            started: false,
            exhausted: false,
        }
    }
}

impl Postings for RoaringPostingsIter {
    fn next(&mut self) -> bool {
        if self.exhausted {
            return false;
        }
        loop {
            let Some(&(key, ref container)) = self.postings.containers.get(self.chunk) else {
                self.exhausted = true;
                return false;
            };
            let found = match self.low {
                None => container.min(),
                Some(low) => container.next_after(low),
            };
            match found {
                Some(low) => {
                    self.low = Some(low);
                    self.cur = (key << 16) | SeriesId::from(low);
                    self.started = true;
                    return true;
                }
                None => {
                    self.chunk += 1;
                    self.low = None;
                }
            }
        }
    }

    fn seek(&mut self, id: SeriesId) -> bool {
        if self.exhausted {
            return false;
        }
        if self.started && self.cur >= id {
            return true;
        }
        let (key, low) = RoaringPostings::split(id);
        // Jump straight to the chunk the target belongs to.
        self.chunk = self
            .postings
            .containers
            .partition_point(|&(k, _)| k < key);
        self.low = None;
        if let Some((k, container)) = self.postings.containers.get(self.chunk) {
            if *k == key {
                match container.seek(low) {
                    Some(found) => {
                        self.low = Some(found);
                        self.cur = (key << 16) | SeriesId::from(found);
                        self.started = true;
                        return true;
                    }
                    None => self.chunk += 1,
                }
            }
        }
        // The target chunk had nothing at or after the target; fall through
        // to the first member of the following chunks.
        self.next()
    }

    fn at(&self) -> SeriesId {
        self.cur
    }
}
