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

use std::sync::Arc;

use bytes::Bytes;
use snafu::ensure;

use crate::postings::error::{MalformedPostingListSnafu, Result};
use crate::postings::{Postings, SeriesId};

/// `ListPostings` is a positional cursor over an ascending, `Arc`-shared
/// series id list. The list is a point-in-time snapshot: holders of other
/// clones of the `Arc` never observe this cursor and vice versa.
pub struct ListPostings {
    list: Arc<Vec<SeriesId>>,
    /// Index of the next unread element; `list.len() + 1` once exhausted.
    index: usize,
    cur: SeriesId,
}

impl ListPostings {
    pub fn new(list: Arc<Vec<SeriesId>>) -> ListPostings {
        ListPostings {
            list,
            index: 0,
            cur: 0,
        }
    }

    pub fn from_vec(list: Vec<SeriesId>) -> ListPostings {
        ListPostings::new(Arc::new(list))
    }

    fn exhausted(&self) -> bool {
        self.index > self.list.len()
    }
}

impl Postings for ListPostings {
    fn next(&mut self) -> bool {
        match self.list.get(self.index) {
            Some(&id) => {
                self.cur = id;
                self.index += 1;
                true
            }
            None => {
                self.index = self.list.len() + 1;
                false
            }
        }
    }

    fn seek(&mut self, id: SeriesId) -> bool {
        if self.exhausted() {
            return false;
        }
        if self.index > 0 && self.cur >= id {
            return true;
        }
        // Binary search restricted to the unread tail.
        let rest = &self.list[self.index..];
        let offset = rest.partition_point(|&v| v < id);
        match rest.get(offset) {
            Some(&v) => {
                self.cur = v;
                self.index += offset + 1;
                true
            }
            None => {
                self.index = self.list.len() + 1;
                false
            }
        }
    }

    fn at(&self) -> SeriesId {
        self.cur
    }
}

/// `BigEndianPostings` walks a packed posting list as stored in index
/// blocks: consecutive 4-byte groups, each one series id as a big-endian
/// u32, widened to [`SeriesId`] on access. The buffer length must be a
/// multiple of 4; there is no terminator.
pub struct BigEndianPostings {
    data: Bytes,
    /// Index of the next unread entry; `count() + 1` once exhausted.
    index: usize,
    cur: u32,
}

impl BigEndianPostings {
    pub fn new(data: Bytes) -> Result<BigEndianPostings> {
        ensure!(
            data.len() % 4 == 0,
            MalformedPostingListSnafu { length: data.len() }
        );
        Ok(BigEndianPostings {
            data,
            index: 0,
            cur: 0,
        })
    }

    fn count(&self) -> usize {
        self.data.len() / 4
    }

    fn entry(&self, index: usize) -> u32 {
        let group = &self.data[index * 4..index * 4 + 4];
        u32::from_be_bytes([group[0], group[1], group[2], group[3]])
    }

    fn exhausted(&self) -> bool {
        self.index > self.count()
    }

    fn exhaust(&mut self) -> bool {
        self.index = self.count() + 1;
        false
    }
}

impl Postings for BigEndianPostings {
    fn next(&mut self) -> bool {
        if self.index >= self.count() {
            return self.exhaust();
        }
        self.cur = self.entry(self.index);
        self.index += 1;
        true
    }

    fn seek(&mut self, id: SeriesId) -> bool {
        if self.exhausted() {
            return false;
        }
        if self.index > 0 && SeriesId::from(self.cur) >= id {
            return true;
        }
        if id > SeriesId::from(u32::MAX) {
            return self.exhaust();
        }
        // Fixed-width big-endian groups sort bytewise in numeric order, so
        // the probes compare raw groups without decoding.
        let target = (id as u32).to_be_bytes();
        let (mut left, mut right) = (self.index, self.count());
        while left < right {
            let mid = left + (right - left) / 2;
            if self.data[mid * 4..mid * 4 + 4] < target[..] {
                left = mid + 1;
            } else {
                right = mid;
            }
        }
        if left == self.count() {
            return self.exhaust();
        }
        self.cur = self.entry(left);
        self.index = left + 1;
        true
    }

    fn at(&self) -> SeriesId {
        SeriesId::from(self.cur)
    }
}
