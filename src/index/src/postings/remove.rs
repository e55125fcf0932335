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

use crate::postings::{empty_postings, Error, Postings, SeriesId};

/// Returns the series ids present in `base` and absent from `drop`, in
/// `base` order. A sentinel `base` yields the sentinel; a sentinel `drop`
/// returns `base` unchanged.
pub fn without(base: Box<dyn Postings>, drop: Box<dyn Postings>) -> Box<dyn Postings> {
    if base.is_empty_sentinel() {
        return empty_postings();
    }
    if drop.is_empty_sentinel() {
        return base;
    }
    Box::new(RemovedPostings {
        base,
        drop,
        cur: 0,
        base_ok: false,
        drop_ok: false,
        initialized: false,
        exhausted: false,
    })
}

/// Two-cursor sorted difference. `base` runs one step ahead of `cur`; the
/// advance loop is iterative so arbitrarily long runs of equal values cannot
/// grow the stack.
struct RemovedPostings {
    base: Box<dyn Postings>,
    drop: Box<dyn Postings>,
    cur: SeriesId,
    base_ok: bool,
    drop_ok: bool,
    initialized: bool,
    exhausted: bool,
}

impl Postings for RemovedPostings {
    fn next(&mut self) -> bool {
        if self.exhausted {
            return false;
        }
        if !self.initialized {
            self.base_ok = self.base.next();
            self.drop_ok = self.drop.next();
            self.initialized = true;
        }
        loop {
            if !self.base_ok {
                self.exhausted = true;
                return false;
            }
            if !self.drop_ok {
                self.cur = self.base.at();
                self.base_ok = self.base.next();
                return true;
            }
            let base_cur = self.base.at();
            let drop_cur = self.drop.at();
            if base_cur < drop_cur {
                self.cur = base_cur;
                self.base_ok = self.base.next();
                return true;
            } else if drop_cur < base_cur {
                self.drop_ok = self.drop.seek(base_cur);
            } else {
                // Equal: the value is dropped, move both past it.
                self.base_ok = self.base.next();
                self.drop_ok = self.drop.next();
            }
        }
    }

    fn seek(&mut self, id: SeriesId) -> bool {
        if self.exhausted {
            return false;
        }
        if self.initialized && self.cur >= id {
            return true;
        }
        self.base_ok = self.base.seek(id);
        self.drop_ok = self.drop.seek(id);
        self.initialized = true;
        self.next()
    }

    fn at(&self) -> SeriesId {
        self.cur
    }

    fn error(&self) -> Option<Error> {
        self.base.error().or_else(|| self.drop.error())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::postings::{expand_postings, ListPostings};

    fn list(ids: &[SeriesId]) -> Box<dyn Postings> {
        Box::new(ListPostings::from_vec(ids.to_vec()))
    }

    fn expand(mut p: Box<dyn Postings>) -> Vec<SeriesId> {
        expand_postings(p.as_mut()).unwrap()
    }

    #[test]
    fn test_without_table() {
        let cases: Vec<(Vec<SeriesId>, Vec<SeriesId>, Vec<SeriesId>)> = vec![
            (vec![], vec![], vec![]),
            (vec![1, 2, 3, 4], vec![], vec![1, 2, 3, 4]),
            (vec![], vec![1, 2, 3, 4], vec![]),
            (vec![1, 2, 3, 4, 5], vec![6, 7, 8, 9, 10], vec![1, 2, 3, 4, 5]),
            (vec![1, 2, 3, 4, 5], vec![4, 5, 6, 7, 8], vec![1, 2, 3]),
            (
                vec![1, 2, 3, 4, 9, 10],
                vec![1, 4, 5, 6, 7, 8, 10, 11],
                vec![2, 3, 9],
            ),
            (
                vec![1, 2, 3, 4, 9, 10],
                vec![1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11],
                vec![],
            ),
            (vec![1, 2, 3], vec![3, 4, 5], vec![1, 2]),
        ];

        for (base, drop, want) in cases {
            assert_eq!(expand(without(list(&base), list(&drop))), want);
        }
    }

    #[test]
    fn test_without_sentinels() {
        assert!(without(empty_postings(), empty_postings()).is_empty_sentinel());
        assert!(without(empty_postings(), list(&[1, 2])).is_empty_sentinel());

        let p = without(list(&[1, 2]), empty_postings());
        assert!(!p.is_empty_sentinel());
        assert_eq!(expand(p), vec![1, 2]);
    }

    #[test]
    fn test_without_seek() {
        let cases: Vec<(Vec<SeriesId>, Vec<SeriesId>, SeriesId, bool, Vec<SeriesId>)> = vec![
            // (base, drop, seek, success, rest incl. the landing value)
            (vec![2, 3, 4, 5], vec![6, 7, 8, 9, 10], 1, true, vec![2, 3, 4, 5]),
            (
                vec![1, 2, 3, 4, 5],
                vec![6, 7, 8, 9, 10],
                2,
                true,
                vec![2, 3, 4, 5],
            ),
            (vec![1, 2, 3, 4, 5], vec![4, 5, 6, 7, 8], 9, false, vec![]),
            (
                vec![1, 2, 3, 4, 9, 10],
                vec![1, 4, 5, 6, 7, 8, 10, 11],
                10,
                false,
                vec![],
            ),
            (
                vec![1, 2, 3, 4, 9, 10],
                vec![1, 4, 5, 6, 7, 8, 11],
                4,
                true,
                vec![9, 10],
            ),
            (
                vec![1, 2, 3, 4, 9, 10],
                vec![1, 4, 5, 6, 7, 8, 11],
                5,
                true,
                vec![9, 10],
            ),
            (
                vec![1, 2, 3, 4, 9, 10],
                vec![1, 4, 5, 6, 7, 8, 11],
                10,
                true,
                vec![10],
            ),
        ];

        for (base, drop, target, success, rest) in cases {
            let mut p = without(list(&base), list(&drop));
            assert_eq!(p.seek(target), success, "seek {target}");
            if success {
                let mut got = vec![p.at()];
                got.extend(expand_postings(p.as_mut()).unwrap());
                assert_eq!(got, rest);
            }
        }
    }

    #[test]
    fn test_without_long_identical_inputs() {
        // Ten million shared values must drain without emitting anything and
        // without growing the stack.
        let ids: Vec<SeriesId> = (0..10_000_000).collect();
        let mut p = without(list(&ids), list(&ids));
        let mut got_any = false;
        while p.next() {
            got_any = true;
        }
        assert!(!got_any);
        assert!(p.error().is_none());
    }
}
