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

/// Intersects the given postings into a single lazy cursor.
///
/// An empty input set or any empty-sentinel input yields the empty sentinel;
/// a single input is returned unchanged.
pub fn intersect(mut postings: Vec<Box<dyn Postings>>) -> Box<dyn Postings> {
    if postings.is_empty() || postings.iter().any(|p| p.is_empty_sentinel()) {
        return empty_postings();
    }
    if postings.len() == 1 {
        return postings.pop().unwrap();
    }
    Box::new(IntersectPostings {
        children: postings,
        cur: 0,
        primed: false,
        exhausted: false,
    })
}

/// K-way leapfrog intersection. Every child is primed with one `next` before
/// the first emission; afterwards each emission advances exactly one child
/// (always the first) and seeks the rest back into agreement.
struct IntersectPostings {
    children: Vec<Box<dyn Postings>>,
    cur: SeriesId,
    primed: bool,
    exhausted: bool,
}

impl IntersectPostings {
    /// Raises every child to `pivot`, lifting the pivot whenever a child
    /// overshoots, until all children agree on one value.
    fn align(&mut self, mut pivot: SeriesId) -> bool {
        loop {
            let mut lifted = false;
            for child in &mut self.children {
                if child.at() < pivot && !child.seek(pivot) {
                    self.exhausted = true;
                    return false;
                }
                if child.at() > pivot {
                    pivot = child.at();
                    lifted = true;
                }
            }
            if !lifted {
                self.cur = pivot;
                return true;
            }
        }
    }

    fn pivot(&self) -> SeriesId {
        self.children.iter().map(|c| c.at()).max().unwrap_or(0)
    }
}

impl Postings for IntersectPostings {
    fn next(&mut self) -> bool {
        if self.exhausted {
            return false;
        }
        if !self.primed {
            // Prime every child; advancing only one of them here would let
            // the others skip past shared postings.
            for child in &mut self.children {
                if !child.next() {
                    self.exhausted = true;
                    return false;
                }
            }
            self.primed = true;
        } else if !self.children[0].next() {
            self.exhausted = true;
            return false;
        }
        let pivot = self.pivot();
        self.align(pivot)
    }

    fn seek(&mut self, id: SeriesId) -> bool {
        if self.exhausted {
            return false;
        }
        if self.primed && self.cur >= id {
            return true;
        }
        for child in &mut self.children {
            if !child.seek(id) {
                self.exhausted = true;
                return false;
            }
        }
        self.primed = true;
        let pivot = self.pivot();
        self.align(pivot)
    }

    fn at(&self) -> SeriesId {
        self.cur
    }

    fn error(&self) -> Option<Error> {
        self.children.iter().find_map(|c| c.error())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::postings::{expand_postings, merge, ListPostings};

    fn list(ids: &[SeriesId]) -> Box<dyn Postings> {
        Box::new(ListPostings::from_vec(ids.to_vec()))
    }

    fn expand(mut p: Box<dyn Postings>) -> Vec<SeriesId> {
        expand_postings(p.as_mut()).unwrap()
    }

    #[test]
    fn test_intersect_table() {
        let cases: Vec<(Vec<Vec<SeriesId>>, Vec<SeriesId>)> = vec![
            (vec![vec![1, 2, 3, 4, 5], vec![6, 7, 8, 9, 10]], vec![]),
            (vec![vec![1, 2, 3, 4, 5], vec![4, 5, 6, 7, 8]], vec![4, 5]),
            (
                vec![vec![1, 2, 3, 4, 9, 10], vec![1, 4, 5, 6, 7, 8, 10, 11]],
                vec![1, 4, 10],
            ),
            (vec![vec![1], vec![0, 1]], vec![1]),
            (vec![vec![1]], vec![1]),
            (vec![vec![1], vec![]], vec![]),
            (vec![vec![], vec![]], vec![]),
        ];

        for (inputs, want) in cases {
            let its = inputs.iter().map(|ids| list(ids)).collect();
            assert_eq!(expand(intersect(its)), want);
        }
    }

    #[test]
    fn test_intersect_empty_input_is_sentinel() {
        assert!(intersect(vec![]).is_empty_sentinel());
    }

    #[test]
    fn test_intersect_sentinel_short_circuits() {
        // The sentinel collapses the intersection regardless of position.
        for position in 0..3 {
            let mut its: Vec<Box<dyn Postings>> =
                vec![list(&[1, 2, 3]), list(&[2, 3, 4]), list(&[3, 4, 5])];
            its.insert(position, empty_postings());
            assert!(intersect(its).is_empty_sentinel());
        }
    }

    #[test]
    fn test_intersect_single_input_passthrough() {
        let p = intersect(vec![list(&[7, 8, 9])]);
        assert!(!p.is_empty_sentinel());
        assert_eq!(expand(p), vec![7, 8, 9]);
    }

    #[test]
    fn test_multi_intersect() {
        let res = intersect(vec![
            list(&[1, 2, 3, 4, 5, 6, 1000, 1001]),
            list(&[2, 4, 5, 6, 7, 8, 999, 1001]),
            list(&[1, 2, 5, 6, 7, 8, 1001, 1200]),
        ]);
        assert_eq!(expand(res), vec![2, 5, 6, 1001]);
    }

    #[test]
    fn test_intersect_priming_regression() {
        // Initialising by advancing the first cursor past the others used to
        // drop postings that every input shared.
        let res = intersect(vec![list(&[1, 2]), list(&[1, 2]), list(&[1, 2]), list(&[2])]);
        assert_eq!(expand(res), vec![2]);
    }

    #[test]
    fn test_intersect_with_merge() {
        let a = list(&[21, 22, 23, 24, 25, 30]);
        let b = merge(vec![list(&[10, 20, 30]), list(&[15, 26, 30])]);
        assert_eq!(expand(intersect(vec![a, b])), vec![30]);
    }

    #[test]
    fn test_intersect_seek() {
        let mut p = intersect(vec![list(&[1, 4, 7, 10, 13]), list(&[4, 7, 8, 13])]);
        assert!(p.seek(5));
        assert_eq!(p.at(), 7);
        assert!(p.next());
        assert_eq!(p.at(), 13);
        assert!(!p.next());
        assert!(!p.seek(1));
    }
}
