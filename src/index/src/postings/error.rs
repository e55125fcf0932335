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

use snafu::{Location, Snafu};

use crate::postings::SeriesId;

/// Errors produced by the postings core. `Clone` so iterators can surface a
/// deferred error through `Postings::error` more than once.
#[derive(Clone, Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(display(
        "Malformed big-endian posting list, byte length {length} is not a multiple of 4"
    ))]
    MalformedPostingList {
        length: usize,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("Out-of-order postings, current: {current}, next: {next}"))]
    OutOfOrderPostings {
        current: SeriesId,
        next: SeriesId,
        #[snafu(implicit)]
        location: Location,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
