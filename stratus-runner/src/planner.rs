// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Dispatch planning: the ordered subset of the catalogue whose
//! declared capability markers the lab satisfies.

use std::collections::BTreeSet;
use stratus_types::TestCase;

/// Keep the tests whose declared markers are all present in the lab's
/// tag set, preserving catalogue order.  Priority markers were already
/// split out at collection time; a test with no markers always
/// qualifies.
pub fn select_tests(
    tests: Vec<TestCase>,
    lab_tags: &BTreeSet<String>,
) -> Vec<TestCase> {
    tests
        .into_iter()
        .filter(|test| {
            test.markers.iter().all(|marker| lab_tags.contains(marker))
        })
        .collect()
}
