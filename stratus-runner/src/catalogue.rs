// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Test catalogue: a pure collection pass over the test source tree.
//!
//! Markers are arbitrary string annotations on a test function
//! (`@mark.<name>` / `@pytest.mark.<name>` decorator runs directly
//! above `def test_<name>`); the single priority marker (`p0`..`p3`) is
//! split out and everything else is preserved verbatim for the planner.
//! Collection never talks to the lab or the database, and never
//! executes anything.

use camino::{Utf8Path, Utf8PathBuf};
use regex::Regex;
use std::str::FromStr;
use std::sync::LazyLock;
use stratus_types::{Priority, TestCase};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CatalogueError {
    #[error("error reading \"{path}\": {err}")]
    Io {
        path: Utf8PathBuf,
        #[source]
        err: std::io::Error,
    },

    #[error("tests location \"{path}\" is not a directory")]
    NotADirectory { path: Utf8PathBuf },
}

static MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*@(?:pytest\.)?mark\.([A-Za-z_][A-Za-z0-9_]*)\s*$")
        .expect("static regex compiles")
});
static TEST_DEF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*def\s+(test_[A-Za-z0-9_]+)\s*\(")
        .expect("static regex compiles")
});

/// Walk `tests_location` once, in sorted order, and yield a [`TestCase`]
/// per test function.  Node ids are relative to `repo_root`.
pub fn collect_tests(
    repo_root: &Utf8Path,
    tests_location: &Utf8Path,
) -> Result<Vec<TestCase>, CatalogueError> {
    if !tests_location.is_dir() {
        return Err(CatalogueError::NotADirectory {
            path: tests_location.to_owned(),
        });
    }
    let mut files = Vec::new();
    walk_sorted(tests_location, &mut files)?;

    let mut tests = Vec::new();
    for file in &files {
        collect_from_file(repo_root, file, &mut tests)?;
    }
    Ok(tests)
}

fn walk_sorted(
    dir: &Utf8Path,
    files: &mut Vec<Utf8PathBuf>,
) -> Result<(), CatalogueError> {
    let mut entries: Vec<Utf8PathBuf> = dir
        .read_dir_utf8()
        .map_err(|err| CatalogueError::Io { path: dir.to_owned(), err })?
        .map(|entry| {
            entry
                .map(|e| e.path().to_owned())
                .map_err(|err| CatalogueError::Io { path: dir.to_owned(), err })
        })
        .collect::<Result<_, _>>()?;
    entries.sort();

    for entry in entries {
        if entry.is_dir() {
            walk_sorted(&entry, files)?;
        } else if entry.extension() == Some("py") {
            files.push(entry);
        }
    }
    Ok(())
}

fn collect_from_file(
    repo_root: &Utf8Path,
    file: &Utf8Path,
    tests: &mut Vec<TestCase>,
) -> Result<(), CatalogueError> {
    let contents = std::fs::read_to_string(file)
        .map_err(|err| CatalogueError::Io { path: file.to_owned(), err })?;

    let relative = file.strip_prefix(repo_root).unwrap_or(file);
    let suite = file.file_stem().unwrap_or_default().to_string();

    let mut pending: Vec<String> = Vec::new();
    for line in contents.lines() {
        if let Some(captures) = MARKER.captures(line) {
            pending.push(captures[1].to_string());
        } else if let Some(captures) = TEST_DEF.captures(line) {
            let name = &captures[1];
            let mut test = TestCase::new(
                &suite,
                name,
                &format!("{}::{}", relative, name),
            );
            for marker in pending.drain(..) {
                if Priority::is_priority_marker(&marker) {
                    // The first priority marker wins; duplicates are a
                    // test-authoring mistake we do not amplify.
                    if test.priority.is_none() {
                        test.priority = Priority::from_str(&marker).ok();
                    }
                } else {
                    test.markers.push(marker);
                }
            }
            tests.push(test);
        } else if !line.trim().is_empty() && !line.trim().starts_with('#') {
            // Any other code line breaks the decorator run.
            pending.clear();
        }
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use camino_tempfile::Utf8TempDir;
    use pretty_assertions::assert_eq;

    fn write(root: &Utf8Path, rel: &str, contents: &str) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, contents).unwrap();
    }

    #[test]
    fn test_collects_markers_and_priority() {
        let dir = Utf8TempDir::new().unwrap();
        write(
            dir.path(),
            "testcases/sanity/test_ping.py",
            "import pytest\n\
             \n\
             @mark.p1\n\
             @mark.lab_has_worker\n\
             @pytest.mark.lab_has_sriov\n\
             def test_ping_across_workers():\n\
             \x20   pass\n\
             \n\
             def test_unmarked():\n\
             \x20   pass\n",
        );
        let tests = collect_tests(
            dir.path(),
            &dir.path().join("testcases"),
        )
        .unwrap();
        assert_eq!(tests.len(), 2);

        let marked = &tests[0];
        assert_eq!(marked.name, "test_ping_across_workers");
        assert_eq!(marked.suite, "test_ping");
        assert_eq!(
            marked.node_id,
            "testcases/sanity/test_ping.py::test_ping_across_workers"
        );
        assert_eq!(
            marked.markers,
            vec!["lab_has_worker", "lab_has_sriov"]
        );
        assert_eq!(marked.priority, Some(stratus_types::Priority::P1));

        let unmarked = &tests[1];
        assert!(unmarked.markers.is_empty());
        assert_eq!(unmarked.priority, None);
    }

    #[test]
    fn test_unknown_markers_are_preserved_verbatim() {
        let dir = Utf8TempDir::new().unwrap();
        write(
            dir.path(),
            "testcases/test_custom.py",
            "@mark.some_future_capability\n\
             def test_custom():\n\
             \x20   pass\n",
        );
        let tests =
            collect_tests(dir.path(), &dir.path().join("testcases")).unwrap();
        assert_eq!(tests[0].markers, vec!["some_future_capability"]);
    }

    #[test]
    fn test_code_between_decorators_and_def_breaks_the_run() {
        let dir = Utf8TempDir::new().unwrap();
        write(
            dir.path(),
            "testcases/test_broken.py",
            "@mark.lab_has_worker\n\
             SOME_CONSTANT = 1\n\
             def test_not_annotated():\n\
             \x20   pass\n",
        );
        let tests =
            collect_tests(dir.path(), &dir.path().join("testcases")).unwrap();
        assert_eq!(tests.len(), 1);
        assert!(tests[0].markers.is_empty());
    }

    #[test]
    fn test_walk_is_sorted_and_recursive() {
        let dir = Utf8TempDir::new().unwrap();
        let body = "def test_one():\n    pass\n";
        write(dir.path(), "testcases/b_suite/test_b.py", body);
        write(dir.path(), "testcases/a_suite/test_a.py", body);
        write(dir.path(), "testcases/a_suite/not_a_test.txt", "ignored");
        let tests =
            collect_tests(dir.path(), &dir.path().join("testcases")).unwrap();
        let node_ids: Vec<&str> =
            tests.iter().map(|t| t.node_id.as_str()).collect();
        assert_eq!(
            node_ids,
            vec![
                "testcases/a_suite/test_a.py::test_one",
                "testcases/b_suite/test_b.py::test_one"
            ]
        );
    }

    #[test]
    fn test_missing_location_is_an_error() {
        let dir = Utf8TempDir::new().unwrap();
        assert!(matches!(
            collect_tests(dir.path(), &dir.path().join("nope")),
            Err(CatalogueError::NotADirectory { .. })
        ));
    }
}
