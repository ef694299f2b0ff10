//! Textual per-file diffs between existing and generated snapshots.

use std::collections::BTreeMap;

use similar::{ChangeTag, TextDiff};

use crate::core::types::{DiffKind, FileDiff};

const DEV_NULL: &str = "/dev/null";

/// Diff every generated file against its existing content (empty if new).
///
/// Existing files absent from `generated` are left alone, so a partial
/// proposal never deletes the rest of the project.
/// Files whose content is identical are skipped. Output is sorted by filename.
/// A generated file with empty content is a deletion of the existing file.
pub fn file_diffs(
    generated: &BTreeMap<String, String>,
    existing: &BTreeMap<String, String>,
) -> Vec<FileDiff> {
    generated
        .iter()
        .filter_map(|(filename, new)| {
            let old = existing.get(filename).map(String::as_str).unwrap_or("");
            diff_one(filename, old, new)
        })
        .collect()
}

/// Diff a single file. Returns `None` when the contents are identical.
pub fn diff_one(filename: &str, old: &str, new: &str) -> Option<FileDiff> {
    if old == new {
        return None;
    }
    let kind = match (old.is_empty(), new.is_empty()) {
        (true, _) => DiffKind::Created,
        (false, true) => DiffKind::Deleted,
        (false, false) => DiffKind::Modified,
    };
    let from = match kind {
        DiffKind::Created => DEV_NULL.to_string(),
        _ => format!("a/{filename}"),
    };
    let to = match kind {
        DiffKind::Deleted => DEV_NULL.to_string(),
        _ => format!("b/{filename}"),
    };

    let diff = TextDiff::from_lines(old, new);
    let changed_lines = diff
        .iter_all_changes()
        .filter(|change| change.tag() != ChangeTag::Equal)
        .count();
    let unified = diff.unified_diff().header(&from, &to).to_string();

    Some(FileDiff {
        filename: filename.to_string(),
        kind,
        unified,
        changed_lines,
    })
}
