//! Active project tracking, path resolution, and source snapshots.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, info, instrument};
use walkdir::WalkDir;

use crate::error::MissionError;

/// Directory names never included in snapshots or file listings.
pub const SKIPPED_DIRS: [&str; 8] = [
    ".git",
    ".mission",
    "target",
    "venv",
    ".venv",
    "__pycache__",
    "node_modules",
    ".pytest_cache",
];

/// Owner of the active project root.
#[derive(Debug, Default)]
pub struct ProjectManager {
    root: RwLock<Option<PathBuf>>,
}

impl ProjectManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Manager with `root` already active.
    pub fn with_root(root: impl AsRef<Path>) -> Result<Self> {
        let manager = Self::new();
        manager.activate(root)?;
        Ok(manager)
    }

    /// Make `root` the active project, creating it if needed.
    #[instrument(skip_all, fields(root = %root.as_ref().display()))]
    pub fn activate(&self, root: impl AsRef<Path>) -> Result<PathBuf> {
        let root = root.as_ref();
        fs::create_dir_all(root)
            .with_context(|| format!("create project directory {}", root.display()))?;
        let canonical = root
            .canonicalize()
            .with_context(|| format!("canonicalize {}", root.display()))?;
        info!(root = %canonical.display(), "project activated");
        *self.root.write().unwrap_or_else(PoisonError::into_inner) = Some(canonical.clone());
        Ok(canonical)
    }

    pub fn deactivate(&self) {
        *self.root.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    pub fn active_root(&self) -> Option<PathBuf> {
        self.root
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn require_root(&self) -> Result<PathBuf, MissionError> {
        self.active_root().ok_or(MissionError::NoActiveProject)
    }

    /// Every UTF-8 text file under the root keyed by `/`-separated relative path.
    #[instrument(skip_all)]
    pub fn snapshot_files(&self) -> Result<BTreeMap<String, String>> {
        let root = self.require_root()?;
        snapshot_dir(&root)
    }
}

/// Lexically join `relative` onto `root` without leaving it.
pub fn resolve_within(root: &Path, relative: &str) -> Result<PathBuf> {
    let candidate = Path::new(relative.trim());
    let tail = if candidate.is_absolute() {
        candidate
            .strip_prefix(root)
            .map_err(|_| anyhow!("path '{relative}' is outside the project"))?
    } else {
        candidate
    };

    let mut resolved = root.to_path_buf();
    let mut depth = 0usize;
    for component in tail.components() {
        match component {
            Component::Normal(part) => {
                resolved.push(part);
                depth += 1;
            }
            Component::CurDir => {}
            Component::ParentDir => {
                if depth == 0 {
                    return Err(anyhow!("path '{relative}' escapes the project"));
                }
                resolved.pop();
                depth -= 1;
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(anyhow!("path '{relative}' is not project-relative"));
            }
        }
    }
    Ok(resolved)
}

/// `/`-separated path of `path` relative to `root`.
pub fn relative_display(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}

fn is_skipped(name: &str) -> bool {
    SKIPPED_DIRS.contains(&name)
}

/// Read every text file under `root`, skipping tool directories and binaries.
pub fn snapshot_dir(root: &Path) -> Result<BTreeMap<String, String>> {
    let mut files = BTreeMap::new();
    let walker = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|entry| {
            entry.depth() == 0 || !is_skipped(&entry.file_name().to_string_lossy())
        });
    for entry in walker {
        let entry = entry.with_context(|| format!("walk {}", root.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let bytes = fs::read(entry.path())
            .with_context(|| format!("read {}", entry.path().display()))?;
        let Ok(text) = String::from_utf8(bytes) else {
            debug!(path = %entry.path().display(), "skipping non-utf8 file");
            continue;
        };
        files.insert(relative_display(root, entry.path()), text);
    }
    debug!(count = files.len(), "snapshot taken");
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_relative_paths_inside_root() {
        let root = Path::new("/work/proj");
        assert_eq!(
            resolve_within(root, "src/app.py").expect("resolve"),
            PathBuf::from("/work/proj/src/app.py")
        );
        assert_eq!(
            resolve_within(root, "./a/../b.py").expect("resolve"),
            PathBuf::from("/work/proj/b.py")
        );
        assert_eq!(
            resolve_within(root, "/work/proj/c.py").expect("resolve"),
            PathBuf::from("/work/proj/c.py")
        );
    }

    #[test]
    fn rejects_escaping_paths() {
        let root = Path::new("/work/proj");
        assert!(resolve_within(root, "../secret").is_err());
        assert!(resolve_within(root, "/etc/passwd").is_err());
    }

    #[test]
    fn deactivated_manager_has_no_root() {
        let temp = tempfile::tempdir().expect("tempdir");
        let manager = ProjectManager::with_root(temp.path()).expect("activate");
        manager.deactivate();
        assert!(matches!(manager.require_root(), Err(MissionError::NoActiveProject)));
        let err = manager.snapshot_files().expect_err("no project");
        assert!(matches!(
            err.downcast_ref::<MissionError>(),
            Some(MissionError::NoActiveProject)
        ));
    }

    #[test]
    fn snapshot_skips_tool_directories() {
        let temp = tempfile::tempdir().expect("tempdir");
        let manager = ProjectManager::with_root(temp.path()).expect("activate");
        let root = manager.active_root().expect("root");
        fs::create_dir_all(root.join("pkg")).expect("mkdir");
        fs::create_dir_all(root.join(".mission")).expect("mkdir");
        fs::create_dir_all(root.join("__pycache__")).expect("mkdir");
        fs::write(root.join("pkg/app.py"), "x = 1\n").expect("write");
        fs::write(root.join(".mission/mission_log.json"), "[]\n").expect("write");
        fs::write(root.join("__pycache__/app.pyc"), [0u8, 159, 146]).expect("write");

        let snapshot = manager.snapshot_files().expect("snapshot");
        assert_eq!(snapshot.keys().collect::<Vec<_>>(), vec!["pkg/app.py"]);
    }
}
