//! Git adapter used to describe what a failed mission changed.
//!
//! Projects are not required to be repositories; every query degrades to an
//! empty answer outside a work tree.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, instrument};

/// Parsed `git status --porcelain` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEntry {
    /// 2-letter XY code, or "??" for untracked.
    pub code: String,
    pub path: String,
}

impl StatusEntry {
    pub fn is_untracked(&self) -> bool {
        self.code == "??"
    }
}

/// Wrapper for executing git commands in a project directory.
#[derive(Debug, Clone)]
pub struct Git {
    workdir: PathBuf,
}

impl Git {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    /// True when `workdir` is inside a git work tree (false if git is unavailable).
    pub fn is_repository(&self) -> bool {
        self.run(&["rev-parse", "--is-inside-work-tree"])
            .map(|out| out.status.success() && String::from_utf8_lossy(&out.stdout).trim() == "true")
            .unwrap_or(false)
    }

    /// Get status entries (including untracked) in porcelain format.
    pub fn status_porcelain(&self) -> Result<Vec<StatusEntry>> {
        let out = self.run_capture(&["status", "--porcelain=v1", "-uall"])?;
        out.lines()
            .filter(|line| !line.trim().is_empty())
            .map(parse_status_line)
            .collect()
    }

    /// Unstaged and staged changes as one unified diff, followed by a list of
    /// untracked files. Empty outside a repository.
    #[instrument(skip_all, fields(workdir = %self.workdir.display()))]
    pub fn diff_report(&self) -> Result<String> {
        if !self.is_repository() {
            debug!("not a git repository, repo diff is empty");
            return Ok(String::new());
        }
        let mut report = self.run_capture(&["diff", "--no-color"])?;
        report.push_str(&self.run_capture(&["diff", "--no-color", "--cached"])?);

        let untracked: Vec<_> = self
            .status_porcelain()?
            .into_iter()
            .filter(StatusEntry::is_untracked)
            .filter(|entry| !entry.path.starts_with(".mission/"))
            .collect();
        if !untracked.is_empty() {
            if !report.is_empty() && !report.ends_with('\n') {
                report.push('\n');
            }
            report.push_str("Untracked files:\n");
            for entry in untracked {
                report.push_str(&format!("  {}\n", entry.path));
            }
        }
        debug!(bytes = report.len(), "collected repo diff");
        Ok(report)
    }

    fn run_capture(&self, args: &[&str]) -> Result<String> {
        let output = self.run_checked(args)?;
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    fn run_checked(&self, args: &[&str]) -> Result<Output> {
        let output = self.run(args)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!("git {} failed: {}", args.join(" "), stderr.trim()));
        }
        Ok(output)
    }

    fn run(&self, args: &[&str]) -> Result<Output> {
        Command::new("git")
            .args(args)
            .current_dir(&self.workdir)
            .output()
            .with_context(|| format!("spawn git {}", args.join(" ")))
    }
}

fn parse_status_line(line: &str) -> Result<StatusEntry> {
    if let Some(path) = line.strip_prefix("?? ") {
        return Ok(StatusEntry {
            code: "??".to_string(),
            path: path.trim().to_string(),
        });
    }
    let (Some(code), Some(rest)) = (line.get(..2), line.get(3..)) else {
        return Err(anyhow!("unexpected porcelain line: '{line}'"));
    };
    let path = match rest.split_once("->") {
        Some((_, new)) => new.trim(),
        None => rest.trim(),
    };
    if path.is_empty() {
        return Err(anyhow!("unexpected porcelain line: '{line}'"));
    }
    Ok(StatusEntry {
        code: code.to_string(),
        path: path.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_untracked_line() {
        let entry = parse_status_line("?? hello.py").expect("parse");
        assert!(entry.is_untracked());
        assert_eq!(entry.path, "hello.py");
    }

    #[test]
    fn parses_modified_and_renamed_lines() {
        let modified = parse_status_line(" M app/main.py").expect("parse");
        assert_eq!(modified.code, " M");
        assert_eq!(modified.path, "app/main.py");

        let renamed = parse_status_line("R  old.py -> new.py").expect("parse");
        assert_eq!(renamed.path, "new.py");
    }

    #[test]
    fn rejects_short_line() {
        assert!(parse_status_line("M").is_err());
    }

    #[test]
    fn non_repository_yields_empty_diff() {
        let temp = tempfile::tempdir().expect("tempdir");
        let git = Git::new(temp.path());
        assert!(!git.is_repository());
        assert_eq!(git.diff_report().expect("diff"), "");
    }
}
