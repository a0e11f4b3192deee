// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Versioned view of a set of watched files.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use similar::TextDiff;

use crate::error::{Result, SgptError};

/// Longest diff quoted in the system prompt
const MAX_PROMPT_DIFF_CHARS: usize = 4_000;

/// Lines of context around each diff hunk
const DIFF_CONTEXT_LINES: usize = 3;

/// Resolve a path to an absolute form that matches what the OS watcher reports.
pub fn resolve_path(path: &Path) -> PathBuf {
    if let Ok(resolved) = path.canonicalize() {
        return resolved;
    }
    let parent = path.parent().filter(|p| !p.as_os_str().is_empty());
    match (parent.map(Path::canonicalize), path.file_name()) {
        (Some(Ok(parent)), Some(name)) => parent.join(name),
        (None, Some(name)) => std::env::current_dir()
            .map(|cwd| cwd.join(name))
            .unwrap_or_else(|_| path.to_path_buf()),
        _ => path.to_path_buf(),
    }
}

/// Read a file as text; a missing file reads as empty.
fn read_text(path: &Path) -> Result<String> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(String::from_utf8_lossy(&bytes).into_owned()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
        Err(e) => Err(SgptError::Io(e)),
    }
}

/// One watched file and every version seen since watching started
#[derive(Debug, Clone)]
pub struct ChangingFile {
    path: PathBuf,
    /// versions[0] is the content when watching started
    versions: Vec<String>,
    /// diffs[i] turns versions[i] into versions[i + 1]
    diffs: Vec<String>,
}

impl ChangingFile {
    /// Start tracking `path` from its current content.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let original = read_text(&path)?;
        Ok(Self::with_content(path, original))
    }

    pub fn with_content(path: impl Into<PathBuf>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            versions: vec![content.into()],
            diffs: Vec::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Record a new version. Returns the diff, or `None` if nothing changed.
    pub fn record_change(&mut self, new_content: impl Into<String>) -> Option<&str> {
        let new_content = new_content.into();
        if new_content == self.current() {
            return None;
        }

        let label = self.path.display().to_string();
        let diff = TextDiff::from_lines(self.current(), new_content.as_str())
            .unified_diff()
            .context_radius(DIFF_CONTEXT_LINES)
            .header(&label, &label)
            .to_string();

        self.versions.push(new_content);
        self.diffs.push(diff);
        self.diffs.last().map(String::as_str)
    }

    /// Number of changes recorded
    pub fn change_count(&self) -> usize {
        self.diffs.len()
    }

    /// Content at `version` (0 = original, `change_count()` = current)
    pub fn version(&self, version: usize) -> Option<&str> {
        self.versions.get(version).map(String::as_str)
    }

    pub fn original(&self) -> &str {
        &self.versions[0]
    }

    pub fn current(&self) -> &str {
        self.versions.last().map(String::as_str).unwrap_or_default()
    }

    pub fn diffs(&self) -> &[String] {
        &self.diffs
    }

    pub fn latest_diff(&self) -> Option<&str> {
        self.diffs.last().map(String::as_str)
    }
}

/// All watched files, keyed by resolved path
#[derive(Debug, Clone, Default)]
pub struct FilesView {
    files: BTreeMap<PathBuf, ChangingFile>,
}

impl FilesView {
    /// Start tracking every path from its current content.
    pub fn open<I, P>(paths: I) -> Result<Self>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let mut files = BTreeMap::new();
        for path in paths {
            let resolved = resolve_path(path.as_ref());
            if resolved.is_dir() {
                return Err(SgptError::Watch(format!(
                    "{} is a directory; watch individual files",
                    resolved.display()
                )));
            }
            let file = ChangingFile::open(resolved.clone())?;
            files.insert(resolved, file);
        }
        Ok(Self { files })
    }

    pub fn insert(&mut self, file: ChangingFile) {
        self.files.insert(file.path().to_path_buf(), file);
    }

    pub fn is_tracked(&self, path: &Path) -> bool {
        self.files.contains_key(path)
    }

    pub fn get(&self, path: &Path) -> Option<&ChangingFile> {
        self.files.get(path)
    }

    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.files.keys().map(PathBuf::as_path)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Record new content for a tracked file; `Ok(false)` if unchanged.
    pub fn record_change(&mut self, path: &Path, new_content: impl Into<String>) -> Result<bool> {
        let file = self.files.get_mut(path).ok_or_else(|| {
            SgptError::Watch(format!("File {} is not being tracked.", path.display()))
        })?;
        let changed = file.record_change(new_content).is_some();
        if changed {
            tracing::debug!(
                target: "sgpt.watch",
                path = %path.display(),
                changes = file.change_count(),
                "recorded file change"
            );
        }
        Ok(changed)
    }

    /// Re-read a tracked file from disk and record it if it changed.
    pub fn refresh(&mut self, path: &Path) -> Result<bool> {
        let content = read_text(path)?;
        self.record_change(path, content)
    }

    /// One line per file with its change count
    pub fn history_summary(&self) -> String {
        let mut summary = String::from("Watched Files and Their Change History:\n");
        for (path, file) in &self.files {
            summary.push_str(&format!(
                "- {}: {} changes recorded\n",
                path.display(),
                file.change_count()
            ));
        }
        summary
    }

    /// System prompt for the watch REPL
    pub fn system_prompt(&self) -> String {
        let mut recent = String::new();
        for file in self.files.values() {
            if let Some(diff) = file.latest_diff() {
                recent.push_str(&format!("Latest change to {}:\n", file.path().display()));
                recent.push_str(truncate_chars(diff, MAX_PROMPT_DIFF_CHARS));
                if !diff.ends_with('\n') {
                    recent.push('\n');
                }
                recent.push('\n');
            }
        }

        format!(
            "You are FileGPT, a helpful assistant monitoring file changes.\n\n{}\n{}Answer questions or provide insights based on these tracked files.",
            self.history_summary(),
            recent
        )
    }
}

fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
