//! Temporary `.gitignore` entry for the environment directory
//!
//! [`begin_hygiene`] appends `<name>/` to the project's ignore file and hands
//! back an [`IgnoreEntry`] describing exactly what it changed.
//! [`end_hygiene`] reverses that change and nothing else, so a begin/end pair
//! leaves the file byte-identical (or absent, if it was absent before).

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::environment::EnvironmentSpec;
use crate::error::VenvError;
use crate::Result;

/// Name of the ignore file at the project root.
pub const IGNORE_FILE: &str = ".gitignore";

/// Record of what [`begin_hygiene`] did to the ignore file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IgnoreEntry {
    /// Ignore file path.
    pub path: PathBuf,

    /// The line, without its newline (`format_venv/`).
    pub line: String,

    /// The file did not exist before.
    pub created_file: bool,

    /// A newline was inserted first because the file did not end with one.
    pub separator_added: bool,

    /// False when the line was already present and nothing was written.
    pub added: bool,
}

impl IgnoreEntry {
    /// Exact bytes appended by `begin_hygiene`.
    fn appended_text(&self) -> String {
        let separator = if self.separator_added { "\n" } else { "" };
        format!("{separator}{}\n", self.line)
    }
}

/// Append `<env name>/` to the project's ignore file, creating it if needed.
pub fn begin_hygiene(env: &EnvironmentSpec) -> Result<IgnoreEntry> {
    let path = env.project_root.join(IGNORE_FILE);
    let line = format!("{}/", env.name);

    let existing = read_optional(&path)?;
    let created_file = existing.is_none();
    let content = existing.unwrap_or_default();

    if content.lines().any(|l| l.trim() == line) {
        debug!(path = ?path, line = %line, "Ignore entry already present");
        return Ok(IgnoreEntry {
            path,
            line,
            created_file: false,
            separator_added: false,
            added: false,
        });
    }

    let entry = IgnoreEntry {
        separator_added: !content.is_empty() && !content.ends_with('\n'),
        path,
        line,
        created_file,
        added: true,
    };

    let mut updated = content;
    updated.push_str(&entry.appended_text());
    write(&entry.path, &updated)?;

    info!(path = ?entry.path, line = %entry.line, "Added environment to ignore file");
    Ok(entry)
}

/// Undo the change recorded in `entry`.
///
/// Removes the appended line (and the separator newline, if one was
/// inserted). If the tail of the file was edited in the meantime, falls back
/// to removing the last line equal to the entry. A file created by
/// `begin_hygiene` that ends up empty is deleted.
pub fn end_hygiene(entry: &IgnoreEntry) -> Result<()> {
    if !entry.added {
        return Ok(());
    }

    let Some(content) = read_optional(&entry.path)? else {
        return Ok(());
    };

    let appended = entry.appended_text();
    let restored = if let Some(prefix) = content.strip_suffix(&appended) {
        prefix.to_string()
    } else {
        match remove_last_line(&content, &entry.line) {
            Some(updated) => updated,
            None => {
                debug!(path = ?entry.path, "Ignore entry already removed");
                return Ok(());
            }
        }
    };

    if entry.created_file && restored.is_empty() {
        std::fs::remove_file(&entry.path).map_err(|source| VenvError::Hygiene {
            path: entry.path.clone(),
            source,
        })?;
    } else {
        write(&entry.path, &restored)?;
    }

    info!(path = ?entry.path, line = %entry.line, "Removed environment from ignore file");
    Ok(())
}

/// Drop the last line whose trimmed text equals `line`, keeping every other
/// byte (including line endings) as-is.
fn remove_last_line(content: &str, line: &str) -> Option<String> {
    let lines: Vec<&str> = content.split_inclusive('\n').collect();
    let index = lines.iter().rposition(|l| l.trim() == line)?;

    Some(
        lines
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != index)
            .map(|(_, l)| *l)
            .collect(),
    )
}

fn read_optional(path: &Path) -> Result<Option<String>> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(VenvError::Hygiene {
            path: path.to_path_buf(),
            source,
        }),
    }
}

fn write(path: &Path, content: &str) -> Result<()> {
    std::fs::write(path, content).map_err(|source| VenvError::Hygiene {
        path: path.to_path_buf(),
        source,
    })
}
