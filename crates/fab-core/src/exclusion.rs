//! Exclusion arguments for each tool.
//!
//! Every tool must skip the throwaway environment (and the usual alternates),
//! but each CLI spells that differently. The spelling lives in the tool's
//! [`ExclusionSyntax`] row; [`compile_exclusions`] only interprets it.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::tool::{ToolManifest, ToolSpec};

/// Environment directory names excluded on every run, besides the active one.
pub const CONVENTIONAL_VENVS: &[&str] = &[".venv", "venv"];

/// How a tool takes a list of excluded directories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExclusionSyntax {
    /// One flag per directory: `--skip a --skip b`.
    Repeated {
        flag: &'static str,
        suffix: &'static str,
    },

    /// One flag, directories joined into the next token: `--exclude a,b`.
    Joined {
        flag: &'static str,
        separator: &'static str,
        suffix: &'static str,
    },

    /// One `flag=value` token: `--ignore=a/,b/`.
    Inline {
        flag: &'static str,
        separator: &'static str,
        suffix: &'static str,
    },

    /// One flag followed by a path regex matching any of the directories:
    /// `--extend-exclude (^|/)(\.venv|venv)/`.
    Pattern { flag: &'static str },
}

/// Ordered, de-duplicated set of directory names hidden from every tool.
///
/// The active environment name is always present and always last.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExclusionSet {
    dirs: Vec<String>,
    active: String,
}

impl ExclusionSet {
    /// Conventional names plus the active environment.
    pub fn for_environment(active: &str) -> Self {
        Self::with_extra(active, CONVENTIONAL_VENVS.iter().copied())
    }

    /// `extra` names plus the active environment.
    pub fn with_extra<'a>(active: &str, extra: impl IntoIterator<Item = &'a str>) -> Self {
        let active = active.trim_end_matches('/').to_string();
        let mut dirs: Vec<String> = Vec::new();
        for dir in extra {
            let dir = dir.trim_end_matches('/');
            if dir.is_empty() || dir == active || dirs.iter().any(|d| d == dir) {
                continue;
            }
            dirs.push(dir.to_string());
        }
        dirs.push(active.clone());
        Self { dirs, active }
    }

    pub fn dirs(&self) -> &[String] {
        &self.dirs
    }

    pub fn active(&self) -> &str {
        &self.active
    }

    pub fn contains(&self, dir: &str) -> bool {
        self.dirs.iter().any(|d| d == dir)
    }
}

/// Compiled exclusion arguments for one tool.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExclusionArgs(pub Vec<String>);

impl ExclusionArgs {
    pub fn as_slice(&self) -> &[String] {
        &self.0
    }
}

impl fmt::Display for ExclusionArgs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join(" "))
    }
}

/// Build the exclusion arguments for `tool`.
pub fn compile_exclusions(set: &ExclusionSet, tool: &ToolSpec) -> ExclusionArgs {
    let args = match tool.exclusion {
        ExclusionSyntax::Repeated { flag, suffix } => set
            .dirs()
            .iter()
            .flat_map(|dir| [flag.to_string(), format!("{dir}{suffix}")])
            .collect(),
        ExclusionSyntax::Joined {
            flag,
            separator,
            suffix,
        } => vec![flag.to_string(), join(set, separator, suffix)],
        ExclusionSyntax::Inline {
            flag,
            separator,
            suffix,
        } => vec![format!("{flag}={}", join(set, separator, suffix))],
        ExclusionSyntax::Pattern { flag } => vec![flag.to_string(), dir_pattern(set)],
    };
    ExclusionArgs(args)
}

/// Exclusion arguments for every tool in the manifest, keyed by tool name.
pub fn compile_all(set: &ExclusionSet, manifest: &ToolManifest) -> BTreeMap<String, ExclusionArgs> {
    manifest
        .tools()
        .iter()
        .map(|tool| (tool.name.to_string(), compile_exclusions(set, tool)))
        .collect()
}

fn join(set: &ExclusionSet, separator: &str, suffix: &str) -> String {
    set.dirs()
        .iter()
        .map(|dir| format!("{dir}{suffix}"))
        .collect::<Vec<_>>()
        .join(separator)
}

/// `(^|/)(a|b)/` with regex metacharacters in the names escaped.
fn dir_pattern(set: &ExclusionSet) -> String {
    let alternation = set
        .dirs()
        .iter()
        .map(|dir| escape_regex(dir))
        .collect::<Vec<_>>()
        .join("|");
    format!("(^|/)({alternation})/")
}

fn escape_regex(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if "\\.+*?()|[]{}^$#-".contains(c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compiled(tool: &str) -> String {
        let manifest = ToolManifest::standard();
        let set = ExclusionSet::for_environment("format_venv");
        compile_exclusions(&set, manifest.get(tool).unwrap()).to_string()
    }

    #[test]
    fn test_set_order_and_active_last() {
        let set = ExclusionSet::for_environment("format_venv");
        assert_eq!(set.dirs(), &[".venv", "venv", "format_venv"]);
        assert_eq!(set.active(), "format_venv");
    }

    #[test]
    fn test_set_deduplicates_active() {
        let set = ExclusionSet::for_environment("venv");
        assert_eq!(set.dirs(), &[".venv", "venv"]);
        assert_eq!(set.dirs().last().unwrap(), "venv");

        let set = ExclusionSet::with_extra("env/", ["build", "build", ""]);
        assert_eq!(set.dirs(), &["build", "env"]);
    }

    #[test]
    fn test_set_never_empty() {
        let set = ExclusionSet::with_extra("format_venv", std::iter::empty());
        assert_eq!(set.dirs(), &["format_venv"]);
    }

    #[test]
    fn test_isort_repeated_skip() {
        assert_eq!(
            compiled("isort"),
            "--skip .venv --skip venv --skip format_venv"
        );
    }

    #[test]
    fn test_black_single_extend_exclude_pattern() {
        let manifest = ToolManifest::standard();
        let set = ExclusionSet::for_environment("format_venv");
        let args = compile_exclusions(&set, manifest.get("black").unwrap());
        assert_eq!(
            args.as_slice(),
            &["--extend-exclude", r"(^|/)(\.venv|venv|format_venv)/"]
        );
    }

    #[test]
    fn test_pattern_escapes_names() {
        let set = ExclusionSet::with_extra("env+1", ["a.b"]);
        assert_eq!(dir_pattern(&set), r"(^|/)(a\.b|env\+1)/");
        assert!(set.contains("a.b"));
        assert!(set.contains("env+1"));
        assert!(!set.contains("a"));
    }

    #[test]
    fn test_flake8_comma_joined() {
        assert_eq!(compiled("flake8"), "--exclude .venv,venv,format_venv");
    }

    #[test]
    fn test_mypy_trailing_slash() {
        assert_eq!(
            compiled("mypy"),
            "--exclude .venv/ --exclude venv/ --exclude format_venv/"
        );
    }

    #[test]
    fn test_pylint_single_inline_flag() {
        let manifest = ToolManifest::standard();
        let set = ExclusionSet::for_environment("format_venv");
        let args = compile_exclusions(&set, manifest.get("pylint").unwrap());
        assert_eq!(args.as_slice(), &["--ignore=.venv/,venv/,format_venv/"]);
    }

    #[test]
    fn test_joined_is_two_argv_tokens() {
        let manifest = ToolManifest::standard();
        let set = ExclusionSet::for_environment("format_venv");
        let args = compile_exclusions(&set, manifest.get("flake8").unwrap());
        assert_eq!(args.as_slice(), &["--exclude", ".venv,venv,format_venv"]);
    }

    #[test]
    fn test_active_env_excluded_for_every_tool() {
        let manifest = ToolManifest::standard();
        let set = ExclusionSet::for_environment("my_env");
        for (tool, args) in compile_all(&set, &manifest) {
            assert!(
                args.as_slice().iter().any(|a| a.contains("my_env")),
                "{tool} does not exclude the active environment: {args}"
            );
        }
    }

    #[test]
    fn test_new_row_needs_no_new_code() {
        let tool = ToolSpec {
            name: "ruff",
            display_name: "Ruff",
            role: crate::tool::ToolRole::StyleLinter,
            package: "ruff",
            args: &["check", "."],
            version_args: &["--version"],
            exclusion: ExclusionSyntax::Joined {
                flag: "--extend-exclude",
                separator: ",",
                suffix: "",
            },
        };
        let set = ExclusionSet::for_environment("format_venv");
        assert_eq!(
            compile_exclusions(&set, &tool).to_string(),
            "--extend-exclude .venv,venv,format_venv"
        );
    }
}
