//! Toolchain definitions.

use serde::{Deserialize, Serialize};
use venv_manager::ToolRequirement;

use crate::exclusion::ExclusionSyntax;

/// What a tool does in the chain.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ToolRole {
    /// Rewrites import order in place.
    ImportSorter,

    /// Rewrites formatting in place.
    Formatter,

    /// Reports style violations.
    StyleLinter,

    /// Reports type errors.
    TypeChecker,

    /// Reports code smells and bugs.
    StaticAnalyzer,
}

impl ToolRole {
    /// Get the role name as a string.
    pub fn name(&self) -> &'static str {
        match self {
            ToolRole::ImportSorter => "import_sorter",
            ToolRole::Formatter => "formatter",
            ToolRole::StyleLinter => "style_linter",
            ToolRole::TypeChecker => "type_checker",
            ToolRole::StaticAnalyzer => "static_analyzer",
        }
    }

    /// Whether the tool edits source files.
    pub fn mutates_sources(&self) -> bool {
        matches!(self, ToolRole::ImportSorter | ToolRole::Formatter)
    }
}

/// One row of the toolchain table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToolSpec {
    /// Executable name inside the environment.
    pub name: &'static str,

    /// Name used in report headers.
    pub display_name: &'static str,

    pub role: ToolRole,

    /// Package passed to `pip install`.
    pub package: &'static str,

    /// Fixed arguments, before the exclusion arguments.
    pub args: &'static [&'static str],

    /// Arguments for the availability probe.
    pub version_args: &'static [&'static str],

    /// How this tool spells "don't look in these directories".
    pub exclusion: ExclusionSyntax,
}

impl ToolSpec {
    pub fn requirement(&self) -> ToolRequirement {
        ToolRequirement {
            name: self.name,
            package: self.package,
            version_args: self.version_args,
        }
    }
}

/// The standard chain. Sources are rewritten (isort, black) before they are
/// analysed (flake8, mypy, pylint); keep that order.
pub const TOOLCHAIN: &[ToolSpec] = &[
    ToolSpec {
        name: "isort",
        display_name: "Isort",
        role: ToolRole::ImportSorter,
        package: "isort",
        args: &["."],
        version_args: &["--version"],
        exclusion: ExclusionSyntax::Repeated {
            flag: "--skip",
            suffix: "",
        },
    },
    ToolSpec {
        name: "black",
        display_name: "Black",
        role: ToolRole::Formatter,
        package: "black",
        args: &["."],
        version_args: &["--version"],
        // `--exclude` would replace black's default excludes and its
        // .gitignore handling, and only the last occurrence counts.
        exclusion: ExclusionSyntax::Pattern {
            flag: "--extend-exclude",
        },
    },
    ToolSpec {
        name: "flake8",
        display_name: "Flake8",
        role: ToolRole::StyleLinter,
        package: "flake8",
        args: &["."],
        version_args: &["--version"],
        exclusion: ExclusionSyntax::Joined {
            flag: "--exclude",
            separator: ",",
            suffix: "",
        },
    },
    ToolSpec {
        name: "mypy",
        display_name: "Mypy",
        role: ToolRole::TypeChecker,
        package: "mypy",
        args: &["."],
        version_args: &["--version"],
        exclusion: ExclusionSyntax::Repeated {
            flag: "--exclude",
            suffix: "/",
        },
    },
    ToolSpec {
        name: "pylint",
        display_name: "Pylint",
        role: ToolRole::StaticAnalyzer,
        package: "pylint",
        args: &["./src"],
        version_args: &["--version"],
        exclusion: ExclusionSyntax::Inline {
            flag: "--ignore",
            separator: ",",
            suffix: "/",
        },
    },
];

/// Ordered list of tools for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolManifest {
    tools: Vec<ToolSpec>,
}

impl ToolManifest {
    /// The five-tool chain from [`TOOLCHAIN`].
    pub fn standard() -> Self {
        Self {
            tools: TOOLCHAIN.to_vec(),
        }
    }

    /// A custom chain, run in the given order.
    pub fn from_tools(tools: Vec<ToolSpec>) -> Self {
        Self { tools }
    }

    pub fn tools(&self) -> &[ToolSpec] {
        &self.tools
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn requirements(&self) -> Vec<ToolRequirement> {
        self.tools.iter().map(ToolSpec::requirement).collect()
    }

    pub fn get(&self, name: &str) -> Option<&ToolSpec> {
        self.tools.iter().find(|t| t.name == name)
    }
}

impl Default for ToolManifest {
    fn default() -> Self {
        Self::standard()
    }
}
