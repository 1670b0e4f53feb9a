//! Run configuration.
//!
//! Defaults, overridable from the environment:
//!
//! | variable | field | default |
//! |---|---|---|
//! | `FAB_VENV_NAME` | `venv_name` | `format_venv` |
//! | `FAB_PYTHON` | `python` | `python3` (`python` on Windows) |
//! | `FAB_TIMEOUT_SECS` | `run_timeout_secs` | none |
//! | `FAB_UPGRADE_PIP` | `upgrade_pip` | `true` |

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;
use venv_manager::{validate_env_name, VenvError, DEFAULT_VENV_NAME};

/// Settings for a [`crate::FabPipeline`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FabConfig {
    /// Environment directory name inside the project.
    pub venv_name: String,

    /// Interpreter used to create the environment.
    pub python: String,

    /// Whole-run timeout in seconds (`None` = unbounded).
    pub run_timeout_secs: Option<u64>,

    /// Upgrade pip/setuptools/wheel before the first tool install.
    pub upgrade_pip: bool,

    /// Create the environment when it does not exist yet.
    pub allow_create: bool,
}

impl Default for FabConfig {
    fn default() -> Self {
        Self {
            venv_name: DEFAULT_VENV_NAME.to_string(),
            python: default_python().to_string(),
            run_timeout_secs: None,
            upgrade_pip: true,
            allow_create: true,
        }
    }
}

impl FabConfig {
    /// Defaults overridden by `FAB_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for each `FAB_*` key.
    /// Unparseable values are ignored.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(name) = lookup("FAB_VENV_NAME").filter(|v| !v.trim().is_empty()) {
            let name = name.trim();
            match validate_env_name(name) {
                Ok(()) => config.venv_name = name.to_string(),
                Err(e) => warn!(error = %e, "Ignoring FAB_VENV_NAME"),
            }
        }
        if let Some(python) = lookup("FAB_PYTHON").filter(|v| !v.trim().is_empty()) {
            config.python = python.trim().to_string();
        }
        if let Some(secs) = lookup("FAB_TIMEOUT_SECS").and_then(|v| v.trim().parse::<u64>().ok()) {
            config.run_timeout_secs = (secs > 0).then_some(secs);
        }
        if let Some(flag) = lookup("FAB_UPGRADE_PIP") {
            config.upgrade_pip = !matches!(
                flag.trim().to_lowercase().as_str(),
                "0" | "false" | "no" | "off"
            );
        }

        config
    }

    pub fn with_venv_name(mut self, name: impl Into<String>) -> Self {
        self.venv_name = name.into();
        self
    }

    pub fn with_python(mut self, python: impl Into<String>) -> Self {
        self.python = python.into();
        self
    }

    pub fn with_run_timeout_secs(mut self, secs: u64) -> Self {
        self.run_timeout_secs = (secs > 0).then_some(secs);
        self
    }

    pub fn with_upgrade_pip(mut self, upgrade: bool) -> Self {
        self.upgrade_pip = upgrade;
        self
    }

    pub fn with_allow_create(mut self, allow: bool) -> Self {
        self.allow_create = allow;
        self
    }

    /// Reject settings a run could not use safely.
    pub fn validate(&self) -> Result<(), VenvError> {
        validate_env_name(&self.venv_name)
    }

    pub fn run_timeout(&self) -> Option<Duration> {
        self.run_timeout_secs.map(Duration::from_secs)
    }
}

fn default_python() -> &'static str {
    if cfg!(windows) {
        "python"
    } else {
        "python3"
    }
}
