//! Tool installation into a provisioned environment

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::environment::EnvironmentSpec;
use crate::error::VenvError;
use crate::exec::{CommandExecutor, CommandSpec};
use crate::Result;

/// A tool that must be runnable from the environment's bin directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToolRequirement {
    /// Executable name inside the environment.
    pub name: &'static str,

    /// Package passed to `pip install`.
    pub package: &'static str,

    /// Arguments for the availability probe.
    pub version_args: &'static [&'static str],
}

/// Outcome of ensuring one tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstalledTool {
    pub name: String,

    /// First line the probe printed, if it succeeded.
    pub version: Option<String>,

    /// Whether pip had to install it during this run.
    pub installed_now: bool,
}

/// Probe each tool in order and pip-install the ones that are missing.
///
/// Strictly sequential: concurrent pip runs contend on the package cache.
/// An install failure aborts immediately with [`VenvError::Install`]; the
/// remaining tools are not touched.
pub async fn ensure_tools_installed(
    executor: &dyn CommandExecutor,
    env: &EnvironmentSpec,
    requirements: &[ToolRequirement],
    upgrade_pip: bool,
) -> Result<Vec<InstalledTool>> {
    let mut installed = Vec::with_capacity(requirements.len());
    let mut pip_upgraded = !upgrade_pip;

    for requirement in requirements {
        if let Some(version) = probe_version(executor, env, requirement).await {
            info!(tool = requirement.name, version = %version, "Tool available");
            installed.push(InstalledTool {
                name: requirement.name.to_string(),
                version: Some(version),
                installed_now: false,
            });
            continue;
        }

        if !pip_upgraded {
            upgrade_packaging(executor, env).await;
            pip_upgraded = true;
        }

        info!(tool = requirement.name, "Tool not installed, installing");
        install_package(executor, env, requirement).await?;
        installed.push(InstalledTool {
            name: requirement.name.to_string(),
            version: None,
            installed_now: true,
        });
    }

    Ok(installed)
}

async fn probe_version(
    executor: &dyn CommandExecutor,
    env: &EnvironmentSpec,
    requirement: &ToolRequirement,
) -> Option<String> {
    let command = CommandSpec::new(env.executable(requirement.name), &env.project_root)
        .args(requirement.version_args.iter().copied())
        .envs(env.activation_env());

    match executor.execute(&command).await {
        Ok(output) if output.success() => Some(
            output
                .stdout
                .lines()
                .map(str::trim)
                .find(|l| !l.is_empty())
                .unwrap_or_default()
                .to_string(),
        ),
        _ => None,
    }
}

async fn install_package(
    executor: &dyn CommandExecutor,
    env: &EnvironmentSpec,
    requirement: &ToolRequirement,
) -> Result<()> {
    let command = CommandSpec::new(env.python(), &env.project_root)
        .args(["-m", "pip", "install", requirement.package])
        .envs(env.activation_env());

    let output = executor
        .execute(&command)
        .await
        .map_err(|e| VenvError::Install {
            tool: requirement.name.to_string(),
            reason: e.to_string(),
        })?;

    if !output.success() {
        return Err(VenvError::Install {
            tool: requirement.name.to_string(),
            reason: format!(
                "pip exited with code {}: {}",
                output.exit_code,
                output.stderr.trim()
            ),
        });
    }

    info!(tool = requirement.name, "Installed");
    Ok(())
}

/// `pip install --upgrade pip setuptools wheel`, best effort.
async fn upgrade_packaging(executor: &dyn CommandExecutor, env: &EnvironmentSpec) {
    let command = CommandSpec::new(env.python(), &env.project_root)
        .args([
            "-m",
            "pip",
            "install",
            "--upgrade",
            "pip",
            "setuptools",
            "wheel",
        ])
        .envs(env.activation_env());

    match executor.execute(&command).await {
        Ok(output) if output.success() => {}
        Ok(output) => warn!(
            exit_code = output.exit_code,
            "pip self-upgrade failed, continuing with bundled pip"
        ),
        Err(e) => warn!(error = %e, "pip self-upgrade failed, continuing with bundled pip"),
    }
}
