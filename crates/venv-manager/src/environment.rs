//! Disposable virtual environment provisioning
//!
//! One environment per project per run: created lazily under the project
//! root, reused as-is if the directory is already there, and removed at the
//! end of the run.

use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::VenvError;
use crate::exec::{CommandExecutor, CommandSpec};
use crate::Result;

/// Default environment directory name.
pub const DEFAULT_VENV_NAME: &str = "format_venv";

/// Check that `name` is exactly one normal path component.
///
/// Empty names, `.`, `..`, absolute paths and anything containing a path
/// separator are rejected: the directory is deleted at the end of every run
/// and must never be the project itself or lie outside it.
pub fn validate_env_name(name: &str) -> Result<()> {
    let mut components = Path::new(name).components();
    let single_normal = matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    );
    if single_normal && !name.contains(['/', '\\']) {
        Ok(())
    } else {
        Err(VenvError::InvalidEnvironmentName(name.to_string()))
    }
}

/// Filesystem root of the Python project being analysed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectHandle {
    root: PathBuf,
}

impl ProjectHandle {
    /// Canonicalise `path` and check that it is an existing directory.
    ///
    /// Nothing is created or modified here; a missing project is reported
    /// before any other step of a run touches the filesystem.
    pub fn resolve(path: &Path) -> Result<Self> {
        if !path.is_dir() {
            return Err(VenvError::ProjectNotFound(path.to_path_buf()));
        }
        let root = path
            .canonicalize()
            .map_err(|_| VenvError::ProjectNotFound(path.to_path_buf()))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Last component of the root, `"project"` for a filesystem root.
    pub fn dir_name(&self) -> String {
        self.root
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "project".to_string())
    }
}

/// A virtual environment at `project/name`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentSpec {
    /// Project root the environment lives in.
    pub project_root: PathBuf,

    /// Directory name inside the project.
    pub name: String,

    /// Resolved directory.
    pub dir: PathBuf,

    /// Whether this run created the directory.
    pub created: bool,
}

impl EnvironmentSpec {
    /// Environment `name` directly under the project root.
    ///
    /// Fails with [`VenvError::InvalidEnvironmentName`] unless `name` is a
    /// single plain directory name.
    pub fn new(project: &ProjectHandle, name: &str) -> Result<Self> {
        validate_env_name(name)?;
        Ok(Self {
            project_root: project.root().to_path_buf(),
            name: name.to_string(),
            dir: project.root().join(name),
            created: false,
        })
    }

    pub fn exists(&self) -> bool {
        self.dir.is_dir()
    }

    /// Directory holding the environment's executables.
    pub fn bin_dir(&self) -> PathBuf {
        if cfg!(windows) {
            self.dir.join("Scripts")
        } else {
            self.dir.join("bin")
        }
    }

    /// Path of an executable installed into the environment.
    pub fn executable(&self, name: &str) -> PathBuf {
        if cfg!(windows) {
            self.bin_dir().join(format!("{name}.exe"))
        } else {
            self.bin_dir().join(name)
        }
    }

    /// The environment's interpreter.
    pub fn python(&self) -> PathBuf {
        self.executable("python")
    }

    /// Variables that `activate` would set: `VIRTUAL_ENV` and a `PATH` with
    /// the environment's bin directory first.
    pub fn activation_env(&self) -> Vec<(String, String)> {
        let bin = self.bin_dir();
        let path = match std::env::var_os("PATH") {
            Some(existing) => {
                let mut parts = vec![bin.clone()];
                parts.extend(std::env::split_paths(&existing));
                std::env::join_paths(parts)
                    .map(|p| p.to_string_lossy().to_string())
                    .unwrap_or_else(|_| bin.display().to_string())
            }
            None => bin.display().to_string(),
        };
        vec![
            ("VIRTUAL_ENV".to_string(), self.dir.display().to_string()),
            ("PATH".to_string(), path),
        ]
    }
}

/// Make sure the environment directory exists, creating it with
/// `<python> -m venv <dir>` when it does not.
///
/// An existing directory is reused without any integrity check and without
/// running a command, so calling this twice is a no-op the second time.
pub async fn ensure_environment(
    executor: &dyn CommandExecutor,
    project: &ProjectHandle,
    name: &str,
    python: &str,
    allow_create: bool,
) -> Result<EnvironmentSpec> {
    let mut env = EnvironmentSpec::new(project, name)?;

    if env.exists() {
        debug!(dir = ?env.dir, "Reusing existing virtual environment");
        return Ok(env);
    }

    if !allow_create {
        return Err(VenvError::CreationDeclined(env.dir));
    }

    info!(dir = ?env.dir, python = %python, "Creating virtual environment");
    let command = CommandSpec::new(python, project.root())
        .args(["-m", "venv"])
        .arg(env.dir.display().to_string());
    let output = executor.execute(&command).await.map_err(|e| {
        VenvError::EnvironmentCreation {
            path: env.dir.clone(),
            reason: e.to_string(),
        }
    })?;

    if !output.success() {
        return Err(VenvError::EnvironmentCreation {
            path: env.dir,
            reason: format!(
                "{} exited with code {}: {}",
                command.command_line(),
                output.exit_code,
                output.stderr.trim()
            ),
        });
    }

    if !env.exists() {
        return Err(VenvError::EnvironmentCreation {
            path: env.dir,
            reason: "directory missing after venv creation".to_string(),
        });
    }

    env.created = true;
    Ok(env)
}

/// Recursively remove the environment directory. No-op if already gone.
///
/// Refuses to touch anything but a direct child of the project root.
pub fn destroy_environment(env: &EnvironmentSpec) -> Result<()> {
    validate_env_name(&env.name)?;
    if env.dir.parent() != Some(env.project_root.as_path()) || env.dir == env.project_root {
        return Err(VenvError::InvalidEnvironmentName(env.dir.display().to_string()));
    }
    if !env.dir.exists() {
        return Ok(());
    }
    info!(dir = ?env.dir, "Deleting virtual environment");
    std::fs::remove_dir_all(&env.dir)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::{FakeExecutor, FakeResponse};
    use tempfile::tempdir;

    #[test]
    fn test_resolve_missing_project() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("nope");

        let err = ProjectHandle::resolve(&missing).unwrap_err();
        assert!(matches!(err, VenvError::ProjectNotFound(_)));
        assert!(!missing.exists());
    }

    #[test]
    fn test_resolve_file_is_not_a_project() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("setup.py");
        std::fs::write(&file, b"").unwrap();

        assert!(ProjectHandle::resolve(&file).is_err());
    }

    #[test]
    fn test_dir_name() {
        let dir = tempdir().unwrap();
        let project_dir = dir.path().join("my_project");
        std::fs::create_dir(&project_dir).unwrap();

        let project = ProjectHandle::resolve(&project_dir).unwrap();
        assert_eq!(project.dir_name(), "my_project");
    }

    #[test]
    fn test_environment_paths() {
        let dir = tempdir().unwrap();
        let project = ProjectHandle::resolve(dir.path()).unwrap();
        let env = EnvironmentSpec::new(&project, DEFAULT_VENV_NAME).unwrap();

        assert_eq!(env.dir, project.root().join("format_venv"));
        assert!(env.python().starts_with(env.bin_dir()));
        assert!(!env.created);

        let vars = env.activation_env();
        assert_eq!(vars[0].0, "VIRTUAL_ENV");
        assert!(vars[1].1.starts_with(&env.bin_dir().display().to_string()));
    }

    #[tokio::test]
    async fn test_ensure_creates_once() {
        let dir = tempdir().unwrap();
        let project = ProjectHandle::resolve(dir.path()).unwrap();
        let executor = FakeExecutor::new();

        let first = ensure_environment(&executor, &project, "format_venv", "python3", true)
            .await
            .unwrap();
        assert!(first.created);
        assert!(first.exists());
        assert_eq!(executor.call_count(), 1);

        let second = ensure_environment(&executor, &project, "format_venv", "python3", true)
            .await
            .unwrap();
        assert!(!second.created);
        assert_eq!(second.dir, first.dir);
        assert_eq!(executor.call_count(), 1, "second call must not run anything");
    }

    #[tokio::test]
    async fn test_ensure_declined() {
        let dir = tempdir().unwrap();
        let project = ProjectHandle::resolve(dir.path()).unwrap();
        let executor = FakeExecutor::new();

        let err = ensure_environment(&executor, &project, "format_venv", "python3", false)
            .await
            .unwrap_err();
        assert!(matches!(err, VenvError::CreationDeclined(_)));
        assert_eq!(executor.call_count(), 0);
    }

    #[tokio::test]
    async fn test_ensure_reuses_existing_without_create_permission() {
        let dir = tempdir().unwrap();
        std::fs::create_dir(dir.path().join("format_venv")).unwrap();
        let project = ProjectHandle::resolve(dir.path()).unwrap();
        let executor = FakeExecutor::new();

        let env = ensure_environment(&executor, &project, "format_venv", "python3", false)
            .await
            .unwrap();
        assert!(!env.created);
    }

    #[tokio::test]
    async fn test_ensure_creation_failure() {
        let dir = tempdir().unwrap();
        let project = ProjectHandle::resolve(dir.path()).unwrap();
        let executor = FakeExecutor::new().on(
            "-m venv",
            FakeResponse::exit(1, "", "No module named venv"),
        );

        let err = ensure_environment(&executor, &project, "format_venv", "python3", true)
            .await
            .unwrap_err();
        match err {
            VenvError::EnvironmentCreation { reason, .. } => {
                assert!(reason.contains("No module named venv"))
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_ensure_spawn_failure() {
        let dir = tempdir().unwrap();
        let project = ProjectHandle::resolve(dir.path()).unwrap();
        let executor =
            FakeExecutor::new().on("-m venv", FakeResponse::spawn_error("python3 not found"));

        let err = ensure_environment(&executor, &project, "format_venv", "python3", true)
            .await
            .unwrap_err();
        assert!(matches!(err, VenvError::EnvironmentCreation { .. }));
    }

    #[test]
    fn test_destroy_removes_tree_and_is_idempotent() {
        let dir = tempdir().unwrap();
        let project = ProjectHandle::resolve(dir.path()).unwrap();
        let env = EnvironmentSpec::new(&project, "format_venv").unwrap();
        std::fs::create_dir_all(env.bin_dir()).unwrap();
        std::fs::write(env.python(), b"#!/bin/sh\n").unwrap();

        destroy_environment(&env).unwrap();
        assert!(!env.dir.exists());

        destroy_environment(&env).unwrap();
    }

    #[test]
    fn test_env_name_validation() {
        for good in ["format_venv", ".venv", "lint-env.3"] {
            assert!(validate_env_name(good).is_ok(), "{good:?} rejected");
        }
        for bad in ["", ".", "..", "../other", "/tmp/x", "a/b", "a\\b", "./x", "x/"] {
            assert!(
                matches!(
                    validate_env_name(bad),
                    Err(VenvError::InvalidEnvironmentName(_))
                ),
                "{bad:?} accepted"
            );
        }
    }

    #[tokio::test]
    async fn test_bad_names_never_touch_the_project() {
        let dir = tempdir().unwrap();
        let project_dir = dir.path().join("project");
        std::fs::create_dir_all(project_dir.join("src")).unwrap();
        std::fs::write(project_dir.join("src").join("app.py"), b"x = 1\n").unwrap();
        let project = ProjectHandle::resolve(&project_dir).unwrap();
        let executor = FakeExecutor::new();

        for bad in ["", ".", "..", "../project"] {
            assert!(EnvironmentSpec::new(&project, bad).is_err());
            let err = ensure_environment(&executor, &project, bad, "python3", true)
                .await
                .unwrap_err();
            assert!(matches!(err, VenvError::InvalidEnvironmentName(_)));
        }
        assert_eq!(executor.call_count(), 0);
        assert!(project_dir.join("src").join("app.py").exists());
    }

    #[test]
    fn test_destroy_refuses_hand_built_spec_outside_project() {
        let dir = tempdir().unwrap();
        let project_dir = dir.path().join("project");
        let sibling = dir.path().join("sibling");
        std::fs::create_dir(&project_dir).unwrap();
        std::fs::create_dir(&sibling).unwrap();
        let project = ProjectHandle::resolve(&project_dir).unwrap();

        let mut env = EnvironmentSpec::new(&project, "format_venv").unwrap();
        env.dir = sibling.canonicalize().unwrap();

        let err = destroy_environment(&env).unwrap_err();
        assert!(matches!(err, VenvError::InvalidEnvironmentName(_)));
        assert!(sibling.exists());
    }
}
