//! In-memory fake for [`CommandExecutor`] (testing only)
//!
//! `FakeExecutor` records every command it is asked to run and answers from a
//! list of scripted rules. Rules match on a substring of the rendered command
//! line; the first match wins. Unmatched commands succeed with a short stdout
//! line, and `<python> -m venv <dir>` creates `<dir>` so provisioning behaves
//! like the real thing on disk.

use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::VenvError;
use crate::exec::{CommandExecutor, CommandOutput, CommandSpec};
use crate::Result;

/// Scripted answer for a matched command.
#[derive(Debug, Clone)]
pub enum FakeResponse {
    /// Finish with the given exit code and streams.
    Exit {
        code: i32,
        stdout: String,
        stderr: String,
    },

    /// Fail to start.
    SpawnError(String),

    /// Never finish.
    Hang,
}

impl FakeResponse {
    pub fn ok(stdout: &str) -> Self {
        Self::exit(0, stdout, "")
    }

    pub fn exit(code: i32, stdout: &str, stderr: &str) -> Self {
        FakeResponse::Exit {
            code,
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
        }
    }

    pub fn spawn_error(reason: &str) -> Self {
        FakeResponse::SpawnError(reason.to_string())
    }
}

#[derive(Debug)]
struct Rule {
    needle: String,
    response: FakeResponse,
}

/// Recording, rule-driven command executor.
#[derive(Debug, Default)]
pub struct FakeExecutor {
    rules: Vec<Rule>,
    calls: Mutex<Vec<CommandSpec>>,
}

impl FakeExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer commands whose command line contains `needle` with `response`.
    pub fn on(mut self, needle: &str, response: FakeResponse) -> Self {
        self.rules.push(Rule {
            needle: needle.to_string(),
            response,
        });
        self
    }

    /// Every command executed so far, in order.
    pub fn calls(&self) -> Vec<CommandSpec> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Rendered command lines of every call, in order.
    pub fn command_lines(&self) -> Vec<String> {
        self.calls().iter().map(CommandSpec::command_line).collect()
    }

    fn emulate_venv(command: &CommandSpec) {
        let is_venv = command
            .args
            .windows(2)
            .any(|pair| pair[0] == "-m" && pair[1] == "venv");
        if let (true, Some(target)) = (is_venv, command.args.last()) {
            let target = PathBuf::from(target);
            let target = if target.is_absolute() {
                target
            } else {
                command.cwd.join(target)
            };
            std::fs::create_dir_all(&target).unwrap();
        }
    }
}

#[async_trait]
impl CommandExecutor for FakeExecutor {
    async fn execute(&self, command: &CommandSpec) -> Result<CommandOutput> {
        self.calls.lock().unwrap().push(command.clone());
        let line = command.command_line();

        let rule = self.rules.iter().find(|r| line.contains(&r.needle));
        match rule.map(|r| r.response.clone()) {
            Some(FakeResponse::Exit {
                code,
                stdout,
                stderr,
            }) => {
                if code == 0 {
                    Self::emulate_venv(command);
                }
                Ok(CommandOutput {
                    exit_code: code,
                    stdout,
                    stderr,
                    duration_ms: 0,
                })
            }
            Some(FakeResponse::SpawnError(reason)) => Err(VenvError::Spawn {
                program: command.program.display().to_string(),
                reason,
            }),
            Some(FakeResponse::Hang) => std::future::pending().await,
            None => {
                Self::emulate_venv(command);
                let program = command
                    .program
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_default();
                Ok(CommandOutput {
                    exit_code: 0,
                    stdout: format!("{program} ok\n"),
                    stderr: String::new(),
                    duration_ms: 0,
                })
            }
        }
    }
}
