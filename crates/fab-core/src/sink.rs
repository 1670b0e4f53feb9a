//! Report output: console or append-only result file.

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use venv_manager::ProjectHandle;

use crate::error::FabError;
use crate::runner::{RunResult, ToolOutcome, ToolRun};

const HEAVY_RULE: &str = "========================================";
const LIGHT_RULE: &str = "----------------------------------------";

/// Where captured tool output goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputSink {
    /// Headers and stdout blobs to stdout, stderr blobs to stderr.
    Console,

    /// Appended to a text file, never truncated.
    File(PathBuf),
}

impl OutputSink {
    /// `<project>/<project dir name>_formatting_results.txt`
    pub fn default_report_path(project: &ProjectHandle) -> PathBuf {
        project
            .root()
            .join(format!("{}_formatting_results.txt", project.dir_name()))
    }

    /// File sink at the default path for `project`.
    pub fn default_file(project: &ProjectHandle) -> Self {
        OutputSink::File(Self::default_report_path(project))
    }

    pub fn report_path(&self) -> Option<&Path> {
        match self {
            OutputSink::Console => None,
            OutputSink::File(path) => Some(path),
        }
    }

    /// Write every tool section of `result`.
    pub fn emit(&self, header: &ReportHeader, result: &RunResult) -> Result<(), FabError> {
        match self {
            OutputSink::Console => {
                let stdout = io::stdout();
                let stderr = io::stderr();
                write_console(&mut stdout.lock(), &mut stderr.lock(), result).map_err(|source| {
                    FabError::Report {
                        path: PathBuf::from("<stdout>"),
                        source,
                    }
                })
            }
            OutputSink::File(path) => append_report(path, header, result).map_err(|source| {
                FabError::Report {
                    path: path.clone(),
                    source,
                }
            }),
        }
    }
}

/// Identifies one run inside an append-only report file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportHeader {
    pub run_id: String,
    pub project: PathBuf,
    pub started_at: DateTime<Utc>,
}

impl ReportHeader {
    pub fn render(&self) -> String {
        format!(
            "# fab run {} at {} for {}\n",
            self.run_id,
            self.started_at.to_rfc3339(),
            self.project.display()
        )
    }
}

/// Section banner preceding a tool's output.
pub fn render_banner(run: &ToolRun) -> String {
    format!("\n{HEAVY_RULE}\nRunning {}...\n{HEAVY_RULE}\n", run.tool)
}

/// Full section for one tool: banner, then both streams between rules.
pub fn render_section(run: &ToolRun) -> String {
    let mut section = render_banner(run);
    section.push_str(&format!("{} suggestions:\n{LIGHT_RULE}\n", run.display_name));
    for body in section_bodies(run) {
        section.push_str(&body);
        section.push('\n');
    }
    section.push_str(LIGHT_RULE);
    section.push('\n');
    section
}

/// Every section of `result`, in order, plus a notice when the run was
/// cut short.
pub fn render_report(result: &RunResult) -> String {
    let mut report: String = result.tools.iter().map(render_section).collect();
    if !result.completed {
        report.push_str(&render_incomplete(result));
    }
    report
}

/// Trailer for a run stopped before every tool finished.
pub fn render_incomplete(result: &RunResult) -> String {
    format!(
        "\n{HEAVY_RULE}\nRun stopped after {} tool(s); remaining tools did not run.\n{HEAVY_RULE}\n",
        result.tools.len()
    )
}

fn section_bodies(run: &ToolRun) -> Vec<String> {
    if let ToolOutcome::Raised(reason) = &run.outcome {
        return vec![format!("{} failed to run: {reason}", run.display_name)];
    }
    [run.stdout.trim(), run.stderr.trim()]
        .into_iter()
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn append_report(path: &Path, header: &ReportHeader, result: &RunResult) -> io::Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(header.render().as_bytes())?;
    file.write_all(render_report(result).as_bytes())?;
    file.flush()
}

/// Console layout: banners and stdout on `out`, stderr blobs on `err`.
pub fn write_console<O: Write, E: Write>(
    out: &mut O,
    err: &mut E,
    result: &RunResult,
) -> io::Result<()> {
    for run in &result.tools {
        write!(out, "{}", render_banner(run))?;
        writeln!(out, "{} suggestions:\n{LIGHT_RULE}", run.display_name)?;
        match &run.outcome {
            ToolOutcome::Raised(reason) => {
                writeln!(err, "{} failed to run: {reason}", run.display_name)?;
            }
            ToolOutcome::Ran => {
                if !run.stdout.trim().is_empty() {
                    writeln!(out, "{}", run.stdout.trim())?;
                }
                if !run.stderr.trim().is_empty() {
                    out.flush()?;
                    writeln!(err, "{}", run.stderr.trim())?;
                    err.flush()?;
                }
            }
        }
        writeln!(out, "{LIGHT_RULE}")?;
    }
    if !result.completed {
        write!(out, "{}", render_incomplete(result))?;
    }
    out.flush()
}
