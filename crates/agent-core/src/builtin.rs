//! Built-in Tools
//!
//! Git helpers registered the same way as user tools. Command execution
//! goes through an injectable runner so handlers stay testable without a
//! real git binary.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::{Result, ToolError};
use crate::tool::{tool_fn, ArgumentMap, Parameter, Tool, ToolOutput, ToolRegistry};

/// Captured output of one subprocess run
#[derive(Clone, Debug)]
pub struct CommandOutput {
    pub stdout: String,
    /// Failure description; `None` on a zero exit status
    pub error: Option<String>,
}

/// Seam for running external commands
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, command: &[String]) -> CommandOutput;
}

/// Runner that spawns real processes
pub struct SystemRunner;

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn run(&self, command: &[String]) -> CommandOutput {
        let Some((program, args)) = command.split_first() else {
            return CommandOutput {
                stdout: String::new(),
                error: Some("empty command".into()),
            };
        };

        match tokio::process::Command::new(program).args(args).output().await {
            Ok(output) => {
                let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
                if output.status.success() {
                    CommandOutput {
                        stdout,
                        error: None,
                    }
                } else {
                    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
                    CommandOutput {
                        stdout,
                        error: Some(if stderr.is_empty() {
                            "git command failed".into()
                        } else {
                            stderr
                        }),
                    }
                }
            }
            Err(err) => CommandOutput {
                stdout: String::new(),
                error: Some(format!("Failed to start git process: {err}")),
            },
        }
    }
}

fn git_command(repo: &str, tail: &[&str]) -> Vec<String> {
    let mut command = vec!["git".to_string(), "-C".to_string(), repo.to_string()];
    command.extend(tail.iter().map(ToString::to_string));
    command
}

/// `git_diff`: working-tree status plus diff against HEAD, as one report
pub fn git_diff_tool(default_repo: impl Into<String>, runner: Arc<dyn CommandRunner>) -> Tool {
    let default_repo = default_repo.into();

    Tool::new(
        "git_diff",
        "Execute git diff in the repository and return raw stdout (no parsing).",
        vec![Parameter::string("repo", "Optional path to git repository")],
        tool_fn(move |args: ArgumentMap| {
            let runner = runner.clone();
            let default_repo = default_repo.clone();
            async move {
                let repo = args
                    .get("repo")
                    .and_then(Value::as_str)
                    .unwrap_or(&default_repo)
                    .to_string();

                let status = runner
                    .run(&git_command(&repo, &["status", "--porcelain"]))
                    .await;
                let diff = runner.run(&git_command(&repo, &["diff", "HEAD"])).await;

                if let Some(error) = status.error {
                    return Ok(ToolOutput::Json(json!({
                        "success": false,
                        "error": error,
                    })));
                }

                let report = format!(
                    "Git Status:\n{}\nGit Diff Contents:\n{}",
                    if status.stdout.is_empty() {
                        "(No changes)\n"
                    } else {
                        &status.stdout
                    },
                    if diff.stdout.is_empty() {
                        "(No diff content)\n"
                    } else {
                        &diff.stdout
                    },
                );

                Ok(ToolOutput::Json(json!({
                    "success": true,
                    "stdout": report,
                })))
            }
        }),
    )
}

// record fields separated by \x1f, records separated by \x1e
const COMMIT_LOG_FORMAT: &str = "--pretty=format:%H%x1f%an%x1f%ad%x1f%s%x1f%b%x1e";

/// `commit_log_export`: latest N commits written to a JSON file
pub fn commit_log_export_tool(
    default_repo: impl Into<String>,
    runner: Arc<dyn CommandRunner>,
) -> Tool {
    let default_repo = default_repo.into();

    Tool::new(
        "commit_log_export",
        "Export latest git commits to a JSON file",
        vec![
            Parameter::integer("limit", "Number of commits to export")
                .required()
                .minimum(1.0),
            Parameter::string("output", "Output JSON file path")
                .required()
                .min_length(1),
            Parameter::string("repo", "Optional git repository path"),
        ],
        tool_fn(move |args: ArgumentMap| {
            let runner = runner.clone();
            let default_repo = default_repo.clone();
            async move {
                let repo = args
                    .get("repo")
                    .and_then(Value::as_str)
                    .unwrap_or(&default_repo)
                    .to_string();
                let limit = args
                    .get("limit")
                    .and_then(Value::as_i64)
                    .ok_or_else(|| ToolError::msg("limit must be a positive integer"))?;
                let output = args
                    .get("output")
                    .and_then(Value::as_str)
                    .ok_or_else(|| ToolError::msg("output must be a non-empty string"))?
                    .to_string();

                let result = runner
                    .run(&git_command(
                        &repo,
                        &[
                            "log",
                            "-n",
                            &limit.to_string(),
                            COMMIT_LOG_FORMAT,
                            "--date=iso-strict",
                        ],
                    ))
                    .await;
                if let Some(error) = result.error {
                    return Ok(ToolOutput::Json(json!({
                        "success": false,
                        "error": error,
                    })));
                }

                let entries = parse_commit_records(&result.stdout);
                let json_text = serde_json::to_string_pretty(&entries)
                    .map_err(|err| ToolError::msg(format!("Failed to encode JSON: {err}")))?;

                if tokio::fs::write(&output, json_text).await.is_err() {
                    return Ok(ToolOutput::Json(json!({
                        "success": false,
                        "error": "Failed to write output file",
                    })));
                }

                Ok(ToolOutput::Json(json!({
                    "success": true,
                    "path": output,
                    "count": entries.len(),
                })))
            }
        }),
    )
}

fn parse_commit_records(stdout: &str) -> Vec<Value> {
    stdout
        .split('\x1e')
        .filter_map(|record| {
            let record = record.trim_matches(['\r', '\n']);
            if record.is_empty() {
                return None;
            }
            let parts: Vec<&str> = record.split('\x1f').collect();
            if parts.len() < 4 {
                return None;
            }
            Some(json!({
                "hash": parts[0],
                "author": parts[1],
                "date": parts[2],
                "subject": parts[3],
                "body": parts.get(4).copied().unwrap_or(""),
            }))
        })
        .collect()
}

/// Register all git tools into the registry under a shared repo and runner
pub fn register_git_tools(
    registry: &mut ToolRegistry,
    repo_path: Option<String>,
    runner: Option<Arc<dyn CommandRunner>>,
) -> Result<()> {
    let repo = match repo_path {
        Some(path) => path,
        None => std::env::current_dir()?.display().to_string(),
    };
    let runner = runner.unwrap_or_else(|| Arc::new(SystemRunner));

    registry.register(commit_log_export_tool(repo.clone(), runner.clone()))?;
    registry.register(git_diff_tool(repo, runner))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Runner stub that maps a command's subcommand to a canned output
    struct StubRunner {
        outputs: HashMap<String, CommandOutput>,
        commands: Mutex<Vec<Vec<String>>>,
    }

    impl StubRunner {
        fn new(outputs: Vec<(&str, CommandOutput)>) -> Self {
            Self {
                outputs: outputs
                    .into_iter()
                    .map(|(k, v)| (k.to_string(), v))
                    .collect(),
                commands: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl CommandRunner for StubRunner {
        async fn run(&self, command: &[String]) -> CommandOutput {
            self.commands.lock().unwrap().push(command.to_vec());
            let subcommand = &command[3];
            self.outputs
                .get(subcommand)
                .cloned()
                .unwrap_or(CommandOutput {
                    stdout: String::new(),
                    error: None,
                })
        }
    }

    fn ok(stdout: &str) -> CommandOutput {
        CommandOutput {
            stdout: stdout.into(),
            error: None,
        }
    }

    #[tokio::test]
    async fn git_diff_combines_status_and_diff() {
        let runner = Arc::new(StubRunner::new(vec![
            ("status", ok(" M src/lib.rs\n")),
            ("diff", ok("diff --git a/src/lib.rs b/src/lib.rs\n")),
        ]));
        let tool = git_diff_tool("/repo", runner.clone());

        let output = tool_output(&tool, ArgumentMap::new()).await;
        assert_eq!(output["success"], json!(true));
        let report = output["stdout"].as_str().unwrap();
        assert!(report.contains("Git Status:\n M src/lib.rs"));
        assert!(report.contains("Git Diff Contents:\ndiff --git"));

        let commands = runner.commands.lock().unwrap();
        assert_eq!(commands[0][..3], ["git", "-C", "/repo"].map(String::from));
    }

    #[tokio::test]
    async fn git_diff_reports_runner_failure() {
        let runner = Arc::new(StubRunner::new(vec![(
            "status",
            CommandOutput {
                stdout: String::new(),
                error: Some("not a git repository".into()),
            },
        )]));
        let tool = git_diff_tool("/repo", runner);

        let output = tool_output(&tool, ArgumentMap::new()).await;
        assert_eq!(output["success"], json!(false));
        assert_eq!(output["error"], json!("not a git repository"));
    }

    #[tokio::test]
    async fn commit_log_export_writes_parsed_entries() {
        let stdout = "abc123\x1fAlice\x1f2024-05-01T10:00:00+00:00\x1fFix parser\x1fdetails\x1e\
                      def456\x1fBob\x1f2024-05-02T11:00:00+00:00\x1fAdd tests\x1f\x1e";
        let runner = Arc::new(StubRunner::new(vec![("log", ok(stdout))]));
        let tool = commit_log_export_tool("/repo", runner);

        let dir = std::env::temp_dir().join("commit-log-export-test");
        tokio::fs::create_dir_all(&dir).await.unwrap();
        let path = dir.join("log.json");
        let mut args = ArgumentMap::new();
        args.insert("limit".into(), json!(2));
        args.insert("output".into(), json!(path.to_str().unwrap()));

        let output = tool_output(&tool, args).await;
        assert_eq!(output["success"], json!(true));
        assert_eq!(output["count"], json!(2));

        let written: Vec<Value> =
            serde_json::from_str(&tokio::fs::read_to_string(&path).await.unwrap()).unwrap();
        assert_eq!(written[0]["hash"], json!("abc123"));
        assert_eq!(written[0]["body"], json!("details"));
        assert_eq!(written[1]["subject"], json!("Add tests"));
    }

    #[test]
    fn malformed_commit_records_are_skipped() {
        let entries = parse_commit_records("only-two\x1ffields\x1e\n\x1e");
        assert!(entries.is_empty());
    }

    #[tokio::test]
    async fn register_git_tools_registers_both() {
        let mut registry = ToolRegistry::new();
        register_git_tools(
            &mut registry,
            Some("/repo".into()),
            Some(Arc::new(StubRunner::new(vec![]))),
        )
        .unwrap();

        assert!(registry.has("git_diff"));
        assert!(registry.has("commit_log_export"));
    }

    async fn tool_output(tool: &Tool, args: ArgumentMap) -> Value {
        let mut registry = ToolRegistry::new();
        registry.register(tool.clone()).unwrap();
        match registry.call(tool.name(), args).await.unwrap() {
            ToolOutput::Json(value) => value,
            ToolOutput::Text(text) => panic!("expected JSON output, got text: {text}"),
        }
    }
}
