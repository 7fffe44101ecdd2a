//! CommandExecutor - 外部コマンドに成果物生成を委譲する TaskExecutor
//!
//! Invocation: `<program> <args...> <entity_id> <year> <quarter> <task_type>`,
//! plus `MENDER_*` environment variables carrying the same values and the
//! attempt number.
//!
//! # Exit code の解釈
//! - `0`: success; trimmed stdout is the artifact reference
//! - `66` (EX_NOINPUT): input data missing
//! - `65` (EX_DATAERR): malformed input, not retried
//! - anything else, death by signal, or timeout: transient
//! - the program cannot be spawned at all: terminal

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use crate::domain::{ArtifactRef, TaskError, WorkKey};
use crate::ports::{TaskExecutor, TaskRequest};

pub const EXIT_INPUT_MISSING: i32 = 66;
pub const EXIT_MALFORMED_INPUT: i32 = 65;

#[derive(Debug, Clone)]
pub struct CommandExecutor {
    program: String,
    args: Vec<String>,
    timeout: Option<Duration>,
}

impl CommandExecutor {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            timeout: None,
        }
    }

    /// Build from a `[program, args...]` vector as found in settings files.
    ///
    /// Returns `None` for an empty vector.
    pub fn from_argv(argv: &[String]) -> Option<Self> {
        let (program, args) = argv.split_first()?;
        Some(Self::new(program.clone()).with_args(args.iter().cloned()))
    }

    pub fn with_args(mut self, args: impl IntoIterator<Item = String>) -> Self {
        self.args.extend(args);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    fn command(&self, request: &TaskRequest) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .arg(request.entity_id().as_str())
            .arg(request.period.year.to_string())
            .arg(request.period.quarter.as_str())
            .arg(request.task_type.as_str())
            .env("MENDER_ENTITY_ID", request.entity_id().as_str())
            .env("MENDER_ENTITY_CODE", &request.entity.code)
            .env("MENDER_YEAR", request.period.year.to_string())
            .env("MENDER_QUARTER", request.period.quarter.as_str())
            .env("MENDER_TASK_TYPE", request.task_type.as_str())
            .env("MENDER_ATTEMPT", request.attempt.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // timeout で future が drop されたら子プロセスも殺す
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl TaskExecutor for CommandExecutor {
    async fn execute(&self, request: &TaskRequest) -> Result<ArtifactRef, TaskError> {
        let mut cmd = self.command(request);
        let output = cmd.output();
        let output = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, output).await {
                Ok(res) => res,
                Err(_) => {
                    return Err(TaskError::transient(format!(
                        "{} timed out after {limit:?}",
                        self.program
                    )));
                }
            },
            None => output.await,
        };

        let output = output.map_err(|e| {
            TaskError::terminal(format!("cannot spawn {}: {e}", self.program))
        })?;

        let stderr = last_line(&output.stderr);
        match output.status.code() {
            Some(0) => {
                let stdout = String::from_utf8_lossy(&output.stdout);
                let artifact = stdout.trim();
                if artifact.is_empty() {
                    let key = WorkKey::new(
                        request.entity_id().clone(),
                        request.period,
                        request.task_type,
                    );
                    Ok(ArtifactRef::new(key.to_string()))
                } else {
                    Ok(ArtifactRef::new(artifact))
                }
            }
            Some(EXIT_INPUT_MISSING) => Err(TaskError::input_missing(describe(
                &self.program,
                EXIT_INPUT_MISSING,
                &stderr,
            ))),
            Some(EXIT_MALFORMED_INPUT) => Err(TaskError::terminal(describe(
                &self.program,
                EXIT_MALFORMED_INPUT,
                &stderr,
            ))),
            Some(code) => Err(TaskError::transient(describe(&self.program, code, &stderr))),
            None => Err(TaskError::transient(format!(
                "{} was terminated by a signal",
                self.program
            ))),
        }
    }
}

fn last_line(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .lines()
        .rev()
        .find(|l| !l.trim().is_empty())
        .map(|l| l.trim().to_string())
        .unwrap_or_default()
}

fn describe(program: &str, code: i32, stderr: &str) -> String {
    if stderr.is_empty() {
        format!("{program} exited with status {code}")
    } else {
        format!("{program} exited with status {code}: {stderr}")
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::domain::{Entity, EntityId, FailureKind, Period, Quarter, TaskType};
    use rstest::rstest;

    fn request(task_type: TaskType) -> TaskRequest {
        TaskRequest {
            entity: Entity {
                id: EntityId::from("852218"),
                code: "JPM".into(),
                name: "JPMorgan Chase Bank".into(),
                class: "bank".into(),
                task_types: TaskType::ALL.to_vec(),
            },
            period: Period::new(2024, Quarter::Q3),
            task_type,
            attempt: 1,
        }
    }

    /// `sh -c SCRIPT` gets the trailing arguments as $0, $1, $2, $3.
    fn sh(script: &str) -> CommandExecutor {
        CommandExecutor::new("sh").with_args(["-c".to_string(), script.to_string()])
    }

    #[tokio::test]
    async fn passes_positional_arguments_and_env() {
        let exec = sh("echo \"out/$0/$1/$2/$3/$MENDER_ENTITY_CODE/$MENDER_ATTEMPT\"");
        let artifact = exec.execute(&request(TaskType::Report)).await.unwrap();
        assert_eq!(artifact.as_str(), "out/852218/2024/Q3/report/JPM/1");
    }

    #[tokio::test]
    async fn empty_stdout_yields_the_work_key() {
        let exec = sh("true");
        let artifact = exec.execute(&request(TaskType::Extract)).await.unwrap();
        assert_eq!(artifact.as_str(), "852218/2024-Q3/extract");
    }

    #[rstest]
    #[case::input_missing(66, FailureKind::InputMissing)]
    #[case::malformed(65, FailureKind::Terminal)]
    #[case::other(1, FailureKind::Transient)]
    #[case::unavailable(75, FailureKind::Transient)]
    #[tokio::test]
    async fn exit_codes_map_to_failure_kinds(#[case] code: i32, #[case] kind: FailureKind) {
        let exec = sh(&format!("echo 'something went wrong' >&2; exit {code}"));
        let err = exec.execute(&request(TaskType::Extract)).await.unwrap_err();
        assert_eq!(err.kind(), kind);
        assert!(err.reason().contains("something went wrong"), "{err}");
    }

    #[tokio::test]
    async fn timeout_is_transient() {
        let exec = sh("sleep 5").with_timeout(Duration::from_millis(100));
        let err = exec.execute(&request(TaskType::Extract)).await.unwrap_err();
        assert_eq!(err.kind(), FailureKind::Transient);
        assert!(err.reason().contains("timed out"));
    }

    #[tokio::test]
    async fn missing_program_is_terminal() {
        let exec = CommandExecutor::new("/nonexistent/mender-task");
        let err = exec.execute(&request(TaskType::Extract)).await.unwrap_err();
        assert_eq!(err.kind(), FailureKind::Terminal);
    }

    #[test]
    fn from_argv_splits_program_and_args() {
        let argv = vec!["python3".to_string(), "run_task.py".to_string()];
        let exec = CommandExecutor::from_argv(&argv).unwrap();
        assert_eq!(exec.program(), "python3");
        assert_eq!(exec.args, vec!["run_task.py".to_string()]);
        assert!(CommandExecutor::from_argv(&[]).is_none());
    }
}
