//! External process execution.
//!
//! Every git/gh/docker-compose call goes through [`CommandRunner`] so the
//! workflows can be driven by a scripted runner in tests.

use std::io::{Read, Write};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::error::{BasekitError, Result};

/// A single external command invocation.
#[derive(Debug, Clone, Default)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub stdin: Option<Vec<u8>>,
    pub envs: Vec<(String, String)>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Default::default()
        }
    }

    /// Split a configured command line on whitespace. No shell quoting.
    pub fn from_command_line(line: &str) -> Option<Self> {
        let mut parts = line.split_whitespace();
        let program = parts.next()?;
        Some(Self::new(program).args(parts))
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn stdin(mut self, input: Vec<u8>) -> Self {
        self.stdin = Some(input);
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    /// Command line as it would be typed, used for logs and error messages.
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Captured result of a finished process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub code: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Trimmed, lossily decoded stdout.
    pub fn stdout_text(&self) -> String {
        String::from_utf8_lossy(&self.stdout).trim().to_string()
    }

    pub fn stderr_text(&self) -> String {
        String::from_utf8_lossy(&self.stderr).trim().to_string()
    }
}

/// Fail with [`BasekitError::CommandFailed`] unless `output` exited with 0.
pub fn ensure_success(spec: &CommandSpec, output: CommandOutput) -> Result<CommandOutput> {
    if output.success() {
        Ok(output)
    } else {
        Err(BasekitError::CommandFailed {
            command: spec.display(),
            code: output.code,
            stderr: output.stderr_text(),
        })
    }
}

#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run to completion and capture output. Only spawn failures are errors;
    /// a non-zero exit is reported through [`CommandOutput::code`].
    async fn output(&self, spec: &CommandSpec) -> Result<CommandOutput>;

    /// Run with stdout copied into `sink` as it is produced instead of being
    /// captured. Returns the output (stdout left empty) and the number of
    /// bytes copied.
    async fn stream_to(
        &self,
        spec: &CommandSpec,
        sink: &mut (dyn Write + Send),
    ) -> Result<(CommandOutput, u64)>;

    /// Run with `source` copied into stdin as the child consumes it.
    async fn stream_from(
        &self,
        spec: &CommandSpec,
        source: &mut (dyn Read + Send),
    ) -> Result<CommandOutput>;

    /// Run and fail with [`BasekitError::CommandFailed`] on a non-zero exit.
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        ensure_success(spec, self.output(spec).await?)
    }

    async fn succeeds(&self, spec: &CommandSpec) -> Result<bool> {
        Ok(self.output(spec).await?.success())
    }
}

/// Runs commands on the host with tokio.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

const STREAM_CHUNK: usize = 64 * 1024;

impl SystemRunner {
    fn spawn(spec: &CommandSpec, stdin: Stdio) -> Result<Child> {
        debug!(command = %spec.display(), "spawning");
        Command::new(&spec.program)
            .args(&spec.args)
            .envs(spec.envs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(stdin)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    BasekitError::ToolMissing {
                        tool: spec.program.clone(),
                    }
                } else {
                    BasekitError::io(&spec.program, e)
                }
            })
    }

    async fn finish(
        spec: &CommandSpec,
        mut child: Child,
        stdout: Option<JoinHandle<Vec<u8>>>,
        stderr: JoinHandle<Vec<u8>>,
    ) -> Result<CommandOutput> {
        let status = child
            .wait()
            .await
            .map_err(|e| BasekitError::io(&spec.program, e))?;
        debug!(command = %spec.display(), code = ?status.code(), "finished");
        Ok(CommandOutput {
            code: status.code(),
            stdout: match stdout {
                Some(task) => task.await.unwrap_or_default(),
                None => Vec::new(),
            },
            stderr: stderr.await.unwrap_or_default(),
        })
    }
}

/// Read a child pipe to the end on its own task so the child never blocks
/// on a full pipe.
fn drain<R>(pipe: Option<R>) -> JoinHandle<Vec<u8>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf).await;
        }
        buf
    })
}

fn stream_error(spec: &CommandSpec, source: std::io::Error) -> BasekitError {
    BasekitError::Stream {
        command: spec.display(),
        source,
    }
}

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn output(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        let stdin = if spec.stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        };
        let mut child = Self::spawn(spec, stdin)?;

        // Feed stdin from a separate task so a chatty child can't deadlock us.
        if let Some(input) = spec.stdin.clone()
            && let Some(mut stdin) = child.stdin.take()
        {
            tokio::spawn(async move {
                let _ = stdin.write_all(&input).await;
            });
        }

        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());
        Self::finish(spec, child, Some(stdout), stderr).await
    }

    async fn stream_to(
        &self,
        spec: &CommandSpec,
        sink: &mut (dyn Write + Send),
    ) -> Result<(CommandOutput, u64)> {
        let mut child = Self::spawn(spec, Stdio::null())?;
        let stderr = drain(child.stderr.take());

        let mut copied = 0u64;
        if let Some(mut stdout) = child.stdout.take() {
            let mut chunk = vec![0u8; STREAM_CHUNK];
            loop {
                let n = stdout
                    .read(&mut chunk)
                    .await
                    .map_err(|e| stream_error(spec, e))?;
                if n == 0 {
                    break;
                }
                sink.write_all(&chunk[..n])
                    .map_err(|e| stream_error(spec, e))?;
                copied += n as u64;
            }
        }

        let output = Self::finish(spec, child, None, stderr).await?;
        Ok((output, copied))
    }

    async fn stream_from(
        &self,
        spec: &CommandSpec,
        source: &mut (dyn Read + Send),
    ) -> Result<CommandOutput> {
        let mut child = Self::spawn(spec, Stdio::piped())?;
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        if let Some(mut stdin) = child.stdin.take() {
            let mut chunk = vec![0u8; STREAM_CHUNK];
            loop {
                let n = source.read(&mut chunk).map_err(|e| stream_error(spec, e))?;
                if n == 0 {
                    break;
                }
                if let Err(e) = stdin.write_all(&chunk[..n]).await {
                    // The child stopped reading; its exit status says why.
                    if e.kind() == std::io::ErrorKind::BrokenPipe {
                        break;
                    }
                    return Err(stream_error(spec, e));
                }
            }
        }

        Self::finish(spec, child, Some(stdout), stderr).await
    }
}

/// Fail fast with [`BasekitError::ToolMissing`] if any tool can't be spawned.
pub async fn require_tools(runner: &dyn CommandRunner, tools: &[&str]) -> Result<()> {
    for tool in tools {
        runner
            .output(&CommandSpec::new(*tool).arg("--version"))
            .await?;
    }
    Ok(())
}


#[cfg(test)]
mod tests {
    use super::testing::ScriptedRunner;
    use super::*;

    #[test]
    fn display_joins_program_and_args() {
        let spec = CommandSpec::new("git").args(["push", "-u", "origin", "main"]);
        assert_eq!(spec.display(), "git push -u origin main");
    }

    #[test]
    fn command_line_splitting() {
        let spec = CommandSpec::from_command_line("  python manage.py test  --parallel ").unwrap();
        assert_eq!(spec.program, "python");
        assert_eq!(spec.args, vec!["manage.py", "test", "--parallel"]);
        assert!(CommandSpec::from_command_line("   ").is_none());
    }

    #[tokio::test]
    async fn run_turns_nonzero_exit_into_error() {
        let runner = ScriptedRunner::new().on("git push", CommandOutput::failed(1, "rejected"));
        let err = runner
            .run(&CommandSpec::new("git").arg("push"))
            .await
            .unwrap_err();
        match err {
            BasekitError::CommandFailed { command, stderr, .. } => {
                assert_eq!(command, "git push");
                assert_eq!(stderr, "rejected");
            }
            other => panic!("Expected CommandFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn require_tools_reports_missing_tool() {
        let runner = ScriptedRunner::new().missing("gh");
        let err = require_tools(&runner, &["git", "gh"]).await.unwrap_err();
        assert!(matches!(err, BasekitError::ToolMissing { tool } if tool == "gh"));
    }

    #[tokio::test]
    async fn system_runner_reports_missing_binary() {
        let err = SystemRunner
            .output(&CommandSpec::new("basekit-definitely-not-a-real-tool"))
            .await
            .unwrap_err();
        assert!(matches!(err, BasekitError::ToolMissing { .. }));
    }

    #[tokio::test]
    async fn system_runner_streams_stdout_into_sink() {
        let mut sink = Vec::new();
        let (output, copied) = SystemRunner
            .stream_to(&CommandSpec::new("printf").arg("hello"), &mut sink)
            .await
            .unwrap();
        assert!(output.success());
        assert!(output.stdout.is_empty());
        assert_eq!(copied, 5);
        assert_eq!(sink, b"hello");
    }

    #[tokio::test]
    async fn system_runner_streams_source_into_stdin() {
        let mut source = std::io::Cursor::new(b"one\ntwo\nthree\n".to_vec());
        let output = SystemRunner
            .stream_from(&CommandSpec::new("wc").arg("-l"), &mut source)
            .await
            .unwrap();
        assert!(output.success());
        assert_eq!(output.stdout_text(), "3");
    }
}
