//! Child-process runner shared by the process-backed build tools.

use crate::errors::BuildError;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;

/// Number of trailing output lines kept per stream.
pub const OUTPUT_TAIL_LINES: usize = 20;

/// Longest line kept from a child's output; the rest of the line is dropped.
pub const MAX_LINE_BYTES: usize = 4096;

/// A command line to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    /// Program to execute.
    pub program: String,
    /// Arguments.
    pub args: Vec<String>,
    /// Extra environment variables.
    pub envs: Vec<(String, String)>,
    /// Working directory, inherited when unset.
    pub current_dir: Option<PathBuf>,
}

impl CommandSpec {
    /// Creates a command with no arguments.
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            envs: Vec::new(),
            current_dir: None,
        }
    }

    /// Appends one argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Appends several arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Sets an environment variable for the child.
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    /// Sets the working directory.
    #[must_use]
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    /// Renders the command for logs.
    #[must_use]
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Captured result of a successful command.
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    /// Last [`OUTPUT_TAIL_LINES`] lines of stdout.
    pub stdout_tail: String,
    /// Last [`OUTPUT_TAIL_LINES`] lines of stderr.
    pub stderr_tail: String,
}

/// Runs a command to completion.
///
/// Both streams are drained while the child runs: every line is logged at
/// debug level under the `stream` field and only the last
/// [`OUTPUT_TAIL_LINES`] lines of each are kept, so memory stays bounded
/// however much the tool prints.
///
/// The child is killed if the returned future is dropped, so aborting the
/// job that awaits it also stops the external tool.
///
/// # Errors
///
/// Returns `BuildError::Spawn` if the program cannot be started and
/// `BuildError::NonZeroExit` with the stderr tail if it fails.
pub async fn run_command(spec: &CommandSpec) -> Result<CommandOutput, BuildError> {
    tracing::debug!(command = %spec.display(), "Running build command");

    let mut command = Command::new(&spec.program);
    command
        .args(&spec.args)
        .envs(spec.envs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(dir) = &spec.current_dir {
        command.current_dir(dir);
    }

    let spawn_error = |reason: String| BuildError::Spawn {
        program: spec.program.clone(),
        reason,
    };
    let mut child = command.spawn().map_err(|e| spawn_error(e.to_string()))?;
    let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
        return Err(spawn_error("output pipes were not captured".to_string()));
    };

    let (stdout_tail, stderr_tail, status) = tokio::join!(
        drain_lines(stdout, &spec.program, "stdout"),
        drain_lines(stderr, &spec.program, "stderr"),
        child.wait(),
    );
    let status = status?;
    let stdout_tail = stdout_tail?;
    let stderr_tail = stderr_tail?;

    if !status.success() {
        return Err(BuildError::NonZeroExit {
            program: spec.program.clone(),
            code: status.code(),
            stderr_tail,
        });
    }

    Ok(CommandOutput {
        stdout_tail,
        stderr_tail,
    })
}

/// Reads `reader` to the end, logging each line and returning the tail.
async fn drain_lines<R>(reader: R, program: &str, stream: &str) -> std::io::Result<String>
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut tail = LineTail::new(OUTPUT_TAIL_LINES);
    let mut line = Vec::new();

    loop {
        let buf = reader.fill_buf().await?;
        if buf.is_empty() {
            break;
        }
        let (chunk, consumed, complete) = match buf.iter().position(|&b| b == b'\n') {
            Some(end) => (&buf[..end], end + 1, true),
            None => (buf, buf.len(), false),
        };
        let room = MAX_LINE_BYTES.saturating_sub(line.len());
        line.extend_from_slice(&chunk[..chunk.len().min(room)]);
        reader.consume(consumed);

        if complete {
            tail.push(&line, program, stream);
            line.clear();
        }
    }
    if !line.is_empty() {
        tail.push(&line, program, stream);
    }
    Ok(tail.render())
}

struct LineTail {
    lines: VecDeque<String>,
    limit: usize,
}

impl LineTail {
    fn new(limit: usize) -> Self {
        Self {
            lines: VecDeque::with_capacity(limit),
            limit,
        }
    }

    fn push(&mut self, raw: &[u8], program: &str, stream: &str) {
        let text = String::from_utf8_lossy(raw);
        let text = text.trim_end_matches('\r');
        tracing::debug!(program, stream, "{text}");

        if self.limit == 0 {
            return;
        }
        if self.lines.len() == self.limit {
            self.lines.pop_front();
        }
        self.lines.push_back(text.to_string());
    }

    fn render(&self) -> String {
        self.lines.iter().map(String::as_str).collect::<Vec<_>>().join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tail_keeps_last_lines() {
        let mut tail = LineTail::new(3);
        for i in 1..=30 {
            tail.push(i.to_string().as_bytes(), "sh", "stdout");
        }
        assert_eq!(tail.render(), "28\n29\n30");
        assert_eq!(LineTail::new(3).render(), "");
    }

    #[tokio::test]
    async fn test_drain_lines_bounds_long_lines_and_strips_cr() {
        let mut input = vec![b'x'; MAX_LINE_BYTES * 3];
        input.extend_from_slice(b"\nlast\r\n");

        let tail = drain_lines(input.as_slice(), "sh", "stdout").await.unwrap();
        let lines: Vec<&str> = tail.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].len(), MAX_LINE_BYTES);
        assert_eq!(lines[1], "last");
    }

    #[test]
    fn test_display() {
        let spec = CommandSpec::new("python3").args(["-m", "build"]).arg("--sdist");
        assert_eq!(spec.display(), "python3 -m build --sdist");
    }

    #[tokio::test]
    async fn test_missing_program_is_spawn_error() {
        let err = run_command(&CommandSpec::new("releaseflow-definitely-not-a-program"))
            .await
            .unwrap_err();
        assert!(matches!(err, BuildError::Spawn { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_non_zero_exit_carries_stderr_tail() {
        let spec = CommandSpec::new("sh").args(["-c", "echo boom >&2; exit 7"]);
        match run_command(&spec).await.unwrap_err() {
            BuildError::NonZeroExit {
                code, stderr_tail, ..
            } => {
                assert_eq!(code, Some(7));
                assert_eq!(stderr_tail, "boom");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_env_and_cwd_are_applied() {
        let tmp = tempfile::tempdir().unwrap();
        let spec = CommandSpec::new("sh")
            .args(["-c", "echo $RF_TEST_VALUE; pwd"])
            .env("RF_TEST_VALUE", "hello")
            .current_dir(tmp.path());

        let output = run_command(&spec).await.unwrap();
        let mut lines = output.stdout_tail.lines();
        assert_eq!(lines.next(), Some("hello"));
        let cwd = std::path::PathBuf::from(lines.next().unwrap());
        assert_eq!(
            cwd.canonicalize().unwrap(),
            tmp.path().canonicalize().unwrap()
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_large_output_keeps_only_the_tail() {
        let spec = CommandSpec::new("sh").args([
            "-c",
            "i=0; while [ $i -lt 5000 ]; do echo \"line $i\"; echo \"err $i\" >&2; i=$((i+1)); done",
        ]);

        let output = run_command(&spec).await.unwrap();

        let stdout: Vec<&str> = output.stdout_tail.lines().collect();
        assert_eq!(stdout.len(), OUTPUT_TAIL_LINES);
        assert_eq!(stdout.first().copied(), Some("line 4980"));
        assert_eq!(stdout.last().copied(), Some("line 4999"));
        let stderr: Vec<&str> = output.stderr_tail.lines().collect();
        assert_eq!(stderr.len(), OUTPUT_TAIL_LINES);
        assert_eq!(stderr.last().copied(), Some("err 4999"));
    }
}
