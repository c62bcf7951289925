//! Command Runner: external processes with optional streamed log files.

use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::debug;

use docfleet_shared::{DocfleetError, Result};

/// A process to run.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    program: OsString,
    args: Vec<OsString>,
    cwd: Option<PathBuf>,
    env: Vec<(String, String)>,
    log_file: Option<PathBuf>,
    append_log: bool,
}

impl CommandSpec {
    pub fn new(program: impl AsRef<OsStr>) -> Self {
        Self {
            program: program.as_ref().to_os_string(),
            args: Vec::new(),
            cwd: None,
            env: Vec::new(),
            log_file: None,
            append_log: false,
        }
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    pub fn args<I, A>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|a| a.as_ref().to_os_string()));
        self
    }

    pub fn cwd(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn envs<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.env
            .extend(vars.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Stream stdout and stderr, line by line, into `path` as well.
    pub fn log_to(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_file = Some(path.into());
        self.append_log = false;
        self
    }

    /// Like [`CommandSpec::log_to`], but keeps what the file already holds.
    pub fn append_to(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_file = Some(path.into());
        self.append_log = true;
        self
    }

    /// Program name for logs and errors.
    pub fn program_name(&self) -> String {
        self.program.to_string_lossy().into_owned()
    }

    /// Shell-like rendering for logs.
    pub fn display(&self) -> String {
        let mut out = self.program_name();
        for arg in &self.args {
            out.push(' ');
            out.push_str(&arg.to_string_lossy());
        }
        out
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .envs(self.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .kill_on_drop(true);
        if let Some(dir) = &self.cwd {
            cmd.current_dir(dir);
        }
        cmd
    }
}

/// Exit status and captured text of a finished process.
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    /// `None` when the process was killed by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Last non-empty stderr line, falling back to stdout.
    pub fn last_error_line(&self) -> &str {
        self.stderr
            .lines()
            .chain(self.stdout.lines())
            .rev()
            .find(|l| !l.trim().is_empty())
            .unwrap_or("")
    }
}

/// Run `spec` to completion. A nonzero exit is not an error here; only a
/// failure to spawn or to write the log file is.
pub async fn run(spec: &CommandSpec) -> Result<CommandOutput> {
    debug!(command = %spec.display(), "running");

    match &spec.log_file {
        None => run_captured(spec).await,
        Some(log) => run_logged(spec, log).await,
    }
}

/// Like [`run`], but a nonzero exit becomes [`DocfleetError::Process`].
pub async fn run_checked(spec: &CommandSpec) -> Result<CommandOutput> {
    let output = run(spec).await?;
    if output.success() {
        return Ok(output);
    }
    let status = match output.code {
        Some(code) => format!("exit status {code}"),
        None => "terminated by signal".to_string(),
    };
    let detail = output.last_error_line();
    let message = if detail.is_empty() {
        status
    } else {
        format!("{status}: {detail}")
    };
    Err(DocfleetError::process(spec.program_name(), message))
}

async fn run_captured(spec: &CommandSpec) -> Result<CommandOutput> {
    let output = spec
        .command()
        .output()
        .await
        .map_err(|e| spawn_error(spec, e))?;

    Ok(CommandOutput {
        code: output.status.code(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stream {
    Stdout,
    Stderr,
}

async fn run_logged(spec: &CommandSpec, log: &Path) -> Result<CommandOutput> {
    if let Some(parent) = log.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| DocfleetError::io(parent, e))?;
    }
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .write(true)
        .append(spec.append_log)
        .truncate(!spec.append_log)
        .open(log)
        .await
        .map_err(|e| DocfleetError::io(log, e))?;

    let mut child = spec
        .command()
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| spawn_error(spec, e))?;

    let (tx, mut rx) = mpsc::channel::<(Stream, String)>(256);
    if let Some(stdout) = child.stdout.take() {
        tokio::spawn(forward_lines(stdout, Stream::Stdout, tx.clone()));
    }
    if let Some(stderr) = child.stderr.take() {
        tokio::spawn(forward_lines(stderr, Stream::Stderr, tx.clone()));
    }
    drop(tx);

    let mut output = CommandOutput::default();
    while let Some((stream, line)) = rx.recv().await {
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| DocfleetError::io(log, e))?;
        file.write_all(b"\n")
            .await
            .map_err(|e| DocfleetError::io(log, e))?;

        let buf = match stream {
            Stream::Stdout => &mut output.stdout,
            Stream::Stderr => &mut output.stderr,
        };
        buf.push_str(&line);
        buf.push('\n');
    }
    file.flush().await.map_err(|e| DocfleetError::io(log, e))?;

    let status = child.wait().await.map_err(|e| spawn_error(spec, e))?;
    output.code = status.code();
    Ok(output)
}

async fn forward_lines<R>(reader: R, stream: Stream, tx: mpsc::Sender<(Stream, String)>)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if tx.send((stream, line)).await.is_err() {
            break;
        }
    }
}

fn spawn_error(spec: &CommandSpec, e: std::io::Error) -> DocfleetError {
    DocfleetError::process(
        spec.program_name(),
        format!("failed to run `{}`: {e}", spec.display()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch(label: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("docfleet-{label}-{}", uuid::Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[tokio::test]
    async fn captures_output_and_status() {
        let spec = CommandSpec::new("sh").args(["-c", "echo out; echo err >&2; exit 3"]);
        let output = run(&spec).await.unwrap();
        assert_eq!(output.code, Some(3));
        assert!(!output.success());
        assert_eq!(output.stdout.trim(), "out");
        assert_eq!(output.stderr.trim(), "err");
        assert_eq!(output.last_error_line(), "err");
    }

    #[tokio::test]
    async fn env_and_cwd_are_applied() {
        let dir = scratch("cmd-cwd");
        let spec = CommandSpec::new("sh")
            .args(["-c", "echo \"$DOCS_VERSION\"; pwd"])
            .envs([("DOCS_VERSION", "v1.2")])
            .cwd(&dir);
        let output = run_checked(&spec).await.unwrap();
        let mut lines = output.stdout.lines();
        assert_eq!(lines.next(), Some("v1.2"));
        let pwd = PathBuf::from(lines.next().unwrap());
        assert_eq!(pwd.canonicalize().unwrap(), dir.canonicalize().unwrap());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn log_file_receives_both_streams() {
        let dir = scratch("cmd-log");
        let log = dir.join("logs/build_v1.log");
        let spec = CommandSpec::new("sh")
            .args(["-c", "echo one; echo two >&2; echo three"])
            .log_to(&log);

        let output = run(&spec).await.unwrap();
        assert!(output.success());
        assert_eq!(output.stdout, "one\nthree\n");
        assert_eq!(output.stderr, "two\n");

        let logged = std::fs::read_to_string(&log).unwrap();
        for line in ["one", "two", "three"] {
            assert!(logged.lines().any(|l| l == line), "{line} missing from log");
        }

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn append_keeps_earlier_log_lines() {
        let dir = scratch("cmd-append");
        let log = dir.join("install_v1.log");
        run(&CommandSpec::new("sh").args(["-c", "echo first"]).log_to(&log))
            .await
            .unwrap();
        run(&CommandSpec::new("sh").args(["-c", "echo second"]).append_to(&log))
            .await
            .unwrap();
        assert_eq!(std::fs::read_to_string(&log).unwrap(), "first\nsecond\n");

        run(&CommandSpec::new("sh").args(["-c", "echo third"]).log_to(&log))
            .await
            .unwrap();
        assert_eq!(std::fs::read_to_string(&log).unwrap(), "third\n");

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn missing_program_is_process_error() {
        let spec = CommandSpec::new("docfleet-definitely-not-a-program");
        let err = run(&spec).await.unwrap_err();
        assert!(matches!(err, DocfleetError::Process { .. }));
    }

    #[tokio::test]
    async fn checked_failure_carries_last_line() {
        let spec = CommandSpec::new("sh").args(["-c", "echo fatal: bad ref >&2; exit 128"]);
        let err = run_checked(&spec).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "process error (sh): exit status 128: fatal: bad ref"
        );
    }
}
