use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use thiserror::Error;
use wait_timeout::ChildExt;

#[derive(Debug, Error)]
pub enum ShellError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Command `{0}` timed out after {1:?}")]
    Timeout(String, Duration),
    #[error("Command `{command}` failed with status {status}")]
    CommandFailed {
        command: String,
        status: ExitStatus,
        stdout: String,
        stderr: String,
    },
    #[error("Command output was not valid UTF-8")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),
}

impl ShellError {
    /// Returns the stderr captured from a failed command, if any.
    pub fn stderr(&self) -> Option<&str> {
        match self {
            ShellError::CommandFailed { stderr, .. } => Some(stderr),
            _ => None,
        }
    }

    /// Returns the stdout captured from a failed command, if any.
    pub fn stdout(&self) -> Option<&str> {
        match self {
            ShellError::CommandFailed { stdout, .. } => Some(stdout),
            _ => None,
        }
    }
}

/// What a successful command printed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellOutput {
    pub stdout: String,
    pub stderr: String,
}

/// A shell command invocation: the command line plus where and how to run it.
#[derive(Debug, Clone)]
pub struct ShellCommand {
    command: String,
    cwd: Option<PathBuf>,
    env: Vec<(String, String)>,
    timeout: Option<Duration>,
}

impl ShellCommand {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            cwd: None,
            env: Vec::new(),
            timeout: None,
        }
    }

    /// Runs the command from `dir` instead of the current directory.
    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.cwd = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Kills the process if it runs longer than `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    /// Execute the command with `input` piped to stdin.
    ///
    /// Blocks until the process exits. Both stdout and stderr are buffered in
    /// memory; a non-zero exit becomes [`ShellError::CommandFailed`] carrying
    /// whatever the process printed.
    pub fn run(&self, input: &str) -> Result<ShellOutput, ShellError> {
        let mut cmd = if cfg!(target_os = "windows") {
            let mut c = Command::new("cmd");
            c.arg("/C").arg(&self.command);
            c
        } else {
            let mut c = Command::new("sh");
            c.arg("-c").arg(&self.command);
            c
        };

        if let Some(dir) = &self.cwd {
            cmd.current_dir(dir);
        }
        cmd.envs(self.env.iter().map(|(k, v)| (k.as_str(), v.as_str())));

        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = cmd.spawn()?;

        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());
        let stdin = feed(child.stdin.take(), input);

        let status = self.wait(&mut child)?;

        if let Some(writer) = stdin {
            writer
                .join()
                .map_err(|_| std::io::Error::other("stdin writer thread panicked"))??;
        }

        let stdout = collect(stdout)?;
        let stderr = String::from_utf8_lossy(&collect(stderr)?).into_owned();

        if !status.success() {
            return Err(ShellError::CommandFailed {
                command: self.command.clone(),
                status,
                stdout: String::from_utf8_lossy(&stdout).into_owned(),
                stderr,
            });
        }

        Ok(ShellOutput {
            stdout: String::from_utf8(stdout)?,
            stderr,
        })
    }

    fn wait(&self, child: &mut Child) -> Result<ExitStatus, ShellError> {
        match self.timeout {
            Some(duration) => match child.wait_timeout(duration)? {
                Some(status) => Ok(status),
                None => {
                    child.kill()?;
                    child.wait()?;
                    Err(ShellError::Timeout(self.command.clone(), duration))
                }
            },
            None => Ok(child.wait()?),
        }
    }
}

type Drain = Option<JoinHandle<std::io::Result<Vec<u8>>>>;

fn drain<R: Read + Send + 'static>(stream: Option<R>) -> Drain {
    stream.map(|mut s| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            s.read_to_end(&mut buf)?;
            Ok(buf)
        })
    })
}

/// Writes `input` to the child's stdin off the calling thread, so a child
/// that never reads cannot stall the timeout. Dropping the handle closes stdin.
fn feed(stdin: Option<ChildStdin>, input: &str) -> Option<JoinHandle<std::io::Result<()>>> {
    let input = input.as_bytes().to_vec();
    stdin.map(|mut stdin| {
        thread::spawn(move || match stdin.write_all(&input) {
            // The script is free to ignore its stdin and exit early.
            Err(e) if e.kind() == ErrorKind::BrokenPipe => Ok(()),
            other => other,
        })
    })
}

fn collect(handle: Drain) -> Result<Vec<u8>, ShellError> {
    let Some(handle) = handle else {
        return Ok(Vec::new());
    };
    let bytes = handle
        .join()
        .map_err(|_| std::io::Error::other("output reader thread panicked"))??;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_echo() {
        let output = ShellCommand::new("echo hello").run("").unwrap();
        assert!(output.stdout.trim().contains("hello"));
    }

    #[test]
    fn test_input_piping() {
        let cmd = if cfg!(windows) {
            "findstr foo"
        } else {
            "grep foo"
        };
        let output = ShellCommand::new(cmd).run("foo\nbar\nbaz").unwrap();
        assert_eq!(output.stdout.trim(), "foo");
    }

    #[test]
    fn test_script_ignoring_stdin() {
        let output = ShellCommand::new("echo done").run(&"x".repeat(1024)).unwrap();
        assert_eq!(output.stdout.trim(), "done");
    }

    #[cfg(unix)]
    #[test]
    fn test_env_and_cwd() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("marker.txt"), "present").unwrap();

        let output = ShellCommand::new("cat marker.txt; printf ' %s' \"$HYPERLOOP_EVENT\"")
            .current_dir(dir.path())
            .env("HYPERLOOP_EVENT", "build.pre.execute")
            .run("")
            .unwrap();

        assert_eq!(output.stdout, "present build.pre.execute");
    }

    #[cfg(unix)]
    #[test]
    fn test_timeout() {
        let start = std::time::Instant::now();
        let res = ShellCommand::new("sleep 2")
            .with_timeout(Duration::from_millis(500))
            .run("");
        assert!(matches!(res, Err(ShellError::Timeout(_, _))));
        assert!(start.elapsed() < Duration::from_secs(2));
    }

    #[cfg(unix)]
    #[test]
    fn test_timeout_with_unread_large_input() {
        let start = std::time::Instant::now();
        let res = ShellCommand::new("sleep 3")
            .with_timeout(Duration::from_millis(300))
            .run(&"x".repeat(1 << 20));
        assert!(matches!(res, Err(ShellError::Timeout(_, _))));
        assert!(start.elapsed() < Duration::from_secs(3));
    }

    #[cfg(unix)]
    #[test]
    fn test_failure_with_invalid_utf8_stdout_keeps_stderr() {
        let res = ShellCommand::new("printf '\\377'; echo oops >&2; exit 4").run("");
        match res {
            Err(err @ ShellError::CommandFailed { .. }) => {
                assert_eq!(err.stderr().map(str::trim), Some("oops"));
                assert!(err.to_string().contains("exit status: 4"));
            }
            other => panic!("Expected CommandFailed error, got {:?}", other),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_command_failed_keeps_output() {
        let res = ShellCommand::new("echo partial; echo broken >&2; exit 3").run("");
        match res {
            Err(err @ ShellError::CommandFailed { .. }) => {
                assert_eq!(err.stdout().map(str::trim), Some("partial"));
                assert_eq!(err.stderr().map(str::trim), Some("broken"));
                assert!(err.to_string().contains("exit 3"));
            }
            other => panic!("Expected CommandFailed error, got {:?}", other),
        }
    }
}
