//! Live process runner.
//!
//! Spawns the tool as a child process, echoes its stdout and stderr line by
//! line while they are produced, and enforces a wall-clock timeout.

use std::io::{self, BufRead, BufReader, Read};
use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::error::{RunnerError, RunnerResult};
use crate::invocation::Invocation;
use crate::runner::{ExecutionResult, ToolRunner};

/// Environment injected when the tool is the LocalStack `tflocal` wrapper.
/// Applied before the invocation's own overrides, so an explicit override of
/// one of these variables takes precedence over the LocalStack default.
const LOCALSTACK_ENV: &[(&str, &str)] = &[
    ("AWS_ACCESS_KEY_ID", "test"),
    ("AWS_SECRET_ACCESS_KEY", "test"),
    ("AWS_REGION", "us-east-1"),
    ("AWS_ENDPOINT_URL", "http://localhost:4566"),
];

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Consecutive read failures after which a reader gives up on its stream.
const MAX_READ_ERRORS: u32 = 16;

/// Log output from the child process.
#[derive(Debug, Clone)]
pub struct LogLine {
    pub timestamp: chrono::DateTime<Utc>,
    pub stream: LogStream,
    pub label: Option<String>,
    pub message: String,
}

/// Log stream type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogStream {
    Stdout,
    Stderr,
}

impl std::fmt::Display for LogStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stdout => write!(f, "stdout"),
            Self::Stderr => write!(f, "stderr"),
        }
    }
}

/// Log handler callback type.
pub type LogHandler = Arc<dyn Fn(LogLine) + Send + Sync>;

/// Process runner options.
#[derive(Debug, Clone)]
pub struct ProcessRunnerOptions {
    /// Kill the child after this long (zero = no timeout)
    pub timeout: Duration,
    /// CI mode (timestamped log lines)
    pub ci_mode: bool,
    /// Echo child output to the terminal
    pub echo_output: bool,
}

impl Default for ProcessRunnerOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(3600),
            ci_mode: std::env::var("CI").is_ok(),
            echo_output: true,
        }
    }
}

impl ProcessRunnerOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn ci_mode(mut self) -> Self {
        self.ci_mode = true;
        self
    }

    pub fn quiet(mut self) -> Self {
        self.echo_output = false;
        self
    }
}

/// Runs the tool as a real child process.
#[derive(Clone)]
pub struct ProcessRunner {
    options: ProcessRunnerOptions,
    log_handler: Option<LogHandler>,
}

impl ProcessRunner {
    pub fn new(options: ProcessRunnerOptions) -> Self {
        Self {
            options,
            log_handler: None,
        }
    }

    /// Set a log handler for streaming logs.
    pub fn with_log_handler(mut self, handler: LogHandler) -> Self {
        self.log_handler = Some(handler);
        self
    }

    pub fn options(&self) -> &ProcessRunnerOptions {
        &self.options
    }

    fn build_command(&self, invocation: &Invocation) -> Command {
        let mut cmd = Command::new(&invocation.program);
        cmd.args(&invocation.args)
            .current_dir(&invocation.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        if is_localstack(&invocation.program) {
            cmd.envs(LOCALSTACK_ENV.iter().copied());
        }
        cmd.envs(&invocation.env);
        cmd
    }

    /// Drain one output stream on its own thread.
    fn spawn_reader<R>(
        &self,
        source: R,
        stream: LogStream,
        label: Option<String>,
        combined: Arc<Mutex<String>>,
    ) -> JoinHandle<()>
    where
        R: Read + Send + 'static,
    {
        let ci_mode = self.options.ci_mode;
        let echo = self.options.echo_output;
        let handler = self.log_handler.clone();

        std::thread::spawn(move || {
            let mut reader = BufReader::new(source);
            let mut buf = Vec::new();
            let mut read_errors = 0;
            loop {
                buf.clear();
                match reader.read_until(b'\n', &mut buf) {
                    Ok(0) => break,
                    Ok(_) => read_errors = 0,
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => {
                        // Keep draining: a closed pipe would kill the child.
                        warn!("Failed to read child {}: {}", stream, e);
                        read_errors += 1;
                        if read_errors >= MAX_READ_ERRORS {
                            break;
                        }
                        continue;
                    }
                }

                let line = String::from_utf8_lossy(&buf);
                let line = line.trim_end_matches(['\n', '\r']).to_string();
                {
                    let mut output = combined.lock();
                    output.push_str(&line);
                    output.push('\n');
                }

                let log_line = LogLine {
                    timestamp: Utc::now(),
                    stream,
                    label: label.clone(),
                    message: line,
                };

                if echo {
                    println!("{}", format_line(&log_line, ci_mode));
                }
                if let Some(handler) = &handler {
                    handler(log_line);
                }
            }
        })
    }

    /// Execute an invocation, blocking the current thread until it exits.
    fn execute_blocking(&self, invocation: &Invocation) -> RunnerResult<ExecutionResult> {
        let command = invocation.display_command();

        if !invocation.working_dir.is_dir() {
            return Err(RunnerError::Spawn(format!(
                "working directory {} does not exist",
                invocation.working_dir.display()
            )));
        }

        info!("Executing: {} in {:?}", command, invocation.working_dir);
        if !invocation.env.is_empty() {
            debug!("Environment overrides: {:?}", invocation.env);
        }

        let started_at = Utc::now();
        let start = Instant::now();

        let mut child = self
            .build_command(invocation)
            .spawn()
            .map_err(|e| match e.kind() {
                io::ErrorKind::NotFound => RunnerError::BinaryNotFound(invocation.program.clone()),
                _ => RunnerError::Spawn(format!("failed to spawn {}: {}", invocation.program, e)),
            })?;

        let combined = Arc::new(Mutex::new(String::new()));
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| RunnerError::Spawn("child stdout was not captured".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| RunnerError::Spawn("child stderr was not captured".to_string()))?;

        let readers = [
            self.spawn_reader(stdout, LogStream::Stdout, invocation.label.clone(), Arc::clone(&combined)),
            self.spawn_reader(stderr, LogStream::Stderr, invocation.label.clone(), Arc::clone(&combined)),
        ];

        let timeout = self.options.timeout;
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) => {
                    if !timeout.is_zero() && start.elapsed() > timeout {
                        // Readers are left detached: grandchildren may still hold the pipes.
                        let _ = child.kill();
                        let _ = child.wait();
                        error!("Timed out after {}s: {}", timeout.as_secs(), command);
                        return Err(RunnerError::Timeout {
                            command,
                            seconds: timeout.as_secs(),
                        });
                    }
                    std::thread::sleep(POLL_INTERVAL);
                }
                Err(e) => {
                    let _ = child.kill();
                    return Err(RunnerError::Spawn(format!(
                        "failed to wait for process: {}",
                        e
                    )));
                }
            }
        };

        for reader in readers {
            let _ = reader.join();
        }

        let finished_at = Utc::now();
        let duration_ms = start.elapsed().as_millis() as u64;
        let exit_code = status.code().unwrap_or(-1);
        let output = std::mem::take(&mut *combined.lock());

        if exit_code != 0 {
            error!(
                "Command failed with exit code {} after {}ms: {}",
                exit_code, duration_ms, command
            );
            return Err(RunnerError::ExecutionFailed {
                command,
                exit_code,
                output,
            });
        }

        info!("Command completed successfully in {}ms", duration_ms);
        Ok(ExecutionResult {
            exit_code,
            output,
            started_at,
            finished_at,
            duration_ms,
        })
    }
}

#[async_trait]
impl ToolRunner for ProcessRunner {
    async fn run(&self, invocation: &Invocation) -> RunnerResult<ExecutionResult> {
        let runner = self.clone();
        let invocation = invocation.clone();

        tokio::task::spawn_blocking(move || runner.execute_blocking(&invocation))
            .await
            .map_err(|e| RunnerError::Spawn(format!("execution task failed: {}", e)))?
    }
}

fn is_localstack(program: &str) -> bool {
    Path::new(program)
        .file_name()
        .and_then(|name| name.to_str())
        .map(|name| name.eq_ignore_ascii_case("tflocal"))
        .unwrap_or(false)
}

/// Terminal rendering of one output line: `[label] ` prefix, and in CI mode
/// an RFC 3339 timestamp and the stream name in front of that.
pub fn format_line(line: &LogLine, ci_mode: bool) -> String {
    let prefix = line
        .label
        .as_ref()
        .map(|label| format!("[{}] ", label))
        .unwrap_or_default();

    if ci_mode {
        format!(
            "[{}] [{}] {}{}",
            line.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
            line.stream,
            prefix,
            line.message
        )
    } else {
        format!("{}{}", prefix, line.message)
    }
}
