//! Subprocess client for the external LLM command-line tool.
//!
//! Each logical call writes the prompt to a scratch file, launches the tool
//! with the configured flags, and folds its line-delimited JSON stdout into
//! the answer text as it arrives. The call is bounded by a wall-clock timeout
//! measured from process start; on expiry the child is killed. Failed runs
//! (spawn error, timeout, non-zero exit) are retried with a fresh process.
//!
//! The scratch file is a [`tempfile::NamedTempFile`], so it is removed on
//! every exit path, panics included.

use std::io::{self, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::Arc;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use tempfile::NamedTempFile;
use tracing::{debug, info, trace, warn};

use crate::core::retry::RetryPolicy;
use crate::core::stream::{LineScanner, Transcript, decode_line};
use crate::infra::logging::LogSink;

/// Placeholder in [`ClientOptions::args`] replaced by the prompt file path.
pub const PROMPT_FILE_PLACEHOLDER: &str = "{prompt_file}";

/// Poll interval while waiting for the child to exit after stdout closed.
const EXIT_POLL: Duration = Duration::from_millis(25);

/// Floor for the heartbeat period so a zero setting cannot spin.
const MIN_HEARTBEAT: Duration = Duration::from_millis(10);

/// Anything that can turn a prompt into text.
///
/// [`StreamingProcessClient`] is the production implementation; tests plug in
/// scripted models.
pub trait LanguageModel {
    fn complete(
        &self,
        prompt: &str,
    ) -> Result<String, LlmError>;
}

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("failed to launch `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("I/O error while running `{program}`: {source}")]
    Io {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("`{program}` timed out after {after:?}")]
    Timeout { program: String, after: Duration },

    #[error("`{program}` exited with {}: {}", describe_exit(.code), .stderr.trim())]
    Exit {
        program: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("could not prepare prompt file: {0}")]
    Scratch(#[source] io::Error),
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("code {code}"),
        None => "a signal".to_string(),
    }
}

impl LlmError {
    /// Failures worth another attempt with a fresh process.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, LlmError::Scratch(_))
    }
}

/// How to launch the tool and how long to wait for it.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub program: String,
    pub args: Vec<String>,
    pub timeout: Duration,
    pub heartbeat: Duration,
    pub retry: RetryPolicy,
    /// Where prompt files go; the OS temp dir when unset
    pub scratch_dir: Option<PathBuf>,
    /// Working directory for the tool; inherited when unset
    pub working_dir: Option<PathBuf>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            program: "claude".to_string(),
            args: default_tool_args(),
            timeout: Duration::from_secs(300),
            heartbeat: Duration::from_secs(10),
            retry: RetryPolicy::new(4).with_backoff(Duration::from_millis(500)),
            scratch_dir: None,
            working_dir: None,
        }
    }
}

/// Flags requesting streaming structured output from the default tool.
pub fn default_tool_args() -> Vec<String> {
    [
        "-p",
        PROMPT_FILE_PLACEHOLDER,
        "--output-format",
        "stream-json",
        "--dangerously-skip-permissions",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

pub struct StreamingProcessClient {
    options: ClientOptions,
    sink: Arc<dyn LogSink>,
}

impl StreamingProcessClient {
    pub fn new(
        options: ClientOptions,
        sink: Arc<dyn LogSink>,
    ) -> Self {
        Self { options, sink }
    }

    /// Full argument list for one launch.
    fn render_args(
        &self,
        prompt_file: &Path,
    ) -> Vec<String> {
        let path = prompt_file.to_string_lossy();
        let mut substituted = false;

        let mut args: Vec<String> = self
            .options
            .args
            .iter()
            .map(|arg| {
                if arg.contains(PROMPT_FILE_PLACEHOLDER) {
                    substituted = true;
                    arg.replace(PROMPT_FILE_PLACEHOLDER, &path)
                } else {
                    arg.clone()
                }
            })
            .collect();

        if !substituted {
            args.push(path.into_owned());
        }
        args
    }

    fn write_scratch(
        &self,
        prompt: &str,
    ) -> Result<NamedTempFile, LlmError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("gfactor-prompt-").suffix(".txt");

        let mut file = match &self.options.scratch_dir {
            Some(dir) => builder.tempfile_in(dir),
            None => builder.tempfile(),
        }
        .map_err(LlmError::Scratch)?;

        file.write_all(prompt.as_bytes())
            .and_then(|_| file.flush())
            .map_err(LlmError::Scratch)?;
        Ok(file)
    }

    /// One launch of the tool: spawn, stream, wait, classify.
    fn run_once(
        &self,
        prompt_file: &Path,
    ) -> Result<String, LlmError> {
        let program = self.options.program.clone();
        let args = self.render_args(prompt_file);

        let mut cmd = Command::new(&program);
        cmd.args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &self.options.working_dir {
            cmd.current_dir(dir);
        }

        debug!(%program, ?args, "launching LLM tool");
        let mut child = cmd.spawn().map_err(|source| {
            if source.kind() == io::ErrorKind::NotFound {
                self.sink
                    .log(&format!("LLM tool `{program}` was not found on PATH"));
            }
            LlmError::Spawn {
                program: program.clone(),
                source,
            }
        })?;

        let started = Instant::now();
        let deadline = started + self.options.timeout;
        let heartbeat = self.options.heartbeat.max(MIN_HEARTBEAT);
        let mut next_beat = started + heartbeat;
        info!(pid = child.id(), %program, "LLM tool started");

        let lines = spawn_stdout_reader(&mut child);
        let stderr = spawn_stderr_reader(&mut child);
        let mut transcript = Transcript::default();

        // Stream stdout until the child closes it
        while let Some(rx) = &lines {
            let now = Instant::now();
            if now >= deadline {
                return Err(self.kill_for_timeout(&mut child));
            }
            if now >= next_beat {
                self.beat(&child, started);
                next_beat += heartbeat;
                continue;
            }

            match rx.recv_timeout(deadline.min(next_beat) - now) {
                Ok(line) => {
                    trace!(%line, "stream line");
                    transcript.apply(decode_line(&line));
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        let status = self.wait_until(&mut child, deadline, started, &mut next_beat, heartbeat)?;
        let stderr_text = self.collect_stderr(stderr, &child, deadline)?;

        if !status.success() {
            self.sink.log(&format!(
                "LLM tool exited with {}",
                describe_exit(&status.code())
            ));
            return Err(LlmError::Exit {
                program,
                code: status.code(),
                stderr: stderr_text,
            });
        }

        if !transcript.errors().is_empty() {
            warn!(
                count = transcript.errors().len(),
                "LLM stream reported errors but the tool exited cleanly"
            );
        }
        debug!(elapsed_ms = started.elapsed().as_millis() as u64, "LLM tool finished");
        Ok(transcript.finish())
    }

    /// Wait for exit after stdout has closed, still honouring the deadline.
    fn wait_until(
        &self,
        child: &mut Child,
        deadline: Instant,
        started: Instant,
        next_beat: &mut Instant,
        heartbeat: Duration,
    ) -> Result<ExitStatus, LlmError> {
        loop {
            let polled = child.try_wait().map_err(|source| LlmError::Io {
                program: self.options.program.clone(),
                source,
            })?;
            if let Some(status) = polled {
                return Ok(status);
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(self.kill_for_timeout(child));
            }
            if now >= *next_beat {
                self.beat(child, started);
                *next_beat += heartbeat;
            }
            thread::sleep(EXIT_POLL.min(deadline - now));
        }
    }

    /// Stderr of an exited child. A helper process that inherited the pipe
    /// can keep it open past exit, so the wait is bounded by the deadline.
    fn collect_stderr(
        &self,
        stderr: Option<mpsc::Receiver<String>>,
        child: &Child,
        deadline: Instant,
    ) -> Result<String, LlmError> {
        let Some(rx) = stderr else {
            return Ok(String::new());
        };
        let left = deadline.saturating_duration_since(Instant::now());
        match rx.recv_timeout(left) {
            Ok(text) => Ok(text),
            Err(RecvTimeoutError::Disconnected) => Ok(String::new()),
            Err(RecvTimeoutError::Timeout) => {
                let after = self.options.timeout;
                self.sink.log(&format!(
                    "LLM process {} exited but its stderr stayed open past {after:?}; giving up",
                    child.id()
                ));
                Err(LlmError::Timeout {
                    program: self.options.program.clone(),
                    after,
                })
            }
        }
    }

    fn beat(
        &self,
        child: &Child,
        started: Instant,
    ) {
        self.sink.log(&format!(
            "LLM process {} still running ({}s elapsed)",
            child.id(),
            started.elapsed().as_secs()
        ));
    }

    fn kill_for_timeout(
        &self,
        child: &mut Child,
    ) -> LlmError {
        let after = self.options.timeout;
        self.sink.log(&format!(
            "LLM process {} timed out after {after:?}; terminating",
            child.id()
        ));
        if let Err(err) = child.kill() {
            warn!(%err, "failed to kill timed-out LLM process");
        }
        let _ = child.wait();
        LlmError::Timeout {
            program: self.options.program.clone(),
            after,
        }
    }
}

impl LanguageModel for StreamingProcessClient {
    fn complete(
        &self,
        prompt: &str,
    ) -> Result<String, LlmError> {
        let scratch = self.write_scratch(prompt)?;
        let max = self.options.retry.max_attempts;
        debug!(prompt_file = %scratch.path().display(), chars = prompt.len(), "prompt written");
        trace!(%prompt);

        self.options
            .retry
            .run(
                |attempt| {
                    self.sink.log(&format!(
                        "Running {} (attempt {attempt}/{max})",
                        self.options.program
                    ));
                    self.run_once(scratch.path())
                },
                LlmError::is_retryable,
                |attempt, err| {
                    self.sink
                        .log(&format!("Attempt {attempt}/{max} failed: {err}. Retrying..."));
                    Ok(())
                },
            )
            .inspect_err(|err| {
                self.sink
                    .log(&format!("All LLM attempts failed. Last error: {err}"));
            })
        // `scratch` drops here on both paths, deleting the prompt file
    }
}

/// Reader thread feeding stdout lines into a channel. The channel closes when
/// stdout reaches EOF or the receiver is gone.
fn spawn_stdout_reader(child: &mut Child) -> Option<mpsc::Receiver<String>> {
    let stdout = child.stdout.take()?;
    let (tx, rx) = mpsc::channel();

    thread::spawn(move || {
        for line in LineScanner::new(BufReader::new(stdout)) {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break;
            }
        }
    });

    Some(rx)
}

/// Reader thread collecting all of stderr, sent once at EOF.
fn spawn_stderr_reader(child: &mut Child) -> Option<mpsc::Receiver<String>> {
    let mut stderr = child.stderr.take()?;
    let (tx, rx) = mpsc::channel();

    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = stderr.read_to_end(&mut buf);
        let _ = tx.send(String::from_utf8_lossy(&buf).into_owned());
    });

    Some(rx)
}
