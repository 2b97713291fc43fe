//! Streaming subprocess client against fake LLM tools written in `sh`.
//!
//! Scripts are run as `sh <script> <prompt file>` so they never need the
//! executable bit.

#![cfg(unix)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use assert_fs::prelude::*;
use gfactor::core::{ClientOptions, LanguageModel, LlmError, RetryPolicy, StreamingProcessClient};
use gfactor::infra::MemorySink;
use proptest::prelude::*;

struct Harness
{
    tmp: assert_fs::TempDir,
    scratch: PathBuf,
    sink: Arc<MemorySink>,
}

impl Harness
{
    fn new() -> Self
    {
        let tmp = assert_fs::TempDir::new().expect("tempdir");
        let scratch = tmp.path().join("scratch");
        std::fs::create_dir_all(&scratch).expect("scratch dir");
        Self { tmp, scratch, sink: Arc::new(MemorySink::new()) }
    }

    /// Write a fake tool script and return its path
    fn script(
        &self,
        name: &str,
        body: &str,
    ) -> PathBuf
    {
        let child = self.tmp.child(name);
        child
            .write_str(body)
            .expect("write script");
        child.path().to_path_buf()
    }

    fn client(
        &self,
        script: &Path,
        timeout: Duration,
        attempts: u32,
    ) -> StreamingProcessClient
    {
        let options = ClientOptions {
            program: "sh".to_string(),
            args: vec![script.display().to_string(), "{prompt_file}".to_string()],
            timeout,
            heartbeat: Duration::from_millis(50),
            retry: RetryPolicy::new(attempts),
            scratch_dir: Some(self.scratch.clone()),
            working_dir: Some(self.tmp.path().to_path_buf()),
        };
        StreamingProcessClient::new(options, self.sink.clone())
    }

    fn scratch_is_empty(&self) -> bool
    {
        std::fs::read_dir(&self.scratch)
            .expect("read scratch")
            .next()
            .is_none()
    }

    fn lines_in(
        &self,
        name: &str,
    ) -> usize
    {
        std::fs::read_to_string(self.tmp.path().join(name))
            .map(|s| s.lines().count())
            .unwrap_or(0)
    }
}

const STREAM: &str = r#"cat <<'EOF'
{"type":"system","subtype":"init"}
{"type":"message_start"}
{"type":"content_block_delta","delta":{"type":"text_delta","text":"let x"}}
{"type":"content_block_delta","delta":{"type":"text_delta","text":" = 1;"}}
{"type":"ping"}
{"type":"message_stop"}
EOF
"#;

#[test]
fn deltas_are_assembled_in_order()
{
    let h = Harness::new();
    let script = h.script("stream.sh", STREAM);

    let text = h
        .client(&script, Duration::from_secs(10), 4)
        .complete("rewrite this")
        .unwrap();

    assert_eq!(text, "let x = 1;");
    assert!(h.scratch_is_empty());
}

#[test]
fn prompt_reaches_the_tool_through_the_scratch_file()
{
    let h = Harness::new();
    // Echo the prompt file back as a single delta
    let script = h.script(
        "echo.sh",
        "printf '{\"type\":\"content_block_delta\",\"delta\":{\"text\":\"%s\"}}\\n' \"$(cat \"$1\")\"\n",
    );

    let text = h
        .client(&script, Duration::from_secs(10), 1)
        .complete("count the widgets")
        .unwrap();

    assert_eq!(text, "count the widgets");
    assert!(h.scratch_is_empty());
}

#[test]
fn plain_text_output_degrades_to_raw_lines()
{
    let h = Harness::new();
    let script = h.script("plain.sh", "echo 'fn main() {'\necho '}'\n");

    let text = h
        .client(&script, Duration::from_secs(10), 1)
        .complete("x")
        .unwrap();

    assert_eq!(text, "fn main() {\n}");
}

#[test]
fn error_events_do_not_override_a_clean_exit()
{
    let h = Harness::new();
    let script = h.script(
        "err.sh",
        "echo '{\"type\":\"error\",\"error\":\"overloaded\"}'\necho '{\"type\":\"content_block_delta\",\"delta\":{\"text\":\"3\"}}'\n",
    );

    let text = h
        .client(&script, Duration::from_secs(10), 1)
        .complete("x")
        .unwrap();
    assert_eq!(text, "3");
}

#[test]
fn nonzero_exit_is_retried_up_to_four_launches()
{
    let h = Harness::new();
    let counter = h.tmp.path().join("launches");
    let script = h.script(
        "fail.sh",
        &format!("echo run >> '{}'\necho 'quota exceeded' >&2\nexit 3\n", counter.display()),
    );

    let err = h
        .client(&script, Duration::from_secs(10), 4)
        .complete("x")
        .unwrap_err();

    match err
    {
        LlmError::Exit { code, stderr, .. } =>
        {
            assert_eq!(code, Some(3));
            assert!(stderr.contains("quota exceeded"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(h.lines_in("launches"), 4);
    assert!(h.sink.contains("All LLM attempts failed"));
    assert!(h.scratch_is_empty());
}

#[test]
fn later_attempt_can_succeed()
{
    let h = Harness::new();
    let counter = h.tmp.path().join("launches");
    let script = h.script(
        "flaky.sh",
        &format!(
            "echo run >> '{c}'\nn=$(wc -l < '{c}')\nif [ \"$n\" -lt 3 ]; then exit 1; fi\necho '{{\"type\":\"content_block_delta\",\"delta\":{{\"text\":\"ok\"}}}}'\n",
            c = counter.display()
        ),
    );

    let text = h
        .client(&script, Duration::from_secs(10), 4)
        .complete("x")
        .unwrap();

    assert_eq!(text, "ok");
    assert_eq!(h.lines_in("launches"), 3);
    assert!(h.scratch_is_empty());
}

#[test]
fn stalled_tool_is_killed_at_the_deadline()
{
    let h = Harness::new();
    let script = h.script("stall.sh", "echo '{\"type\":\"message_start\"}'\nexec sleep 30\n");

    let started = Instant::now();
    let err = h
        .client(&script, Duration::from_millis(300), 2)
        .complete("x")
        .unwrap_err();

    assert!(matches!(err, LlmError::Timeout { .. }), "got {err}");
    assert!(started.elapsed() < Duration::from_secs(10));
    assert!(h.sink.contains("still running"));
    assert!(h.sink.contains("timed out"));
    assert!(h.scratch_is_empty());
}

#[test]
fn helper_holding_stderr_cannot_outlive_the_deadline()
{
    let h = Harness::new();
    // The background sleep inherits stderr and keeps it open after exit
    let script = h.script(
        "helper.sh",
        "sleep 30 >/dev/null &\necho '{\"type\":\"content_block_delta\",\"delta\":{\"text\":\"ok\"}}'\n",
    );

    let started = Instant::now();
    let err = h
        .client(&script, Duration::from_secs(1), 1)
        .complete("x")
        .unwrap_err();

    assert!(matches!(err, LlmError::Timeout { .. }), "got {err}");
    assert!(started.elapsed() < Duration::from_secs(5), "took {:?}", started.elapsed());
    assert!(h.sink.contains("stderr stayed open"));
    assert!(h.scratch_is_empty());
}

#[test]
fn missing_program_is_a_spawn_error()
{
    let h = Harness::new();
    let options = ClientOptions {
        program: "gfactor-no-such-llm-tool".to_string(),
        retry: RetryPolicy::new(4),
        scratch_dir: Some(h.scratch.clone()),
        ..ClientOptions::default()
    };
    let client = StreamingProcessClient::new(options, h.sink.clone());

    let err = client
        .complete("x")
        .unwrap_err();

    assert!(matches!(err, LlmError::Spawn { .. }), "got {err}");
    assert_eq!(
        h.sink
            .lines()
            .iter()
            .filter(|l| l.contains("not found on PATH"))
            .count(),
        4
    );
    assert!(h.scratch_is_empty());
}

#[derive(Debug, Clone, Copy)]
enum Outcome
{
    Success,
    Failure,
    Timeout,
}

fn outcome() -> impl Strategy<Value = Outcome>
{
    prop_oneof![Just(Outcome::Success), Just(Outcome::Failure), Just(Outcome::Timeout)]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn scratch_file_never_outlives_a_call(outcome in outcome(), prompt in "[a-z ]{1,40}")
    {
        let h = Harness::new();
        let script = match outcome
        {
            Outcome::Success => h.script("ok.sh", "cat \"$1\" > /dev/null && echo '{\"type\":\"content_block_delta\",\"delta\":{\"text\":\"done\"}}'\n"),
            Outcome::Failure => h.script("fail.sh", "echo nope >&2\nexit 1\n"),
            Outcome::Timeout => h.script("stall.sh", "exec sleep 30\n"),
        };

        // Only the stalling tool gets a short deadline
        let timeout = match outcome
        {
            Outcome::Timeout => Duration::from_millis(100),
            _ => Duration::from_secs(20),
        };
        let result = h
            .client(&script, timeout, 2)
            .complete(&prompt);

        match outcome
        {
            Outcome::Success => prop_assert_eq!(result.ok(), Some("done".to_string())),
            Outcome::Failure => prop_assert!(matches!(result, Err(LlmError::Exit { .. })), "expected LlmError::Exit, got {:?}", result),
            Outcome::Timeout => prop_assert!(matches!(result, Err(LlmError::Timeout { .. })), "expected LlmError::Timeout, got {:?}", result),
        }
        prop_assert!(h.scratch_is_empty());
    }
}
