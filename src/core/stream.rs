//! Line-delimited JSON event stream emitted by the LLM tool.
//!
//! Three pieces, used only by the process client:
//! - [`LineScanner`]: buffered splitter turning stdout bytes into lines
//! - [`decode_line`]: one line to one [`StreamEvent`]
//! - [`Transcript`]: folds events into the final text
//!
//! A line that is not a JSON object is kept as raw text. The tool's output
//! format is not fully trusted, and plain-text answers still come through.

use std::io::{self, BufRead};

use serde_json::Value;

/// One parsed line of the tool's stdout.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum StreamEvent {
    /// Start marker (message or content block)
    ContentStart,
    /// Text fragment, appended in arrival order
    ContentDelta { text: String },
    /// Stop marker (message or content block)
    ContentStop,
    /// Error event; recorded, the exit code decides the outcome
    Error { payload: String },
    /// Any other `type`
    Other { kind: String, raw: Value },
    /// Line that is not a JSON object
    Unparsed { line: String },
}

/// Yields non-blank lines from a buffered reader, without line terminators.
/// Invalid UTF-8 is replaced rather than rejected.
pub(crate) struct LineScanner<R> {
    reader: R,
    buf: Vec<u8>,
}

impl<R: BufRead> LineScanner<R> {
    pub(crate) fn new(reader: R) -> Self {
        Self {
            reader,
            buf: Vec::with_capacity(4096),
        }
    }
}

impl<R: BufRead> Iterator for LineScanner<R> {
    type Item = io::Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            self.buf.clear();
            match self.reader.read_until(b'\n', &mut self.buf) {
                Ok(0) => return None,
                Ok(_) => {
                    let line = String::from_utf8_lossy(&self.buf);
                    let line = line.trim_end_matches(['\n', '\r']);
                    if line.trim().is_empty() {
                        continue;
                    }
                    return Some(Ok(line.to_string()));
                }
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Some(Err(err)),
            }
        }
    }
}

/// Decode a single stdout line.
pub(crate) fn decode_line(line: &str) -> StreamEvent {
    let value = match serde_json::from_str::<Value>(line) {
        Ok(value @ Value::Object(_)) => value,
        _ => {
            return StreamEvent::Unparsed {
                line: line.to_string(),
            };
        }
    };

    let kind = value
        .get("type")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    match kind.as_str() {
        "message_start" | "content_block_start" | "system" => StreamEvent::ContentStart,
        "message_stop" | "content_block_stop" => StreamEvent::ContentStop,
        "error" => StreamEvent::Error {
            payload: error_payload(&value),
        },
        "" if value.get("error").is_some() => StreamEvent::Error {
            payload: error_payload(&value),
        },
        k if is_delta_kind(k) => match text_payload(&value) {
            Some(text) => StreamEvent::ContentDelta { text },
            None => StreamEvent::Other { kind, raw: value },
        },
        _ => StreamEvent::Other { kind, raw: value },
    }
}

/// Kinds whose text is part of the answer. Untyped objects carrying a
/// `completion` field count as deltas too.
fn is_delta_kind(kind: &str) -> bool {
    kind.is_empty() || kind.ends_with("delta") || kind == "assistant" || kind == "completion"
}

fn error_payload(value: &Value) -> String {
    match value.get("error") {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => value.to_string(),
    }
}

/// Text carried by an event, if any: `delta.text`, `text`, `completion`,
/// or the text blocks of an assistant `message`.
pub(crate) fn text_payload(value: &Value) -> Option<String> {
    if let Some(text) = value
        .get("delta")
        .and_then(|d| d.get("text"))
        .and_then(Value::as_str)
    {
        return Some(text.to_string());
    }

    for key in ["text", "completion"] {
        if let Some(text) = value.get(key).and_then(Value::as_str) {
            return Some(text.to_string());
        }
    }

    let blocks = value
        .get("message")
        .and_then(|m| m.get("content"))
        .and_then(Value::as_array)?;

    let text: String = blocks
        .iter()
        .filter(|b| b.get("type").and_then(Value::as_str) == Some("text"))
        .filter_map(|b| b.get("text").and_then(Value::as_str))
        .collect();

    (!text.is_empty()).then_some(text)
}

/// Accumulated result of one subprocess run.
#[derive(Debug, Default)]
pub(crate) struct Transcript {
    text: String,
    errors: Vec<String>,
    /// `result` field of a terminal `result` event
    final_result: Option<String>,
}

impl Transcript {
    pub(crate) fn apply(
        &mut self,
        event: StreamEvent,
    ) {
        match event {
            StreamEvent::ContentStart | StreamEvent::ContentStop => {}
            StreamEvent::ContentDelta { text } => self.text.push_str(&text),
            StreamEvent::Error { payload } => {
                tracing::warn!(%payload, "error event in LLM stream");
                self.errors.push(payload);
            }
            StreamEvent::Unparsed { line } => {
                // Restore the terminator the scanner consumed
                self.text.push_str(&line);
                self.text.push('\n');
            }
            StreamEvent::Other { kind, raw } => {
                tracing::debug!(%kind, "unrecognized stream event");

                if kind == "result" {
                    if raw.get("is_error").and_then(Value::as_bool) == Some(true) {
                        self.errors.push(raw.to_string());
                    }
                    self.final_result = raw
                        .get("result")
                        .and_then(Value::as_str)
                        .map(str::to_string);
                } else if let Some(text) = text_payload(&raw) {
                    self.text.push_str(&text);
                }
            }
        }
    }

    pub(crate) fn errors(&self) -> &[String] {
        &self.errors
    }

    /// Final text without surrounding line breaks; leading indentation of
    /// the first line survives. The terminal `result` summary is only used
    /// when the stream carried no text of its own.
    pub(crate) fn finish(self) -> String {
        let text = if self.text.trim().is_empty() {
            self.final_result.unwrap_or_default()
        } else {
            self.text
        };
        text.trim_matches(['\n', '\r']).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fold(lines: &[&str]) -> Transcript {
        let mut t = Transcript::default();
        for line in lines {
            t.apply(decode_line(line));
        }
        t
    }

    #[test]
    fn scanner_skips_blank_lines_and_crlf() {
        let input = b"first\r\n\n   \nsecond\nthird";
        let lines: Vec<String> = LineScanner::new(&input[..])
            .map(|l| l.unwrap())
            .collect();
        assert_eq!(lines, vec!["first", "second", "third"]);
    }

    #[test]
    fn scanner_replaces_invalid_utf8() {
        let input = b"ok \xff here\n";
        let lines: Vec<String> = LineScanner::new(&input[..])
            .map(|l| l.unwrap())
            .collect();
        assert_eq!(lines, vec!["ok \u{fffd} here"]);
    }

    #[test]
    fn decodes_markers_and_deltas() {
        assert_eq!(
            decode_line(r#"{"type":"content_block_start","index":0}"#),
            StreamEvent::ContentStart
        );
        assert_eq!(
            decode_line(r#"{"type":"message_stop"}"#),
            StreamEvent::ContentStop
        );
        assert_eq!(
            decode_line(r#"{"type":"content_block_delta","delta":{"type":"text_delta","text":"hi"}}"#),
            StreamEvent::ContentDelta { text: "hi".into() }
        );
        assert_eq!(
            decode_line(r#"{"completion":"legacy"}"#),
            StreamEvent::ContentDelta {
                text: "legacy".into()
            }
        );
    }

    #[test]
    fn decodes_assistant_message_blocks() {
        let line = r#"{"type":"assistant","message":{"content":[{"type":"text","text":"a"},{"type":"tool_use","id":"x"},{"type":"text","text":"b"}]}}"#;
        assert_eq!(
            decode_line(line),
            StreamEvent::ContentDelta { text: "ab".into() }
        );
    }

    #[test]
    fn decodes_errors() {
        assert_eq!(
            decode_line(r#"{"type":"error","error":{"message":"overloaded"}}"#),
            StreamEvent::Error {
                payload: r#"{"message":"overloaded"}"#.into()
            }
        );
        assert_eq!(
            decode_line(r#"{"error":"bad key"}"#),
            StreamEvent::Error {
                payload: "bad key".into()
            }
        );
    }

    #[test]
    fn non_object_lines_are_unparsed() {
        for line in ["not json at all", "42", "[1,2]", "{broken"] {
            assert_eq!(
                decode_line(line),
                StreamEvent::Unparsed { line: line.into() }
            );
        }
    }

    #[test]
    fn transcript_keeps_arrival_order_without_dedup() {
        let t = fold(&[
            r#"{"type":"message_start"}"#,
            r#"{"type":"content_block_delta","delta":{"text":"ab"}}"#,
            r#"{"type":"content_block_delta","delta":{"text":"ab"}}"#,
            r#"{"type":"content_block_delta","delta":{"text":"c"}}"#,
            r#"{"type":"message_stop"}"#,
        ]);
        assert_eq!(t.finish(), "ababc");
    }

    #[test]
    fn unknown_kinds_with_text_still_contribute() {
        let t = fold(&[
            r#"{"type":"ping"}"#,
            r#"{"type":"annotation","text":"kept"}"#,
        ]);
        assert_eq!(t.finish(), "kept");
    }

    #[test]
    fn leading_indentation_survives() {
        let t = fold(&["    indented();", "done();"]);
        assert_eq!(t.finish(), "    indented();\ndone();");
    }

    #[test]
    fn raw_lines_keep_their_line_breaks() {
        let t = fold(&["fn main() {", "    run();", "}"]);
        assert_eq!(t.finish(), "fn main() {\n    run();\n}");
    }

    #[test]
    fn errors_are_recorded_not_fatal() {
        let mut t = fold(&[
            r#"{"type":"error","error":"transient"}"#,
            r#"{"type":"content_block_delta","delta":{"text":"done"}}"#,
        ]);
        assert_eq!(t.errors(), &["transient".to_string()]);
        t.apply(StreamEvent::ContentStop);
        assert_eq!(t.finish(), "done");
    }

    #[test]
    fn result_summary_is_a_fallback_only() {
        let with_text = fold(&[
            r#"{"type":"assistant","message":{"content":[{"type":"text","text":"7"}]}}"#,
            r#"{"type":"result","subtype":"success","is_error":false,"result":"7"}"#,
        ]);
        assert_eq!(with_text.finish(), "7");

        let only_result = fold(&[r#"{"type":"result","is_error":false,"result":"12"}"#]);
        assert_eq!(only_result.finish(), "12");

        let failed = fold(&[r#"{"type":"result","is_error":true,"result":"quota"}"#]);
        assert_eq!(failed.errors().len(), 1);
    }
}
