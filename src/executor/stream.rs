//! Decoding of the Agent's newline-delimited JSON stream.
//!
//! Each stdout line is one JSON object tagged by `type`: `system` (with an
//! `init` subtype carrying the session id), `assistant` (nested tool-use,
//! text, and thinking blocks), `user` (tool-result echoes), and a final
//! `result` carrying the payload. Non-JSON lines are preamble noise and are
//! skipped.

use serde_json::Value;

use crate::types::ProgressEvent;

/// Maximum display width of a tool-input summary in progress events.
const TOOL_INPUT_DISPLAY_LEN: usize = 80;

/// Events decoded from a single stream line.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum StreamEvent {
    SessionInit {
        session_id: String,
    },
    Progress(ProgressEvent),
    Result {
        session_id: Option<String>,
        result: String,
    },
}

/// Decode one stdout line into zero or more events. Returns an empty vec
/// for noise lines.
pub(crate) fn decode_line(line: &str) -> Vec<StreamEvent> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }
    let Ok(chunk) = serde_json::from_str::<Value>(trimmed) else {
        tracing::debug!(line = %truncate_string(trimmed, 120), "skipping non-JSON stream line");
        return Vec::new();
    };

    match chunk["type"].as_str() {
        Some("system") => {
            if chunk["subtype"].as_str() == Some("init") {
                if let Some(id) = chunk["session_id"].as_str().filter(|s| !s.is_empty()) {
                    return vec![StreamEvent::SessionInit {
                        session_id: id.to_string(),
                    }];
                }
            }
            Vec::new()
        }
        Some("assistant") => decode_assistant(&chunk),
        Some("user") => decode_user(&chunk),
        Some("result") => {
            let session_id = chunk["session_id"]
                .as_str()
                .filter(|s| !s.is_empty())
                .map(str::to_string);
            let result = chunk["result"].as_str().unwrap_or_default().to_string();
            vec![StreamEvent::Result { session_id, result }]
        }
        _ => Vec::new(),
    }
}

fn decode_assistant(chunk: &Value) -> Vec<StreamEvent> {
    let Some(blocks) = chunk["message"]["content"].as_array() else {
        return Vec::new();
    };
    let mut events = Vec::new();
    for block in blocks {
        match block["type"].as_str() {
            Some("tool_use") => {
                let tool_name = block["name"].as_str().unwrap_or_default().to_string();
                let summary = extract_tool_input_summary(&tool_name, &block["input"]);
                events.push(StreamEvent::Progress(ProgressEvent::ToolUse {
                    tool_name,
                    tool_input: truncate_string(&summary, TOOL_INPUT_DISPLAY_LEN),
                }));
            }
            Some("text") => {
                if let Some(text) = block["text"].as_str() {
                    events.push(StreamEvent::Progress(ProgressEvent::Text {
                        text: text.to_string(),
                    }));
                }
            }
            Some("thinking") => {
                if let Some(text) = block["thinking"].as_str() {
                    events.push(StreamEvent::Progress(ProgressEvent::Thinking {
                        text: text.to_string(),
                    }));
                }
            }
            _ => {}
        }
    }
    events
}

fn decode_user(chunk: &Value) -> Vec<StreamEvent> {
    let Some(blocks) = chunk["message"]["content"].as_array() else {
        return Vec::new();
    };
    let mut events = Vec::new();
    for block in blocks {
        if block["type"].as_str() != Some("tool_result") {
            continue;
        }
        let is_error = block["is_error"].as_bool().unwrap_or(false);
        // tool_result content is either a plain string or a list of text blocks.
        let text = match &block["content"] {
            Value::String(s) => s.clone(),
            Value::Array(parts) => parts
                .iter()
                .filter_map(|p| p["text"].as_str())
                .collect::<Vec<_>>()
                .join("\n"),
            _ => String::new(),
        };
        events.push(StreamEvent::Progress(ProgressEvent::ToolResult {
            text: truncate_string(&text, TOOL_INPUT_DISPLAY_LEN),
            is_error,
        }));
    }
    events
}

/// The one field of a tool's input worth showing in a progress line.
pub(crate) fn extract_tool_input_summary(tool_name: &str, input: &Value) -> String {
    let field = match tool_name {
        "Read" | "Edit" | "Write" => "file_path",
        "Glob" | "Grep" => "pattern",
        "Bash" => "command",
        "Task" => "description",
        _ => return String::new(),
    };
    input[field].as_str().unwrap_or_default().to_string()
}

/// Truncate to `max_len` characters, ellipsis included.
pub(crate) fn truncate_string(s: &str, max_len: usize) -> String {
    let chars: Vec<char> = s.chars().collect();
    if chars.len() <= max_len {
        return s.to_string();
    }
    if max_len <= 3 {
        return "...".to_string();
    }
    let mut out: String = chars[..max_len - 3].iter().collect();
    out.push_str("...");
    out
}

/// Locate the last complete top-level JSON value in `output`.
///
/// Tries, in order: the whole trimmed string, the last line that parses on
/// its own, and finally a string-aware scan for balanced `{...}` spans to
/// handle payloads wrapped in prose or fences.
pub(crate) fn extract_last_json(output: &str) -> Option<String> {
    let trimmed = output.trim();
    if trimmed.is_empty() {
        return None;
    }

    if serde_json::from_str::<Value>(trimmed).is_ok() {
        return Some(trimmed.to_string());
    }

    let mut last_line_json = None;
    for line in trimmed.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if serde_json::from_str::<Value>(line).is_ok() {
            last_line_json = Some(line.to_string());
        }
    }
    if last_line_json.is_some() {
        return last_line_json;
    }

    last_balanced_object(trimmed)
}

/// Scan for top-level `{...}` spans, tracking string and escape state, and
/// return the last span that parses as JSON.
fn last_balanced_object(text: &str) -> Option<String> {
    let bytes: Vec<char> = text.chars().collect();
    let mut best: Option<String> = None;
    let mut depth = 0usize;
    let mut start: Option<usize> = None;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &c) in bytes.iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' if depth > 0 => in_string = true,
            '{' => {
                if depth == 0 {
                    start = Some(i);
                }
                depth += 1;
            }
            '}' => {
                if depth > 0 {
                    depth -= 1;
                    if depth == 0 {
                        if let Some(s) = start {
                            let candidate: String = bytes[s..=i].iter().collect();
                            if serde_json::from_str::<Value>(&candidate).is_ok() {
                                best = Some(candidate);
                            }
                        }
                    }
                }
            }
            _ => {}
        }
    }
    best
}

/// Tail excerpt for error reporting when no JSON was found.
pub(crate) fn tail_excerpt(output: &str, max_chars: usize) -> String {
    let chars: Vec<char> = output.chars().collect();
    if chars.len() <= max_chars {
        return output.to_string();
    }
    chars[chars.len() - max_chars..].iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_init_chunk() {
        let events = decode_line(r#"{"type":"system","subtype":"init","session_id":"s-1"}"#);
        assert_eq!(
            events,
            vec![StreamEvent::SessionInit {
                session_id: "s-1".to_string()
            }]
        );
    }

    #[test]
    fn decodes_assistant_blocks() {
        let line = r#"{"type":"assistant","message":{"content":[
            {"type":"text","text":"Reading file..."},
            {"type":"tool_use","name":"Read","input":{"file_path":"/src/main.rs"}},
            {"type":"thinking","thinking":"hmm"}
        ]}}"#
            .replace('\n', "");
        let events = decode_line(&line);
        assert_eq!(events.len(), 3);
        assert_eq!(
            events[1],
            StreamEvent::Progress(ProgressEvent::ToolUse {
                tool_name: "Read".to_string(),
                tool_input: "/src/main.rs".to_string(),
            })
        );
    }

    #[test]
    fn decodes_tool_result_string_and_array() {
        let line = r#"{"type":"user","message":{"content":[{"type":"tool_result","content":"ok","is_error":false}]}}"#;
        let events = decode_line(line);
        assert_eq!(
            events,
            vec![StreamEvent::Progress(ProgressEvent::ToolResult {
                text: "ok".to_string(),
                is_error: false,
            })]
        );

        let line = r#"{"type":"user","message":{"content":[{"type":"tool_result","content":[{"type":"text","text":"not found"}],"is_error":true}]}}"#;
        let events = decode_line(line);
        assert_eq!(
            events,
            vec![StreamEvent::Progress(ProgressEvent::ToolResult {
                text: "not found".to_string(),
                is_error: true,
            })]
        );
    }

    #[test]
    fn decodes_result_chunk() {
        let events =
            decode_line(r#"{"type":"result","session_id":"s-9","result":"{\"ok\":true}"}"#);
        assert_eq!(
            events,
            vec![StreamEvent::Result {
                session_id: Some("s-9".to_string()),
                result: "{\"ok\":true}".to_string(),
            }]
        );
    }

    #[test]
    fn noise_lines_are_skipped() {
        assert!(decode_line("Starting up...").is_empty());
        assert!(decode_line("").is_empty());
        assert!(decode_line("{broken json").is_empty());
    }

    #[test]
    fn tool_input_summary_table() {
        let cases = [
            ("Read", r#"{"file_path": "/home/user/test.rs"}"#, "/home/user/test.rs"),
            ("Edit", r#"{"file_path": "/main.rs"}"#, "/main.rs"),
            ("Write", r#"{"file_path": "/out.txt"}"#, "/out.txt"),
            ("Glob", r#"{"pattern": "**/*.rs"}"#, "**/*.rs"),
            ("Grep", r#"{"pattern": "fn.*Error"}"#, "fn.*Error"),
            ("Bash", r#"{"command": "cargo test"}"#, "cargo test"),
            ("Task", r#"{"description": "run tests"}"#, "run tests"),
            ("Unknown", r#"{"some_field": "value"}"#, ""),
            ("Read", r#"{"other_field": "value"}"#, ""),
        ];
        for (tool, input, want) in cases {
            let value: Value = serde_json::from_str(input).unwrap();
            assert_eq!(extract_tool_input_summary(tool, &value), want, "tool {tool}");
        }
        assert_eq!(extract_tool_input_summary("Read", &Value::Null), "");
    }

    #[test]
    fn truncate_string_semantics() {
        assert_eq!(truncate_string("hello", 10), "hello");
        assert_eq!(truncate_string("hello world", 11), "hello world");
        assert_eq!(
            truncate_string("hello world this is a long string", 15),
            "hello world ..."
        );
        assert_eq!(truncate_string("", 10), "");
        assert_eq!(truncate_string("hello", 3), "...");
        assert_eq!(truncate_string("hello", 4), "h...");
    }

    #[test]
    fn extract_last_json_whole_string() {
        let json = extract_last_json(r#"  {"a": 1}  "#).unwrap();
        assert_eq!(json, r#"{"a": 1}"#);
    }

    #[test]
    fn extract_last_json_picks_last_line() {
        let output = "noise\n{\"frame\":1}\nmore noise\n{\"frame\":2}";
        let json = extract_last_json(output).unwrap();
        assert_eq!(json, r#"{"frame":2}"#);
    }

    #[test]
    fn extract_last_json_handles_embedded_object() {
        let output = "Here is the plan:\n```json\n{\n  \"summary\": \"x\",\n  \"note\": \"has } in string\"\n}\n```\nDone.";
        let json = extract_last_json(output).unwrap();
        let value: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["summary"], "x");
    }

    #[test]
    fn extract_last_json_none_for_noise() {
        assert!(extract_last_json("no json at all").is_none());
        assert!(extract_last_json("").is_none());
        assert!(extract_last_json(r#"{"incomplete": tru"#).is_none());
    }

    #[test]
    fn tail_excerpt_truncates_front() {
        let long = "x".repeat(300);
        assert_eq!(tail_excerpt(&long, 256).len(), 256);
        assert_eq!(tail_excerpt("short", 256), "short");
    }
}
