//! Agent session continuity.
//!
//! The Agent's session id is the conversation handle; this module is the
//! single place that extracts it from a transcript and reads or writes it
//! on workflow state.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::types::WorkflowState;

pub const RESUME_FLAG: &str = "--resume";

static QUOTED_SESSION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""session_id"\s*:\s*"([^"]+)""#).expect("valid regex"));
static BARE_SESSION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"session_id\s*:\s*([A-Za-z0-9-]+)").expect("valid regex"));

/// Session info read from workflow state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub session_id: String,
    pub created_at: Option<DateTime<Utc>>,
    pub reuse_count: u32,
    pub is_new: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SessionManager;

impl SessionManager {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Extract the session id from a raw agent transcript.
    ///
    /// Precedence: a `result` chunk's `session_id` wins over a
    /// `system`/`init` chunk's, which wins over a regex fallback. The
    /// result chunk is authoritative because resumed conversations echo the
    /// original id in `init` but report the live one in `result`.
    #[must_use]
    pub fn parse_session_id(&self, output: &str) -> Option<String> {
        if output.is_empty() {
            return None;
        }

        let chunks: Vec<serde_json::Value> = output
            .lines()
            .filter_map(|line| {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    return None;
                }
                serde_json::from_str(trimmed).ok()
            })
            .collect();

        for chunk in &chunks {
            if chunk["type"].as_str() == Some("result") {
                if let Some(id) = non_empty_str(&chunk["session_id"]) {
                    tracing::debug!(session_id = %id, "found session id in result chunk");
                    return Some(id);
                }
            }
        }

        for chunk in &chunks {
            if chunk["type"].as_str() == Some("system")
                && chunk["subtype"].as_str() == Some("init")
            {
                if let Some(id) = non_empty_str(&chunk["session_id"]) {
                    tracing::debug!(session_id = %id, "found session id in init chunk");
                    return Some(id);
                }
            }
        }

        // Fallback for transcripts where the JSON was mangled.
        if let Some(captures) = QUOTED_SESSION_RE.captures(output) {
            return Some(captures[1].to_string());
        }
        if let Some(captures) = BARE_SESSION_RE.captures(output) {
            return Some(captures[1].to_string());
        }

        None
    }

    /// Arguments to resume an existing session. Empty when there is nothing
    /// to resume or the caller forces a fresh conversation.
    #[must_use]
    pub fn build_resume_args(&self, session_id: Option<&str>, force_new: bool) -> Vec<String> {
        match session_id {
            Some(id) if !force_new && !id.is_empty() => {
                tracing::debug!(session_id = %id, "reusing agent session");
                vec![RESUME_FLAG.to_string(), id.to_string()]
            }
            _ => Vec::new(),
        }
    }

    #[must_use]
    pub fn get_session_from_state(&self, state: &WorkflowState) -> Option<SessionInfo> {
        let session_id = state.session_id.clone().filter(|id| !id.is_empty())?;
        Some(SessionInfo {
            session_id,
            created_at: state.session_created_at,
            reuse_count: state.session_reuse_count,
            is_new: false,
        })
    }

    /// Record a session id on the state. A reused id increments the reuse
    /// counter; a new one resets it.
    pub fn update_state_with_session(
        &self,
        state: &mut WorkflowState,
        session_id: &str,
        is_new: bool,
    ) {
        if session_id.is_empty() {
            return;
        }
        if is_new {
            state.session_id = Some(session_id.to_string());
            state.session_created_at = Some(Utc::now());
            state.session_reuse_count = 0;
            tracing::debug!(session_id = %session_id, "created new agent session");
        } else {
            state.session_id = Some(session_id.to_string());
            state.session_reuse_count += 1;
            tracing::debug!(
                session_id = %session_id,
                count = state.session_reuse_count,
                "reused agent session"
            );
        }
    }
}

fn non_empty_str(value: &serde_json::Value) -> Option<String> {
    value.as_str().filter(|s| !s.is_empty()).map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::WorkflowType;

    fn manager() -> SessionManager {
        SessionManager::new()
    }

    #[test]
    fn result_chunk_wins_over_init() {
        let output = concat!(
            r#"{"type":"system","subtype":"init","session_id":"init-id"}"#,
            "\n",
            r#"{"type":"assistant","message":{"content":[]}}"#,
            "\n",
            r#"{"type":"result","session_id":"result-id","result":"done"}"#,
        );
        assert_eq!(
            manager().parse_session_id(output),
            Some("result-id".to_string())
        );
    }

    #[test]
    fn init_chunk_used_when_no_result() {
        let output = r#"{"type":"system","subtype":"init","session_id":"init-only"}"#;
        assert_eq!(
            manager().parse_session_id(output),
            Some("init-only".to_string())
        );
    }

    #[test]
    fn regex_fallback_quoted() {
        let output = "garbage before \"session_id\": \"abc-123\" garbage after";
        assert_eq!(
            manager().parse_session_id(output),
            Some("abc-123".to_string())
        );
    }

    #[test]
    fn regex_fallback_bare() {
        let output = "log line session_id: xyz-789 trailing";
        assert_eq!(
            manager().parse_session_id(output),
            Some("xyz-789".to_string())
        );
    }

    #[test]
    fn empty_and_noise_yield_none() {
        assert_eq!(manager().parse_session_id(""), None);
        assert_eq!(manager().parse_session_id("no ids here\nat all"), None);
    }

    #[test]
    fn empty_session_id_in_chunk_is_skipped() {
        let output = concat!(
            r#"{"type":"result","session_id":"","result":"x"}"#,
            "\n",
            r#"{"type":"system","subtype":"init","session_id":"fallback"}"#,
        );
        assert_eq!(
            manager().parse_session_id(output),
            Some("fallback".to_string())
        );
    }

    #[test]
    fn resume_args_respect_force_new() {
        let m = manager();
        assert_eq!(
            m.build_resume_args(Some("sess-1"), false),
            vec!["--resume".to_string(), "sess-1".to_string()]
        );
        assert!(m.build_resume_args(Some("sess-1"), true).is_empty());
        assert!(m.build_resume_args(None, false).is_empty());
        assert!(m.build_resume_args(Some(""), false).is_empty());
    }

    #[test]
    fn update_new_session_resets_counter() {
        let mut state = WorkflowState::new("s", "d", WorkflowType::Feature);
        state.session_reuse_count = 5;
        manager().update_state_with_session(&mut state, "fresh", true);
        assert_eq!(state.session_id.as_deref(), Some("fresh"));
        assert_eq!(state.session_reuse_count, 0);
        assert!(state.session_created_at.is_some());
    }

    #[test]
    fn update_reused_session_increments_counter() {
        let mut state = WorkflowState::new("s", "d", WorkflowType::Feature);
        manager().update_state_with_session(&mut state, "sess", true);
        manager().update_state_with_session(&mut state, "sess", false);
        manager().update_state_with_session(&mut state, "sess", false);
        assert_eq!(state.session_reuse_count, 2);
    }

    #[test]
    fn get_session_from_state_filters_empty() {
        let mut state = WorkflowState::new("s", "d", WorkflowType::Feature);
        assert!(manager().get_session_from_state(&state).is_none());
        state.session_id = Some(String::new());
        assert!(manager().get_session_from_state(&state).is_none());
        state.session_id = Some("live".to_string());
        let info = manager().get_session_from_state(&state).unwrap();
        assert_eq!(info.session_id, "live");
        assert!(!info.is_new);
    }
}
