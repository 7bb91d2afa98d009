//! Durable per-workflow state on disk.
//!
//! Layout under the base directory:
//!
//! ```text
//! <base>/<name>/state.json
//! <base>/<name>/plan.json
//! <base>/<name>/plan.md
//! <base>/<name>/phases/<PHASE>.json
//! <base>/<name>/phases/<PHASE>_raw.txt
//! <base>/<name>/phases/<PHASE>_prompt_<n>.txt
//! ```
//!
//! All writes are atomic. The store is the only component that mutates
//! files under a workflow directory.

use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::atomic_write::write_file_atomic;
use crate::error::StateError;
use crate::types::{Phase, Plan, WorkflowInfo, WorkflowState, WorkflowType};

static NAME_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9._-]+$").expect("valid regex"));

/// Validate a workflow name: safe charset, and never a path component that
/// could escape the base directory.
pub fn validate_workflow_name(name: &str) -> Result<(), StateError> {
    if name.is_empty() {
        return Err(StateError::InvalidName {
            name: name.to_string(),
            reason: "name cannot be empty".to_string(),
        });
    }
    if !NAME_RE.is_match(name) {
        return Err(StateError::InvalidName {
            name: name.to_string(),
            reason: "only letters, digits, '.', '_' and '-' are allowed".to_string(),
        });
    }
    if name == "." || name == ".." {
        return Err(StateError::InvalidName {
            name: name.to_string(),
            reason: "name cannot be a relative path component".to_string(),
        });
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct StateStore {
    base_dir: Utf8PathBuf,
}

impl StateStore {
    #[must_use]
    pub fn new(base_dir: impl Into<Utf8PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    #[must_use]
    pub fn base_dir(&self) -> &Utf8Path {
        &self.base_dir
    }

    #[must_use]
    pub fn workflow_dir(&self, name: &str) -> Utf8PathBuf {
        self.base_dir.join(name)
    }

    fn state_path(&self, name: &str) -> Utf8PathBuf {
        self.workflow_dir(name).join("state.json")
    }

    fn phases_dir(&self, name: &str) -> Utf8PathBuf {
        self.workflow_dir(name).join("phases")
    }

    #[must_use]
    pub fn raw_output_path(&self, name: &str, phase: Phase) -> Utf8PathBuf {
        self.phases_dir(name).join(format!("{}_raw.txt", phase.as_str()))
    }

    #[must_use]
    pub fn prompt_path(&self, name: &str, phase: Phase, attempt: u32) -> Utf8PathBuf {
        self.phases_dir(name)
            .join(format!("{}_prompt_{attempt}.txt", phase.as_str()))
    }

    pub fn workflow_exists(&self, name: &str) -> bool {
        self.state_path(name).exists()
    }

    pub fn ensure_workflow_dir(&self, name: &str) -> Result<Utf8PathBuf, StateError> {
        validate_workflow_name(name)?;
        let dir = self.workflow_dir(name);
        fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    /// Create a fresh workflow. Fails if one with the same name exists.
    pub fn init_state(
        &self,
        name: &str,
        description: &str,
        workflow_type: WorkflowType,
    ) -> Result<WorkflowState, StateError> {
        validate_workflow_name(name)?;
        if self.workflow_exists(name) {
            return Err(StateError::AlreadyExists {
                name: name.to_string(),
            });
        }
        self.ensure_workflow_dir(name)?;
        let state = WorkflowState::new(name, description, workflow_type);
        self.save_state(&state)?;
        Ok(state)
    }

    pub fn load_state(&self, name: &str) -> Result<WorkflowState, StateError> {
        validate_workflow_name(name)?;
        let path = self.state_path(name);
        if !path.exists() {
            return Err(StateError::NotFound {
                name: name.to_string(),
            });
        }
        let raw = fs::read_to_string(&path)?;
        let state: WorkflowState =
            serde_json::from_str(&raw).map_err(|e| StateError::Corrupt {
                path: path.to_string(),
                reason: e.to_string(),
            })?;
        if let Err(reason) = state.validate() {
            return Err(StateError::Corrupt {
                path: path.to_string(),
                reason,
            });
        }
        Ok(state)
    }

    pub fn save_state(&self, state: &WorkflowState) -> Result<(), StateError> {
        validate_workflow_name(&state.name)?;
        self.ensure_workflow_dir(&state.name)?;
        let json = serde_json::to_string_pretty(state)?;
        write_file_atomic(&self.state_path(&state.name), &json)?;
        Ok(())
    }

    pub fn save_plan(&self, name: &str, plan: &Plan) -> Result<(), StateError> {
        let json = serde_json::to_string_pretty(plan)?;
        write_file_atomic(&self.workflow_dir(name).join("plan.json"), &json)?;
        Ok(())
    }

    pub fn load_plan(&self, name: &str) -> Result<Plan, StateError> {
        let path = self.workflow_dir(name).join("plan.json");
        if !path.exists() {
            return Err(StateError::NotFound {
                name: format!("{name} plan"),
            });
        }
        let raw = fs::read_to_string(&path)?;
        serde_json::from_str(&raw).map_err(|e| StateError::Corrupt {
            path: path.to_string(),
            reason: e.to_string(),
        })
    }

    pub fn save_plan_markdown(&self, name: &str, markdown: &str) -> Result<(), StateError> {
        write_file_atomic(&self.workflow_dir(name).join("plan.md"), markdown)?;
        Ok(())
    }

    /// Persist the parsed structured output of a phase.
    pub fn save_phase_output<T: Serialize>(
        &self,
        name: &str,
        phase: Phase,
        value: &T,
    ) -> Result<(), StateError> {
        let json = serde_json::to_string_pretty(value)?;
        let path = self.phases_dir(name).join(format!("{}.json", phase.as_str()));
        write_file_atomic(&path, &json)?;
        Ok(())
    }

    pub fn load_phase_output<T: DeserializeOwned>(
        &self,
        name: &str,
        phase: Phase,
    ) -> Result<T, StateError> {
        let path = self.phases_dir(name).join(format!("{}.json", phase.as_str()));
        if !path.exists() {
            return Err(StateError::NotFound {
                name: format!("{name} {} output", phase.as_str()),
            });
        }
        let raw = fs::read_to_string(&path)?;
        serde_json::from_str(&raw).map_err(|e| StateError::Corrupt {
            path: path.to_string(),
            reason: e.to_string(),
        })
    }

    /// Archive the raw agent transcript for forensic inspection.
    pub fn save_raw_output(&self, name: &str, phase: Phase, text: &str) -> Result<(), StateError> {
        write_file_atomic(&self.raw_output_path(name, phase), text)?;
        Ok(())
    }

    /// Archive the prompt for one attempt and return its path.
    pub fn save_prompt(
        &self,
        name: &str,
        phase: Phase,
        attempt: u32,
        text: &str,
    ) -> Result<Utf8PathBuf, StateError> {
        let path = self.prompt_path(name, phase, attempt);
        write_file_atomic(&path, text)?;
        Ok(path)
    }

    /// Enumerate workflows under the base directory. Directories without a
    /// readable state file are skipped with a warning.
    pub fn list_workflows(&self) -> Result<Vec<WorkflowInfo>, StateError> {
        let mut infos = Vec::new();
        if !self.base_dir.exists() {
            return Ok(infos);
        }
        for entry in fs::read_dir(&self.base_dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            match self.load_state(&name) {
                Ok(state) => infos.push(WorkflowInfo {
                    name: state.name,
                    workflow_type: state.workflow_type,
                    current_phase: state.current_phase,
                    created_at: state.created_at,
                }),
                Err(e) => {
                    tracing::warn!(workflow = %name, error = %e, "skipping unreadable workflow");
                }
            }
        }
        infos.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(infos)
    }

    pub fn delete_workflow(&self, name: &str) -> Result<(), StateError> {
        validate_workflow_name(name)?;
        let dir = self.workflow_dir(name);
        if !dir.exists() {
            return Err(StateError::NotFound {
                name: name.to_string(),
            });
        }
        fs::remove_dir_all(&dir)?;
        Ok(())
    }
}
