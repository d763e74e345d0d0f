// SPDX-License-Identifier: MIT

//! Workflow loader - JSON and YAML file loading
//!
//! Files ending in `.yaml`/`.yml` are parsed as YAML, everything else as
//! JSON. Both carry the same shape as an HTTP submission.

use super::types::WorkflowRequest;
use crate::kit::error::{Result, WorkflowError};
use std::fs;
use std::path::Path;

/// Loads workflow submissions from disk
pub struct WorkflowLoader;

impl WorkflowLoader {
    pub fn new() -> Self {
        Self
    }

    /// Load a workflow from a JSON or YAML file
    pub fn load_workflow<P: AsRef<Path>>(&self, path: P) -> Result<WorkflowRequest> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(WorkflowError::FileNotFound(path.display().to_string()).into());
        }

        let content = fs::read_to_string(path)?;
        let is_yaml = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case("yaml") || e.eq_ignore_ascii_case("yml"))
            .unwrap_or(false);

        if is_yaml {
            Self::parse_yaml(&content)
        } else {
            Self::parse_json(&content)
        }
    }

    pub fn parse_yaml(content: &str) -> Result<WorkflowRequest> {
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn parse_json(content: &str) -> Result<WorkflowRequest> {
        Ok(serde_json::from_str(content)?)
    }
}

impl Default for WorkflowLoader {
    fn default() -> Self {
        Self::new()
    }
}
