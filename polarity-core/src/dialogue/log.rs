//! Experiment log records and their JSON export.

use super::agent::AgentProfile;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum LogError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid log file: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, LogError>;

/// One speaker's contribution to one turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnRecord {
    pub turn: usize,
    pub speaker: String,
    pub stance: String,
    pub model_type: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    /// Set when `message` is a canned fallback instead of a model reply.
    #[serde(default)]
    pub degraded: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentsInfo {
    #[serde(rename = "agent_L")]
    pub agent_l: AgentProfile,
    #[serde(rename = "agent_R")]
    pub agent_r: AgentProfile,
}

/// Headline numbers for one run, used to contrast experiment groups.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogSummary {
    pub experiment_name: String,
    pub records: usize,
    pub degraded: usize,
    /// Mean message length in characters; 0 for an empty log
    pub mean_chars: f64,
}

/// Full record of one experiment run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentLog {
    pub experiment_name: String,
    pub topic: String,
    pub agents: AgentsInfo,
    pub start_time: DateTime<Utc>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    pub dialogue: Vec<TurnRecord>,
}

impl ExperimentLog {
    pub fn new(
        experiment_name: impl Into<String>,
        topic: impl Into<String>,
        agents: AgentsInfo,
    ) -> Self {
        Self {
            experiment_name: experiment_name.into(),
            topic: topic.into(),
            agents,
            start_time: Utc::now(),
            end_time: None,
            dialogue: Vec::new(),
        }
    }

    /// Number of turns that fell back to a canned response.
    pub fn degraded_count(&self) -> usize {
        self.dialogue.iter().filter(|record| record.degraded).count()
    }

    pub fn summary(&self) -> LogSummary {
        let records = self.dialogue.len();
        let total: usize = self
            .dialogue
            .iter()
            .map(|record| record.message.chars().count())
            .sum();
        LogSummary {
            experiment_name: self.experiment_name.clone(),
            records,
            degraded: self.degraded_count(),
            mean_chars: if records == 0 {
                0.0
            } else {
                total as f64 / records as f64
            },
        }
    }

    /// `dialogue_log_{name}_{YYYYmmdd_HHMMSS}.json`, stamped with the start time.
    pub fn default_filename(&self) -> String {
        format!(
            "dialogue_log_{}_{}.json",
            self.experiment_name,
            self.start_time.format("%Y%m%d_%H%M%S")
        )
    }

    /// Writes the log as pretty JSON to `path`.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        info!(path = %path.display(), turns = self.dialogue.len(), "Saved experiment log");
        Ok(())
    }

    /// Writes the log into `dir` under [`default_filename`](Self::default_filename).
    pub fn save_in(&self, dir: impl AsRef<Path>) -> Result<PathBuf> {
        let path = dir.as_ref().join(self.default_filename());
        self.save(&path)?;
        Ok(path)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}
