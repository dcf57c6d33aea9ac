// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Run journal.
//!
//! Every run start, completed step and run outcome can be appended to a
//! daily JSONL file so runs stay inspectable after the process exits.
//!
//! ```text
//! {root}/
//!   {date}/runs.jsonl   # one RunEvent per line
//! ```

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::checker::Step;

/// Types of journaled events.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunEventType {
    RunStarted,
    StepCompleted,
    RunPassed,
    RunFailed,
}

/// A journal entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunEvent {
    /// Unique event ID.
    pub event_id: String,
    /// Run the event belongs to.
    pub run_id: Uuid,
    /// When the event occurred.
    pub timestamp: DateTime<Utc>,
    pub event_type: RunEventType,
    /// Step the event refers to, if any.
    pub step: Option<Step>,
    /// Observed values as JSON.
    pub details: Option<serde_json::Value>,
    pub success: bool,
    pub error: Option<String>,
}

impl RunEvent {
    pub fn new(run_id: Uuid, event_type: RunEventType) -> Self {
        Self {
            event_id: Uuid::new_v4().to_string(),
            run_id,
            timestamp: Utc::now(),
            event_type,
            step: None,
            details: None,
            success: true,
            error: None,
        }
    }

    pub fn with_step(mut self, step: Step) -> Self {
        self.step = Some(step);
        self
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Mark as failed with error message.
    pub fn failed(mut self, error: impl Into<String>) -> Self {
        self.success = false;
        self.error = Some(error.into());
        self
    }
}

#[derive(Debug, thiserror::Error)]
pub enum JournalError {
    #[error("Journal I/O error at {path}: {reason}")]
    Io { path: String, reason: String },

    #[error("Journal serialization error: {0}")]
    Serialization(String),
}

/// Append-only JSONL journal rooted at a directory.
#[derive(Debug, Clone)]
pub struct RunJournal {
    root: PathBuf,
}

impl RunJournal {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn events_file(&self, date: &str) -> PathBuf {
        self.root.join(date).join("runs.jsonl")
    }

    /// Append an event to the file of the day it occurred.
    pub fn log(&self, event: &RunEvent) -> Result<(), JournalError> {
        let date = event.timestamp.format("%Y-%m-%d").to_string();
        let path = self.events_file(&date);
        let io_error = |e: std::io::Error| JournalError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        };

        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).map_err(io_error)?;
        }

        let mut line = serde_json::to_string(event)
            .map_err(|e| JournalError::Serialization(e.to_string()))?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(io_error)?;
        file.write_all(line.as_bytes()).map_err(io_error)
    }

    /// Read events journaled on `date` (`YYYY-MM-DD`).
    pub fn read_events(&self, date: &str) -> Result<Vec<RunEvent>, JournalError> {
        let path = self.events_file(date);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(JournalError::Io {
                    path: path.display().to_string(),
                    reason: e.to_string(),
                })
            }
        };

        content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| {
                serde_json::from_str(line).map_err(|e| JournalError::Serialization(e.to_string()))
            })
            .collect()
    }
}
