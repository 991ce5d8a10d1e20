//! Execution records, bounded history, and the optional JSONL log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use uuid::Uuid;

use super::error::WorkflowError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Running,
    Succeeded,
    Failed,
}

impl ExecutionStatus {
    pub fn is_finished(&self) -> bool {
        !matches!(self, ExecutionStatus::Running)
    }
}

/// One handler invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowExecution {
    pub execution_id: Uuid,
    pub workflow_id: String,
    /// `None` for manual triggers.
    pub triggering_path: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub status: ExecutionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
}

impl WorkflowExecution {
    pub fn start(workflow_id: &str, triggering_path: Option<String>) -> Self {
        Self {
            execution_id: Uuid::new_v4(),
            workflow_id: workflow_id.to_string(),
            triggering_path,
            started_at: Utc::now(),
            finished_at: None,
            status: ExecutionStatus::Running,
            error: None,
            output: None,
        }
    }

    pub fn succeed(&mut self, output: Option<Value>) {
        self.finished_at = Some(Utc::now());
        self.status = ExecutionStatus::Succeeded;
        self.output = output;
    }

    pub fn fail(&mut self, error: impl ToString) {
        self.finished_at = Some(Utc::now());
        self.status = ExecutionStatus::Failed;
        self.error = Some(error.to_string());
    }

    pub fn duration_ms(&self) -> Option<i64> {
        self.finished_at
            .map(|end| (end - self.started_at).num_milliseconds())
    }
}

/// Ring buffer of executions; the oldest entry is evicted at capacity.
#[derive(Debug)]
pub struct ExecutionHistory {
    entries: VecDeque<WorkflowExecution>,
    capacity: usize,
}

impl ExecutionHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
        }
    }

    /// Insert a new record, or replace the record with the same id.
    pub fn upsert(&mut self, execution: WorkflowExecution) {
        if let Some(slot) = self
            .entries
            .iter_mut()
            .rev()
            .find(|e| e.execution_id == execution.execution_id)
        {
            *slot = execution;
            return;
        }
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(execution);
    }

    pub fn get(&self, id: &Uuid) -> Option<&WorkflowExecution> {
        self.entries.iter().rev().find(|e| &e.execution_id == id)
    }

    /// Newest first.
    pub fn recent(&self, limit: usize) -> Vec<WorkflowExecution> {
        self.entries.iter().rev().take(limit).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Append-only JSONL log of finished executions.
#[derive(Debug)]
pub struct ExecutionLog {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl ExecutionLog {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, WorkflowError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            writer: BufWriter::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&mut self, execution: &WorkflowExecution) -> Result<(), WorkflowError> {
        let line = serde_json::to_string(execution)
            .map_err(|e| WorkflowError::Log(std::io::Error::other(e)))?;
        writeln!(self.writer, "{line}")?;
        self.writer.flush()?;
        Ok(())
    }

    /// Read back the last `limit` records, skipping unparseable lines.
    pub fn read_tail(path: &Path, limit: usize) -> Result<Vec<WorkflowExecution>, WorkflowError> {
        let content = std::fs::read_to_string(path)?;
        let mut records: Vec<WorkflowExecution> = content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect();
        let skip = records.len().saturating_sub(limit);
        records.drain(..skip);
        records.reverse();
        Ok(records)
    }
}
