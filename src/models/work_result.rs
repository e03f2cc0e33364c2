//! # Work Result
//!
//! Per (work item, stage) execution record kept in the result cache.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::panic::Location;

use crate::constants::defaults::MAX_WORK_RESULT_ERRORS;
use crate::models::ProcessIdentity;

/// One error raised while processing a work item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingError {
    pub work_item_id: i64,
    /// Object or file identifier the error is about
    pub identifier: String,
    pub message: String,
    pub is_fatal: bool,
    /// `file:line` of the code that raised it
    pub source_location: String,
}

impl ProcessingError {
    #[track_caller]
    pub fn new(
        work_item_id: i64,
        identifier: impl Into<String>,
        message: impl Into<String>,
        is_fatal: bool,
    ) -> Self {
        let caller = Location::caller();
        Self {
            work_item_id,
            identifier: identifier.into(),
            message: message.into(),
            is_fatal,
            source_location: format!("{}:{}", caller.file(), caller.line()),
        }
    }

    #[track_caller]
    pub fn fatal(work_item_id: i64, identifier: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(work_item_id, identifier, message, true)
    }

    #[track_caller]
    pub fn transient(
        work_item_id: i64,
        identifier: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::new(work_item_id, identifier, message, false)
    }
}

impl fmt::Display for ProcessingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.identifier, self.message)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkResult {
    pub work_item_id: i64,
    pub operation: String,
    pub attempt: u32,
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub pid: u32,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub errors: Vec<ProcessingError>,
}

impl WorkResult {
    pub fn new(work_item_id: i64, operation: impl Into<String>) -> Self {
        Self {
            work_item_id,
            operation: operation.into(),
            attempt: 0,
            host: String::new(),
            pid: 0,
            started_at: None,
            finished_at: None,
            errors: Vec::new(),
        }
    }

    /// Clears everything from the previous attempt except attempt and operation
    pub fn reset(&mut self) {
        self.host.clear();
        self.pid = 0;
        self.started_at = None;
        self.finished_at = None;
        self.errors.clear();
    }

    pub fn start(&mut self, identity: &ProcessIdentity) {
        self.attempt += 1;
        self.host = identity.node.clone();
        self.pid = identity.pid;
        self.started_at = Some(Utc::now());
        self.finished_at = None;
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    /// Appends an error. Non-fatal errors stop accumulating at the cap;
    /// fatal errors are always kept.
    pub fn add_error(&mut self, error: ProcessingError) {
        if error.is_fatal || self.errors.len() < MAX_WORK_RESULT_ERRORS {
            self.errors.push(error);
        }
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn has_fatal_errors(&self) -> bool {
        self.errors.iter().any(|e| e.is_fatal)
    }

    pub fn fatal_error_message(&self) -> String {
        join_messages(self.errors.iter().filter(|e| e.is_fatal))
    }

    pub fn non_fatal_error_message(&self) -> String {
        join_messages(self.errors.iter().filter(|e| !e.is_fatal))
    }
}

fn join_messages<'a>(errors: impl Iterator<Item = &'a ProcessingError>) -> String {
    errors
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" | ")
}
