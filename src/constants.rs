//! # System Constants
//!
//! Actions, stages and statuses that describe where a work item sits in the
//! preservation pipeline, plus topic names and default timings shared by workers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Broker topics, one per pipeline stage
pub mod topics {
    pub const RESTORE_OBJECT: &str = "restore_object";
    pub const RESTORE_FILE: &str = "restore_file";
    pub const RESTORE_GLACIER: &str = "restore_glacier";
    pub const FIXITY_CHECK: &str = "fixity_check";

    /// Broker channel name for a topic's worker pool
    pub fn channel_for(topic: &str) -> String {
        format!("{topic}_worker_chan")
    }
}

/// Storage provider names as they appear on storage locations
pub mod providers {
    pub const AWS: &str = "AWS";
    pub const WASABI: &str = "Wasabi";
}

/// Timing defaults
pub mod defaults {
    /// Interval between broker visibility extensions while an item is processing
    pub const KEEP_ALIVE_INTERVAL_SECS: u64 = 120;
    /// Files requested from the registry per page
    pub const BATCH_SIZE: usize = 100;
    /// Restore priority assumed for locations that never set one
    pub const RESTORE_PRIORITY: i32 = 10_000;
    /// Non-fatal errors kept on a work result before new ones are dropped
    pub const MAX_WORK_RESULT_ERRORS: usize = 30;
    /// Days a thawed object stays in the hot tier
    pub const COLD_STORAGE_DAYS: u32 = 10;
    pub const COLD_STORAGE_TIER: &str = "Standard";
    pub const RESTORATION_URL_PREFIX: &str = "https://s3.amazonaws.com/";
}

/// What a work item asks the pipeline to do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Action {
    Ingest,
    #[serde(rename = "Fixity Check")]
    FixityCheck,
    #[serde(rename = "Restore File")]
    RestoreFile,
    #[serde(rename = "Restore Object")]
    RestoreObject,
    #[serde(rename = "Glacier Restore")]
    GlacierRestore,
    Delete,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Ingest => "Ingest",
            Action::FixityCheck => "Fixity Check",
            Action::RestoreFile => "Restore File",
            Action::RestoreObject => "Restore Object",
            Action::GlacierRestore => "Glacier Restore",
            Action::Delete => "Delete",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pipeline stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stage {
    Requested,
    Receive,
    Validate,
    #[serde(rename = "Reingest Check")]
    ReingestCheck,
    #[serde(rename = "Copy To Staging")]
    CopyToStaging,
    #[serde(rename = "Format Identification")]
    FormatIdentification,
    Store,
    #[serde(rename = "Storage Validation")]
    StorageValidation,
    Record,
    Cleanup,
    Resolve,
    #[serde(rename = "Available in S3")]
    AvailableInS3,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Requested => "Requested",
            Stage::Receive => "Receive",
            Stage::Validate => "Validate",
            Stage::ReingestCheck => "Reingest Check",
            Stage::CopyToStaging => "Copy To Staging",
            Stage::FormatIdentification => "Format Identification",
            Stage::Store => "Store",
            Stage::StorageValidation => "Storage Validation",
            Stage::Record => "Record",
            Stage::Cleanup => "Cleanup",
            Stage::Resolve => "Resolve",
            Stage::AvailableInS3 => "Available in S3",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Work item status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Status {
    Pending,
    Started,
    Success,
    Failed,
    Cancelled,
    Suspended,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Pending => "Pending",
            Status::Started => "Started",
            Status::Success => "Success",
            Status::Failed => "Failed",
            Status::Cancelled => "Cancelled",
            Status::Suspended => "Suspended",
        }
    }

    /// Statuses after which no worker should touch the item again
    pub fn is_terminal(&self) -> bool {
        matches!(self, Status::Success | Status::Failed | Status::Cancelled)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which kind of target a restoration job copies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RestorationType {
    Object,
    File,
}
