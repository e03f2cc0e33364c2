//! # Work Item
//!
//! Durable descriptor of one unit of pipeline work. The registry owns the record;
//! workers only mutate a local copy and save it back.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::{Action, Stage, Status};

/// Host and process that currently claims a work item
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessIdentity {
    pub node: String,
    pub pid: u32,
}

impl ProcessIdentity {
    pub fn new(node: impl Into<String>, pid: u32) -> Self {
        Self {
            node: node.into(),
            pid,
        }
    }

    /// Identity of the running process
    pub fn current() -> Self {
        let node = nix::unistd::gethostname()
            .ok()
            .and_then(|name| name.into_string().ok())
            .unwrap_or_else(|| "localhost".to_string());
        Self::new(node, std::process::id())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkItem {
    #[serde(default)]
    pub id: i64,
    pub action: Action,
    pub stage: Stage,
    pub status: Status,
    pub retry: bool,
    #[serde(default)]
    pub needs_admin_review: bool,
    #[serde(default)]
    pub node: String,
    #[serde(default)]
    pub pid: u32,
    #[serde(default)]
    pub note: String,
    #[serde(default)]
    pub outcome: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub bucket: String,
    #[serde(default)]
    pub etag: String,
    #[serde(default)]
    pub size: i64,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub institution_id: i64,
    #[serde(default)]
    pub intellectual_object_id: i64,
    #[serde(default)]
    pub object_identifier: String,
    #[serde(default)]
    pub generic_file_id: i64,
    #[serde(default)]
    pub generic_file_identifier: String,
    pub queued_at: Option<DateTime<Utc>>,
    pub stage_started_at: Option<DateTime<Utc>>,
    pub date_processed: Option<DateTime<Utc>>,
}

impl WorkItem {
    /// New pending item, not yet saved (id 0)
    pub fn new(action: Action, stage: Stage) -> Self {
        Self {
            id: 0,
            action,
            stage,
            status: Status::Pending,
            retry: true,
            needs_admin_review: false,
            node: String::new(),
            pid: 0,
            note: String::new(),
            outcome: String::new(),
            name: String::new(),
            bucket: String::new(),
            etag: String::new(),
            size: 0,
            user: String::new(),
            institution_id: 0,
            intellectual_object_id: 0,
            object_identifier: String::new(),
            generic_file_id: 0,
            generic_file_identifier: String::new(),
            queued_at: Some(Utc::now()),
            stage_started_at: None,
            date_processed: None,
        }
    }

    /// In-memory item for a fixity check. Never saved to the registry.
    pub fn transient_for_file(generic_file_id: i64, generic_file_identifier: &str) -> Self {
        let mut item = Self::new(Action::FixityCheck, Stage::Requested);
        item.id = -1;
        item.generic_file_id = generic_file_id;
        item.generic_file_identifier = generic_file_identifier.to_string();
        item.name = generic_file_identifier.to_string();
        item
    }

    /// Transient items exist only in memory
    pub fn is_transient(&self) -> bool {
        self.id < 0
    }

    /// Hot-tier restoration item that follows a finished cold-storage restore
    pub fn follow_on_restoration(&self) -> Self {
        let action = if self.generic_file_id > 0 {
            Action::RestoreFile
        } else {
            Action::RestoreObject
        };
        let note = "Moved from Glacier to S3, awaiting restoration".to_string();
        Self {
            id: 0,
            action,
            stage: Stage::Requested,
            status: Status::Pending,
            retry: true,
            needs_admin_review: false,
            node: String::new(),
            pid: 0,
            note: note.clone(),
            outcome: note,
            name: self.name.clone(),
            bucket: self.bucket.clone(),
            etag: self.etag.clone(),
            size: self.size,
            user: self.user.clone(),
            institution_id: self.institution_id,
            intellectual_object_id: self.intellectual_object_id,
            object_identifier: self.object_identifier.clone(),
            generic_file_id: self.generic_file_id,
            generic_file_identifier: self.generic_file_identifier.clone(),
            queued_at: Some(Utc::now()),
            stage_started_at: None,
            date_processed: None,
        }
    }

    /// True when no further processing should happen
    pub fn processing_has_completed(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn set_node_and_pid(&mut self, identity: &ProcessIdentity) {
        self.node = identity.node.clone();
        self.pid = identity.pid;
    }

    pub fn clear_node_and_pid(&mut self) {
        self.node.clear();
        self.pid = 0;
    }

    /// Someone has claimed this item
    pub fn has_lease(&self) -> bool {
        !self.node.is_empty() || self.pid != 0
    }

    pub fn is_leased_by(&self, identity: &ProcessIdentity) -> bool {
        self.node == identity.node && self.pid == identity.pid
    }

    /// The lease is populated and belongs to a different process
    pub fn is_leased_by_other(&self, identity: &ProcessIdentity) -> bool {
        self.has_lease() && !self.is_leased_by(identity)
    }

    pub fn mark_in_progress(
        &mut self,
        identity: &ProcessIdentity,
        stage: Stage,
        status: Status,
        note: impl Into<String>,
    ) {
        self.set_node_and_pid(identity);
        self.stage = stage;
        self.status = status;
        self.note = note.into();
        self.stage_started_at = Some(Utc::now());
    }

    /// Clears the lease and records the new position. Callers set retry and
    /// admin review themselves.
    pub fn mark_no_longer_in_progress(&mut self, stage: Stage, status: Status, note: impl Into<String>) {
        self.clear_node_and_pid();
        self.stage = stage;
        self.status = status;
        self.note = note.into();
    }

    /// Key used by the dedup ring. Transient items key on their file.
    pub fn dedup_key(&self) -> String {
        if self.is_transient() {
            format!("gf:{}", self.generic_file_id)
        } else {
            self.id.to_string()
        }
    }

    /// Label for log lines
    pub fn label(&self) -> String {
        if self.is_transient() {
            format!("GenericFile {}", self.generic_file_identifier)
        } else {
            format!("WorkItem {}", self.id)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity() -> ProcessIdentity {
        ProcessIdentity::new("worker-1", 4242)
    }

    #[test]
    fn test_lease_ownership() {
        let me = identity();
        let mut item = WorkItem::new(Action::RestoreObject, Stage::Requested);
        assert!(!item.has_lease());
        assert!(!item.is_leased_by_other(&me));

        item.set_node_and_pid(&me);
        assert!(item.is_leased_by(&me));
        assert!(!item.is_leased_by_other(&me));

        let other = ProcessIdentity::new("worker-1", 99);
        assert!(item.is_leased_by_other(&other));

        item.clear_node_and_pid();
        assert!(!item.has_lease());
    }

    #[test]
    fn test_follow_on_restoration_action() {
        let mut item = WorkItem::new(Action::GlacierRestore, Stage::Requested);
        item.id = 10;
        item.object_identifier = "inst.edu/bag".to_string();
        item.status = Status::Success;

        let next = item.follow_on_restoration();
        assert_eq!(next.id, 0);
        assert_eq!(next.action, Action::RestoreObject);
        assert_eq!(next.status, Status::Pending);
        assert_eq!(next.stage, Stage::Requested);
        assert!(next.retry);
        assert_eq!(next.object_identifier, "inst.edu/bag");
        assert_eq!(next.note, "Moved from Glacier to S3, awaiting restoration");

        item.generic_file_id = 5;
        assert_eq!(item.follow_on_restoration().action, Action::RestoreFile);
    }

    #[test]
    fn test_transient_item() {
        let item = WorkItem::transient_for_file(77, "inst.edu/bag/data/a.txt");
        assert!(item.is_transient());
        assert_eq!(item.dedup_key(), "gf:77");
        assert_eq!(item.action, Action::FixityCheck);
    }

    #[test]
    fn test_mark_in_progress_then_release() {
        let me = identity();
        let mut item = WorkItem::new(Action::RestoreFile, Stage::Requested);
        item.mark_in_progress(&me, Stage::Requested, Status::Started, "started");
        assert!(item.is_leased_by(&me));
        assert!(item.stage_started_at.is_some());

        item.mark_no_longer_in_progress(Stage::Resolve, Status::Success, "done");
        assert!(!item.has_lease());
        assert_eq!(item.stage, Stage::Resolve);
        assert!(item.processing_has_completed());
    }
}
