//! # Skip Decision
//!
//! Reasons a delivered work item is acknowledged without being processed.
//! Rules are evaluated in a fixed order and the first match wins. Rejections
//! that the item itself should remember (retry disabled, wrong queue) update
//! its note, status and retry flag locally; the engine does not save skipped
//! items.

use std::fmt;

use tracing::info;

use crate::constants::{Action, RestorationType, Status};
use crate::models::{ProcessIdentity, WorkItem};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    RetryDisabled,
    WrongAction { actual: Action, expected: Action },
    WrongRestorationType { expected: RestorationType },
    AlreadyCompleted(Status),
    LeasedByOther { node: String, pid: u32 },
    AlreadyInProcess,
}

impl SkipReason {
    /// Note for the work item, for reasons that set one
    pub fn note(&self, work_item_id: i64) -> Option<String> {
        match self {
            SkipReason::RetryDisabled => Some(format!("Rejecting WorkItem {work_item_id} because retry = false")),
            SkipReason::WrongAction { actual, expected } => Some(format!(
                "Rejecting WorkItem {work_item_id} because action is {actual}, not '{expected}'"
            )),
            SkipReason::WrongRestorationType {
                expected: RestorationType::File,
            } => Some(format!(
                "Rejecting WorkItem {work_item_id} because it's an object restoration and does not belong in the file restoration queue."
            )),
            SkipReason::WrongRestorationType {
                expected: RestorationType::Object,
            } => Some(format!(
                "Rejecting WorkItem {work_item_id} because it's a single-file restoration and does not belong in the bag/object restoration queue."
            )),
            SkipReason::AlreadyCompleted(status) => {
                Some(format!("Rejecting WorkItem {work_item_id} because status is {status}"))
            }
            SkipReason::LeasedByOther { .. } | SkipReason::AlreadyInProcess => None,
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::RetryDisabled => write!(f, "retry disabled"),
            SkipReason::WrongAction { actual, expected } => write!(f, "action {actual}, expected {expected}"),
            SkipReason::WrongRestorationType { expected } => write!(f, "not a {expected:?} restoration"),
            SkipReason::AlreadyCompleted(status) => write!(f, "already {status}"),
            SkipReason::LeasedByOther { node, pid } => write!(f, "leased by {node}/{pid}"),
            SkipReason::AlreadyInProcess => write!(f, "already in process here"),
        }
    }
}

fn has_wrong_restoration_type(item: &WorkItem, expected: RestorationType) -> bool {
    match expected {
        RestorationType::File => item.generic_file_identifier.is_empty(),
        RestorationType::Object => !item.generic_file_identifier.is_empty(),
    }
}

fn evaluate(
    item: &WorkItem,
    expected_action: Action,
    expected_type: Option<RestorationType>,
    identity: &ProcessIdentity,
) -> Option<SkipReason> {
    if !item.retry {
        return Some(SkipReason::RetryDisabled);
    }
    if item.action != expected_action {
        return Some(SkipReason::WrongAction {
            actual: item.action,
            expected: expected_action,
        });
    }
    if let Some(expected) = expected_type.filter(|t| has_wrong_restoration_type(item, *t)) {
        return Some(SkipReason::WrongRestorationType { expected });
    }
    if item.processing_has_completed() {
        return Some(SkipReason::AlreadyCompleted(item.status));
    }
    if item.is_leased_by_other(identity) {
        return Some(SkipReason::LeasedByOther {
            node: item.node.clone(),
            pid: item.pid,
        });
    }
    None
}

/// Every skip check except the dedup ring, which the engine claims
/// atomically.
pub fn check_skip(
    item: &mut WorkItem,
    expected_action: Action,
    expected_type: Option<RestorationType>,
    identity: &ProcessIdentity,
) -> Option<SkipReason> {
    let reason = evaluate(item, expected_action, expected_type, identity)?;

    let note = reason.note(item.id);
    match &reason {
        SkipReason::RetryDisabled => {
            if let Some(note) = &note {
                item.mark_no_longer_in_progress(item.stage, item.status, note.clone());
            }
        }
        SkipReason::WrongAction { .. } | SkipReason::WrongRestorationType { .. } => {
            item.retry = false;
            if let Some(note) = &note {
                item.mark_no_longer_in_progress(item.stage, Status::Cancelled, note.clone());
            }
        }
        _ => {}
    }
    info!(
        work_item_id = item.id,
        reason = %reason,
        note = note.as_deref(),
        "⏭️ Skipping work item"
    );
    Some(reason)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::Stage;

    fn me() -> ProcessIdentity {
        ProcessIdentity::new("host-a", 100)
    }

    fn restore_item() -> WorkItem {
        let mut item = WorkItem::new(Action::RestoreObject, Stage::Requested);
        item.id = 12;
        item.object_identifier = "test.edu/bag".to_string();
        item
    }

    fn check(item: &mut WorkItem) -> Option<SkipReason> {
        check_skip(item, Action::RestoreObject, Some(RestorationType::Object), &me())
    }

    #[test]
    fn test_admits_fresh_item() {
        assert_eq!(check(&mut restore_item()), None);
    }

    #[test]
    fn test_retry_false() {
        let mut item = restore_item();
        item.retry = false;
        item.node = "host-a".to_string();
        assert_eq!(check(&mut item), Some(SkipReason::RetryDisabled));
        assert_eq!(item.note, "Rejecting WorkItem 12 because retry = false");
        assert!(!item.has_lease());
        assert_eq!(item.status, Status::Pending);
    }

    #[test]
    fn test_wrong_action_cancels() {
        let mut item = restore_item();
        item.action = Action::Delete;
        let reason = check(&mut item);
        assert!(matches!(reason, Some(SkipReason::WrongAction { .. })));
        assert_eq!(item.note, "Rejecting WorkItem 12 because action is Delete, not 'Restore Object'");
        assert_eq!(item.status, Status::Cancelled);
        assert!(!item.retry);
    }

    #[test]
    fn test_wrong_restoration_type() {
        let mut item = restore_item();
        item.generic_file_identifier = "test.edu/bag/data/a.txt".to_string();
        assert_eq!(
            check(&mut item),
            Some(SkipReason::WrongRestorationType {
                expected: RestorationType::Object
            })
        );
        assert_eq!(item.status, Status::Cancelled);

        let mut item = restore_item();
        item.action = Action::RestoreFile;
        let reason = check_skip(&mut item, Action::RestoreFile, Some(RestorationType::File), &me());
        assert!(matches!(reason, Some(SkipReason::WrongRestorationType { .. })));
    }

    #[test]
    fn test_terminal_status() {
        let mut item = restore_item();
        item.status = Status::Success;
        assert_eq!(check(&mut item), Some(SkipReason::AlreadyCompleted(Status::Success)));
        assert_eq!(item.note, "");
    }

    #[test]
    fn test_lease_held_elsewhere() {
        let mut item = restore_item();
        item.node = "host-b".to_string();
        item.pid = 7;
        assert_eq!(
            check(&mut item),
            Some(SkipReason::LeasedByOther {
                node: "host-b".to_string(),
                pid: 7
            })
        );
        assert!(item.retry);

        item.set_node_and_pid(&me());
        assert_eq!(check(&mut item), None);
    }

    #[test]
    fn test_rule_order() {
        let mut item = restore_item();
        item.retry = false;
        item.action = Action::Delete;
        item.status = Status::Failed;
        assert_eq!(check(&mut item), Some(SkipReason::RetryDisabled));
    }
}
