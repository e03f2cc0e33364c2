//! # Data Model
//!
//! Work items, work results, restoration jobs, storage locations and the
//! registry records they refer to.

pub mod registry_records;
pub mod restoration_object;
pub mod storage_location;
pub mod work_item;
pub mod work_result;

pub use registry_records::{Checksum, GenericFile, Institution, IntellectualObject, StorageRecord};
pub use restoration_object::{RestorationObject, RestorationSource};
pub use storage_location::StorageLocation;
pub use work_item::{ProcessIdentity, WorkItem};
pub use work_result::{ProcessingError, WorkResult};
