//! Test data builders

use chrono::Utc;
use md5::Md5;
use sha2::{Digest, Sha256};

use preservation_core::constants::{Action, Stage};
use preservation_core::models::{
    Checksum, GenericFile, Institution, IntellectualObject, StorageLocation, StorageRecord, WorkItem,
};
use preservation_core::registry::InMemoryRegistry;

pub const INSTITUTION_ID: i64 = 7;
pub const RESTORE_BUCKET: &str = "restore.test.edu";

pub fn location(bucket: &str, region: &str, priority: i32, storage_class: &str) -> StorageLocation {
    StorageLocation {
        bucket: bucket.to_string(),
        description: String::new(),
        host: "s3.amazonaws.com".to_string(),
        provider: "AWS".to_string(),
        region: region.to_string(),
        restore_priority: priority,
        storage_class: storage_class.to_string(),
    }
}

/// Institution and object records every restoration needs
pub fn insert_object(registry: &InMemoryRegistry, identifier: &str, storage_option: &str) {
    registry.insert_institution(Institution {
        id: INSTITUTION_ID,
        identifier: "test.edu".to_string(),
        name: "Test University".to_string(),
        restore_bucket: RESTORE_BUCKET.to_string(),
    });
    registry.insert_object(IntellectualObject {
        id: 1,
        identifier: identifier.to_string(),
        institution_id: INSTITUTION_ID,
        bagit_profile_identifier: String::new(),
        storage_option: storage_option.to_string(),
        file_count: 0,
        size: 0,
    });
}

/// Builder for preserved files
pub struct GenericFileBuilder {
    file: GenericFile,
}

impl GenericFileBuilder {
    pub fn new(id: i64, identifier: &str) -> Self {
        Self {
            file: GenericFile {
                id,
                identifier: identifier.to_string(),
                institution_id: INSTITUTION_ID,
                intellectual_object_id: 1,
                size: 0,
                state: "A".to_string(),
                storage_option: "Standard".to_string(),
                checksums: Vec::new(),
                storage_records: Vec::new(),
                file_modified: Some(Utc::now()),
            },
        }
    }

    /// Sets size and md5/sha256 checksums from `content`
    pub fn with_content(mut self, content: &[u8]) -> Self {
        self.file.size = content.len() as i64;
        for (algorithm, digest) in [
            ("md5", hex::encode(Md5::digest(content))),
            ("sha256", hex::encode(Sha256::digest(content))),
        ] {
            self.file.checksums.push(Checksum {
                id: 0,
                algorithm: algorithm.to_string(),
                digest,
                datetime: Utc::now(),
                generic_file_id: self.file.id,
            });
        }
        self
    }

    pub fn stored_at(mut self, location: &StorageLocation, key: &str) -> Self {
        self.file.storage_records.push(StorageRecord {
            id: 0,
            generic_file_id: self.file.id,
            url: location.url_for(key),
        });
        self
    }

    pub fn with_storage_option(mut self, storage_option: &str) -> Self {
        self.file.storage_option = storage_option.to_string();
        self
    }

    pub fn build(self) -> GenericFile {
        self.file
    }
}

pub fn restore_request(action: Action, object_identifier: &str) -> WorkItem {
    let mut item = WorkItem::new(action, Stage::Requested);
    item.object_identifier = object_identifier.to_string();
    item.institution_id = INSTITUTION_ID;
    item.intellectual_object_id = 1;
    item.user = "depositor@test.edu".to_string();
    item
}
