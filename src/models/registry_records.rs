//! Records read from the metadata registry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checksum {
    #[serde(default)]
    pub id: i64,
    pub algorithm: String,
    pub digest: String,
    pub datetime: DateTime<Utc>,
    #[serde(default)]
    pub generic_file_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageRecord {
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub generic_file_id: i64,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenericFile {
    pub id: i64,
    pub identifier: String,
    #[serde(default)]
    pub institution_id: i64,
    #[serde(default)]
    pub intellectual_object_id: i64,
    pub size: i64,
    #[serde(default = "active_state")]
    pub state: String,
    #[serde(default)]
    pub storage_option: String,
    #[serde(default)]
    pub checksums: Vec<Checksum>,
    #[serde(default)]
    pub storage_records: Vec<StorageRecord>,
    pub file_modified: Option<DateTime<Utc>>,
}

fn active_state() -> String {
    "A".to_string()
}

impl GenericFile {
    /// Identifier minus the leading institution, e.g. `bag/data/file.txt`
    pub fn path_minus_institution(&self) -> Option<&str> {
        self.identifier.split_once('/').map(|(_, rest)| rest)
    }

    /// Path inside the original bag, e.g. `data/file.txt`
    pub fn path_in_bag(&self) -> Option<&str> {
        self.path_minus_institution()
            .and_then(|rest| rest.split_once('/'))
            .map(|(_, path)| path)
    }

    /// Most recent checksum for `algorithm`
    pub fn latest_checksum(&self, algorithm: &str) -> Option<&Checksum> {
        self.checksums
            .iter()
            .filter(|c| c.algorithm == algorithm)
            .max_by_key(|c| c.datetime)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntellectualObject {
    pub id: i64,
    pub identifier: String,
    pub institution_id: i64,
    #[serde(default)]
    pub bagit_profile_identifier: String,
    #[serde(default)]
    pub storage_option: String,
    #[serde(default)]
    pub file_count: i64,
    #[serde(default)]
    pub size: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Institution {
    pub id: i64,
    pub identifier: String,
    #[serde(default)]
    pub name: String,
    /// Depositor-accessible bucket that restorations are copied into
    pub restore_bucket: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn file(identifier: &str) -> GenericFile {
        GenericFile {
            id: 1,
            identifier: identifier.to_string(),
            institution_id: 1,
            intellectual_object_id: 1,
            size: 10,
            state: active_state(),
            storage_option: "Standard".to_string(),
            checksums: Vec::new(),
            storage_records: Vec::new(),
            file_modified: None,
        }
    }

    #[test]
    fn test_paths() {
        let gf = file("test.edu/bag/data/file.txt");
        assert_eq!(gf.path_minus_institution(), Some("bag/data/file.txt"));
        assert_eq!(gf.path_in_bag(), Some("data/file.txt"));
        assert_eq!(file("nope").path_minus_institution(), None);
    }

    #[test]
    fn test_latest_checksum() {
        let now = Utc::now();
        let mut gf = file("test.edu/bag/data/file.txt");
        for (digest, age) in [("old", 10), ("new", 1)] {
            gf.checksums.push(Checksum {
                id: 0,
                algorithm: "sha256".to_string(),
                digest: digest.to_string(),
                datetime: now - Duration::days(age),
                generic_file_id: 1,
            });
        }
        assert_eq!(gf.latest_checksum("sha256").map(|c| c.digest.as_str()), Some("new"));
        assert!(gf.latest_checksum("md5").is_none());
    }
}
