//! # Restoration Object
//!
//! Describes one restore job. Created at admission, filled in as files are
//! copied and frozen once every file has been restored.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::RestorationType;

/// Tier the bytes are coming from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RestorationSource {
    S3,
    Glacier,
}

/// Profile identifier that selects the default manifest algorithms
pub const DEFAULT_PROFILE_IDENTIFIER: &str =
    "https://raw.githubusercontent.com/APTrust/preservation-services/master/profiles/aptrust-v2.2.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RestorationObject {
    pub identifier: String,
    pub restoration_type: RestorationType,
    pub restoration_source: RestorationSource,
    pub restoration_target: String,
    #[serde(default)]
    pub bagit_profile_identifier: String,
    #[serde(default)]
    pub file_size: i64,
    #[serde(default)]
    pub all_files_restored: bool,
    pub restored_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub error_message: String,
}

impl RestorationObject {
    pub fn new(
        identifier: impl Into<String>,
        restoration_type: RestorationType,
        restoration_source: RestorationSource,
        restoration_target: impl Into<String>,
    ) -> Self {
        Self {
            identifier: identifier.into(),
            restoration_type,
            restoration_source,
            restoration_target: restoration_target.into(),
            bagit_profile_identifier: String::new(),
            file_size: 0,
            all_files_restored: false,
            restored_at: None,
            url: String::new(),
            error_message: String::new(),
        }
    }

    /// Object name without its institution prefix
    pub fn obj_name(&self) -> Option<&str> {
        self.identifier.split_once('/').map(|(_, name)| name)
    }

    /// Digest algorithms written to manifests for a restored bag
    pub fn manifest_algorithms(&self) -> &'static [&'static str] {
        if self.bagit_profile_identifier.is_empty()
            || self.bagit_profile_identifier == DEFAULT_PROFILE_IDENTIFIER
        {
            &["md5", "sha256"]
        } else {
            &["sha512"]
        }
    }

    /// Records the final location. Later calls leave the first result intact.
    pub fn mark_restored(&mut self, url: impl Into<String>) {
        if self.all_files_restored {
            return;
        }
        self.url = url.into();
        self.mark_files_restored();
    }

    /// Records completion without a URL, as when files were only thawed
    pub fn mark_files_restored(&mut self) {
        if self.all_files_restored {
            return;
        }
        self.restored_at = Some(Utc::now());
        self.all_files_restored = true;
    }
}
