//! # Storage Location
//!
//! One physical copy location for preserved files. Loaded from configuration and
//! read-only at runtime.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

use crate::constants::defaults::RESTORE_PRIORITY;

fn host_with_region_prefix() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[Ss]3\.\w{2}-\w+-\d\.").expect("static host pattern"))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageLocation {
    pub bucket: String,
    #[serde(default)]
    pub description: String,
    pub host: String,
    pub provider: String,
    pub region: String,
    /// Lower values are preferred when choosing a copy to restore from
    #[serde(default = "default_restore_priority")]
    pub restore_priority: i32,
    #[serde(default)]
    pub storage_class: String,
}

fn default_restore_priority() -> i32 {
    RESTORE_PRIORITY
}

impl StorageLocation {
    /// Host with the region embedded, e.g. `s3.us-east-1.amazonaws.com`
    pub fn host_with_region(&self) -> String {
        if self.region_is_embedded_in_host() {
            return self.host.to_lowercase();
        }
        let host = self.host.to_lowercase();
        let host = host.strip_prefix("s3.").unwrap_or(&host);
        format!("s3.{}.{}", self.region, host)
    }

    pub fn region_is_embedded_in_host(&self) -> bool {
        host_with_region_prefix().is_match(&self.host)
    }

    /// True if `url` points into this bucket. Older AWS URLs omit the region,
    /// so both forms are accepted.
    pub fn hosts_url(&self, url: &str) -> bool {
        let with_region = format!("https://{}/{}/", self.host_with_region(), self.bucket);
        let without_region = format!("https://{}/{}/", self.host, self.bucket);
        url.starts_with(&with_region) || url.starts_with(&without_region)
    }

    pub fn url_for(&self, key: &str) -> String {
        format!("https://{}/{}/{}", self.host_with_region(), self.bucket, key)
    }

    /// Object key of a stored URL, i.e. the last path component
    pub fn key_from_url(url: &str) -> &str {
        url.rsplit('/').next().unwrap_or(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn location(host: &str, region: &str) -> StorageLocation {
        StorageLocation {
            bucket: "preservation.va".to_string(),
            description: String::new(),
            host: host.to_string(),
            provider: "AWS".to_string(),
            region: region.to_string(),
            restore_priority: 1,
            storage_class: "STANDARD".to_string(),
        }
    }

    #[test]
    fn test_host_with_region() {
        assert_eq!(
            location("s3.amazonaws.com", "us-east-1").host_with_region(),
            "s3.us-east-1.amazonaws.com"
        );
        assert_eq!(
            location("s3.us-west-1.wasabisys.com", "us-west-1").host_with_region(),
            "s3.us-west-1.wasabisys.com"
        );
    }

    #[test]
    fn test_hosts_url_with_and_without_region() {
        let loc = location("s3.amazonaws.com", "us-east-1");
        assert!(loc.hosts_url("https://s3.amazonaws.com/preservation.va/abc"));
        assert!(loc.hosts_url("https://s3.us-east-1.amazonaws.com/preservation.va/abc"));
        assert!(!loc.hosts_url("https://s3.amazonaws.com/preservation.or/abc"));
        assert_eq!(
            loc.url_for("abc"),
            "https://s3.us-east-1.amazonaws.com/preservation.va/abc"
        );
    }

    #[test]
    fn test_key_from_url() {
        assert_eq!(
            StorageLocation::key_from_url("https://s3.amazonaws.com/b/1234-uuid"),
            "1234-uuid"
        );
    }
}
