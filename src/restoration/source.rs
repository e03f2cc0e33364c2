//! Choosing which preserved copy of a file to read.

use tracing::debug;

use super::{RestorationError, RestorationResult};
use crate::models::{GenericFile, StorageLocation, StorageRecord};

/// The copy a restoration will read from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestorationSourceMatch<'a> {
    pub location: &'a StorageLocation,
    pub record: &'a StorageRecord,
}

impl RestorationSourceMatch<'_> {
    /// Object key of the stored copy
    pub fn key(&self) -> &str {
        StorageLocation::key_from_url(&self.record.url)
    }

    pub fn url(&self) -> &str {
        &self.record.url
    }
}

/// Returns the location with the lowest restore priority that hosts one of the
/// file's stored URLs. Storage records are scanned in order, and locations in
/// order within each record; the first location seen at a given priority wins.
pub fn best_restoration_source<'a>(
    file: &'a GenericFile,
    locations: &'a [StorageLocation],
) -> RestorationResult<RestorationSourceMatch<'a>> {
    let mut best: Option<RestorationSourceMatch<'a>> = None;
    for record in &file.storage_records {
        for location in locations {
            if !location.hosts_url(&record.url) {
                continue;
            }
            let better = best.map_or(true, |current| {
                location.restore_priority < current.location.restore_priority
            });
            if better {
                best = Some(RestorationSourceMatch { location, record });
            }
        }
    }

    match best {
        Some(source) => {
            debug!(
                identifier = %file.identifier,
                bucket = %source.location.bucket,
                priority = source.location.restore_priority,
                "Most accessible source selected"
            );
            Ok(source)
        }
        None => Err(RestorationError::NoSource {
            identifier: file.identifier.clone(),
            urls: file.storage_records.len(),
            locations: locations.len(),
        }),
    }
}
