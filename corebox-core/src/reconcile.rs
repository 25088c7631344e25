//! Duplicate detection between staged images and what the portal already holds.
//!
//! Two records are the same upload when their [`IdentityKey`]s match. The
//! file name is not part of the key: the same box photo is routinely
//! re-exported under a different name.

use tracing::warn;

use crate::contract::ImageItem;
use crate::model::{FieldValue, IdentityKey, RemoteImageRecord, StagedImage};

/// Depths closer than this are the same depth.
pub const DEPTH_TOLERANCE: f64 = 1e-4;

fn depth_matches(a: &FieldValue, b: &FieldValue) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => (x - y).abs() < DEPTH_TOLERANCE,
        _ => a.as_str() == b.as_str(),
    }
}

fn type_matches(a: &FieldValue, b: &FieldValue) -> bool {
    match (a.as_i64(), b.as_i64()) {
        (Some(x), Some(y)) => x == y,
        _ => a.as_str() == b.as_str(),
    }
}

impl IdentityKey {
    /// All four fields must hold at once.
    pub fn matches(&self, other: &IdentityKey) -> bool {
        self.hole_name == other.hole_name
            && depth_matches(&self.depth_from, &other.depth_from)
            && depth_matches(&self.depth_to, &other.depth_to)
            && type_matches(&self.standard_type, &other.standard_type)
    }
}

/// Convert listing items into comparable records, skipping (and warning
/// about) any item that lacks a key field.
pub fn remote_records(items: &[ImageItem]) -> Vec<RemoteImageRecord> {
    let mut records = Vec::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
        match RemoteImageRecord::from_item(item) {
            Ok(record) => records.push(record),
            Err(missing) => {
                warn!(
                    index,
                    id = ?item.id,
                    %missing,
                    "Skipping remote image with incomplete data"
                );
            }
        }
    }
    records
}

/// The first remote record that is the same upload as `key`, if any.
pub fn find_match<'r>(
    key: &IdentityKey,
    remote: &'r [RemoteImageRecord],
) -> Option<&'r RemoteImageRecord> {
    remote.iter().find(|record| key.matches(&record.key))
}

/// Whether `staged` has already been uploaded.
pub fn is_duplicate(staged: &StagedImage, remote: &[RemoteImageRecord]) -> bool {
    find_match(&staged.identity_key(), remote).is_some()
}

/// Remote images that share one identity key.
#[derive(Debug, Clone, PartialEq)]
pub struct DuplicateGroup {
    pub key: IdentityKey,
    /// Ids in listing order; the first one is the copy to keep.
    pub ids: Vec<String>,
}

impl DuplicateGroup {
    pub fn redundant_ids(&self) -> &[String] {
        &self.ids[1..]
    }
}

/// Group remote records by identity key and return every group holding more
/// than one image.
pub fn find_remote_duplicates(records: &[RemoteImageRecord]) -> Vec<DuplicateGroup> {
    let mut groups: Vec<DuplicateGroup> = Vec::new();
    for record in records {
        match groups.iter_mut().find(|g| g.key.matches(&record.key)) {
            Some(group) => group.ids.push(record.id.clone()),
            None => groups.push(DuplicateGroup {
                key: record.key.clone(),
                ids: vec![record.id.clone()],
            }),
        }
    }
    groups.retain(|g| g.ids.len() > 1);
    groups
}
