//! Drill hole provisioning: make sure every hole a run references has a
//! remote id before any image is uploaded against it.
//!
//! By default a create call is issued for every distinct hole name, whether or
//! not the portal already knows it. With `reuse_existing_holes` the drill hole
//! listing is consulted first and known names reuse their existing id.

use std::collections::{BTreeSet, HashMap};
use tracing::{error, info, warn};

use crate::contract::{ApiError, DrillHoleItem, NewDrillHole, PortalApi};
use crate::model::{FieldValue, StagedImage};
use crate::report::RunLog;

/// Hole name to remote drill hole id for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrillHoleMap(HashMap<String, i64>);

impl DrillHoleMap {
    pub fn get(&self, hole_name: &str) -> Option<i64> {
        self.0.get(hole_name).copied()
    }

    pub fn insert(&mut self, hole_name: impl Into<String>, id: i64) {
        self.0.insert(hole_name.into(), id);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A hole that could not be provisioned.
#[derive(Debug)]
pub struct ProvisionFailure {
    pub hole_name: String,
    pub error: ApiError,
}

#[derive(Debug, Default)]
pub struct ProvisionReport {
    pub holes: DrillHoleMap,
    pub created: usize,
    pub reused: usize,
    pub failures: Vec<ProvisionFailure>,
}

/// Existing holes by name, for the reuse mode. Entries without a name or a
/// numeric id are ignored.
pub fn existing_hole_ids(items: &[DrillHoleItem]) -> DrillHoleMap {
    let mut map = DrillHoleMap::default();
    for item in items {
        let name = item.name.as_deref().map(str::trim).filter(|n| !n.is_empty());
        let id = item
            .id
            .as_ref()
            .and_then(FieldValue::from_json)
            .and_then(|v| v.as_i64());
        match (name, id) {
            (Some(name), Some(id)) => map.insert(name, id),
            _ => warn!(id = ?item.id, name = ?item.name, "Ignoring drill hole without name or id"),
        }
    }
    map
}

/// Create (or, with `existing`, reuse) one drill hole per distinct hole name
/// in `staged`.
///
/// A failed create is logged and recorded; the name stays out of the map so
/// the images on that hole fail individually later on.
pub async fn provision_drill_holes<A>(
    api: &A,
    project_id: i64,
    prospect_id: i64,
    staged: &[StagedImage],
    existing: Option<&DrillHoleMap>,
    log: &mut RunLog,
) -> ProvisionReport
where
    A: PortalApi + ?Sized,
{
    let names: BTreeSet<&str> = staged.iter().map(|s| s.hole_name.as_str()).collect();
    info!(holes = names.len(), reuse = existing.is_some(), "[PROVISION] Provisioning drill holes");
    log.section("Drill Hole Creation");

    let mut report = ProvisionReport::default();
    for name in names {
        if let Some(id) = existing.and_then(|known| known.get(name)) {
            info!(hole = name, id, "[PROVISION] Reusing existing drill hole");
            log.event(format_args!("Reusing drill hole {name} (ID: {id})"));
            report.holes.insert(name, id);
            report.reused += 1;
            continue;
        }

        let request = NewDrillHole {
            name: name.to_string(),
            project_id,
            prospect_id,
        };
        match api.create_drill_hole(request).await {
            Ok(id) => {
                info!(hole = name, id, "[PROVISION] Created drill hole");
                log.event(format_args!("Created drill hole {name} (ID: {id})"));
                report.holes.insert(name, id);
                report.created += 1;
            }
            Err(e) => {
                error!(hole = name, error = %e, "[PROVISION][ERROR] Drill hole creation failed");
                log.event(format_args!("Failed to create drill hole {name}: {e}"));
                report.failures.push(ProvisionFailure {
                    hole_name: name.to_string(),
                    error: e,
                });
            }
        }
    }

    info!(
        created = report.created,
        reused = report.reused,
        failed = report.failures.len(),
        "[PROVISION] Drill hole provisioning finished"
    );
    report
}
