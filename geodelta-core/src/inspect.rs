//! Helpers behind message inspection: grouping by message UUID, UUID search,
//! point selection and the flattened per-point map layer.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::binning::{AnomalyThresholds, Status};
use crate::constants::UUID_SUGGESTION_LIMIT;
use crate::record::{ObservationRecord, SignalPoint};

pub fn group_by_message_uuid<'a, I>(records: I) -> BTreeMap<&'a str, Vec<&'a ObservationRecord>>
where
    I: IntoIterator<Item = &'a ObservationRecord>,
{
    let mut groups: BTreeMap<&'a str, Vec<&'a ObservationRecord>> = BTreeMap::new();
    for rec in records {
        groups.entry(rec.message_uuid.as_str()).or_default().push(rec);
    }
    groups
}

/// Case-insensitive substring match, skipping UUIDs already selected.
pub fn search_uuids<'a>(options: &[&'a str], query: &str, selected: &[&str]) -> Vec<&'a str> {
    let needle = query.to_lowercase();
    options
        .iter()
        .copied()
        .filter(|opt| opt.to_lowercase().contains(&needle) && !selected.contains(opt))
        .take(UUID_SUGGESTION_LIMIT)
        .collect()
}

/// Signal points at the given indices, in record order. Unknown indices are ignored.
pub fn select_points<'a>(record: &'a ObservationRecord, indices: &[usize]) -> Vec<&'a SignalPoint> {
    record
        .signal_points
        .iter()
        .enumerate()
        .filter(|(i, _)| indices.contains(i))
        .map(|(_, p)| p)
        .collect()
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MapPoint<'a> {
    #[serde(flatten)]
    pub point: &'a SignalPoint,
    pub message_uuid: &'a str,
    pub created_date: i64,
    pub status: Status,
}

/// Every signal point tagged with the message it came from and that message's status.
pub fn flatten_map_points<'a, I>(records: I, thresholds: &AnomalyThresholds) -> Vec<MapPoint<'a>>
where
    I: IntoIterator<Item = &'a ObservationRecord>,
{
    let mut out = Vec::new();
    for rec in records {
        let status = thresholds.classify(rec);
        out.extend(rec.signal_points.iter().map(|point| MapPoint {
            point,
            message_uuid: &rec.message_uuid,
            created_date: rec.created_date,
            status,
        }));
    }
    out
}
