use crate::types::{BoundingBox, PositionRecord, Snapshot};

/// Records of `snapshot` inside `bounding_box`, inclusive on both axes,
/// in the order they appear in the snapshot.
#[must_use]
pub fn filter(snapshot: &Snapshot, bounding_box: &BoundingBox) -> Vec<PositionRecord> {
    filter_records(&snapshot.records, bounding_box)
}

#[must_use]
pub fn filter_records(records: &[PositionRecord], bounding_box: &BoundingBox) -> Vec<PositionRecord> {
    records
        .iter()
        .filter(|record| bounding_box.contains(record.latitude, record.longitude))
        .cloned()
        .collect()
}
