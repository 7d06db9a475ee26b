use std::cmp::Ordering;

use log::debug;

use crate::config::*;

/// Pairs every vote with the nearest location reading within `tolerance_min` minutes.
///
/// The join is left-outer: exactly one row is produced per vote, with empty
/// location fields when no reading is close enough. The result does not depend
/// on the order of the location readings.
pub fn join_nearest(
    votes: &[VoteRecord],
    locations: &[LocationRecord],
    tolerance_min: f64,
) -> Vec<JoinedRow> {
    let readings = canonical_locations(locations);
    let tolerance_ms = (tolerance_min * 60_000.0).round() as i64;
    debug!(
        "join_nearest: {} votes, {} distinct readings, tolerance {} ms",
        votes.len(),
        readings.len(),
        tolerance_ms
    );

    votes
        .iter()
        .map(|v| {
            let m = nearest_reading(&readings, v, tolerance_ms);
            JoinedRow {
                timestamp: v.timestamp,
                thermal: v.thermal,
                longitude: m.and_then(|l| l.longitude),
                latitude: m.and_then(|l| l.latitude),
                space_id: m.and_then(|l| l.space_id),
            }
        })
        .collect()
}

// Sorted by time, with a single reading per timestamp.
fn canonical_locations(locations: &[LocationRecord]) -> Vec<&LocationRecord> {
    let mut res: Vec<&LocationRecord> = locations.iter().collect();
    res.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| reading_order(a, b)));
    let before = res.len();
    res.dedup_by(|later, first| later.timestamp == first.timestamp);
    if res.len() < before {
        debug!(
            "canonical_locations: dropped {} readings sharing a timestamp",
            before - res.len()
        );
    }
    res
}

// Total order over the content of two readings taken at the same time.
fn reading_order(a: &LocationRecord, b: &LocationRecord) -> Ordering {
    a.space_id
        .cmp(&b.space_id)
        .then_with(|| cmp_coord(a.longitude, b.longitude))
        .then_with(|| cmp_coord(a.latitude, b.latitude))
}

fn cmp_coord(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => x.total_cmp(&y),
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn nearest_reading<'a>(
    readings: &[&'a LocationRecord],
    vote: &VoteRecord,
    tolerance_ms: i64,
) -> Option<&'a LocationRecord> {
    // First reading at or after the vote.
    let idx = readings.partition_point(|l| l.timestamp < vote.timestamp);
    let distance = |l: &LocationRecord| (l.timestamp - vote.timestamp).num_milliseconds().abs();

    let backward = idx.checked_sub(1).map(|i| readings[i]);
    let forward = readings.get(idx).copied();

    let best = match (backward, forward) {
        // Equidistant readings: the earlier one wins.
        (Some(b), Some(f)) if distance(b) <= distance(f) => Some(b),
        (_, Some(f)) => Some(f),
        (Some(b), None) => Some(b),
        (None, None) => None,
    };
    best.filter(|l| distance(l) <= tolerance_ms)
}
