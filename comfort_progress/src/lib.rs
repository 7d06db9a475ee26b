mod config;
pub mod builder;
mod join;
mod report;
mod session;

use chrono::{DateTime, FixedOffset};
use log::{debug, info, warn};

pub use crate::config::*;
pub use crate::join::join_nearest;
pub use crate::report::*;
pub use crate::session::*;

// **** Private structures ****

// Walk state for one participant. It is rebuilt from scratch for every report.
#[derive(PartialEq, Debug, Clone, Copy)]
enum CursorState {
    // No located vote seen yet.
    Init,
    // Time of the last vote accepted as valid.
    Tracking(DateTime<FixedOffset>),
}

// The decision taken for one located row.
#[derive(PartialEq, Debug, Clone, Copy)]
enum RowDecision {
    Accept,
    Reject,
    Duplicate,
}

impl CursorState {
    /// Decides on a row and moves the cursor if the row is accepted.
    fn step(&mut self, ts: DateTime<FixedOffset>, min_time_between_votes: f64) -> RowDecision {
        match *self {
            CursorState::Init => {
                // The first located vote is always admissible.
                *self = CursorState::Tracking(ts);
                RowDecision::Accept
            }
            CursorState::Tracking(cursor) => {
                let delta = minutes_between(ts, cursor).abs();
                if delta == 0.0 {
                    RowDecision::Duplicate
                } else if delta >= min_time_between_votes {
                    *self = CursorState::Tracking(ts);
                    RowDecision::Accept
                } else {
                    RowDecision::Reject
                }
            }
        }
    }
}

fn minutes_between(a: DateTime<FixedOffset>, b: DateTime<FixedOffset>) -> f64 {
    let delta = a - b;
    match delta.num_microseconds() {
        Some(us) => us as f64 / 60_000_000.0,
        None => delta.num_milliseconds() as f64 / 60_000.0,
    }
}

// A space id that could not be resolved, and the number of valid points before it.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
struct MissingSpace {
    space_id: i64,
    valid_so_far: usize,
}

/// Labels the located rows as valid or invalid.
///
/// Rows without coordinates and rows sharing the timestamp of the last valid
/// vote are dropped. The rows must be sorted by time.
fn classify_rows(
    participant_id: &str,
    rows: &[JoinedRow],
    rules: &ProgressRules,
    spaces: &SpaceDirectory,
) -> Result<Vec<ClassifiedPoint>, MissingSpace> {
    let mut state = CursorState::Init;
    let mut points: Vec<ClassifiedPoint> = Vec::new();
    let mut valid_so_far: usize = 0;

    for row in rows.iter() {
        let (longitude, latitude) = match (row.longitude, row.latitude) {
            (Some(lon), Some(lat)) => (lon, lat),
            _ => {
                // Not given within range of a beacon.
                continue;
            }
        };

        let label = match state.step(row.timestamp, rules.min_time_between_votes) {
            RowDecision::Duplicate => {
                warn!(
                    "Duplicated vote for {} at {}, ignoring it",
                    participant_id, row.timestamp
                );
                continue;
            }
            RowDecision::Accept => PointLabel::Valid,
            RowDecision::Reject => PointLabel::Invalid,
        };

        let space_name = match spaces.resolve(row.space_id) {
            Some(name) => name,
            None => {
                return Err(MissingSpace {
                    // resolve() only fails when an id is present.
                    space_id: row.space_id.unwrap_or(UNKNOWN_SPACE_ID),
                    valid_so_far,
                });
            }
        };

        if label == PointLabel::Valid {
            valid_so_far += 1;
        }
        points.push(ClassifiedPoint {
            space_name,
            longitude,
            latitude,
            thermal: row.thermal,
            timestamp: row.timestamp,
            label,
        });
    }
    Ok(points)
}

/// Runs the full validation pipeline on the history of one participant.
///
/// Arguments:
/// * `participant_id` the participant, used for diagnostics and error reports
/// * `votes` the vote history of the participant
/// * `locations` the location readings of the participant, in any order
/// * `rules` the policy applied to the votes
/// * `spaces` the names of the registered spaces
pub fn run_progress_stats(
    participant_id: &str,
    votes: &[VoteRecord],
    locations: &[LocationRecord],
    rules: &ProgressRules,
    spaces: &SpaceDirectory,
) -> ClassificationOutcome {
    info!(
        "Processing {:?} votes and {:?} location readings for {}, rules: {:?}",
        votes.len(),
        locations.len(),
        participant_id,
        rules
    );

    let mut sorted_votes: Vec<VoteRecord> = votes.to_vec();
    // Stable: votes sharing a timestamp stay in input order.
    sorted_votes.sort_by_key(|v| v.timestamp);

    let rows = join_nearest(&sorted_votes, locations, rules.loc_threshold_time_tol);
    let located = rows.iter().filter(|r| r.is_located()).count();
    debug!(
        "run_progress_stats: {}: {} joined rows, {} located",
        participant_id,
        rows.len(),
        located
    );

    match classify_rows(participant_id, &rows, rules, spaces) {
        Ok(points) => {
            let tally = ProgressTally::from_points(&points, rules.min_votes);
            info!("run_progress_stats: {}: {:?}", participant_id, tally);
            ClassificationOutcome::Completed { tally, points }
        }
        Err(missing) => {
            warn!(
                "run_progress_stats: {}: space {} is not registered, stopping after {} valid votes",
                participant_id, missing.space_id, missing.valid_so_far
            );
            ClassificationOutcome::LookupMiss {
                space_id: missing.space_id,
                participant_id: participant_id.to_string(),
                partial_valid_count: missing.valid_so_far,
            }
        }
    }
}
