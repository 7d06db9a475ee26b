// ********* Input data structures ***********

use std::collections::HashMap;
use std::error::Error;
use std::fmt::Display;

use chrono::{DateTime, FixedOffset};

/// A single thermal comfort vote, as stored in the time-series store.
#[derive(PartialEq, Debug, Clone)]
pub struct VoteRecord {
    pub timestamp: DateTime<FixedOffset>,
    pub thermal: f64,
}

/// A location reading from the indoor beacons.
///
/// Coordinates and space id may be missing when the reading was taken
/// outside the geofenced area.
#[derive(PartialEq, Debug, Clone)]
pub struct LocationRecord {
    pub timestamp: DateTime<FixedOffset>,
    pub longitude: Option<f64>,
    pub latitude: Option<f64>,
    pub space_id: Option<i64>,
}

/// The space id used by the geofencing when a reading is not inside any space.
pub const UNKNOWN_SPACE_ID: i64 = -1;

/// The label given to votes located outside any registered space.
pub const UNKNOWN_SPACE_NAME: &str = "unknown location";

/// The names of the spaces covered by the beacons.
#[derive(Eq, PartialEq, Debug, Clone, Default)]
pub struct SpaceDirectory {
    names: HashMap<i64, String>,
}

impl SpaceDirectory {
    pub fn new() -> SpaceDirectory {
        SpaceDirectory::default()
    }

    pub fn insert(&mut self, space_id: i64, name: &str) {
        self.names.insert(space_id, name.to_string());
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Resolves the name of a space.
    ///
    /// A missing space id is read as the `UNKNOWN_SPACE_ID` sentinel. The sentinel
    /// uses its registered name if there is one, and `UNKNOWN_SPACE_NAME` otherwise.
    /// Any other id must be registered. `None` is returned otherwise.
    pub fn resolve(&self, space_id: Option<i64>) -> Option<String> {
        let sid = space_id.unwrap_or(UNKNOWN_SPACE_ID);
        match self.names.get(&sid) {
            Some(name) => Some(name.clone()),
            None if sid == UNKNOWN_SPACE_ID => Some(UNKNOWN_SPACE_NAME.to_string()),
            None => None,
        }
    }
}

impl FromIterator<(i64, String)> for SpaceDirectory {
    fn from_iter<I: IntoIterator<Item = (i64, String)>>(iter: I) -> Self {
        SpaceDirectory {
            names: iter.into_iter().collect(),
        }
    }
}

// ******** Intermediate data structures *********

/// A vote paired with the nearest location reading within tolerance.
#[derive(PartialEq, Debug, Clone)]
pub struct JoinedRow {
    pub timestamp: DateTime<FixedOffset>,
    pub thermal: f64,
    pub longitude: Option<f64>,
    pub latitude: Option<f64>,
    pub space_id: Option<i64>,
}

impl JoinedRow {
    /// Both coordinates are known.
    pub fn is_located(&self) -> bool {
        self.longitude.is_some() && self.latitude.is_some()
    }
}

#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash)]
pub enum PointLabel {
    /// Counts toward the quota.
    Valid,
    /// Too close to the previous valid vote. Still counted in the totals.
    Invalid,
}

#[derive(PartialEq, Debug, Clone)]
pub struct ClassifiedPoint {
    pub space_name: String,
    pub longitude: f64,
    pub latitude: f64,
    pub thermal: f64,
    pub timestamp: DateTime<FixedOffset>,
    pub label: PointLabel,
}

// ******** Output data structures *********

#[derive(Eq, PartialEq, Debug, Clone)]
pub struct ProgressTally {
    pub valid_count: usize,
    pub invalid_count: usize,
    pub total_considered: usize,
    pub quota: u32,
    pub completed: bool,
}

impl ProgressTally {
    /// Votes still needed before the quota is reached.
    pub fn remaining(&self) -> usize {
        (self.quota as usize).saturating_sub(self.valid_count)
    }
}

/// The result of classifying the history of one participant.
#[derive(PartialEq, Debug, Clone)]
pub enum ClassificationOutcome {
    Completed {
        tally: ProgressTally,
        points: Vec<ClassifiedPoint>,
    },
    /// A vote refers to a space that is not in the space directory.
    /// Processing stopped there: only the votes validated before are counted.
    LookupMiss {
        space_id: i64,
        participant_id: String,
        partial_valid_count: usize,
    },
}

impl ClassificationOutcome {
    pub fn valid_count(&self) -> usize {
        match self {
            ClassificationOutcome::Completed { tally, .. } => tally.valid_count,
            ClassificationOutcome::LookupMiss {
                partial_valid_count,
                ..
            } => *partial_valid_count,
        }
    }
}

/// The report sent to a participant, along with the number of valid votes.
///
/// The error form of the report (unknown space) has the same shape.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct DailyReport {
    pub message: String,
    pub valid_count: usize,
}

#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash)]
pub enum TimeUnit {
    Minutes,
    Hours,
    Days,
}

impl TimeUnit {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeUnit::Minutes => "minutes",
            TimeUnit::Hours => "hours",
            TimeUnit::Days => "days",
        }
    }
}

impl Display for TimeUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Time elapsed since the most recent vote of a participant.
#[derive(PartialEq, Debug, Clone)]
pub struct LastVote {
    pub elapsed: f64,
    pub unit: TimeUnit,
    pub timestamp: DateTime<FixedOffset>,
}

/// Errors that prevent a progress session from being created.
#[derive(Eq, PartialEq, Debug, Clone)]
pub enum ProgressErrors {
    InvalidRules(String),
}

impl Error for ProgressErrors {}

impl Display for ProgressErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProgressErrors::InvalidRules(msg) => write!(f, "Invalid progress rules: {}", msg),
        }
    }
}

// ********* Configuration **********

/// The policy applied to the votes of a participant.
///
/// Durations are expressed in minutes.
#[derive(PartialEq, Debug, Clone)]
pub struct ProgressRules {
    /// Number of valid votes required to complete the study.
    pub min_votes: u32,
    /// A vote is valid only if this much time passed since the last valid vote.
    pub min_time_between_votes: f64,
    /// Maximum gap between a vote and the location reading it is joined with.
    pub loc_threshold_time_tol: f64,
}

impl ProgressRules {
    pub const DEFAULT_RULES: ProgressRules = ProgressRules {
        min_votes: 80,
        min_time_between_votes: 15.0,
        loc_threshold_time_tol: 10.0,
    };

    /// The values used during the field deployment.
    pub const FIELD_RULES: ProgressRules = ProgressRules {
        min_votes: 80,
        min_time_between_votes: 14.0,
        loc_threshold_time_tol: 14.0,
    };

    pub fn validate(&self) -> Result<(), ProgressErrors> {
        if !(self.min_time_between_votes.is_finite() && self.min_time_between_votes >= 0.0) {
            return Err(ProgressErrors::InvalidRules(format!(
                "min_time_between_votes must be a non-negative number, got {}",
                self.min_time_between_votes
            )));
        }
        if !(self.loc_threshold_time_tol.is_finite() && self.loc_threshold_time_tol >= 0.0) {
            return Err(ProgressErrors::InvalidRules(format!(
                "loc_threshold_time_tol must be a non-negative number, got {}",
                self.loc_threshold_time_tol
            )));
        }
        Ok(())
    }
}

impl Default for ProgressRules {
    fn default() -> Self {
        ProgressRules::DEFAULT_RULES
    }
}
