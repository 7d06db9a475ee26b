use std::collections::HashMap;
use std::convert::Infallible;

use chrono::{DateTime, FixedOffset};

pub use crate::config::*;
use crate::session::HistorySource;

/// A builder for an in-memory history.
///
/// ```
/// use comfort_progress::builder::HistoryBuilder;
/// use chrono::DateTime;
///
/// let t = DateTime::parse_from_rfc3339("2021-03-01T09:00:00+08:00").unwrap();
/// let mut builder = HistoryBuilder::new().spaces(&[(1, "Studio")]);
/// builder.add_vote("esk04", t, 10.0);
/// builder.add_location("esk04", t, Some(103.77), Some(1.29), Some(1));
/// let history = builder.build();
/// assert_eq!(history.num_participants(), 1);
/// ```
#[derive(Debug, Clone, Default)]
pub struct HistoryBuilder {
    _votes: HashMap<String, Vec<VoteRecord>>,
    _locations: HashMap<String, Vec<LocationRecord>>,
    _spaces: SpaceDirectory,
}

impl HistoryBuilder {
    pub fn new() -> HistoryBuilder {
        HistoryBuilder::default()
    }

    pub fn spaces(self, spaces: &[(i64, &str)]) -> HistoryBuilder {
        let mut directory = self._spaces;
        for (sid, name) in spaces {
            directory.insert(*sid, name);
        }
        HistoryBuilder {
            _spaces: directory,
            ..self
        }
    }

    pub fn add_space(&mut self, space_id: i64, name: &str) {
        self._spaces.insert(space_id, name);
    }

    pub fn add_vote(&mut self, participant_id: &str, timestamp: DateTime<FixedOffset>, thermal: f64) {
        self._votes
            .entry(participant_id.to_string())
            .or_default()
            .push(VoteRecord { timestamp, thermal });
    }

    /// Adds a location reading. Any of the fields may be missing.
    pub fn add_location(
        &mut self,
        participant_id: &str,
        timestamp: DateTime<FixedOffset>,
        longitude: Option<f64>,
        latitude: Option<f64>,
        space_id: Option<i64>,
    ) {
        self._locations
            .entry(participant_id.to_string())
            .or_default()
            .push(LocationRecord {
                timestamp,
                longitude,
                latitude,
                space_id,
            });
    }

    pub fn build(self) -> MemoryHistory {
        let mut votes = self._votes;
        for v in votes.values_mut() {
            v.sort_by_key(|r| r.timestamp);
        }
        let mut locations = self._locations;
        for l in locations.values_mut() {
            l.sort_by_key(|r| r.timestamp);
        }
        MemoryHistory {
            votes,
            locations,
            spaces: self._spaces,
        }
    }
}

/// Vote and location history held in memory, sorted by time.
#[derive(Debug, Clone, Default)]
pub struct MemoryHistory {
    votes: HashMap<String, Vec<VoteRecord>>,
    locations: HashMap<String, Vec<LocationRecord>>,
    spaces: SpaceDirectory,
}

impl MemoryHistory {
    pub fn num_participants(&self) -> usize {
        self.votes.len()
    }
}

impl HistorySource for MemoryHistory {
    type Error = Infallible;

    fn votes(
        &self,
        participant_id: &str,
        before: DateTime<FixedOffset>,
    ) -> Result<Vec<VoteRecord>, Infallible> {
        Ok(self
            .votes
            .get(participant_id)
            .map(|vs| vs.iter().filter(|v| v.timestamp < before).cloned().collect())
            .unwrap_or_default())
    }

    fn latest_vote(
        &self,
        participant_id: &str,
        before: DateTime<FixedOffset>,
    ) -> Result<Option<VoteRecord>, Infallible> {
        Ok(self
            .votes
            .get(participant_id)
            .and_then(|vs| vs.iter().rev().find(|v| v.timestamp < before).cloned()))
    }

    fn locations(
        &self,
        participant_id: &str,
        before: DateTime<FixedOffset>,
    ) -> Result<Vec<LocationRecord>, Infallible> {
        Ok(self
            .locations
            .get(participant_id)
            .map(|ls| ls.iter().filter(|l| l.timestamp < before).cloned().collect())
            .unwrap_or_default())
    }

    fn spaces(&self) -> Result<SpaceDirectory, Infallible> {
        Ok(self.spaces.clone())
    }
}
