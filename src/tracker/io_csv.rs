// Primitives for reading the study data exported as CSV files.

use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};

use chrono::{DateTime, FixedOffset};
use serde::Deserialize;

use crate::tracker::{
    io_common::{parse_timestamp, unique_in_order},
    *,
};

#[derive(Debug, Clone, Deserialize)]
struct VoteLine {
    userid: String,
    time: String,
    thermal: f64,
}

#[derive(Debug, Clone, Deserialize)]
struct LocationLine {
    userid: String,
    time: String,
    longitude: Option<f64>,
    latitude: Option<f64>,
    space_id: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
struct ParticipantLine {
    user: String,
    chat_id: i64,
}

/// A participant of the study and the chat used to reach them.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct Participant {
    pub participant_id: String,
    pub chat_id: i64,
}

/// The time-series store, as a set of CSV exports.
///
/// Every query reads the files again, so that a batch sees the data as it
/// is when each participant is processed.
#[derive(Debug, Clone)]
pub struct CsvHistoryStore {
    votes_path: PathBuf,
    locations_path: PathBuf,
    spaces_path: PathBuf,
    time_zone: FixedOffset,
}

impl CsvHistoryStore {
    pub fn new(
        votes_path: &Path,
        locations_path: &Path,
        spaces_path: &Path,
        time_zone: FixedOffset,
    ) -> CsvHistoryStore {
        CsvHistoryStore {
            votes_path: votes_path.to_path_buf(),
            locations_path: locations_path.to_path_buf(),
            spaces_path: spaces_path.to_path_buf(),
            time_zone,
        }
    }

    fn read_votes(&self, participant_id: &str) -> TrackerResult<Vec<VoteRecord>> {
        let mut res: Vec<VoteRecord> = Vec::new();
        for (idx, line_r) in open_csv(&self.votes_path)?.deserialize::<VoteLine>().enumerate() {
            // The header is line 1.
            let lineno = idx + 2;
            let line = line_r.context(CsvLineParseSnafu { lineno })?;
            if line.userid != participant_id {
                continue;
            }
            res.push(VoteRecord {
                timestamp: parse_timestamp(&line.time, lineno, &self.time_zone)?,
                thermal: line.thermal,
            });
        }
        res.sort_by_key(|v| v.timestamp);
        debug!(
            "read_votes: {} votes for {} in {:?}",
            res.len(),
            participant_id,
            self.votes_path
        );
        Ok(res)
    }

    fn read_locations(&self, participant_id: &str) -> TrackerResult<Vec<LocationRecord>> {
        let mut res: Vec<LocationRecord> = Vec::new();
        for (idx, line_r) in open_csv(&self.locations_path)?
            .deserialize::<LocationLine>()
            .enumerate()
        {
            let lineno = idx + 2;
            let line = line_r.context(CsvLineParseSnafu { lineno })?;
            if line.userid != participant_id {
                continue;
            }
            res.push(LocationRecord {
                timestamp: parse_timestamp(&line.time, lineno, &self.time_zone)?,
                longitude: line.longitude,
                latitude: line.latitude,
                space_id: line.space_id,
            });
        }
        res.sort_by_key(|l| l.timestamp);
        debug!(
            "read_locations: {} readings for {} in {:?}",
            res.len(),
            participant_id,
            self.locations_path
        );
        Ok(res)
    }
}

impl HistorySource for CsvHistoryStore {
    type Error = TrackerError;

    fn votes(
        &self,
        participant_id: &str,
        before: DateTime<FixedOffset>,
    ) -> TrackerResult<Vec<VoteRecord>> {
        let mut votes = self.read_votes(participant_id)?;
        votes.retain(|v| v.timestamp < before);
        Ok(votes)
    }

    fn latest_vote(
        &self,
        participant_id: &str,
        before: DateTime<FixedOffset>,
    ) -> TrackerResult<Option<VoteRecord>> {
        Ok(self.votes(participant_id, before)?.pop())
    }

    fn locations(
        &self,
        participant_id: &str,
        before: DateTime<FixedOffset>,
    ) -> TrackerResult<Vec<LocationRecord>> {
        let mut locations = self.read_locations(participant_id)?;
        locations.retain(|l| l.timestamp < before);
        Ok(locations)
    }

    fn spaces(&self) -> TrackerResult<SpaceDirectory> {
        read_spaces(&self.spaces_path)
    }
}

fn open_csv(path: &Path) -> TrackerResult<csv::Reader<File>> {
    csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .context(CsvOpenSnafu {
            path: path.display().to_string(),
        })
}

/// Reads the space names, stored as a JSON object keyed by space id.
pub fn read_spaces(path: &Path) -> TrackerResult<SpaceDirectory> {
    let p = path.display().to_string();
    let contents = fs::read_to_string(path).context(OpeningJsonSnafu { path: p.clone() })?;
    let names: HashMap<String, String> =
        serde_json::from_str(&contents).context(ParsingJsonSnafu { path: p.clone() })?;
    let mut directory = SpaceDirectory::new();
    for (key, name) in names.iter() {
        let sid = key
            .trim()
            .parse::<i64>()
            .ok()
            .context(ParsingSpaceIdSnafu {
                path: p.clone(),
                content: key.clone(),
            })?;
        directory.insert(sid, name);
    }
    debug!("read_spaces: {} spaces in {}", directory.len(), p);
    Ok(directory)
}

/// Reads the list of participants. A participant listed twice is only kept once.
pub fn read_participants(path: &Path) -> TrackerResult<Vec<Participant>> {
    let mut lines: Vec<ParticipantLine> = Vec::new();
    for (idx, line_r) in open_csv(path)?.deserialize::<ParticipantLine>().enumerate() {
        let line = line_r.context(CsvLineParseSnafu { lineno: idx + 2 })?;
        lines.push(line);
    }
    let ids: Vec<String> = lines.iter().map(|l| l.user.clone()).collect();
    let res: Vec<Participant> = unique_in_order(&ids)
        .into_iter()
        .filter_map(|pid| {
            lines
                .iter()
                .find(|l| l.user == pid)
                .map(|l| Participant {
                    participant_id: pid.clone(),
                    chat_id: l.chat_id,
                })
        })
        .collect();
    info!("read_participants: {} participants", res.len());
    Ok(res)
}
