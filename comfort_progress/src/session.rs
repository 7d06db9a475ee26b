use std::error::Error;

use chrono::{DateTime, FixedOffset, Utc};
use log::{debug, info};

use crate::config::*;
use crate::report::{render_lookup_miss, render_report};
use crate::run_progress_stats;

/// The read side of the time-series store.
///
/// Errors returned by a source are transport failures: they are passed
/// through to the caller untouched.
pub trait HistorySource {
    type Error: Error + 'static;

    /// All the votes of a participant strictly before `before`, sorted by time.
    fn votes(
        &self,
        participant_id: &str,
        before: DateTime<FixedOffset>,
    ) -> Result<Vec<VoteRecord>, Self::Error>;

    /// The most recent vote of a participant strictly before `before`, if any.
    fn latest_vote(
        &self,
        participant_id: &str,
        before: DateTime<FixedOffset>,
    ) -> Result<Option<VoteRecord>, Self::Error>;

    /// All the location readings of a participant strictly before `before`.
    fn locations(
        &self,
        participant_id: &str,
        before: DateTime<FixedOffset>,
    ) -> Result<Vec<LocationRecord>, Self::Error>;

    fn spaces(&self) -> Result<SpaceDirectory, Self::Error>;
}

/// Where the current time comes from.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum Clock {
    System,
    Fixed(DateTime<Utc>),
}

impl Clock {
    pub fn now(&self, time_zone: &FixedOffset) -> DateTime<FixedOffset> {
        match self {
            Clock::System => Utc::now().with_timezone(time_zone),
            Clock::Fixed(t) => t.with_timezone(time_zone),
        }
    }
}

const MINUTES_PER_HOUR: f64 = 60.0;
const MINUTES_PER_DAY: f64 = 24.0 * 60.0;

/// Tracks the progress of the participants of a study.
///
/// Nothing is retained between calls: every operation recomputes from the
/// history returned by the source.
pub struct ProgressSession<S: HistorySource> {
    source: S,
    rules: ProgressRules,
    time_zone: FixedOffset,
    site_label: String,
    clock: Clock,
}

impl<S: HistorySource> ProgressSession<S> {
    pub fn new(
        source: S,
        rules: &ProgressRules,
        time_zone: FixedOffset,
    ) -> Result<ProgressSession<S>, ProgressErrors> {
        rules.validate()?;
        Ok(ProgressSession {
            source,
            rules: rules.clone(),
            time_zone,
            site_label: "SDE".to_string(),
            clock: Clock::System,
        })
    }

    /// The name of the site shown in the reports.
    pub fn with_site_label(self, site_label: &str) -> ProgressSession<S> {
        ProgressSession {
            site_label: site_label.to_string(),
            ..self
        }
    }

    pub fn with_clock(self, clock: Clock) -> ProgressSession<S> {
        ProgressSession { clock, ..self }
    }

    pub fn rules(&self) -> &ProgressRules {
        &self.rules
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn now(&self) -> DateTime<FixedOffset> {
        self.clock.now(&self.time_zone)
    }

    /// Time since the most recent vote, in the coarsest sensible unit.
    ///
    /// Returns `None` if the participant never voted.
    pub fn last_vote(&self, participant_id: &str) -> Result<Option<LastVote>, S::Error> {
        let now = self.now();
        let last = match self.source.latest_vote(participant_id, now)? {
            Some(v) => v,
            None => {
                info!("last_vote: no vote recorded for {}", participant_id);
                return Ok(None);
            }
        };
        let timestamp = last.timestamp.with_timezone(&self.time_zone);
        let minutes = (now - timestamp).num_milliseconds() as f64 / 60_000.0;

        let (elapsed, unit) = if minutes >= 2.0 * MINUTES_PER_DAY {
            (minutes / MINUTES_PER_DAY, TimeUnit::Days)
        } else if minutes >= MINUTES_PER_HOUR {
            (minutes / MINUTES_PER_HOUR, TimeUnit::Hours)
        } else {
            (minutes, TimeUnit::Minutes)
        };
        debug!(
            "last_vote: {}: {} at {}, {:.2} {} ago",
            participant_id, last.thermal, timestamp, elapsed, unit
        );
        Ok(Some(LastVote {
            elapsed,
            unit,
            timestamp,
        }))
    }

    /// Classifies the full history of a participant.
    pub fn evaluate(&self, participant_id: &str) -> Result<ClassificationOutcome, S::Error> {
        let now = self.now();
        let votes = self.source.votes(participant_id, now)?;
        let locations = self.source.locations(participant_id, now)?;
        let spaces = self.source.spaces()?;
        Ok(run_progress_stats(
            participant_id,
            &votes,
            &locations,
            &self.rules,
            &spaces,
        ))
    }

    /// The progress message for a participant and the number of valid votes.
    ///
    /// An unknown space does not fail the call: the message describes the
    /// problem and the count covers the votes validated before it.
    pub fn daily_report(&self, participant_id: &str) -> Result<DailyReport, S::Error> {
        let outcome = self.evaluate(participant_id)?;
        let report = match outcome {
            ClassificationOutcome::Completed { tally, .. } => DailyReport {
                message: render_report(participant_id, &tally, &self.site_label, &self.now()),
                valid_count: tally.valid_count,
            },
            ClassificationOutcome::LookupMiss {
                space_id,
                participant_id,
                partial_valid_count,
            } => DailyReport {
                message: render_lookup_miss(&participant_id, space_id),
                valid_count: partial_valid_count,
            },
        };
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{HistoryBuilder, MemoryHistory};
    use chrono::Duration;

    fn tz() -> FixedOffset {
        FixedOffset::east_opt(8 * 3600).unwrap()
    }

    fn t0() -> DateTime<FixedOffset> {
        DateTime::parse_from_rfc3339("2021-03-01T09:00:00+08:00").unwrap()
    }

    fn at(min: i64) -> DateTime<FixedOffset> {
        t0() + Duration::minutes(min)
    }

    fn rules() -> ProgressRules {
        ProgressRules {
            min_votes: 80,
            min_time_between_votes: 14.0,
            loc_threshold_time_tol: 14.0,
        }
    }

    fn session(history: MemoryHistory, now: DateTime<FixedOffset>) -> ProgressSession<MemoryHistory> {
        ProgressSession::new(history, &rules(), tz())
            .unwrap()
            .with_clock(Clock::Fixed(now.with_timezone(&Utc)))
    }

    fn located_votes(minutes: &[i64], space: i64) -> HistoryBuilder {
        let mut b = HistoryBuilder::new().spaces(&[(1, "Studio"), (2, "Lab")]);
        for m in minutes {
            b.add_vote("esk04", at(*m), 10.0);
            b.add_location("esk04", at(*m + 1), Some(103.77), Some(1.29), Some(space));
        }
        b
    }

    #[test]
    fn empty_history() {
        let s = session(HistoryBuilder::new().build(), at(60 * 24));
        let report = s.daily_report("esk04").unwrap();
        assert_eq!(report.valid_count, 0);
        assert!(report
            .message
            .contains("You haven't recorded any valid data points yet"));
        assert_eq!(s.last_vote("esk04").unwrap(), None);
    }

    #[test]
    fn single_vote() {
        let s = session(located_votes(&[0], 1).build(), at(600));
        let report = s.daily_report("esk04").unwrap();
        assert_eq!(report.valid_count, 1);
        assert!(report.message.contains("Total data points: 1\n"));
    }

    #[test]
    fn votes_too_close() {
        let s = session(located_votes(&[0, 5], 1).build(), at(600));
        let outcome = s.evaluate("esk04").unwrap();
        assert_eq!(outcome.valid_count(), 1);
        match outcome {
            ClassificationOutcome::Completed { tally, .. } => {
                assert_eq!(tally.valid_count, 1);
                assert_eq!(tally.invalid_count, 1);
            }
            x => panic!("unexpected outcome {:?}", x),
        }
    }

    #[test]
    fn votes_far_enough() {
        let s = session(located_votes(&[0, 20], 2).build(), at(600));
        let report = s.daily_report("esk04").unwrap();
        assert_eq!(report.valid_count, 2);
        assert!(report.message.contains("Data points left: 78\n"));
    }

    #[test]
    fn unknown_space() {
        let mut b = located_votes(&[0, 20], 1);
        b.add_vote("esk04", at(40), 10.0);
        b.add_location("esk04", at(40), Some(103.77), Some(1.29), Some(99));
        b.add_vote("esk04", at(60), 10.0);
        b.add_location("esk04", at(60), Some(103.77), Some(1.29), Some(1));
        let s = session(b.build(), at(600));
        let report = s.daily_report("esk04").unwrap();
        assert_eq!(report.valid_count, 2);
        assert_eq!(
            report.message,
            "Daily report error for participant esk04:\nSpace with space_id 99 not found in spaces file"
        );
    }

    #[test]
    fn future_votes_are_not_counted() {
        let s = session(located_votes(&[0, 20, 40], 1).build(), at(30));
        assert_eq!(s.daily_report("esk04").unwrap().valid_count, 2);
    }

    #[test]
    fn report_is_idempotent() {
        let s = session(located_votes(&[0, 3, 20, 21, 50], 1).build(), at(600));
        let first = s.daily_report("esk04").unwrap();
        let second = s.daily_report("esk04").unwrap();
        assert_eq!(first, second);
        assert_eq!(first.valid_count, 3);
    }

    #[test]
    fn last_vote_units() {
        let s = session(located_votes(&[0], 1).build(), at(3 * 24 * 60));
        let lv = s.last_vote("esk04").unwrap().unwrap();
        assert_eq!(lv.elapsed, 3.0);
        assert_eq!(lv.unit, TimeUnit::Days);
        assert_eq!(lv.timestamp, t0());

        let s = session(located_votes(&[0], 1).build(), at(2 * 24 * 60 - 1));
        let lv = s.last_vote("esk04").unwrap().unwrap();
        assert_eq!(lv.unit, TimeUnit::Hours);

        let s = session(located_votes(&[0], 1).build(), at(90));
        let lv = s.last_vote("esk04").unwrap().unwrap();
        assert_eq!(lv.elapsed, 1.5);
        assert_eq!(lv.unit, TimeUnit::Hours);

        let s = session(located_votes(&[0], 1).build(), at(59));
        let lv = s.last_vote("esk04").unwrap().unwrap();
        assert_eq!(lv.elapsed, 59.0);
        assert_eq!(lv.unit, TimeUnit::Minutes);
    }

    #[test]
    fn last_vote_follows_the_clock() {
        let mut b = located_votes(&[0, 60], 1);
        b.add_space(3, "Office");
        let s = session(b.build(), at(30));
        let lv = s.last_vote("esk04").unwrap().unwrap();
        assert_eq!(lv.timestamp, t0());
        assert_eq!(lv.elapsed, 30.0);
        assert_eq!(lv.unit, TimeUnit::Minutes);
        assert_eq!(s.daily_report("esk04").unwrap().valid_count, 1);
        assert_eq!(s.source().spaces().unwrap().resolve(Some(3)), Some("Office".to_string()));

        // Nothing recorded yet at that instant.
        let s = session(located_votes(&[0], 1).build(), at(-10));
        assert_eq!(s.last_vote("esk04").unwrap(), None);
    }

    #[test]
    fn rejects_invalid_rules() {
        let mut r = rules();
        r.min_time_between_votes = -1.0;
        assert!(ProgressSession::new(HistoryBuilder::new().build(), &r, tz()).is_err());
    }
}
