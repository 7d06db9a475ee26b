use log::{debug, error, info, warn};

use comfort_progress::*;
use snafu::{prelude::*, Snafu};

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Timelike, Utc};
use serde::{Deserialize, Serialize};
#[cfg(test)]
use serde_json::json;
use serde_json::Value as JSValue;
use text_diff::print_diff;

use crate::args::Args;
use crate::tracker::chat::{process_chat, read_inbox, status_requests, ChatUpdate, MessageLog};
use crate::tracker::config_reader::*;
use crate::tracker::io_common::resolve_path;
use crate::tracker::io_csv::{read_participants, CsvHistoryStore, Participant};
use crate::tracker::notify::{FileOutbox, OpsLevel, Outbox};

mod chat;
mod config_reader;
mod io_common;
mod io_csv;
mod notify;

#[derive(Debug, Snafu)]
pub enum TrackerError {
    #[snafu(display("Error opening file {path}"))]
    OpeningJson {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error parsing JSON file {path}"))]
    ParsingJson {
        source: serde_json::Error,
        path: String,
    },
    #[snafu(display("Error serializing JSON for {path}"))]
    SerializingJson {
        source: serde_json::Error,
        path: String,
    },
    #[snafu(display("Error opening CSV file {path}"))]
    CsvOpen { source: csv::Error, path: String },
    #[snafu(display("Error parsing CSV line {lineno}"))]
    CsvLineParse { source: csv::Error, lineno: usize },
    #[snafu(display("Line {lineno}: could not parse timestamp {content:?}"))]
    ParsingTimestamp {
        source: chrono::ParseError,
        lineno: usize,
        content: String,
    },
    #[snafu(display("Could not parse the current time {content:?}"))]
    ParsingNow {
        source: chrono::ParseError,
        content: String,
    },
    #[snafu(display("Could not parse time zone {content:?}, expected an offset such as +08:00"))]
    ParsingTimeZone { content: String },
    #[snafu(display("{path}: space id {content:?} is not an integer"))]
    ParsingSpaceId { path: String, content: String },
    #[snafu(display("Invalid progress rules"))]
    InvalidRules {
        source: comfort_progress::ProgressErrors,
    },
    #[snafu(display("Error writing {path}"))]
    WritingOutput {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error writing CSV file {path}"))]
    WritingCsv { source: csv::Error, path: String },
    #[snafu(display("The configuration file has no parent directory"))]
    MissingParentDir {},

    #[snafu(whatever, display("{message}"))]
    Whatever {
        message: String,
        #[snafu(source(from(Box<dyn std::error::Error>, Some)))]
        source: Option<Box<dyn std::error::Error>>,
    },
}

pub type TrackerResult<T> = Result<T, TrackerError>;

// ******** Batch summary *********

#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct ParticipantSummary {
    #[serde(rename = "participantId")]
    pub participant_id: String,
    #[serde(rename = "validVotes")]
    pub valid_votes: usize,
    #[serde(rename = "lastVoteUnit")]
    pub last_vote_unit: Option<String>,
    /// Only filled when the last vote is at least two days old.
    #[serde(rename = "daysSinceLastVote")]
    pub days_since_last_vote: f64,
}

/// What a batch run did, collected for the operations channel.
#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct BatchSummary {
    #[serde(rename = "generatedAt")]
    pub generated_at: String,
    #[serde(rename = "reportTime")]
    pub report_time: bool,
    pub participants: Vec<ParticipantSummary>,
    /// Participants that could not be processed.
    pub failures: Vec<String>,
}

#[derive(Eq, PartialEq, Debug, Clone, Default)]
pub struct RunOptions {
    /// Send the messages now, and keep the operations channel quiet.
    pub force: bool,
    /// Restricts the batch to these participants.
    pub only: Option<Vec<String>>,
}

// Per participant result of a batch.
#[derive(PartialEq, Debug, Clone)]
struct ParticipantOutcome {
    summary: Option<ParticipantSummary>,
    send_tables: bool,
}

// The chat state shared by all the participants of a batch.
struct ChatState {
    experiment_name: String,
    updates: Vec<ChatUpdate>,
    log: MessageLog,
    log_path: PathBuf,
}

/// The daily reports go out within one minute of the configured hour.
pub fn is_report_time(now: &DateTime<Utc>, report_hour_utc: u32) -> bool {
    let threshold = now
        .with_hour(report_hour_utc)
        .and_then(|t| t.with_minute(0))
        .and_then(|t| t.with_second(0))
        .and_then(|t| t.with_nanosecond(0));
    match threshold {
        Some(t) => (*now - t).num_seconds().abs() <= Duration::minutes(1).num_seconds(),
        None => false,
    }
}

pub fn last_vote_message(participant_id: &str, last_vote: Option<&LastVote>) -> String {
    match last_vote {
        None => format!(
            "Hey {}, looks like there are no previous votes from you",
            participant_id
        ),
        Some(lv) => format!("Last Cozie vote was {:.0} {} ago", lv.elapsed, lv.unit),
    }
}

fn process_participant<S: HistorySource<Error = TrackerError>>(
    session: &ProgressSession<S>,
    config: &TrackerConfig,
    participant: &Participant,
    options: &RunOptions,
    is_time: bool,
    chat: &mut ChatState,
    outbox: &mut dyn Outbox,
) -> TrackerResult<ParticipantOutcome> {
    let pid = participant.participant_id.as_str();
    let chat_id = participant.chat_id;
    info!("=== Analysing participant: {}", pid);

    let last_vote = session.last_vote(pid)?;
    let last_vote_msg = last_vote_message(pid, last_vote.as_ref());
    let unit = last_vote.as_ref().map(|lv| lv.unit);
    match &last_vote {
        None => info!("=== No data for {}", pid),
        Some(_) => info!("=== {}", last_vote_msg),
    }

    let wants_report = options.force || (is_time && !config.is_excluded_from_reports(pid));
    let report: Option<DailyReport> = if !wants_report {
        None
    } else if last_vote.is_none() {
        Some(DailyReport {
            message: last_vote_msg.clone(),
            valid_count: 0,
        })
    } else {
        Some(session.daily_report(pid)?)
    };

    let mut send_tables = false;

    if options.force {
        outbox.send_text(chat_id, &last_vote_msg)?;
        info!("=== forced message sent to {}", pid);
        if let (Some(_), Some(r)) = (&last_vote, &report) {
            outbox.send_text(chat_id, &r.message)?;
            info!("=== forced report sent to {}", pid);
        }
    }

    if let (Some(TimeUnit::Days), Some(lv)) = (unit, &last_vote) {
        if is_time && !options.force {
            send_tables = true;
            outbox.send_text(chat_id, &last_vote_msg)?;
            outbox.post_ops(
                OpsLevel::Error,
                &format!(
                    "Last vote for participant {} was {:.0} {} ago",
                    pid, lv.elapsed, lv.unit
                ),
            )?;
        }
    }

    let requests = status_requests(
        &chat.experiment_name,
        last_vote.as_ref().map(|lv| &lv.timestamp),
    );
    let answered = process_chat(
        chat_id,
        &requests,
        &chat.updates,
        &mut chat.log,
        &chat.log_path,
        outbox,
    )?;
    debug!("process_participant: {}: answered {} requests", pid, answered);

    let summary = match &report {
        None => None,
        Some(r) => {
            if is_time && !config.is_excluded_from_reports(pid) {
                send_tables = true;
                outbox.send_text(chat_id, &r.message)?;
                if !options.force {
                    outbox.post_ops(OpsLevel::Info, &r.message)?;
                    if r.valid_count >= session.rules().min_votes as usize {
                        outbox.post_ops(
                            OpsLevel::Info,
                            &format!(
                                "Participant {} just finished all required datapoints!",
                                pid
                            ),
                        )?;
                    }
                }
            }
            Some(ParticipantSummary {
                participant_id: pid.to_string(),
                valid_votes: r.valid_count,
                last_vote_unit: unit.map(|u| u.to_string()),
                days_since_last_vote: match &last_vote {
                    Some(lv) if lv.unit == TimeUnit::Days => lv.elapsed,
                    _ => 0.0,
                },
            })
        }
    };

    Ok(ParticipantOutcome {
        summary,
        send_tables,
    })
}

/// Runs the checks and sends the messages for all the participants.
///
/// A participant that fails is reported to the operations channel and
/// skipped: the batch carries on with the next one.
pub fn run_batch<S: HistorySource<Error = TrackerError>>(
    session: &ProgressSession<S>,
    config: &TrackerConfig,
    root: &Path,
    options: &RunOptions,
    outbox: &mut dyn Outbox,
) -> TrackerResult<BatchSummary> {
    let participants_path = resolve_path(root, &config.data_sources.participants_file);
    let mut participants = read_participants(&participants_path)?;
    if let Some(only) = &options.only {
        participants.retain(|p| only.contains(&p.participant_id));
    }

    let now = session.now();
    let is_time = is_report_time(&now.with_timezone(&Utc), config.report_hour_utc()?);
    info!(
        "run_batch: {} participants at {}, report time: {}",
        participants.len(),
        now,
        is_time
    );

    let log_path = config.message_log_file(root);
    let updates = match &config.data_sources.inbox_file {
        Some(f) => read_inbox(&resolve_path(root, f))?,
        None => vec![],
    };
    let mut chat = ChatState {
        experiment_name: config.study_settings.experiment_name.clone(),
        updates,
        log: MessageLog::load(&log_path)?,
        log_path,
    };

    let mut summaries: Vec<ParticipantSummary> = Vec::new();
    let mut failures: Vec<String> = Vec::new();
    let mut send_tables = false;
    for participant in participants.iter() {
        let pid = participant.participant_id.as_str();
        match process_participant(session, config, participant, options, is_time, &mut chat, outbox) {
            Ok(outcome) => {
                send_tables |= outcome.send_tables;
                if let Some(s) = outcome.summary {
                    summaries.push(s);
                }
            }
            Err(e) => {
                error!("Processing stopped for {} with error: {}", pid, e);
                failures.push(pid.to_string());
                if !options.force {
                    let msg = format!("Code stopped with error - {} : {:?}", pid, e);
                    if let Err(e2) = outbox.post_ops(OpsLevel::Error, &msg) {
                        error!("Could not notify the operations channel: {}", e2);
                    }
                }
            }
        }
    }

    let summary = BatchSummary {
        generated_at: now.to_rfc3339(),
        report_time: is_time,
        participants: summaries,
        failures,
    };

    if send_tables && !summary.participants.is_empty() {
        let out_dir = config.output_directory(root);
        let paths = write_summary_tables(&out_dir, &summary, &now.format("%b-%d_%H%M").to_string())?;
        if !options.force {
            for p in paths.iter() {
                outbox.post_file(p)?;
            }
        }
    }
    Ok(summary)
}

/// Writes the tables behind the summary charts: valid votes and days since the last vote.
pub fn write_summary_tables(
    out_dir: &Path,
    summary: &BatchSummary,
    stamp: &str,
) -> TrackerResult<Vec<PathBuf>> {
    fs::create_dir_all(out_dir).context(WritingOutputSnafu {
        path: out_dir.display().to_string(),
    })?;

    let votes_path = out_dir.join(format!("summary_responses_{}.csv", stamp));
    let last_vote_path = out_dir.join(format!("last_vote_{}.csv", stamp));

    let write_table = |path: &Path, header: &str, rows: Vec<(String, String)>| -> TrackerResult<()> {
        let p = path.display().to_string();
        let mut wtr = csv::Writer::from_path(path).context(WritingCsvSnafu { path: p.clone() })?;
        wtr.write_record(["participant", header])
            .context(WritingCsvSnafu { path: p.clone() })?;
        for (pid, value) in rows {
            wtr.write_record([pid, value])
                .context(WritingCsvSnafu { path: p.clone() })?;
        }
        wtr.flush().context(WritingOutputSnafu { path: p })
    };

    write_table(
        &votes_path,
        "Total votes",
        summary
            .participants
            .iter()
            .map(|s| (s.participant_id.clone(), s.valid_votes.to_string()))
            .collect(),
    )?;
    write_table(
        &last_vote_path,
        "Days since last vote",
        summary
            .participants
            .iter()
            .map(|s| (s.participant_id.clone(), format!("{:.2}", s.days_since_last_vote)))
            .collect(),
    )?;
    info!("write_summary_tables: {:?} {:?}", votes_path, last_vote_path);
    Ok(vec![votes_path, last_vote_path])
}

pub fn run_tracker(args: &Args) -> TrackerResult<()> {
    let config_p = Path::new(args.config.as_str());
    let config = read_config(&args.config)?;
    let root = config_p.parent().context(MissingParentDirSnafu {})?;

    let time_zone = config.time_zone()?;
    let rules = config.progress_rules()?;
    let clock = match &args.now {
        Some(s) => Clock::Fixed(
            DateTime::parse_from_rfc3339(s)
                .context(ParsingNowSnafu { content: s.as_str() })?
                .with_timezone(&Utc),
        ),
        None => Clock::System,
    };

    let store = CsvHistoryStore::new(
        &resolve_path(root, &config.data_sources.votes_file),
        &resolve_path(root, &config.data_sources.locations_file),
        &resolve_path(root, &config.data_sources.spaces_file),
        time_zone,
    );
    let session = ProgressSession::new(store, &rules, time_zone)
        .context(InvalidRulesSnafu {})?
        .with_site_label(&config.site_label())
        .with_clock(clock);
    let mut outbox = FileOutbox::new(&config.outbox_file(root), &config.ops_app_name());
    let options = RunOptions {
        force: args.force,
        only: args.participant.clone(),
    };

    let summary = run_batch(&session, &config, root, &options, &mut outbox)?;
    info!(
        "run_tracker: {} participants summarised, {} failures",
        summary.participants.len(),
        summary.failures.len()
    );

    let pretty_js_summary = serde_json::to_string_pretty(&summary).context(SerializingJsonSnafu {
        path: "batch summary",
    })?;
    match args.out.as_deref() {
        Some("stdout") => println!("{}", pretty_js_summary),
        Some(p) => fs::write(p, &pretty_js_summary).context(WritingOutputSnafu { path: p })?,
        None => {}
    }

    // The reference summary, if provided for comparison
    if let Some(summary_p) = &args.reference {
        check_reference(&summary, summary_p)?;
    }

    Ok(())
}

/// Compares a summary with a reference summary file, printing the differences.
pub fn check_reference(summary: &BatchSummary, reference_path: &str) -> TrackerResult<()> {
    let summary_ref = read_summary(reference_path)?;
    let pretty_js_summary_ref =
        serde_json::to_string_pretty(&summary_ref).context(SerializingJsonSnafu {
            path: reference_path,
        })?;
    let computed: JSValue = serde_json::to_value(summary).context(SerializingJsonSnafu {
        path: "batch summary",
    })?;
    let pretty_js_computed = serde_json::to_string_pretty(&computed).context(SerializingJsonSnafu {
        path: "batch summary",
    })?;
    if pretty_js_summary_ref != pretty_js_computed {
        warn!("Found differences with the reference summary");
        print_diff(
            pretty_js_summary_ref.as_str(),
            pretty_js_computed.as_str(),
            "\n",
        );
        whatever!("Difference detected between computed summary and reference summary")
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::notify::RecordingOutbox;
    use chrono::FixedOffset;

    struct Study {
        dir: tempfile::TempDir,
        config: TrackerConfig,
    }

    fn study() -> Study {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::write(
            root.join("participants.csv"),
            "user,chat_id\nesk04,111\nenth28,222\nidle01,333\ntest,444\nbroken,555\n",
        )
        .unwrap();
        // esk04: 3 located votes, one of them too close to the previous one.
        // enth28: last vote 3 days before the report.
        // broken: refers to a space that does not exist.
        fs::write(
            root.join("votes.csv"),
            "userid,time,thermal\n\
             esk04,2021-03-04T01:00:00Z,10\n\
             esk04,2021-03-04T01:05:00Z,11\n\
             esk04,2021-03-04T01:30:00Z,9\n\
             enth28,2021-03-01T10:00:00Z,10\n\
             test,2021-03-04T01:00:00Z,10\n\
             broken,2021-03-04T01:00:00Z,10\n\
             broken,2021-03-04T02:00:00Z,10\n",
        )
        .unwrap();
        fs::write(
            root.join("locations.csv"),
            "userid,time,longitude,latitude,space_id\n\
             esk04,2021-03-04T01:01:00Z,103.77,1.29,1\n\
             esk04,2021-03-04T01:06:00Z,103.77,1.29,1\n\
             esk04,2021-03-04T01:29:00Z,103.77,1.29,\n\
             enth28,2021-03-01T10:00:00Z,103.77,1.29,2\n\
             broken,2021-03-04T01:00:00Z,103.77,1.29,1\n\
             broken,2021-03-04T02:00:00Z,103.77,1.29,99\n",
        )
        .unwrap();
        fs::write(root.join("spaces.json"), r#"{"1": "Studio", "2": "Lab"}"#).unwrap();
        fs::write(
            root.join("inbox.json"),
            r#"{"result": [
                {"update_id": 1, "message": {"message_id": 40, "from": {"id": 111}, "text": "last vote"}}
            ]}"#,
        )
        .unwrap();

        let config_js = r#"{
            "studySettings": {"experimentName": "Cozie", "timeZone": "+08:00"},
            "dataSources": {
                "participantsFile": "participants.csv",
                "votesFile": "votes.csv",
                "locationsFile": "locations.csv",
                "spacesFile": "spaces.json",
                "inboxFile": "inbox.json"
            }
        }"#;
        fs::write(root.join("config.json"), config_js).unwrap();
        let config: TrackerConfig = serde_json::from_str(config_js).unwrap();
        Study { dir, config }
    }

    fn session(study: &Study, now: &str) -> ProgressSession<CsvHistoryStore> {
        let root = study.dir.path();
        let tz = FixedOffset::east_opt(8 * 3600).unwrap();
        let store = CsvHistoryStore::new(
            &root.join("votes.csv"),
            &root.join("locations.csv"),
            &root.join("spaces.json"),
            tz,
        );
        let now = DateTime::parse_from_rfc3339(now).unwrap().with_timezone(&Utc);
        ProgressSession::new(store, &study.config.progress_rules().unwrap(), tz)
            .unwrap()
            .with_clock(Clock::Fixed(now))
    }

    #[test]
    fn report_window() {
        let t = |s: &str| DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc);
        assert!(is_report_time(&t("2021-03-04T10:00:30Z"), 10));
        assert!(is_report_time(&t("2021-03-04T09:59:00Z"), 10));
        assert!(is_report_time(&t("2021-03-04T10:01:00Z"), 10));
        assert!(!is_report_time(&t("2021-03-04T10:01:01Z"), 10));
        assert!(!is_report_time(&t("2021-03-04T18:00:00Z"), 10));
    }

    #[test]
    fn last_vote_messages() {
        assert_eq!(
            last_vote_message("esk04", None),
            "Hey esk04, looks like there are no previous votes from you"
        );
        let lv = LastVote {
            elapsed: 2.6,
            unit: TimeUnit::Days,
            timestamp: DateTime::parse_from_rfc3339("2021-03-01T18:00:00+08:00").unwrap(),
        };
        assert_eq!(last_vote_message("esk04", Some(&lv)), "Last Cozie vote was 3 days ago");
    }

    #[test]
    fn daily_batch() {
        let study = study();
        let s = session(&study, "2021-03-04T10:00:00Z");
        let mut outbox = RecordingOutbox::default();
        let summary = run_batch(
            &s,
            &study.config,
            study.dir.path(),
            &RunOptions::default(),
            &mut outbox,
        )
        .unwrap();

        assert!(summary.report_time);
        assert!(summary.failures.is_empty());
        let votes: Vec<(&str, usize)> = summary
            .participants
            .iter()
            .map(|p| (p.participant_id.as_str(), p.valid_votes))
            .collect();
        assert_eq!(votes, vec![("esk04", 2), ("enth28", 1), ("idle01", 0), ("broken", 1)]);
        assert_eq!(summary.participants[1].days_since_last_vote, 3.0);
        assert_eq!(summary.participants[1].last_vote_unit, Some("days".to_string()));

        // esk04 asked for its last vote, in local time.
        assert!(outbox
            .chat
            .contains(&(111, "Mar-04 09:30".to_string())));
        assert!(outbox.chat.iter().any(|(cid, m)| *cid == 111
            && m.contains("Valid data points (within SDE): 2 out of 80")));
        assert!(outbox.chat.iter().all(|(cid, _)| *cid != 444));
        assert!(outbox.chat.iter().any(|(cid, m)| *cid == 555
            && m.contains("Space with space_id 99 not found")));
        assert!(outbox
            .ops
            .iter()
            .any(|(l, m)| *l == OpsLevel::Error
                && m == "Last vote for participant enth28 was 3 days ago"));
        assert_eq!(outbox.files.len(), 2);
        let table = fs::read_to_string(&outbox.files[0]).unwrap();
        assert!(table.starts_with("participant,Total votes\nesk04,2\n"));
    }

    #[test]
    fn outside_report_time() {
        let study = study();
        let s = session(&study, "2021-03-04T14:00:00Z");
        let mut outbox = RecordingOutbox::default();
        let summary = run_batch(
            &s,
            &study.config,
            study.dir.path(),
            &RunOptions::default(),
            &mut outbox,
        )
        .unwrap();
        assert!(!summary.report_time);
        assert!(summary.participants.is_empty());
        assert!(outbox.ops.is_empty());
        assert!(outbox.files.is_empty());
        // Only the chat request is answered.
        assert_eq!(outbox.chat.len(), 2);
    }

    #[test]
    fn forced_run_stays_quiet() {
        let study = study();
        let s = session(&study, "2021-03-04T14:00:00Z");
        let mut outbox = RecordingOutbox::default();
        let options = RunOptions {
            force: true,
            only: Some(vec!["esk04".to_string(), "idle01".to_string()]),
        };
        let summary = run_batch(&s, &study.config, study.dir.path(), &options, &mut outbox).unwrap();
        assert_eq!(summary.participants.len(), 2);
        assert!(outbox.ops.is_empty());
        // esk04: last vote, report, and the chat answer. idle01: last vote only.
        assert_eq!(outbox.chat.iter().filter(|(cid, _)| *cid == 111).count(), 4);
        assert_eq!(
            outbox.chat.iter().filter(|(cid, _)| *cid == 333).collect::<Vec<_>>(),
            vec![&(
                333,
                "Hey idle01, looks like there are no previous votes from you".to_string()
            )]
        );
    }

    #[test]
    fn failing_participant_does_not_stop_the_batch() {
        let study = study();
        fs::write(
            study.dir.path().join("votes.csv"),
            "userid,time,thermal\nesk04,2021-03-04T01:00:00Z,warm\n",
        )
        .unwrap();
        let s = session(&study, "2021-03-04T10:00:00Z");
        let mut outbox = RecordingOutbox::default();
        let summary = run_batch(
            &s,
            &study.config,
            study.dir.path(),
            &RunOptions::default(),
            &mut outbox,
        )
        .unwrap();
        // The file cannot be read for any participant.
        assert_eq!(summary.failures.len(), 5);
        assert_eq!(outbox.ops.len(), 5);
        assert!(outbox.ops[0].1.starts_with("Code stopped with error - esk04"));
    }

    fn args(study: &Study, out: Option<&Path>, reference: Option<&Path>) -> Args {
        let path = |p: &Path| p.display().to_string();
        Args {
            config: path(&study.dir.path().join("config.json")),
            reference: reference.map(path),
            out: out.map(path),
            now: Some("2021-03-04T10:00:00Z".to_string()),
            participant: None,
            force: false,
            verbose: false,
        }
    }

    #[test]
    fn replay_matches_its_reference() {
        let study = study();
        let out = study.dir.path().join("summary.json");
        run_tracker(&args(&study, Some(&out), None)).unwrap();
        let js: JSValue = serde_json::from_str(&fs::read_to_string(&out).unwrap()).unwrap();
        assert_eq!(js["generatedAt"], "2021-03-04T18:00:00+08:00");
        assert_eq!(js["participants"][0]["validVotes"], 2);
        let outbox = fs::read_to_string(study.dir.path().join("outbox.jsonl")).unwrap();
        assert!(outbox.lines().count() > 0);

        // Same instant, same data: the summary matches.
        run_tracker(&args(&study, None, Some(&out))).unwrap();
    }

    #[test]
    fn reference_mismatch_fails() {
        let study = study();
        let out = study.dir.path().join("summary.json");
        run_tracker(&args(&study, Some(&out), None)).unwrap();
        let mut summary: BatchSummary =
            serde_json::from_str(&fs::read_to_string(&out).unwrap()).unwrap();
        assert!(check_reference(&summary, &out.display().to_string()).is_ok());

        summary.participants[0].valid_votes = 3;
        let err = check_reference(&summary, &out.display().to_string()).unwrap_err();
        assert!(matches!(err, TrackerError::Whatever { .. }));
    }

    #[test]
    fn serialization_errors_name_their_target() {
        let source = serde_json::from_str::<JSValue>("{").unwrap_err();
        let err = Err::<(), _>(source)
            .context(SerializingJsonSnafu {
                path: "outbox.jsonl",
            })
            .unwrap_err();
        assert_eq!(err.to_string(), "Error serializing JSON for outbox.jsonl");
    }

    #[test]
    fn summary_json() {
        let summary = BatchSummary {
            generated_at: "2021-03-04T18:00:00+08:00".to_string(),
            report_time: true,
            participants: vec![ParticipantSummary {
                participant_id: "esk04".to_string(),
                valid_votes: 12,
                last_vote_unit: Some("hours".to_string()),
                days_since_last_vote: 0.0,
            }],
            failures: vec![],
        };
        assert_eq!(
            serde_json::to_value(&summary).unwrap(),
            json!({
                "generatedAt": "2021-03-04T18:00:00+08:00",
                "reportTime": true,
                "participants": [{
                    "participantId": "esk04",
                    "validVotes": 12,
                    "lastVoteUnit": "hours",
                    "daysSinceLastVote": 0.0
                }],
                "failures": []
            })
        );
    }
}
