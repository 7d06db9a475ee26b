use crate::tracker::*;

use chrono::FixedOffset;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct StudySettings {
    #[serde(rename = "experimentName")]
    pub experiment_name: String,
    #[serde(rename = "siteLabel")]
    pub site_label: Option<String>,
    /// Offset of the local time of the study, for instance `+08:00`.
    #[serde(rename = "timeZone")]
    pub time_zone: String,
    /// Hour (UTC) at which the daily reports are sent.
    #[serde(rename = "reportHourUtc")]
    pub report_hour_utc: Option<u32>,
    #[serde(rename = "opsAppName")]
    pub ops_app_name: Option<String>,
    /// Participants that never receive the daily report.
    #[serde(rename = "excludedFromReports")]
    pub excluded_from_reports: Option<Vec<String>>,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct DataSources {
    #[serde(rename = "participantsFile")]
    pub participants_file: String,
    #[serde(rename = "votesFile")]
    pub votes_file: String,
    #[serde(rename = "locationsFile")]
    pub locations_file: String,
    #[serde(rename = "spacesFile")]
    pub spaces_file: String,
    #[serde(rename = "inboxFile")]
    pub inbox_file: Option<String>,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct OutputSettings {
    #[serde(rename = "outputDirectory")]
    pub output_directory: Option<String>,
    #[serde(rename = "outboxFile")]
    pub outbox_file: Option<String>,
    #[serde(rename = "messageLogFile")]
    pub message_log_file: Option<String>,
}

#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct PolicySettings {
    #[serde(rename = "minVotes")]
    pub min_votes: Option<u32>,
    #[serde(rename = "minTimeBetweenVotes")]
    pub min_time_between_votes: Option<f64>,
    #[serde(rename = "locThresholdTimeTol")]
    pub loc_threshold_time_tol: Option<f64>,
}

#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct TrackerConfig {
    #[serde(rename = "studySettings")]
    pub study_settings: StudySettings,
    #[serde(rename = "dataSources")]
    pub data_sources: DataSources,
    #[serde(rename = "outputSettings")]
    pub output_settings: Option<OutputSettings>,
    pub rules: Option<PolicySettings>,
}

pub const DEFAULT_REPORT_HOUR_UTC: u32 = 10;

impl TrackerConfig {
    pub fn time_zone(&self) -> TrackerResult<FixedOffset> {
        let tz = self.study_settings.time_zone.as_str();
        tz.parse::<FixedOffset>()
            .ok()
            .context(ParsingTimeZoneSnafu { content: tz })
    }

    pub fn site_label(&self) -> String {
        self.study_settings
            .site_label
            .clone()
            .unwrap_or_else(|| "SDE".to_string())
    }

    pub fn report_hour_utc(&self) -> TrackerResult<u32> {
        match self.study_settings.report_hour_utc {
            None => Ok(DEFAULT_REPORT_HOUR_UTC),
            Some(h) if h < 24 => Ok(h),
            Some(h) => whatever!("reportHourUtc must be between 0 and 23, got {}", h),
        }
    }

    pub fn ops_app_name(&self) -> String {
        self.study_settings
            .ops_app_name
            .clone()
            .unwrap_or_else(|| "Telegram-bot".to_string())
    }

    pub fn is_excluded_from_reports(&self, participant_id: &str) -> bool {
        match &self.study_settings.excluded_from_reports {
            Some(ids) => ids.iter().any(|id| id == participant_id),
            None => participant_id == "test",
        }
    }

    /// The policy, falling back on the values used in the field for missing entries.
    pub fn progress_rules(&self) -> TrackerResult<ProgressRules> {
        let defaults = ProgressRules::FIELD_RULES;
        let rules = match &self.rules {
            None => defaults,
            Some(p) => ProgressRules {
                min_votes: p.min_votes.unwrap_or(defaults.min_votes),
                min_time_between_votes: p
                    .min_time_between_votes
                    .unwrap_or(defaults.min_time_between_votes),
                loc_threshold_time_tol: p
                    .loc_threshold_time_tol
                    .unwrap_or(defaults.loc_threshold_time_tol),
            },
        };
        rules.validate().context(InvalidRulesSnafu {})?;
        Ok(rules)
    }

    fn outputs(&self) -> OutputSettings {
        self.output_settings.clone().unwrap_or(OutputSettings {
            output_directory: None,
            outbox_file: None,
            message_log_file: None,
        })
    }

    pub fn output_directory(&self, root: &Path) -> PathBuf {
        let dir = self
            .outputs()
            .output_directory
            .unwrap_or_else(|| "img".to_string());
        resolve_path(root, &dir)
    }

    pub fn outbox_file(&self, root: &Path) -> PathBuf {
        let f = self
            .outputs()
            .outbox_file
            .unwrap_or_else(|| "outbox.jsonl".to_string());
        resolve_path(root, &f)
    }

    pub fn message_log_file(&self, root: &Path) -> PathBuf {
        let f = self
            .outputs()
            .message_log_file
            .unwrap_or_else(|| "logs_msg.json".to_string());
        resolve_path(root, &f)
    }
}

pub fn read_config(path: &str) -> TrackerResult<TrackerConfig> {
    let contents = fs::read_to_string(path).context(OpeningJsonSnafu { path })?;
    let config: TrackerConfig =
        serde_json::from_str(&contents).context(ParsingJsonSnafu { path })?;
    debug!("read_config: {:?}", config);
    Ok(config)
}

pub fn read_summary(path: &str) -> TrackerResult<JSValue> {
    let contents = fs::read_to_string(path).context(OpeningJsonSnafu { path })?;
    let js: JSValue = serde_json::from_str(contents.as_str()).context(ParsingJsonSnafu { path })?;
    Ok(js)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = r#"{
        "studySettings": {
            "experimentName": "Cozie SDE",
            "timeZone": "+08:00",
            "reportHourUtc": 10
        },
        "dataSources": {
            "participantsFile": "participants.csv",
            "votesFile": "votes.csv",
            "locationsFile": "locations.csv",
            "spacesFile": "spaces.json"
        },
        "rules": { "minTimeBetweenVotes": 20 }
    }"#;

    fn config() -> TrackerConfig {
        serde_json::from_str(CONFIG).unwrap()
    }

    #[test]
    fn defaults() {
        let c = config();
        assert_eq!(c.time_zone().unwrap(), FixedOffset::east_opt(8 * 3600).unwrap());
        assert_eq!(c.site_label(), "SDE");
        assert_eq!(c.report_hour_utc().unwrap(), 10);
        assert!(c.is_excluded_from_reports("test"));
        assert!(!c.is_excluded_from_reports("esk04"));
        let rules = c.progress_rules().unwrap();
        assert_eq!(rules.min_votes, 80);
        assert_eq!(rules.min_time_between_votes, 20.0);
        assert_eq!(rules.loc_threshold_time_tol, 14.0);
        assert_eq!(
            c.message_log_file(Path::new("/data")),
            PathBuf::from("/data/logs_msg.json")
        );
    }

    #[test]
    fn bad_time_zone() {
        let mut c = config();
        c.study_settings.time_zone = "Asia/Singapore".to_string();
        assert!(c.time_zone().is_err());
    }

    #[test]
    fn bad_rules() {
        let mut c = config();
        c.rules = Some(PolicySettings {
            min_votes: None,
            min_time_between_votes: Some(f64::NAN),
            loc_threshold_time_tol: None,
        });
        assert!(c.progress_rules().is_err());
    }
}
