use chrono::{DateTime, FixedOffset};

use crate::config::*;

/// Format used for all the timestamps shown to participants.
pub const REPORT_TIME_FORMAT: &str = "%b-%d %H:%M";

impl ProgressTally {
    pub fn from_points(points: &[ClassifiedPoint], quota: u32) -> ProgressTally {
        let valid_count = points
            .iter()
            .filter(|p| p.label == PointLabel::Valid)
            .count();
        let invalid_count = points
            .iter()
            .filter(|p| p.label == PointLabel::Invalid)
            .count();
        ProgressTally {
            valid_count,
            invalid_count,
            total_considered: valid_count + invalid_count,
            quota,
            completed: valid_count >= quota as usize,
        }
    }
}

/// Renders the progress message sent to a participant.
pub fn render_report(
    participant_id: &str,
    tally: &ProgressTally,
    site_label: &str,
    now: &DateTime<FixedOffset>,
) -> String {
    let mut msg = format!(
        "Hi {}, as of {}:\n",
        participant_id,
        now.format(REPORT_TIME_FORMAT)
    );
    if tally.completed {
        msg.push_str(&format!(
            "Congratulations! You completed at least {} data points inside {} buildings\n",
            tally.quota, site_label
        ));
    }

    if tally.total_considered > 0 {
        msg.push_str(&format!("Total data points: {}\n", tally.total_considered));
        msg.push_str(&format!(
            "Valid data points (within {}): {} out of {}\n",
            site_label, tally.valid_count, tally.quota
        ));
        msg.push_str(&format!("Data points left: {}\n", tally.remaining()));
    } else {
        msg.push_str("You haven't recorded any valid data points yet\n");
        msg.push_str(
            "Don't forget to turn on the YAK application and bluetooth before leaving feedback on the Fitbit smartwatch \n",
        );
    }
    msg
}

/// The report returned in place of the progress when a space is missing from the directory.
pub fn render_lookup_miss(participant_id: &str, space_id: i64) -> String {
    format!(
        "Daily report error for participant {}:\nSpace with space_id {} not found in spaces file",
        participant_id, space_id
    )
}
