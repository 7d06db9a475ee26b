use std::path::{Path, PathBuf};

use chrono::{DateTime, FixedOffset};

use crate::tracker::*;

pub fn resolve_path(root: &Path, path: &str) -> PathBuf {
    let p = Path::new(path);
    if p.is_absolute() {
        p.to_path_buf()
    } else {
        root.join(p)
    }
}

/// Parses an RFC 3339 timestamp and moves it to the time zone of the study.
pub fn parse_timestamp(
    content: &str,
    lineno: usize,
    time_zone: &FixedOffset,
) -> TrackerResult<DateTime<FixedOffset>> {
    let ts = DateTime::parse_from_rfc3339(content.trim())
        .context(ParsingTimestampSnafu { lineno, content })?;
    Ok(ts.with_timezone(time_zone))
}

/// Removes the repeated entries, keeping the first occurence.
pub fn unique_in_order(items: &[String]) -> Vec<String> {
    let mut seen: HashSet<&String> = HashSet::new();
    items
        .iter()
        .filter(|s| seen.insert(*s))
        .cloned()
        .collect()
}
