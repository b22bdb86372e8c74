//! Source listing for `rflow sources`.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::Path;

use crate::config::Config;

/// Status of one configured source.
#[derive(Debug, Clone, Serialize)]
pub struct SourceStatus {
    pub name: String,
    /// `line_log`, `csv`, `json`, or `table`.
    pub kind: String,
    pub location: String,
    /// Whether the file, directory, or database exists.
    pub available: bool,
    /// Last modification time of the location, when it exists.
    pub modified: Option<DateTime<Utc>>,
}

/// Returns the status of every configured source, in name order.
pub fn get_sources(config: &Config) -> Vec<SourceStatus> {
    config
        .sources
        .iter()
        .map(|(name, source)| {
            let location = source.location();
            SourceStatus {
                name: name.clone(),
                kind: source.kind().to_string(),
                location: location.display().to_string(),
                available: location.exists(),
                modified: modified_at(location),
            }
        })
        .collect()
}

fn modified_at(path: &Path) -> Option<DateTime<Utc>> {
    let modified = std::fs::metadata(path).ok()?.modified().ok()?;
    Some(DateTime::<Utc>::from(modified))
}

pub fn list_sources(config: &Config) -> Result<()> {
    let sources = get_sources(config);
    if sources.is_empty() {
        println!("No sources configured.");
        return Ok(());
    }

    println!(
        "{:<16} {:<10} {:<8} {:<16} LOCATION",
        "SOURCE", "KIND", "STATUS", "MODIFIED"
    );
    let now = Utc::now();
    for s in &sources {
        let status = if s.available { "OK" } else { "MISSING" };
        let modified = s
            .modified
            .map(|ts| format_ts_relative(ts, now))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<16} {:<10} {:<8} {:<16} {}",
            s.name, s.kind, status, modified, s.location
        );
    }

    Ok(())
}

fn format_ts_relative(ts: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let delta = (now - ts).num_seconds();

    if delta < 0 {
        return format_ts_iso(ts);
    }

    if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{} min{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else if delta < 86400 * 30 {
        let days = delta / 86400;
        format!("{} day{} ago", days, if days == 1 { "" } else { "s" })
    } else {
        format_ts_iso(ts)
    }
}

fn format_ts_iso(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d %H:%M").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn relative_times() {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        assert_eq!(format_ts_relative(now - Duration::seconds(5), now), "just now");
        assert_eq!(format_ts_relative(now - Duration::minutes(1), now), "1 min ago");
        assert_eq!(format_ts_relative(now - Duration::hours(3), now), "3 hours ago");
        assert_eq!(format_ts_relative(now - Duration::days(2), now), "2 days ago");
        assert_eq!(
            format_ts_relative(now - Duration::days(45), now),
            "2024-04-17 12:00"
        );
        assert_eq!(
            format_ts_relative(now + Duration::hours(1), now),
            "2024-06-01 13:00"
        );
    }

    #[test]
    fn reports_missing_and_present_sources() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.csv"), "x\n1\n").unwrap();
        let config = crate::config::parse_config(&format!(
            "[sources.present]\nkind = \"csv\"\npath = \"{}\"\n\
             [sources.absent]\nkind = \"table\"\ndatabase = \"{}\"\nquery = \"SELECT 1\"\n",
            dir.path().join("a.csv").display(),
            dir.path().join("missing.db").display()
        ))
        .unwrap();

        let sources = get_sources(&config);
        assert_eq!(sources.len(), 2);
        assert_eq!(sources[0].name, "absent");
        assert!(!sources[0].available);
        assert!(sources[0].modified.is_none());
        assert_eq!(sources[1].kind, "csv");
        assert!(sources[1].available);
        assert!(sources[1].modified.is_some());
    }
}
