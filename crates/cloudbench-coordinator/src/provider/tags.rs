//! Resource tags for cloudbench
//!
//! Every resource cloudbench creates carries these tags so leftovers from a
//! crashed run can be found by run URI and removed.
//!
//! | Tag Key | Description |
//! |---------|-------------|
//! | `cloudbench-tool` | Static identifier ("cloudbench") |
//! | `cloudbench-run-uri` | Run URI the resource belongs to |
//! | `cloudbench-created-at` | RFC 3339 creation timestamp |

use cloudbench_common::RunUri;

/// Tag key for tool identification
pub const TAG_TOOL: &str = "cloudbench-tool";

/// Tag value for tool identification
pub const TAG_TOOL_VALUE: &str = "cloudbench";

/// Tag key for the run URI
pub const TAG_RUN_URI: &str = "cloudbench-run-uri";

/// Tag key for creation timestamp (RFC 3339 format)
pub const TAG_CREATED_AT: &str = "cloudbench-created-at";

/// Helper to format creation timestamp for tags
pub fn format_created_at(time: chrono::DateTime<chrono::Utc>) -> String {
    time.to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}

/// Standard tags as `key=value` pairs
pub fn standard_tags(run_uri: &RunUri) -> Vec<String> {
    vec![
        format!("{TAG_TOOL}={TAG_TOOL_VALUE}"),
        format!("{TAG_RUN_URI}={run_uri}"),
        format!(
            "{TAG_CREATED_AT}={}",
            format_created_at(chrono::Utc::now())
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn created_at_is_whole_seconds_utc() {
        let time = chrono::DateTime::parse_from_rfc3339("2024-05-01T14:30:45.123+02:00")
            .unwrap()
            .with_timezone(&chrono::Utc);
        assert_eq!(format_created_at(time), "2024-05-01T12:30:45Z");
    }

    #[test]
    fn standard_tags_carry_run_uri() {
        let uri = RunUri::parse("abc123").unwrap();
        let tags = standard_tags(&uri);
        assert_eq!(tags.len(), 3);
        assert_eq!(tags[0], "cloudbench-tool=cloudbench");
        assert_eq!(tags[1], "cloudbench-run-uri=abc123");
        assert!(tags[2].starts_with("cloudbench-created-at="));
    }
}
