//! Event batch loading
//!
//! Accepts either a JSON array of events or JSON lines (one event per line).

use std::path::Path;

use anyhow::{Context, Result};
use sentinel_lib::Event;

pub fn load_events(path: &Path) -> Result<Vec<Event>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read events from {}", path.display()))?;
    parse_events(&raw).with_context(|| format!("failed to parse events in {}", path.display()))
}

pub fn parse_events(raw: &str) -> Result<Vec<Event>> {
    let trimmed = raw.trim_start();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }

    if trimmed.starts_with('[') {
        return serde_json::from_str(trimmed).context("invalid JSON array");
    }

    raw.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            serde_json::from_str(line).with_context(|| format!("invalid event on line {}", i + 1))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_array() {
        let raw = r#"[
            {"timestamp": "2024-01-01T00:00:00Z", "http_status": 200},
            {"timestamp": "2024-01-01T00:01:00Z", "http_status": 500, "error_flag": true}
        ]"#;
        let events = parse_events(raw).unwrap();
        assert_eq!(events.len(), 2);
        assert!(events[1].error_flag);
    }

    #[test]
    fn test_parse_json_lines() {
        let raw = "{\"timestamp\": \"2024-01-01T00:00:00Z\", \"http_status\": 404}\n\n{\"timestamp\": \"2024-01-01T00:02:00Z\", \"http_status\": 200}\n";
        let events = parse_events(raw).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].http_status, 404);
    }

    #[test]
    fn test_bad_line_reports_line_number() {
        let raw = "{\"timestamp\": \"2024-01-01T00:00:00Z\", \"http_status\": 200}\nnot json\n";
        let err = parse_events(raw).unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn test_load_events_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "{{\"timestamp\": \"2024-01-01T00:00:00Z\", \"http_status\": 403, \"environment\": \"prod\"}}"
        )
        .unwrap();

        let events = load_events(file.path()).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].environment, "prod");

        let err = load_events(Path::new("/nonexistent/events.json")).unwrap_err();
        assert!(err.to_string().contains("failed to read events"));
    }

    #[test]
    fn test_empty_input() {
        assert!(parse_events("  \n").unwrap().is_empty());
    }
}
