//! Cursors and reset command implementations.

use crate::settings::Settings;
use cinesync_state::{StateStore, SyncCursor};
use serde::Serialize;
use std::io::Write;

/// One persisted cursor.
#[derive(Debug, Serialize)]
struct CursorEntry<'a> {
    stream: &'a str,
    #[serde(flatten)]
    cursor: &'a SyncCursor,
}

/// Runs the `cursors` command.
pub fn list(settings: &Settings, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let store = settings.state_store()?;
    let entries = store.entries()?;
    let stdout = std::io::stdout();
    write_entries(&mut stdout.lock(), &entries, format)
}

fn write_entries(
    out: &mut impl Write,
    entries: &[(String, SyncCursor)],
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    match format {
        "json" => {
            let rows: Vec<CursorEntry<'_>> = entries
                .iter()
                .map(|(stream, cursor)| CursorEntry { stream, cursor })
                .collect();
            writeln!(out, "{}", serde_json::to_string_pretty(&rows)?)?;
        }
        _ => {
            if entries.is_empty() {
                writeln!(out, "No cursors stored; every stream starts from the beginning.")?;
            }
            for (stream, cursor) in entries {
                writeln!(
                    out,
                    "{:<20} {} {}",
                    stream,
                    cursor.last_seen_timestamp.to_rfc3339(),
                    cursor.last_seen_id
                )?;
            }
        }
    }
    Ok(())
}

/// Runs the `reset` command.
pub fn reset(settings: &Settings, stream: &str) -> Result<(), Box<dyn std::error::Error>> {
    let store = settings.state_store()?;
    if store.remove(stream)? {
        tracing::info!(stream, "cursor removed");
        println!("Cursor of {} removed; it restarts from the beginning.", stream);
    } else {
        println!("No cursor stored for {}.", stream);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use uuid::Uuid;

    fn entries() -> Vec<(String, SyncCursor)> {
        vec![(
            "film_works".to_string(),
            SyncCursor::new(Utc.timestamp_opt(0, 0).unwrap(), Uuid::from_u128(1)),
        )]
    }

    #[test]
    fn text_output() {
        let mut out = Vec::new();
        write_entries(&mut out, &entries(), "text").unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("film_works"));
        assert!(text.contains("1970-01-01T00:00:00+00:00"));
        assert!(text.contains(&Uuid::from_u128(1).to_string()));
    }

    #[test]
    fn json_output() {
        let mut out = Vec::new();
        write_entries(&mut out, &entries(), "json").unwrap();
        let value: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(value[0]["stream"], "film_works");
        assert_eq!(value[0]["last_seen_id"], Uuid::from_u128(1).to_string());
        assert!(value[0]["last_seen_timestamp"].is_string());
    }

    #[test]
    fn empty_state_message() {
        let mut out = Vec::new();
        write_entries(&mut out, &[], "text").unwrap();
        assert!(String::from_utf8(out).unwrap().starts_with("No cursors stored"));
    }
}
