//! JSON-lines event streams.
//!
//! One `BuildEvent` per line. Blank lines and lines starting with `#` are
//! skipped so recorded streams can carry comments.

use std::io::BufRead;

use crate::error::{EventError, EventResult};
use crate::event::BuildEvent;

/// Read every event from a JSON-lines reader, in order.
pub fn parse_events<R: BufRead>(reader: R) -> EventResult<Vec<BuildEvent>> {
    let mut events = Vec::new();

    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let line_no = idx + 1;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let event: BuildEvent = serde_json::from_str(trimmed).map_err(|e| EventError::Parse {
            line: line_no,
            message: e.to_string(),
        })?;
        if event.project.trim().is_empty() {
            return Err(EventError::EmptyProject { line: line_no });
        }
        events.push(event);
    }

    Ok(events)
}

/// Convenience wrapper over [`parse_events`] for in-memory input.
pub fn parse_events_str(input: &str) -> EventResult<Vec<BuildEvent>> {
    parse_events(input.as_bytes())
}
