//! Frame-keyed JSON catalogs
//!
//! Both the reference-date database and the algorithm-parameter override
//! file are JSON objects keyed by frame identifier, either flat
//! (`{"23210": ...}`) or wrapped (`{"data": {"23210": ...}}`).
//! A missing file is a valid configuration and yields an empty entry.

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::{Error, Result};

const WRAPPER_KEY: &str = "data";

/// Requested reference changeover dates for one frame, ascending and unique
pub type ReferenceDates = BTreeSet<NaiveDate>;

/// Look up `frame_id` in a parsed catalog document.
///
/// Returns `None` when the frame has no entry.
pub fn frame_entry<'a>(document: &'a Value, frame_id: &str) -> Option<&'a Value> {
    let table = match document.get(WRAPPER_KEY) {
        Some(inner @ Value::Object(_)) => inner,
        _ => document,
    };
    table.get(frame_id)
}

/// Read the catalog at `path` and return the entry for `frame_id`.
///
/// `None` paths and files that do not exist both produce `Ok(None)`.
pub fn load_frame_entry(path: Option<&Path>, frame_id: &str) -> Result<Option<Value>> {
    let Some(path) = path else {
        return Ok(None);
    };
    if !path.exists() {
        warn!("Catalog file not found, treating as empty: {}", path.display());
        return Ok(None);
    }

    let content = fs::read_to_string(path)?;
    let document: Value = serde_json::from_str(&content)?;
    let entry = frame_entry(&document, frame_id).cloned();
    debug!(
        catalog = %path.display(),
        frame_id,
        found = entry.is_some(),
        "Loaded frame catalog entry"
    );
    Ok(entry)
}

/// Frame-specific parameter overrides; an empty map when none exist.
pub fn load_overrides(path: Option<&Path>, frame_id: &str) -> Result<Map<String, Value>> {
    match load_frame_entry(path, frame_id)? {
        None => Ok(Map::new()),
        Some(Value::Object(map)) => Ok(map),
        Some(other) => Err(Error::Config(format!(
            "Overrides for frame {} must be an object, found {}",
            frame_id, other
        ))),
    }
}

/// Requested reference dates for a frame.
pub fn load_reference_dates(path: Option<&Path>, frame_id: &str) -> Result<ReferenceDates> {
    match load_frame_entry(path, frame_id)? {
        None => Ok(ReferenceDates::new()),
        Some(entry) => reference_dates_from_value(&entry),
    }
}

/// Parse a JSON array of ISO-8601 date or datetime strings.
pub fn reference_dates_from_value(entry: &Value) -> Result<ReferenceDates> {
    let items = entry.as_array().ok_or_else(|| {
        Error::Config(format!("Reference dates must be a list, found {}", entry))
    })?;

    items
        .iter()
        .map(|item| {
            let s = item.as_str().ok_or_else(|| {
                Error::Config(format!("Reference date must be a string, found {}", item))
            })?;
            parse_iso_date(s)
        })
        .collect()
}

/// Calendar date of an ISO-8601 date or datetime string.
///
/// Offsets are not applied: the date is taken as written.
pub fn parse_iso_date(s: &str) -> Result<NaiveDate> {
    let s = s.trim();
    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Ok(d);
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(dt.date());
        }
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.naive_local().date());
    }
    if let Ok(dt) = DateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f%:z") {
        return Ok(dt.naive_local().date());
    }
    Err(Error::Config(format!("Invalid ISO-8601 date: {:?}", s)))
}
