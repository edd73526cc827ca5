//! Typed decoders for the JSON `value` documents of individual column types.
//!
//! The platform has shipped several shapes for person payloads over time.
//! Each accepted shape is a variant below; anything else decodes to an empty
//! list and is reported once per column.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use once_cell::sync::Lazy;
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::Mutex;

static WARNED_COLUMNS: Lazy<Mutex<HashSet<String>>> = Lazy::new(|| Mutex::new(HashSet::new()));

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PersonId {
    Number(i64),
    Text(String),
}

impl PersonId {
    fn into_string(self) -> String {
        match self {
            Self::Number(n) => n.to_string(),
            Self::Text(s) => s,
        }
    }
}

#[derive(Debug, Deserialize)]
struct PersonRef {
    id: PersonId,
    #[serde(default)]
    kind: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PersonPayload {
    PersonsAndTeams {
        #[serde(rename = "personsAndTeams")]
        persons_and_teams: Vec<PersonRef>,
    },
    Persons {
        persons: Vec<PersonRef>,
    },
    Single {
        id: PersonId,
    },
}

impl PersonPayload {
    fn into_ids(self) -> Vec<String> {
        match self {
            Self::PersonsAndTeams { persons_and_teams } => persons_and_teams
                .into_iter()
                .filter(|p| p.kind.as_deref().map_or(true, |k| k == "person"))
                .map(|p| p.id.into_string())
                .collect(),
            Self::Persons { persons } => persons.into_iter().map(|p| p.id.into_string()).collect(),
            Self::Single { id } => vec![id.into_string()],
        }
    }
}

fn is_blank(raw: Option<&str>) -> bool {
    match raw.map(str::trim) {
        None => true,
        Some(s) => s.is_empty() || s == "null" || s == "{}",
    }
}

fn warn_once(column_id: &str, detail: &str) {
    let first = WARNED_COLUMNS
        .lock()
        .map(|mut seen| seen.insert(column_id.to_string()))
        .unwrap_or(false);
    if first {
        tracing::warn!(
            "Unrecognized person payload in column {}, treating as unassigned: {}",
            column_id,
            detail
        );
    }
}

/// Decode the assigned person ids of a person/people cell.
pub fn decode_people(column_id: &str, raw: Option<&str>) -> Vec<String> {
    if is_blank(raw) {
        return Vec::new();
    }
    let raw = raw.unwrap_or_default();

    match serde_json::from_str::<PersonPayload>(raw) {
        Ok(payload) => payload.into_ids(),
        Err(e) => {
            warn_once(column_id, &e.to_string());
            Vec::new()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LinkValue {
    pub url: Option<String>,
    pub text: Option<String>,
}

pub fn decode_link(raw: Option<&str>) -> Option<LinkValue> {
    if is_blank(raw) {
        return None;
    }
    serde_json::from_str(raw?).ok()
}

#[derive(Debug, Deserialize)]
struct DateValue {
    date: Option<String>,
    time: Option<String>,
}

fn parse_date_text(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, format) {
            return Some(dt);
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .map(|d| d.and_time(NaiveTime::MIN))
}

/// Decode a date cell, preferring the JSON value and falling back to the
/// display text. `None` means "no usable date".
pub fn decode_date(raw: Option<&str>, text: &str) -> Option<NaiveDateTime> {
    if !is_blank(raw) {
        if let Some(value) = raw.and_then(|r| serde_json::from_str::<DateValue>(r).ok()) {
            if let Some(date) = value.date.as_deref() {
                let joined = match value.time.as_deref() {
                    Some(time) if !time.trim().is_empty() => format!("{} {}", date, time),
                    _ => date.to_string(),
                };
                if let Some(dt) = parse_date_text(&joined) {
                    return Some(dt);
                }
            }
        }
    }
    parse_date_text(text)
}

/// Numeric value of a numbers cell; anything non-numeric counts as zero.
pub fn decode_number(raw: Option<&str>, text: &str) -> f64 {
    let from_text = text.trim().parse::<f64>().ok();
    let from_value = || {
        let raw = raw?;
        match serde_json::from_str::<serde_json::Value>(raw).ok()? {
            serde_json::Value::Number(n) => n.as_f64(),
            serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }
    };

    from_text
        .or_else(from_value)
        .filter(|n| n.is_finite())
        .unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_people_persons_and_teams() {
        let raw = r#"{"changed_at":"2024-01-01","personsAndTeams":[{"id":101,"kind":"person"},{"id":7,"kind":"team"},{"id":"102","kind":"person"}]}"#;
        assert_eq!(decode_people("people", Some(raw)), vec!["101", "102"]);
    }

    #[test]
    fn test_people_legacy_shapes() {
        assert_eq!(
            decode_people("people", Some(r#"{"persons":[{"id":5},{"id":6}]}"#)),
            vec!["5", "6"]
        );
        assert_eq!(decode_people("person", Some(r#"{"id":42}"#)), vec!["42"]);
    }

    #[test]
    fn test_people_fails_closed() {
        assert!(decode_people("weird_column", Some(r#"{"assignees":[1,2]}"#)).is_empty());
        assert!(decode_people("weird_column", Some("[1,2]")).is_empty());
        assert!(decode_people("people", None).is_empty());
        assert!(decode_people("people", Some("null")).is_empty());
    }

    #[test]
    fn test_decode_link() {
        let link = decode_link(Some(r#"{"url":"https://example.com","text":"Example"}"#)).unwrap();
        assert_eq!(link.url.as_deref(), Some("https://example.com"));
        assert_eq!(link.text.as_deref(), Some("Example"));
        assert!(decode_link(Some("garbage")).is_none());
    }

    #[test]
    fn test_decode_date_prefers_value() {
        let dt = decode_date(Some(r#"{"date":"2024-03-05","time":"10:30:00"}"#), "").unwrap();
        assert_eq!(dt.to_string(), "2024-03-05 10:30:00");

        let dt = decode_date(None, "2024-03-05").unwrap();
        assert_eq!(dt.to_string(), "2024-03-05 00:00:00");

        assert!(decode_date(None, "next tuesday").is_none());
    }

    #[test]
    fn test_decode_number() {
        assert_eq!(decode_number(None, "3.5"), 3.5);
        assert_eq!(decode_number(Some(r#""12""#), ""), 12.0);
        assert_eq!(decode_number(None, "abc"), 0.0);
        assert_eq!(decode_number(None, "NaN"), 0.0);
    }
}
