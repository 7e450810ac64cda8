//! Serialized query-cache state shipped inside rendered pages.
//!
//! The payload travels as JSON inside a `<script type="application/json">`
//! element. Characters that could end the element early or confuse an HTML
//! parser are emitted as JSON unicode escapes, which decode back to the same
//! text.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use time::OffsetDateTime;

use super::keys::QueryKey;

/// Format version. Payloads with any other version are rejected.
pub const SNAPSHOT_VERSION: u32 = 1;

/// `id` of the script element carrying the page payload.
pub const PAYLOAD_SCRIPT_ID: &str = "__CHIRP_DATA__";

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("snapshot json is malformed: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("snapshot version {found} is not supported (expected {SNAPSHOT_VERSION})")]
    UnsupportedVersion { found: u32 },
    #[error("payload script element is not terminated")]
    Unterminated,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotEntry {
    pub key: QueryKey,
    pub data: Value,
    #[serde(with = "time::serde::rfc3339")]
    pub fetched_at: OffsetDateTime,
}

/// Successful cache entries at the moment a page was generated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub version: u32,
    pub entries: Vec<SnapshotEntry>,
}

impl Default for Snapshot {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl Snapshot {
    pub fn new(entries: Vec<SnapshotEntry>) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            entries,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &QueryKey> {
        self.entries.iter().map(|entry| &entry.key)
    }

    pub fn to_json(&self) -> Result<String, SnapshotError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(text: &str) -> Result<Self, SnapshotError> {
        let snapshot: Snapshot = serde_json::from_str(text)?;
        snapshot.check_version()?;
        Ok(snapshot)
    }

    pub fn check_version(&self) -> Result<(), SnapshotError> {
        if self.version == SNAPSHOT_VERSION {
            Ok(())
        } else {
            Err(SnapshotError::UnsupportedVersion {
                found: self.version,
            })
        }
    }
}

/// Serialize `value` as JSON that is safe to place verbatim inside a script
/// element.
pub fn encode_script_json<T: Serialize>(value: &T) -> Result<String, SnapshotError> {
    let json = serde_json::to_string(value)?;
    let mut out = String::with_capacity(json.len());
    for ch in json.chars() {
        match ch {
            '<' => out.push_str("\\u003c"),
            '>' => out.push_str("\\u003e"),
            '&' => out.push_str("\\u0026"),
            '\u{2028}' => out.push_str("\\u2028"),
            '\u{2029}' => out.push_str("\\u2029"),
            other => out.push(other),
        }
    }
    Ok(out)
}

/// Render the payload script element.
pub fn payload_script<T: Serialize>(value: &T) -> Result<String, SnapshotError> {
    Ok(format!(
        r#"<script id="{PAYLOAD_SCRIPT_ID}" type="application/json">{}</script>"#,
        encode_script_json(value)?
    ))
}

/// Text of the payload script element in `html`, if the page carries one.
pub fn extract_payload(html: &str) -> Result<Option<&str>, SnapshotError> {
    let marker = format!(r#"<script id="{PAYLOAD_SCRIPT_ID}""#);
    let Some(start) = html.find(&marker) else {
        return Ok(None);
    };
    let rest = &html[start + marker.len()..];
    let open_end = rest.find('>').ok_or(SnapshotError::Unterminated)?;
    let body = &rest[open_end + 1..];
    let close = body.find("</script>").ok_or(SnapshotError::Unterminated)?;
    Ok(Some(body[..close].trim()))
}
