use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// One externally observed catalog.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Source {
    pub key: String,
    pub title: String,
    pub locator: String,
}

impl Source {
    pub fn new(
        key: impl Into<String>,
        title: impl Into<String>,
        locator: impl Into<String>,
    ) -> Self {
        Self {
            key: key.into(),
            title: title.into(),
            locator: locator.into(),
        }
    }

    pub fn validate_key(&self) -> Result<(), SourceConfigError> {
        let key = self.key.as_str();
        if key.is_empty() {
            return Err(SourceConfigError::EmptyKey);
        }
        if key == "." || key == ".." {
            return Err(SourceConfigError::UnsafeKey(key.to_string()));
        }
        let safe = key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
        if !safe {
            return Err(SourceConfigError::UnsafeKey(key.to_string()));
        }
        Ok(())
    }
}

impl Display for Source {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.title, self.key)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SourceConfigError {
    #[error("source key must not be empty")]
    EmptyKey,
    #[error("source key is not filesystem-safe: {0:?}")]
    UnsafeKey(String),
    #[error("duplicate source key: {0}")]
    DuplicateKey(String),
    #[error("unknown source key: {0}")]
    UnknownKey(String),
}

/// A labelled row of a catalog entry. `value` keeps its inner markup verbatim.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Detail {
    pub label: String,
    pub value: String,
}

impl Detail {
    pub fn new(label: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            value: value.into(),
        }
    }
}

/// One canonical catalog entry. Pure value: no identity beyond field content.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    pub title: String,
    #[serde(default)]
    pub subtitle: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub details: Vec<Detail>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_link: Option<String>,
}

impl Record {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }
}

/// Full state of a source at one observation, in document order.
pub type Snapshot = Vec<Record>;

/// SHA-256 over the compact JSON form of a snapshot.
pub fn snapshot_digest(snapshot: &[Record]) -> String {
    let canonical = serde_json::to_string(snapshot).unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_download_link_is_omitted_from_json() {
        let record = Record::titled("A");
        let json = serde_json::to_value(&record).expect("serialize record");
        assert_eq!(
            json,
            serde_json::json!({
                "title": "A",
                "subtitle": "",
                "description": "",
                "details": []
            })
        );
    }

    #[test]
    fn reads_camel_case_records() {
        let raw = r#"[{"title":"B","subtitle":"s","description":"d",
            "details":[{"label":"Format","value":"<b>CSV</b>"}],
            "downloadLink":"http://x/doc.pdf"}]"#;
        let parsed: Snapshot = serde_json::from_str(raw).expect("parse snapshot");
        assert_eq!(parsed[0].download_link.as_deref(), Some("http://x/doc.pdf"));
        assert_eq!(parsed[0].details[0], Detail::new("Format", "<b>CSV</b>"));
    }

    #[test]
    fn rejects_unsafe_keys() {
        assert!(Source::new("umwelt-klima", "Umwelt", "u").validate_key().is_ok());
        assert_eq!(
            Source::new("", "t", "u").validate_key(),
            Err(SourceConfigError::EmptyKey)
        );
        assert!(Source::new("..", "t", "u").validate_key().is_err());
        assert!(Source::new("a/b", "t", "u").validate_key().is_err());
    }

    #[test]
    fn digest_tracks_content() {
        let a = vec![Record::titled("A")];
        let b = vec![Record::titled("B")];
        assert_eq!(snapshot_digest(&a), snapshot_digest(&a.clone()));
        assert_ne!(snapshot_digest(&a), snapshot_digest(&b));
    }
}
