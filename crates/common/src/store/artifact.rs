//! On-disk embedding artifact
//!
//! Version 1 is an object carrying the build metadata and a `records` array.
//! A bare top-level array of records is the legacy layout and is still read.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

use crate::errors::{AppError, Result};

/// One record as written by the ingestion pipeline
#[derive(Debug, Clone, Deserialize)]
pub struct ArtifactRecord {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default, alias = "chunk", alias = "content")]
    pub text: Option<String>,
    #[serde(default, alias = "vector")]
    pub embedding: Option<Vec<f32>>,
}

/// Versioned artifact envelope
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    /// Number of source documents the pipeline processed
    #[serde(default)]
    pub docs: Option<usize>,
    /// Number of embeddings the pipeline reported writing
    #[serde(default)]
    pub embeddings: Option<usize>,
    pub records: Vec<ArtifactRecord>,
}

impl Artifact {
    /// Parse either layout from raw bytes.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let value: Value = serde_json::from_slice(bytes).map_err(|e| AppError::MalformedArtifact {
            message: format!("artifact is not valid JSON: {}", e),
        })?;

        match value {
            Value::Array(_) => {
                let records = serde_json::from_value(value).map_err(|e| AppError::MalformedArtifact {
                    message: format!("invalid legacy record list: {}", e),
                })?;
                Ok(Self {
                    version: None,
                    created_at: None,
                    docs: None,
                    embeddings: None,
                    records,
                })
            }
            Value::Object(ref map) if map.contains_key("records") => {
                serde_json::from_value(value).map_err(|e| AppError::MalformedArtifact {
                    message: format!("invalid artifact: {}", e),
                })
            }
            Value::Object(_) => Err(AppError::MalformedArtifact {
                message: "artifact object has no `records` field".to_string(),
            }),
            other => Err(AppError::MalformedArtifact {
                message: format!("unexpected artifact root: {}", json_kind(&other)),
            }),
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_v1_envelope() {
        let raw = br#"{
            "version": "v2025-08-12-build",
            "createdAt": "2025-08-12T10:00:00Z",
            "docs": 1,
            "embeddings": 1,
            "records": [{"title": "Manual BPM", "source": "Manual BPM", "text": "Lavado de manos", "embedding": [0.1, 0.2]}]
        }"#;
        let artifact = Artifact::parse(raw).unwrap();
        assert_eq!(artifact.version.as_deref(), Some("v2025-08-12-build"));
        assert!(artifact.created_at.is_some());
        assert_eq!(artifact.records.len(), 1);
    }

    #[test]
    fn test_parse_legacy_array_with_aliases() {
        let raw = br#"[{"source": "a.pdf", "chunk": "texto", "vector": [1.0, 0.0]}]"#;
        let artifact = Artifact::parse(raw).unwrap();
        assert!(artifact.version.is_none());
        assert_eq!(artifact.records[0].text.as_deref(), Some("texto"));
        assert_eq!(artifact.records[0].embedding.as_deref(), Some(&[1.0, 0.0][..]));
    }

    #[test]
    fn test_parse_rejects_other_shapes() {
        for raw in [&b"{\"items\": []}"[..], b"42", b"not json"] {
            assert!(matches!(Artifact::parse(raw), Err(AppError::MalformedArtifact { .. })));
        }
    }
}
