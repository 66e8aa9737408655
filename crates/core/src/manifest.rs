//! Multi-document YAML manifests.
//!
//! A manifest file holds `---` separated documents, each carrying a `kind`.
//! Documents are returned as JSON values so typed consumers can pick the
//! ones they understand.

use std::path::Path;

use serde::Deserialize;

use crate::error::Error;
use crate::result::Result;

/// A single manifest document.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    /// Value of the `kind` field.
    pub kind: String,
    /// The full document.
    pub body: serde_json::Value,
}

impl Document {
    /// Deserialize the document body into a typed value.
    ///
    /// # Errors
    ///
    /// Returns an error if the body does not match `T`.
    pub fn decode<T: serde::de::DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(self.body.clone()).map_err(|e| Error::json_parse_failed(e.to_string()))
    }
}

/// Parse every non-empty document in `content`.
///
/// # Errors
///
/// Returns an error if a document is not valid YAML or has no `kind`.
pub fn parse_documents(content: &str) -> Result<Vec<Document>> {
    let mut documents = Vec::new();

    for (index, de) in serde_yaml::Deserializer::from_str(content).enumerate() {
        let value = serde_yaml::Value::deserialize(de)
            .map_err(|e| Error::invalid_document(index, e.to_string()))?;

        if value.is_null() {
            continue;
        }

        let body = serde_json::to_value(&value)
            .map_err(|e| Error::invalid_document(index, e.to_string()))?;

        let kind = body
            .get("kind")
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| Error::invalid_document(index, "missing 'kind'"))?
            .to_string();

        documents.push(Document { kind, body });
    }

    Ok(documents)
}

/// Read and parse a manifest file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed.
pub fn load_documents(path: &Path) -> Result<Vec<Document>> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::file_read_failed(path, e.to_string()))?;
    parse_documents(&content)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const MANIFEST: &str = r"
kind: Account
metadata:
  name: alice
spec:
  id: alice
---
kind: Classroom
metadata:
  name: networks
spec:
  teacher: carol
---
";

    #[test]
    fn test_parse_skips_empty_documents() {
        let docs = parse_documents(MANIFEST).unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].kind, "Account");
        assert_eq!(docs[1].kind, "Classroom");
    }

    #[test]
    fn test_missing_kind_is_rejected() {
        let result = parse_documents("metadata:\n  name: x\n");
        assert!(matches!(result, Err(Error::InvalidDocument { index: 0, .. })));
    }

    #[test]
    fn test_decode_document() {
        #[derive(Deserialize)]
        struct Named {
            metadata: Meta,
        }
        #[derive(Deserialize)]
        struct Meta {
            name: String,
        }

        let docs = parse_documents(MANIFEST).unwrap();
        let named: Named = docs[1].decode().unwrap();
        assert_eq!(named.metadata.name, "networks");
    }
}
