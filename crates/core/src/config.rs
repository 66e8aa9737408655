//! Loading typed configuration from disk.
//!
//! The format is picked by file extension: `.json`, `.yaml`/`.yml`, and
//! `.toml` or no extension for TOML. Other extensions are rejected.

use std::path::Path;

use serde::de::DeserializeOwned;

use crate::error::Error;
use crate::result::Result;

/// Load and deserialize a configuration file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or does not parse into `T`.
pub fn load_file<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::file_read_failed(path, e.to_string()))?;

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    tracing::debug!(path = %path.display(), format = %extension, "Loading configuration");
    parse_str(&content, &extension)
}

/// Parse configuration content in the format named by `extension`.
///
/// # Errors
///
/// Returns an error if the content does not parse into `T`.
pub fn parse_str<T: DeserializeOwned>(content: &str, extension: &str) -> Result<T> {
    match extension {
        "json" => serde_json::from_str(content).map_err(|e| Error::json_parse_failed(e.to_string())),
        "yaml" | "yml" => {
            serde_yaml::from_str(content).map_err(|e| Error::yaml_parse_failed(e.to_string()))
        }
        "toml" | "" => toml::from_str(content).map_err(|e| Error::toml_parse_failed(e.to_string())),
        other => Err(Error::UnsupportedFormat {
            extension: other.to_string(),
        }),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::io::Write;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Sample {
        workers: usize,
        #[serde(default)]
        name: String,
    }

    #[test]
    fn test_parse_toml() {
        let parsed: Sample = parse_str("workers = 4\nname = \"lab\"", "toml").unwrap();
        assert_eq!(
            parsed,
            Sample {
                workers: 4,
                name: "lab".into()
            }
        );
    }

    #[test]
    fn test_parse_json() {
        let parsed: Sample = parse_str(r#"{"workers": 2}"#, "json").unwrap();
        assert_eq!(parsed.workers, 2);
    }

    #[test]
    fn test_unsupported_extension() {
        let result: Result<Sample> = parse_str("", "ini");
        assert!(matches!(result, Err(Error::UnsupportedFormat { .. })));
    }

    #[test]
    fn test_load_file_picks_format_from_extension() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(file, "workers: 8").unwrap();

        let parsed: Sample = load_file(file.path()).unwrap();
        assert_eq!(parsed.workers, 8);
    }

    #[test]
    fn test_load_missing_file() {
        let result: Result<Sample> = load_file(Path::new("/nonexistent/kubelab.toml"));
        assert!(matches!(result, Err(Error::FileReadFailed { .. })));
    }
}
