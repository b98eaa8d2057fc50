//! Credential metadata (`<stem>.json`)
//!
//! Metadata files come from several exporters with inconsistent key styles
//! (`app_id`, `appId`, `api_id`, `API_HASH`...). Keys are compared after
//! lowercasing and removing underscores.

use std::path::Path;

use serde_json::Value;
use tracing::debug;

use crate::constants::{DEFAULT_APP_HASH, DEFAULT_APP_ID};
use crate::error::{Error, Result};

/// App id/hash pair the session client authenticates the application with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppCredentials {
    pub app_id: i64,
    pub app_hash: String,
}

impl Default for AppCredentials {
    fn default() -> Self {
        Self {
            app_id: DEFAULT_APP_ID,
            app_hash: DEFAULT_APP_HASH.to_string(),
        }
    }
}

/// Load the app credential pair from a metadata file.
///
/// A missing file, or a file lacking either field, yields the defaults. A
/// file that exists but cannot be decoded, or whose fields have the wrong
/// type, is an error.
pub async fn load_app_credentials(path: &Path) -> Result<AppCredentials> {
    let contents = match tokio::fs::read_to_string(path).await {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "no credential metadata, using defaults");
            return Ok(AppCredentials::default());
        }
        Err(e) => {
            return Err(Error::Io(format!(
                "reading credential metadata {}: {e}",
                path.display()
            )));
        }
    };
    parse_app_credentials(&contents)
}

fn parse_app_credentials(contents: &str) -> Result<AppCredentials> {
    let raw: serde_json::Map<String, Value> = serde_json::from_str(contents)
        .map_err(|e| Error::Metadata(format!("decoding metadata JSON: {e}")))?;

    let mut app_id = None;
    let mut app_hash = None;

    for (key, value) in &raw {
        match normalize_key(key).as_str() {
            "appid" | "apiid" => app_id = Some(parse_app_id(key, value)?),
            "apphash" | "apihash" => match value {
                Value::String(hash) => app_hash = Some(hash.clone()),
                other => {
                    return Err(Error::Metadata(format!(
                        "{key} must be a string, got {}",
                        type_name(other)
                    )));
                }
            },
            _ => {}
        }
    }

    match (app_id, app_hash) {
        (Some(app_id), Some(app_hash)) => Ok(AppCredentials { app_id, app_hash }),
        _ => Ok(AppCredentials::default()),
    }
}

fn parse_app_id(key: &str, value: &Value) -> Result<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .ok_or_else(|| Error::Metadata(format!("{key} is not an integer: {n}"))),
        Value::String(s) => s
            .trim()
            .parse()
            .map_err(|e| Error::Metadata(format!("{key} is not numeric ({s:?}): {e}"))),
        other => Err(Error::Metadata(format!(
            "{key} must be a number or numeric string, got {}",
            type_name(other)
        ))),
    }
}

fn normalize_key(key: &str) -> String {
    key.to_lowercase().replace('_', "")
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
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
    fn snake_case_keys() {
        let creds = parse_app_credentials(r#"{"app_id": 611335, "app_hash": "d524b414"}"#).unwrap();
        assert_eq!(creds.app_id, 611335);
        assert_eq!(creds.app_hash, "d524b414");
    }

    #[test]
    fn api_prefixed_and_mixed_case_keys() {
        let creds = parse_app_credentials(r#"{"API_ID": "94575", "ApiHash": "a3406de8"}"#).unwrap();
        assert_eq!(creds.app_id, 94575);
        assert_eq!(creds.app_hash, "a3406de8");
    }

    #[test]
    fn missing_field_falls_back_to_defaults() {
        let creds = parse_app_credentials(r#"{"app_id": 1, "phone": "+100"}"#).unwrap();
        assert_eq!(creds, AppCredentials::default());
    }

    #[test]
    fn non_numeric_id_is_an_error() {
        let err = parse_app_credentials(r#"{"app_id": "abc", "app_hash": "x"}"#).unwrap_err();
        assert!(err.to_string().contains("not numeric"), "got: {err}");
    }

    #[test]
    fn non_string_hash_is_an_error() {
        let err = parse_app_credentials(r#"{"app_id": 1, "app_hash": 7}"#).unwrap_err();
        assert!(err.to_string().contains("must be a string"), "got: {err}");
    }

    #[test]
    fn invalid_json_is_an_error() {
        assert!(matches!(
            parse_app_credentials("not json"),
            Err(Error::Metadata(_))
        ));
    }

    #[tokio::test]
    async fn missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let creds = load_app_credentials(&dir.path().join("absent.json"))
            .await
            .unwrap();
        assert_eq!(creds.app_id, DEFAULT_APP_ID);
        assert_eq!(creds.app_hash, DEFAULT_APP_HASH);
    }

    #[tokio::test]
    async fn reads_file_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("acct.json");
        tokio::fs::write(&path, r#"{"appId": 42, "appHash": "hash"}"#)
            .await
            .unwrap();
        let creds = load_app_credentials(&path).await.unwrap();
        assert_eq!(creds.app_id, 42);
        assert_eq!(creds.app_hash, "hash");
    }
}
