//! Path and payload guards for the per-user document store

use std::path::{Path, PathBuf};

#[derive(Debug, PartialEq, Eq)]
pub enum SecurityError {
    /// File size exceeds maximum allowed
    FileSizeExceeded { limit: u64 },

    /// JSON format is invalid or malformed
    InvalidFormat,
}

impl std::fmt::Display for SecurityError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SecurityError::FileSizeExceeded { limit } => write!(f, "File size exceeds limit ({} bytes)", limit),
            SecurityError::InvalidFormat => write!(f, "Invalid format"),
        }
    }
}

impl std::error::Error for SecurityError {}

/// Map a user identifier onto a filesystem-safe stem.
///
/// Lower-cases the id and replaces every character outside `[a-z0-9-_]` with
/// `-`, so separators, dots and non-ASCII input can never escape the data
/// directory. An empty id maps to `-`.
pub fn safe_user_file(user: &str) -> String {
    let stem: String = user
        .chars()
        .flat_map(char::to_lowercase)
        .map(|c| if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_' { c } else { '-' })
        .collect();
    if stem.is_empty() { "-".to_string() } else { stem }
}

/// Full path of a user's document under `data_dir`.
pub fn user_document_path(data_dir: &Path, user: &str) -> PathBuf {
    data_dir.join(format!("{}.json", safe_user_file(user)))
}

pub fn validate_file_size(size: u64, max_size: u64) -> Result<(), SecurityError> {
    if size > max_size {
        return Err(SecurityError::FileSizeExceeded { limit: max_size });
    }
    Ok(())
}

/// Securely parse JSON with size limits and error handling
pub fn secure_json_parse<T>(content: &str, max_bytes: u64) -> Result<T, SecurityError>
where
    T: serde::de::DeserializeOwned,
{
    validate_file_size(content.len() as u64, max_bytes)?;

    // Interrupted writes on some filesystems leave leading NULs; valid JSON
    // never starts with one.
    let normalized = content.trim_start_matches('\0');

    serde_json::from_str(normalized).map_err(|_| SecurityError::InvalidFormat)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_user_file() {
        assert_eq!(safe_user_file("martin"), "martin");
        assert_eq!(safe_user_file("Player_One"), "player_one");
        assert_eq!(safe_user_file("Al Sayeed"), "al-sayeed");
        assert_eq!(safe_user_file("../etc/passwd"), "---etc-passwd");
        assert_eq!(safe_user_file("dev-42"), "dev-42");
        assert_eq!(safe_user_file(""), "-");
        assert!(!safe_user_file("C:\\Windows\\x").contains('\\'));
    }

    #[test]
    fn non_ascii_ids_collapse_to_dashes() {
        assert_eq!(safe_user_file("Zoë"), "zo-");
        assert_eq!(safe_user_file("名前"), "--");
    }

    #[test]
    fn document_path_stays_inside_data_dir() {
        let dir = Path::new("/srv/state");
        let path = user_document_path(dir, "../../root");
        assert_eq!(path, Path::new("/srv/state/------root.json"));
        assert!(path.starts_with(dir));
    }

    #[test]
    fn test_secure_json_parse() {
        let v: serde_json::Value = secure_json_parse("\0\0{\"a\":1}", 100).unwrap();
        assert_eq!(v["a"], 1);
        assert_eq!(
            secure_json_parse::<serde_json::Value>("{\"a\":1}", 3).unwrap_err(),
            SecurityError::FileSizeExceeded { limit: 3 }
        );
        assert_eq!(
            secure_json_parse::<serde_json::Value>("{broken", 100).unwrap_err(),
            SecurityError::InvalidFormat
        );
    }
}
