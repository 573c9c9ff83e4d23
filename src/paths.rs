//! Folder path and basename normalization/validation.
//!
//! A folder path is a `/`-separated sequence of segments with no leading
//! or trailing slash; the root folder's path is the empty string. A
//! basename is a single path segment: non-empty, no `/`, no NUL.

use crate::error::AssetStoreError;

/// Normalizes a folder path: trims a leading/trailing `/` and collapses the
/// empty case to `""` (root). Does not validate segment contents - that
/// happens per-segment in `split_segments`.
pub fn normalize_folder_path(path: &str) -> String {
    path.trim_matches('/').to_string()
}

/// Splits a normalized folder path into its segments. The root (`""`)
/// splits into an empty vector.
pub fn split_segments(path: &str) -> Vec<&str> {
    if path.is_empty() {
        Vec::new()
    } else {
        path.split('/').collect()
    }
}

/// Joins a parent path and a final segment into a child path, following
/// the invariant `parentPath + "/" + name == path` (or `name == path`
/// when `parentPath` is empty).
pub fn join(parent_path: &str, name: &str) -> String {
    if parent_path.is_empty() {
        name.to_string()
    } else {
        format!("{parent_path}/{name}")
    }
}

/// Validates a single path segment (folder name or asset basename):
/// non-empty, no `/`, no NUL byte.
pub fn validate_segment(segment: &str) -> Result<(), AssetStoreError> {
    if segment.is_empty() {
        return Err(AssetStoreError::InvalidBasename(
            "segment must not be empty".into(),
        ));
    }
    if segment.contains('/') {
        return Err(AssetStoreError::InvalidBasename(
            "segment must not contain '/'".into(),
        ));
    }
    if segment.contains('\0') {
        return Err(AssetStoreError::InvalidBasename(
            "segment must not contain NUL".into(),
        ));
    }
    Ok(())
}

/// Validates a `basename` per §4.2: non-empty, no `/`, no NUL, and bounded
/// length (the `BasenameTooLong` error kind from §7).
pub fn validate_basename(basename: &str) -> Result<(), AssetStoreError> {
    validate_segment(basename)?;
    const MAX_BASENAME_LEN: usize = 255;
    if basename.len() > MAX_BASENAME_LEN {
        return Err(AssetStoreError::BasenameTooLong(basename.len()));
    }
    Ok(())
}

/// Validates an entire folder path: every segment must pass
/// `validate_segment`. The root path (`""`) is always valid.
pub fn validate_folder_path(path: &str) -> Result<(), AssetStoreError> {
    for segment in split_segments(path) {
        validate_segment(segment).map_err(|_| AssetStoreError::InvalidPath(path.to_string()))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_leading_and_trailing_slashes() {
        assert_eq!(normalize_folder_path("/images/hero/"), "images/hero");
        assert_eq!(normalize_folder_path("images/hero"), "images/hero");
        assert_eq!(normalize_folder_path("/"), "");
        assert_eq!(normalize_folder_path(""), "");
    }

    #[test]
    fn splits_root_into_no_segments() {
        assert_eq!(split_segments(""), Vec::<&str>::new());
        assert_eq!(split_segments("images/hero"), vec!["images", "hero"]);
    }

    #[test]
    fn joins_root_and_nested() {
        assert_eq!(join("", "images"), "images");
        assert_eq!(join("images", "hero"), "images/hero");
    }

    #[test]
    fn rejects_basename_with_slash() {
        assert!(validate_basename("a/b.png").is_err());
    }

    #[test]
    fn rejects_basename_with_nul() {
        assert!(validate_basename("a\0b.png").is_err());
    }

    #[test]
    fn rejects_empty_basename() {
        assert!(validate_basename("").is_err());
    }

    #[test]
    fn rejects_basename_too_long() {
        let long = "a".repeat(300);
        assert!(matches!(
            validate_basename(&long),
            Err(AssetStoreError::BasenameTooLong(_))
        ));
    }

    #[test]
    fn accepts_reasonable_basename() {
        assert!(validate_basename("a.png").is_ok());
    }
}
