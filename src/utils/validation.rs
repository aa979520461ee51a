//! Argument checks shared by the operations, each failing with
//! `validation.invalid_argument` before anything runs on a host.

use crate::error::{Error, Result};

/// Trimmed `value`, or an error when nothing is left.
pub fn require_non_empty<'a>(value: &'a str, field: &str, message: &str) -> Result<&'a str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(Error::validation_invalid_argument(field, message, None, None))
    } else {
        Ok(trimmed)
    }
}

pub fn require_non_empty_vec<'a, T>(vec: &'a [T], field: &str, message: &str) -> Result<&'a [T]> {
    if vec.is_empty() {
        Err(Error::validation_invalid_argument(field, message, None, None))
    } else {
        Ok(vec)
    }
}

/// An absolute remote path without `..` components, trailing slashes removed.
pub fn require_absolute_path<'a>(value: &'a str, field: &str) -> Result<&'a str> {
    let path = value.trim_end_matches('/');

    if !path.starts_with('/') || path.split('/').any(|part| part == "..") {
        return Err(Error::validation_invalid_argument(
            field,
            format!("'{}' must be an absolute path", value),
            Some(value.to_string()),
            None,
        ));
    }

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn require_non_empty_trims_whitespace() {
        assert_eq!(require_non_empty("  web1  ", "server", "msg").unwrap(), "web1");
    }

    #[test]
    fn require_non_empty_fails_for_whitespace_only() {
        assert!(require_non_empty("   ", "server", "Cannot be empty").is_err());
    }

    #[test]
    fn require_non_empty_vec_fails_for_empty() {
        let zones: Vec<String> = vec![];
        assert!(require_non_empty_vec(&zones, "zones", "Cannot be empty").is_err());
        assert_eq!(require_non_empty_vec(&[1, 2], "zones", "msg").unwrap(), &[1, 2]);
    }

    #[test]
    fn absolute_path_drops_trailing_slash() {
        assert_eq!(require_absolute_path("/data/db/", "datadir").unwrap(), "/data/db");
    }

    #[test]
    fn relative_and_parent_paths_are_rejected() {
        assert!(require_absolute_path("data/db", "datadir").is_err());
        assert!(require_absolute_path("/data/../etc", "datadir").is_err());
        assert!(require_absolute_path("/", "datadir").is_err());
    }
}
