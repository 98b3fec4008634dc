use std::path::PathBuf;

/// Expand a leading `~` (and `$VARS`) in a user supplied path.
///
/// Falls back to the input unchanged when expansion fails.
pub fn expand_home(path: &str) -> PathBuf {
    match shellexpand::full(path) {
        Ok(expanded) => PathBuf::from(expanded.as_ref()),
        Err(err) => {
            tracing::warn!(path = %path, error = %err, "failed to expand path");
            PathBuf::from(path)
        }
    }
}

/// Expand an optional config path; empty strings mean "not configured".
pub fn expand_optional(path: Option<&str>) -> Option<PathBuf> {
    path.map(str::trim)
        .filter(|p| !p.is_empty())
        .map(expand_home)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_optional_skips_empty() {
        assert_eq!(expand_optional(Some("  ")), None);
        assert_eq!(expand_optional(None), None);
        assert_eq!(
            expand_optional(Some("/tmp/x.toml")),
            Some(PathBuf::from("/tmp/x.toml"))
        );
    }

    #[test]
    fn test_expand_home_tilde() {
        let expanded = expand_home("~/pbench");
        assert!(!expanded.to_string_lossy().starts_with('~') || dirs::home_dir().is_none());
    }
}
