//! Naming rules for image references and build context files.

use crate::error::{Result, ValidationError};

/// File name the Dockerfile is written to inside a build context.
pub const DOCKERFILE_NAME: &str = "Dockerfile";

/// Tag used when the request does not name one.
pub const DEFAULT_TAG: &str = "latest";

/// Where a published image can be browsed, by default on Docker Hub.
pub const DEFAULT_REGISTRY_URL_TEMPLATE: &str = "https://hub.docker.com/r/{owner}/{repository}";

const MAX_TAG_LEN: usize = 128;

/// Validate an owner or repository component of `owner/repository:tag`.
pub fn validate_component(field: &'static str, value: &str) -> Result<()> {
    let invalid = |reason| ValidationError::InvalidName {
        field,
        value: value.to_string(),
        reason,
    };

    if value.is_empty() {
        return Err(ValidationError::MissingField(field));
    }

    let first = value.chars().next().unwrap_or_default();
    if !first.is_ascii_lowercase() && !first.is_ascii_digit() {
        return Err(invalid("must start with a lowercase letter or digit"));
    }

    if !value
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '.' | '_' | '-'))
    {
        return Err(invalid(
            "only lowercase letters, digits, '.', '_' and '-' are allowed",
        ));
    }

    Ok(())
}

/// Resolve and validate a tag, falling back to `latest` when empty.
///
/// Docker tags are at most 128 characters of ASCII alphanumerics, '.', '-'
/// and '_', and must not start with '.' or '-'.
pub fn resolve_tag(tag: Option<&str>) -> Result<String> {
    let tag = match tag.map(str::trim) {
        None | Some("") => return Ok(DEFAULT_TAG.to_string()),
        Some(tag) => tag,
    };

    let invalid = |reason: String| ValidationError::InvalidTag {
        tag: tag.to_string(),
        reason,
    };

    if tag.len() > MAX_TAG_LEN {
        return Err(invalid(format!(
            "too long ({} characters, max {})",
            tag.len(),
            MAX_TAG_LEN
        )));
    }

    if tag.starts_with('.') || tag.starts_with('-') {
        return Err(invalid("must not start with '.' or '-'".to_string()));
    }

    if let Some(c) = tag
        .chars()
        .find(|c| !c.is_ascii_alphanumeric() && !matches!(c, '.' | '-' | '_'))
    {
        return Err(invalid(format!("invalid character '{}'", c)));
    }

    Ok(tag.to_string())
}

/// Check that `name` is a flat file name that stays inside a build context.
///
/// Returns the reason on rejection so callers can wrap it in their own error.
pub fn check_file_name(name: &str) -> std::result::Result<(), &'static str> {
    if name.is_empty() {
        return Err("empty file name");
    }
    if name == "." || name == ".." || name.contains("..") {
        return Err("parent directory references are not allowed");
    }
    if name.contains('/') || name.contains('\\') {
        return Err("path separators are not allowed");
    }
    if name.contains('\0') {
        return Err("NUL bytes are not allowed");
    }
    Ok(())
}

/// True when `name` would land on the Dockerfile, including on
/// case-insensitive filesystems.
pub fn is_reserved_file_name(name: &str) -> bool {
    name.eq_ignore_ascii_case(DOCKERFILE_NAME)
}

/// Validate an auxiliary file name.
pub fn validate_file_name(name: &str) -> Result<()> {
    check_file_name(name).map_err(|reason| ValidationError::InvalidFileName {
        name: name.to_string(),
        reason,
    })?;

    if is_reserved_file_name(name) {
        return Err(ValidationError::ReservedFileName(name.to_string()));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_tag_defaults_to_latest() {
        assert_eq!(resolve_tag(None).unwrap(), "latest");
        assert_eq!(resolve_tag(Some("")).unwrap(), "latest");
        assert_eq!(resolve_tag(Some("  ")).unwrap(), "latest");
    }

    #[test]
    fn test_resolve_tag_accepts_common_tags() {
        assert_eq!(resolve_tag(Some("v1.2.3")).unwrap(), "v1.2.3");
        assert_eq!(resolve_tag(Some("main_2024-01")).unwrap(), "main_2024-01");
    }

    #[test]
    fn test_resolve_tag_rejects_bad_tags() {
        assert!(resolve_tag(Some("-dev")).is_err());
        assert!(resolve_tag(Some(".hidden")).is_err());
        assert!(resolve_tag(Some("has space")).is_err());
        assert!(resolve_tag(Some("a:b")).is_err());
        assert!(resolve_tag(Some(&"a".repeat(129))).is_err());
    }

    #[test]
    fn test_validate_component() {
        assert!(validate_component("user_name", "alice").is_ok());
        assert!(validate_component("repo", "my-app.v2").is_ok());
        assert_eq!(
            validate_component("repo", ""),
            Err(ValidationError::MissingField("repo"))
        );
        assert!(validate_component("repo", "Alice").is_err());
        assert!(validate_component("repo", "a/b").is_err());
        assert!(validate_component("repo", "-app").is_err());
    }

    #[test]
    fn test_file_name_traversal_rejected() {
        for name in ["../etc/passwd", "..", ".", "dir/file", "dir\\file", "a..b", ""] {
            assert!(
                matches!(
                    validate_file_name(name),
                    Err(ValidationError::InvalidFileName { .. })
                ),
                "{name} should be rejected"
            );
        }
        assert!(validate_file_name("requirements.txt").is_ok());
        assert!(validate_file_name(".dockerignore").is_ok());
    }

    #[test]
    fn test_dockerfile_collision_rejected() {
        assert_eq!(
            validate_file_name("Dockerfile"),
            Err(ValidationError::ReservedFileName("Dockerfile".to_string()))
        );
        assert!(matches!(
            validate_file_name("DOCKERFILE"),
            Err(ValidationError::ReservedFileName(_))
        ));
        assert!(validate_file_name("Dockerfile.dev").is_ok());
    }
}
