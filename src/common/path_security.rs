//! Path Security Utilities
//!
//! Profile and artifact names come straight out of the evidence volume and
//! end up as directory and file names under the output root. Everything
//! read from an image is treated as untrusted before it touches the host.

use std::path::{Component, Path};
use tracing::warn;

/// Error type for path security operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSecurityError {
    /// Name would escape its parent directory
    TraversalDetected(String),
    /// Name is empty once dangerous characters are removed
    InvalidComponent(String),
}

impl std::fmt::Display for PathSecurityError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PathSecurityError::TraversalDetected(name) =>
                write!(f, "Path traversal detected: {}", name),
            PathSecurityError::InvalidComponent(name) =>
                write!(f, "Invalid path component: {:?}", name),
        }
    }
}

impl std::error::Error for PathSecurityError {}

pub type PathSecurityResult<T> = Result<T, PathSecurityError>;

/// True if a single name from the evidence would act as a relative or absolute path
pub fn contains_traversal_pattern(name: &str) -> bool {
    if name.contains('\0') {
        return true;
    }
    if name == "." || name == ".." {
        return true;
    }
    if name.starts_with('/') || name.starts_with('\\') {
        return true;
    }
    let bytes = name.as_bytes();
    if bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' {
        return true;
    }
    name.split(['/', '\\']).any(|part| part == "..")
}

/// Sanitize a filename by removing dangerous characters.
///
/// Path separators become `_`; control characters and Windows reserved
/// characters are dropped; leading/trailing dots and spaces are trimmed.
pub fn sanitize_filename(filename: &str) -> String {
    let mut sanitized = String::with_capacity(filename.len());

    for c in filename.chars() {
        match c {
            '\0'..='\x1f' | '\x7f' => continue,
            '/' | '\\' => sanitized.push('_'),
            '<' | '>' | ':' | '"' | '|' | '?' | '*' => continue,
            _ => sanitized.push(c),
        }
    }

    sanitized.trim_matches(|c| c == '.' || c == ' ').to_string()
}

/// Turn an evidence-supplied name into one safe path component
///
/// Traversal attempts are rejected outright rather than rewritten, so a
/// hostile profile name never silently aliases a legitimate one.
pub fn safe_component(name: &str) -> PathSecurityResult<String> {
    if contains_traversal_pattern(name) {
        warn!(target: "security", name, "Path traversal pattern in evidence name");
        return Err(PathSecurityError::TraversalDetected(name.to_string()));
    }
    let sanitized = sanitize_filename(name);
    if sanitized.is_empty() {
        return Err(PathSecurityError::InvalidComponent(name.to_string()));
    }
    Ok(sanitized)
}

/// Validate a relative path for safe file operations
pub fn is_safe_path(path: &Path) -> bool {
    path.components().all(|component| match component {
        Component::Normal(s) => !s.to_string_lossy().contains('\0'),
        Component::CurDir => true,
        _ => false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contains_traversal_pattern() {
        assert!(contains_traversal_pattern(".."));
        assert!(contains_traversal_pattern("../secret.txt"));
        assert!(contains_traversal_pattern("..\\secret.txt"));
        assert!(contains_traversal_pattern("/etc/passwd"));
        assert!(contains_traversal_pattern("C:\\Windows"));
        assert!(contains_traversal_pattern("file\0.ost"));

        assert!(!contains_traversal_pattern("outlook.ost"));
        assert!(!contains_traversal_pattern("file..name.pst"));
        assert!(!contains_traversal_pattern("김철수"));
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("normal.ost"), "normal.ost");
        assert_eq!(sanitize_filename("path/to/file.pst"), "path_to_file.pst");
        assert_eq!(sanitize_filename("file<>:\"|?*.pst"), "file.pst");
        assert_eq!(sanitize_filename("...hidden..."), "hidden");
    }

    #[test]
    fn test_safe_component() {
        assert_eq!(safe_component("alice").unwrap(), "alice");
        assert_eq!(safe_component("a:b").unwrap(), "ab");
        assert!(matches!(safe_component(".."), Err(PathSecurityError::TraversalDetected(_))));
        assert!(matches!(safe_component("..."), Err(PathSecurityError::InvalidComponent(_))));
    }

    #[test]
    fn test_is_safe_path() {
        assert!(is_safe_path(Path::new("alice/outlook.ost")));
        assert!(!is_safe_path(Path::new("../secret.txt")));
        assert!(!is_safe_path(Path::new("/etc/passwd")));
    }
}
