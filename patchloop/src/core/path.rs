//! Normalization of repository-relative edit paths.

use std::path::{Component, Path};

/// Normalize a repository-relative edit path.
///
/// Returns the `/`-joined normal components with any `./` segments removed.
/// Returns `None` for paths that must not reach the filesystem: empty paths,
/// absolute paths, and paths containing `..` segments.
pub fn normalize_edit_path(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    let mut parts = Vec::new();
    for component in Path::new(trimmed).components() {
        match component {
            Component::Normal(name) => parts.push(name.to_str()?),
            Component::CurDir => {}
            Component::RootDir | Component::Prefix(_) | Component::ParentDir => return None,
        }
    }

    if parts.is_empty() {
        return None;
    }
    Some(parts.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_relative_paths() {
        assert_eq!(
            normalize_edit_path("src/main.rs"),
            Some("src/main.rs".to_string())
        );
        assert_eq!(normalize_edit_path("README.md"), Some("README.md".to_string()));
    }

    #[test]
    fn strips_leading_current_dir() {
        assert_eq!(
            normalize_edit_path("./src/lib.rs"),
            Some("src/lib.rs".to_string())
        );
    }

    #[test]
    fn trims_surrounding_whitespace() {
        assert_eq!(normalize_edit_path("  a.txt "), Some("a.txt".to_string()));
    }

    #[test]
    fn rejects_absolute_paths() {
        assert_eq!(normalize_edit_path("/etc/passwd"), None);
    }

    #[test]
    fn rejects_parent_escapes() {
        assert_eq!(normalize_edit_path("../secrets.txt"), None);
        assert_eq!(normalize_edit_path("a/../../b"), None);
        assert_eq!(normalize_edit_path("a/.."), None);
    }

    #[test]
    fn rejects_empty_paths() {
        assert_eq!(normalize_edit_path(""), None);
        assert_eq!(normalize_edit_path("   "), None);
        assert_eq!(normalize_edit_path("./"), None);
    }
}
