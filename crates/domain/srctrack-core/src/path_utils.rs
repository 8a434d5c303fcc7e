pub struct TrackPath;

/// Directory names whose contents never reach the remote service.
pub const TEST_ONLY_DIRS: &[&str] = &["__tests__"];

impl TrackPath {
    /// Standardize directory separators to forward slashes.
    /// This is the form used for shadow index keys and resolver input.
    pub fn normalize(path: &str) -> String {
        let normalized = path.replace('\\', "/");
        match normalized.strip_prefix("./") {
            Some(stripped) => stripped.to_string(),
            None => normalized,
        }
    }

    pub fn basename(path: &str) -> &str {
        path.rsplit(['/', '\\']).next().unwrap_or(path)
    }

    /// Dotfiles, dot-directories and test-only directories are never tracked.
    pub fn is_excluded(rel_path: &str) -> bool {
        rel_path.split(['/', '\\']).any(|segment| {
            (segment.starts_with('.') && segment != "." && segment != "..")
                || TEST_ONLY_DIRS.contains(&segment)
        })
    }

    /// True when `rel_path` is one of `dirs` or lives below one of them.
    pub fn is_within(rel_path: &str, dirs: &[String]) -> bool {
        let rel_path = Self::normalize(rel_path);
        dirs.iter().any(|dir| {
            let dir = Self::normalize(dir);
            let dir = dir.trim_end_matches('/');
            dir.is_empty()
                || dir == "."
                || rel_path == dir
                || rel_path
                    .strip_prefix(dir)
                    .is_some_and(|rest| rest.starts_with('/'))
        })
    }

    /// Reject paths that would escape the project root.
    pub fn verify_safe(rel_path: &str) -> bool {
        let p = std::path::Path::new(rel_path);
        !p.is_absolute()
            && !rel_path.starts_with('/')
            && !p
                .components()
                .any(|c| matches!(c, std::path::Component::ParentDir))
    }
}
