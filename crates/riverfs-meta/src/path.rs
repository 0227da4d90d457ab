//! Path normalization and ancestry helpers for diff paths.
//!
//! Paths are absolute with a leading `/` and no trailing `/` (except the
//! root itself). Internal separators are never collapsed; empty components
//! are permitted, but they never produce ancestor prefixes of their own.

/// Normalizes a path: leading `/` added if missing, trailing `/` stripped
/// unless the path is exactly `/`.
pub fn clean_path(path: &str) -> String {
    let mut p = if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    };
    while p.len() > 1 && p.ends_with('/') {
        p.pop();
    }
    p
}

/// Strict ancestor prefixes of a normalized path, root first.
///
/// `prefixes("/a/b/c")` is `["/", "/a", "/a/b"]`; the root has none.
pub fn prefixes(path: &str) -> Vec<String> {
    if path == "/" {
        return Vec::new();
    }
    let mut out = vec!["/".to_string()];
    let parts: Vec<&str> = path.split('/').filter(|p| !p.is_empty()).collect();
    let mut prefix = String::new();
    for part in parts.iter().take(parts.len().saturating_sub(1)) {
        prefix.push('/');
        prefix.push_str(part);
        out.push(prefix.clone());
    }
    out
}

/// The immediate parent directory of a normalized path; `None` for root.
pub fn parent_dir(path: &str) -> Option<String> {
    prefixes(path).pop()
}

/// The first path component of `path` below the directory `prefix`.
///
/// Used to group a recursive listing into direct children:
/// `first_component_under("/foo", "/foo/bar/buzz")` is `"bar"`.
pub fn first_component_under(prefix: &str, path: &str) -> Option<String> {
    let rel = if prefix == "/" {
        path.strip_prefix('/')?
    } else {
        path.strip_prefix(prefix)?.strip_prefix('/')?
    };
    let first = rel.split('/').next()?;
    if first.is_empty() {
        None
    } else {
        Some(first.to_string())
    }
}
