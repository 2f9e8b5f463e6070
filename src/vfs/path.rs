//! Lexical path cleaning
//!
//! Callers hand us paths in whatever shape they like. Every component
//! cleans paths itself before using them as keys or joining them to a root.

use std::path::{Component, Path, PathBuf};

/// Clean a slash-separated path lexically.
///
/// Repeated slashes collapse, `.` elements are removed, and `name/..`
/// pairs cancel out. A `..` directly after the root is dropped. An empty
/// result becomes `.`.
pub fn clean(path: &str) -> String {
    let rooted = path.starts_with('/');
    let mut parts: Vec<&str> = Vec::new();

    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => match parts.last() {
                Some(&last) if last != ".." => {
                    parts.pop();
                }
                _ if rooted => {}
                _ => parts.push(".."),
            },
            name => parts.push(name),
        }
    }

    let joined = parts.join("/");
    match (rooted, joined.is_empty()) {
        (true, _) => format!("/{}", joined),
        (false, true) => ".".to_string(),
        (false, false) => joined,
    }
}

/// Clean a path as if it were rooted and return it without the leading slash.
///
/// The result never climbs above the root, and the root itself is `""`.
pub fn clean_rooted(path: &str) -> String {
    let cleaned = clean(&format!("/{}", path));
    cleaned.trim_start_matches('/').to_string()
}

/// Clean a filesystem path lexically without touching the disk.
///
/// `..` pops the previous normal component, is dropped at the root, and is
/// kept when it leads a relative path.
pub fn clean_path(path: &Path) -> PathBuf {
    let mut out: Vec<Component<'_>> = Vec::new();

    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.last() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => out.push(component),
            },
            other => out.push(other),
        }
    }

    if out.is_empty() {
        return PathBuf::from(".");
    }
    out.iter().collect()
}
