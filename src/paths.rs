//! Lexical path normalization
//!
//! Mount-point arithmetic works on paths that may never touch the live
//! filesystem (unmounted devices, last-known mount points), so normalization
//! here is purely lexical: `.` components are dropped and `..` pops the
//! previous component without consulting symlinks.

use std::path::{Component, Path, PathBuf};

/// Normalize a path lexically: collapse `.`, resolve `..` against preceding
/// components, and de-duplicate separators.
///
/// Absolute paths never escape the root (`/..` stays `/`). Relative paths
/// keep leading `..` components that have nothing to pop.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(p) => out.push(p.as_os_str()),
            Component::RootDir => out.push(Component::RootDir.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                if matches!(out.components().next_back(), Some(Component::Normal(_))) {
                    out.pop();
                } else if !matches!(
                    out.components().next_back(),
                    Some(Component::RootDir) | Some(Component::Prefix(_))
                ) {
                    out.push(Component::ParentDir.as_os_str());
                }
            }
            Component::Normal(name) => out.push(name),
        }
    }
    if out.as_os_str().is_empty() {
        out.push(".");
    }
    out
}
