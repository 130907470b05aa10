//! Workspace content detection for the automatic run trigger

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

/// Subdirectory of the workspace root that holds sanity content.
pub const CONTENT_DIR: &str = "sanity";

/// Extensions that mark a workspace as serving sanity content.
pub const CONTENT_EXTENSIONS: &[&str] = &["html", "md", "css"];

/// Best-effort lookup for sanity content under `root`, stopping after
/// `limit` matches. Unreadable directories and entries are skipped, so a
/// lookup failure reads as "no match found" and never errors the caller.
pub fn find_content_files(root: &Path, limit: usize) -> Vec<PathBuf> {
    let mut matches = Vec::new();
    if limit == 0 {
        return matches;
    }
    for entry in WalkDir::new(root.join(CONTENT_DIR))
        .into_iter()
        .filter_map(|e| e.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }
        let matched = entry
            .path()
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| CONTENT_EXTENSIONS.contains(&ext));
        if matched {
            matches.push(entry.into_path());
            if matches.len() >= limit {
                break;
            }
        }
    }
    matches
}
