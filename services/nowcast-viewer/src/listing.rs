//! Directory listing of runs and images under the artifact directory.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;
use walkdir::WalkDir;

const IMAGE_EXTENSIONS: &[&str] = &["png", "gif", "jpg", "jpeg", "webp"];

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct RunEntry {
    pub name: String,
    pub modified: Option<DateTime<Utc>>,
    pub files: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Default, PartialEq, Eq)]
pub struct ArtifactListing {
    /// Run directories, newest first.
    pub runs: Vec<RunEntry>,
    /// Images at the top level, newest first.
    pub images: Vec<String>,
}

/// Hidden entries are staging directories or the lock file.
pub fn is_safe_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('.')
        && !name.contains(|c| c == '/' || c == '\\' || c == '\0')
}

pub fn is_image(name: &str) -> bool {
    has_extension(name, IMAGE_EXTENSIONS)
}

pub fn has_extension(name: &str, extensions: &[&str]) -> bool {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| extensions.iter().any(|x| e.eq_ignore_ascii_case(x)))
        .unwrap_or(false)
}

/// List `dir`. A missing directory lists as empty.
pub fn list_artifacts(dir: &Path, lock_file: &str) -> ArtifactListing {
    let mut runs: Vec<RunEntry> = Vec::new();
    let mut images: Vec<(Option<DateTime<Utc>>, String)> = Vec::new();

    let walker = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok);

    for entry in walker {
        let name = entry.file_name().to_string_lossy().into_owned();
        if !is_safe_name(&name) || name == lock_file {
            continue;
        }
        let modified = entry
            .metadata()
            .ok()
            .and_then(|m| m.modified().ok())
            .map(DateTime::<Utc>::from);

        if entry.file_type().is_dir() {
            let mut files: Vec<String> = WalkDir::new(entry.path())
                .min_depth(1)
                .max_depth(1)
                .into_iter()
                .filter_map(Result::ok)
                .filter(|e| e.file_type().is_file())
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .filter(|n| is_safe_name(n))
                .collect();
            files.sort();
            runs.push(RunEntry {
                name,
                modified,
                files,
            });
        } else if is_image(&name) {
            images.push((modified, name));
        }
    }

    // Run labels are %Y-%m-%d_%Hh%M, so name order is time order
    runs.sort_by(|a, b| b.name.cmp(&a.name));
    images.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));

    ArtifactListing {
        runs,
        images: images.into_iter().map(|(_, name)| name).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_safe_names() {
        assert!(is_safe_name("2024-01-15_12h05"));
        assert!(is_safe_name("last_forecast.png"));
        assert!(!is_safe_name(""));
        assert!(!is_safe_name(".."));
        assert!(!is_safe_name(".2024-01-15_12h05.partial-abc"));
        assert!(!is_safe_name("../etc"));
        assert!(!is_safe_name("a\\b"));
    }

    #[test]
    fn test_listing_skips_hidden_and_lock() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir(root.join("2024-01-15_12h00")).unwrap();
        fs::write(root.join("2024-01-15_12h00/forecast.npy"), b"x").unwrap();
        fs::create_dir(root.join("2024-01-15_12h05")).unwrap();
        fs::write(root.join("2024-01-15_12h05/manifest.json"), b"{}").unwrap();
        fs::write(root.join("2024-01-15_12h05/forecast.npy"), b"x").unwrap();
        fs::create_dir(root.join(".2024-01-15_12h10.partial-1")).unwrap();
        fs::write(root.join("lock_file.txt"), b"1").unwrap();
        fs::write(root.join("last_forecast.gif"), b"GIF89a").unwrap();
        fs::write(root.join("last_forecast.npy"), b"x").unwrap();

        let listing = list_artifacts(root, "lock_file.txt");
        let names: Vec<&str> = listing.runs.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["2024-01-15_12h05", "2024-01-15_12h00"]);
        assert_eq!(listing.runs[0].files, vec!["forecast.npy", "manifest.json"]);
        assert_eq!(listing.images, vec!["last_forecast.gif"]);
    }

    #[test]
    fn test_missing_dir_lists_empty() {
        let listing = list_artifacts(Path::new("/nonexistent/nowcast/output"), "lock_file.txt");
        assert_eq!(listing, ArtifactListing::default());
    }
}
