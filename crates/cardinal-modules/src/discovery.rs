//! Module discovery
//!
//! A module is an immediate subdirectory of the modules root that contains
//! the source's entry marker file.

use std::path::Path;
use std::time::SystemTime;

use tracing::warn;
use walkdir::WalkDir;

use crate::error::{ModuleHostError, ModuleHostResult};
use crate::watcher::WatchConfig;

/// List module names under `root`, in directory-listing order.
///
/// Read-only. Each qualifying directory appears exactly once.
pub fn discover(root: &Path, entry_marker: &str) -> ModuleHostResult<Vec<String>> {
    let entries = std::fs::read_dir(root).map_err(|source| ModuleHostError::Discovery {
        root: root.to_path_buf(),
        source,
    })?;

    let mut names = Vec::new();
    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(root = %root.display(), error = %e, "Skipping unreadable directory entry");
                continue;
            }
        };

        let path = entry.path();
        if !path.is_dir() || !path.join(entry_marker).is_file() {
            continue;
        }

        match entry.file_name().into_string() {
            Ok(name) => names.push(name),
            Err(raw) => warn!(name = ?raw, "Skipping module directory with non UTF-8 name"),
        }
    }

    Ok(names)
}

/// Names that join onto the root as exactly one immediate child directory.
pub fn is_valid_module_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\', '\0'])
}

/// Newest modification time among the watched source files under `dir`.
///
/// Returns `None` when the directory holds no watched files.
pub fn newest_source_mtime(dir: &Path, config: &WatchConfig) -> Option<SystemTime> {
    WalkDir::new(dir)
        .follow_links(true)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file() && config.should_watch(e.path()))
        .filter_map(|e| e.metadata().ok()?.modified().ok())
        .max()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::fs;
    use std::time::Duration;

    fn module_dir(root: &Path, name: &str, marker: bool) {
        let dir = root.join(name);
        fs::create_dir_all(&dir).unwrap();
        if marker {
            fs::write(dir.join("module.rhai"), "").unwrap();
        }
    }

    #[test]
    fn discovers_marked_directories_once() {
        let tmp = tempfile::tempdir().unwrap();
        module_dir(tmp.path(), "billing", true);
        module_dir(tmp.path(), "reports", true);
        module_dir(tmp.path(), "scratch", false);
        fs::write(tmp.path().join("module.rhai"), "").unwrap();

        let names = discover(tmp.path(), "module.rhai").unwrap();
        let set: HashSet<_> = names.iter().cloned().collect();

        assert_eq!(names.len(), 2);
        assert_eq!(set, HashSet::from(["billing".to_string(), "reports".to_string()]));
    }

    #[test]
    fn any_directory_name_qualifies() {
        let tmp = tempfile::tempdir().unwrap();
        for name in ["billing v2", "facturación", ".ops", "reports"] {
            module_dir(tmp.path(), name, true);
        }

        let names = discover(tmp.path(), "module.rhai").unwrap();
        assert_eq!(names.len(), 4);
        for name in &names {
            assert!(is_valid_module_name(name), "{name}");
        }
    }

    #[test]
    fn missing_root_is_discovery_error() {
        let tmp = tempfile::tempdir().unwrap();
        let err = discover(&tmp.path().join("nope"), "module.rhai").unwrap_err();
        assert!(matches!(err, ModuleHostError::Discovery { .. }));
    }

    #[test]
    fn module_name_validation() {
        assert!(is_valid_module_name("example_module"));
        assert!(is_valid_module_name("billing-v2"));
        assert!(is_valid_module_name(".ops"));
        assert!(is_valid_module_name("billing v2"));
        assert!(!is_valid_module_name(""));
        assert!(!is_valid_module_name("."));
        assert!(!is_valid_module_name(".."));
        assert!(!is_valid_module_name("a/b"));
        assert!(!is_valid_module_name("a\\b"));
    }

    #[test]
    fn newest_mtime_ignores_unwatched_files() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("m");
        fs::create_dir_all(dir.join("nested")).unwrap();

        let base = SystemTime::now() - Duration::from_secs(600);
        let script = dir.join("module.rhai");
        let nested = dir.join("nested").join("helpers.rhai");
        let swap = dir.join("module.rhai.swp");
        let notes = dir.join("notes.txt");
        for p in [&script, &nested, &swap, &notes] {
            fs::write(p, "").unwrap();
        }

        let set = |p: &Path, t: SystemTime| {
            fs::File::options().write(true).open(p).unwrap().set_modified(t).unwrap();
        };
        set(&script, base);
        set(&nested, base + Duration::from_secs(10));
        set(&swap, base + Duration::from_secs(100));
        set(&notes, base + Duration::from_secs(100));

        let newest = newest_source_mtime(&dir, &WatchConfig::default()).unwrap();
        assert_eq!(newest, base + Duration::from_secs(10));
    }

    #[test]
    fn empty_directory_has_no_mtime() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(newest_source_mtime(tmp.path(), &WatchConfig::default()).is_none());
    }
}
