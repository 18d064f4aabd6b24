//! Script files on disk: enumeration, reading and bulk preloading into a
//! [`VmHost`].

use anyhow::{Context, Result};
use log::{info, warn};
use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::scripts::VmHost;

pub const SCRIPT_EXTENSION: &str = "lua";

/// Reads a whole file. The scripting core only ever needs this and
/// [`list_files`] from the package layer.
pub fn open_file(path: impl AsRef<Path>) -> io::Result<Vec<u8>> {
    fs::read(path)
}

/// Absolute, symlink-free form of `path`, used wherever two spellings of one
/// script must compare equal. Paths that do not exist yet keep their file
/// name under the canonical parent.
pub fn normalize_path(path: impl AsRef<Path>) -> PathBuf {
    let path = path.as_ref();
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else if let Ok(cwd) = env::current_dir() {
        cwd.join(path)
    } else {
        path.to_path_buf()
    };
    match fs::canonicalize(&absolute) {
        Ok(canonical) => canonical,
        Err(_) => match (absolute.parent().map(fs::canonicalize), absolute.file_name()) {
            (Some(Ok(parent)), Some(name)) => parent.join(name),
            _ => absolute,
        },
    }
}

/// Files directly under `root` whose extension matches `extension`
/// (case-insensitive), sorted by path. Subdirectories are not descended.
pub fn list_files(root: impl AsRef<Path>, extension: &str) -> Result<Vec<PathBuf>> {
    let root = root.as_ref();
    let mut files = Vec::new();
    for entry in fs::read_dir(root).with_context(|| format!("Scanning scripts under {}", root.display()))? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let path = entry.path();
        let matches = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case(extension));
        if matches {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PreloadReport {
    pub loaded: Vec<PathBuf>,
    pub failed: Vec<(PathBuf, String)>,
}

impl PreloadReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// A directory of script files.
#[derive(Debug, Clone)]
pub struct ScriptPackage {
    root: PathBuf,
}

impl ScriptPackage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn scripts(&self) -> Result<Vec<PathBuf>> {
        list_files(&self.root, SCRIPT_EXTENSION)
    }

    /// Compiles every script in the package so later lookups hit the class
    /// cache. A broken script is recorded and does not stop the others.
    pub fn preload(&self, host: &mut VmHost) -> Result<PreloadReport> {
        let mut report = PreloadReport::default();
        for path in self.scripts()? {
            match host.load_or_get_class(&path) {
                Ok(class) => {
                    info!("[package] preloaded {} ({} functions)", path.display(), class.function_count());
                    report.loaded.push(path);
                }
                Err(err) => {
                    warn!("[package] failed to preload {}: {err}", path.display());
                    report.failed.push((path, err.to_string()));
                }
            }
        }
        info!(
            "[package] {}: {} scripts loaded, {} failed",
            self.root.display(),
            report.loaded.len(),
            report.failed.len()
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_files_filters_by_extension_and_sorts() {
        let dir = tempfile::tempdir().expect("temp dir");
        for name in ["b.lua", "a.LUA", "notes.txt", "c.lua.bak"] {
            fs::write(dir.path().join(name), "x = 1").expect("write");
        }
        fs::create_dir(dir.path().join("nested.lua")).expect("mkdir");
        fs::write(dir.path().join("nested.lua").join("deep.lua"), "").expect("write nested");

        let files = list_files(dir.path(), SCRIPT_EXTENSION).expect("list");
        let names: Vec<_> =
            files.iter().filter_map(|path| path.file_name().and_then(|name| name.to_str())).collect();
        assert_eq!(names, vec!["a.LUA", "b.lua"]);
    }

    #[test]
    fn list_files_reports_missing_root() {
        let dir = tempfile::tempdir().expect("temp dir");
        let err = list_files(dir.path().join("absent"), SCRIPT_EXTENSION).unwrap_err();
        assert!(err.to_string().contains("Scanning scripts under"));
    }

    #[test]
    fn normalize_path_folds_spellings_of_one_file() {
        let dir = tempfile::tempdir().expect("temp dir");
        fs::write(dir.path().join("main.lua"), "").expect("write");
        let plain = normalize_path(dir.path().join("main.lua"));
        assert_eq!(plain, normalize_path(dir.path().join(".").join("main.lua")));
        assert_eq!(plain, normalize_path(dir.path().join("sub").join("..").join("main.lua")));
        assert!(plain.is_absolute());
        let missing = normalize_path(dir.path().join(".").join("later.lua"));
        assert_eq!(missing.file_name().and_then(|name| name.to_str()), Some("later.lua"));
        assert_eq!(missing.parent(), plain.parent());
    }

    #[test]
    fn open_file_reads_bytes() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("main.lua");
        fs::write(&path, b"function init() end").expect("write");
        assert_eq!(open_file(&path).expect("read"), b"function init() end");
        assert!(open_file(dir.path().join("missing.lua")).is_err());
    }
}
