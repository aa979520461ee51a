//! Local file access for config records and the files operations upload.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::paths;

fn io_error(err: std::io::Error, action: &str, path: &Path) -> Error {
    Error::internal_io(err.to_string(), Some(format!("{} {}", action, path.display())))
}

pub fn read_file(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|e| io_error(e, "read", path))
}

/// Write through a sibling `.tmp` file and rename, so readers never see a partial record.
pub fn write_file(path: &Path, content: &str) -> Result<()> {
    let name = path
        .file_name()
        .ok_or_else(|| Error::internal_unexpected(format!("No file name in {}", path.display())))?;
    let staged = path.with_file_name(format!("{}.tmp", name.to_string_lossy()));

    fs::write(&staged, content).map_err(|e| io_error(e, "write", &staged))?;
    fs::rename(&staged, path).map_err(|e| io_error(e, "rename", &staged))
}

pub fn remove_file(path: &Path) -> Result<()> {
    fs::remove_file(path).map_err(|e| io_error(e, "delete", path))
}

/// `*.json` files directly inside `dir`, sorted. A missing directory has none.
pub fn json_files(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut files: Vec<PathBuf> = fs::read_dir(dir)
        .map_err(|e| io_error(e, "list", dir))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "json"))
        .collect();
    files.sort();
    Ok(files)
}

/// Create the config directory tree (`projects/`, `servers/`).
pub fn ensure_app_dirs() -> Result<()> {
    for dir in [paths::projects()?, paths::servers()?] {
        fs::create_dir_all(&dir).map_err(|e| io_error(e, "create", &dir))?;
    }
    Ok(())
}

/// Read a local file an operation depends on (templates, config snippets, cron files).
/// A missing file is a `resource.not_found` error rather than an IO failure.
pub fn read_resource(path: &Path) -> Result<String> {
    require_resource(path)?;
    read_file(path)
}

/// Require a local file to exist before it is uploaded.
pub fn require_resource(path: &Path) -> Result<()> {
    if !path.is_file() {
        return Err(Error::resource_not_found(path.display().to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn write_replaces_content_without_leaving_temp_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("shop.json");

        write_file(&path, "{\"serverId\": \"web1\"}").unwrap();
        write_file(&path, "{\"serverId\": \"web2\"}").unwrap();

        assert_eq!(read_file(&path).unwrap(), "{\"serverId\": \"web2\"}");
        assert!(!dir.path().join("shop.json.tmp").exists());
    }

    #[test]
    fn json_files_skips_other_entries() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("web1.json"), "{}").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "text").unwrap();
        std::fs::create_dir(dir.path().join("backup.json")).unwrap();

        let files = json_files(dir.path()).unwrap();
        assert_eq!(files, vec![dir.path().join("web1.json")]);
        assert!(json_files(&dir.path().join("absent")).unwrap().is_empty());
    }

    #[test]
    fn read_resource_reports_missing_file_as_not_found() {
        let dir = tempdir().unwrap();
        let err = read_resource(&dir.path().join("nginx.conf")).unwrap_err();
        assert_eq!(err.code, crate::ErrorCode::ResourceNotFound);
    }

    #[test]
    fn require_resource_accepts_existing_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("crontab");
        std::fs::write(&path, "* * * * * true\n").unwrap();
        assert!(require_resource(&path).is_ok());
    }
}
