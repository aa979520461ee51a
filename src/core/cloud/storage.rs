use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

/// Object metadata key holding the SHA-256 of the uploaded content.
pub const CHECKSUM_METADATA_KEY: &str = "deckhand-sha256";

pub trait ObjectStore {
    /// User metadata of an object, or `None` when the key does not exist.
    fn object_metadata(&self, bucket: &str, key: &str) -> Result<Option<HashMap<String, String>>>;

    fn put_object(
        &self,
        bucket: &str,
        key: &str,
        file: &Path,
        acl: &str,
        metadata: &[(String, String)],
    ) -> Result<()>;
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncOutcome {
    pub bucket: String,
    pub uploaded: Vec<String>,
    pub unchanged: Vec<String>,
}

/// Upload every file under `local_dir` whose content differs from the stored object.
///
/// Keys are the `/`-joined relative path, under `prefix` when given. Objects whose
/// checksum metadata matches the local file are left alone.
pub fn sync_dir_up(
    store: &dyn ObjectStore,
    bucket: &str,
    local_dir: &Path,
    prefix: Option<&str>,
    acl: &str,
) -> Result<SyncOutcome> {
    if !local_dir.is_dir() {
        return Err(Error::resource_not_found(local_dir.display().to_string()));
    }

    let mut outcome = SyncOutcome {
        bucket: bucket.to_string(),
        ..SyncOutcome::default()
    };

    for file in walk_files(local_dir)? {
        let relative = file.strip_prefix(local_dir).map_err(|e| {
            Error::internal_unexpected(format!("{} outside {}: {}", file.display(), local_dir.display(), e))
        })?;
        let key = object_key(relative, prefix);
        let checksum = file_sha256(&file)?;

        let stored = store.object_metadata(bucket, &key)?;
        let unchanged = stored
            .as_ref()
            .and_then(|m| m.get(CHECKSUM_METADATA_KEY))
            .is_some_and(|sum| *sum == checksum);

        if unchanged {
            outcome.unchanged.push(key);
            continue;
        }

        log_status!("s3", "Uploading {} to s3://{}/{}", file.display(), bucket, key);
        store.put_object(
            bucket,
            &key,
            &file,
            acl,
            &[(CHECKSUM_METADATA_KEY.to_string(), checksum)],
        )?;
        outcome.uploaded.push(key);
    }

    Ok(outcome)
}

fn object_key(relative: &Path, prefix: Option<&str>) -> String {
    let path = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().to_string())
        .collect::<Vec<_>>()
        .join("/");

    match prefix.map(|p| p.trim_matches('/')).filter(|p| !p.is_empty()) {
        Some(prefix) => format!("{}/{}", prefix, path),
        None => path,
    }
}

pub fn file_sha256(path: &Path) -> Result<String> {
    let mut file = fs::File::open(path)
        .map_err(|e| Error::internal_io(e.to_string(), Some(format!("open {}", path.display()))))?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)
        .map_err(|e| Error::internal_io(e.to_string(), Some(format!("read {}", path.display()))))?;
    Ok(format!("{:x}", hasher.finalize()))
}

/// Regular files below `dir`, depth-first in name order. Symlinked directories are
/// not entered; symlinks to files are included.
fn walk_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut entries: Vec<(PathBuf, fs::FileType)> = fs::read_dir(dir)
        .map_err(|e| Error::internal_io(e.to_string(), Some(format!("list {}", dir.display()))))?
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| entry.file_type().ok().map(|kind| (entry.path(), kind)))
        .collect();
    entries.sort_by(|a, b| a.0.cmp(&b.0));

    let mut files = Vec::new();
    for (path, kind) in entries {
        if kind.is_dir() {
            files.extend(walk_files(&path)?);
        } else if kind.is_file() || (kind.is_symlink() && path.is_file()) {
            files.push(path);
        }
    }
    Ok(files)
}
