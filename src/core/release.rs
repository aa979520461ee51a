//! Release upload, activation and cleanup for a project on its target host.
//!
//! Remote layout:
//!
//! ```text
//! <install_root>/<project>/releases/<release_id>/   unpacked archives
//! <install_root>/<project>/<project>                symlink to the live release
//! <install_root>/<project>/.deploy.lock/            held while an operation runs
//! ```

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use crate::context::DeployContext;
use crate::error::{Error, Result};
use crate::executor::{require_success, Executor, RemoteTempDir};
use crate::system::upstart;
use crate::utils::shell::ShellCommand;

static RELEASE_ID_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{8}-\d{6}-[0-9a-f]{8}$").unwrap());

const STAGING_PREFIX: &str = ".incoming-";

/// Source of release archives.
pub trait SourceRepository {
    /// Resolve a tag, branch or commit to a full commit id.
    fn resolve(&self, revision: &str) -> Result<String>;
    /// Write a gzipped tarball of the tree at `commit` to `destination`.
    fn archive(&self, commit: &str, destination: &Path) -> Result<()>;
}

/// `<YYYYMMDD>-<HHMMSS>-<first 8 hex chars of the commit>`, UTC.
///
/// String order is creation order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct ReleaseId(String);

impl ReleaseId {
    pub fn new(created_at: DateTime<Utc>, commit: &str) -> Result<Self> {
        let commit = commit.trim().to_ascii_lowercase();
        if commit.len() < 8 || !commit.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(Error::validation_invalid_argument(
                "commit",
                format!("'{}' is not a commit id", commit),
                None,
                None,
            ));
        }

        Ok(Self(format!(
            "{}-{}",
            created_at.format("%Y%m%d-%H%M%S"),
            &commit[..8]
        )))
    }

    pub fn parse(value: &str) -> Result<Self> {
        if RELEASE_ID_PATTERN.is_match(value) {
            Ok(Self(value.to_string()))
        } else {
            Err(Error::release_invalid_id(value))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn short_commit(&self) -> &str {
        &self.0[self.0.len() - 8..]
    }
}

impl fmt::Display for ReleaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Deploy lock
// ============================================================================

/// `mkdir`-based mutual exclusion on the project directory, released on drop.
pub struct DeployLock<'a> {
    exec: &'a dyn Executor,
    path: String,
    sudo: bool,
}

impl<'a> DeployLock<'a> {
    /// Acquire the lock when `deploy.lock` is enabled; `None` when locking is off.
    ///
    /// A failed `mkdir` with the directory in place means someone else holds it.
    pub fn acquire(ctx: &DeployContext<'a>) -> Result<Option<Self>> {
        if !ctx.settings.deploy.lock {
            return Ok(None);
        }

        let path = ctx.lock_dir();
        let sudo = ctx.use_sudo();
        let mkdir = ShellCommand::new("mkdir").elevated(sudo).arg(&path);
        let output = ctx.exec.run_unchecked(&mkdir)?;

        if !output.success {
            if ctx
                .exec
                .succeeds(&ShellCommand::new("test").args(["-d", &path]))?
            {
                return Err(Error::deploy_locked(ctx.name(), path));
            }
            require_success(&ctx.exec.target(), &mkdir.render()?, output)?;
        }

        Ok(Some(Self {
            exec: ctx.exec,
            path,
            sudo,
        }))
    }
}

/// Remove a lock left behind by an interrupted run. Returns whether there was one.
pub fn unlock(ctx: &DeployContext<'_>) -> Result<bool> {
    let path = ctx.lock_dir();
    if !ctx
        .exec
        .succeeds(&ShellCommand::new("test").args(["-d", &path]))?
    {
        return Ok(false);
    }

    log_status!("release", "Removing lock {}", path);
    ctx.exec
        .run(&ShellCommand::new("rmdir").elevated(ctx.use_sudo()).arg(&path))?;
    Ok(true)
}

impl Drop for DeployLock<'_> {
    fn drop(&mut self) {
        let command = ShellCommand::new("rmdir").elevated(self.sudo).arg(&self.path);
        let _ = self.exec.run_unchecked(&command);
    }
}

/// Partially extracted release, removed unless promoted.
struct StagingDir<'a> {
    exec: &'a dyn Executor,
    path: String,
    sudo: bool,
    promoted: bool,
}

impl Drop for StagingDir<'_> {
    fn drop(&mut self) {
        if self.promoted {
            return;
        }
        let command = ShellCommand::new("rm")
            .elevated(self.sudo)
            .args(["-rf", &self.path]);
        let _ = self.exec.run_unchecked(&command);
    }
}

// ============================================================================
// Operations
// ============================================================================

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadOutcome {
    pub release_id: ReleaseId,
    pub revision: String,
    pub commit: String,
    pub path: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivateOutcome {
    pub release_id: ReleaseId,
    pub previous: Option<ReleaseId>,
    pub link: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupOutcome {
    pub keep: usize,
    pub active: Option<ReleaseId>,
    pub kept: Vec<ReleaseId>,
    pub removed: Vec<ReleaseId>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseListing {
    pub project: String,
    pub active: Option<ReleaseId>,
    pub releases: Vec<ReleaseId>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployOutcome {
    pub upload: UploadOutcome,
    pub activate: ActivateOutcome,
    pub cleanup: CleanupOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub restarted: Option<String>,
}

/// `mkdir -p releases virtualenv` under the project directory.
pub fn create_project_structure(ctx: &DeployContext<'_>) -> Result<Vec<String>> {
    let dirs = vec![
        ctx.releases_dir(),
        format!("{}/virtualenv", ctx.project_dir()),
    ];

    log_status!("release", "Setting up project structure at {}", ctx.project_dir());
    ctx.exec.run(
        &ShellCommand::new("mkdir")
            .elevated(ctx.use_sudo())
            .arg("-p")
            .args(&dirs),
    )?;

    Ok(dirs)
}

/// Archive `revision` (default branch when `None`), upload it and unpack it into a new
/// release directory. Does not change the live symlink.
pub fn upload(
    ctx: &DeployContext<'_>,
    repo: &dyn SourceRepository,
    revision: Option<&str>,
) -> Result<UploadOutcome> {
    upload_at(ctx, repo, revision, Utc::now())
}

pub fn upload_at(
    ctx: &DeployContext<'_>,
    repo: &dyn SourceRepository,
    revision: Option<&str>,
    now: DateTime<Utc>,
) -> Result<UploadOutcome> {
    let archive = LocalArchive::build(ctx, repo, revision, now)?;
    let _lock = DeployLock::acquire(ctx)?;
    push_release(ctx, archive)
}

/// Tarball of one revision in a local scratch directory.
struct LocalArchive {
    revision: String,
    commit: String,
    release_id: ReleaseId,
    path: PathBuf,
    _dir: tempfile::TempDir,
}

impl LocalArchive {
    fn build(
        ctx: &DeployContext<'_>,
        repo: &dyn SourceRepository,
        revision: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        let revision = revision
            .filter(|r| !r.trim().is_empty())
            .unwrap_or(&ctx.settings.deploy.default_revision)
            .to_string();

        let commit = repo.resolve(&revision)?;
        let release_id = ReleaseId::new(now, &commit)?;

        let dir = tempfile::tempdir().map_err(|e| {
            Error::internal_io(e.to_string(), Some("create local archive directory".to_string()))
        })?;
        let path = dir.path().join(format!("{}.tar.gz", release_id));

        log_status!("release", "Archiving {} ({})", revision, release_id.short_commit());
        repo.archive(&commit, &path)?;

        Ok(Self {
            revision,
            commit,
            release_id,
            path,
            _dir: dir,
        })
    }
}

/// Caller holds the deploy lock.
fn push_release(ctx: &DeployContext<'_>, archive: LocalArchive) -> Result<UploadOutcome> {
    let LocalArchive {
        revision,
        commit,
        release_id,
        path: archive_path,
        _dir,
    } = archive;
    let final_dir = ctx.release_dir(release_id.as_str());
    let sudo = ctx.use_sudo();

    if ctx
        .exec
        .succeeds(&ShellCommand::new("test").args(["-e", &final_dir]))?
    {
        return Err(Error::validation_invalid_argument(
            "release",
            format!("Release {} already exists on {}", release_id, ctx.exec.target()),
            Some(release_id.to_string()),
            None,
        ));
    }

    let remote_tmp = RemoteTempDir::create(ctx.exec)?;
    let remote_archive = remote_tmp.join("release.tar.gz");

    log_status!("release", "Uploading {} to {}", release_id, ctx.exec.target());
    ctx.exec.upload(&archive_path, &remote_archive, false)?;

    let mut staging = StagingDir {
        exec: ctx.exec,
        path: format!("{}/{}{}", ctx.releases_dir(), STAGING_PREFIX, release_id),
        sudo,
        promoted: false,
    };

    ctx.exec.run(
        &ShellCommand::new("mkdir")
            .elevated(sudo)
            .args(["-p", &staging.path]),
    )?;
    ctx.exec.run(
        &ShellCommand::new("tar")
            .elevated(sudo)
            .args(["-xzf", &remote_archive, "-C", &staging.path]),
    )?;

    if let Some(owner) = ctx.project.owner.as_deref() {
        ctx.exec.run(
            &ShellCommand::new("chown")
                .elevated(sudo)
                .args(["-R", owner, &staging.path]),
        )?;
    }
    ctx.exec.run(
        &ShellCommand::new("chmod")
            .elevated(sudo)
            .args(["-R", &ctx.settings.deploy.permissions, &staging.path]),
    )?;

    // Same filesystem, so the release appears at its final path in one rename.
    ctx.exec.run(
        &ShellCommand::new("mv")
            .elevated(sudo)
            .args(["-T", &staging.path, &final_dir]),
    )?;
    staging.promoted = true;

    log_status!("release", "Release {} uploaded", release_id);

    Ok(UploadOutcome {
        release_id,
        revision,
        commit,
        path: final_dir,
    })
}

/// Point the live symlink at an uploaded release. Activating the live release again
/// is a no-op in effect.
pub fn activate(ctx: &DeployContext<'_>, release_id: &str) -> Result<ActivateOutcome> {
    let release_id = ReleaseId::parse(release_id)?;
    let _lock = DeployLock::acquire(ctx)?;
    link_release(ctx, release_id)
}

/// Caller holds the deploy lock.
fn link_release(ctx: &DeployContext<'_>, release_id: ReleaseId) -> Result<ActivateOutcome> {
    let release_dir = ctx.release_dir(release_id.as_str());
    if !ctx
        .exec
        .succeeds(&ShellCommand::new("test").args(["-d", &release_dir]))?
    {
        let available = list_ids(ctx)?
            .into_iter()
            .map(|id| id.to_string())
            .collect();
        return Err(Error::release_not_found(release_id.to_string(), available));
    }

    let previous = current(ctx)?;

    log_status!("release", "Activating {} for {}", release_id, ctx.name());
    ctx.exec.run(
        &ShellCommand::new("ln")
            .elevated(ctx.use_sudo())
            .args([
                "-nsf",
                &format!("releases/{}", release_id),
                ctx.name(),
            ])
            .in_dir(&ctx.project_dir()),
    )?;

    Ok(ActivateOutcome {
        release_id,
        previous,
        link: ctx.live_link(),
    })
}

/// Release the live symlink points at, if any.
pub fn current(ctx: &DeployContext<'_>) -> Result<Option<ReleaseId>> {
    let output = ctx
        .exec
        .run_unchecked(&ShellCommand::new("readlink").arg(ctx.live_link()))?;

    if !output.success {
        return Ok(None);
    }

    let target = output.stdout_trimmed().trim_end_matches('/');
    let name = target.rsplit('/').next().unwrap_or(target);
    Ok(ReleaseId::parse(name).ok())
}

/// Uploaded releases, oldest first. Staging directories and foreign entries are ignored.
pub fn list_ids(ctx: &DeployContext<'_>) -> Result<Vec<ReleaseId>> {
    let releases_dir = ctx.releases_dir();
    if !ctx
        .exec
        .succeeds(&ShellCommand::new("test").args(["-d", &releases_dir]))?
    {
        return Ok(Vec::new());
    }

    let output = ctx
        .exec
        .run(&ShellCommand::new("ls").args(["-1", &releases_dir]))?;

    let mut ids: Vec<ReleaseId> = output
        .lines()
        .iter()
        .filter_map(|name| ReleaseId::parse(name).ok())
        .collect();
    ids.sort();
    Ok(ids)
}

pub fn list(ctx: &DeployContext<'_>) -> Result<ReleaseListing> {
    Ok(ReleaseListing {
        project: ctx.name().to_string(),
        releases: list_ids(ctx)?,
        active: current(ctx)?,
    })
}

/// Releases to delete: everything outside the `keep` newest, never the live one.
pub fn plan_cleanup(
    releases: &[ReleaseId],
    keep: usize,
    active: Option<&ReleaseId>,
) -> Vec<ReleaseId> {
    let mut sorted = releases.to_vec();
    sorted.sort();
    sorted.dedup();

    let excess = sorted.len().saturating_sub(keep);
    sorted
        .into_iter()
        .take(excess)
        .filter(|id| Some(id) != active)
        .collect()
}

/// Remove old releases, keeping `keep` (default `deploy.keep_releases`) plus the live one.
pub fn cleanup(ctx: &DeployContext<'_>, keep: Option<usize>) -> Result<CleanupOutcome> {
    let keep = keep.unwrap_or_else(|| ctx.keep_releases());
    let _lock = DeployLock::acquire(ctx)?;
    prune_releases(ctx, keep)
}

/// Caller holds the deploy lock.
fn prune_releases(ctx: &DeployContext<'_>, keep: usize) -> Result<CleanupOutcome> {
    let releases = list_ids(ctx)?;
    let active = current(ctx)?;
    let removed = plan_cleanup(&releases, keep, active.as_ref());

    for id in &removed {
        log_status!("release", "Removing release {}", id);
        ctx.exec.run(
            &ShellCommand::new("rm")
                .elevated(ctx.use_sudo())
                .args(["-rf", &ctx.release_dir(id.as_str())]),
        )?;
    }

    let kept = releases
        .into_iter()
        .filter(|id| !removed.contains(id))
        .collect();

    Ok(CleanupOutcome {
        keep,
        active,
        kept,
        removed,
    })
}

/// Upload, activate, prune, and restart the project's service when one is configured.
/// The deploy lock is held from the upload until the restart is done.
pub fn deploy(
    ctx: &DeployContext<'_>,
    repo: &dyn SourceRepository,
    revision: Option<&str>,
) -> Result<DeployOutcome> {
    deploy_at(ctx, repo, revision, Utc::now())
}

pub fn deploy_at(
    ctx: &DeployContext<'_>,
    repo: &dyn SourceRepository,
    revision: Option<&str>,
    now: DateTime<Utc>,
) -> Result<DeployOutcome> {
    let archive = LocalArchive::build(ctx, repo, revision, now)?;
    let _lock = DeployLock::acquire(ctx)?;

    let upload = push_release(ctx, archive)?;
    let activate = link_release(ctx, upload.release_id.clone())?;
    let cleanup = prune_releases(ctx, ctx.keep_releases())?;

    let restarted = match ctx.project.service.as_deref() {
        Some(service) if !service.is_empty() => {
            upstart::restart(ctx.exec, service, true, &[])?;
            Some(service.to_string())
        }
        _ => None,
    };

    Ok(DeployOutcome {
        upload,
        activate,
        cleanup,
        restarted,
    })
}
