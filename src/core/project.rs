use crate::config::{self, ConfigEntity};
use crate::error::{Error, Result};
use crate::output::{CreateOutput, MergeOutput};
use crate::paths;
use crate::server;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A deployable application. The ID doubles as the remote directory and symlink name.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    #[serde(skip)]
    pub id: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_id: Option<String>,

    /// Overrides `deploy.install_root`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub install_root: Option<String>,

    /// Local git checkout releases are archived from
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_dir: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub python_version: Option<String>,

    /// Upstart job restarted after activation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,

    /// Remote owner applied to uploaded releases (`user` or `user:group`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub keep_releases: Option<usize>,
}

impl ConfigEntity for Project {
    const KIND: &'static str = "project";

    fn id(&self) -> &str {
        &self.id
    }
    fn set_id(&mut self, id: String) {
        self.id = id;
    }
    fn dir() -> Result<PathBuf> {
        paths::projects()
    }
    fn not_found(id: String, suggestions: Vec<String>) -> Error {
        Error::project_not_found(id, suggestions)
    }

    fn validate(&self) -> Result<()> {
        if let Some(ref sid) = self.server_id {
            if !server::exists(sid) {
                let suggestions = config::find_similar_ids::<server::Server>(sid);
                return Err(Error::server_not_found(sid.clone(), suggestions));
            }
        }
        if let Some(ref owner) = self.owner {
            if owner.trim().is_empty() || owner.contains(char::is_whitespace) {
                return Err(Error::config_invalid_value(
                    "project.owner",
                    Some(owner.clone()),
                    "Owner must be a single user or user:group",
                ));
            }
        }
        Ok(())
    }
}

pub fn load(id: &str) -> Result<Project> {
    config::load::<Project>(id)
}

pub fn list() -> Result<Vec<Project>> {
    config::list::<Project>()
}

pub fn save(project: &Project) -> Result<()> {
    config::save(project)
}

pub fn delete(id: &str) -> Result<()> {
    config::delete::<Project>(id)
}

pub fn exists(id: &str) -> bool {
    config::exists::<Project>(id)
}

/// Patch one project (object) or several (array of objects with `id`).
pub fn merge(id: Option<&str>, raw_json: &str) -> Result<MergeOutput> {
    config::merge::<Project>(id, raw_json)
}

pub fn create(raw_json: &str, skip_existing: bool) -> Result<CreateOutput<Project>> {
    config::create::<Project>(raw_json, skip_existing)
}

pub struct CreateFromFlags {
    pub id: String,
    pub server_id: Option<String>,
    pub install_root: Option<String>,
    pub source_dir: Option<String>,
    pub python_version: Option<String>,
    pub service: Option<String>,
    pub owner: Option<String>,
}

pub fn create_from_flags(flags: CreateFromFlags) -> Result<Project> {
    let source_dir = flags
        .source_dir
        .map(|dir| shellexpand::tilde(&dir).to_string());

    let project = Project {
        id: flags.id,
        server_id: flags.server_id,
        install_root: flags.install_root,
        source_dir,
        python_version: flags.python_version,
        service: flags.service,
        owner: flags.owner,
        keep_releases: None,
    };

    Ok(config::create_single(project)?.entity)
}

pub fn set_server(project_id: &str, server_id: &str) -> Result<Project> {
    let mut project = load(project_id)?;
    project.server_id = Some(server_id.to_string());
    project.validate()?;
    save(&project)?;
    Ok(project)
}
