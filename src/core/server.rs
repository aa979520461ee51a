use crate::config::{self, ConfigEntity};
use crate::error::{Error, Result};
use crate::output::{CreateOutput, MergeOutput};
use crate::paths;
use crate::project;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// SSH connection details for a target host.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Server {
    #[serde(skip_deserializing, default)]
    pub id: String,
    pub host: String,
    pub user: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity_file: Option<String>,
}

fn default_port() -> u16 {
    22
}

impl Server {
    /// ID used when none is given: the host with anything outside
    /// `[A-Za-z0-9_-]` turned into `-`, e.g. `web1.example.com` -> `web1-example-com`.
    pub fn id_for_host(host: &str) -> String {
        host.trim()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '-' })
            .collect::<String>()
            .trim_matches('-')
            .to_string()
    }

    /// Connection fields that are blank.
    pub fn missing_fields(&self) -> Vec<String> {
        [("host", &self.host), ("user", &self.user)]
            .into_iter()
            .filter(|(_, value)| value.trim().is_empty())
            .map(|(field, _)| field.to_string())
            .collect()
    }

    /// `user@host` label used in logs and error details.
    pub fn target(&self) -> String {
        format!("{}@{}", self.user, self.host)
    }
}

impl ConfigEntity for Server {
    const KIND: &'static str = "server";

    fn id(&self) -> &str {
        &self.id
    }
    fn set_id(&mut self, id: String) {
        self.id = id;
    }
    fn dir() -> Result<PathBuf> {
        paths::servers()
    }
    fn not_found(id: String, suggestions: Vec<String>) -> Error {
        Error::server_not_found(id, suggestions)
    }
    fn validate(&self) -> Result<()> {
        let missing = self.missing_fields();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(Error::ssh_server_invalid(self.id.clone(), missing))
        }
    }
}

pub fn load(id: &str) -> Result<Server> {
    config::load::<Server>(id)
}

pub fn list() -> Result<Vec<Server>> {
    config::list::<Server>()
}

pub fn save(server: &Server) -> Result<()> {
    config::save(server)
}

pub fn exists(id: &str) -> bool {
    config::exists::<Server>(id)
}

pub fn find_by_host(host: &str) -> Option<Server> {
    list().ok()?.into_iter().find(|s| s.host == host)
}

pub fn merge(id: Option<&str>, raw_json: &str) -> Result<MergeOutput> {
    config::merge::<Server>(id, raw_json)
}

pub fn create(raw_json: &str, skip_existing: bool) -> Result<CreateOutput<Server>> {
    config::create::<Server>(raw_json, skip_existing)
}

#[derive(Debug, Clone)]
pub struct UpdateResult {
    pub id: String,
    pub server: Server,
    pub updated_fields: Vec<String>,
}

/// Typed field changes for `server update`. `None` leaves a field alone.
#[derive(Debug, Default)]
pub struct ServerChanges {
    pub host: Option<String>,
    pub user: Option<String>,
    pub port: Option<u16>,
    /// An empty string clears the key.
    pub identity_file: Option<String>,
}

/// Create a server from CLI flags. The ID defaults to one derived from the host.
pub fn create_from_flags(
    id: Option<String>,
    host: &str,
    user: &str,
    port: u16,
    identity_file: Option<String>,
) -> Result<Server> {
    let server = Server {
        id: id.unwrap_or_else(|| Server::id_for_host(host)),
        host: host.to_string(),
        user: user.to_string(),
        port,
        identity_file,
    };
    Ok(config::create_single(server)?.entity)
}

pub fn update(server_id: &str, changes: ServerChanges) -> Result<UpdateResult> {
    let mut server = load(server_id)?;
    let mut updated: Vec<&str> = Vec::new();

    if let Some(host) = changes.host {
        server.host = host;
        updated.push("host");
    }
    if let Some(user) = changes.user {
        server.user = user;
        updated.push("user");
    }
    if let Some(port) = changes.port {
        server.port = port;
        updated.push("port");
    }
    if let Some(key) = changes.identity_file {
        server.identity_file = Some(key).filter(|k| !k.is_empty());
        updated.push("identityFile");
    }

    server.validate()?;
    save(&server)?;

    Ok(UpdateResult {
        id: server_id.to_string(),
        server,
        updated_fields: updated.into_iter().map(String::from).collect(),
    })
}

/// Delete a server record. Refused while any project still deploys to it.
pub fn delete_safe(id: &str) -> Result<()> {
    let dependents: Vec<String> = project::list()?
        .into_iter()
        .filter(|p| p.server_id.as_deref() == Some(id))
        .map(|p| p.id)
        .collect();

    if let Some(first) = dependents.first() {
        return Err(Error::validation_invalid_argument(
            "server",
            format!("Server '{}' is still used by project '{}'", id, first),
            Some(id.to_string()),
            Some(dependents.clone()),
        )
        .with_hint(format!(
            "Point the project elsewhere first: deckhand project set-server {} <server>",
            first
        )));
    }

    config::delete::<Server>(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn port_defaults_to_22() {
        let server: Server =
            serde_json::from_str(r#"{"host": "web1.example.com", "user": "deploy"}"#).unwrap();
        assert_eq!(server.port, 22);
        assert!(server.identity_file.is_none());
        assert_eq!(server.target(), "deploy@web1.example.com");
    }

    #[test]
    fn id_for_host_replaces_dots_and_colons() {
        assert_eq!(Server::id_for_host("web1.example.com"), "web1-example-com");
        assert_eq!(Server::id_for_host(" [::1] "), "1");
    }

    #[test]
    fn validate_reports_missing_fields() {
        let server = Server {
            id: "web".to_string(),
            host: String::new(),
            user: "deploy".to_string(),
            port: 22,
            identity_file: None,
        };
        let err = server.validate().unwrap_err();
        assert_eq!(err.code, crate::ErrorCode::SshServerInvalid);
    }
}
