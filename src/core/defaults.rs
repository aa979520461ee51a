use serde::{Deserialize, Serialize};

use crate::config;
use crate::local_files;
use crate::paths;
use crate::provision::TargetOs;

/// Root structure of deckhand.json: settings keyed by subsystem, then by setting name.
///
/// Every field carries a serde default, so a user file only needs the keys it overrides:
/// `{"nginx": {"version": "1.4.1"}}` keeps every other built-in value.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    #[serde(default)]
    pub deploy: DeploySettings,
    #[serde(default)]
    pub nginx: NginxSettings,
    #[serde(default)]
    pub python: PythonSettings,
    #[serde(default)]
    pub mongodb: MongodbSettings,
    #[serde(default)]
    pub system: SystemSettings,
    #[serde(default)]
    pub cloud: CloudSettings,
}

/// Release layout and behavior on the target host
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeploySettings {
    pub install_root: String,
    pub keep_releases: usize,
    pub default_revision: String,
    pub use_sudo: bool,
    pub lock: bool,
    pub permissions: String,
}

impl Default for DeploySettings {
    fn default() -> Self {
        Self {
            install_root: "/data".to_string(),
            keep_releases: 5,
            default_revision: "master".to_string(),
            use_sudo: true,
            lock: true,
            permissions: "u+rwX,go+rX,go-w".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NginxSettings {
    pub version: String,
    pub install_dir: String,
    pub download_url: String,
    pub user: String,
    pub configure_flags: Vec<String>,
    pub build_packages: Vec<String>,
}

impl Default for NginxSettings {
    fn default() -> Self {
        Self {
            version: "1.2.6".to_string(),
            install_dir: "/opt".to_string(),
            download_url: "http://nginx.org/download/nginx-{{version}}.tar.gz".to_string(),
            user: "nginx".to_string(),
            configure_flags: vec!["--with-http_stub_status_module".to_string()],
            build_packages: vec![
                "libpcre3-dev".to_string(),
                "zlib1g-dev".to_string(),
                "build-essential".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PythonSettings {
    pub version: String,
    pub install_dir: String,
    pub download_url: String,
    pub setuptools_url: String,
    pub build_packages: Vec<String>,
}

impl Default for PythonSettings {
    fn default() -> Self {
        Self {
            version: "2.7.3".to_string(),
            install_dir: "/opt".to_string(),
            download_url: "http://www.python.org/ftp/python/{{version}}/Python-{{version}}.tgz"
                .to_string(),
            setuptools_url:
                "http://pypi.python.org/packages/source/s/setuptools/setuptools-0.6c11.tar.gz"
                    .to_string(),
            build_packages: vec![
                "build-essential".to_string(),
                "libcurl4-openssl-dev".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MongodbSettings {
    pub apt_key: String,
    pub repository_name: String,
    pub repository_distro: String,
    pub repository_url: String,
    pub packages: Vec<String>,
    pub config_file: String,
    pub default_dbpath: String,
    pub user: String,
    pub service: String,
}

impl Default for MongodbSettings {
    fn default() -> Self {
        Self {
            apt_key: "7F0CEB10".to_string(),
            repository_name: "10gen".to_string(),
            repository_distro: "dist".to_string(),
            repository_url: "http://downloads-distro.mongodb.org/repo/ubuntu-upstart".to_string(),
            packages: vec![
                "mongodb-10gen".to_string(),
                "ntp".to_string(),
                "lvm2".to_string(),
            ],
            config_file: "/etc/mongodb.conf".to_string(),
            default_dbpath: "/var/lib/mongodb".to_string(),
            user: "mongodb".to_string(),
            service: "mongodb".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemSettings {
    pub target_os: TargetOs,
    pub keyserver: String,
    pub reboot_delay_secs: u64,
}

impl Default for SystemSettings {
    fn default() -> Self {
        Self {
            target_os: TargetOs::Debian,
            keyserver: "keyserver.ubuntu.com".to_string(),
            reboot_delay_secs: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CloudSettings {
    pub aws_bin: String,
    pub region: Option<String>,
    pub profile: Option<String>,
    pub poll_interval_secs: u64,
    pub max_poll_attempts: u32,
    pub s3_acl: String,
    pub autoscale: AutoscaleSettings,
}

impl Default for CloudSettings {
    fn default() -> Self {
        Self {
            aws_bin: "aws".to_string(),
            region: None,
            profile: None,
            poll_interval_secs: 5,
            max_poll_attempts: 120,
            s3_acl: "public-read".to_string(),
            autoscale: AutoscaleSettings::default(),
        }
    }
}

/// Fixed parameters applied by `setup_autoscale` unless overridden
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoscaleSettings {
    pub instance_type: String,
    pub availability_zones: Vec<String>,
    pub min_instances: u32,
    pub max_instances: u32,
    pub scale_up_adjustment: i32,
    pub scale_up_cooldown: u32,
    pub scale_down_adjustment: i32,
    pub scale_down_cooldown: u32,
    pub instance_monitoring: bool,
}

impl Default for AutoscaleSettings {
    fn default() -> Self {
        Self {
            instance_type: "m1.small".to_string(),
            availability_zones: vec!["us-east-1b".to_string()],
            min_instances: 1,
            max_instances: 12,
            scale_up_adjustment: 1,
            scale_up_cooldown: 180,
            scale_down_adjustment: -1,
            scale_down_cooldown: 180,
            instance_monitoring: true,
        }
    }
}

// deckhand.json

/// Settings from deckhand.json, or the built-in defaults when the file is absent.
/// A file that does not parse is an error, not a silent fallback.
pub fn load_settings() -> crate::Result<Settings> {
    let path = paths::deckhand_json()?;
    if !path.is_file() {
        return Ok(Settings::default());
    }

    parse_settings(&local_files::read_file(&path)?)
        .map_err(|e| e.with_hint(format!("Fix or remove {}", path.display())))
}

pub fn parse_settings(content: &str) -> crate::Result<Settings> {
    config::parse_json(content, "parse deckhand.json")
}

pub fn save_settings(settings: &Settings) -> crate::Result<()> {
    local_files::ensure_app_dirs()?;
    local_files::write_file(&paths::deckhand_json()?, &config::to_json_pretty(settings)?)
}

/// Merge a JSON patch (`{"nginx": {"version": "1.4.1"}}`) into the stored settings.
pub fn merge_settings(patch: serde_json::Value) -> crate::Result<(Settings, Vec<String>)> {
    let mut settings = load_settings()?;
    let updated = config::apply_patch(&mut settings, patch)?;
    save_settings(&settings)?;
    Ok((settings, updated))
}

/// Remove deckhand.json. Returns whether there was one.
pub fn reset_settings() -> crate::Result<bool> {
    let path = paths::deckhand_json()?;
    if !path.is_file() {
        return Ok(false);
    }
    local_files::remove_file(&path)?;
    Ok(true)
}

pub fn settings_path() -> crate::Result<String> {
    Ok(paths::deckhand_json()?.display().to_string())
}
