//! Machine images, autoscaling and object storage behind narrow provider traits.
//!
//! Orchestration (`autoscale`, `storage::sync_dir_up`) only talks to [`CloudProvider`]
//! and [`ObjectStore`]; [`AwsCli`] implements both by shelling out to the `aws` tool.

mod aws_cli;
pub mod autoscale;
pub mod storage;

pub use aws_cli::AwsCli;
pub use autoscale::*;
pub use storage::{sync_dir_up, ObjectStore, SyncOutcome};

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::defaults::CloudSettings;
use crate::error::Result;

/// Suffix appended to image and launch configuration names.
pub const STAMP_FORMAT: &str = "%Y%m%d-%H%M%S";

pub fn stamped_name(name: &str, now: DateTime<Utc>) -> String {
    format!("{}_{}", name, now.format(STAMP_FORMAT))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageState {
    Pending,
    Available,
    Failed,
    Other(String),
}

impl ImageState {
    pub fn parse(state: &str) -> Self {
        match state {
            "pending" => ImageState::Pending,
            "available" => ImageState::Available,
            "failed" => ImageState::Failed,
            other => ImageState::Other(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LaunchConfig {
    pub name: String,
    pub image_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_name: Option<String>,
    pub security_groups: Vec<String>,
    pub instance_type: String,
    pub instance_monitoring: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScalingGroup {
    pub name: String,
    pub launch_config_name: String,
    pub load_balancers: Vec<String>,
    pub availability_zones: Vec<String>,
    pub min_size: u32,
    pub max_size: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScalingPolicy {
    pub name: String,
    pub group_name: String,
    pub adjustment_type: String,
    pub scaling_adjustment: i32,
    pub cooldown: u32,
}

pub trait CloudProvider {
    /// Start imaging `instance_id`; returns the new image id.
    fn create_image(&self, instance_id: &str, name: &str) -> Result<String>;
    fn image_state(&self, image_id: &str) -> Result<ImageState>;

    fn create_launch_config(&self, config: &LaunchConfig) -> Result<()>;
    fn describe_launch_config(&self, name: &str) -> Result<LaunchConfig>;
    fn delete_launch_config(&self, name: &str) -> Result<()>;

    fn create_scaling_group(&self, group: &ScalingGroup) -> Result<()>;
    fn describe_scaling_group(&self, name: &str) -> Result<ScalingGroup>;
    /// Point a group at `launch_config`. Sizes are always sent; the provider resets
    /// them otherwise.
    fn update_scaling_group(&self, name: &str, launch_config: &str, min_size: u32, max_size: u32) -> Result<()>;
    fn attach_scaling_policy(&self, policy: &ScalingPolicy) -> Result<()>;

    /// Instance ids registered with a load balancer.
    fn load_balancer_instances(&self, load_balancer: &str) -> Result<Vec<String>>;
    fn instance_public_dns(&self, instance_ids: &[String]) -> Result<Vec<String>>;
}

/// Bounded polling for long-running provider operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl PollConfig {
    pub fn from_settings(settings: &CloudSettings) -> Self {
        Self {
            interval: Duration::from_secs(settings.poll_interval_secs),
            max_attempts: settings.max_poll_attempts.max(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn stamped_name_uses_utc_timestamp() {
        let now = Utc.with_ymd_and_hms(2013, 2, 1, 9, 5, 7).unwrap();
        assert_eq!(stamped_name("web", now), "web_20130201-090507");
    }

    #[test]
    fn image_state_parses_known_values() {
        assert_eq!(ImageState::parse("available"), ImageState::Available);
        assert_eq!(ImageState::parse("failed"), ImageState::Failed);
        assert_eq!(
            ImageState::parse("deregistered"),
            ImageState::Other("deregistered".to_string())
        );
    }

    #[test]
    fn poll_config_never_allows_zero_attempts() {
        let settings = CloudSettings {
            max_poll_attempts: 0,
            ..CloudSettings::default()
        };
        assert_eq!(PollConfig::from_settings(&settings).max_attempts, 1);
    }
}
