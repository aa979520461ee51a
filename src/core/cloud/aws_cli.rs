//! `aws` command-line adapter. Every call runs with `--output json`; responses are
//! decoded into typed records before leaving this module.

use std::collections::HashMap;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use super::storage::ObjectStore;
use super::{CloudProvider, ImageState, LaunchConfig, ScalingGroup, ScalingPolicy};
use crate::defaults::CloudSettings;
use crate::error::{CloudCommandFailedDetails, Error, Result};
use crate::utils::command;

pub struct AwsCli {
    bin: String,
    region: Option<String>,
    profile: Option<String>,
}

impl AwsCli {
    pub fn new(bin: impl Into<String>) -> Self {
        Self {
            bin: bin.into(),
            region: None,
            profile: None,
        }
    }

    pub fn from_settings(settings: &CloudSettings) -> Self {
        Self {
            bin: settings.aws_bin.clone(),
            region: settings.region.clone(),
            profile: settings.profile.clone(),
        }
    }

    fn command_args(&self, service: &str, operation: &str, args: Vec<String>) -> Vec<String> {
        let mut full = vec![service.to_string(), operation.to_string()];
        full.extend(args);
        full.push("--output".to_string());
        full.push("json".to_string());
        if let Some(region) = &self.region {
            full.push("--region".to_string());
            full.push(region.clone());
        }
        if let Some(profile) = &self.profile {
            full.push("--profile".to_string());
            full.push(profile.clone());
        }
        full
    }

    fn invoke(&self, service: &str, operation: &str, args: Vec<String>) -> Result<Value> {
        let full = self.command_args(service, operation, args);
        let output = command::capture(&self.bin, &full, None)?;

        if !output.success {
            return Err(Error::cloud_command_failed(CloudCommandFailedDetails {
                operation: format!("{} {}", service, operation),
                exit_code: output.code.unwrap_or(-1),
                stderr: output.failure_text().to_string(),
            }));
        }

        let stdout = output.stdout_trimmed();
        if stdout.is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(stdout).map_err(|e| {
            Error::internal_json(e.to_string(), Some(format!("parse {} {} output", service, operation)))
        })
    }

    fn invoke_as<T: DeserializeOwned>(&self, service: &str, operation: &str, args: Vec<String>) -> Result<T> {
        let value = self.invoke(service, operation, args)?;
        decode(operation, value)
    }
}

fn decode<T: DeserializeOwned>(operation: &str, value: Value) -> Result<T> {
    serde_json::from_value(value)
        .map_err(|e| Error::internal_json(e.to_string(), Some(format!("decode {} response", operation))))
}

fn missing(operation: &str, what: String) -> Error {
    Error::cloud_command_failed(CloudCommandFailedDetails {
        operation: operation.to_string(),
        exit_code: 0,
        stderr: format!("{} not found", what),
    })
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

// ============================================================================
// Response records
// ============================================================================

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CreateImageResponse {
    image_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeImagesResponse {
    #[serde(default)]
    images: Vec<ImageRecord>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ImageRecord {
    state: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeLaunchConfigsResponse {
    #[serde(default)]
    launch_configurations: Vec<LaunchConfigRecord>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct LaunchConfigRecord {
    launch_configuration_name: String,
    image_id: String,
    #[serde(default)]
    key_name: Option<String>,
    #[serde(default)]
    security_groups: Vec<String>,
    instance_type: String,
    #[serde(default)]
    instance_monitoring: Option<MonitoringRecord>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct MonitoringRecord {
    enabled: bool,
}

impl From<LaunchConfigRecord> for LaunchConfig {
    fn from(record: LaunchConfigRecord) -> Self {
        LaunchConfig {
            name: record.launch_configuration_name,
            image_id: record.image_id,
            key_name: record.key_name.filter(|k| !k.is_empty()),
            security_groups: record.security_groups,
            instance_type: record.instance_type,
            instance_monitoring: record.instance_monitoring.is_some_and(|m| m.enabled),
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeGroupsResponse {
    #[serde(default)]
    auto_scaling_groups: Vec<GroupRecord>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct GroupRecord {
    auto_scaling_group_name: String,
    #[serde(default)]
    launch_configuration_name: String,
    min_size: u32,
    max_size: u32,
    #[serde(default)]
    availability_zones: Vec<String>,
    #[serde(default)]
    load_balancer_names: Vec<String>,
}

impl From<GroupRecord> for ScalingGroup {
    fn from(record: GroupRecord) -> Self {
        ScalingGroup {
            name: record.auto_scaling_group_name,
            launch_config_name: record.launch_configuration_name,
            load_balancers: record.load_balancer_names,
            availability_zones: record.availability_zones,
            min_size: record.min_size,
            max_size: record.max_size,
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeLoadBalancersResponse {
    #[serde(default)]
    load_balancer_descriptions: Vec<LoadBalancerRecord>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct LoadBalancerRecord {
    #[serde(default)]
    instances: Vec<InstanceRef>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InstanceRef {
    instance_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeInstancesResponse {
    #[serde(default)]
    reservations: Vec<Reservation>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Reservation {
    #[serde(default)]
    instances: Vec<InstanceRecord>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InstanceRecord {
    #[serde(default)]
    public_dns_name: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct HeadObjectResponse {
    #[serde(default)]
    metadata: HashMap<String, String>,
}

// ============================================================================
// Argument builders
// ============================================================================

fn launch_config_args(config: &LaunchConfig) -> Vec<String> {
    let mut args = strings(&[
        "--launch-configuration-name",
        &config.name,
        "--image-id",
        &config.image_id,
        "--instance-type",
        &config.instance_type,
    ]);
    if let Some(key) = &config.key_name {
        args.extend(strings(&["--key-name", key]));
    }
    if !config.security_groups.is_empty() {
        args.push("--security-groups".to_string());
        args.extend(config.security_groups.iter().cloned());
    }
    args.push("--instance-monitoring".to_string());
    args.push(format!("Enabled={}", config.instance_monitoring));
    args
}

fn scaling_group_args(group: &ScalingGroup) -> Vec<String> {
    let mut args = strings(&[
        "--auto-scaling-group-name",
        &group.name,
        "--launch-configuration-name",
        &group.launch_config_name,
    ]);
    args.extend([
        "--min-size".to_string(),
        group.min_size.to_string(),
        "--max-size".to_string(),
        group.max_size.to_string(),
        "--availability-zones".to_string(),
    ]);
    args.extend(group.availability_zones.iter().cloned());
    if !group.load_balancers.is_empty() {
        args.push("--load-balancer-names".to_string());
        args.extend(group.load_balancers.iter().cloned());
    }
    args
}

fn scaling_policy_args(policy: &ScalingPolicy) -> Vec<String> {
    let mut args = strings(&[
        "--policy-name",
        &policy.name,
        "--auto-scaling-group-name",
        &policy.group_name,
        "--adjustment-type",
        &policy.adjustment_type,
    ]);
    // `=` form keeps negative adjustments from parsing as flags.
    args.push(format!("--scaling-adjustment={}", policy.scaling_adjustment));
    args.push("--cooldown".to_string());
    args.push(policy.cooldown.to_string());
    args
}

fn metadata_arg(metadata: &[(String, String)]) -> String {
    metadata
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(",")
}

/// `head-object` reports a missing key as a 404 in stderr.
fn is_not_found(err: &Error) -> bool {
    let stderr = err.details["stderr"].as_str().unwrap_or("");
    stderr.contains("Not Found") || stderr.contains("404") || stderr.contains("NoSuchKey")
}

// ============================================================================
// Provider implementations
// ============================================================================

impl CloudProvider for AwsCli {
    fn create_image(&self, instance_id: &str, name: &str) -> Result<String> {
        let response: CreateImageResponse = self.invoke_as(
            "ec2",
            "create-image",
            strings(&["--instance-id", instance_id, "--name", name]),
        )?;
        Ok(response.image_id)
    }

    fn image_state(&self, image_id: &str) -> Result<ImageState> {
        let response: DescribeImagesResponse =
            self.invoke_as("ec2", "describe-images", strings(&["--image-ids", image_id]))?;
        response
            .images
            .into_iter()
            .next()
            .map(|image| ImageState::parse(&image.state))
            .ok_or_else(|| missing("describe-images", format!("Image {}", image_id)))
    }

    fn create_launch_config(&self, config: &LaunchConfig) -> Result<()> {
        self.invoke(
            "autoscaling",
            "create-launch-configuration",
            launch_config_args(config),
        )?;
        Ok(())
    }

    fn describe_launch_config(&self, name: &str) -> Result<LaunchConfig> {
        let response: DescribeLaunchConfigsResponse = self.invoke_as(
            "autoscaling",
            "describe-launch-configurations",
            strings(&["--launch-configuration-names", name]),
        )?;
        response
            .launch_configurations
            .into_iter()
            .next()
            .map(LaunchConfig::from)
            .ok_or_else(|| {
                missing(
                    "describe-launch-configurations",
                    format!("Launch configuration {}", name),
                )
            })
    }

    fn delete_launch_config(&self, name: &str) -> Result<()> {
        self.invoke(
            "autoscaling",
            "delete-launch-configuration",
            strings(&["--launch-configuration-name", name]),
        )?;
        Ok(())
    }

    fn create_scaling_group(&self, group: &ScalingGroup) -> Result<()> {
        self.invoke(
            "autoscaling",
            "create-auto-scaling-group",
            scaling_group_args(group),
        )?;
        Ok(())
    }

    fn describe_scaling_group(&self, name: &str) -> Result<ScalingGroup> {
        let response: DescribeGroupsResponse = self.invoke_as(
            "autoscaling",
            "describe-auto-scaling-groups",
            strings(&["--auto-scaling-group-names", name]),
        )?;
        response
            .auto_scaling_groups
            .into_iter()
            .next()
            .map(ScalingGroup::from)
            .ok_or_else(|| {
                missing(
                    "describe-auto-scaling-groups",
                    format!("Autoscaling group {}", name),
                )
            })
    }

    fn update_scaling_group(&self, name: &str, launch_config: &str, min_size: u32, max_size: u32) -> Result<()> {
        let mut args = strings(&[
            "--auto-scaling-group-name",
            name,
            "--launch-configuration-name",
            launch_config,
        ]);
        args.extend([
            "--min-size".to_string(),
            min_size.to_string(),
            "--max-size".to_string(),
            max_size.to_string(),
        ]);
        self.invoke("autoscaling", "update-auto-scaling-group", args)?;
        Ok(())
    }

    fn attach_scaling_policy(&self, policy: &ScalingPolicy) -> Result<()> {
        self.invoke("autoscaling", "put-scaling-policy", scaling_policy_args(policy))?;
        Ok(())
    }

    fn load_balancer_instances(&self, load_balancer: &str) -> Result<Vec<String>> {
        let response: DescribeLoadBalancersResponse = self.invoke_as(
            "elb",
            "describe-load-balancers",
            strings(&["--load-balancer-names", load_balancer]),
        )?;
        Ok(response
            .load_balancer_descriptions
            .into_iter()
            .flat_map(|lb| lb.instances)
            .map(|i| i.instance_id)
            .collect())
    }

    fn instance_public_dns(&self, instance_ids: &[String]) -> Result<Vec<String>> {
        let mut args = vec!["--instance-ids".to_string()];
        args.extend(instance_ids.iter().cloned());
        let response: DescribeInstancesResponse = self.invoke_as("ec2", "describe-instances", args)?;
        Ok(public_dns_names(response))
    }
}

fn public_dns_names(response: DescribeInstancesResponse) -> Vec<String> {
    response
        .reservations
        .into_iter()
        .flat_map(|r| r.instances)
        .map(|i| i.public_dns_name)
        .filter(|name| !name.is_empty())
        .collect()
}

impl ObjectStore for AwsCli {
    fn object_metadata(&self, bucket: &str, key: &str) -> Result<Option<HashMap<String, String>>> {
        match self.invoke_as::<HeadObjectResponse>(
            "s3api",
            "head-object",
            strings(&["--bucket", bucket, "--key", key]),
        ) {
            Ok(response) => Ok(Some(response.metadata)),
            Err(err) if is_not_found(&err) => Ok(None),
            Err(err) => Err(err),
        }
    }

    fn put_object(
        &self,
        bucket: &str,
        key: &str,
        file: &Path,
        acl: &str,
        metadata: &[(String, String)],
    ) -> Result<()> {
        let body = file.display().to_string();
        let mut args = strings(&["--bucket", bucket, "--key", key, "--body", &body, "--acl", acl]);
        if !metadata.is_empty() {
            args.push("--metadata".to_string());
            args.push(metadata_arg(metadata));
        }
        self.invoke("s3api", "put-object", args)?;
        Ok(())
    }
}
