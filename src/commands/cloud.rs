use chrono::Utc;
use clap::{Args, Subcommand};
use serde::Serialize;
use std::time::Duration;

use deckhand::cloud::{
    self, AutoscaleOutcome, AutoscaleSpec, AwsCli, LaunchConfigOverrides, PollConfig,
    ReplaceOutcome, UpdateOutcome,
};
use deckhand::defaults;

use super::CmdResult;

#[derive(Args)]
pub struct CloudArgs {
    /// Region passed to the aws tool (default: cloud.region)
    #[arg(long, global = true)]
    region: Option<String>,

    #[command(subcommand)]
    command: CloudCommand,
}

#[derive(Subcommand)]
enum CloudCommand {
    /// Image a running instance and wait for it to become available
    CreateAmi {
        /// Instance ID
        instance_id: String,
        /// Image name prefix
        name: String,
    },
    /// Create a launch configuration, scaling group and scaling policies
    SetupAutoscale {
        /// Base name for the launch configuration, group and policies
        name: String,
        /// Image the instances boot from
        #[arg(long)]
        image: String,
        /// Key pair name
        #[arg(long)]
        key_name: Option<String>,
        /// Security group, repeatable
        #[arg(long = "security-group")]
        security_groups: Vec<String>,
        /// Load balancer, repeatable
        #[arg(long = "load-balancer")]
        load_balancers: Vec<String>,
        /// Instance type (default: cloud.autoscale.instance_type)
        #[arg(long)]
        instance_type: Option<String>,
        /// Availability zone, repeatable (default: cloud.autoscale.availability_zones)
        #[arg(long = "zone")]
        zones: Vec<String>,
        #[arg(long)]
        min: Option<u32>,
        #[arg(long)]
        max: Option<u32>,
    },
    /// Point a group at a new launch configuration, inheriting unset fields
    ReplaceLaunchConfig {
        /// Autoscale base name
        name: String,
        #[arg(long)]
        image: Option<String>,
        #[arg(long)]
        key_name: Option<String>,
        /// Security group, repeatable (replaces the current list)
        #[arg(long = "security-group")]
        security_groups: Vec<String>,
        #[arg(long)]
        instance_type: Option<String>,
        /// Detailed instance monitoring
        #[arg(long)]
        monitoring: Option<bool>,
    },
    /// Image an instance and roll the group onto it
    UpdateAutoscale {
        /// Instance ID to image
        instance_id: String,
        /// Autoscale base name
        name: String,
    },
    /// Public DNS names of the instances behind a load balancer
    Instances {
        /// Load balancer name
        load_balancer: String,
    },
}

#[derive(Serialize)]
#[serde(tag = "command", rename_all_fields = "camelCase")]
pub enum CloudOutput {
    #[serde(rename = "cloud.create_ami")]
    CreateAmi { instance_id: String, image_id: String },
    #[serde(rename = "cloud.setup_autoscale")]
    SetupAutoscale {
        #[serde(flatten)]
        outcome: AutoscaleOutcome,
    },
    #[serde(rename = "cloud.replace_launch_config")]
    ReplaceLaunchConfig {
        #[serde(flatten)]
        outcome: ReplaceOutcome,
    },
    #[serde(rename = "cloud.update_autoscale")]
    UpdateAutoscale {
        #[serde(flatten)]
        outcome: UpdateOutcome,
    },
    #[serde(rename = "cloud.instances")]
    Instances {
        load_balancer: String,
        hosts: Vec<String>,
    },
}

pub fn run(args: CloudArgs, _global: &super::GlobalArgs) -> CmdResult<CloudOutput> {
    let mut settings = defaults::load_settings()?.cloud;
    if args.region.is_some() {
        settings.region = args.region;
    }

    let provider = AwsCli::from_settings(&settings);
    let poll = PollConfig::from_settings(&settings);
    let sleep = |d: Duration| std::thread::sleep(d);

    let output = match args.command {
        CloudCommand::CreateAmi { instance_id, name } => {
            let image_id = cloud::create_ami(&provider, &instance_id, &name, poll, Utc::now(), &sleep)?;
            CloudOutput::CreateAmi {
                instance_id,
                image_id,
            }
        }
        CloudCommand::SetupAutoscale {
            name,
            image,
            key_name,
            security_groups,
            load_balancers,
            instance_type,
            zones,
            min,
            max,
        } => {
            let mut params = settings.autoscale.clone();
            if let Some(instance_type) = instance_type {
                params.instance_type = instance_type;
            }
            if !zones.is_empty() {
                params.availability_zones = zones;
            }
            if let Some(min) = min {
                params.min_instances = min;
            }
            if let Some(max) = max {
                params.max_instances = max;
            }

            let spec = AutoscaleSpec {
                name,
                image_id: image,
                key_name,
                security_groups,
                load_balancers,
                params,
            };
            CloudOutput::SetupAutoscale {
                outcome: cloud::setup_autoscale(&provider, &spec, Utc::now())?,
            }
        }
        CloudCommand::ReplaceLaunchConfig {
            name,
            image,
            key_name,
            security_groups,
            instance_type,
            monitoring,
        } => {
            let overrides = LaunchConfigOverrides {
                image_id: image,
                key_name,
                security_groups: (!security_groups.is_empty()).then_some(security_groups),
                instance_type,
                instance_monitoring: monitoring,
            };
            CloudOutput::ReplaceLaunchConfig {
                outcome: cloud::replace_launch_config(&provider, &name, overrides, Utc::now())?,
            }
        }
        CloudCommand::UpdateAutoscale { instance_id, name } => CloudOutput::UpdateAutoscale {
            outcome: cloud::update_autoscale(&provider, &instance_id, &name, poll, Utc::now(), &sleep)?,
        },
        CloudCommand::Instances { load_balancer } => {
            let hosts = cloud::autoscaling_instances(&provider, &load_balancer)?;
            CloudOutput::Instances {
                load_balancer,
                hosts,
            }
        }
    };

    Ok((output, 0))
}
