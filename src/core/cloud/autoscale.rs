use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{
    stamped_name, CloudProvider, ImageState, LaunchConfig, PollConfig, ScalingGroup,
    ScalingPolicy,
};
use crate::defaults::AutoscaleSettings;
use crate::error::{Error, Result};
use crate::system::require_plain_name;
use crate::utils::validation;

const ADJUSTMENT_TYPE: &str = "ChangeInCapacity";

pub fn group_name(name: &str) -> String {
    format!("{}-as-group", name)
}

pub fn scale_up_policy_name(name: &str) -> String {
    format!("{}-scaling-up", name)
}

pub fn scale_down_policy_name(name: &str) -> String {
    format!("{}-scaling-down", name)
}

/// Image a running instance and wait until the provider reports it available.
///
/// The image is named `<name>_<UTC stamp>`. `sleep` runs between polls.
pub fn create_ami(
    provider: &dyn CloudProvider,
    instance_id: &str,
    name: &str,
    poll: PollConfig,
    now: DateTime<Utc>,
    sleep: &dyn Fn(Duration),
) -> Result<String> {
    validation::require_non_empty(instance_id, "instance", "Instance id is required")?;
    require_plain_name("image", name)?;

    let image_name = stamped_name(name, now);
    log_status!("cloud", "Creating image {} from {}", image_name, instance_id);
    let image_id = provider.create_image(instance_id, &image_name)?;

    for attempt in 1..=poll.max_attempts {
        match provider.image_state(&image_id)? {
            ImageState::Available => {
                log_status!("cloud", "Image {} is available", image_id);
                return Ok(image_id);
            }
            ImageState::Failed => return Err(Error::cloud_image_failed(image_id)),
            state => {
                log_status!("cloud", "Image {} is {:?} (poll {})", image_id, state, attempt);
            }
        }
        if attempt < poll.max_attempts {
            sleep(poll.interval);
        }
    }

    Err(Error::cloud_timeout(image_id, poll.max_attempts))
}

/// Inputs for a new autoscaling setup. Tunables come from `params`.
#[derive(Debug, Clone)]
pub struct AutoscaleSpec {
    pub name: String,
    pub image_id: String,
    pub key_name: Option<String>,
    pub security_groups: Vec<String>,
    pub load_balancers: Vec<String>,
    pub params: AutoscaleSettings,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoscaleOutcome {
    pub launch_config: LaunchConfig,
    pub group: ScalingGroup,
    pub policies: Vec<ScalingPolicy>,
}

/// Create a launch configuration, a group using it, and the scale-up/down policies.
pub fn setup_autoscale(
    provider: &dyn CloudProvider,
    spec: &AutoscaleSpec,
    now: DateTime<Utc>,
) -> Result<AutoscaleOutcome> {
    require_plain_name("autoscale", &spec.name)?;
    validation::require_non_empty(&spec.image_id, "image", "Image id is required")?;
    let params = &spec.params;
    validation::require_non_empty_vec(
        &params.availability_zones,
        "availability_zones",
        "At least one availability zone is required",
    )?;
    if params.min_instances > params.max_instances {
        return Err(Error::validation_invalid_argument(
            "min_instances",
            format!(
                "min_instances ({}) exceeds max_instances ({})",
                params.min_instances, params.max_instances
            ),
            None,
            None,
        ));
    }

    let launch_config = LaunchConfig {
        name: stamped_name(&spec.name, now),
        image_id: spec.image_id.clone(),
        key_name: spec.key_name.clone(),
        security_groups: spec.security_groups.clone(),
        instance_type: params.instance_type.clone(),
        instance_monitoring: params.instance_monitoring,
    };
    log_status!("cloud", "Creating launch configuration {}", launch_config.name);
    provider.create_launch_config(&launch_config)?;

    let group = ScalingGroup {
        name: group_name(&spec.name),
        launch_config_name: launch_config.name.clone(),
        load_balancers: spec.load_balancers.clone(),
        availability_zones: params.availability_zones.clone(),
        min_size: params.min_instances,
        max_size: params.max_instances,
    };
    log_status!("cloud", "Creating autoscaling group {}", group.name);
    provider.create_scaling_group(&group)?;

    let policies = vec![
        ScalingPolicy {
            name: scale_up_policy_name(&spec.name),
            group_name: group.name.clone(),
            adjustment_type: ADJUSTMENT_TYPE.to_string(),
            scaling_adjustment: params.scale_up_adjustment,
            cooldown: params.scale_up_cooldown,
        },
        ScalingPolicy {
            name: scale_down_policy_name(&spec.name),
            group_name: group.name.clone(),
            adjustment_type: ADJUSTMENT_TYPE.to_string(),
            scaling_adjustment: params.scale_down_adjustment,
            cooldown: params.scale_down_cooldown,
        },
    ];
    for policy in &policies {
        provider.attach_scaling_policy(policy)?;
    }

    Ok(AutoscaleOutcome {
        launch_config,
        group,
        policies,
    })
}

/// Fields to change on the replacement launch configuration; `None` inherits.
#[derive(Debug, Clone, Default)]
pub struct LaunchConfigOverrides {
    pub image_id: Option<String>,
    pub key_name: Option<String>,
    pub security_groups: Option<Vec<String>>,
    pub instance_type: Option<String>,
    pub instance_monitoring: Option<bool>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplaceOutcome {
    pub group: String,
    pub old: LaunchConfig,
    pub new: LaunchConfig,
}

/// Swap the group's launch configuration for a new one and delete the old one.
pub fn replace_launch_config(
    provider: &dyn CloudProvider,
    name: &str,
    overrides: LaunchConfigOverrides,
    now: DateTime<Utc>,
) -> Result<ReplaceOutcome> {
    require_plain_name("autoscale", name)?;

    let group = provider.describe_scaling_group(&group_name(name))?;
    let old = provider.describe_launch_config(&group.launch_config_name)?;

    let new = LaunchConfig {
        name: stamped_name(name, now),
        image_id: overrides.image_id.unwrap_or_else(|| old.image_id.clone()),
        key_name: overrides.key_name.or_else(|| old.key_name.clone()),
        security_groups: overrides
            .security_groups
            .unwrap_or_else(|| old.security_groups.clone()),
        instance_type: overrides
            .instance_type
            .unwrap_or_else(|| old.instance_type.clone()),
        instance_monitoring: overrides
            .instance_monitoring
            .unwrap_or(old.instance_monitoring),
    };

    if new.name == old.name {
        return Err(Error::validation_invalid_argument(
            "name",
            format!("Launch configuration {} already exists", new.name),
            Some(new.name),
            None,
        )
        .retryable(true));
    }

    log_status!("cloud", "Replacing launch configuration {} with {}", old.name, new.name);
    provider.create_launch_config(&new)?;
    provider.update_scaling_group(&group.name, &new.name, group.min_size, group.max_size)?;
    provider.delete_launch_config(&old.name)?;

    Ok(ReplaceOutcome {
        group: group.name,
        old,
        new,
    })
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateOutcome {
    pub image_id: String,
    pub replaced: ReplaceOutcome,
}

/// Image `instance_id`, then roll the group onto a launch configuration using it.
pub fn update_autoscale(
    provider: &dyn CloudProvider,
    instance_id: &str,
    name: &str,
    poll: PollConfig,
    now: DateTime<Utc>,
    sleep: &dyn Fn(Duration),
) -> Result<UpdateOutcome> {
    let image_id = create_ami(provider, instance_id, name, poll, now, sleep)?;
    let replaced = replace_launch_config(
        provider,
        name,
        LaunchConfigOverrides {
            image_id: Some(image_id.clone()),
            ..LaunchConfigOverrides::default()
        },
        now,
    )?;
    Ok(UpdateOutcome { image_id, replaced })
}

/// Public DNS names of the instances behind a load balancer.
pub fn autoscaling_instances(provider: &dyn CloudProvider, load_balancer: &str) -> Result<Vec<String>> {
    let ids = provider.load_balancer_instances(load_balancer)?;
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    provider.instance_public_dns(&ids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::cell::{Cell, RefCell};
    use std::collections::VecDeque;

    #[derive(Default)]
    struct FakeProvider {
        calls: RefCell<Vec<String>>,
        states: RefCell<VecDeque<ImageState>>,
        launch_configs: RefCell<Vec<LaunchConfig>>,
        groups: RefCell<Vec<ScalingGroup>>,
        policies: RefCell<Vec<ScalingPolicy>>,
        lb_instances: Vec<String>,
    }

    impl FakeProvider {
        fn log(&self, call: String) {
            self.calls.borrow_mut().push(call);
        }
    }

    impl CloudProvider for FakeProvider {
        fn create_image(&self, instance_id: &str, name: &str) -> Result<String> {
            self.log(format!("create_image {} {}", instance_id, name));
            Ok("ami-1234".to_string())
        }

        fn image_state(&self, image_id: &str) -> Result<ImageState> {
            self.log(format!("image_state {}", image_id));
            Ok(self
                .states
                .borrow_mut()
                .pop_front()
                .unwrap_or(ImageState::Pending))
        }

        fn create_launch_config(&self, config: &LaunchConfig) -> Result<()> {
            self.log(format!("create_launch_config {}", config.name));
            self.launch_configs.borrow_mut().push(config.clone());
            Ok(())
        }

        fn describe_launch_config(&self, name: &str) -> Result<LaunchConfig> {
            self.launch_configs
                .borrow()
                .iter()
                .find(|c| c.name == name)
                .cloned()
                .ok_or_else(|| Error::internal_unexpected(format!("no launch config {}", name)))
        }

        fn delete_launch_config(&self, name: &str) -> Result<()> {
            self.log(format!("delete_launch_config {}", name));
            self.launch_configs.borrow_mut().retain(|c| c.name != name);
            Ok(())
        }

        fn create_scaling_group(&self, group: &ScalingGroup) -> Result<()> {
            self.log(format!("create_scaling_group {}", group.name));
            self.groups.borrow_mut().push(group.clone());
            Ok(())
        }

        fn describe_scaling_group(&self, name: &str) -> Result<ScalingGroup> {
            self.groups
                .borrow()
                .iter()
                .find(|g| g.name == name)
                .cloned()
                .ok_or_else(|| Error::internal_unexpected(format!("no group {}", name)))
        }

        fn update_scaling_group(&self, name: &str, launch_config: &str, min_size: u32, max_size: u32) -> Result<()> {
            self.log(format!(
                "update_scaling_group {} {} {} {}",
                name, launch_config, min_size, max_size
            ));
            for group in self.groups.borrow_mut().iter_mut().filter(|g| g.name == name) {
                group.launch_config_name = launch_config.to_string();
            }
            Ok(())
        }

        fn attach_scaling_policy(&self, policy: &ScalingPolicy) -> Result<()> {
            self.log(format!("attach_scaling_policy {}", policy.name));
            self.policies.borrow_mut().push(policy.clone());
            Ok(())
        }

        fn load_balancer_instances(&self, load_balancer: &str) -> Result<Vec<String>> {
            self.log(format!("load_balancer_instances {}", load_balancer));
            Ok(self.lb_instances.clone())
        }

        fn instance_public_dns(&self, instance_ids: &[String]) -> Result<Vec<String>> {
            self.log(format!("instance_public_dns {}", instance_ids.join(",")));
            Ok(instance_ids
                .iter()
                .map(|id| format!("{}.compute-1.amazonaws.com", id))
                .collect())
        }
    }

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2013, 2, 1, h, m, s).unwrap()
    }

    fn poll(max_attempts: u32) -> PollConfig {
        PollConfig {
            interval: Duration::from_secs(5),
            max_attempts,
        }
    }

    fn spec() -> AutoscaleSpec {
        AutoscaleSpec {
            name: "web".to_string(),
            image_id: "ami-1".to_string(),
            key_name: Some("deploy".to_string()),
            security_groups: vec!["web".to_string()],
            load_balancers: vec!["web-lb".to_string()],
            params: AutoscaleSettings::default(),
        }
    }

    #[test]
    fn create_ami_returns_after_image_becomes_available() {
        let provider = FakeProvider::default();
        provider.states.borrow_mut().extend([
            ImageState::Pending,
            ImageState::Pending,
            ImageState::Available,
        ]);
        let sleeps = Cell::new(0);

        let image = create_ami(&provider, "i-1", "web", poll(10), at(9, 0, 0), &|d| {
            assert_eq!(d, Duration::from_secs(5));
            sleeps.set(sleeps.get() + 1);
        })
        .unwrap();

        assert_eq!(image, "ami-1234");
        assert_eq!(sleeps.get(), 2);
        assert_eq!(provider.calls.borrow()[0], "create_image i-1 web_20130201-090000");
        assert_eq!(provider.calls.borrow().len(), 4);
    }

    #[test]
    fn create_ami_fails_on_failed_state() {
        let provider = FakeProvider::default();
        provider.states.borrow_mut().push_back(ImageState::Failed);

        let err = create_ami(&provider, "i-1", "web", poll(10), at(9, 0, 0), &|_| {}).unwrap_err();
        assert_eq!(err.code, crate::ErrorCode::CloudImageFailed);
    }

    #[test]
    fn create_ami_gives_up_after_max_attempts() {
        let provider = FakeProvider::default();
        let sleeps = Cell::new(0);

        let err = create_ami(&provider, "i-1", "web", poll(3), at(9, 0, 0), &|_| {
            sleeps.set(sleeps.get() + 1)
        })
        .unwrap_err();

        assert_eq!(err.code, crate::ErrorCode::CloudTimeout);
        assert_eq!(err.details["attempts"], 3);
        assert_eq!(sleeps.get(), 2);
    }

    #[test]
    fn setup_creates_config_group_and_policies() {
        let provider = FakeProvider::default();
        let outcome = setup_autoscale(&provider, &spec(), at(9, 0, 0)).unwrap();

        assert_eq!(outcome.launch_config.name, "web_20130201-090000");
        assert_eq!(outcome.launch_config.instance_type, "m1.small");
        assert_eq!(outcome.group.name, "web-as-group");
        assert_eq!(outcome.group.launch_config_name, "web_20130201-090000");
        assert_eq!((outcome.group.min_size, outcome.group.max_size), (1, 12));

        let policies = provider.policies.borrow();
        assert_eq!(policies[0].name, "web-scaling-up");
        assert_eq!(policies[0].scaling_adjustment, 1);
        assert_eq!(policies[1].name, "web-scaling-down");
        assert_eq!(policies[1].scaling_adjustment, -1);
        assert!(policies
            .iter()
            .all(|p| p.cooldown == 180 && p.adjustment_type == "ChangeInCapacity"));
    }

    #[test]
    fn setup_rejects_inverted_bounds() {
        let provider = FakeProvider::default();
        let mut spec = spec();
        spec.params.min_instances = 5;
        spec.params.max_instances = 2;

        assert!(setup_autoscale(&provider, &spec, at(9, 0, 0)).is_err());
        assert!(provider.calls.borrow().is_empty());
    }

    #[test]
    fn replace_inherits_fields_and_deletes_old_config() {
        let provider = FakeProvider::default();
        setup_autoscale(&provider, &spec(), at(9, 0, 0)).unwrap();
        provider.calls.borrow_mut().clear();

        let outcome = replace_launch_config(
            &provider,
            "web",
            LaunchConfigOverrides {
                instance_type: Some("m1.large".to_string()),
                ..LaunchConfigOverrides::default()
            },
            at(10, 0, 0),
        )
        .unwrap();

        assert_eq!(outcome.old.name, "web_20130201-090000");
        assert_eq!(outcome.new.name, "web_20130201-100000");
        assert_eq!(outcome.new.image_id, "ami-1");
        assert_eq!(outcome.new.key_name.as_deref(), Some("deploy"));
        assert_eq!(outcome.new.instance_type, "m1.large");
        assert_eq!(
            *provider.calls.borrow(),
            vec![
                "create_launch_config web_20130201-100000".to_string(),
                "update_scaling_group web-as-group web_20130201-100000 1 12".to_string(),
                "delete_launch_config web_20130201-090000".to_string(),
            ]
        );
    }

    #[test]
    fn update_autoscale_rolls_new_image() {
        let provider = FakeProvider::default();
        setup_autoscale(&provider, &spec(), at(9, 0, 0)).unwrap();
        provider.states.borrow_mut().push_back(ImageState::Available);

        let outcome =
            update_autoscale(&provider, "i-9", "web", poll(5), at(11, 30, 0), &|_| {}).unwrap();

        assert_eq!(outcome.image_id, "ami-1234");
        assert_eq!(outcome.replaced.new.image_id, "ami-1234");
        assert_eq!(outcome.replaced.new.name, "web_20130201-113000");
    }

    #[test]
    fn instances_resolve_to_public_dns() {
        let provider = FakeProvider {
            lb_instances: vec!["i-1".to_string(), "i-2".to_string()],
            ..FakeProvider::default()
        };
        let hosts = autoscaling_instances(&provider, "web-lb").unwrap();
        assert_eq!(
            hosts,
            vec![
                "i-1.compute-1.amazonaws.com".to_string(),
                "i-2.compute-1.amazonaws.com".to_string()
            ]
        );
    }

    #[test]
    fn empty_load_balancer_skips_instance_lookup() {
        let provider = FakeProvider::default();
        assert!(autoscaling_instances(&provider, "web-lb").unwrap().is_empty());
        assert_eq!(provider.calls.borrow().len(), 1);
    }
}
