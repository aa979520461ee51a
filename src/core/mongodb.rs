use serde::Serialize;

use crate::defaults::Settings;
use crate::error::Result;
use crate::executor::Executor;
use crate::provision::{Provisioner, RemoteProvisioner};
use crate::system::{self, upstart};
use crate::utils::shell::{escape_sed_replacement, ShellCommand};
use crate::utils::validation;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MongoInstallOutcome {
    pub repository: String,
    pub packages: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DatadirOutcome {
    pub dbpath: String,
    pub config_file: String,
    /// `restart` or `start`, depending on whether the service was running.
    pub service_action: String,
}

/// Add the vendor apt repository and install the server packages.
pub fn install(exec: &dyn Executor, settings: &Settings) -> Result<MongoInstallOutcome> {
    let mongo = &settings.mongodb;
    let prov = RemoteProvisioner::new(exec, settings.system.target_os);

    system::apt_import_pubkey(exec, &mongo.apt_key, &settings.system.keyserver)?;
    let repository = system::apt_add_repository(
        exec,
        &mongo.repository_name,
        &mongo.repository_distro,
        &mongo.repository_url,
    )?;

    prov.update_index()?;
    prov.upgrade_packages()?;
    log_status!("mongodb", "Installing {}", mongo.packages.join(", "));
    prov.install_packages(&mongo.packages)?;

    Ok(MongoInstallOutcome {
        repository,
        packages: mongo.packages.clone(),
    })
}

/// Move the database path: create and chown `datadir`, point `dbpath=` at it, restart.
///
/// Existing data is not copied.
pub fn change_datadir(exec: &dyn Executor, settings: &Settings, datadir: &str) -> Result<DatadirOutcome> {
    let mongo = &settings.mongodb;
    let datadir = validation::require_absolute_path(datadir, "datadir")?;

    let prov = RemoteProvisioner::new(exec, settings.system.target_os);
    prov.ensure_directory(datadir, None)?;

    let owner = format!("{}:{}", mongo.user, mongo.user);
    exec.run(&ShellCommand::sudo("chown").args(["-R", &owner, datadir]))?;

    log_status!("mongodb", "Setting dbpath={} in {}", datadir, mongo.config_file);
    let expression = format!(
        "s|^dbpath=.*$|dbpath={}|",
        escape_sed_replacement(datadir, '|')
    );
    exec.run(&ShellCommand::sudo("sed").args(["-i", &expression, &mongo.config_file]))?;

    let action = upstart::restart(exec, &mongo.service, true, &[])?;

    Ok(DatadirOutcome {
        dbpath: datadir.to_string(),
        config_file: mongo.config_file.clone(),
        service_action: action.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::CommandOutput;
    use crate::testing::RecordingExecutor;

    #[test]
    fn install_adds_repository_before_packages() {
        let exec = RecordingExecutor::new();
        let outcome = install(&exec, &Settings::default()).unwrap();

        assert_eq!(outcome.repository, "/etc/apt/sources.list.d/10gen.list");
        let commands = exec.commands();
        assert_eq!(
            commands[0],
            "sudo apt-key adv --keyserver keyserver.ubuntu.com --recv 7F0CEB10"
        );
        let update = exec.position("apt-get update").unwrap();
        let upgrade = exec.position("apt-get upgrade").unwrap();
        let packages = exec
            .position("apt-get install -q -y mongodb-10gen ntp lvm2")
            .unwrap();
        assert!(exec.position("10gen.list").unwrap() < update);
        assert!(update < upgrade && upgrade < packages);
    }

    #[test]
    fn change_datadir_rewrites_config_and_restarts() {
        let exec = RecordingExecutor::new();
        exec.respond("test -d /data/db", CommandOutput::failure(1, ""));

        let outcome = change_datadir(&exec, &Settings::default(), "/data/db/").unwrap();

        assert_eq!(outcome.dbpath, "/data/db");
        assert_eq!(outcome.service_action, "restart");
        assert_eq!(
            exec.commands(),
            vec![
                "test -d /data/db".to_string(),
                "sudo mkdir -p /data/db".to_string(),
                "sudo chown -R mongodb:mongodb /data/db".to_string(),
                "sudo sed -i 's|^dbpath=.*$|dbpath=/data/db|' /etc/mongodb.conf".to_string(),
                "sudo status mongodb".to_string(),
                "sudo restart mongodb".to_string(),
            ]
        );
    }

    #[test]
    fn change_datadir_starts_stopped_service() {
        let exec = RecordingExecutor::new();
        exec.respond("status mongodb", CommandOutput::failure(1, "stop/waiting"));

        let outcome = change_datadir(&exec, &Settings::default(), "/mnt/mongo").unwrap();
        assert_eq!(outcome.service_action, "start");
        assert!(exec.ran("sudo start mongodb"));
    }

    #[test]
    fn delimiter_in_datadir_is_escaped() {
        let exec = RecordingExecutor::new();
        change_datadir(&exec, &Settings::default(), "/data/a|b").unwrap();
        assert!(exec.ran("dbpath=/data/a\\|b|"));
    }

    #[test]
    fn relative_datadir_is_rejected() {
        let exec = RecordingExecutor::new();
        assert!(change_datadir(&exec, &Settings::default(), "data/db").is_err());
        assert!(change_datadir(&exec, &Settings::default(), "/data/../etc").is_err());
        assert!(exec.commands().is_empty());
    }
}
