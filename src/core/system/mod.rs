//! Host-level utilities: apt sources, services, reboot.

pub mod crontab;
pub mod upstart;

use std::time::Duration;

use crate::error::{Error, Result};
use crate::executor::Executor;
use crate::utils::shell::ShellCommand;

/// Reject names that would escape the directory they are written into.
pub(crate) fn require_plain_name(field: &str, name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name != "."
        && name != ".."
        && !name.starts_with('-')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-' | '@'));

    if valid {
        Ok(())
    } else {
        Err(Error::validation_invalid_argument(
            field,
            format!("'{}' is not a valid {} name", name, field),
            Some(name.to_string()),
            None,
        ))
    }
}

pub fn apt_import_pubkey(exec: &dyn Executor, key: &str, keyserver: &str) -> Result<()> {
    log_status!("system", "Importing pubkey {}", key);
    exec.run(
        &ShellCommand::sudo("apt-key")
            .args(["adv", "--keyserver", keyserver, "--recv", key]),
    )?;
    Ok(())
}

/// Write `/etc/apt/sources.list.d/<name>.list` containing `deb <url> <distro> <name>`.
pub fn apt_add_repository(exec: &dyn Executor, name: &str, distro: &str, url: &str) -> Result<String> {
    require_plain_name("repository", name)?;

    let path = format!("/etc/apt/sources.list.d/{}.list", name);
    log_status!("system", "Adding repository {}", name);

    exec.run(
        &ShellCommand::new("echo")
            .arg(format!("deb {} {} {}", url, distro, name))
            .pipe("tee")
            .elevated(true)
            .arg(&path)
            .stdout_to("/dev/null"),
    )?;
    Ok(path)
}

/// Reboot after a grace period so the operator can still interrupt.
pub fn reboot(exec: &dyn Executor, delay: Duration, sleep: impl Fn(Duration)) -> Result<()> {
    log_status!(
        "system",
        "Rebooting {} in {} seconds!",
        exec.target(),
        delay.as_secs()
    );
    sleep(delay);
    exec.run(&ShellCommand::sudo("reboot"))?;
    Ok(())
}

pub fn restart_service(exec: &dyn Executor, name: &str) -> Result<()> {
    service(exec, name, "restart")
}

pub fn reload_service(exec: &dyn Executor, name: &str) -> Result<()> {
    service(exec, name, "reload")
}

fn service(exec: &dyn Executor, name: &str, action: &str) -> Result<()> {
    require_plain_name("service", name)?;
    log_status!("system", "Running {} on service {}", action, name);
    exec.run(&ShellCommand::sudo("service").args([name, action]))?;
    Ok(())
}
