mod common;

use std::path::Path;

use chrono::{TimeZone, Utc};
use common::ScriptedHost;
use deckhand::context::DeployContext;
use deckhand::defaults::Settings;
use deckhand::executor::CommandOutput;
use deckhand::project::Project;
use deckhand::release::{self, SourceRepository};
use deckhand::ErrorCode;

const COMMIT: &str = "0123abcd89ef0123abcd89ef0123abcd89ef0123";
const LOCK_DIR: &str = "/data/shop/.deploy.lock";

struct FixedRepo;

impl SourceRepository for FixedRepo {
    fn resolve(&self, _revision: &str) -> deckhand::Result<String> {
        Ok(COMMIT.to_string())
    }

    fn archive(&self, _commit: &str, destination: &Path) -> deckhand::Result<()> {
        std::fs::write(destination, b"not really gzip").map_err(|e| {
            deckhand::Error::internal_io(e.to_string(), Some("write archive".to_string()))
        })
    }
}

fn shop() -> Project {
    Project {
        id: "shop".to_string(),
        server_id: Some("web1".to_string()),
        owner: Some("www-data".to_string()),
        ..Default::default()
    }
}

fn listing(ids: &[&str]) -> CommandOutput {
    CommandOutput::ok(format!("{}\n", ids.join("\n")))
}

#[test]
fn upload_stages_then_promotes_release() {
    let host = ScriptedHost::new()
        .missing("test -e /data/shop/releases/")
        .on("mktemp", CommandOutput::ok("/tmp/deckhand.k2j3\n"));
    let ctx = DeployContext::new(shop(), Settings::default(), &host);
    let now = Utc.with_ymd_and_hms(2013, 1, 15, 9, 30, 0).unwrap();

    let outcome = release::upload_at(&ctx, &FixedRepo, Some("v1.2"), now).unwrap();

    assert_eq!(outcome.release_id.as_str(), "20130115-093000-0123abcd");
    assert_eq!(outcome.revision, "v1.2");
    assert_eq!(outcome.path, "/data/shop/releases/20130115-093000-0123abcd");

    let upload = host.position("cat > '/tmp/deckhand.k2j3/release.tar.gz'").unwrap();
    let extract = host
        .position("sudo tar -xzf /tmp/deckhand.k2j3/release.tar.gz -C /data/shop/releases/.incoming-20130115-093000-0123abcd")
        .unwrap();
    let chown = host.position("sudo chown -R www-data").unwrap();
    let promote = host
        .position("sudo mv -T /data/shop/releases/.incoming-20130115-093000-0123abcd /data/shop/releases/20130115-093000-0123abcd")
        .unwrap();
    assert!(upload < extract && extract < chown && chown < promote);

    let commands = host.commands();
    assert_eq!(commands.last().unwrap(), "sudo rmdir /data/shop/.deploy.lock");
    assert!(commands.iter().any(|c| c == "rm -rf /tmp/deckhand.k2j3"));
}

#[test]
fn upload_refuses_while_locked() {
    let host = ScriptedHost::new().on(
        &format!("mkdir {}", LOCK_DIR),
        CommandOutput::failure(1, "mkdir: cannot create directory: File exists"),
    );
    let ctx = DeployContext::new(shop(), Settings::default(), &host);

    let err = release::upload(&ctx, &FixedRepo, None).unwrap_err();

    assert_eq!(err.code, ErrorCode::DeployLocked);
    assert_eq!(err.retryable, Some(true));
    assert!(host.position("mktemp").is_none());
    assert!(host.position(&format!("rmdir {}", LOCK_DIR)).is_none());
}

#[test]
fn activate_switches_symlink_and_reports_previous() {
    let host = ScriptedHost::new()
        .on("readlink", CommandOutput::ok("releases/20130101-000000-aaaa1111\n"));
    let ctx = DeployContext::new(shop(), Settings::default(), &host);

    let outcome = release::activate(&ctx, "20130115-093000-0123abcd").unwrap();

    assert_eq!(outcome.link, "/data/shop/shop");
    assert_eq!(
        outcome.previous.map(|id| id.to_string()).as_deref(),
        Some("20130101-000000-aaaa1111")
    );
    assert!(host
        .commands()
        .iter()
        .any(|c| c == "cd '/data/shop' && sudo ln -nsf releases/20130115-093000-0123abcd shop"));
}

#[test]
fn activate_unknown_release_lists_available() {
    let host = ScriptedHost::new()
        .missing("test -d /data/shop/releases/20991231-000000-00000000")
        .on("ls -1", listing(&["20130101-000000-aaaa1111"]));
    let ctx = DeployContext::new(shop(), Settings::default(), &host);

    let err = release::activate(&ctx, "20991231-000000-00000000").unwrap_err();

    assert_eq!(err.code, ErrorCode::ReleaseNotFound);
    assert!(host.position("ln -nsf").is_none());
}

#[test]
fn cleanup_never_removes_live_release() {
    let ids = [
        "20130101-000000-aaaa1111",
        "20130102-000000-aaaa2222",
        "20130103-000000-aaaa3333",
        "20130104-000000-aaaa4444",
        "20130105-000000-aaaa5555",
        "20130106-000000-aaaa6666",
        "20130107-000000-aaaa7777",
    ];
    let host = ScriptedHost::new()
        .on("ls -1", listing(&ids))
        .on("readlink", CommandOutput::ok("releases/20130101-000000-aaaa1111"));
    let ctx = DeployContext::new(shop(), Settings::default(), &host);

    let outcome = release::cleanup(&ctx, None).unwrap();

    assert_eq!(outcome.keep, 5);
    let removed: Vec<String> = outcome.removed.iter().map(|id| id.to_string()).collect();
    assert_eq!(removed, vec!["20130102-000000-aaaa2222".to_string()]);
    assert_eq!(outcome.kept.len(), 6);
    assert!(host
        .commands()
        .iter()
        .any(|c| c == "sudo rm -rf /data/shop/releases/20130102-000000-aaaa2222"));
}
