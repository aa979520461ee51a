use deckhand::{project, server, CreateOutput, ErrorCode, MergeOutput};

// One test per process: the config dir comes from the environment.
#[test]
fn project_and_server_records_live_in_the_config_dir() {
    let dir = tempfile::tempdir().unwrap();
    std::env::set_var("DECKHAND_CONFIG_DIR", dir.path());

    let web1 = server::create_from_flags(None, "web1.example.com", "deploy", 22, None).unwrap();
    assert_eq!(web1.id, "web1-example-com");
    assert!(dir.path().join("servers/web1-example-com.json").is_file());

    let bulk = r#"[
        {"id": "web2", "host": "10.0.0.2", "user": "deploy"},
        {"id": "web1-example-com", "host": "other", "user": "root"},
        {"host": "anonymous", "user": "deploy"}
    ]"#;
    let CreateOutput::Bulk(batch) = server::create(bulk, true).unwrap() else {
        panic!("array spec should create in bulk");
    };
    assert_eq!((batch.created, batch.skipped, batch.errors), (1, 1, 1));
    assert_eq!(batch.items[2].id, "unknown");
    assert_eq!(server::load("web1-example-com").unwrap().user, "deploy");

    let err = project::create(r#"{"id": "shop", "serverId": "web9"}"#, false).unwrap_err();
    assert_eq!(err.code, ErrorCode::ServerNotFound);
    project::create(r#"{"id": "shop", "serverId": "web2"}"#, false).unwrap();

    let err = server::create(r#"{"id": "shop", "host": "h", "user": "u"}"#, false).unwrap_err();
    assert_eq!(err.code, ErrorCode::ConfigIdCollision);

    let MergeOutput::Single(merged) =
        project::merge(Some("shop"), r#"{"service": "shop-web", "keepReleases": 3}"#).unwrap()
    else {
        panic!("object patch should merge a single record");
    };
    assert_eq!(merged.updated_fields.len(), 2);
    let shop = project::load("shop").unwrap();
    assert_eq!(shop.service.as_deref(), Some("shop-web"));
    assert_eq!(shop.keep_releases, Some(3));

    let err = project::load("shpo").unwrap_err();
    assert_eq!(err.code, ErrorCode::ProjectNotFound);
    assert_eq!(err.details["suggestions"][0], "shop");

    let err = server::delete_safe("web2").unwrap_err();
    assert_eq!(err.code, ErrorCode::ValidationInvalidArgument);

    project::delete("shop").unwrap();
    server::delete_safe("web2").unwrap();
    let ids: Vec<String> = server::list().unwrap().into_iter().map(|s| s.id).collect();
    assert_eq!(ids, vec!["web1-example-com".to_string()]);
}
