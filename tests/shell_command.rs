use deckhand::shell::ShellCommand;
use deckhand::ErrorCode;

#[test]
fn build_line_runs_in_source_directory() {
    let line = ShellCommand::new("./configure")
        .args(["--prefix=/opt/nginx/1.2.6", "--with-http_stub_status_module"])
        .and("make")
        .and("make")
        .arg("install")
        .elevated(true)
        .in_dir("/tmp/deckhand.x1/nginx-1.2.6")
        .render()
        .unwrap();

    assert_eq!(
        line,
        "cd '/tmp/deckhand.x1/nginx-1.2.6' && ./configure --prefix=/opt/nginx/1.2.6 \
         --with-http_stub_status_module && make && sudo make install"
    );
}

#[test]
fn arguments_with_metacharacters_are_quoted() {
    let line = ShellCommand::new("echo")
        .arg("deb http://downloads-distro.mongodb.org/repo/ubuntu-upstart dist 10gen")
        .pipe("tee")
        .elevated(true)
        .arg("/etc/apt/sources.list.d/10gen.list")
        .stdout_to("/dev/null")
        .render()
        .unwrap();

    assert_eq!(
        line,
        "echo 'deb http://downloads-distro.mongodb.org/repo/ubuntu-upstart dist 10gen' \
         | sudo tee /etc/apt/sources.list.d/10gen.list > '/dev/null'"
    );
}

#[test]
fn injected_program_name_is_rejected() {
    let err = ShellCommand::new("rm -rf /").render().unwrap_err();
    assert_eq!(err.code, ErrorCode::ValidationInvalidArgument);
}

#[test]
fn nul_in_argument_is_rejected() {
    let err = ShellCommand::new("echo").arg("a\0b").render().unwrap_err();
    assert_eq!(err.code, ErrorCode::ValidationInvalidArgument);
}
