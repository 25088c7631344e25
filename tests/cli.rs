use assert_cmd::Command;
use predicates::prelude::*;
use std::fs::write;
use tempfile::{tempdir, NamedTempFile};

fn corebox() -> Command {
    let mut cmd = Command::cargo_bin("corebox").expect("Binary exists");
    cmd.env_remove("PORTAL_API_KEY")
        .env_remove("PORTAL_USERNAME")
        .env_remove("PORTAL_PASSWORD");
    cmd
}

#[test]
fn help_lists_every_subcommand() {
    corebox()
        .arg("--help")
        .assert()
        .success()
        .stdout(
            predicate::str::contains("upload")
                .and(predicate::str::contains("list"))
                .and(predicate::str::contains("export-rows"))
                .and(predicate::str::contains("process")),
        );
}

#[test]
fn upload_requires_manifest_argument() {
    corebox()
        .args(["upload", "--config", "config.yaml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--manifest"));
}

#[test]
fn missing_config_file_fails_with_message() {
    corebox()
        .args(["list", "--config", "/definitely/not/here.yaml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to read config file"));
}

#[test]
fn missing_credentials_fail_before_any_request() {
    let dir = tempdir().unwrap();
    let config = NamedTempFile::new().unwrap();
    write(
        config.path(),
        format!(
            "api_endpoint: http://127.0.0.1:9/api\nproject_id: 1\nprospect_id: 2\noutput_dir: {}\n",
            dir.path().display()
        ),
    )
    .unwrap();

    corebox()
        .current_dir(dir.path())
        .args(["export-rows", "--config"])
        .arg(config.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("PORTAL_API_KEY"));
}

#[test]
fn process_without_workflow_id_fails() {
    let dir = tempdir().unwrap();
    let config = NamedTempFile::new().unwrap();
    write(
        config.path(),
        format!(
            "api_endpoint: http://127.0.0.1:9/api\nproject_id: 1\nprospect_id: 2\noutput_dir: {}\n",
            dir.path().display()
        ),
    )
    .unwrap();

    corebox()
        .current_dir(dir.path())
        .env("PORTAL_API_KEY", "k")
        .args(["process", "--config"])
        .arg(config.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("workflow"));
}
