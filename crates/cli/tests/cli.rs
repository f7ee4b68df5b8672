use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::json;
use tempfile::TempDir;

use certflow_x509::ca::{
    generate_root_ca, issue_intermediate_ca, IntermediateCaParams, RootCaParams,
};
use certflow_x509::certificate::{parse_certificate_pem, split_certificates};

fn cli_command(home: &Path) -> Command {
    let mut command = Command::cargo_bin("certflow").expect("cli bin");
    command
        .env("HOME", home)
        .env_remove("CERTFLOW_PATH")
        .env_remove("CERTFLOW_CA_URL")
        .env_remove("CERTFLOW_ROOT")
        .env_remove("CERTFLOW_LOG")
        .env_remove("RUST_LOG");
    command
}

/// Root and intermediate on disk plus an offline authority configuration.
fn offline_authority(dir: &Path) -> PathBuf {
    let root = generate_root_ca(&RootCaParams::new("CLI Root CA")).expect("root");
    let intermediate = issue_intermediate_ca(&IntermediateCaParams {
        common_name: "CLI Intermediate CA",
        validity_days: 30,
        issuer_cert_pem: &root.certificate_pem,
        issuer_key_pem: &root.private_key_pem,
    })
    .expect("intermediate");

    fs::create_dir_all(dir.join("ca")).expect("ca dir");
    fs::write(dir.join("ca/root_ca.crt"), &root.certificate_pem).expect("root");
    fs::write(dir.join("ca/intermediate_ca.crt"), &intermediate.certificate_pem)
        .expect("intermediate");
    fs::write(dir.join("ca/intermediate_ca_key"), &intermediate.private_key_pem).expect("key");

    let config = dir.join("ca/ca.json");
    let body = json!({
        "root": "root_ca.crt",
        "crt": "intermediate_ca.crt",
        "key": "intermediate_ca_key",
        "address": ":443",
        "dnsNames": ["ca.internal"],
    });
    fs::write(&config, body.to_string()).expect("config");
    config
}

#[test]
fn help_lists_both_commands() {
    let home = TempDir::new().expect("home");
    cli_command(home.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("certificate"))
        .stdout(predicate::str::contains("sign"));
}

#[test]
fn offline_certificate_is_written_with_its_key() {
    let dir = TempDir::new().expect("tempdir");
    let config = offline_authority(dir.path());
    let crt = dir.path().join("out/internal.crt");
    let key = dir.path().join("out/internal.key");

    cli_command(dir.path())
        .arg("certificate")
        .arg("internal.example.com")
        .arg(&crt)
        .arg(&key)
        .arg("--offline")
        .arg("--ca-config")
        .arg(&config)
        .args(["--not-after", "2h"])
        .assert()
        .success()
        .stdout(predicate::str::contains("✔ Certificate:"))
        .stdout(predicate::str::contains("✔ Private Key:"));

    let chain = fs::read_to_string(&crt).expect("chain");
    let blocks = split_certificates(&chain).expect("blocks");
    assert_eq!(blocks.len(), 2);
    let leaf = parse_certificate_pem(&blocks[0]).expect("leaf");
    assert_eq!(leaf.common_name.as_deref(), Some("internal.example.com"));
    assert_eq!(leaf.issuer_common_name.as_deref(), Some("CLI Intermediate CA"));
    assert!(!leaf.is_ca);

    let key_pem = fs::read_to_string(&key).expect("key");
    assert!(key_pem.contains("PRIVATE KEY"));
}

#[test]
fn existing_output_needs_force() {
    let dir = TempDir::new().expect("tempdir");
    let config = offline_authority(dir.path());
    let crt = dir.path().join("taken.crt");
    let key = dir.path().join("taken.key");
    fs::write(&crt, "keep me").expect("seed");

    let run = |force: bool| {
        let mut command = cli_command(dir.path());
        command
            .arg("certificate")
            .arg("svc.internal")
            .arg(&crt)
            .arg(&key)
            .arg("--offline")
            .arg("--ca-config")
            .arg(&config);
        if force {
            command.arg("--force");
        }
        command.assert()
    };

    run(false)
        .failure()
        .stderr(predicate::str::contains("already exists"));
    assert_eq!(fs::read_to_string(&crt).expect("untouched"), "keep me");

    run(true).success();
    assert!(fs::read_to_string(&crt)
        .expect("replaced")
        .contains("BEGIN CERTIFICATE"));
}

#[test]
fn token_and_san_are_rejected_together() {
    let dir = TempDir::new().expect("tempdir");
    cli_command(dir.path())
        .args(["certificate", "foo.example.com"])
        .arg(dir.path().join("foo.crt"))
        .arg(dir.path().join("foo.key"))
        .args(["--token", "a.b.c", "--san", "bar.example.com"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("mutually exclusive"));
    assert!(!dir.path().join("foo.crt").exists());
}

#[test]
fn offline_refuses_a_token() {
    let dir = TempDir::new().expect("tempdir");
    cli_command(dir.path())
        .args(["certificate", "foo.example.com"])
        .arg(dir.path().join("foo.crt"))
        .arg(dir.path().join("foo.key"))
        .args(["--offline", "--token", "a.b.c"])
        .assert()
        .failure()
        .stderr(predicate::str::contains(
            "option '--offline' is incompatible with '--token'",
        ));
}

#[test]
fn offline_without_configuration_fails() {
    let dir = TempDir::new().expect("tempdir");
    cli_command(dir.path())
        .args(["certificate", "foo.example.com"])
        .arg(dir.path().join("foo.crt"))
        .arg(dir.path().join("foo.key"))
        .arg("--offline")
        .assert()
        .failure()
        .stderr(predicate::str::contains("--ca-config"));
}

#[test]
fn missing_authority_url_is_reported() {
    let dir = TempDir::new().expect("tempdir");
    cli_command(dir.path())
        .args(["certificate", "foo.example.com"])
        .arg(dir.path().join("foo.crt"))
        .arg(dir.path().join("foo.key"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("missing required option '--ca-url'"));
}

#[test]
fn sign_rejects_a_file_that_is_not_a_csr() {
    let dir = TempDir::new().expect("tempdir");
    offline_authority(dir.path());
    cli_command(dir.path())
        .arg("sign")
        .arg(dir.path().join("ca/root_ca.crt"))
        .arg(dir.path().join("out.crt"))
        .args(["--token", "a.b.c"])
        .env("CERTFLOW_CA_URL", "https://ca.internal")
        .assert()
        .failure()
        .stderr(predicate::str::contains(
            "file is not a certificate request",
        ));
    assert!(!dir.path().join("out.crt").exists());
}
