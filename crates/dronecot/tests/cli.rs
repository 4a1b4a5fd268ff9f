//! Tests that drive the built `dronecot` binary.

use std::io::Write;
use std::process::{Command, Output};

fn dronecot(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_dronecot"))
        .args(args)
        .env_remove("RUST_LOG")
        .env_remove("PREF_PACKAGE")
        .output()
        .expect("failed to run dronecot")
}

#[test]
fn test_help_exits_zero() {
    let output = dronecot(&["-h"]);
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("-c"));
    assert!(stdout.contains("-p"));
    assert!(stdout.contains("--config-file"));
    assert!(stdout.contains("--pref-package"));
}

#[test]
fn test_version() {
    let output = dronecot(&["-V"]);
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_missing_config_file_is_a_configuration_error() {
    let output = dronecot(&["-c", "/nonexistent/dronecot/config.ini"]);
    assert_eq!(output.status.code(), Some(64));

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("cannot read configuration file"), "{stderr}");
    assert!(stderr.contains("/nonexistent/dronecot/config.ini"), "{stderr}");
}

#[test]
fn test_invalid_config_value_is_a_configuration_error() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "[dronecot]\nCOT_URL = http://tak.example.com:80").unwrap();

    let output = dronecot(&["-c", file.path().to_str().unwrap()]);
    assert_eq!(output.status.code(), Some(64));
    assert!(String::from_utf8_lossy(&output.stderr).contains("COT_URL"));
}

#[test]
fn test_missing_pref_package_is_a_configuration_error() {
    let file = tempfile::NamedTempFile::new().unwrap();
    let output = dronecot(&[
        "-c",
        file.path().to_str().unwrap(),
        "-p",
        "/nonexistent/tak.zip",
    ]);
    assert_eq!(output.status.code(), Some(64));
    assert!(String::from_utf8_lossy(&output.stderr).contains("preference package"));
}

#[test]
fn test_service_unit() {
    let output = dronecot(&["--service-unit", "-c", "/etc/dronecot/config.ini"]);
    assert!(output.status.success());

    let unit = String::from_utf8_lossy(&output.stdout);
    assert!(unit.contains("RestartPreventExitStatus=64"));
    assert!(unit.contains("-c /etc/dronecot/config.ini"));
}
