//! Process supervision contract.
//!
//! The service manager restarts dronecot whenever it exits, except with
//! [`EXIT_CONFIG`]: a broken configuration stays broken across restarts.

use std::path::{Path, PathBuf};

use crate::error::Error;

/// Exit status for configuration errors (`EX_USAGE`).
pub const EXIT_CONFIG: u8 = 64;

/// Exit status for runtime failures.
pub const EXIT_FAILURE: u8 = 1;

/// systemd unit template; `{{exec}}` and `{{config}}` are substituted.
pub const UNIT_TEMPLATE: &str = include_str!("../contrib/dronecot.service");

/// Exit status for an error.
#[must_use]
pub fn exit_code_for(err: &Error) -> u8 {
    if err.is_config_error() {
        EXIT_CONFIG
    } else {
        EXIT_FAILURE
    }
}

fn absolute(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

/// Render the unit for an executable and config file.
#[must_use]
pub fn render_unit(exec: &Path, config: &Path) -> String {
    UNIT_TEMPLATE
        .replace("{{exec}}", &absolute(exec).display().to_string())
        .replace("{{config}}", &absolute(config).display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(exit_code_for(&Error::config("bad")), 64);
        assert_eq!(exit_code_for(&Error::pref_package("x.zip", "bad")), 64);
        assert_eq!(exit_code_for(&Error::mqtt("gone")), 1);
        assert_eq!(exit_code_for(&Error::QueueClosed("tx")), 1);
    }

    #[test]
    fn test_unit_template_policy() {
        for line in [
            "Restart=always",
            "RestartSec=30",
            "RestartPreventExitStatus=64",
            "Nice=-5",
            "After=network-online.target",
            "Wants=network-online.target",
        ] {
            assert!(UNIT_TEMPLATE.lines().any(|l| l == line), "{line}");
        }
    }

    #[test]
    fn test_render_unit() {
        let unit = render_unit(
            Path::new("/usr/local/bin/dronecot"),
            Path::new("/etc/dronecot/config.ini"),
        );
        assert!(unit.contains("ExecStart=/usr/local/bin/dronecot -c /etc/dronecot/config.ini"));
        assert!(!unit.contains("{{"));
    }

    #[test]
    fn test_render_unit_absolutizes_config() {
        let unit = render_unit(Path::new("/usr/bin/dronecot"), Path::new("config.ini"));
        let exec = unit
            .lines()
            .find(|line| line.starts_with("ExecStart="))
            .unwrap();
        assert!(exec.ends_with("/config.ini"));
        assert!(exec.contains(" -c /"));
    }
}
