use anyhow::Result;
use std::path::Path;

use crate::{ControllerConfig, LinkConfig, RcConfig, MAX_TIMEOUT};

/// The device lands by itself after this long without an `rc` datagram.
const FAILSAFE_S: f64 = 15.0;

pub fn check_config(cfg: &ControllerConfig) -> Result<()> {
    check_link(&cfg.link)?;
    check_log_dir(&cfg.link.log_dir)?;
    check_rc(&cfg.rc)
}

pub fn check_link(cfg: &LinkConfig) -> Result<()> {
    anyhow::ensure!(cfg.device_addr.port() != 0, "link.device_addr needs a port");
    anyhow::ensure!(
        cfg.command_timeout_ms > 0 && cfg.command_timeout() <= MAX_TIMEOUT,
        "link.command_timeout_ms must be in 1..={}",
        MAX_TIMEOUT.as_millis()
    );
    anyhow::ensure!(cfg.handshake_attempts >= 1, "link.handshake_attempts must be >= 1");
    anyhow::ensure!(cfg.queue_capacity >= 1, "link.queue_capacity must be >= 1");
    anyhow::ensure!(
        cfg.command_bind.port() != cfg.telemetry_bind.port() || cfg.command_bind.port() == 0,
        "link.command_bind and link.telemetry_bind share port {}",
        cfg.command_bind.port()
    );
    Ok(())
}

pub fn check_log_dir(dir: &Path) -> Result<()> {
    if dir.exists() {
        anyhow::ensure!(dir.is_dir(), "link.log_dir is not a dir: {}", dir.display());
    }
    Ok(())
}

pub fn check_rc(cfg: &RcConfig) -> Result<()> {
    anyhow::ensure!(
        cfg.tick_s > 0.0 && cfg.tick_s < FAILSAFE_S,
        "rc.tick_s must be in (0, {}) or the device failsafe lands it",
        FAILSAFE_S
    );
    anyhow::ensure!(cfg.vel_timing_s > 0.0, "rc.vel_timing_s must be positive");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_pass() {
        assert!(check_config(&ControllerConfig::default()).is_ok());
    }

    #[test]
    fn rejects_bad_values() {
        let cfg = LinkConfig { command_timeout_ms: 60_000, ..LinkConfig::default() };
        assert!(check_link(&cfg).is_err());

        let cfg = LinkConfig { telemetry_bind: LinkConfig::default().command_bind, ..LinkConfig::default() };
        assert!(check_link(&cfg).is_err());

        assert!(check_rc(&RcConfig { tick_s: 20.0, ..RcConfig::default() }).is_err());
        assert!(check_rc(&RcConfig { vel_timing_s: 0.0, ..RcConfig::default() }).is_err());
    }

    #[test]
    fn log_dir_must_be_dir() {
        let dir = tempfile::tempdir().unwrap();
        assert!(check_log_dir(dir.path()).is_ok());
        assert!(check_log_dir(&dir.path().join("missing")).is_ok());
        let file = dir.path().join("f");
        std::fs::write(&file, b"x").unwrap();
        assert!(check_log_dir(&file).is_err());
    }
}
