//! Running the aide binary.

use crate::error::AideError;
use crate::exit::{fips_mode_enabled, AideExit, FIPS_ENABLED_PATH};
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

/// The two aide modes the daemon uses
///
/// Implemented by [`AideCommand`] for real nodes; tests substitute a mock.
/// All async methods must be `Send` to work with Tokio's work-stealing runtime.
#[async_trait::async_trait]
pub trait AideRunner: Send + Sync {
    /// Build a fresh database (`aide -c <config> -i`)
    async fn init(&self) -> Result<AideExit, AideError>;

    /// Compare the file system against the database (`aide -c <config>`)
    async fn check(&self) -> Result<AideExit, AideError>;
}

/// Runs aide as a subprocess
#[derive(Debug, Clone)]
pub struct AideCommand {
    binary: PathBuf,
    config: PathBuf,
    fips_path: PathBuf,
}

impl AideCommand {
    pub fn new(binary: impl Into<PathBuf>, config: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            config: config.into(),
            fips_path: PathBuf::from(FIPS_ENABLED_PATH),
        }
    }

    /// Override where the FIPS switch is read from
    #[must_use]
    pub fn with_fips_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.fips_path = path.into();
        self
    }

    async fn run(&self, init: bool) -> Result<AideExit, AideError> {
        let mut cmd = Command::new(&self.binary);
        cmd.arg("-c").arg(&self.config);
        if init {
            cmd.arg("-i");
        }
        // A cancelled scan must not leave aide holding the database
        cmd.stdin(Stdio::null()).kill_on_drop(true);

        debug!("running {:?}", cmd.as_std());
        let status = cmd.status().await.map_err(AideError::Spawn)?;
        Ok(AideExit::from_status(status.code(), || {
            fips_mode_enabled(&self.fips_path)
        }))
    }
}

#[async_trait::async_trait]
impl AideRunner for AideCommand {
    async fn init(&self) -> Result<AideExit, AideError> {
        self.run(true).await
    }

    async fn check(&self) -> Result<AideExit, AideError> {
        self.run(false).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    fn script(dir: &TempDir, body: &str) -> PathBuf {
        let path = dir.path().join("aide");
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[tokio::test]
    async fn test_init_passes_config_and_init_flag() {
        let dir = TempDir::new().unwrap();
        let args = dir.path().join("args");
        let bin = script(&dir, &format!("echo \"$@\" > {}", args.display()));
        let aide = AideCommand::new(bin, "/tmp/aide.conf");

        assert_eq!(aide.init().await.unwrap(), AideExit::SUCCESS);
        assert_eq!(std::fs::read_to_string(&args).unwrap().trim(), "-c /tmp/aide.conf -i");

        aide.check().await.unwrap();
        assert_eq!(std::fs::read_to_string(&args).unwrap().trim(), "-c /tmp/aide.conf");
    }

    #[tokio::test]
    async fn test_exit_codes_are_reported() {
        let dir = TempDir::new().unwrap();
        let bin = script(&dir, "exit 5");
        let exit = AideCommand::new(bin, "/tmp/aide.conf").check().await.unwrap();
        assert_eq!(exit.code(), 5);
    }

    #[tokio::test]
    async fn test_retfail_consults_fips_switch() {
        let dir = TempDir::new().unwrap();
        let bin = script(&dir, "exit 255");
        let fips = dir.path().join("fips_enabled");
        std::fs::write(&fips, b"1").unwrap();
        let exit = AideCommand::new(bin, "/tmp/aide.conf")
            .with_fips_path(&fips)
            .check()
            .await
            .unwrap();
        assert_eq!(exit.code(), crate::exit::FIPS_ERROR);
    }

    #[tokio::test]
    async fn test_missing_binary_is_a_spawn_error() {
        let aide = AideCommand::new("/nonexistent/aide", "/tmp/aide.conf");
        assert!(matches!(aide.check().await, Err(AideError::Spawn(_))));
    }
}
