// ABOUTME: Privileged host power actions (poweroff, reboot).
// ABOUTME: HostPower trait with a SystemPower implementation running configured commands.

use crate::config::PowerConfig;
use crate::error::{Result, WallError};
use async_trait::async_trait;
use std::fmt;
use tokio::process::Command;
use tracing::{error, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerAction {
    Poweroff,
    Reboot,
}

impl fmt::Display for PowerAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PowerAction::Poweroff => write!(f, "poweroff"),
            PowerAction::Reboot => write!(f, "reboot"),
        }
    }
}

/// Something able to power off or reboot the machine driving the wall.
#[async_trait]
pub trait HostPower: Send + Sync {
    async fn execute(&self, action: PowerAction) -> Result<()>;
}

/// Runs the configured argv for each action. Failures are reported, never retried.
#[derive(Debug, Clone)]
pub struct SystemPower {
    config: PowerConfig,
}

impl SystemPower {
    pub fn new(config: PowerConfig) -> Self {
        Self { config }
    }

    fn argv(&self, action: PowerAction) -> &[String] {
        match action {
            PowerAction::Poweroff => &self.config.poweroff,
            PowerAction::Reboot => &self.config.reboot,
        }
    }
}

#[async_trait]
impl HostPower for SystemPower {
    async fn execute(&self, action: PowerAction) -> Result<()> {
        let Some((program, args)) = self.argv(action).split_first() else {
            return Err(WallError::PowerCommandFailed(format!(
                "no command configured for {}",
                action
            )));
        };

        warn!(%action, program = %program, "Executing host power command");

        let output = Command::new(program)
            .args(args)
            .output()
            .await
            .map_err(|e| WallError::PowerCommandFailed(e.to_string()))?;

        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            error!(%action, status = %output.status, stderr = %stderr, "Host power command failed");
            Err(WallError::PowerCommandFailed(if stderr.is_empty() {
                output.status.to_string()
            } else {
                stderr
            }))
        }
    }
}
