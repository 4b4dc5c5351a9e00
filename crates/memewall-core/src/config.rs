// ABOUTME: Configuration loading and validation for memewall.
// ABOUTME: Supports TOML config files with environment variable expansion.

use crate::error::{Result, WallError};
use crate::supervisor::RendererCommand;
use serde::Deserialize;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

/// Default upload/download ceiling, matching the 20mb body limit of the HTTP surface.
pub const DEFAULT_MAX_BYTES: u64 = 20 * 1024 * 1024;

/// Top-level configuration structure.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub wall: WallConfig,
    #[serde(default)]
    pub renderer: RendererConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub power: PowerConfig,
    #[serde(default)]
    pub http: HttpConfig,
    /// Slack front-end; absent means the bridge is not started.
    #[serde(default)]
    pub slack: Option<SlackConfig>,
}

/// Settings owned by the core: where artifacts live and how the wall is driven.
#[derive(Clone, Deserialize)]
pub struct WallConfig {
    /// Flat directory holding every displayable image.
    pub image_folder: PathBuf,
    /// Secret for `poweroff`/`reboot`. Unset or empty disables those commands.
    #[serde(default)]
    pub admin_password: Option<String>,
    #[serde(default)]
    pub mode: RenderMode,
}

impl std::fmt::Debug for WallConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WallConfig")
            .field("image_folder", &self.image_folder)
            .field(
                "admin_password",
                &self.admin_password.as_ref().map(|_| "[REDACTED]"),
            )
            .field("mode", &self.mode)
            .finish()
    }
}

/// Which renderer executable to launch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderMode {
    /// The real rendering command driving the display.
    #[default]
    Production,
    /// A lightweight stand-in that just stays alive (development machines).
    Probe,
}

impl FromStr for RenderMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "production" | "prod" => Ok(RenderMode::Production),
            "probe" | "dev" => Ok(RenderMode::Probe),
            other => Err(format!(
                "unknown render mode '{}' (expected production or probe)",
                other
            )),
        }
    }
}

/// Renderer executables for both modes. The artifact path is appended as the last argument.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    pub program: String,
    pub args: Vec<String>,
    pub probe_program: String,
    pub probe_args: Vec<String>,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            program: "python3".to_string(),
            args: vec!["memewall.py".to_string()],
            probe_program: "ping".to_string(),
            probe_args: vec!["localhost".to_string()],
        }
    }
}

impl RendererConfig {
    /// Resolve the command for the given mode.
    pub fn command(&self, mode: RenderMode) -> RendererCommand {
        match mode {
            RenderMode::Production => RendererCommand::new(&self.program, self.args.clone()),
            RenderMode::Probe => {
                RendererCommand::new(&self.probe_program, self.probe_args.clone())
            }
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Upper bound for remote downloads; `0` disables the limit.
    pub max_download_bytes: u64,
    pub connect_timeout_secs: u64,
    /// Whole-download deadline; `0` disables it.
    pub fetch_timeout_secs: u64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            max_download_bytes: DEFAULT_MAX_BYTES,
            connect_timeout_secs: 10,
            fetch_timeout_secs: 60,
        }
    }
}

impl IngestConfig {
    pub fn download_limit(&self) -> Option<u64> {
        (self.max_download_bytes > 0).then_some(self.max_download_bytes)
    }

    pub fn fetch_timeout(&self) -> Option<Duration> {
        (self.fetch_timeout_secs > 0).then(|| Duration::from_secs(self.fetch_timeout_secs))
    }

    /// HTTP client for URL downloads.
    pub fn http_client(&self) -> Result<reqwest::Client> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(self.connect_timeout_secs.max(1)))
            .build()?;
        Ok(client)
    }
}

/// Host power commands as argv vectors.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PowerConfig {
    pub poweroff: Vec<String>,
    pub reboot: Vec<String>,
}

impl Default for PowerConfig {
    fn default() -> Self {
        Self {
            poweroff: vec!["systemctl".to_string(), "poweroff".to_string()],
            reboot: vec!["systemctl".to_string(), "reboot".to_string()],
        }
    }
}

/// HTTP front-end configuration.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub enabled: bool,
    /// Socket address to listen on (e.g., "0.0.0.0:3000").
    pub bind: String,
    /// Shared secret expected in the Authorization header.
    pub token: Option<String>,
    /// API version path segment (routes live under `/{version}/meme`).
    pub version: String,
    pub max_upload_bytes: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind: "0.0.0.0:3000".to_string(),
            token: None,
            version: "v1".to_string(),
            max_upload_bytes: DEFAULT_MAX_BYTES,
        }
    }
}

impl std::fmt::Debug for HttpConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpConfig")
            .field("enabled", &self.enabled)
            .field("bind", &self.bind)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("version", &self.version)
            .field("max_upload_bytes", &self.max_upload_bytes)
            .finish()
    }
}

/// Slack API credentials and bridge behavior.
#[derive(Clone, Deserialize)]
pub struct SlackConfig {
    /// App-level token (xapp-...) for Socket Mode WebSocket connection.
    pub app_token: String,
    /// Bot token (xoxb-...) for posting messages and API calls.
    pub bot_token: String,
    /// Slash command the bot answers to.
    #[serde(default = "default_slack_command")]
    pub command: String,
    /// List of allowed channel IDs (empty = allow all channels the bot is in).
    #[serde(default)]
    pub allowed_channels: Vec<String>,
    /// List of allowed user IDs (empty = allow everyone in allowed channels).
    #[serde(default)]
    pub allowed_users: Vec<String>,
    /// Reply in a thread under the triggering message.
    #[serde(default = "default_thread_replies")]
    pub thread_replies: bool,
}

fn default_slack_command() -> String {
    "/memewall".to_string()
}

fn default_thread_replies() -> bool {
    true
}

impl std::fmt::Debug for SlackConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlackConfig")
            .field("app_token", &"[REDACTED]")
            .field("bot_token", &"[REDACTED]")
            .field("command", &self.command)
            .field("allowed_channels", &self.allowed_channels)
            .field("allowed_users", &self.allowed_users)
            .field("thread_replies", &self.thread_replies)
            .finish()
    }
}

impl Config {
    /// Default location: `~/.config/memewall/memewall.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("memewall").join("memewall.toml"))
    }

    /// Load configuration from the specified path or default location.
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let path = path
            .or_else(Self::default_path)
            .ok_or_else(|| WallError::Config("Could not determine config path".into()))?;

        let contents = std::fs::read_to_string(&path).map_err(|e| {
            WallError::Config(format!("Failed to read config from {:?}: {}", path, e))
        })?;

        Self::from_toml_str(&contents)
    }

    /// Parse configuration text, expanding `${VAR}` references first.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        // Expand environment variables, warning on undefined vars.
        let contents = shellexpand::env_with_context_no_errors(contents, |var: &str| {
            match std::env::var(var) {
                Ok(val) => Some(val),
                Err(_) => {
                    warn!(
                        variable = %var,
                        "Environment variable not defined, using empty string"
                    );
                    Some(String::new())
                }
            }
        });

        let config: Config = toml::from_str(&contents)
            .map_err(|e| WallError::Config(format!("Failed to parse config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate that required fields are present and properly formatted.
    fn validate(&self) -> Result<()> {
        if self.wall.image_folder.as_os_str().is_empty() {
            return Err(WallError::Config("wall.image_folder is required".into()));
        }
        if self.renderer.program.trim().is_empty() {
            return Err(WallError::Config("renderer.program is required".into()));
        }
        if self.renderer.probe_program.trim().is_empty() {
            return Err(WallError::Config("renderer.probe_program is required".into()));
        }
        if self.power.poweroff.is_empty() || self.power.reboot.is_empty() {
            return Err(WallError::Config(
                "power.poweroff and power.reboot must not be empty".into(),
            ));
        }
        if self.http.enabled && self.http.version.contains('/') {
            return Err(WallError::Config(
                "http.version must be a single path segment".into(),
            ));
        }
        if let Some(slack) = &self.slack {
            if !slack.app_token.starts_with("xapp-") {
                return Err(WallError::Config(
                    "slack.app_token must start with 'xapp-' (app-level token)".into(),
                ));
            }
            if !slack.bot_token.starts_with("xoxb-") {
                return Err(WallError::Config(
                    "slack.bot_token must start with 'xoxb-' (bot token)".into(),
                ));
            }
            if !slack.command.starts_with('/') {
                return Err(WallError::Config(
                    "slack.command must start with '/'".into(),
                ));
            }
        }
        Ok(())
    }

    /// Renderer command for the configured mode.
    pub fn renderer_command(&self) -> RendererCommand {
        self.renderer.command(self.wall.mode)
    }

    /// The admin secret, if power commands are enabled.
    pub fn admin_password(&self) -> Option<&str> {
        self.wall
            .admin_password
            .as_deref()
            .filter(|p| !p.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
[wall]
image_folder = "/srv/memewall"
"#;

    #[test]
    fn test_minimal_config_defaults() {
        let config = Config::from_toml_str(MINIMAL).unwrap();
        assert_eq!(config.wall.mode, RenderMode::Production);
        assert!(config.admin_password().is_none());
        assert_eq!(config.http.version, "v1");
        assert_eq!(config.http.max_upload_bytes, DEFAULT_MAX_BYTES);
        assert!(config.slack.is_none());
        assert_eq!(config.renderer_command().program(), "python3");
    }

    #[test]
    fn test_probe_mode_selects_probe_program() {
        let config = Config::from_toml_str(
            r#"
[wall]
image_folder = "/srv/memewall"
mode = "probe"
"#,
        )
        .unwrap();
        let command = config.renderer_command();
        assert_eq!(command.program(), "ping");
        assert_eq!(command.args(), &["localhost".to_string()]);
    }

    #[test]
    fn test_render_mode_from_str() {
        assert_eq!("dev".parse::<RenderMode>(), Ok(RenderMode::Probe));
        assert_eq!("PRODUCTION".parse::<RenderMode>(), Ok(RenderMode::Production));
        assert!("fast".parse::<RenderMode>().is_err());
    }

    #[test]
    fn test_empty_admin_password_disables_power() {
        let config = Config::from_toml_str(
            r#"
[wall]
image_folder = "/srv/memewall"
admin_password = ""
"#,
        )
        .unwrap();
        assert!(config.admin_password().is_none());
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let config = Config::from_toml_str(
            r#"
[wall]
image_folder = "/srv/memewall"
admin_password = "hunter2"

[http]
token = "secret-token"
"#,
        )
        .unwrap();
        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("hunter2"));
        assert!(!rendered.contains("secret-token"));
    }

    #[test]
    fn test_zero_download_limit_disables_it() {
        let ingest = IngestConfig {
            max_download_bytes: 0,
            ..IngestConfig::default()
        };
        assert_eq!(ingest.download_limit(), None);
        assert_eq!(IngestConfig::default().download_limit(), Some(DEFAULT_MAX_BYTES));
    }

    #[test]
    fn test_fetch_timeout() {
        assert_eq!(
            IngestConfig::default().fetch_timeout(),
            Some(Duration::from_secs(60))
        );
        let ingest = IngestConfig {
            fetch_timeout_secs: 0,
            ..IngestConfig::default()
        };
        assert_eq!(ingest.fetch_timeout(), None);
        assert!(ingest.http_client().is_ok());
    }
}
