// ABOUTME: Command router shared by the HTTP and chat front-ends.
// ABOUTME: Maps parsed commands onto the store, ingestor, supervisor and host power.

use crate::command::{Command, MissingArg, Request};
use crate::config::Config;
use crate::error::{Result, WallError};
use crate::ingest::Ingestor;
use crate::power::{HostPower, PowerAction, SystemPower};
use crate::store::{Artifact, ArtifactStore};
use crate::supervisor::{Activation, StopOutcome, Supervisor};
use std::sync::{Arc, OnceLock};
use subtle::ConstantTimeEq;
use tracing::{info, warn};

pub const DEFAULT_PREFIX: &str = "/memewall";

/// Everything a command can act on, built once per service.
pub struct Wall {
    store: ArtifactStore,
    ingestor: Ingestor,
    supervisor: Supervisor,
    power: Arc<dyn HostPower>,
    admin_password: Option<String>,
}

impl Wall {
    pub fn new(
        ingestor: Ingestor,
        supervisor: Supervisor,
        power: Arc<dyn HostPower>,
        admin_password: Option<String>,
    ) -> Self {
        Self {
            store: ingestor.store().clone(),
            ingestor,
            supervisor,
            power,
            admin_password: admin_password.filter(|p| !p.is_empty()),
        }
    }

    /// Open the store and wire up the collaborators described by `config`.
    pub fn from_config(config: &Config) -> Result<Self> {
        let store = ArtifactStore::open(&config.wall.image_folder)?;
        let ingestor = Ingestor::new(store.clone())
            .with_client(config.ingest.http_client()?)
            .with_download_limit(config.ingest.download_limit())
            .with_fetch_timeout(config.ingest.fetch_timeout());
        let supervisor = Supervisor::new(store, config.renderer_command());
        let power = Arc::new(SystemPower::new(config.power.clone()));

        Ok(Self::new(
            ingestor,
            supervisor,
            power,
            config.admin_password().map(str::to_string),
        ))
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    pub fn ingestor(&self) -> &Ingestor {
        &self.ingestor
    }

    pub fn supervisor(&self) -> &Supervisor {
        &self.supervisor
    }
}

/// One message of a reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyMessage {
    Text(String),
    /// Selectable list of artifact names, optionally with one highlighted.
    Selection {
        title: String,
        items: Vec<String>,
        highlighted: Option<String>,
    },
}

/// Ordered messages sent back to the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reply {
    pub messages: Vec<ReplyMessage>,
}

impl Reply {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            messages: vec![ReplyMessage::Text(text.into())],
        }
    }

    pub fn error(error: &WallError) -> Self {
        Self::text(error.user_message())
    }

    pub fn push_text(mut self, text: impl Into<String>) -> Self {
        self.messages.push(ReplyMessage::Text(text.into()));
        self
    }

    /// First text message, convenient for single-message surfaces and tests.
    pub fn first_text(&self) -> Option<&str> {
        self.messages.iter().find_map(|m| match m {
            ReplyMessage::Text(t) => Some(t.as_str()),
            ReplyMessage::Selection { .. } => None,
        })
    }
}

/// Routes requests from every front-end. Usable before the wall is ready:
/// until `initialize` runs, anything touching the wall answers
/// `ServiceNotInitialized`.
pub struct CommandRouter {
    wall: OnceLock<Arc<Wall>>,
    prefix: String,
}

impl Default for CommandRouter {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandRouter {
    pub fn new() -> Self {
        Self::with_prefix(DEFAULT_PREFIX)
    }

    /// Use `prefix` (e.g. the configured slash command) in help texts.
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            wall: OnceLock::new(),
            prefix: prefix.into(),
        }
    }

    /// Attach the wall. Only the first call has an effect.
    pub fn initialize(&self, wall: Arc<Wall>) -> Result<()> {
        self.wall
            .set(wall)
            .map_err(|_| WallError::Config("command router already initialized".into()))
    }

    pub fn is_initialized(&self) -> bool {
        self.wall.get().is_some()
    }

    pub fn wall(&self) -> Result<&Arc<Wall>> {
        self.wall.get().ok_or(WallError::ServiceNotInitialized)
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Activate an existing artifact (HTTP `show`).
    pub async fn show(&self, file_name: &str) -> Result<Activation> {
        let activation = self.wall()?.supervisor.activate(file_name).await?;
        if let Some(pid) = activation.abandoned {
            warn!(pid, artifact = %file_name, "Previous renderer abandoned during show");
        }
        Ok(activation)
    }

    /// Store an uploaded file (HTTP `upload`). The new artifact is not activated.
    pub async fn upload(&self, bytes: &[u8], name: &str, extension: &str) -> Result<Artifact> {
        self.wall()?
            .ingestor
            .ingest_local(bytes, name, extension)
            .await
    }

    /// Run a chat command and produce the reply. Errors never escape: each is
    /// turned into its user-facing message.
    pub async fn dispatch(&self, request: Request) -> Reply {
        let Request { command, actor } = request;
        info!(actor = %actor, command = ?command, "Dispatching command");

        match command {
            Command::Help => Reply::text(self.help_message()),
            Command::Commands => Reply::text(self.commands_message()),
            Command::Missing(arg) => Reply::text(missing_message(arg)),
            Command::Unknown(text) => Reply::text(format!("Unknown command {}", text))
                .push_text(self.commands_message()),
            Command::Url { url, filename } => self.reply(self.url(&url, &filename).await),
            Command::List => self.reply(self.list(None).await),
            Command::Preview(filename) => self.reply(self.list(Some(filename)).await),
            Command::Show(filename) => self
                .reply(self.show(&filename).await.map(|a| activation_reply(&a))),
            Command::Stop => self.reply(self.stop().await),
            Command::Power { action, password } => {
                self.reply(self.power(action, &password, &actor.to_string()).await)
            }
        }
    }

    fn reply(&self, result: Result<Reply>) -> Reply {
        match result {
            Ok(reply) => reply,
            Err(e) => {
                if e.is_user_correctable() {
                    info!(error = %e, "Command rejected");
                } else {
                    warn!(error = %e, "Command failed");
                }
                Reply::error(&e)
            }
        }
    }

    /// Fetch then show, in that order. The renderer is never started on a
    /// half-written file.
    async fn url(&self, url: &str, file_name: &str) -> Result<Reply> {
        let wall = self.wall()?;
        let artifact = wall.ingestor.ingest_from_url(url, file_name).await?;
        let activation = wall.supervisor.activate(&artifact.file_name()).await?;
        Ok(activation_reply(&activation))
    }

    async fn list(&self, highlighted: Option<String>) -> Result<Reply> {
        let wall = self.wall()?;
        if let Some(name) = &highlighted {
            if !wall.store.contains(name) {
                return Err(WallError::ArtifactNotFound(name.clone()));
            }
        }

        let items: Vec<String> = wall
            .store
            .list()
            .await?
            .iter()
            .map(Artifact::file_name)
            .collect();
        if items.is_empty() {
            return Ok(Reply::text("No memes available yet"));
        }

        Ok(Reply {
            messages: vec![ReplyMessage::Selection {
                title: "Available memes".to_string(),
                items,
                highlighted,
            }],
        })
    }

    async fn stop(&self) -> Result<Reply> {
        match self.wall()?.supervisor.stop().await? {
            StopOutcome::Idle => Ok(Reply::text("Meme wall is not running")),
            StopOutcome::Exited { .. } => Ok(Reply::text("Meme wall stopped")),
        }
    }

    async fn power(&self, action: PowerAction, password: &str, actor: &str) -> Result<Reply> {
        let wall = self.wall()?;
        let Some(expected) = wall.admin_password.as_deref() else {
            return Err(WallError::PowerDisabled);
        };
        if !bool::from(password.as_bytes().ct_eq(expected.as_bytes())) {
            warn!(%action, actor, "Power command with wrong password");
            return Ok(Reply::text("Wrong password"));
        }

        warn!(%action, actor, "Power command accepted");
        // The renderer keeps running if the host refuses the command.
        wall.power.execute(action).await?;
        wall.supervisor.shutdown().await;
        Ok(Reply::text(match action {
            PowerAction::Poweroff => "Powering off the meme wall",
            PowerAction::Reboot => "Rebooting the meme wall",
        }))
    }

    fn help_message(&self) -> String {
        format!(
            "To use the Meme Wall you can do following things\n\
             \x20- Use an image url\n\
             \x20- Use an existing meme\n\
             to see all commands enter {} commands\n\n\
             See you later :woman-tipping-hand:",
            self.prefix
        )
    }

    fn commands_message(&self) -> String {
        let p = &self.prefix;
        format!(
            "You can use following command syntax\n\
             \x20- {p} url [url_to_the_image] [name]\n\
             \x20- {p} show [image_name]\n\
             \x20- {p} list\n\
             \x20- {p} preview [image_name]\n\
             \x20- {p} stop\n\
             \x20- {p} poweroff|reboot [password]\n"
        )
    }
}

fn missing_message(arg: MissingArg) -> &'static str {
    match arg {
        MissingArg::Url => "No url specified",
        MissingArg::Filename => "No filename specified",
        MissingArg::Password => "No password specified",
    }
}

fn activation_reply(activation: &Activation) -> Reply {
    let reply = Reply::text("Meme successful updated");
    match activation.abandoned {
        Some(pid) => reply.push_text(format!(
            "Previous renderer (pid {}) did not stop in time and was abandoned",
            pid
        )),
        None => reply,
    }
}
