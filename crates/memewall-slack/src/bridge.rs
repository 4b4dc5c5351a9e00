// ABOUTME: Core bridge logic connecting Slack events to the command router.
// ABOUTME: Authorizes the caller, dispatches the parsed command and posts the replies.

use crate::error::Result;
use crate::format::render_reply;
use crate::slack::{decode_markup, SlackMessageInfo, WallSlackClient};
use memewall_core::config::SlackConfig;
use memewall_core::{
    AuthError, AuthGate, ChatAllowList, Command, CommandRouter, Credential, Identity, Request,
};
use std::sync::Arc;
use tracing::{debug, error, info};

pub const DENIED_MESSAGE: &str = "You are not allowed to use the meme wall here";
pub const WORKING_MESSAGE: &str = "Working on it...";

/// Slack-independent half of the bridge: auth, routing and rendering.
#[derive(Clone)]
pub struct CommandHandler {
    router: Arc<CommandRouter>,
    gate: Arc<dyn AuthGate>,
    prefix: String,
}

impl CommandHandler {
    pub fn new(router: Arc<CommandRouter>, gate: Arc<dyn AuthGate>, prefix: impl Into<String>) -> Self {
        Self {
            router,
            gate,
            prefix: prefix.into(),
        }
    }

    pub fn from_config(config: &SlackConfig, router: Arc<CommandRouter>) -> Self {
        Self::new(
            router,
            Arc::new(ChatAllowList::from_config(config)),
            config.command.clone(),
        )
    }

    /// Parse a channel message, None unless it starts with the command prefix.
    pub fn parse_message(&self, text: &str) -> Option<Command> {
        Command::from_message(&self.prefix, &decode_markup(text))
    }

    /// Parse the text that follows a slash command.
    pub fn parse_slash_text(&self, text: &str) -> Command {
        Command::parse(&decode_markup(text))
    }

    pub fn authorize(&self, user_id: &str, channel_id: &str) -> std::result::Result<Identity, AuthError> {
        self.gate.authorize(&Credential::Chat {
            user_id,
            channel_id,
        })
    }

    /// Run an authorized command, returning one Slack message per reply message.
    pub async fn dispatch(&self, actor: Identity, command: Command) -> Vec<String> {
        let reply = self.router.dispatch(Request::new(command, actor)).await;
        render_reply(&reply)
    }

    pub async fn handle(
        &self,
        user_id: &str,
        channel_id: &str,
        command: Command,
    ) -> std::result::Result<Vec<String>, AuthError> {
        let actor = self.authorize(user_id, channel_id)?;
        Ok(self.dispatch(actor, command).await)
    }
}

/// Ties the Slack client to the command handler.
pub struct Bridge {
    config: SlackConfig,
    slack: WallSlackClient,
    handler: CommandHandler,
}

impl Bridge {
    /// Connect to Slack and build the handler over `router`.
    pub async fn new(config: SlackConfig, router: Arc<CommandRouter>) -> Result<Self> {
        info!("Initializing Slack bridge");
        let slack = WallSlackClient::new(&config).await?;
        let handler = CommandHandler::from_config(&config, router);
        Ok(Self {
            config,
            slack,
            handler,
        })
    }

    pub fn config(&self) -> &SlackConfig {
        &self.config
    }

    /// Handle a channel message that may carry a `/memewall ...` command.
    pub async fn handle_message(&self, msg_info: SlackMessageInfo) -> Result<()> {
        if msg_info.user_id == self.slack.bot_user_id().to_string() {
            return Ok(());
        }

        let Some(command) = self.handler.parse_message(&msg_info.text) else {
            return Ok(());
        };

        let actor = match self
            .handler
            .authorize(&msg_info.user_id, &msg_info.channel_id)
        {
            Ok(actor) => actor,
            Err(e) => {
                debug!(channel_id = %msg_info.channel_id, error = %e, "Ignoring command");
                return Ok(());
            }
        };

        info!(
            channel_id = %msg_info.channel_id,
            user_id = %msg_info.user_id,
            "Processing message command"
        );

        let thread_ts = msg_info.reply_thread_ts(self.config.thread_replies);
        for text in self.handler.dispatch(actor, command).await {
            self.slack
                .post_message(&msg_info.channel_id, &text, thread_ts.as_deref())
                .await?;
        }
        Ok(())
    }

    /// Answer a slash command.
    ///
    /// Commands that touch the wall can outlast Slack's acknowledgement window,
    /// so they are acknowledged right away and the result is posted to the
    /// channel once it is known.
    pub async fn handle_slash_command(
        self: &Arc<Self>,
        user_id: &str,
        channel_id: &str,
        text: &str,
    ) -> String {
        let command = self.handler.parse_slash_text(text);

        let actor = match self.handler.authorize(user_id, channel_id) {
            Ok(actor) => actor,
            Err(e) => {
                info!(channel_id, user_id, error = %e, "Slash command denied");
                return DENIED_MESSAGE.to_string();
            }
        };

        if !command.is_mutating() {
            return self.handler.dispatch(actor, command).await.join("\n\n");
        }

        let bridge = Arc::clone(self);
        let channel_id = channel_id.to_string();
        tokio::spawn(async move {
            for text in bridge.handler.dispatch(actor, command).await {
                if let Err(e) = bridge.slack.post_message(&channel_id, &text, None).await {
                    error!(channel_id = %channel_id, error = %e, "Failed to post command result");
                }
            }
        });
        WORKING_MESSAGE.to_string()
    }
}
