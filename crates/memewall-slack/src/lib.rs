// ABOUTME: Library root for memewall-slack.
// ABOUTME: Runs the Socket Mode listener and wires Slack events into the bridge.

pub mod bridge;
pub mod error;
pub mod format;
pub mod slack;

pub use bridge::{Bridge, CommandHandler};
pub use error::{BridgeError, Result};
pub use slack::{decode_markup, SlackMessageInfo, WallSlackClient};

use memewall_core::config::SlackConfig;
use memewall_core::CommandRouter;
use slack_morphism::prelude::*;
use std::future::Future;
use std::sync::Arc;
use tracing::{error, info};

/// Error handler for Socket Mode events.
fn socket_mode_error_handler(
    err: Box<dyn std::error::Error + Send + Sync>,
    _client: Arc<SlackHyperClient>,
    _states: SlackClientEventsUserState,
) -> HttpStatusCode {
    error!(error = %err, "Socket Mode error");
    HttpStatusCode::OK
}

/// Run the Slack front-end until `shutdown` completes.
pub async fn run<F>(config: SlackConfig, router: Arc<CommandRouter>, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()>,
{
    info!(command = %config.command, "Slack front-end starting");

    let app_token = SlackApiToken::new(config.app_token.clone().into());
    let bridge = Arc::new(Bridge::new(config, router).await?);

    let client = Arc::new(slack_morphism::SlackClient::new(
        SlackClientHyperConnector::new()?,
    ));

    let listener_environment = Arc::new(
        SlackClientEventsListenerEnvironment::new(client.clone())
            .with_error_handler(socket_mode_error_handler)
            .with_user_state(bridge.clone()),
    );

    let socket_mode_callbacks = SlackSocketModeListenerCallbacks::new()
        .with_push_events(handle_push_event)
        .with_command_events(handle_slash_command);

    let socket_mode_listener = SlackClientSocketModeListener::new(
        &SlackClientSocketModeConfig::new(),
        listener_environment.clone(),
        socket_mode_callbacks,
    );

    info!("Starting Socket Mode listener");
    socket_mode_listener.listen_for(&app_token).await?;

    tokio::select! {
        _ = socket_mode_listener.serve() => {
            info!("Socket Mode listener stopped");
        }
        _ = shutdown => {
            info!("Slack front-end shutting down");
        }
    }

    Ok(())
}

async fn bridge_from_state(states: &SlackClientEventsUserState) -> Option<Arc<Bridge>> {
    let state_guard = states.read().await;
    state_guard.get_user_state::<Arc<Bridge>>().map(Arc::clone)
}

/// Channel messages starting with the command prefix.
async fn handle_push_event(
    event: SlackPushEventCallback,
    _client: Arc<SlackHyperClient>,
    states: SlackClientEventsUserState,
) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let bridge = bridge_from_state(&states)
        .await
        .ok_or("Missing bridge state")?;

    if let SlackEventCallbackBody::Message(msg_event) = event.event {
        if let Some(msg_info) = SlackMessageInfo::from_message_event(&msg_event) {
            tokio::spawn(async move {
                if let Err(e) = bridge.handle_message(msg_info).await {
                    error!(error = %e, "Failed to handle message");
                }
            });
        }
    }

    Ok(())
}

async fn handle_slash_command(
    event: SlackCommandEvent,
    _client: Arc<SlackHyperClient>,
    states: SlackClientEventsUserState,
) -> std::result::Result<SlackCommandEventResponse, Box<dyn std::error::Error + Send + Sync>> {
    let bridge = bridge_from_state(&states)
        .await
        .ok_or("Missing bridge state")?;

    if event.command.0 != bridge.config().command {
        return Ok(SlackCommandEventResponse::new(
            SlackMessageContent::new().with_text("Unknown command".to_string()),
        ));
    }

    let channel_id = event.channel_id.to_string();
    let user_id = event.user_id.to_string();
    let command_text = event.text.clone().unwrap_or_default();

    info!(
        channel_id = %channel_id,
        user_id = %user_id,
        command_text = %command_text,
        "Processing slash command"
    );

    let response_text = bridge
        .handle_slash_command(&user_id, &channel_id, &command_text)
        .await;

    Ok(SlackCommandEventResponse::new(
        SlackMessageContent::new().with_text(response_text),
    ))
}
