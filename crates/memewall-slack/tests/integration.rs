// ABOUTME: Integration tests for memewall-slack.
// ABOUTME: Exercises the command handler against a real router and a temp store.

use memewall_core::{
    ArtifactStore, AuthError, ChatAllowList, Command, CommandRouter, HostPower, Ingestor,
    PowerAction, RendererCommand, Result, Supervisor, Wall,
};
use memewall_slack::format::render_reply;
use memewall_slack::CommandHandler;
use std::sync::Arc;
use tempfile::TempDir;

struct NoPower;

#[async_trait::async_trait]
impl HostPower for NoPower {
    async fn execute(&self, _action: PowerAction) -> Result<()> {
        Ok(())
    }
}

fn handler(dir: &TempDir, channels: Vec<String>, users: Vec<String>) -> CommandHandler {
    let store = ArtifactStore::open(dir.path()).unwrap();
    let supervisor = Supervisor::new(store.clone(), RendererCommand::new("true", vec![]));
    let router = Arc::new(CommandRouter::with_prefix("/memewall"));
    router
        .initialize(Arc::new(Wall::new(
            Ingestor::new(store),
            supervisor,
            Arc::new(NoPower),
            None,
        )))
        .unwrap();

    CommandHandler::new(
        router,
        Arc::new(ChatAllowList::new(channels, users)),
        "/memewall",
    )
}

// ============================================================================
// Message Parsing Tests
// ============================================================================

#[test]
fn test_parse_message_requires_prefix() {
    let dir = TempDir::new().unwrap();
    let handler = handler(&dir, vec![], vec![]);

    assert_eq!(
        handler.parse_message("/memewall show cat.png"),
        Some(Command::Show("cat.png".to_string()))
    );
    assert_eq!(handler.parse_message("  /memewall  "), Some(Command::Help));
    assert_eq!(handler.parse_message("nice meme"), None);
}

#[test]
fn test_message_url_is_unwrapped() {
    let dir = TempDir::new().unwrap();
    let handler = handler(&dir, vec![], vec![]);

    assert_eq!(
        handler.parse_message("/memewall url <https://example.com/a.png> a.png"),
        Some(Command::Url {
            url: "https://example.com/a.png".to_string(),
            filename: "a.png".to_string(),
        })
    );
    assert_eq!(
        handler.parse_message("/memewall url <https://example.com/a.png|example.com/a.png> a.png"),
        Some(Command::Url {
            url: "https://example.com/a.png".to_string(),
            filename: "a.png".to_string(),
        })
    );
}

#[test]
fn test_slash_text_entities_are_decoded() {
    let dir = TempDir::new().unwrap();
    let handler = handler(&dir, vec![], vec![]);

    assert_eq!(
        handler.parse_slash_text("url https://example.com/a.png?x=1&amp;y=2 a.png"),
        Command::Url {
            url: "https://example.com/a.png?x=1&y=2".to_string(),
            filename: "a.png".to_string(),
        }
    );
    assert_eq!(
        handler.parse_slash_text("url <https://example.com/a.png> a.png"),
        Command::Url {
            url: "https://example.com/a.png".to_string(),
            filename: "a.png".to_string(),
        }
    );
}

#[tokio::test]
async fn test_message_url_reaches_the_ingestor() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("a.png"), b"x").unwrap();
    let handler = handler(&dir, vec![], vec![]);

    // Existing names are rejected before any network access.
    let command = handler
        .parse_message("/memewall url <https://example.com/b.png> a.png")
        .unwrap();
    let messages = handler.handle("U1", "C1", command).await.unwrap();
    assert_eq!(messages, vec!["File a.png already exists".to_string()]);

    let command = handler
        .parse_message("/memewall url <ftp://example.com/b.png> b.png")
        .unwrap();
    let messages = handler.handle("U1", "C1", command).await.unwrap();
    assert_eq!(messages, vec!["Invalid url ftp://example.com/b.png".to_string()]);
}

// ============================================================================
// Handler Tests
// ============================================================================

#[tokio::test]
async fn test_list_renders_bullets() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("cat.png"), b"x").unwrap();
    std::fs::write(dir.path().join("dog.gif"), b"x").unwrap();
    let handler = handler(&dir, vec![], vec![]);

    let messages = handler
        .handle("U1", "C1", Command::Preview("dog.gif".to_string()))
        .await
        .unwrap();
    assert_eq!(
        messages,
        vec!["*Available memes*\n• `cat.png`\n• *dog.gif* :point_left:".to_string()]
    );
}

#[tokio::test]
async fn test_unknown_command_sends_two_messages() {
    let dir = TempDir::new().unwrap();
    let handler = handler(&dir, vec![], vec![]);

    let messages = handler
        .handle("U1", "C1", Command::parse("dance"))
        .await
        .unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0], "Unknown command dance");
    assert!(messages[1].contains("/memewall show [image_name]"));
}

#[tokio::test]
async fn test_allow_lists() {
    let dir = TempDir::new().unwrap();
    let handler = handler(&dir, vec!["C1".to_string()], vec!["U1".to_string()]);

    assert!(handler.handle("U1", "C1", Command::Help).await.is_ok());
    assert_eq!(
        handler.handle("U1", "C2", Command::Help).await.unwrap_err(),
        AuthError::ChannelNotAllowed("C2".to_string())
    );
    assert_eq!(
        handler.handle("U2", "C1", Command::Help).await.unwrap_err(),
        AuthError::UserNotAllowed("U2".to_string())
    );
}

#[tokio::test]
async fn test_missing_argument_reply() {
    let dir = TempDir::new().unwrap();
    let handler = handler(&dir, vec![], vec![]);

    let messages = handler
        .handle("U1", "C1", Command::parse("url"))
        .await
        .unwrap();
    assert_eq!(messages, vec!["No url specified".to_string()]);
}

#[test]
fn test_render_reply_is_one_message_per_entry() {
    let reply = memewall_core::Reply::text("a").push_text("b");
    assert_eq!(render_reply(&reply).len(), 2);
}
