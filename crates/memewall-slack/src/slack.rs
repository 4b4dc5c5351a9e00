// ABOUTME: Slack client wrapper using slack-morphism.
// ABOUTME: Authenticates the bot token, posts replies and decodes Slack message markup.

use crate::error::{BridgeError, Result};
use memewall_core::config::SlackConfig;
use slack_morphism::prelude::*;
use std::sync::Arc;
use tracing::{debug, info};

/// Slack Web API client bound to the bot token.
pub struct WallSlackClient {
    client: Arc<SlackHyperClient>,
    bot_token: SlackApiToken,
    bot_user_id: SlackUserId,
}

impl WallSlackClient {
    /// Create the client and verify the bot token.
    pub async fn new(config: &SlackConfig) -> Result<Self> {
        info!("Initializing Slack client");

        let connector = SlackClientHyperConnector::new()
            .map_err(|e| BridgeError::Slack(format!("Failed to create Slack connector: {}", e)))?;
        let client = Arc::new(slack_morphism::SlackClient::new(connector));

        let bot_token_value: SlackApiTokenValue = config.bot_token.clone().into();
        let bot_token = SlackApiToken::new(bot_token_value);

        let session = client.open_session(&bot_token);
        let auth_response = session
            .auth_test()
            .await
            .map_err(|e| BridgeError::Slack(format!("Auth test failed: {}", e)))?;

        let bot_user_id = auth_response.user_id;
        info!(bot_user_id = %bot_user_id, "Slack authentication successful");

        Ok(Self {
            client,
            bot_token,
            bot_user_id,
        })
    }

    pub fn bot_user_id(&self) -> &SlackUserId {
        &self.bot_user_id
    }

    /// Post a message to a channel, in a thread when `thread_ts` is given.
    pub async fn post_message(
        &self,
        channel_id: &str,
        text: &str,
        thread_ts: Option<&str>,
    ) -> Result<SlackTs> {
        debug!(channel_id = %channel_id, thread_ts = ?thread_ts, "Posting message to Slack");

        let session = self.client.open_session(&self.bot_token);

        let mut request = SlackApiChatPostMessageRequest::new(
            SlackChannelId::new(channel_id.to_string()),
            SlackMessageContent::new().with_text(text.to_string()),
        );

        if let Some(ts) = thread_ts {
            request = request.with_thread_ts(SlackTs::new(ts.to_string()));
        }

        let response = session.chat_post_message(&request).await?;

        debug!(message_ts = %response.ts, "Message posted");
        Ok(response.ts)
    }
}

/// The parts of a channel message the bridge cares about.
#[derive(Debug, Clone)]
pub struct SlackMessageInfo {
    pub channel_id: String,
    pub user_id: String,
    pub text: String,
    pub message_ts: String,
    pub thread_ts: Option<String>,
}

impl SlackMessageInfo {
    /// None for events without a channel, user or text (edits, bot posts, joins).
    pub fn from_message_event(event: &SlackMessageEvent) -> Option<Self> {
        Some(Self {
            channel_id: event.origin.channel.as_ref()?.to_string(),
            user_id: event.sender.user.as_ref()?.to_string(),
            text: event.content.as_ref()?.text.as_ref()?.clone(),
            message_ts: event.origin.ts.to_string(),
            thread_ts: event.origin.thread_ts.as_ref().map(|ts| ts.to_string()),
        })
    }

    /// Thread to reply in: the existing thread, a new one under this message, or none.
    pub fn reply_thread_ts(&self, force_thread: bool) -> Option<String> {
        if let Some(ref ts) = self.thread_ts {
            Some(ts.clone())
        } else if force_thread {
            Some(self.message_ts.clone())
        } else {
            None
        }
    }
}

/// Turn Slack-formatted text back into what the user typed.
///
/// Links arrive as `<url>` or `<url|label>` and `&`, `<`, `>` as HTML
/// entities. Mentions and channel references (`<@U1>`, `<#C1|general>`,
/// `<!here>`) are kept verbatim.
pub fn decode_markup(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(start) = rest.find('<') {
        out.push_str(&unescape(&rest[..start]));
        let Some(len) = rest[start..].find('>') else {
            rest = &rest[start..];
            break;
        };
        let inner = &rest[start + 1..start + len];
        if inner.starts_with(['@', '#', '!']) {
            out.push_str(&rest[start..=start + len]);
        } else {
            let target = inner.split_once('|').map_or(inner, |(target, _)| target);
            out.push_str(&unescape(target));
        }
        rest = &rest[start + len + 1..];
    }
    out.push_str(&unescape(rest));
    out
}

fn unescape(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_links() {
        assert_eq!(
            decode_markup("/memewall url <https://example.com/a.png> a.png"),
            "/memewall url https://example.com/a.png a.png"
        );
        assert_eq!(
            decode_markup("url <https://example.com/a.png|example.com/a.png> a.png"),
            "url https://example.com/a.png a.png"
        );
        assert_eq!(
            decode_markup("url <https://x.test/a.png?x=1&amp;y=2> a.png"),
            "url https://x.test/a.png?x=1&y=2 a.png"
        );
    }

    #[test]
    fn test_decode_entities_and_mentions() {
        assert_eq!(
            decode_markup("url https://x.test/a.png?x=1&amp;y=2 a.png"),
            "url https://x.test/a.png?x=1&y=2 a.png"
        );
        assert_eq!(decode_markup("a &lt;b&gt; &amp;lt;"), "a <b> &lt;");
        assert_eq!(decode_markup("hi <@U123> in <#C1|general>"), "hi <@U123> in <#C1|general>");
        assert_eq!(decode_markup("dangling <https://x"), "dangling <https://x");
        assert_eq!(decode_markup("/memewall list"), "/memewall list");
    }

    fn info(thread_ts: Option<&str>) -> SlackMessageInfo {
        SlackMessageInfo {
            channel_id: "C1".to_string(),
            user_id: "U1".to_string(),
            text: "/memewall list".to_string(),
            message_ts: "111.222".to_string(),
            thread_ts: thread_ts.map(str::to_string),
        }
    }

    #[test]
    fn test_reply_thread_ts() {
        assert_eq!(info(None).reply_thread_ts(false), None);
        assert_eq!(
            info(None).reply_thread_ts(true).as_deref(),
            Some("111.222")
        );
        assert_eq!(
            info(Some("100.000")).reply_thread_ts(false).as_deref(),
            Some("100.000")
        );
    }
}
