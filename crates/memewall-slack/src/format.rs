// ABOUTME: Renders router replies as Slack mrkdwn text.
// ABOUTME: Selections become bullet lists with the highlighted entry in bold.

use memewall_core::{Reply, ReplyMessage};

/// One Slack message per reply message.
pub fn render_reply(reply: &Reply) -> Vec<String> {
    reply.messages.iter().map(render_message).collect()
}

pub fn render_message(message: &ReplyMessage) -> String {
    match message {
        ReplyMessage::Text(text) => text.clone(),
        ReplyMessage::Selection {
            title,
            items,
            highlighted,
        } => {
            let mut out = format!("*{}*", title);
            for item in items {
                if highlighted.as_deref() == Some(item.as_str()) {
                    out.push_str(&format!("\n• *{}* :point_left:", item));
                } else {
                    out.push_str(&format!("\n• `{}`", item));
                }
            }
            out
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_passes_through() {
        let reply = Reply::text("Meme successful updated").push_text("second");
        assert_eq!(
            render_reply(&reply),
            vec!["Meme successful updated".to_string(), "second".to_string()]
        );
    }

    #[test]
    fn test_selection_highlight() {
        let message = ReplyMessage::Selection {
            title: "Available memes".to_string(),
            items: vec!["a.gif".to_string(), "b.png".to_string()],
            highlighted: Some("b.png".to_string()),
        };
        assert_eq!(
            render_message(&message),
            "*Available memes*\n• `a.gif`\n• *b.png* :point_left:"
        );
    }
}
