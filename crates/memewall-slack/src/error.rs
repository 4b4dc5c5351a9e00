// ABOUTME: Error types for memewall-slack.
// ABOUTME: Defines BridgeError covering Slack connection and Web API failures.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Slack API error: {0}")]
    Slack(String),

    #[error("Slack client error: {0}")]
    SlackClient(#[from] slack_morphism::errors::SlackClientError),
}

pub type Result<T> = std::result::Result<T, BridgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slack_error_display() {
        let err = BridgeError::Slack("Auth test failed: invalid_auth".to_string());
        assert_eq!(err.to_string(), "Slack API error: Auth test failed: invalid_auth");
    }
}
