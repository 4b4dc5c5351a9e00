// ABOUTME: Auth gate deciding which callers may drive the wall.
// ABOUTME: Shared-token check for HTTP and channel/user allow-lists for chat.

use crate::config::SlackConfig;
use std::fmt;
use subtle::ConstantTimeEq;
use thiserror::Error;

/// Which front-end a request arrived through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Surface {
    Http,
    Chat,
}

/// Authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub subject: String,
    pub surface: Surface,
}

impl Identity {
    pub fn http(subject: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            surface: Surface::Http,
        }
    }

    pub fn chat(subject: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            surface: Surface::Chat,
        }
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.surface {
            Surface::Http => write!(f, "http:{}", self.subject),
            Surface::Chat => write!(f, "chat:{}", self.subject),
        }
    }
}

/// What a caller presented.
#[derive(Debug, Clone)]
pub enum Credential<'a> {
    /// Raw `Authorization` header value, if any.
    Bearer(Option<&'a str>),
    Chat {
        user_id: &'a str,
        channel_id: &'a str,
    },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("No token provided")]
    TokenNotProvided,
    #[error("Wrong token")]
    WrongToken,
    #[error("Channel {0} is not allowed")]
    ChannelNotAllowed(String),
    #[error("User {0} is not allowed")]
    UserNotAllowed(String),
    #[error("Credential not supported by this gate")]
    Unsupported,
}

impl AuthError {
    pub fn message_code(&self) -> &'static str {
        match self {
            AuthError::TokenNotProvided => "W_TOKEN_NOT_PROVIDED",
            AuthError::WrongToken => "W_TOKEN_WRONG",
            _ => "W_NOT_ALLOWED",
        }
    }

    pub fn status_code(&self) -> u16 {
        match self {
            AuthError::TokenNotProvided => 400,
            AuthError::WrongToken => 401,
            _ => 403,
        }
    }
}

/// Allow/deny predicate consumed by the front-ends before routing a command.
pub trait AuthGate: Send + Sync {
    fn authorize(&self, credential: &Credential<'_>) -> Result<Identity, AuthError>;
}

/// Shared-secret check for the HTTP surface. With no token configured every
/// request is let through.
#[derive(Clone)]
pub struct TokenGate {
    token: Option<String>,
}

impl TokenGate {
    pub fn new(token: Option<String>) -> Self {
        Self {
            token: token.filter(|t| !t.is_empty()),
        }
    }

    pub fn is_open(&self) -> bool {
        self.token.is_none()
    }
}

impl fmt::Debug for TokenGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenGate")
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl AuthGate for TokenGate {
    fn authorize(&self, credential: &Credential<'_>) -> Result<Identity, AuthError> {
        let Credential::Bearer(header) = credential else {
            return Err(AuthError::Unsupported);
        };
        let Some(expected) = &self.token else {
            return Ok(Identity::http("anonymous"));
        };

        let presented = header
            .map(bearer_value)
            .filter(|h| !h.is_empty())
            .ok_or(AuthError::TokenNotProvided)?;

        if bool::from(presented.as_bytes().ct_eq(expected.as_bytes())) {
            Ok(Identity::http("token"))
        } else {
            Err(AuthError::WrongToken)
        }
    }
}

/// Channel and user allow-lists for the chat surface (empty list = allow all).
#[derive(Debug, Clone, Default)]
pub struct ChatAllowList {
    channels: Vec<String>,
    users: Vec<String>,
}

impl ChatAllowList {
    pub fn new(channels: Vec<String>, users: Vec<String>) -> Self {
        Self { channels, users }
    }

    pub fn from_config(config: &SlackConfig) -> Self {
        Self::new(config.allowed_channels.clone(), config.allowed_users.clone())
    }
}

impl AuthGate for ChatAllowList {
    fn authorize(&self, credential: &Credential<'_>) -> Result<Identity, AuthError> {
        let Credential::Chat {
            user_id,
            channel_id,
        } = credential
        else {
            return Err(AuthError::Unsupported);
        };

        if !self.channels.is_empty() && !self.channels.iter().any(|c| c == channel_id) {
            return Err(AuthError::ChannelNotAllowed(channel_id.to_string()));
        }
        if !self.users.is_empty() && !self.users.iter().any(|u| u == user_id) {
            return Err(AuthError::UserNotAllowed(user_id.to_string()));
        }
        Ok(Identity::chat(*user_id))
    }
}

/// Value of an `Authorization` header, with or without the `Bearer` scheme.
fn bearer_value(header: &str) -> &str {
    let header = header.trim();
    match header.split_once(char::is_whitespace) {
        Some((scheme, rest)) if scheme.eq_ignore_ascii_case("bearer") => rest.trim(),
        None if header.eq_ignore_ascii_case("bearer") => "",
        _ => header,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_gate_accepts_bearer_and_raw() {
        let gate = TokenGate::new(Some("s3cret".to_string()));
        assert!(gate.authorize(&Credential::Bearer(Some("Bearer s3cret"))).is_ok());
        assert!(gate.authorize(&Credential::Bearer(Some("s3cret"))).is_ok());
    }

    #[test]
    fn test_token_gate_rejections() {
        let gate = TokenGate::new(Some("s3cret".to_string()));
        assert_eq!(
            gate.authorize(&Credential::Bearer(None)),
            Err(AuthError::TokenNotProvided)
        );
        assert_eq!(
            gate.authorize(&Credential::Bearer(Some("Bearer "))),
            Err(AuthError::TokenNotProvided)
        );
        assert_eq!(
            gate.authorize(&Credential::Bearer(Some("Bearer nope"))),
            Err(AuthError::WrongToken)
        );
        assert_eq!(
            gate.authorize(&Credential::Bearer(Some("s3cre"))),
            Err(AuthError::WrongToken)
        );
    }

    #[test]
    fn test_bare_bearer_scheme_is_missing_token() {
        let gate = TokenGate::new(Some("s3cret".to_string()));
        for header in ["Bearer", "Bearer ", "  bearer   ", "Bearer\t"] {
            assert_eq!(
                gate.authorize(&Credential::Bearer(Some(header))),
                Err(AuthError::TokenNotProvided),
                "header {header:?}"
            );
        }
        assert!(gate
            .authorize(&Credential::Bearer(Some("bearer   s3cret ")))
            .is_ok());
    }

    #[test]
    fn test_open_gate() {
        let gate = TokenGate::new(Some(String::new()));
        assert!(gate.is_open());
        assert!(gate.authorize(&Credential::Bearer(None)).is_ok());
    }

    #[test]
    fn test_chat_allow_list() {
        let gate = ChatAllowList::new(vec!["C1".into()], vec![]);
        let ok = gate
            .authorize(&Credential::Chat {
                user_id: "U1",
                channel_id: "C1",
            })
            .unwrap();
        assert_eq!(ok, Identity::chat("U1"));
        assert_eq!(
            gate.authorize(&Credential::Chat {
                user_id: "U1",
                channel_id: "C2",
            }),
            Err(AuthError::ChannelNotAllowed("C2".into()))
        );
        assert_eq!(
            gate.authorize(&Credential::Bearer(None)),
            Err(AuthError::Unsupported)
        );
    }
}
