// ABOUTME: Error taxonomy for memewall-core.
// ABOUTME: Defines WallError plus the user-facing message and HTTP mapping for each kind.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum WallError {
    #[error("Artifact not found: {0}")]
    ArtifactNotFound(String),

    #[error("Artifact already exists: {0}")]
    ArtifactAlreadyExists(String),

    #[error("Invalid file type: {0}")]
    InvalidFileType(String),

    #[error("Invalid name: {0:?}")]
    InvalidName(String),

    #[error("Invalid url: {0}")]
    InvalidUrl(String),

    #[error("Renderer (pid {pid}) did not exit within the teardown window")]
    TeardownTimeout { pid: u32 },

    #[error("Service not initialized")]
    ServiceNotInitialized,

    #[error("Download exceeds {limit} bytes")]
    DownloadTooLarge { limit: u64 },

    #[error("Power commands are disabled")]
    PowerDisabled,

    #[error("Power command failed: {0}")]
    PowerCommandFailed(String),

    #[error("Failed to spawn renderer: {0}")]
    Spawn(std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Fetch error: {0}")]
    Fetch(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, WallError>;

impl WallError {
    /// Human-readable reply for chat surfaces. Transport errors are surfaced verbatim.
    pub fn user_message(&self) -> String {
        match self {
            WallError::ArtifactNotFound(name) => format!("File {} does not exist", name),
            WallError::ArtifactAlreadyExists(name) => format!("File {} already exists", name),
            WallError::InvalidFileType(_) => {
                "Wrong file type, only jpg, jpeg, png and gif are allowed".to_string()
            }
            WallError::InvalidName(_) => "Invalid name, use letters and digits".to_string(),
            WallError::InvalidUrl(url) => format!("Invalid url {}", url),
            WallError::TeardownTimeout { .. } => {
                "The wall did not stop in time and was abandoned".to_string()
            }
            WallError::ServiceNotInitialized => "Service is not initialized yet".to_string(),
            WallError::DownloadTooLarge { limit } => {
                format!("Image is too large (limit {} bytes)", limit)
            }
            WallError::PowerDisabled => "Power commands are disabled".to_string(),
            WallError::PowerCommandFailed(e) => format!("Power command failed: {}", e),
            WallError::Fetch(e) => format!("Download failed: {}", e),
            WallError::Io(e) => format!("File error: {}", e),
            WallError::Spawn(_) | WallError::Config(_) => "Unknown error".to_string(),
        }
    }

    /// Message code used in HTTP responses.
    pub fn message_code(&self) -> &'static str {
        match self {
            WallError::ArtifactNotFound(_) => "W_VAL_FILE_NOT_EXIST",
            WallError::ArtifactAlreadyExists(_) => "W_VAL_FILE_EXIST",
            WallError::InvalidFileType(_) => "W_VAL_WRONG_FILETYPE",
            WallError::InvalidName(_)
            | WallError::InvalidUrl(_)
            | WallError::DownloadTooLarge { .. } => "W_VAL_INVALID_PARAMS",
            WallError::ServiceNotInitialized => "E_SERVICE_NOT_INITIALIZED",
            WallError::TeardownTimeout { .. } => "W_TEARDOWN_TIMEOUT",
            _ => "E_UNKNOWN",
        }
    }

    /// HTTP status code for this error kind.
    pub fn status_code(&self) -> u16 {
        match self {
            WallError::ArtifactNotFound(_) => 404,
            WallError::ArtifactAlreadyExists(_)
            | WallError::InvalidFileType(_)
            | WallError::InvalidName(_)
            | WallError::InvalidUrl(_)
            | WallError::DownloadTooLarge { .. } => 400,
            WallError::ServiceNotInitialized => 503,
            WallError::PowerDisabled => 403,
            WallError::Fetch(_) => 502,
            _ => 500,
        }
    }

    /// Whether the caller can fix this by changing the request.
    pub fn is_user_correctable(&self) -> bool {
        (400..500).contains(&self.status_code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_are_distinct_per_kind() {
        let errors = [
            WallError::ArtifactNotFound("a.png".into()),
            WallError::ArtifactAlreadyExists("a.png".into()),
            WallError::InvalidFileType("a.txt".into()),
            WallError::TeardownTimeout { pid: 1 },
            WallError::ServiceNotInitialized,
        ];
        let messages: std::collections::HashSet<String> =
            errors.iter().map(|e| e.user_message()).collect();
        assert_eq!(messages.len(), errors.len());
    }

    #[test]
    fn test_http_mapping() {
        assert_eq!(WallError::ArtifactNotFound("x".into()).status_code(), 404);
        assert_eq!(
            WallError::ArtifactAlreadyExists("x".into()).message_code(),
            "W_VAL_FILE_EXIST"
        );
        assert_eq!(WallError::ServiceNotInitialized.status_code(), 503);
        assert!(WallError::InvalidFileType("x".into()).is_user_correctable());
        assert!(!WallError::ServiceNotInitialized.is_user_correctable());
    }

    #[test]
    fn test_uncategorized_errors_map_to_unknown() {
        let err = WallError::Config("broken".into());
        assert_eq!(err.user_message(), "Unknown error");
        assert_eq!(err.message_code(), "E_UNKNOWN");
    }
}
