// ABOUTME: Core library for memewall - store, ingest, renderer supervisor, router
// ABOUTME: Shared between the HTTP and Slack front-ends and the memewall binary

pub mod auth;
pub mod command;
pub mod config;
pub mod error;
pub mod ingest;
pub mod power;
pub mod router;
pub mod sniff;
pub mod store;
pub mod supervisor;

pub use auth::{AuthError, AuthGate, ChatAllowList, Credential, Identity, Surface, TokenGate};
pub use command::{Command, MissingArg, Request};
pub use config::{Config, RenderMode};
pub use error::{Result, WallError};
pub use ingest::{sanitize_name, Ingestor};
pub use power::{HostPower, PowerAction, SystemPower};
pub use router::{CommandRouter, Reply, ReplyMessage, Wall};
pub use sniff::{sniff, ImageKind};
pub use store::{Artifact, ArtifactStore, ALLOWED_EXTENSIONS};
pub use supervisor::{
    Activation, RendererCommand, RendererState, StopOutcome, Supervisor, SupervisorEvent,
};
