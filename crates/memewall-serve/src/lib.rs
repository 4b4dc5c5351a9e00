// ABOUTME: HTTP front-end for memewall, served with axum
// ABOUTME: Exposes show/upload under /{version}/meme behind the token gate

pub mod error;
pub mod routes;
pub mod server;

use memewall_core::{AuthGate, CommandRouter};
use std::sync::Arc;

pub use error::{ApiResponse, ServeError};
pub use server::{app, run};

/// Shared handler state.
#[derive(Clone)]
pub struct ServeState {
    pub router: Arc<CommandRouter>,
    pub gate: Arc<dyn AuthGate>,
}

impl ServeState {
    pub fn new(router: Arc<CommandRouter>, gate: Arc<dyn AuthGate>) -> Self {
        Self { router, gate }
    }
}
