//! Application state for the HTTP server.

use tokio_util::sync::CancellationToken;

use crate::services::CheckinEngine;

/// Shared application state passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub engine: CheckinEngine,
    /// Cancelled on shutdown; handlers derive per-request tokens from it.
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(engine: CheckinEngine) -> Self {
        Self {
            engine,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub(crate) fn request_token(&self) -> CancellationToken {
        self.shutdown.child_token()
    }
}
