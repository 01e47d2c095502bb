//! Shared application state.

use std::sync::Arc;

use crate::ws::RelayHub;

/// State handed to every handler.
#[derive(Clone)]
pub struct AppState {
    /// The relay hub owning the connection registry.
    pub hub: Arc<RelayHub>,
}

impl AppState {
    pub fn new() -> Self {
        Self {
            hub: RelayHub::new(),
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}
