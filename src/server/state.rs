//! Shared application state handed to every handler.

use crate::{config::Config, error::GatewayError, router::RequestRouter};
use std::sync::Arc;

/// Dependencies flow in through this state rather than through globals, so
/// tests wire fakes the same way `main` wires the real collaborators.
///
/// The router is optional: the HTTP surface can come up before the pipeline
/// finishes initializing, and requests arriving in that window get a 503
/// instead of a hang.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    router: Option<Arc<RequestRouter>>,
}

impl AppState {
    pub fn new(config: Config, router: Arc<RequestRouter>) -> Self {
        Self {
            config: Arc::new(config),
            router: Some(router),
        }
    }

    pub fn uninitialized(config: Config) -> Self {
        Self {
            config: Arc::new(config),
            router: None,
        }
    }

    pub fn router(&self) -> Result<Arc<RequestRouter>, GatewayError> {
        self.router
            .clone()
            .ok_or_else(|| GatewayError::NotReady("gateway is still initializing".to_string()))
    }

    pub fn router_ready(&self) -> bool {
        self.router.is_some()
    }
}
