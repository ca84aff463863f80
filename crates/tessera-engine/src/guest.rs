//! Game view side of the engine channel.

use crate::messages::{methods, EngineEvent, EngineMessage};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use tessera_rpc::{Result, RpcEndpoint};
use tracing::debug;

/// Serves engine messages from the editor and reports engine events back.
#[derive(Debug, Clone)]
pub struct EngineGuest {
    endpoint: RpcEndpoint,
}

impl EngineGuest {
    pub fn new(endpoint: RpcEndpoint) -> Self {
        Self { endpoint }
    }

    pub fn endpoint(&self) -> &RpcEndpoint {
        &self.endpoint
    }

    /// Route every message the editor sends to `handler`.
    ///
    /// Registers one RPC handler per entry of [`methods::GUEST_METHODS`].
    /// Params that do not decode into the message the method names are
    /// answered with an `Invalid params` error without calling `handler`.
    pub fn serve<F, Fut, E>(&self, handler: F)
    where
        F: Fn(EngineMessage) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<Value, E>> + Send + 'static,
        E: std::fmt::Display + Send + 'static,
    {
        let handler = Arc::new(handler);
        for method in methods::GUEST_METHODS {
            let handler = handler.clone();
            self.endpoint
                .register_handler(method, move |params: Option<Value>| {
                    let handler = handler.clone();
                    async move {
                        let message =
                            EngineMessage::from_params(method, params).map_err(|e| e.to_string())?;
                        debug!("Serving {}", method);
                        handler(message).await.map_err(|e| e.to_string())
                    }
                });
        }
    }

    /// Stop serving engine messages.
    pub fn stop(&self) {
        for method in methods::GUEST_METHODS {
            self.endpoint.unregister_handler(method);
        }
    }

    /// Tell the editor something happened. Fire-and-forget.
    pub async fn emit_event(&self, name: impl Into<String>, data: Value) -> Result<()> {
        let message = EngineMessage::EngineEvent(EngineEvent {
            name: name.into(),
            data,
        });
        self.endpoint
            .send_notification(message.method(), Some(message.to_params()?))
            .await
    }
}
