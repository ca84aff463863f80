//! Editor side of the engine channel.

use crate::messages::{methods, EngineEvent, EngineMessage, InputEvent};
use serde_json::Value;
use tessera_rpc::{Result, RpcEndpoint, RpcError};
use tracing::debug;

/// Drives the game view from the editor.
#[derive(Debug, Clone)]
pub struct EngineHost {
    endpoint: RpcEndpoint,
}

impl EngineHost {
    pub fn new(endpoint: RpcEndpoint) -> Self {
        Self { endpoint }
    }

    pub fn endpoint(&self) -> &RpcEndpoint {
        &self.endpoint
    }

    pub async fn load_project(
        &self,
        project_path: impl Into<String>,
        assets_base_url: Option<String>,
    ) -> Result<Value> {
        self.request(EngineMessage::LoadProject {
            project_path: project_path.into(),
            assets_base_url,
        })
        .await
    }

    pub async fn load_map(
        &self,
        map_id: impl Into<String>,
        map_data: Option<Value>,
    ) -> Result<Value> {
        self.request(EngineMessage::LoadMap {
            map_id: map_id.into(),
            map_data,
        })
        .await
    }

    pub async fn send_command(&self, command: impl Into<String>, args: Value) -> Result<Value> {
        self.request(EngineMessage::Command {
            command: command.into(),
            args,
        })
        .await
    }

    /// Forward input without waiting for the engine.
    pub async fn send_input(&self, input: InputEvent) -> Result<()> {
        let message = EngineMessage::InputEvent(input);
        self.endpoint
            .send_notification(message.method(), Some(message.to_params()?))
            .await
    }

    /// Call `listener` for every engine event the game view emits. Replaces
    /// any previous listener.
    pub fn on_engine_event<F>(&self, listener: F)
    where
        F: Fn(EngineEvent) + Send + Sync + 'static,
    {
        let listener = std::sync::Arc::new(listener);
        self.endpoint
            .register_handler(methods::ENGINE_EVENT, move |params: Option<Value>| {
                let listener = listener.clone();
                async move {
                    let message = EngineMessage::from_params(methods::ENGINE_EVENT, params)?;
                    if let EngineMessage::EngineEvent(event) = message {
                        debug!("Engine event '{}'", event.name);
                        listener(event);
                    }
                    Ok::<_, RpcError>(Value::Null)
                }
            });
    }

    async fn request(&self, message: EngineMessage) -> Result<Value> {
        let params = message.to_params()?;
        self.endpoint.send_request(message.method(), Some(params)).await
    }
}
