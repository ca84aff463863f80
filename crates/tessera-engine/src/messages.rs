//! Engine messages.
//!
//! Each message travels as the `params` of an RPC request whose method is
//! [`EngineMessage::method`]. The payload repeats its kind in `messageType`, so
//! a receiver can check that the two agree:
//!
//! ```text
//! { "type": "request", "id": "engine-3", "method": "loadMap",
//!   "params": { "messageType": "load-map", "mapId": "town", "mapData": {..} } }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tessera_rpc::{Result, RpcError};

/// RPC method names used on the engine channel.
pub mod methods {
    pub const LOAD_PROJECT: &str = "loadProject";
    pub const LOAD_MAP: &str = "loadMap";
    pub const ENGINE_EVENT: &str = "engineEvent";
    pub const INPUT_EVENT: &str = "inputEvent";
    pub const COMMAND: &str = "command";

    /// Methods served by the game view.
    pub const GUEST_METHODS: [&str; 4] = [LOAD_PROJECT, LOAD_MAP, INPUT_EVENT, COMMAND];
}

/// Channel name used when none is configured.
pub const DEFAULT_ENGINE_CHANNEL: &str = "engine";

/// Every message exchanged between the editor host and the game view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "messageType", rename_all = "kebab-case")]
pub enum EngineMessage {
    /// Load a project: tilesets, sprite sets and map list.
    #[serde(rename_all = "camelCase")]
    LoadProject {
        project_path: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        assets_base_url: Option<String>,
    },

    /// Switch the view to a map, optionally with its data inline.
    #[serde(rename_all = "camelCase")]
    LoadMap {
        map_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        map_data: Option<Value>,
    },

    /// Something happened inside the engine (game view -> host).
    EngineEvent(EngineEvent),

    /// Input forwarded from the host window into the engine.
    InputEvent(InputEvent),

    /// Editor command such as `"zoomIn"` or `"toggleGrid"`.
    Command {
        command: String,
        #[serde(default, skip_serializing_if = "Value::is_null")]
        args: Value,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineEvent {
    pub name: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub data: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InputKind {
    KeyDown,
    KeyUp,
    PointerDown,
    PointerUp,
    PointerMove,
    Wheel,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputEvent {
    pub kind: InputKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<f64>,
}

impl InputEvent {
    pub fn key(kind: InputKind, key: impl Into<String>) -> Self {
        Self {
            kind,
            key: Some(key.into()),
            x: None,
            y: None,
        }
    }

    pub fn pointer(kind: InputKind, x: f64, y: f64) -> Self {
        Self {
            kind,
            key: None,
            x: Some(x),
            y: Some(y),
        }
    }
}

impl EngineMessage {
    /// RPC method this message is sent as.
    pub fn method(&self) -> &'static str {
        match self {
            EngineMessage::LoadProject { .. } => methods::LOAD_PROJECT,
            EngineMessage::LoadMap { .. } => methods::LOAD_MAP,
            EngineMessage::EngineEvent(_) => methods::ENGINE_EVENT,
            EngineMessage::InputEvent(_) => methods::INPUT_EVENT,
            EngineMessage::Command { .. } => methods::COMMAND,
        }
    }

    pub fn to_params(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }

    /// Decode the params of a request received as `method`.
    ///
    /// Fails with [`RpcError::InvalidParams`] when the params are missing,
    /// malformed, or describe a different message than `method` says.
    pub fn from_params(method: &str, params: Option<Value>) -> Result<Self> {
        let params = params.ok_or_else(|| RpcError::InvalidParams {
            message: format!("'{}' requires params", method),
        })?;
        let message: EngineMessage =
            serde_json::from_value(params).map_err(|e| RpcError::InvalidParams {
                message: e.to_string(),
            })?;
        if message.method() != method {
            return Err(RpcError::InvalidParams {
                message: format!(
                    "message of kind '{}' sent as '{}'",
                    message.method(),
                    method
                ),
            });
        }
        Ok(message)
    }
}
