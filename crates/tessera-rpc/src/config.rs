//! Centralized configuration for the RPC channel.
//!
//! Protocol constants live on [`RpcConfig`]; per-endpoint settings live on
//! [`EndpointOptions`], which hosts can embed in their own configuration files.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Protocol-level constants.
pub struct RpcConfig;

impl RpcConfig {
    pub const DEFAULT_CHANNEL: &'static str = "rpc";
    pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
    /// Code used for every handler failure and missing method.
    pub const HANDLER_ERROR_CODE: i32 = -32000;
    pub const DEFAULT_TARGET_ORIGIN: &'static str = "*";
    pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024; // 16MB
}

/// Settings for a single endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EndpointOptions {
    /// Logical channel this endpoint speaks on.
    pub channel: String,
    /// Timeout applied by `send_request` when no explicit timeout is given.
    #[serde(with = "duration_millis")]
    pub request_timeout: Duration,
    /// Origin passed to `postMessage`-style transports.
    pub target_origin: String,
}

impl Default for EndpointOptions {
    fn default() -> Self {
        Self {
            channel: RpcConfig::DEFAULT_CHANNEL.to_string(),
            request_timeout: RpcConfig::DEFAULT_REQUEST_TIMEOUT,
            target_origin: RpcConfig::DEFAULT_TARGET_ORIGIN.to_string(),
        }
    }
}

impl EndpointOptions {
    /// Options for the given channel with every other setting defaulted.
    pub fn new(channel: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            ..Self::default()
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_target_origin(mut self, origin: impl Into<String>) -> Self {
        self.target_origin = origin.into();
        self
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = EndpointOptions::default();
        assert_eq!(options.channel, "rpc");
        assert_eq!(options.request_timeout, Duration::from_secs(30));
        assert_eq!(options.target_origin, "*");
    }

    #[test]
    fn test_deserialize_partial_options() {
        let options: EndpointOptions =
            serde_json::from_str(r#"{"channel": "engine", "requestTimeout": 250}"#).unwrap();
        assert_eq!(options.channel, "engine");
        assert_eq!(options.request_timeout, Duration::from_millis(250));
        assert_eq!(options.target_origin, "*");
    }

    #[test]
    fn test_builder_setters() {
        let options = EndpointOptions::new("frame")
            .with_request_timeout(Duration::from_millis(10))
            .with_target_origin("https://editor.local");
        assert_eq!(options.channel, "frame");
        assert_eq!(options.request_timeout, Duration::from_millis(10));
        assert_eq!(options.target_origin, "https://editor.local");
    }
}
