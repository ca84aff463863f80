//! Two endpoints joined in-process.
//!
//! Messages are serialized to JSON values on send, so anything that would not
//! survive a real transport fails here too.

use super::Transport;
use crate::config::EndpointOptions;
use crate::endpoint::{RpcEndpoint, WeakRpcEndpoint};
use crate::message::RpcMessage;
use crate::{Result, RpcError};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

/// Outbound half of an in-process link.
#[derive(Debug)]
pub struct MemoryTransport {
    peer: mpsc::UnboundedSender<Value>,
}

#[async_trait::async_trait]
impl Transport for MemoryTransport {
    async fn post_message(&self, message: &RpcMessage) -> Result<()> {
        let value = message.to_value()?;
        self.peer
            .send(value)
            .map_err(|_| RpcError::transport("peer endpoint closed"))
    }
}

/// Build two endpoints with the same options, each delivering to the other.
pub fn pair(options: EndpointOptions) -> (RpcEndpoint, RpcEndpoint) {
    pair_with(options.clone(), options)
}

/// Build two endpoints with individual options.
pub fn pair_with(left: EndpointOptions, right: EndpointOptions) -> (RpcEndpoint, RpcEndpoint) {
    let (to_right, right_inbox) = mpsc::unbounded_channel();
    let (to_left, left_inbox) = mpsc::unbounded_channel();

    let left = RpcEndpoint::new(left, Arc::new(MemoryTransport { peer: to_right }));
    let right = RpcEndpoint::new(right, Arc::new(MemoryTransport { peer: to_left }));

    tokio::spawn(pump(left_inbox, left.downgrade()));
    tokio::spawn(pump(right_inbox, right.downgrade()));

    (left, right)
}

/// Deliver everything arriving in `inbox` until the endpoint goes away.
async fn pump(mut inbox: mpsc::UnboundedReceiver<Value>, endpoint: WeakRpcEndpoint) {
    while let Some(payload) = inbox.recv().await {
        if !endpoint.deliver(payload, None) {
            break;
        }
    }
    debug!("In-memory link closed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_pair_round_trip() {
        let (left, right) = pair(EndpointOptions::new("mem"));
        right.register_handler("double", |params: Option<Value>| async move {
            let n = params.and_then(|p| p.as_i64()).unwrap_or(0);
            Ok::<_, String>(json!(n * 2))
        });

        let result = left.send_request("double", Some(json!(21))).await.unwrap();
        assert_eq!(result, json!(42));
    }

    #[tokio::test]
    async fn test_send_to_dropped_peer_fails() {
        let (left, right) = pair(EndpointOptions::new("mem"));
        drop(right);

        // The pump notices the dead endpoint on its next delivery.
        let mut failure = None;
        for _ in 0..10 {
            if let Err(e) = left.send_notification("ping", None).await {
                failure = Some(e);
                break;
            }
            tokio::task::yield_now().await;
        }
        assert!(matches!(failure, Some(RpcError::Transport { .. })));
    }
}
