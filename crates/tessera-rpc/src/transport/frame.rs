//! Parent/child windows talking over `postMessage`.
//!
//! Symmetric: the parent posts into the iframe's content window, the child
//! posts into its parent window, and both listen for `message` events on their
//! own window. Several channels can share one window, so inbound events are
//! only accepted when `data.channel` names this endpoint's channel.

use super::{MessageEvent, MessageEventSource, MessageTarget, Transport};
use crate::config::{EndpointOptions, RpcConfig};
use crate::endpoint::RpcEndpoint;
use crate::events::ListenerId;
use crate::message::RpcMessage;
use crate::{Result, RpcError};
use serde_json::Value;
use std::sync::{Arc, RwLock};
use tracing::{debug, trace};

/// Outbound half: `target.post_message(data, target_origin)`.
///
/// The target can come and go at runtime (an iframe that has not loaded yet,
/// or was removed). Sending without one fails with
/// [`RpcError::TargetUnavailable`].
pub struct FrameTransport {
    target: RwLock<Option<Arc<dyn MessageTarget>>>,
    target_name: &'static str,
    target_origin: String,
}

impl FrameTransport {
    pub fn new(
        target: Option<Arc<dyn MessageTarget>>,
        target_name: &'static str,
        target_origin: impl Into<String>,
    ) -> Self {
        Self {
            target: RwLock::new(target),
            target_name,
            target_origin: target_origin.into(),
        }
    }

    pub fn set_target(&self, target: Option<Arc<dyn MessageTarget>>) {
        if let Ok(mut slot) = self.target.write() {
            *slot = target;
        }
    }

    pub fn has_target(&self) -> bool {
        self.target.read().map(|t| t.is_some()).unwrap_or(false)
    }

    fn current_target(&self) -> Option<Arc<dyn MessageTarget>> {
        self.target.read().ok().and_then(|t| t.clone())
    }
}

#[async_trait::async_trait]
impl Transport for FrameTransport {
    async fn post_message(&self, message: &RpcMessage) -> Result<()> {
        let target = self
            .current_target()
            .ok_or_else(|| RpcError::target_unavailable(self.target_name))?;
        target.post_message(message.to_value()?, &self.target_origin)
    }
}

/// An endpoint on one side of a parent/child window pair. Dropping it removes
/// the `message` listener and destroys the endpoint.
pub struct FrameEndpoint {
    endpoint: RpcEndpoint,
    transport: Arc<FrameTransport>,
    window: Arc<dyn MessageEventSource>,
    listener: ListenerId,
}

impl FrameEndpoint {
    /// Parent side. `iframe` is the child's content window, if already loaded;
    /// `window` is the parent's own window.
    pub fn parent(
        iframe: Option<Arc<dyn MessageTarget>>,
        window: Arc<dyn MessageEventSource>,
        options: EndpointOptions,
    ) -> Self {
        Self::attach("iframe content window", iframe, window, options)
    }

    /// Child side. `parent` is `window.parent`; `window` is the child's own
    /// window.
    pub fn child(
        parent: Arc<dyn MessageTarget>,
        window: Arc<dyn MessageEventSource>,
        options: EndpointOptions,
    ) -> Self {
        Self::attach("parent window", Some(parent), window, options)
    }

    fn attach(
        target_name: &'static str,
        target: Option<Arc<dyn MessageTarget>>,
        window: Arc<dyn MessageEventSource>,
        options: EndpointOptions,
    ) -> Self {
        let transport = Arc::new(FrameTransport::new(
            target,
            target_name,
            options.target_origin.clone(),
        ));
        let endpoint = RpcEndpoint::new(options, transport.clone());

        let weak = endpoint.downgrade();
        let channel = endpoint.channel().to_string();
        let allowed_origin = endpoint.options().target_origin.clone();
        let listener = window.add_message_listener(Box::new(move |event: &MessageEvent| {
            if !accepts(event, &channel, &allowed_origin) {
                trace!("Frame listener on '{}' skipped event from '{}'", channel, event.origin);
                return;
            }
            weak.deliver(event.data.clone(), None);
        }));
        debug!(
            "Frame endpoint attached on '{}' (target: {})",
            endpoint.channel(),
            target_name
        );

        Self {
            endpoint,
            transport,
            window,
            listener,
        }
    }

    pub fn endpoint(&self) -> &RpcEndpoint {
        &self.endpoint
    }

    /// Attach or detach the window outbound messages go to.
    pub fn set_target(&self, target: Option<Arc<dyn MessageTarget>>) {
        self.transport.set_target(target);
    }

    pub fn has_target(&self) -> bool {
        self.transport.has_target()
    }
}

impl AsRef<RpcEndpoint> for FrameEndpoint {
    fn as_ref(&self) -> &RpcEndpoint {
        &self.endpoint
    }
}

impl Drop for FrameEndpoint {
    fn drop(&mut self) {
        self.window.remove_message_listener(self.listener);
        self.endpoint.destroy();
    }
}

fn accepts(event: &MessageEvent, channel: &str, allowed_origin: &str) -> bool {
    if event.data.get("channel").and_then(Value::as_str) != Some(channel) {
        return false;
    }
    allowed_origin == RpcConfig::DEFAULT_TARGET_ORIGIN || event.origin == allowed_origin
}
