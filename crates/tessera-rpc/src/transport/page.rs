//! Script side of a WebView channel.
//!
//! The transport is asymmetric: outbound envelopes go straight to the native
//! bridge the host exposes to the page (a script message handler), while
//! inbound envelopes arrive as DOM `message` events produced by the host's
//! injected `window.postMessage` calls.

use super::{MessageEventSource, Transport};
use crate::config::EndpointOptions;
use crate::endpoint::RpcEndpoint;
use crate::events::ListenerId;
use crate::message::RpcMessage;
use crate::Result;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

/// The send primitive the host exposes to the page.
#[async_trait::async_trait]
pub trait NativeBridge: Send + Sync + 'static {
    /// Hand one envelope object to the host. Must fail when the bridge is
    /// missing from the page.
    async fn send(&self, message: Value) -> Result<()>;
}

/// Outbound half: native bridge calls.
pub struct PageTransport {
    bridge: Arc<dyn NativeBridge>,
}

impl PageTransport {
    pub fn new(bridge: Arc<dyn NativeBridge>) -> Self {
        Self { bridge }
    }
}

#[async_trait::async_trait]
impl Transport for PageTransport {
    async fn post_message(&self, message: &RpcMessage) -> Result<()> {
        self.bridge.send(message.to_value()?).await
    }
}

/// An endpoint living inside the page. Dropping it removes the `message`
/// listener and destroys the endpoint.
pub struct PageEndpoint {
    endpoint: RpcEndpoint,
    window: Arc<dyn MessageEventSource>,
    listener: ListenerId,
}

impl PageEndpoint {
    pub fn attach(
        bridge: Arc<dyn NativeBridge>,
        window: Arc<dyn MessageEventSource>,
        options: EndpointOptions,
    ) -> Self {
        let endpoint = RpcEndpoint::new(options, Arc::new(PageTransport::new(bridge)));

        let weak = endpoint.downgrade();
        let listener = window.add_message_listener(Box::new(move |event| {
            weak.deliver(event.data.clone(), None);
        }));
        debug!("Page endpoint attached on '{}'", endpoint.channel());

        Self {
            endpoint,
            window,
            listener,
        }
    }

    pub fn endpoint(&self) -> &RpcEndpoint {
        &self.endpoint
    }
}

impl AsRef<RpcEndpoint> for PageEndpoint {
    fn as_ref(&self) -> &RpcEndpoint {
        &self.endpoint
    }
}

impl Drop for PageEndpoint {
    fn drop(&mut self) {
        self.window.remove_message_listener(self.listener);
        self.endpoint.destroy();
    }
}
