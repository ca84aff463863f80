//! Transport adapters.
//!
//! A transport moves serialized messages to the other side; that is its only
//! obligation toward the endpoint. Each adapter also wires inbound deliveries
//! from its channel into [`RpcEndpoint::handle_rpc_message`].
//!
//! - [`webview`]: native host side of a WebView (script injection + script
//!   message handler)
//! - [`page`]: script side inside the WebView (native bridge out, DOM
//!   `message` events in)
//! - [`frame`]: parent/child windows over `postMessage`
//! - [`memory`]: two endpoints joined in-process
//! - [`stream`]: length-prefixed JSON over any async byte stream
//!
//! The window, WebView and bridge objects themselves belong to the embedding
//! application and are reached through the collaborator traits below.
//!
//! [`RpcEndpoint::handle_rpc_message`]: crate::RpcEndpoint::handle_rpc_message

pub mod frame;
pub mod memory;
pub mod page;
pub mod stream;
pub mod webview;

use crate::events::{EventDispatcher, ListenerId};
use crate::message::RpcMessage;
use crate::Result;
use serde_json::Value;

/// Outbound half of a channel.
///
/// Implementations must return an error, not silently drop, when the target
/// cannot take the message; that is what lets a pending request fail before
/// its timeout.
#[async_trait::async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn post_message(&self, message: &RpcMessage) -> Result<()>;
}

/// A DOM-style `message` event.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageEvent {
    pub data: Value,
    /// Origin of the sending window, `""` when unknown.
    pub origin: String,
}

impl MessageEvent {
    pub fn new(data: Value, origin: impl Into<String>) -> Self {
        Self {
            data,
            origin: origin.into(),
        }
    }
}

/// Callback invoked for each inbound `message` event.
pub type MessageListener = Box<dyn Fn(&MessageEvent) + Send + Sync>;

/// Something that emits `message` events, such as a window.
pub trait MessageEventSource: Send + Sync + 'static {
    fn add_message_listener(&self, listener: MessageListener) -> ListenerId;
    fn remove_message_listener(&self, id: ListenerId);
}

/// In-process event sources (and test doubles) are plain dispatchers.
impl MessageEventSource for EventDispatcher<MessageEvent> {
    fn add_message_listener(&self, listener: MessageListener) -> ListenerId {
        self.on(MESSAGE_EVENT, move |event| listener(event))
    }

    fn remove_message_listener(&self, id: ListenerId) {
        self.off(MESSAGE_EVENT, id);
    }
}

/// Event name used for `message` events on an [`EventDispatcher`].
pub const MESSAGE_EVENT: &str = "message";

/// A window-like object that accepts `postMessage(data, targetOrigin)`.
pub trait MessageTarget: Send + Sync + 'static {
    fn post_message(&self, data: Value, target_origin: &str) -> Result<()>;
}
