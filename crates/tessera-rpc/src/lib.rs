//! Tessera RPC - bidirectional request/response channel between a native
//! host and web content.
//!
//! An [`RpcEndpoint`] sits on each side of a fire-and-forget message channel
//! (a WebView script bridge, `postMessage` between windows, a socket) and
//! provides correlated requests with timeouts, one-way notifications, and
//! dispatch of inbound requests to registered handlers. The channel itself is
//! supplied by a [`Transport`]; see [`transport`] for the bundled adapters.
//!
//! # Example
//!
//! ```rust,ignore
//! use serde_json::{json, Value};
//! use tessera_rpc::{transport::memory, EndpointOptions};
//!
//! #[tokio::main]
//! async fn main() -> tessera_rpc::Result<()> {
//!     let (host, guest) = memory::pair(EndpointOptions::new("engine"));
//!
//!     guest.register_handler("add", |params: Option<Value>| async move {
//!         let p = params.unwrap_or_default();
//!         Ok::<_, String>(json!(p["a"].as_i64().unwrap_or(0) + p["b"].as_i64().unwrap_or(0)))
//!     });
//!
//!     let sum = host.send_request("add", Some(json!({"a": 2, "b": 3}))).await?;
//!     assert_eq!(sum, json!(5));
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod endpoint;
pub mod error;
pub mod events;
pub mod message;
pub mod registry;
pub mod transport;

mod pending;

pub use config::{EndpointOptions, RpcConfig};
pub use endpoint::{DirectReply, RpcEndpoint, WeakRpcEndpoint};
pub use error::{Result, RpcError};
pub use events::{EventDispatcher, Listener, ListenerId};
pub use message::{
    classify, create_rpc_error_response, create_rpc_request, create_rpc_response,
    generate_message_id, is_rpc_message, is_rpc_request, is_rpc_response, RpcErrorObject,
    RpcMessage, RpcRequest, RpcResponse,
};
pub use registry::EndpointRegistry;
pub use transport::{MessageEvent, MessageEventSource, MessageTarget, Transport};
