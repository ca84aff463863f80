//! Bidirectional RPC endpoint.
//!
//! An endpoint turns a fire-and-forget message channel into request/response
//! calls with timeouts, one-way notifications, and inbound method dispatch.
//! Requests and responses share one stream; [`RpcEndpoint::handle_rpc_message`]
//! routes each inbound message to the pending-request coordinator or to a
//! registered handler.
//!
//! # Example
//!
//! ```rust,ignore
//! let (editor, game) = tessera_rpc::transport::memory::pair(EndpointOptions::new("rpc"));
//!
//! game.register_handler("add", |params: Option<Value>| async move {
//!     let p = params.unwrap_or_default();
//!     Ok::<_, String>(json!(p["a"].as_i64().unwrap_or(0) + p["b"].as_i64().unwrap_or(0)))
//! });
//!
//! let sum = editor.send_request("add", Some(json!({"a": 2, "b": 3}))).await?;
//! assert_eq!(sum, json!(5));
//! ```

use crate::config::{EndpointOptions, RpcConfig};
use crate::events::EventDispatcher;
use crate::message::{
    classify, create_rpc_error_response, create_rpc_request, create_rpc_response, RpcMessage,
    RpcRequest, RpcResponse,
};
use crate::pending::PendingRequests;
use crate::transport::Transport;
use crate::{Result, RpcError};
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock, Weak};
use std::time::Duration;
use tracing::{debug, warn};

/// Event fired for every accepted inbound message.
pub const EVENT_MESSAGE: &str = "message";
/// Event fired for every accepted inbound request or notification.
pub const EVENT_REQUEST: &str = "request";
/// Event fired for every accepted inbound response.
pub const EVENT_RESPONSE: &str = "response";

type Handler = Arc<
    dyn Fn(Option<Value>) -> BoxFuture<'static, std::result::Result<Value, String>> + Send + Sync,
>;

/// Answers a request inside the transport call that delivered it, bypassing
/// [`Transport::post_message`].
pub struct DirectReply(Box<dyn FnOnce(RpcResponse) -> Result<()> + Send>);

impl DirectReply {
    pub fn new<F>(reply: F) -> Self
    where
        F: FnOnce(RpcResponse) -> Result<()> + Send + 'static,
    {
        Self(Box::new(reply))
    }

    pub fn send(self, response: RpcResponse) -> Result<()> {
        (self.0)(response)
    }
}

impl std::fmt::Debug for DirectReply {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("DirectReply")
    }
}

struct Inner {
    options: EndpointOptions,
    transport: Arc<dyn Transport>,
    handlers: RwLock<HashMap<String, Handler>>,
    counter: AtomicU64,
    pending: PendingRequests,
    events: EventDispatcher<RpcMessage>,
    destroyed: AtomicBool,
    runtime: tokio::runtime::Handle,
}

/// One side of a bidirectional RPC relationship.
///
/// Cloning is cheap and every clone refers to the same endpoint.
#[derive(Clone)]
pub struct RpcEndpoint {
    inner: Arc<Inner>,
}

/// Non-owning reference to an endpoint, for collaborator callbacks that must
/// not keep it alive.
#[derive(Clone)]
pub struct WeakRpcEndpoint {
    inner: Weak<Inner>,
}

impl std::fmt::Debug for RpcEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcEndpoint")
            .field("channel", &self.inner.options.channel)
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}

impl AsRef<RpcEndpoint> for RpcEndpoint {
    fn as_ref(&self) -> &RpcEndpoint {
        self
    }
}

impl RpcEndpoint {
    /// Create an endpoint sending through `transport`.
    ///
    /// Must be called from within a tokio runtime; the endpoint's
    /// coordinator task and inbound handling run on that runtime.
    pub fn new(options: EndpointOptions, transport: Arc<dyn Transport>) -> Self {
        let runtime = tokio::runtime::Handle::current();
        let pending = PendingRequests::spawn(options.channel.clone(), &runtime);
        debug!("RPC endpoint created on channel '{}'", options.channel);

        Self {
            inner: Arc::new(Inner {
                options,
                transport,
                handlers: RwLock::new(HashMap::new()),
                counter: AtomicU64::new(0),
                pending,
                events: EventDispatcher::new(),
                destroyed: AtomicBool::new(false),
                runtime,
            }),
        }
    }

    pub fn channel(&self) -> &str {
        &self.inner.options.channel
    }

    pub fn options(&self) -> &EndpointOptions {
        &self.inner.options
    }

    /// Observers of raw inbound traffic. See [`EVENT_MESSAGE`],
    /// [`EVENT_REQUEST`] and [`EVENT_RESPONSE`].
    pub fn events(&self) -> &EventDispatcher<RpcMessage> {
        &self.inner.events
    }

    pub fn downgrade(&self) -> WeakRpcEndpoint {
        WeakRpcEndpoint {
            inner: Arc::downgrade(&self.inner),
        }
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.destroyed.load(Ordering::SeqCst)
    }

    /// Number of requests still awaiting a response.
    pub async fn pending_count(&self) -> usize {
        self.inner.pending.len().await
    }

    fn next_id(&self) -> String {
        let n = self.inner.counter.fetch_add(1, Ordering::Relaxed) + 1;
        format!("{}-{}", self.inner.options.channel, n)
    }

    // ========================================================================
    // Handler registry
    // ========================================================================

    /// Register a handler for `method`. A second registration under the same
    /// name replaces the first.
    pub fn register_handler<F, Fut, E>(&self, method: impl Into<String>, handler: F)
    where
        F: Fn(Option<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<Value, E>> + Send + 'static,
        E: std::fmt::Display + Send + 'static,
    {
        let handler: Handler = Arc::new(move |params| {
            let fut = handler(params);
            async move { fut.await.map_err(|e| e.to_string()) }.boxed()
        });

        let method = method.into();
        if let Ok(mut handlers) = self.inner.handlers.write() {
            if handlers.insert(method.clone(), handler).is_some() {
                debug!("Replaced handler for '{}'", method);
            }
        }
    }

    /// Register a handler with serde-typed params and result.
    ///
    /// Params that fail to decode answer with an `Invalid params` error
    /// without calling `handler`.
    pub fn register_typed_handler<P, R, E, F, Fut>(&self, method: impl Into<String>, handler: F)
    where
        P: DeserializeOwned + Send + 'static,
        R: Serialize + Send + 'static,
        E: std::fmt::Display + Send + 'static,
        F: Fn(P) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<R, E>> + Send + 'static,
    {
        let handler = Arc::new(handler);
        self.register_handler(method, move |params: Option<Value>| {
            let handler = handler.clone();
            async move {
                let params: P = serde_json::from_value(params.unwrap_or(Value::Null)).map_err(
                    |e| {
                        RpcError::InvalidParams {
                            message: e.to_string(),
                        }
                        .to_string()
                    },
                )?;
                let result = handler(params).await.map_err(|e| e.to_string())?;
                serde_json::to_value(result).map_err(|e| e.to_string())
            }
        });
    }

    /// Remove the handler for `method`. Returns whether one was registered.
    pub fn unregister_handler(&self, method: &str) -> bool {
        self.inner
            .handlers
            .write()
            .map(|mut handlers| handlers.remove(method).is_some())
            .unwrap_or(false)
    }

    /// Names of the currently registered methods, sorted.
    pub fn registered_methods(&self) -> Vec<String> {
        let mut methods: Vec<String> = self
            .inner
            .handlers
            .read()
            .map(|handlers| handlers.keys().cloned().collect())
            .unwrap_or_default();
        methods.sort();
        methods
    }

    fn handler(&self, method: &str) -> Option<Handler> {
        self.inner
            .handlers
            .read()
            .ok()
            .and_then(|handlers| handlers.get(method).cloned())
    }

    // ========================================================================
    // Outbound
    // ========================================================================

    /// Call `method` on the remote side with the endpoint's default timeout.
    pub async fn send_request(&self, method: &str, params: Option<Value>) -> Result<Value> {
        self.send_request_with_timeout(method, params, self.inner.options.request_timeout)
            .await
    }

    /// Call `method` on the remote side.
    ///
    /// Fails with the remote's error message, [`RpcError::Timeout`] when no
    /// response arrives within `timeout`, the transport's own error when the
    /// send is refused, or [`RpcError::Destroyed`].
    pub async fn send_request_with_timeout(
        &self,
        method: &str,
        params: Option<Value>,
        timeout: Duration,
    ) -> Result<Value> {
        if self.is_destroyed() {
            return Err(RpcError::Destroyed);
        }

        let id = self.next_id();
        let request = create_rpc_request(
            method,
            params,
            Some(id.clone()),
            Some(self.inner.options.channel.clone()),
        );
        let reply = self
            .inner
            .pending
            .register(id.clone(), method.to_string(), timeout);

        debug!("RPC request {} -> {}", id, method);
        if let Err(e) = self.inner.transport.post_message(&RpcMessage::Request(request)).await {
            warn!("Failed to send request {} ({}): {}", id, method, e);
            self.inner.pending.forget(id);
            return Err(e);
        }

        reply.await.unwrap_or(Err(RpcError::Destroyed))
    }

    /// Typed wrapper over [`send_request`](Self::send_request).
    pub async fn call<P, R>(&self, method: &str, params: &P) -> Result<R>
    where
        P: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let params = serde_json::to_value(params)?;
        let result = self.send_request(method, Some(params)).await?;
        Ok(serde_json::from_value(result)?)
    }

    /// Send a one-way notification. Completes once the transport has
    /// accepted the message; nothing is awaited from the remote side.
    pub async fn send_notification(&self, method: &str, params: Option<Value>) -> Result<()> {
        if self.is_destroyed() {
            return Err(RpcError::Destroyed);
        }

        let id = self.next_id();
        let notification = create_rpc_request(
            method,
            params,
            Some(id.clone()),
            Some(self.inner.options.channel.clone()),
        );
        debug!("RPC notification {} -> {}", id, method);
        self.inner.transport.post_message(&RpcMessage::Request(notification)).await
    }

    // ========================================================================
    // Inbound
    // ========================================================================

    /// Handle one inbound payload from the transport.
    ///
    /// Payloads that are not RPC messages, or that belong to another channel,
    /// are dropped. Requests are answered through `direct_reply` when given,
    /// otherwise through the transport.
    pub async fn handle_rpc_message(&self, payload: Value, direct_reply: Option<DirectReply>) {
        let Some(message) = classify(&payload) else {
            debug!("Ignoring non-RPC payload on channel '{}'", self.channel());
            return;
        };

        if let Some(channel) = message.channel() {
            if channel != self.channel() {
                debug!(
                    "Ignoring message for channel '{}' on channel '{}'",
                    channel,
                    self.channel()
                );
                return;
            }
        }

        if self.is_destroyed() {
            debug!("Dropping {} {} after destroy", message.kind(), message.id());
            return;
        }

        self.inner.events.dispatch(EVENT_MESSAGE, &message);
        self.inner.events.dispatch(message.kind(), &message);

        match message {
            RpcMessage::Request(request) => {
                let response = self.process_request(request).await;
                self.reply(response, direct_reply).await;
            }
            RpcMessage::Response(response) => {
                let id = response.id.clone();
                self.inner.pending.settle(id, response.into_outcome());
            }
        }
    }

    /// Run `handle_rpc_message` on the endpoint's runtime. Safe to call from
    /// threads that are not tokio workers.
    pub fn spawn_rpc_message(&self, payload: Value, direct_reply: Option<DirectReply>) {
        let endpoint = self.clone();
        self.inner.runtime.spawn(async move {
            endpoint.handle_rpc_message(payload, direct_reply).await;
        });
    }

    async fn process_request(&self, request: RpcRequest) -> RpcResponse {
        let RpcRequest {
            id, method, params, ..
        } = request;
        let channel = Some(self.inner.options.channel.clone());

        let Some(handler) = self.handler(&method) else {
            let available = self.registered_methods();
            let available = if available.is_empty() {
                "(none)".to_string()
            } else {
                available.join(", ")
            };
            warn!("RPC method '{}' not found", method);
            return create_rpc_error_response(
                id,
                RpcConfig::HANDLER_ERROR_CODE,
                format!("Method '{}' not found. Available methods: {}", method, available),
                channel,
            );
        };

        debug!("RPC call {} <- {}", id, method);
        // Own task, so a panicking handler turns into an error response.
        match self.inner.runtime.spawn(handler(params)).await {
            Ok(Ok(value)) => create_rpc_response(id, Some(value), channel),
            Ok(Err(message)) => {
                warn!("RPC handler '{}' failed: {}", method, message);
                create_rpc_error_response(id, RpcConfig::HANDLER_ERROR_CODE, message, channel)
            }
            Err(join_error) => {
                let message = if join_error.is_panic() {
                    panic_message(join_error.into_panic())
                } else {
                    "handler cancelled".to_string()
                };
                warn!("RPC handler '{}' panicked: {}", method, message);
                create_rpc_error_response(
                    id,
                    RpcConfig::HANDLER_ERROR_CODE,
                    format!("Handler for '{}' panicked: {}", method, message),
                    channel,
                )
            }
        }
    }

    async fn reply(&self, response: RpcResponse, direct_reply: Option<DirectReply>) {
        let id = response.id.clone();
        let sent = match direct_reply {
            Some(direct) => direct.send(response),
            None => self.inner.transport.post_message(&RpcMessage::Response(response)).await,
        };
        if let Err(e) = sent {
            warn!("Failed to send response {}: {}", id, e);
        }
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Clear all handlers and reject every pending request with
    /// [`RpcError::Destroyed`]. Later calls are no-ops.
    pub fn destroy(&self) {
        if self.inner.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Ok(mut handlers) = self.inner.handlers.write() {
            handlers.clear();
        }
        self.inner.pending.destroy();
        debug!("RPC endpoint on channel '{}' destroyed", self.channel());
    }
}

impl WeakRpcEndpoint {
    pub fn upgrade(&self) -> Option<RpcEndpoint> {
        self.inner.upgrade().map(|inner| RpcEndpoint { inner })
    }

    /// Spawn handling of `payload` if the endpoint is still alive.
    /// Returns whether it was.
    pub fn deliver(&self, payload: Value, direct_reply: Option<DirectReply>) -> bool {
        match self.upgrade() {
            Some(endpoint) => {
                endpoint.spawn_rpc_message(payload, direct_reply);
                true
            }
            None => false,
        }
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
