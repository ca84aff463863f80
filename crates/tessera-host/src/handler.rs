//! Methods every bridge connection serves.

use serde_json::{json, Value};
use tessera_rpc::{RpcEndpoint, RpcError};

pub const PING: &str = "ping";
pub const GET_VERSION: &str = "getVersion";
pub const LIST_METHODS: &str = "listMethods";

/// Register `ping`, `getVersion` and `listMethods` on `endpoint`.
pub fn register_builtin_handlers(endpoint: &RpcEndpoint) {
    endpoint.register_handler(PING, |_| async { Ok::<_, RpcError>(json!("pong")) });

    let channel = endpoint.channel().to_string();
    endpoint.register_handler(GET_VERSION, move |_| {
        let info = json!({
            "name": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION"),
            "channel": channel,
        });
        async move { Ok::<_, RpcError>(info) }
    });

    // Weak, so the handler table does not keep its own endpoint alive.
    let weak = endpoint.downgrade();
    endpoint.register_handler(LIST_METHODS, move |_| {
        let methods = weak
            .upgrade()
            .map(|endpoint| endpoint.registered_methods())
            .ok_or(RpcError::Destroyed);
        async move { methods.map(Value::from) }
    });
}
