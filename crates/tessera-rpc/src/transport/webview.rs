//! Native host side of a WebView channel.
//!
//! Outbound messages are injected into the page as
//! `window.postMessage(<json>, "<origin>")`. Inbound messages arrive through a
//! script message handler registered under the channel name; the page posts
//! the JSON envelope to it (see [`page`](super::page) for the other side).
//!
//! The WebView itself is reached through [`WebViewHost`], which the embedding
//! application implements on top of its toolkit.

use super::Transport;
use crate::config::EndpointOptions;
use crate::endpoint::{DirectReply, RpcEndpoint};
use crate::message::RpcMessage;
use crate::Result;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

/// Called with the JSON body of each script message. The reply handle is
/// present when the host delivered a message that expects an in-call reply.
pub type ScriptMessageCallback = Arc<dyn Fn(String, Option<DirectReply>) + Send + Sync>;

/// The WebView operations the channel needs.
#[async_trait::async_trait]
pub trait WebViewHost: Send + Sync + 'static {
    /// Run `script` in the page's main world. Must fail when the page has no
    /// script context (not loaded, crashed, or torn down).
    async fn evaluate_javascript(&self, script: &str) -> Result<()>;

    fn register_script_message_handler(
        &self,
        name: &str,
        callback: ScriptMessageCallback,
    ) -> Result<()>;

    fn unregister_script_message_handler(&self, name: &str);
}

/// Build the script that delivers `json` to the page's `message` listeners.
///
/// U+2028 and U+2029 are valid in JSON strings but terminate lines in older
/// JavaScript parsers, so they are escaped.
pub fn post_message_script(json: &str, target_origin: &str) -> String {
    let json = json.replace('\u{2028}', "\\u2028").replace('\u{2029}', "\\u2029");
    let origin = Value::String(target_origin.to_string());
    format!("window.postMessage({}, {});", json, origin)
}

/// Outbound half: script injection.
pub struct WebViewTransport {
    host: Arc<dyn WebViewHost>,
    target_origin: String,
}

impl WebViewTransport {
    pub fn new(host: Arc<dyn WebViewHost>, target_origin: impl Into<String>) -> Self {
        Self {
            host,
            target_origin: target_origin.into(),
        }
    }
}

#[async_trait::async_trait]
impl Transport for WebViewTransport {
    async fn post_message(&self, message: &RpcMessage) -> Result<()> {
        let json = serde_json::to_string(message)?;
        let script = post_message_script(&json, &self.target_origin);
        self.host.evaluate_javascript(&script).await
    }
}

/// An endpoint bound to a WebView. Dropping it unregisters the script message
/// handler.
pub struct WebViewEndpoint {
    endpoint: RpcEndpoint,
    host: Arc<dyn WebViewHost>,
}

impl WebViewEndpoint {
    /// Create the endpoint and register the script message handler named
    /// after the channel.
    pub fn attach(host: Arc<dyn WebViewHost>, options: EndpointOptions) -> Result<Self> {
        let transport = WebViewTransport::new(host.clone(), options.target_origin.clone());
        let endpoint = RpcEndpoint::new(options, Arc::new(transport));

        let weak = endpoint.downgrade();
        let channel = endpoint.channel().to_string();
        let callback: ScriptMessageCallback = Arc::new(move |body: String, reply| {
            let payload: Value = match serde_json::from_str(&body) {
                Ok(payload) => payload,
                Err(e) => {
                    debug!("Dropping unparsable script message on '{}': {}", channel, e);
                    return;
                }
            };
            if !weak.deliver(payload, reply) {
                debug!("Script message on '{}' arrived after endpoint drop", channel);
            }
        });

        host.register_script_message_handler(endpoint.channel(), callback)?;
        debug!("WebView endpoint attached on '{}'", endpoint.channel());

        Ok(Self { endpoint, host })
    }

    pub fn endpoint(&self) -> &RpcEndpoint {
        &self.endpoint
    }
}

impl AsRef<RpcEndpoint> for WebViewEndpoint {
    fn as_ref(&self) -> &RpcEndpoint {
        &self.endpoint
    }
}

impl Drop for WebViewEndpoint {
    fn drop(&mut self) {
        self.host
            .unregister_script_message_handler(self.endpoint.channel());
        self.endpoint.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RpcError;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Fake WebView: records injected scripts and keeps registered handlers.
    #[derive(Default)]
    struct FakeWebView {
        loaded: std::sync::atomic::AtomicBool,
        scripts: Mutex<Vec<String>>,
        handlers: Mutex<HashMap<String, ScriptMessageCallback>>,
    }

    impl FakeWebView {
        fn loaded() -> Arc<Self> {
            let view = Self::default();
            view.loaded.store(true, std::sync::atomic::Ordering::SeqCst);
            Arc::new(view)
        }

        fn post_from_page(&self, name: &str, body: &str, reply: Option<DirectReply>) {
            let handler = self.handlers.lock().unwrap().get(name).cloned();
            handler.expect("handler registered")(body.to_string(), reply);
        }

        /// The JSON argument of the last injected `window.postMessage` call.
        fn last_posted(&self) -> Value {
            let script = self.scripts.lock().unwrap().last().cloned().unwrap();
            let json = script
                .strip_prefix("window.postMessage(")
                .and_then(|s| s.strip_suffix(", \"*\");"))
                .unwrap();
            serde_json::from_str(json).unwrap()
        }
    }

    #[async_trait::async_trait]
    impl WebViewHost for FakeWebView {
        async fn evaluate_javascript(&self, script: &str) -> Result<()> {
            if !self.loaded.load(std::sync::atomic::Ordering::SeqCst) {
                return Err(RpcError::target_unavailable("webview"));
            }
            self.scripts.lock().unwrap().push(script.to_string());
            Ok(())
        }

        fn register_script_message_handler(
            &self,
            name: &str,
            callback: ScriptMessageCallback,
        ) -> Result<()> {
            self.handlers
                .lock()
                .unwrap()
                .insert(name.to_string(), callback);
            Ok(())
        }

        fn unregister_script_message_handler(&self, name: &str) {
            self.handlers.lock().unwrap().remove(name);
        }
    }

    async fn wait_for_scripts(view: &FakeWebView, count: usize) {
        while view.scripts.lock().unwrap().len() < count {
            tokio::task::yield_now().await;
        }
    }

    #[test]
    fn test_post_message_script_escapes_line_separators() {
        let script = post_message_script("{\"a\":\"x\u{2028}y\"}", "*");
        assert_eq!(script, "window.postMessage({\"a\":\"x\\u2028y\"}, \"*\");");
    }

    #[test]
    fn test_post_message_script_quotes_origin() {
        let script = post_message_script("{}", "https://game.local");
        assert_eq!(script, "window.postMessage({}, \"https://game.local\");");
    }

    #[tokio::test]
    async fn test_outbound_request_is_injected() {
        let view = FakeWebView::loaded();
        let attached =
            WebViewEndpoint::attach(view.clone(), EndpointOptions::new("editor")).unwrap();

        attached
            .endpoint()
            .send_notification("mapChanged", Some(json!({"id": 3})))
            .await
            .unwrap();

        let posted = view.last_posted();
        assert_eq!(posted["type"], "request");
        assert_eq!(posted["method"], "mapChanged");
        assert_eq!(posted["channel"], "editor");
    }

    #[tokio::test]
    async fn test_unloaded_view_rejects_send() {
        let view = Arc::new(FakeWebView::default());
        let attached = WebViewEndpoint::attach(view, EndpointOptions::new("editor")).unwrap();

        let err = attached.endpoint().send_request("x", None).await.unwrap_err();
        assert!(matches!(err, RpcError::TargetUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_inbound_request_is_answered_by_injection() {
        let view = FakeWebView::loaded();
        let attached =
            WebViewEndpoint::attach(view.clone(), EndpointOptions::new("editor")).unwrap();
        attached
            .endpoint()
            .register_handler("getTileSize", |_| async { Ok::<_, String>(json!(16)) });

        view.post_from_page(
            "editor",
            r#"{"type":"request","id":"page-1","method":"getTileSize","channel":"editor"}"#,
            None,
        );
        wait_for_scripts(&view, 1).await;

        let posted = view.last_posted();
        assert_eq!(posted["type"], "response");
        assert_eq!(posted["id"], "page-1");
        assert_eq!(posted["result"], 16);
    }

    #[tokio::test]
    async fn test_inbound_request_with_direct_reply() {
        let view = FakeWebView::loaded();
        let attached =
            WebViewEndpoint::attach(view.clone(), EndpointOptions::new("editor")).unwrap();
        attached
            .endpoint()
            .register_handler("ping", |_| async { Ok::<_, String>(json!("pong")) });

        let (tx, rx) = tokio::sync::oneshot::channel();
        let reply = DirectReply::new(move |response| {
            let _ = tx.send(response);
            Ok(())
        });
        view.post_from_page(
            "editor",
            r#"{"type":"request","id":"p","method":"ping"}"#,
            Some(reply),
        );

        let response = rx.await.unwrap();
        assert_eq!(response.into_outcome(), Ok(json!("pong")));
        assert!(view.scripts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_garbage_script_message_is_ignored() {
        let view = FakeWebView::loaded();
        let _attached =
            WebViewEndpoint::attach(view.clone(), EndpointOptions::new("editor")).unwrap();
        view.post_from_page("editor", "{not json", None);
        tokio::task::yield_now().await;
        assert!(view.scripts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_drop_unregisters_handler() {
        let view = FakeWebView::loaded();
        let attached =
            WebViewEndpoint::attach(view.clone(), EndpointOptions::new("editor")).unwrap();
        assert!(view.handlers.lock().unwrap().contains_key("editor"));
        drop(attached);
        assert!(view.handlers.lock().unwrap().is_empty());
    }
}
