//! Endpoints cached by channel name.
//!
//! A WebView exposes one script message handler per name, so creating a
//! second endpoint for a channel would register against the same handler
//! twice. Hosts that hand out endpoints from several places keep one
//! [`EndpointRegistry`] and go through [`get_or_create`].
//!
//! The registry is a plain object owned by whoever needs it; tests build
//! their own.
//!
//! [`get_or_create`]: EndpointRegistry::get_or_create

use crate::endpoint::RpcEndpoint;
use crate::Result;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::debug;

/// Cache of endpoints keyed by channel.
///
/// `E` is anything that wraps an endpoint: a bare [`RpcEndpoint`] or one of
/// the transport bindings such as
/// [`WebViewEndpoint`](crate::transport::webview::WebViewEndpoint).
pub struct EndpointRegistry<E = RpcEndpoint> {
    endpoints: RwLock<HashMap<String, Arc<E>>>,
}

impl<E> Default for EndpointRegistry<E> {
    fn default() -> Self {
        Self {
            endpoints: RwLock::new(HashMap::new()),
        }
    }
}

impl<E> EndpointRegistry<E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registered channel names, sorted.
    pub fn channels(&self) -> Vec<String> {
        let mut channels: Vec<String> = self
            .endpoints
            .read()
            .map(|endpoints| endpoints.keys().cloned().collect())
            .unwrap_or_default();
        channels.sort();
        channels
    }

    pub fn len(&self) -> usize {
        self.endpoints.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<E> std::fmt::Debug for EndpointRegistry<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EndpointRegistry")
            .field("channels", &self.channels())
            .finish()
    }
}

impl<E> EndpointRegistry<E>
where
    E: AsRef<RpcEndpoint>,
{
    /// Return the endpoint for `channel`, building it with `factory` the
    /// first time.
    ///
    /// The factory runs under the registry's write lock, so concurrent
    /// callers never build two endpoints for one channel. It must not call
    /// back into the registry. A destroyed endpoint is replaced.
    pub fn get_or_create<F>(&self, channel: &str, factory: F) -> Result<Arc<E>>
    where
        F: FnOnce() -> Result<E>,
    {
        if let Some(endpoint) = self.get(channel) {
            return Ok(endpoint);
        }

        let mut endpoints = self
            .endpoints
            .write()
            .map_err(|_| crate::RpcError::transport("endpoint registry lock poisoned"))?;
        if let Some(endpoint) = endpoints.get(channel) {
            if !endpoint_of(endpoint).is_destroyed() {
                return Ok(endpoint.clone());
            }
        }

        let endpoint = Arc::new(factory()?);
        endpoints.insert(channel.to_string(), endpoint.clone());
        debug!("Registered endpoint for channel '{}'", channel);
        Ok(endpoint)
    }

    /// The live endpoint for `channel`, if any.
    pub fn get(&self, channel: &str) -> Option<Arc<E>> {
        let endpoints = self.endpoints.read().ok()?;
        endpoints
            .get(channel)
            .filter(|endpoint| !endpoint_of(endpoint).is_destroyed())
            .cloned()
    }

    /// Remove and destroy the endpoint for `channel`. Returns whether one
    /// was registered.
    pub fn remove(&self, channel: &str) -> bool {
        let removed = self
            .endpoints
            .write()
            .ok()
            .and_then(|mut endpoints| endpoints.remove(channel));
        match removed {
            Some(endpoint) => {
                endpoint_of(&endpoint).destroy();
                debug!("Removed endpoint for channel '{}'", channel);
                true
            }
            None => false,
        }
    }

    /// Destroy every endpoint and empty the registry.
    pub fn destroy_all(&self) {
        let drained: Vec<Arc<E>> = match self.endpoints.write() {
            Ok(mut endpoints) => endpoints.drain().map(|(_, endpoint)| endpoint).collect(),
            Err(_) => return,
        };
        for endpoint in &drained {
            endpoint_of(endpoint).destroy();
        }
        debug!("Destroyed {} registered endpoint(s)", drained.len());
    }
}

fn endpoint_of<E: AsRef<RpcEndpoint>>(entry: &Arc<E>) -> &RpcEndpoint {
    <E as AsRef<RpcEndpoint>>::as_ref(entry)
}
