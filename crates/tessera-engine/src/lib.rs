//! Tessera Engine - typed messages between the map editor and the game view.
//!
//! The editor embeds the game engine in a WebView. Both sides hold a
//! [`tessera_rpc::RpcEndpoint`] on the same channel; this crate puts a closed
//! set of [`EngineMessage`]s and two thin facades on top of it:
//!
//! - [`EngineHost`]: editor side, loads projects and maps, forwards input and
//!   commands, listens for engine events
//! - [`EngineGuest`]: game view side, serves those messages and emits events
//!
//! # Example
//!
//! ```rust,ignore
//! let (host, guest) = tessera_rpc::transport::memory::pair(EndpointOptions::new("engine"));
//! let host = EngineHost::new(host);
//! let guest = EngineGuest::new(guest);
//!
//! guest.serve(|message| async move {
//!     match message {
//!         EngineMessage::LoadMap { map_id, .. } => Ok::<_, String>(json!({"loaded": map_id})),
//!         _ => Ok(Value::Null),
//!     }
//! });
//!
//! host.load_map("town", None).await?;
//! ```

pub mod guest;
pub mod host;
pub mod messages;

pub use guest::EngineGuest;
pub use host::EngineHost;
pub use messages::{
    methods, EngineEvent, EngineMessage, InputEvent, InputKind, DEFAULT_ENGINE_CHANNEL,
};
