//! Editor and game view talking over an in-process link.

use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use tessera_engine::{methods, EngineGuest, EngineHost, EngineMessage, InputEvent, InputKind};
use tessera_rpc::transport::memory;
use tessera_rpc::EndpointOptions;

fn linked() -> (EngineHost, EngineGuest) {
    let (host, guest) = memory::pair(EndpointOptions::new(tessera_engine::DEFAULT_ENGINE_CHANNEL));
    (EngineHost::new(host), EngineGuest::new(guest))
}

/// A guest that records every message and answers with its method name.
fn recording_guest(guest: &EngineGuest) -> Arc<Mutex<Vec<EngineMessage>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let log = seen.clone();
    guest.serve(move |message: EngineMessage| {
        let log = log.clone();
        async move {
            let method = message.method();
            log.lock().unwrap().push(message);
            Ok::<_, String>(json!({"handled": method}))
        }
    });
    seen
}

#[tokio::test]
async fn test_load_project_and_map() {
    let (host, guest) = linked();
    let seen = recording_guest(&guest);

    let result = host
        .load_project("/projects/demo", Some("https://assets.local/".into()))
        .await
        .unwrap();
    assert_eq!(result, json!({"handled": "loadProject"}));

    host.load_map("town", Some(json!({"width": 32, "height": 24})))
        .await
        .unwrap();

    let seen = seen.lock().unwrap().clone();
    assert_eq!(
        seen,
        vec![
            EngineMessage::LoadProject {
                project_path: "/projects/demo".into(),
                assets_base_url: Some("https://assets.local/".into()),
            },
            EngineMessage::LoadMap {
                map_id: "town".into(),
                map_data: Some(json!({"width": 32, "height": 24})),
            },
        ]
    );
}

#[tokio::test]
async fn test_command_errors_propagate() {
    let (host, guest) = linked();
    guest.serve(|message: EngineMessage| async move {
        match message {
            EngineMessage::Command { command, .. } if command == "zoomIn" => Ok(json!(2.0)),
            EngineMessage::Command { command, .. } => Err(format!("Unknown command '{}'", command)),
            _ => Ok(Value::Null),
        }
    });

    assert_eq!(host.send_command("zoomIn", Value::Null).await.unwrap(), json!(2.0));
    let err = host.send_command("warp", json!({"to": 9})).await.unwrap_err();
    assert_eq!(err.to_string(), "Unknown command 'warp'");
}

#[tokio::test]
async fn test_input_is_fire_and_forget() {
    let (host, guest) = linked();
    let seen = recording_guest(&guest);

    host.send_input(InputEvent::key(InputKind::KeyDown, "ArrowLeft"))
        .await
        .unwrap();
    assert_eq!(host.endpoint().pending_count().await, 0);

    while seen.lock().unwrap().is_empty() {
        tokio::task::yield_now().await;
    }
    assert_eq!(
        seen.lock().unwrap()[0],
        EngineMessage::InputEvent(InputEvent::key(InputKind::KeyDown, "ArrowLeft"))
    );
}

#[tokio::test]
async fn test_engine_events_reach_host() {
    let (host, guest) = linked();
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    host.on_engine_event(move |event| {
        let _ = tx.send(event);
    });

    guest
        .emit_event("mapLoaded", json!({"mapId": "town"}))
        .await
        .unwrap();

    let event = rx.recv().await.unwrap();
    assert_eq!(event.name, "mapLoaded");
    assert_eq!(event.data, json!({"mapId": "town"}));
}

#[tokio::test]
async fn test_mismatched_message_is_rejected() {
    let (host, guest) = linked();
    let seen = recording_guest(&guest);

    let err = host
        .endpoint()
        .send_request(
            methods::LOAD_MAP,
            Some(json!({"messageType": "command", "command": "zoomIn"})),
        )
        .await
        .unwrap_err();
    assert!(err.to_string().starts_with("Invalid params"));
    assert!(seen.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_stop_unregisters_guest_methods() {
    let (host, guest) = linked();
    recording_guest(&guest);
    guest.stop();

    assert!(guest.endpoint().registered_methods().is_empty());
    let err = host.load_map("town", None).await.unwrap_err();
    assert!(err.to_string().contains("not found"));
}
