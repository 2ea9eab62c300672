//! End-to-end session tests against a scripted client on a real Unix socket.
#![cfg(unix)]

use serde_json::json;
use simplerpc_core::config::{ACTIVITY_TYPE, CLIENT_ID, DETAILS, STATE};
use simplerpc_core::{
    ConfigStore, ConnectionState, EnvFileStore, IpcTransport, Paths, SessionMode,
    SessionOrchestrator,
};
use simplerpc_protocol::{read_frame, write_frame, Opcode};
use std::collections::BTreeMap;
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};
use tempfile::tempdir;

fn ready_frame() -> serde_json::Value {
    json!({
        "cmd": "DISPATCH",
        "evt": "READY",
        "nonce": null,
        "data": {"v": 1, "user": {"id": "7", "username": "trinity", "global_name": null}}
    })
}

/// Accepts one connection, answers the handshake and acknowledges `updates`
/// activity requests, returning the activity bodies it saw.
fn serve(socket: &Path, updates: usize) -> thread::JoinHandle<Vec<serde_json::Value>> {
    let listener = UnixListener::bind(socket).unwrap();
    thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let handshake = read_frame(&mut stream).unwrap();
        assert_eq!(handshake.opcode, Opcode::Handshake);
        write_frame(&mut stream, Opcode::Frame, &ready_frame()).unwrap();

        let mut seen = Vec::new();
        for _ in 0..updates {
            let request = read_frame(&mut stream).unwrap();
            let nonce = request.body["nonce"].clone();
            seen.push(request.body["args"]["activity"].clone());
            ack(&mut stream, nonce);
        }
        seen
    })
}

fn ack(stream: &mut UnixStream, nonce: serde_json::Value) {
    write_frame(
        stream,
        Opcode::Frame,
        &json!({"cmd": "SET_ACTIVITY", "evt": null, "nonce": nonce, "data": {}}),
    )
    .unwrap();
}

fn stored_config(home: &Path, pairs: &[(&str, &str)]) -> EnvFileStore {
    let paths = Paths::at(home);
    let mut store = EnvFileStore::load(paths.config_file()).unwrap();
    let values: BTreeMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    store.set_all(&values).unwrap();
    EnvFileStore::load(paths.config_file()).unwrap()
}

#[test]
fn saved_config_drives_the_first_update() {
    let temp = tempdir().unwrap();
    let store = stored_config(
        temp.path(),
        &[
            (CLIENT_ID, "123"),
            (DETAILS, "Reviewing"),
            (STATE, "PR #12"),
            (ACTIVITY_TYPE, "3"),
        ],
    );

    let socket = temp.path().join("discord-ipc-0");
    let server = serve(&socket, 1);

    let mut session = SessionOrchestrator::new(
        SessionMode::Foreground,
        store.snapshot(),
        IpcTransport::with_socket(&socket),
    );
    session.start(Instant::now()).unwrap();

    let snapshot = session.snapshot();
    assert_eq!(snapshot.status, ConnectionState::Connected);
    assert_eq!(snapshot.identity.as_ref().unwrap().display_name(), "trinity");

    let seen = server.join().unwrap();
    assert_eq!(seen[0]["details"], "Reviewing");
    assert_eq!(seen[0]["state"], "PR #12");
    assert_eq!(seen[0]["type"], 3);
    assert!(seen[0]["timestamps"]["start"].as_i64().unwrap() > 0);
}

#[test]
fn refresh_reuses_start_timestamp() {
    let temp = tempdir().unwrap();
    let store = stored_config(temp.path(), &[(CLIENT_ID, "123")]);

    let socket = temp.path().join("discord-ipc-0");
    let server = serve(&socket, 2);

    let mut session = SessionOrchestrator::new(
        SessionMode::Headless,
        store.snapshot(),
        IpcTransport::with_socket(&socket),
    );
    let t0 = Instant::now();
    session.start(t0).unwrap();
    session.step(t0 + Duration::from_secs(15));

    let seen = server.join().unwrap();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0]["timestamps"]["start"], seen[1]["timestamps"]["start"]);
    assert_eq!(seen[1]["details"], "No details set");
}

#[test]
fn remote_close_schedules_quick_retry() {
    let temp = tempdir().unwrap();
    let store = stored_config(temp.path(), &[(CLIENT_ID, "123")]);

    let socket = temp.path().join("discord-ipc-0");
    let server = serve(&socket, 1);

    let mut session = SessionOrchestrator::new(
        SessionMode::Foreground,
        store.snapshot(),
        IpcTransport::with_socket(&socket),
    );
    let t0 = Instant::now();
    session.start(t0).unwrap();
    // Scripted client hangs up after the first acknowledgement
    server.join().unwrap();

    session.step(t0 + Duration::from_secs(1));
    assert_ne!(session.snapshot().status, ConnectionState::Connected);
    let pending = session.policy().pending().unwrap();
    assert_eq!(pending.due, t0 + Duration::from_secs(11));
}

#[test]
fn unreachable_client_retries_every_minute() {
    let temp = tempdir().unwrap();
    let store = stored_config(temp.path(), &[(CLIENT_ID, "123")]);

    let mut session = SessionOrchestrator::new(
        SessionMode::Headless,
        store.snapshot(),
        IpcTransport::with_socket(temp.path().join("missing-ipc")),
    );
    let t0 = Instant::now();
    session.start(t0).unwrap();

    assert!(session.snapshot().last_error.is_some());
    assert_eq!(session.policy().next_due(), Some(t0 + Duration::from_secs(60)));
}
