//! Integration tests for the polling backend lifecycle
//!
//! These tests drive the real worker thread through the mock device:
//! connection, reading, the consecutive-failure budgets, snapshot resets,
//! and shutdown semantics.

#![cfg(feature = "mock-device")]

use cl3000_monitor::backend::{
    BackendCommand, BackendMessage, LiveBackend, MeasurementFrame, MockDevice, ScriptedRead,
};
use cl3000_monitor::config::AppConfig;
use cl3000_monitor::types::{ConnectionStatus, Judgment, SENTINEL_VALUE};
use std::time::{Duration, Instant};

/// Config tuned for tests: fast polling, fast retry.
fn fast_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.acquisition.poll_interval_secs = 0.01;
    config.acquisition.connect_backoff_secs = 0.01;
    config
}

/// Frame where every channel reads `raw/100` with GO judgment.
fn go_frame(raw: i32) -> MeasurementFrame {
    MeasurementFrame::from_channels(&[(raw, 0, 0x02); 8])
}

/// Poll `condition` until it holds or the timeout expires.
fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    condition()
}

#[test]
fn test_read_then_repeated_failures_disconnects() {
    let config = fast_config();
    let device = MockDevice::new();
    let device_state = device.state_handle();
    {
        let mut state = device_state.lock().unwrap();
        // First open succeeds; every later open fails so the worker cannot
        // sneak back into a connected state before we assert.
        state.connect_results.push_back(0);
        for _ in 0..10 {
            state.connect_results.push_back(0x80);
        }
        state.scripted_reads.push_back(ScriptedRead::Frame(go_frame(1234)));
        for _ in 0..5 {
            state.scripted_reads.push_back(ScriptedRead::Fail(0x20));
        }
    }

    let (mut backend, frontend, store) = LiveBackend::spawn(&config, Box::new(device));
    frontend.connect();

    let mut statuses = Vec::new();
    let mut updates = Vec::new();
    let done = wait_until(Duration::from_secs(5), || {
        for msg in frontend.drain() {
            match msg {
                BackendMessage::Connection(status) => statuses.push(status),
                BackendMessage::DataUpdate(snapshot) => updates.push(snapshot),
                _ => {}
            }
        }
        statuses.contains(&ConnectionStatus::Reading)
            && statuses
                .iter()
                .rposition(|&s| s == ConnectionStatus::Disconnected)
                > statuses.iter().position(|&s| s == ConnectionStatus::Reading)
    });
    assert!(done, "expected Reading then Disconnected, got {:?}", statuses);

    // Transition order: Connecting -> Connected -> Reading -> ... -> Disconnected
    let connected = statuses
        .iter()
        .position(|&s| s == ConnectionStatus::Connected)
        .expect("no Connected transition");
    let reading = statuses
        .iter()
        .position(|&s| s == ConnectionStatus::Reading)
        .expect("no Reading transition");
    let disconnected = statuses
        .iter()
        .rposition(|&s| s == ConnectionStatus::Disconnected)
        .expect("no Disconnected transition");
    assert!(connected < reading && reading < disconnected);

    // The successful frame produced exactly one data update with the
    // decoded value, and the forced disconnect reverted the snapshot to
    // sentinel/IDLE.
    let first = updates.first().expect("no data update received");
    assert_eq!(first.get(1).unwrap().value, 12.34);
    assert_eq!(first.get(1).unwrap().judgment, Judgment::Go);

    let last = updates.last().unwrap();
    assert_eq!(last.get(1).unwrap().value, SENTINEL_VALUE);
    assert_eq!(last.get(1).unwrap().judgment, Judgment::Idle);
    assert!(last.get(1).unwrap().timestamp.is_none());

    // The stored history survives the disconnect
    assert_eq!(store.read(1).values, vec![12.34]);

    backend.stop();
}

#[test]
fn test_fatal_after_connect_budget_exhausted() {
    let config = fast_config();
    let device = MockDevice::new();
    let device_state = device.state_handle();
    {
        let mut state = device_state.lock().unwrap();
        for _ in 0..10 {
            state.connect_results.push_back(0x80);
        }
    }

    let (mut backend, frontend, _store) = LiveBackend::spawn(&config, Box::new(device));
    frontend.connect();

    let mut statuses = Vec::new();
    let fatal = wait_until(Duration::from_secs(5), || {
        for msg in frontend.drain() {
            if let BackendMessage::Connection(status) = msg {
                statuses.push(status);
            }
        }
        statuses.contains(&ConnectionStatus::Fatal)
    });
    assert!(fatal, "expected Fatal after repeated connect failures");

    // Exactly five attempts were made before giving up; the fatal state
    // persists (no silent retry loop keeps spinning)
    assert_eq!(device_state.lock().unwrap().open_calls, 5);
    std::thread::sleep(Duration::from_millis(100));
    assert_eq!(device_state.lock().unwrap().open_calls, 5);

    // An explicit reconnect re-arms the loop
    {
        let mut state = device_state.lock().unwrap();
        state.connect_results.clear();
    }
    frontend.connect();
    let reconnected = wait_until(Duration::from_secs(5), || {
        frontend.drain().iter().any(|msg| {
            matches!(
                msg,
                BackendMessage::Connection(ConnectionStatus::Connected)
                    | BackendMessage::Connection(ConnectionStatus::Reading)
            )
        })
    });
    assert!(reconnected, "Connect command should restart polling");

    backend.stop();
}

#[test]
fn test_stop_is_idempotent_and_closes_device_once() {
    let config = fast_config();
    let device = MockDevice::new();
    let device_state = device.state_handle();

    let (mut backend, frontend, _store) = LiveBackend::spawn(&config, Box::new(device));
    frontend.connect();

    let reading = wait_until(Duration::from_secs(5), || {
        frontend
            .drain()
            .iter()
            .any(|msg| matches!(msg, BackendMessage::Connection(ConnectionStatus::Reading)))
    });
    assert!(reading);

    backend.stop();
    backend.stop();

    let state = device_state.lock().unwrap();
    assert_eq!(state.open_calls, 1);
    assert_eq!(state.close_calls, 1, "device must be closed exactly once");
    drop(state);

    // The worker announced its shutdown
    let shutdown = frontend
        .drain()
        .iter()
        .any(|msg| matches!(msg, BackendMessage::Shutdown));
    assert!(shutdown);
}

#[test]
fn test_clear_data_empties_series() {
    let config = fast_config();
    let device = MockDevice::new();

    let (mut backend, frontend, store) = LiveBackend::spawn(&config, Box::new(device));
    frontend.connect();

    let has_data = wait_until(Duration::from_secs(5), || store.read(1).len() >= 3);
    assert!(has_data);

    frontend.send_command(BackendCommand::Disconnect);
    let disconnected = wait_until(Duration::from_secs(5), || {
        frontend.drain().iter().any(|msg| {
            matches!(msg, BackendMessage::Connection(ConnectionStatus::Disconnected))
        })
    });
    assert!(disconnected);

    frontend.clear_data();
    let cleared = wait_until(Duration::from_secs(5), || store.read(1).is_empty());
    assert!(cleared, "ClearData should empty the rolling series");

    backend.stop();
}

#[test]
fn test_channel_count_resize_mid_stream() {
    let config = fast_config();
    let device = MockDevice::new();

    let (mut backend, frontend, store) = LiveBackend::spawn(&config, Box::new(device));
    frontend.connect();

    let has_data = wait_until(Duration::from_secs(5), || store.read(6).len() >= 1);
    assert!(has_data);

    frontend.set_channel_count(2);
    let resized = wait_until(Duration::from_secs(5), || {
        frontend.current_data().channel_count() == 2
    });
    assert!(resized);

    // History for the dropped channels is untouched
    assert!(store.read(6).len() >= 1);

    backend.stop();
}
