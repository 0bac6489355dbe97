//! Backend worker thread implementation
//!
//! This module contains the polling loop that runs in a separate thread
//! and owns the device handle. It communicates with the UI thread through
//! crossbeam channels and writes samples into the shared rolling store.
//!
//! # Responsibilities
//!
//! - **Command processing**: responds to UI commands (connect, disconnect,
//!   channel count, storage control, zero reset, shutdown)
//! - **Connect/retry state machine**: retries failed connects with a fixed
//!   backoff and gives up after [`MAX_CONNECT_FAILURES`] consecutive
//!   failures; the resulting `Fatal` state persists until an explicit
//!   reconnect command
//! - **Frame polling**: reads and decodes one frame per poll interval,
//!   appends every channel to the rolling store, and emits a snapshot
//!   update when any channel's value or judgment changed
//! - **Failure absorption**: no device error escapes this module; errors
//!   become state transitions, snapshot defaults, and UI notifications
//!
//! # Failure budgets
//!
//! Read failures are counted consecutively; at [`MAX_READ_FAILURES`] the
//! worker force-closes the device and falls back to the connect path with
//! a fresh counter. There is no per-read timeout: liveness rests entirely
//! on these counters.

use crate::backend::device::MeasurementDevice;
use crate::backend::reader::FrameDecoder;
use crate::backend::{BackendCommand, BackendMessage};
use crate::config::{
    AppConfig, DeviceConfig, MAX_CONNECT_FAILURES, MAX_READ_FAILURES, ZERO_RESET_GROUP,
};
use crate::data::RollingStore;
use crate::error::{DeviceError, DeviceResult};
use crate::types::{
    ChannelId, ChannelState, ConnectionStatus, LiveSnapshot, PollerStats, Sample,
};
use chrono::Utc;
use crossbeam_channel::{Receiver, Sender, TryRecvError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Sleep granularity while waiting between polls; bounds how long a stop
/// request can go unnoticed.
const SLEEP_SLICE: Duration = Duration::from_millis(20);

/// Interval between statistics messages to the UI.
const STATS_INTERVAL: Duration = Duration::from_secs(1);

/// The backend worker that runs the polling loop.
pub struct PollerWorker {
    /// Immutable connection parameters
    device_config: DeviceConfig,
    /// Command receiver from the UI
    command_rx: Receiver<BackendCommand>,
    /// Message sender to the UI
    message_tx: Sender<BackendMessage>,
    /// Running flag, shared with the backend handle
    running: Arc<AtomicBool>,
    /// Device handle (vendor SDK or mock)
    device: Box<dyn MeasurementDevice>,
    /// Frame decoder for the configured channel count
    decoder: FrameDecoder,
    /// Shared rolling sample store (this worker is the sole writer)
    store: Arc<RollingStore>,
    /// Shared latest-value snapshot
    snapshot: Arc<Mutex<LiveSnapshot>>,
    /// Current connection status
    status: ConnectionStatus,
    /// Whether live polling is requested
    active: bool,
    /// Seconds between polls
    poll_interval: Duration,
    /// Wait between connect retries
    connect_backoff: Duration,
    /// Consecutive connect failures
    connect_failures: u32,
    /// Consecutive read failures
    read_failures: u32,
    /// Statistics
    stats: PollerStats,
    /// Last time stats were sent to the UI
    last_stats_time: Instant,
}

impl PollerWorker {
    /// Create a new poller worker.
    pub fn new(
        config: &AppConfig,
        device: Box<dyn MeasurementDevice>,
        command_rx: Receiver<BackendCommand>,
        message_tx: Sender<BackendMessage>,
        running: Arc<AtomicBool>,
        store: Arc<RollingStore>,
        snapshot: Arc<Mutex<LiveSnapshot>>,
    ) -> Self {
        Self {
            device_config: config.device.clone(),
            command_rx,
            message_tx,
            running,
            device,
            decoder: FrameDecoder::new(config.acquisition.clamped_channel_count() as usize),
            store,
            snapshot,
            status: ConnectionStatus::Disconnected,
            active: false,
            poll_interval: config.acquisition.poll_interval(),
            connect_backoff: config.acquisition.connect_backoff(),
            connect_failures: 0,
            read_failures: 0,
            stats: PollerStats::default(),
            last_stats_time: Instant::now(),
        }
    }

    /// Run the main worker loop until the running flag clears.
    pub fn run(&mut self) {
        tracing::info!(
            "Poller worker started (device {})",
            self.device_config.address_string()
        );

        while self.running.load(Ordering::SeqCst) {
            self.process_commands();
            if !self.running.load(Ordering::SeqCst) {
                break;
            }

            if self.active && self.status != ConnectionStatus::Fatal {
                if self.device.is_open() {
                    self.poll_once();
                    self.maybe_send_stats();
                    self.interruptible_sleep(self.poll_interval);
                } else {
                    let connected = self.connect_attempt();
                    self.maybe_send_stats();
                    if connected {
                        self.interruptible_sleep(self.poll_interval);
                    } else {
                        // The backoff replaces the normal sleep
                        self.interruptible_sleep(self.connect_backoff);
                    }
                }
            } else {
                self.interruptible_sleep(self.poll_interval);
            }
        }

        // The open-guard inside close() makes this exactly-once even when
        // a Disconnect command already closed the device.
        self.device.close();
        if self.status.is_connected() {
            self.update_status(ConnectionStatus::Disconnected);
        }
        let _ = self.message_tx.send(BackendMessage::Shutdown);
        tracing::info!("Poller worker stopped");
    }

    /// Process pending commands from the UI.
    fn process_commands(&mut self) {
        loop {
            match self.command_rx.try_recv() {
                Ok(cmd) => self.handle_command(cmd),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.running.store(false, Ordering::SeqCst);
                    break;
                }
            }
        }
    }

    /// Handle a single command.
    fn handle_command(&mut self, cmd: BackendCommand) {
        match cmd {
            BackendCommand::Connect => {
                self.active = true;
                self.connect_failures = 0;
                self.read_failures = 0;
                if self.status == ConnectionStatus::Fatal {
                    // Operator restart re-arms the connect loop
                    self.update_status(ConnectionStatus::Disconnected);
                }
            }
            BackendCommand::Disconnect => {
                self.active = false;
                self.device.close();
                self.connect_failures = 0;
                self.read_failures = 0;
                self.reset_snapshot();
                self.update_status(ConnectionStatus::Disconnected);
                tracing::info!("Disconnected from device");
            }
            BackendCommand::SetChannelCount(count) => {
                self.update_channel_count(count);
            }
            BackendCommand::SetPollInterval(interval) => {
                self.poll_interval = interval.max(Duration::from_millis(10));
            }
            BackendCommand::ClearData => {
                self.store.clear_all();
            }
            BackendCommand::ZeroReset => {
                self.device_op("zero reset", |d| d.reset_group(ZERO_RESET_GROUP));
            }
            BackendCommand::ClearStorage => {
                self.device_op("clear storage", |d| d.clear_storage());
            }
            BackendCommand::StartStorage => {
                self.device_op("start storage", |d| d.start_storage());
            }
            BackendCommand::StopStorage => {
                self.device_op("stop storage", |d| d.stop_storage());
            }
            BackendCommand::Shutdown => {
                self.running.store(false, Ordering::SeqCst);
            }
        }
    }

    /// Run a pass-through device operation, reporting failure to the UI
    /// without affecting the polling state machine.
    fn device_op(
        &mut self,
        what: &str,
        op: impl FnOnce(&mut dyn MeasurementDevice) -> DeviceResult<()>,
    ) {
        if !self.device.is_open() {
            let _ = self.message_tx.send(BackendMessage::DeviceError(format!(
                "{}: not connected",
                what
            )));
            return;
        }
        match op(self.device.as_mut()) {
            Ok(()) => tracing::info!("Device operation '{}' completed", what),
            Err(e) => {
                tracing::warn!("Device operation '{}' failed: {}", what, e);
                let _ = self
                    .message_tx
                    .send(BackendMessage::DeviceError(format!("{}: {}", what, e)));
            }
        }
    }

    /// Attempt to open the device. Returns whether the attempt succeeded.
    fn connect_attempt(&mut self) -> bool {
        self.update_status(ConnectionStatus::Connecting);
        match self.device.open(&self.device_config) {
            Ok(()) => {
                self.connect_failures = 0;
                self.update_status(ConnectionStatus::Connected);
                tracing::info!(
                    "Connected to device at {}",
                    self.device_config.address_string()
                );
                true
            }
            Err(e) => {
                self.connect_failures += 1;
                self.stats.failed_connects += 1;
                self.stats.last_error = Some(e.to_string());
                tracing::warn!(
                    "Connect attempt {}/{} failed: {}",
                    self.connect_failures,
                    MAX_CONNECT_FAILURES,
                    e
                );
                let _ = self
                    .message_tx
                    .send(BackendMessage::DeviceError(e.to_string()));
                if self.connect_failures >= MAX_CONNECT_FAILURES {
                    tracing::error!(
                        "Giving up after {} consecutive connect failures; reconnect required",
                        MAX_CONNECT_FAILURES
                    );
                    self.update_status(ConnectionStatus::Fatal);
                } else {
                    self.update_status(ConnectionStatus::Disconnected);
                }
                false
            }
        }
    }

    /// Poll one measurement frame and fold it into the store and snapshot.
    fn poll_once(&mut self) {
        match self.decoder.read_frame(self.device.as_mut()) {
            Ok(readings) => {
                self.read_failures = 0;
                self.stats.successful_reads += 1;
                let timestamp = Utc::now();

                let changed_snapshot = {
                    let mut snapshot =
                        self.snapshot.lock().unwrap_or_else(|e| e.into_inner());
                    let mut changed = false;
                    for (index, reading) in readings.iter().enumerate() {
                        let channel = (index + 1) as ChannelId;
                        self.store.append(
                            channel,
                            Sample::new(timestamp, reading.value, reading.judgment),
                        );
                        if let Some(state) = snapshot.get(channel) {
                            if state.value != reading.value
                                || state.judgment != reading.judgment
                            {
                                changed = true;
                            }
                        }
                        snapshot.set(
                            channel,
                            ChannelState {
                                value: reading.value,
                                judgment: reading.judgment,
                                timestamp: Some(timestamp),
                            },
                        );
                    }
                    changed.then(|| snapshot.clone())
                };

                if self.status != ConnectionStatus::Reading {
                    self.update_status(ConnectionStatus::Reading);
                }
                if let Some(copy) = changed_snapshot {
                    self.try_send(BackendMessage::DataUpdate(copy));
                }
            }
            Err(e) => {
                self.read_failures += 1;
                self.stats.failed_reads += 1;
                self.stats.last_error = Some(e.to_string());
                tracing::warn!(
                    "Frame read {}/{} failed: {}",
                    self.read_failures,
                    MAX_READ_FAILURES,
                    e
                );
                if self.read_failures >= MAX_READ_FAILURES {
                    self.force_disconnect(&e);
                } else if self.status == ConnectionStatus::Reading {
                    // Connected but stale; visibly distinct from Reading
                    self.update_status(ConnectionStatus::Connected);
                }
            }
        }
    }

    /// Close the device after exhausting the read-failure budget so the
    /// outer loop retries the connection from scratch.
    fn force_disconnect(&mut self, cause: &DeviceError) {
        tracing::error!(
            "Forcing reconnect after {} consecutive read failures (last: {})",
            MAX_READ_FAILURES,
            cause
        );
        self.device.close();
        self.read_failures = 0;
        self.reset_snapshot();
        self.update_status(ConnectionStatus::Disconnected);
    }

    /// Resize the latest-value snapshot to a new channel count without
    /// disturbing the rolling history.
    fn update_channel_count(&mut self, count: u8) {
        let count = count.clamp(1, crate::types::MAX_CHANNELS as u8) as usize;
        self.decoder.set_channel_count(count);
        let copy = {
            let mut snapshot = self.snapshot.lock().unwrap_or_else(|e| e.into_inner());
            snapshot.resize(count);
            snapshot.clone()
        };
        self.try_send(BackendMessage::DataUpdate(copy));
    }

    /// Reset every snapshot entry to sentinel/IDLE and notify the UI.
    fn reset_snapshot(&mut self) {
        let copy = {
            let mut snapshot = self.snapshot.lock().unwrap_or_else(|e| e.into_inner());
            snapshot.reset();
            snapshot.clone()
        };
        self.try_send(BackendMessage::DataUpdate(copy));
    }

    /// Update the connection status and notify the UI on change.
    fn update_status(&mut self, status: ConnectionStatus) {
        if self.status != status {
            self.status = status;
            let _ = self.message_tx.send(BackendMessage::Connection(status));
        }
    }

    /// Send statistics to the UI on a coarse interval.
    fn maybe_send_stats(&mut self) {
        if self.last_stats_time.elapsed() >= STATS_INTERVAL {
            self.last_stats_time = Instant::now();
            let stats = self.stats.clone();
            self.try_send(BackendMessage::Stats(stats));
        }
    }

    /// Try to send a message, counting drops when the queue is full.
    fn try_send(&mut self, msg: BackendMessage) {
        if self.message_tx.try_send(msg).is_err() {
            self.stats.dropped_updates += 1;
        }
    }

    /// Sleep in small slices so a stop request is observed promptly, even
    /// mid-backoff.
    fn interruptible_sleep(&self, duration: Duration) {
        let deadline = Instant::now() + duration;
        while self.running.load(Ordering::SeqCst) {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            std::thread::sleep(SLEEP_SLICE.min(deadline - now));
        }
    }
}

#[cfg(test)]
#[cfg(feature = "mock-device")]
mod tests {
    use super::*;
    use crate::backend::device::MeasurementFrame;
    use crate::backend::mock_device::{MockDevice, MockDeviceState, ScriptedRead};
    use crate::types::{Judgment, SENTINEL_VALUE};
    use crossbeam_channel::bounded;

    struct Harness {
        worker: PollerWorker,
        messages: Receiver<BackendMessage>,
        commands: Sender<BackendCommand>,
        device_state: Arc<Mutex<MockDeviceState>>,
        store: Arc<RollingStore>,
        snapshot: Arc<Mutex<LiveSnapshot>>,
    }

    fn harness() -> Harness {
        let config = AppConfig::default();
        let (cmd_tx, cmd_rx) = bounded(64);
        let (msg_tx, msg_rx) = bounded(256);
        let device = MockDevice::new();
        let device_state = device.state_handle();
        let store = Arc::new(RollingStore::new(config.acquisition.series_capacity));
        let snapshot = Arc::new(Mutex::new(LiveSnapshot::new(
            config.acquisition.channel_count as usize,
        )));
        let worker = PollerWorker::new(
            &config,
            Box::new(device),
            cmd_rx,
            msg_tx,
            Arc::new(AtomicBool::new(true)),
            Arc::clone(&store),
            Arc::clone(&snapshot),
        );
        Harness {
            worker,
            messages: msg_rx,
            commands: cmd_tx,
            device_state,
            store,
            snapshot,
        }
    }

    fn statuses(messages: &Receiver<BackendMessage>) -> Vec<ConnectionStatus> {
        let mut out = Vec::new();
        while let Ok(msg) = messages.try_recv() {
            if let BackendMessage::Connection(status) = msg {
                out.push(status);
            }
        }
        out
    }

    fn go_frame(raw: i32) -> MeasurementFrame {
        MeasurementFrame::from_channels(&[(raw, 0, 0x02); 8])
    }

    #[test]
    fn test_connect_attempt_success() {
        let mut h = harness();
        assert!(h.worker.connect_attempt());
        assert_eq!(h.worker.status, ConnectionStatus::Connected);
        assert_eq!(
            statuses(&h.messages),
            vec![ConnectionStatus::Connecting, ConnectionStatus::Connected]
        );
    }

    #[test]
    fn test_fatal_after_five_connect_failures() {
        let mut h = harness();
        {
            let mut state = h.device_state.lock().unwrap();
            for _ in 0..MAX_CONNECT_FAILURES {
                state.connect_results.push_back(0x80);
            }
        }

        for _ in 0..MAX_CONNECT_FAILURES {
            assert!(!h.worker.connect_attempt());
        }
        assert_eq!(h.worker.status, ConnectionStatus::Fatal);
        assert_eq!(h.worker.stats.failed_connects, u64::from(MAX_CONNECT_FAILURES));

        // A Connect command is the external restart that re-arms the loop
        h.commands.send(BackendCommand::Connect).unwrap();
        h.worker.process_commands();
        assert_eq!(h.worker.status, ConnectionStatus::Disconnected);
        assert_eq!(h.worker.connect_failures, 0);
        assert!(h.worker.connect_attempt());
    }

    #[test]
    fn test_poll_once_appends_and_notifies() {
        let mut h = harness();
        h.worker.connect_attempt();
        h.device_state
            .lock()
            .unwrap()
            .scripted_reads
            .push_back(ScriptedRead::Frame(go_frame(1234)));

        h.worker.poll_once();
        assert_eq!(h.worker.status, ConnectionStatus::Reading);
        assert_eq!(h.store.read(1).values, vec![12.34]);
        assert_eq!(h.store.read(6).values, vec![12.34]);
        // Channels beyond the configured count are not stored
        assert!(h.store.read(7).is_empty());

        let snapshot = h.snapshot.lock().unwrap().clone();
        let state = snapshot.get(1).unwrap();
        assert_eq!(state.value, 12.34);
        assert_eq!(state.judgment, Judgment::Go);
        assert!(state.timestamp.is_some());

        let updates: Vec<_> = {
            let mut out = Vec::new();
            while let Ok(msg) = h.messages.try_recv() {
                if let BackendMessage::DataUpdate(s) = msg {
                    out.push(s);
                }
            }
            out
        };
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].get(1).unwrap().value, 12.34);
    }

    #[test]
    fn test_poll_once_change_detection() {
        let mut h = harness();
        h.worker.connect_attempt();
        {
            let mut state = h.device_state.lock().unwrap();
            state.scripted_reads.push_back(ScriptedRead::Frame(go_frame(1000)));
            state.scripted_reads.push_back(ScriptedRead::Frame(go_frame(1000)));
            state.scripted_reads.push_back(ScriptedRead::Frame(go_frame(1001)));
        }

        h.worker.poll_once();
        h.worker.poll_once(); // identical frame: no update event
        h.worker.poll_once();

        let update_count = h
            .messages
            .try_iter()
            .filter(|msg| matches!(msg, BackendMessage::DataUpdate(_)))
            .count();
        assert_eq!(update_count, 2);

        // Every poll still lands in the store regardless of diffing
        assert_eq!(h.store.read(1).values, vec![10.0, 10.0, 10.01]);
    }

    #[test]
    fn test_read_failure_budget_forces_disconnect() {
        let mut h = harness();
        h.worker.connect_attempt();
        {
            let mut state = h.device_state.lock().unwrap();
            state.scripted_reads.push_back(ScriptedRead::Frame(go_frame(1234)));
            for _ in 0..MAX_READ_FAILURES {
                state.scripted_reads.push_back(ScriptedRead::Fail(0x20));
            }
        }

        h.worker.poll_once();
        assert_eq!(h.worker.status, ConnectionStatus::Reading);

        for _ in 0..MAX_READ_FAILURES {
            h.worker.poll_once();
        }

        assert_eq!(h.worker.status, ConnectionStatus::Disconnected);
        assert_eq!(h.worker.read_failures, 0);
        assert_eq!(h.device_state.lock().unwrap().close_calls, 1);

        // Snapshot reverted to sentinel/IDLE, history kept
        let snapshot = h.snapshot.lock().unwrap().clone();
        let state = snapshot.get(1).unwrap();
        assert_eq!(state.value, SENTINEL_VALUE);
        assert_eq!(state.judgment, Judgment::Idle);
        assert_eq!(h.store.read(1).values, vec![12.34]);
    }

    #[test]
    fn test_stale_connection_is_distinct_state() {
        let mut h = harness();
        h.worker.connect_attempt();
        {
            let mut state = h.device_state.lock().unwrap();
            state.scripted_reads.push_back(ScriptedRead::Frame(go_frame(1234)));
            state.scripted_reads.push_back(ScriptedRead::Fail(0x20));
        }

        h.worker.poll_once();
        assert_eq!(h.worker.status, ConnectionStatus::Reading);
        h.worker.poll_once();
        // One failure below the budget: connected but stale, not disconnected
        assert_eq!(h.worker.status, ConnectionStatus::Connected);
        assert_eq!(h.worker.read_failures, 1);
    }

    #[test]
    fn test_update_channel_count_preserves_history() {
        let mut h = harness();
        h.worker.connect_attempt();
        h.device_state
            .lock()
            .unwrap()
            .scripted_reads
            .push_back(ScriptedRead::Frame(go_frame(1234)));
        h.worker.poll_once();

        h.commands
            .send(BackendCommand::SetChannelCount(2))
            .unwrap();
        h.worker.process_commands();

        let snapshot = h.snapshot.lock().unwrap().clone();
        assert_eq!(snapshot.channel_count(), 2);
        // History for dropped channels stays in the store
        assert_eq!(h.store.read(6).values, vec![12.34]);
    }

    #[test]
    fn test_disconnect_command_resets_snapshot() {
        let mut h = harness();
        h.worker.connect_attempt();
        h.device_state
            .lock()
            .unwrap()
            .scripted_reads
            .push_back(ScriptedRead::Frame(go_frame(1234)));
        h.worker.poll_once();

        h.commands.send(BackendCommand::Disconnect).unwrap();
        h.worker.process_commands();

        assert_eq!(h.worker.status, ConnectionStatus::Disconnected);
        assert!(!h.worker.active);
        let snapshot = h.snapshot.lock().unwrap().clone();
        assert_eq!(snapshot.get(1).unwrap().judgment, Judgment::Idle);
        assert_eq!(h.device_state.lock().unwrap().close_calls, 1);
    }

    #[test]
    fn test_device_op_requires_connection() {
        let mut h = harness();
        h.commands.send(BackendCommand::ZeroReset).unwrap();
        h.worker.process_commands();

        let has_error = h
            .messages
            .try_iter()
            .any(|msg| matches!(msg, BackendMessage::DeviceError(e) if e.contains("not connected")));
        assert!(has_error);
        assert!(h.device_state.lock().unwrap().group_resets.is_empty());

        h.worker.connect_attempt();
        h.commands.send(BackendCommand::ZeroReset).unwrap();
        h.worker.process_commands();
        assert_eq!(
            h.device_state.lock().unwrap().group_resets,
            vec![ZERO_RESET_GROUP]
        );
    }
}
