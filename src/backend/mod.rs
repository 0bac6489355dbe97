//! Backend module for device polling
//!
//! This module handles all device communication in a separate thread to
//! keep the UI responsive. It uses crossbeam channels for thread-safe
//! communication with the frontend.
//!
//! # Architecture
//!
//! - [`BackendCommand`] - Messages sent from UI to backend (connect, channel
//!   count, storage control, shutdown, ...)
//! - [`BackendMessage`] - Messages sent from backend to UI (snapshot
//!   updates, connection status, stats)
//! - [`FrontendReceiver`] - UI-side handle for sending commands and
//!   receiving messages
//! - [`LiveBackend`] - Backend entry point that owns the worker thread
//!
//! The rolling sample store is shared directly: the worker is its only
//! writer, the UI reads snapshot copies. The latest-value snapshot is
//! additionally mirrored behind a mutex so the UI can query "current data"
//! without waiting for the next update event.
//!
//! # Example
//!
//! ```ignore
//! use cl3000_monitor::backend::LiveBackend;
//! use cl3000_monitor::config::AppConfig;
//!
//! let config = AppConfig::default();
//! let (backend, frontend) = LiveBackend::spawn(&config, Box::new(device));
//!
//! frontend.connect();
//! for msg in frontend.drain() {
//!     // handle BackendMessage
//! }
//! backend.stop();
//! ```

pub mod device;
#[cfg(feature = "mock-device")]
pub mod mock_device;
pub mod reader;
pub mod sdk;
pub mod worker;

pub use device::{MeasurementDevice, MeasurementFrame, RawChannelData};
#[cfg(feature = "mock-device")]
pub use mock_device::{MockDataPattern, MockDevice, MockDeviceState, ScriptedRead};
pub use reader::FrameDecoder;
pub use sdk::Cl3Device;
pub use worker::PollerWorker;

use crate::config::{AppConfig, STOP_JOIN_TIMEOUT};
use crate::data::RollingStore;
use crate::types::{ConnectionStatus, LiveSnapshot, PollerStats};
use crossbeam_channel::{bounded, Receiver, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Message sent from the UI to the backend.
#[derive(Debug, Clone)]
pub enum BackendCommand {
    /// Start (or restart, after a fatal condition) live polling
    Connect,
    /// Stop live polling and close the device
    Disconnect,
    /// Change the number of decoded/displayed channels (1-8)
    SetChannelCount(u8),
    /// Change the poll interval
    SetPollInterval(Duration),
    /// Clear all rolling series
    ClearData,
    /// Execute a zero reset on the device
    ZeroReset,
    /// Discard the device's internal storage buffer
    ClearStorage,
    /// Start device-side storage accumulation
    StartStorage,
    /// Stop device-side storage accumulation
    StopStorage,
    /// Shut the backend down
    Shutdown,
}

/// Message sent from the backend to the UI.
#[derive(Debug, Clone)]
pub enum BackendMessage {
    /// Connection status changed
    Connection(ConnectionStatus),
    /// A connect attempt or device operation failed
    DeviceError(String),
    /// The latest-value snapshot changed; carries a full copy
    DataUpdate(LiveSnapshot),
    /// Periodic polling statistics
    Stats(PollerStats),
    /// Backend is shutting down
    Shutdown,
}

/// Frontend-side handle: receives backend messages, sends commands, and
/// can query the latest snapshot directly.
pub struct FrontendReceiver {
    /// Receiver for backend messages
    pub receiver: Receiver<BackendMessage>,
    /// Sender for commands to the backend
    pub command_sender: Sender<BackendCommand>,
    /// Mirror of the latest-value snapshot, written by the worker
    snapshot: Arc<Mutex<LiveSnapshot>>,
}

impl FrontendReceiver {
    /// Receive all pending messages without blocking.
    pub fn drain(&self) -> Vec<BackendMessage> {
        let mut messages = Vec::new();
        while let Ok(msg) = self.receiver.try_recv() {
            messages.push(msg);
        }
        messages
    }

    /// Copy of the latest-value snapshot.
    pub fn current_data(&self) -> LiveSnapshot {
        self.snapshot
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Send a command to the backend.
    pub fn send_command(&self, cmd: BackendCommand) -> bool {
        self.command_sender.send(cmd).is_ok()
    }

    /// Request live polling to start.
    pub fn connect(&self) {
        let _ = self.command_sender.send(BackendCommand::Connect);
    }

    /// Request live polling to stop.
    pub fn disconnect(&self) {
        let _ = self.command_sender.send(BackendCommand::Disconnect);
    }

    /// Change the configured channel count.
    pub fn set_channel_count(&self, count: u8) {
        let _ = self
            .command_sender
            .send(BackendCommand::SetChannelCount(count));
    }

    /// Change the poll interval.
    pub fn set_poll_interval(&self, interval: Duration) {
        let _ = self
            .command_sender
            .send(BackendCommand::SetPollInterval(interval));
    }

    /// Clear all rolling series.
    pub fn clear_data(&self) {
        let _ = self.command_sender.send(BackendCommand::ClearData);
    }

    /// Execute a zero reset on the device.
    pub fn zero_reset(&self) {
        let _ = self.command_sender.send(BackendCommand::ZeroReset);
    }

    /// Request shutdown.
    pub fn shutdown(&self) {
        let _ = self.command_sender.send(BackendCommand::Shutdown);
    }
}

/// The live-polling backend. Owns the worker thread.
pub struct LiveBackend {
    running: Arc<AtomicBool>,
    handle: Option<std::thread::JoinHandle<()>>,
    command_sender: Sender<BackendCommand>,
}

impl LiveBackend {
    /// Spawn the worker thread and return the backend handle together with
    /// the frontend receiver and the shared sample store.
    pub fn spawn(
        config: &AppConfig,
        device: Box<dyn MeasurementDevice>,
    ) -> (Self, FrontendReceiver, Arc<RollingStore>) {
        let (cmd_tx, cmd_rx) = bounded(256);
        // Bounded message channel for backpressure; the UI drains it every
        // frame so this only fills when the UI stalls.
        let (msg_tx, msg_rx) = bounded(1024);

        let store = Arc::new(RollingStore::new(config.acquisition.series_capacity));
        let channel_count = config.acquisition.clamped_channel_count() as usize;
        let snapshot = Arc::new(Mutex::new(LiveSnapshot::new(channel_count)));
        let running = Arc::new(AtomicBool::new(true));

        let mut worker = PollerWorker::new(
            config,
            device,
            cmd_rx,
            msg_tx,
            Arc::clone(&running),
            Arc::clone(&store),
            Arc::clone(&snapshot),
        );
        let handle = std::thread::Builder::new()
            .name("cl3000-poller".to_string())
            .spawn(move || worker.run())
            .ok();

        let backend = Self {
            running,
            handle,
            command_sender: cmd_tx.clone(),
        };
        let frontend = FrontendReceiver {
            receiver: msg_rx,
            command_sender: cmd_tx,
            snapshot,
        };
        (backend, frontend, store)
    }

    /// Signal the worker to stop and wait (bounded) for it to exit.
    ///
    /// Idempotent: subsequent calls return immediately. The worker closes
    /// the device exactly once on its way out, including when stop lands
    /// during a connect-retry backoff.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        let _ = self.command_sender.send(BackendCommand::Shutdown);

        if let Some(handle) = self.handle.take() {
            let deadline = Instant::now() + STOP_JOIN_TIMEOUT;
            while !handle.is_finished() && Instant::now() < deadline {
                std::thread::sleep(Duration::from_millis(10));
            }
            if handle.is_finished() {
                let _ = handle.join();
            } else {
                tracing::warn!("Poller thread did not stop within {:?}", STOP_JOIN_TIMEOUT);
            }
        }
    }
}

impl Drop for LiveBackend {
    fn drop(&mut self) {
        self.stop();
    }
}
