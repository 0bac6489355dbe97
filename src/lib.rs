//! # CL-3000 Monitor: live displacement measurement viewer
//!
//! A real-time monitor for CL-3000 displacement measurement devices. A
//! background worker polls the device over the vendor communication SDK
//! and feeds a bounded rolling history per channel; the UI renders the
//! selected channels on an auto-scaled multi-channel time-series graph.
//!
//! ## Architecture
//!
//! - **Backend**: owns the device handle and polls it on a dedicated
//!   thread, with connect retry/backoff and consecutive-failure budgets
//! - **Data**: the rolling store is the shared boundary - the worker is
//!   the only writer, the UI reads snapshot copies
//! - **Frontend**: eframe/egui UI with an egui_plot graph that refreshes
//!   on its own cadence, independent of the poll rate
//! - **Communication**: crossbeam channels for commands and notifications
//!
//! ## Example
//!
//! ```ignore
//! use cl3000_monitor::{backend::LiveBackend, config::AppConfig, frontend::MonitorApp};
//!
//! fn main() -> eframe::Result<()> {
//!     let config = AppConfig::load_or_default();
//!     let device = Box::new(cl3000_monitor::backend::Cl3Device::new());
//!     let (backend, frontend, store) = LiveBackend::spawn(&config, device);
//!
//!     let native_options = eframe::NativeOptions::default();
//!     eframe::run_native(
//!         "CL-3000 Monitor",
//!         native_options,
//!         Box::new(|cc| Ok(Box::new(MonitorApp::new(cc, frontend, store, config)))),
//!     )
//!     // `backend` stops (and closes the device) on drop
//! }
//! ```

pub mod app;
pub mod backend;
pub mod config;
pub mod data;
pub mod error;
pub mod frontend;
pub mod types;

// Re-export commonly used types
pub use app::MonitorApp;
pub use backend::{BackendCommand, BackendMessage, FrontendReceiver, LiveBackend};
pub use config::AppConfig;
pub use data::{RollingStore, SeriesSnapshot};
pub use error::{DeviceError, MonitorError, Result};
pub use types::{ChannelReading, ConnectionStatus, Judgment, LiveSnapshot, Sample};
