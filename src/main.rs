//! CL-3000 Monitor - Main Entry Point
//!
//! This application provides real-time multi-channel visualization of
//! displacement measurements from CL-3000 devices.

use cl3000_monitor::backend::{LiveBackend, MeasurementDevice};
use cl3000_monitor::config::AppConfig;
use cl3000_monitor::frontend::MonitorApp;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn main() -> eframe::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,cl3000_monitor=debug")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting CL-3000 Monitor");

    let config = AppConfig::load_or_default();
    tracing::info!(
        "Device {} / {} channels / {:?} poll interval",
        config.device.address_string(),
        config.acquisition.clamped_channel_count(),
        config.acquisition.poll_interval()
    );

    let device = create_device();
    let (mut backend, frontend, store) = LiveBackend::spawn(&config, device);

    // Begin polling right away; the UI can disconnect if unwanted
    frontend.connect();

    let native_options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1280.0, 800.0])
            .with_min_inner_size([900.0, 600.0])
            .with_title("CL-3000 Monitor"),
        ..Default::default()
    };

    let result = eframe::run_native(
        "CL-3000 Monitor",
        native_options,
        Box::new(|cc| {
            cc.egui_ctx.set_visuals(egui::Visuals::dark());
            Ok(Box::new(MonitorApp::new(cc, frontend, store, config)))
        }),
    );

    tracing::info!("Shutting down...");
    backend.stop();

    result
}

/// Select the device implementation: the mock when requested (or when the
/// feature is the only option), the vendor SDK otherwise.
fn create_device() -> Box<dyn MeasurementDevice> {
    #[cfg(feature = "mock-device")]
    if std::env::var_os("CL3000_MOCK").is_some() {
        tracing::info!("Using mock device (CL3000_MOCK set)");
        return Box::new(cl3000_monitor::backend::MockDevice::new());
    }
    Box::new(cl3000_monitor::backend::Cl3Device::new())
}
