//! Frontend module for the egui UI
//!
//! This module provides the main UI using eframe/egui. It receives
//! snapshot updates and status changes from the backend through crossbeam
//! channels and reads plot data as copies out of the shared rolling store.
//!
//! # Layout
//!
//! - Left panel: connection controls, acquisition settings, device
//!   operations, channel selection
//! - Central panel: the live multi-channel graph with view controls
//! - Bottom panel: connection state, poll statistics, last error
//!
//! No blocking device call ever happens on the UI thread; everything goes
//! through backend commands. The graph refresh runs on its own interval
//! inside `update`, decoupled from both the frame rate and the poll rate.

pub mod plot;

pub use plot::{channel_color, compute_view, ChannelTrace, GraphView};

use crate::backend::{BackendMessage, FrontendReceiver};
use crate::config::AppConfig;
use crate::data::RollingStore;
use crate::types::{
    channel_label, ChannelId, ConnectionStatus, Judgment, LiveSnapshot, PollerStats,
    SENTINEL_VALUE, MAX_CHANNELS,
};
use egui::{Color32, RichText};
use std::sync::Arc;
use std::time::Duration;

/// Which channels are shown on the graph. Selection is display-only:
/// acquisition always covers every configured channel.
#[derive(Debug, Clone)]
pub struct ChannelSelection {
    selected: [bool; MAX_CHANNELS],
    channel_count: u8,
}

impl ChannelSelection {
    /// All configured channels selected.
    pub fn new(channel_count: u8) -> Self {
        Self {
            selected: [true; MAX_CHANNELS],
            channel_count: channel_count.clamp(1, MAX_CHANNELS as u8),
        }
    }

    pub fn channel_count(&self) -> u8 {
        self.channel_count
    }

    /// Change the configured channel count. Channels that reappear after
    /// having been dropped come back selected, like at startup.
    pub fn set_channel_count(&mut self, count: u8) {
        let count = count.clamp(1, MAX_CHANNELS as u8);
        for i in self.channel_count..count {
            self.selected[i as usize] = true;
        }
        self.channel_count = count;
    }

    pub fn is_selected(&self, channel: ChannelId) -> bool {
        channel >= 1
            && channel <= self.channel_count
            && self.selected[channel as usize - 1]
    }

    pub fn toggle(&mut self, channel: ChannelId) {
        if channel >= 1 && channel <= self.channel_count {
            self.selected[channel as usize - 1] = !self.selected[channel as usize - 1];
        }
    }

    /// Currently selected channels in ascending order.
    pub fn selected_channels(&self) -> Vec<ChannelId> {
        (1..=self.channel_count)
            .filter(|&c| self.selected[c as usize - 1])
            .collect()
    }
}

/// Color used to render a judgment label.
fn judgment_color(judgment: Judgment) -> Color32 {
    match judgment {
        Judgment::Go => Color32::from_rgb(0x00, 0xE6, 0x76),
        Judgment::Hi => Color32::from_rgb(0xF4, 0x43, 0x36),
        Judgment::Lo => Color32::from_rgb(0xFF, 0x98, 0x00),
        Judgment::Standby => Color32::GRAY,
        Judgment::Idle => Color32::DARK_GRAY,
        Judgment::Unknown => Color32::LIGHT_GRAY,
    }
}

/// Main application state.
pub struct MonitorApp {
    frontend: FrontendReceiver,
    store: Arc<RollingStore>,
    config: AppConfig,
    selection: ChannelSelection,
    graph: GraphView,
    status: ConnectionStatus,
    stats: PollerStats,
    snapshot: LiveSnapshot,
    last_error: Option<String>,
    /// Poll interval being edited in the side panel, in seconds
    poll_interval_edit: f64,
    storage_active: bool,
}

impl MonitorApp {
    pub fn new(
        _cc: &eframe::CreationContext<'_>,
        frontend: FrontendReceiver,
        store: Arc<RollingStore>,
        config: AppConfig,
    ) -> Self {
        let channel_count = config.acquisition.clamped_channel_count();
        let snapshot = frontend.current_data();
        Self {
            frontend,
            store,
            selection: ChannelSelection::new(channel_count),
            graph: GraphView::new(&config.graph),
            status: ConnectionStatus::Disconnected,
            stats: PollerStats::default(),
            snapshot,
            last_error: None,
            poll_interval_edit: config.acquisition.poll_interval_secs,
            storage_active: false,
            config,
        }
    }

    /// Drain and apply pending backend messages.
    fn process_messages(&mut self) {
        for msg in self.frontend.drain() {
            match msg {
                BackendMessage::Connection(status) => {
                    self.status = status;
                    if status.is_connected() {
                        self.last_error = None;
                    }
                }
                BackendMessage::DataUpdate(snapshot) => {
                    self.snapshot = snapshot;
                }
                BackendMessage::Stats(stats) => {
                    self.stats = stats;
                }
                BackendMessage::DeviceError(error) => {
                    self.last_error = Some(error);
                }
                BackendMessage::Shutdown => {
                    self.status = ConnectionStatus::Disconnected;
                }
            }
        }
    }

    fn control_panel(&mut self, ui: &mut egui::Ui) {
        ui.heading("Control Panel");
        ui.separator();

        ui.label(format!("Device: {}", self.config.device.address_string()));
        ui.add_space(4.0);

        match self.status {
            ConnectionStatus::Disconnected | ConnectionStatus::Fatal => {
                if ui.button("Connect").clicked() {
                    self.frontend.connect();
                }
                if self.status == ConnectionStatus::Fatal {
                    ui.colored_label(
                        judgment_color(Judgment::Hi),
                        "Connection given up after repeated failures",
                    );
                }
            }
            _ => {
                if ui.button("Disconnect").clicked() {
                    self.frontend.disconnect();
                }
            }
        }

        ui.add_space(8.0);
        ui.separator();
        ui.label("Output channels");
        let mut channel_count = self.selection.channel_count();
        egui::ComboBox::from_id_salt("channel_count")
            .selected_text(format!("{}", channel_count))
            .show_ui(ui, |ui| {
                for count in 1..=MAX_CHANNELS as u8 {
                    ui.selectable_value(&mut channel_count, count, format!("{}", count));
                }
            });
        if channel_count != self.selection.channel_count() {
            self.selection.set_channel_count(channel_count);
            self.config.acquisition.channel_count = channel_count;
            self.frontend.set_channel_count(channel_count);
            self.graph.mark_stale();
        }

        ui.add_space(4.0);
        ui.label("Poll interval (s)");
        let response = ui.add(
            egui::Slider::new(&mut self.poll_interval_edit, 0.1..=5.0).logarithmic(true),
        );
        if response.drag_stopped() || response.lost_focus() {
            self.config.acquisition.poll_interval_secs = self.poll_interval_edit;
            self.frontend
                .set_poll_interval(Duration::from_secs_f64(self.poll_interval_edit));
        }

        ui.add_space(8.0);
        ui.separator();
        ui.label("Device operations");
        ui.horizontal(|ui| {
            if ui.button("Zero reset").clicked() {
                self.frontend.zero_reset();
            }
            if ui.button("Clear storage").clicked() {
                self.frontend
                    .send_command(crate::backend::BackendCommand::ClearStorage);
            }
        });
        ui.horizontal(|ui| {
            if self.storage_active {
                if ui.button("Stop storage").clicked() {
                    self.frontend
                        .send_command(crate::backend::BackendCommand::StopStorage);
                    self.storage_active = false;
                }
            } else if ui.button("Start storage").clicked() {
                self.frontend
                    .send_command(crate::backend::BackendCommand::StartStorage);
                self.storage_active = true;
            }
        });

        ui.add_space(8.0);
        ui.separator();
        ui.label("Channels to display");
        for channel in 1..=self.selection.channel_count() {
            let mut selected = self.selection.is_selected(channel);
            let label =
                RichText::new(channel_label(channel)).color(channel_color(channel));
            if ui.checkbox(&mut selected, label).changed() {
                self.selection.toggle(channel);
                // Reference time and traces re-derive right away
                self.graph.mark_stale();
            }
        }

        ui.add_space(8.0);
        ui.separator();
        self.channel_grid(ui);
    }

    /// Latest value and judgment per channel, like the original grid view.
    fn channel_grid(&self, ui: &mut egui::Ui) {
        ui.label("Live channel data");
        egui::Grid::new("channel_grid").striped(true).show(ui, |ui| {
            for (channel, state) in self.snapshot.iter() {
                ui.colored_label(channel_color(channel), channel_label(channel));
                if state.value == SENTINEL_VALUE {
                    ui.label("----.-- \u{00b5}m");
                } else {
                    ui.label(format!("{:7.2} \u{00b5}m", state.value));
                }
                ui.colored_label(
                    judgment_color(state.judgment),
                    state.judgment.to_string(),
                );
                ui.end_row();
            }
        });
    }

    fn graph_controls(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            if ui.button("\u{1F50D}+").clicked() {
                self.graph.zoom_in();
            }
            if ui.button("\u{1F50D}-").clicked() {
                self.graph.zoom_out();
            }
            let auto_fit = self.graph.auto_fit_enabled();
            if ui
                .add_enabled(!auto_fit, egui::Button::new("Auto Fit"))
                .clicked()
            {
                self.graph.enable_auto_fit();
            }
            if ui.button("Clear Graph").clicked() {
                self.frontend.clear_data();
                self.graph.reset_view();
                self.graph.mark_stale();
            }
            ui.label(
                RichText::new("Drag = pan | Wheel = zoom | Select channels on the left")
                    .small()
                    .weak(),
            );
        });
    }

    fn status_bar(&self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            let status_color = match self.status {
                ConnectionStatus::Reading => judgment_color(Judgment::Go),
                ConnectionStatus::Connected | ConnectionStatus::Connecting => {
                    judgment_color(Judgment::Lo)
                }
                ConnectionStatus::Disconnected => Color32::GRAY,
                ConnectionStatus::Fatal => judgment_color(Judgment::Hi),
            };
            ui.colored_label(status_color, self.status.to_string());
            ui.separator();
            ui.label(format!(
                "Reads: {} ok / {} failed ({:.1}%)",
                self.stats.successful_reads,
                self.stats.failed_reads,
                self.stats.success_rate()
            ));
            if let Some(error) = &self.last_error {
                ui.separator();
                ui.colored_label(judgment_color(Judgment::Hi), error);
            }
        });
    }
}

impl eframe::App for MonitorApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.process_messages();

        // Graph refresh runs on its own cadence, not every frame
        if self.graph.should_refresh() {
            let selected = self.selection.selected_channels();
            self.graph.refresh(&selected, &self.store);
        }

        egui::SidePanel::left("control_panel")
            .default_width(260.0)
            .show(ctx, |ui| {
                egui::ScrollArea::vertical().show(ui, |ui| {
                    self.control_panel(ui);
                });
            });

        egui::TopBottomPanel::bottom("status_bar").show(ctx, |ui| {
            self.status_bar(ui);
        });

        egui::CentralPanel::default().show(ctx, |ui| {
            ui.heading("Multi-Channel Live Data Graph");
            self.graph_controls(ui);
            self.graph.ui(ui);
        });

        // Wake up in time for the next refresh even without input events
        ctx.request_repaint_after(Duration::from_millis(100));
    }

    fn on_exit(&mut self, _gl: Option<&eframe::glow::Context>) {
        self.frontend.shutdown();
        if let Err(e) = self.config.save_default() {
            tracing::warn!("Failed to save config: {}", e);
        }
    }
}
