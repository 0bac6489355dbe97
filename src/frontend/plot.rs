//! Live graph view and refresh engine
//!
//! [`GraphView`] periodically recomputes everything the plot shows from
//! the rolling store, independent of the poll cadence: it re-resolves the
//! shared reference time over the currently selected channels, rebuilds
//! relative-time traces with invalid samples filtered out, and - while
//! auto-fit is enabled - recomputes an auto-scaled view over all visible
//! data.
//!
//! Any manual interaction with the plot (drag pan, wheel zoom, the zoom
//! buttons) switches auto-fit off, and the manual view is then retained
//! exactly until the operator re-enables auto-fit.
//!
//! Deselecting a channel hides its trace immediately without touching the
//! stored history; reselecting resumes plotting the full history.

use crate::config::GraphConfig;
use crate::data::{reference, RollingStore};
use crate::types::{channel_label, is_valid_value, ChannelId, Judgment};
use chrono::{DateTime, Utc};
use egui::Color32;
use egui_plot::{Corner, Legend, Line, MarkerShape, Plot, PlotBounds, PlotPoints, Points};
use std::time::{Duration, Instant};

/// Distinct trace colors for the eight OUT channels.
const CHANNEL_COLORS: [Color32; 8] = [
    Color32::from_rgb(0x00, 0xFF, 0x7F), // Spring Green
    Color32::from_rgb(0xFF, 0x6B, 0x6B), // Light Red
    Color32::from_rgb(0x4E, 0xCD, 0xC4), // Teal
    Color32::from_rgb(0xFF, 0xE6, 0x6D), // Yellow
    Color32::from_rgb(0xA8, 0xE6, 0xCF), // Light Green
    Color32::from_rgb(0xFF, 0x8B, 0x94), // Pink
    Color32::from_rgb(0xB4, 0xA7, 0xD6), // Light Purple
    Color32::from_rgb(0xFF, 0xD3, 0xA5), // Light Orange
];

/// Color assigned to a channel's trace.
pub fn channel_color(channel: ChannelId) -> Color32 {
    CHANNEL_COLORS[(channel.max(1) as usize - 1) % CHANNEL_COLORS.len()]
}

/// One channel's plot-ready data: relative-time points with the judgments
/// of the surviving (valid) samples, parallel by index.
#[derive(Debug, Clone, Default)]
pub struct ChannelTrace {
    pub channel: ChannelId,
    /// `[elapsed_seconds, value]` pairs, invalid samples removed
    pub points: Vec<[f64; 2]>,
    /// Judgment of each retained sample
    pub judgments: Vec<Judgment>,
}

/// Signed elapsed seconds from `reference` to `t`.
fn seconds_since(t: DateTime<Utc>, reference: DateTime<Utc>) -> f64 {
    let delta = t.signed_duration_since(reference);
    match delta.num_microseconds() {
        Some(us) => us as f64 / 1e6,
        None => delta.num_milliseconds() as f64 / 1e3,
    }
}

/// Shift all relative times so the minimum becomes exactly zero when any
/// of them is negative (reference chosen after a sample's timestamp).
fn shift_non_negative(times: &mut [f64]) {
    let min = times.iter().copied().fold(f64::INFINITY, f64::min);
    if min.is_finite() && min < 0.0 {
        let offset = min.abs();
        for t in times {
            *t += offset;
        }
    }
}

/// Live graph state: refresh cadence, view limits, and cached traces.
pub struct GraphView {
    /// Whether the view is recomputed from the data every refresh
    auto_fit: bool,
    /// Current X view range (seconds)
    x_bounds: (f64, f64),
    /// Current Y view range (micrometres)
    y_bounds: (f64, f64),
    /// Shared time zero, re-resolved every refresh
    reference_time: Option<DateTime<Utc>>,
    /// Refresh cadence, independent of the poll interval
    refresh_interval: Duration,
    last_refresh: Option<Instant>,
    /// Fallback view when no valid data exists
    default_x: (f64, f64),
    default_y: (f64, f64),
    /// Traces rebuilt on the last refresh
    traces: Vec<ChannelTrace>,
    /// Push `x_bounds`/`y_bounds` into the plot on the next frame
    /// (set by the zoom buttons; auto-fit pushes every frame)
    bounds_pending: bool,
}

impl GraphView {
    pub fn new(config: &GraphConfig) -> Self {
        Self {
            auto_fit: true,
            x_bounds: config.default_x_range,
            y_bounds: config.default_y_range,
            reference_time: None,
            refresh_interval: config.refresh_interval(),
            last_refresh: None,
            default_x: config.default_x_range,
            default_y: config.default_y_range,
            traces: Vec::new(),
            bounds_pending: false,
        }
    }

    /// Whether a refresh cycle is due.
    pub fn should_refresh(&self) -> bool {
        self.last_refresh
            .map_or(true, |t| t.elapsed() >= self.refresh_interval)
    }

    /// Force the next `should_refresh` to report true, so selection
    /// changes take effect immediately instead of on the next tick.
    pub fn mark_stale(&mut self) {
        self.last_refresh = None;
    }

    /// Whether auto-fit is currently enabled.
    pub fn auto_fit_enabled(&self) -> bool {
        self.auto_fit
    }

    /// Re-enable auto-fit after manual interaction.
    pub fn enable_auto_fit(&mut self) {
        self.auto_fit = true;
    }

    /// The reference time resolved on the last refresh.
    pub fn reference_time(&self) -> Option<DateTime<Utc>> {
        self.reference_time
    }

    /// Current view as `((x_min, x_max), (y_min, y_max))`.
    pub fn view(&self) -> ((f64, f64), (f64, f64)) {
        (self.x_bounds, self.y_bounds)
    }

    /// Traces built on the last refresh.
    pub fn traces(&self) -> &[ChannelTrace] {
        &self.traces
    }

    /// Run one refresh cycle: re-resolve the reference time, rebuild the
    /// selected channels' traces, and recompute the view when auto-fit is
    /// enabled.
    pub fn refresh(&mut self, selected: &[ChannelId], store: &RollingStore) {
        self.last_refresh = Some(Instant::now());
        self.reference_time = reference::resolve(selected, store);
        self.traces = Self::build_traces(selected, store, self.reference_time);

        if self.auto_fit {
            let (x, y) = compute_view(&self.traces, self.default_x, self.default_y);
            self.x_bounds = x;
            self.y_bounds = y;
        }
    }

    /// Build plot-ready traces for the selected channels.
    ///
    /// When `reference_time` is `None`, each channel falls back to its own
    /// first valid timestamp. Note that the fallback yields channel-local
    /// relative time, not cross-channel-aligned time.
    pub fn build_traces(
        selected: &[ChannelId],
        store: &RollingStore,
        reference_time: Option<DateTime<Utc>>,
    ) -> Vec<ChannelTrace> {
        selected
            .iter()
            .map(|&channel| {
                let series = store.read(channel);
                let mut timestamps = Vec::new();
                let mut values = Vec::new();
                let mut judgments = Vec::new();
                for sample in series.iter() {
                    if sample.is_valid() {
                        timestamps.push(sample.timestamp);
                        values.push(sample.value);
                        judgments.push(sample.judgment);
                    }
                }

                let Some(reference) = reference_time.or_else(|| timestamps.first().copied())
                else {
                    return ChannelTrace {
                        channel,
                        ..Default::default()
                    };
                };

                let mut times: Vec<f64> = timestamps
                    .iter()
                    .map(|&t| seconds_since(t, reference))
                    .collect();
                shift_non_negative(&mut times);

                ChannelTrace {
                    channel,
                    points: times
                        .into_iter()
                        .zip(values)
                        .map(|(t, v)| [t, v])
                        .collect(),
                    judgments,
                }
            })
            .collect()
    }

    /// Zoom both axes in around the view center. Disables auto-fit.
    pub fn zoom_in(&mut self) {
        self.zoom_by(0.7);
    }

    /// Zoom both axes out around the view center. Disables auto-fit.
    pub fn zoom_out(&mut self) {
        self.zoom_by(1.3);
    }

    fn zoom_by(&mut self, factor: f64) {
        self.auto_fit = false;
        let (x_min, x_max) = self.x_bounds;
        let (y_min, y_max) = self.y_bounds;
        let x_center = (x_min + x_max) / 2.0;
        let y_center = (y_min + y_max) / 2.0;
        let x_half = (x_max - x_min) * factor / 2.0;
        let y_half = (y_max - y_min) * factor / 2.0;
        self.x_bounds = ((x_center - x_half).max(0.0), x_center + x_half);
        self.y_bounds = (y_center - y_half, y_center + y_half);
        self.bounds_pending = true;
    }

    /// Reset the view to the fallback default range.
    pub fn reset_view(&mut self) {
        self.x_bounds = self.default_x;
        self.y_bounds = self.default_y;
        self.bounds_pending = true;
    }

    /// Render the plot and handle view interactions.
    pub fn ui(&mut self, ui: &mut egui::Ui) {
        let plot = Plot::new("live_multi_channel_plot")
            .legend(
                Legend::default()
                    .position(Corner::RightTop)
                    .background_alpha(0.8),
            )
            .x_axis_label("Time (s)")
            .y_axis_label("Thickness (\u{00b5}m)")
            .allow_zoom(true)
            .allow_drag(true)
            .allow_scroll(true)
            .allow_boxed_zoom(true)
            .show_grid(true);

        let set_bounds = self.auto_fit || self.bounds_pending;
        self.bounds_pending = false;
        let (x_bounds, y_bounds) = (self.x_bounds, self.y_bounds);
        let traces = &self.traces;

        let response = plot.show(ui, |plot_ui| {
            if set_bounds {
                plot_ui.set_plot_bounds(PlotBounds::from_min_max(
                    [x_bounds.0, y_bounds.0],
                    [x_bounds.1, y_bounds.1],
                ));
            }

            for trace in traces {
                if trace.points.is_empty() {
                    continue;
                }
                let color = channel_color(trace.channel);
                let line = Line::new(
                    channel_label(trace.channel),
                    PlotPoints::from(trace.points.clone()),
                )
                .color(color)
                .width(2.0);
                plot_ui.line(line);

                render_judgment_markers(plot_ui, trace, color);
            }
        });

        // Any manual pan/zoom gesture flips auto-fit off; the manual view
        // is then whatever egui's transform settled on.
        let mut interacted = response.response.dragged();
        if response.response.hovered() {
            let (scroll, zoom) = ui.input(|i| (i.raw_scroll_delta, i.zoom_delta()));
            interacted |= scroll.y.abs() > 0.0 || (zoom - 1.0).abs() > f32::EPSILON;
        }
        if interacted && self.auto_fit {
            self.auto_fit = false;
            tracing::debug!("Auto-fit disabled by manual plot interaction");
        }
        if !self.auto_fit && !set_bounds {
            let bounds = response.transform.bounds();
            self.x_bounds = (bounds.min()[0], bounds.max()[0]);
            self.y_bounds = (bounds.min()[1], bounds.max()[1]);
        }
    }
}

/// Overlay markers for judged samples: HI above, LO below, GO dots.
fn render_judgment_markers(plot_ui: &mut egui_plot::PlotUi, trace: &ChannelTrace, color: Color32) {
    let by_judgment = |wanted: Judgment| -> Vec<[f64; 2]> {
        trace
            .points
            .iter()
            .zip(&trace.judgments)
            .filter(|(_, &j)| j == wanted)
            .map(|(&p, _)| p)
            .collect()
    };

    let hi = by_judgment(Judgment::Hi);
    if !hi.is_empty() {
        plot_ui.points(
            Points::new("", PlotPoints::from(hi))
                .shape(MarkerShape::Up)
                .radius(3.0)
                .color(color),
        );
    }
    let lo = by_judgment(Judgment::Lo);
    if !lo.is_empty() {
        plot_ui.points(
            Points::new("", PlotPoints::from(lo))
                .shape(MarkerShape::Down)
                .radius(3.0)
                .color(color),
        );
    }
}

/// Compute the auto-fit view over all traces.
///
/// X is padded by `max(1.0, range * 0.1)` with the lower edge clamped at
/// zero; Y is padded by `max(5.0, range * 0.1)`, so a flat trace still
/// gets a visible band. Without any valid data the defaults are returned.
pub fn compute_view(
    traces: &[ChannelTrace],
    default_x: (f64, f64),
    default_y: (f64, f64),
) -> ((f64, f64), (f64, f64)) {
    let mut x_min = f64::INFINITY;
    let mut x_max = f64::NEG_INFINITY;
    let mut y_min = f64::INFINITY;
    let mut y_max = f64::NEG_INFINITY;
    let mut any = false;

    for trace in traces {
        for &[x, y] in &trace.points {
            debug_assert!(is_valid_value(y));
            any = true;
            x_min = x_min.min(x);
            x_max = x_max.max(x);
            y_min = y_min.min(y);
            y_max = y_max.max(y);
        }
    }

    if !any {
        return (default_x, default_y);
    }

    let x_pad = ((x_max - x_min) * 0.1).max(1.0);
    let y_pad = ((y_max - y_min) * 0.1).max(5.0);
    (
        ((x_min - x_pad).max(0.0), x_max + x_pad),
        (y_min - y_pad, y_max + y_pad),
    )
}
