//! Core data types for the CL-3000 monitor
//!
//! This module contains the fundamental data structures used throughout
//! the application for representing channels, measurements, and connection
//! state.
//!
//! # Main Types
//!
//! - [`Judgment`] - Pass/fail classification reported per channel
//! - [`ChannelReading`] - One decoded `(value, judgment)` pair from a frame
//! - [`Sample`] - A timestamped reading as stored in the rolling series
//! - [`LiveSnapshot`] - Latest known state of every configured channel
//! - [`ConnectionStatus`] - Poller state machine states
//!
//! # Sentinel values
//!
//! The device reports "no valid measurement" through a value-info flag
//! rather than a dedicated numeric encoding; the decoded value for such
//! channels is [`SENTINEL_VALUE`]. Consumers must treat both the sentinel
//! and IEEE NaN as invalid. The sentinel is distinct from absence of data:
//! a series can legitimately contain sentinel samples between valid ones.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Reserved value marking "no valid measurement" on a channel.
pub const SENTINEL_VALUE: f64 = -9999.98;

/// Maximum number of OUT channels the device exposes.
pub const MAX_CHANNELS: usize = 8;

/// Scale divisor converting raw integer measurements to micrometres.
pub const RAW_VALUE_SCALE: f64 = 100.0;

/// 1-based OUT channel number (1..=[`MAX_CHANNELS`]).
pub type ChannelId = u8;

/// Display label for a channel, matching the device's OUT numbering.
pub fn channel_label(channel: ChannelId) -> String {
    format!("OUT{:02}", channel)
}

/// Pass/fail classification of a measurement.
///
/// `Standby` means the device itself reported no valid reading while
/// connected; `Idle` means the monitor has no reading at all (before the
/// first poll or after a disconnect). The two must stay distinguishable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Judgment {
    /// Above the upper tolerance limit
    Hi,
    /// Within tolerance
    Go,
    /// Below the lower tolerance limit
    Lo,
    /// Device reported the value as invalid (warm-up, out of range, ...)
    Standby,
    /// No reading available from the monitor side
    #[default]
    Idle,
    /// Judgment bits carried no recognized flag
    Unknown,
}

impl Judgment {
    /// Decode a judgment bitmask from a measurement frame.
    ///
    /// The bits are not mutually exclusive in the wire protocol; the
    /// priority HI before LO before GO is a fixed tie-break and first
    /// match wins.
    pub fn from_bits(bits: u8) -> Self {
        if bits & 0x01 != 0 {
            Judgment::Hi
        } else if bits & 0x04 != 0 {
            Judgment::Lo
        } else if bits & 0x02 != 0 {
            Judgment::Go
        } else {
            Judgment::Unknown
        }
    }
}

impl std::fmt::Display for Judgment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Judgment::Hi => write!(f, "HI"),
            Judgment::Go => write!(f, "GO"),
            Judgment::Lo => write!(f, "LO"),
            Judgment::Standby => write!(f, "STANDBY"),
            Judgment::Idle => write!(f, "IDLE"),
            Judgment::Unknown => write!(f, "??"),
        }
    }
}

/// One decoded channel reading from a measurement frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelReading {
    /// Measured value in micrometres, or [`SENTINEL_VALUE`]
    pub value: f64,
    /// Judgment decoded from the frame
    pub judgment: Judgment,
}

impl ChannelReading {
    /// A reading representing "device reported no valid value".
    pub fn standby() -> Self {
        Self {
            value: SENTINEL_VALUE,
            judgment: Judgment::Standby,
        }
    }

    /// Whether the value is usable for plotting and aggregation.
    pub fn is_valid(&self) -> bool {
        is_valid_value(self.value)
    }
}

/// Whether a stored value is usable (neither the sentinel nor NaN).
pub fn is_valid_value(value: f64) -> bool {
    value != SENTINEL_VALUE && !value.is_nan()
}

/// A single timestamped measurement as stored in a rolling series.
///
/// Immutable once appended; timestamps within one channel's series are
/// non-decreasing because the polling worker is the only writer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    /// Wall-clock capture time
    pub timestamp: DateTime<Utc>,
    /// Measured value in micrometres, or [`SENTINEL_VALUE`]
    pub value: f64,
    /// Judgment at capture time
    pub judgment: Judgment,
}

impl Sample {
    pub fn new(timestamp: DateTime<Utc>, value: f64, judgment: Judgment) -> Self {
        Self {
            timestamp,
            value,
            judgment,
        }
    }

    /// Whether the value is usable for plotting and aggregation.
    pub fn is_valid(&self) -> bool {
        is_valid_value(self.value)
    }
}

/// Latest known state of one channel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelState {
    /// Last decoded value, or [`SENTINEL_VALUE`]
    pub value: f64,
    /// Last decoded judgment
    pub judgment: Judgment,
    /// Capture time of the last reading; `None` before the first poll
    /// and after a disconnect reset
    pub timestamp: Option<DateTime<Utc>>,
}

impl Default for ChannelState {
    fn default() -> Self {
        Self {
            value: SENTINEL_VALUE,
            judgment: Judgment::Idle,
            timestamp: None,
        }
    }
}

/// Latest known state of every configured channel.
///
/// Always carries one entry per configured channel - entries default to
/// sentinel/IDLE rather than being absent, so consumers never have to
/// handle a missing key.
#[derive(Debug, Clone, PartialEq)]
pub struct LiveSnapshot {
    states: Vec<ChannelState>,
}

impl LiveSnapshot {
    /// Create a snapshot with `channel_count` default (sentinel/IDLE) entries.
    pub fn new(channel_count: usize) -> Self {
        Self {
            states: vec![ChannelState::default(); channel_count.min(MAX_CHANNELS)],
        }
    }

    /// Number of configured channels.
    pub fn channel_count(&self) -> usize {
        self.states.len()
    }

    /// State of a channel (1-based). Returns `None` for unconfigured channels.
    pub fn get(&self, channel: ChannelId) -> Option<&ChannelState> {
        if channel == 0 {
            return None;
        }
        self.states.get(channel as usize - 1)
    }

    /// Replace the state of a channel (1-based). Out-of-range channels are
    /// ignored; the configured channel set only changes through `resize`.
    pub fn set(&mut self, channel: ChannelId, state: ChannelState) {
        if channel == 0 {
            return;
        }
        if let Some(slot) = self.states.get_mut(channel as usize - 1) {
            *slot = state;
        }
    }

    /// Resize to `channel_count` entries, dropping trailing entries or
    /// adding sentinel/IDLE defaults as needed.
    pub fn resize(&mut self, channel_count: usize) {
        self.states
            .resize(channel_count.min(MAX_CHANNELS), ChannelState::default());
    }

    /// Reset every entry to sentinel/IDLE, keeping the channel count.
    pub fn reset(&mut self) {
        for state in &mut self.states {
            *state = ChannelState::default();
        }
    }

    /// Iterate `(channel, state)` pairs with 1-based channel numbers.
    pub fn iter(&self) -> impl Iterator<Item = (ChannelId, &ChannelState)> {
        self.states
            .iter()
            .enumerate()
            .map(|(i, s)| ((i + 1) as ChannelId, s))
    }
}

/// Poller connection state.
///
/// `Reading` means frames are arriving; `Connected` without `Reading`
/// means the link is up but the last poll failed (stale data). `Fatal`
/// means the connect-retry budget is exhausted and polling has ceased
/// until an operator reconnects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionStatus {
    /// Not connected to the device
    #[default]
    Disconnected,
    /// Attempting to open the device
    Connecting,
    /// Connected, no successful read since the last state change
    Connected,
    /// Connected and receiving measurement frames
    Reading,
    /// Connect retries exhausted; requires an explicit reconnect
    Fatal,
}

impl ConnectionStatus {
    /// Whether the device link is currently open.
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionStatus::Connected | ConnectionStatus::Reading)
    }
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionStatus::Disconnected => write!(f, "Disconnected"),
            ConnectionStatus::Connecting => write!(f, "Connecting..."),
            ConnectionStatus::Connected => write!(f, "Connected"),
            ConnectionStatus::Reading => write!(f, "Reading"),
            ConnectionStatus::Fatal => write!(f, "Connection lost"),
        }
    }
}

/// Statistics about the polling loop, surfaced in the status bar.
#[derive(Debug, Clone, Default)]
pub struct PollerStats {
    /// Number of successfully decoded frames
    pub successful_reads: u64,
    /// Number of failed frame reads
    pub failed_reads: u64,
    /// Number of connect attempts that failed
    pub failed_connects: u64,
    /// Number of update messages dropped due to queue backpressure
    pub dropped_updates: u64,
    /// Last device error message, if any
    pub last_error: Option<String>,
}

impl PollerStats {
    /// Success rate as a percentage of all read attempts.
    pub fn success_rate(&self) -> f64 {
        let total = self.successful_reads + self.failed_reads;
        if total == 0 {
            100.0
        } else {
            (self.successful_reads as f64 / total as f64) * 100.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_judgment_decode() {
        assert_eq!(Judgment::from_bits(0x01), Judgment::Hi);
        assert_eq!(Judgment::from_bits(0x02), Judgment::Go);
        assert_eq!(Judgment::from_bits(0x04), Judgment::Lo);
        assert_eq!(Judgment::from_bits(0x00), Judgment::Unknown);
        assert_eq!(Judgment::from_bits(0xF8), Judgment::Unknown);
    }

    #[test]
    fn test_judgment_decode_priority() {
        // HI and GO both set: HI wins
        assert_eq!(Judgment::from_bits(0x03), Judgment::Hi);
        // LO and GO both set: LO wins
        assert_eq!(Judgment::from_bits(0x06), Judgment::Lo);
        // All three set: HI wins
        assert_eq!(Judgment::from_bits(0x07), Judgment::Hi);
    }

    #[test]
    fn test_sentinel_validity() {
        assert!(!is_valid_value(SENTINEL_VALUE));
        assert!(!is_valid_value(f64::NAN));
        assert!(is_valid_value(0.0));
        assert!(is_valid_value(-9999.97));
    }

    #[test]
    fn test_snapshot_defaults_present() {
        let snapshot = LiveSnapshot::new(6);
        assert_eq!(snapshot.channel_count(), 6);
        for (_, state) in snapshot.iter() {
            assert_eq!(state.value, SENTINEL_VALUE);
            assert_eq!(state.judgment, Judgment::Idle);
            assert!(state.timestamp.is_none());
        }
        assert!(snapshot.get(0).is_none());
        assert!(snapshot.get(7).is_none());
    }

    #[test]
    fn test_snapshot_resize() {
        let mut snapshot = LiveSnapshot::new(6);
        snapshot.set(
            6,
            ChannelState {
                value: 1.25,
                judgment: Judgment::Go,
                timestamp: Some(Utc::now()),
            },
        );

        snapshot.resize(4);
        assert_eq!(snapshot.channel_count(), 4);
        assert!(snapshot.get(6).is_none());

        snapshot.resize(8);
        assert_eq!(snapshot.channel_count(), 8);
        // Re-added channels come back as defaults, not stale values
        let state = snapshot.get(6).unwrap();
        assert_eq!(state.judgment, Judgment::Idle);
        assert_eq!(state.value, SENTINEL_VALUE);
    }

    #[test]
    fn test_snapshot_capped_at_max_channels() {
        let snapshot = LiveSnapshot::new(32);
        assert_eq!(snapshot.channel_count(), MAX_CHANNELS);
    }

    #[test]
    fn test_channel_label() {
        assert_eq!(channel_label(1), "OUT01");
        assert_eq!(channel_label(8), "OUT08");
    }

    #[test]
    fn test_connection_status_display() {
        assert_eq!(ConnectionStatus::Reading.to_string(), "Reading");
        assert!(ConnectionStatus::Reading.is_connected());
        assert!(ConnectionStatus::Connected.is_connected());
        assert!(!ConnectionStatus::Fatal.is_connected());
    }
}
