//! Mock measurement device for testing and hardware-free runs
//!
//! This module provides a mock implementation of [`MeasurementDevice`]
//! that can stand in for the vendor SDK. It serves two purposes:
//!
//! - **Waveform generation** for running the application without a device:
//!   each channel produces a phase-shifted waveform with GO judgment.
//! - **Scripted behavior** for tests: connect attempts and frame reads can
//!   be scripted to fail with specific status codes, and the shared
//!   [`MockDeviceState`] handle lets tests assert open/close counts after
//!   the device has moved onto the worker thread.
//!
//! # Enabling
//!
//! The mock device is gated behind the `mock-device` feature, which is
//! enabled by default:
//!
//! ```bash
//! cargo run --no-default-features   # hardware only
//! ```

use crate::config::DeviceConfig;
use crate::error::{DeviceError, DeviceResult};
use crate::types::MAX_CHANNELS;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use super::device::{MeasurementDevice, MeasurementFrame, RawChannelData};

/// Pattern for generating mock channel data.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MockDataPattern {
    /// Constant value in micrometres
    Constant(f64),
    /// Sine wave in micrometres
    Sine {
        frequency: f64,
        amplitude: f64,
        offset: f64,
    },
    /// Linear ramp in micrometres per second
    Ramp { slope: f64, offset: f64 },
}

impl Default for MockDataPattern {
    fn default() -> Self {
        MockDataPattern::Sine {
            frequency: 0.2,
            amplitude: 25.0,
            offset: 50.0,
        }
    }
}

impl MockDataPattern {
    /// Generate a value for `channel` (0-based) at `elapsed_secs`.
    /// Channels are phase/offset shifted so traces stay distinguishable.
    fn generate(&self, channel: usize, elapsed_secs: f64) -> f64 {
        match *self {
            MockDataPattern::Constant(v) => v + channel as f64 * 5.0,
            MockDataPattern::Sine {
                frequency,
                amplitude,
                offset,
            } => {
                let phase = channel as f64 * std::f64::consts::FRAC_PI_4;
                offset
                    + amplitude
                        * (2.0 * std::f64::consts::PI * frequency * elapsed_secs + phase).sin()
            }
            MockDataPattern::Ramp { slope, offset } => {
                offset + channel as f64 * 5.0 + slope * elapsed_secs
            }
        }
    }
}

/// One scripted outcome for a frame read.
#[derive(Debug, Clone)]
pub enum ScriptedRead {
    /// Return this frame
    Frame(MeasurementFrame),
    /// Fail with this vendor status code
    Fail(i32),
}

/// Shared mock state, inspectable from tests while the device itself is
/// owned by the worker thread.
#[derive(Debug, Default)]
pub struct MockDeviceState {
    /// Number of `open` calls observed
    pub open_calls: u32,
    /// Number of `close` calls that actually closed an open device
    pub close_calls: u32,
    /// Scripted status codes for upcoming opens (0 = success). When the
    /// queue is empty, opens succeed.
    pub connect_results: VecDeque<i32>,
    /// Scripted outcomes for upcoming reads. When the queue is empty,
    /// reads fall back to waveform generation.
    pub scripted_reads: VecDeque<ScriptedRead>,
    /// Whether device-side storage is accumulating
    pub storage_active: bool,
    /// Number of storage clears observed
    pub storage_clears: u32,
    /// Group resets observed, in order
    pub group_resets: Vec<u16>,
}

/// Mock implementation of [`MeasurementDevice`].
pub struct MockDevice {
    state: Arc<Mutex<MockDeviceState>>,
    pattern: MockDataPattern,
    open: bool,
    started: Instant,
}

impl MockDevice {
    /// Create a mock device with the default waveform pattern.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockDeviceState::default())),
            pattern: MockDataPattern::default(),
            open: false,
            started: Instant::now(),
        }
    }

    /// Use a specific waveform pattern.
    pub fn with_pattern(mut self, pattern: MockDataPattern) -> Self {
        self.pattern = pattern;
        self
    }

    /// Handle to the shared state for scripting and assertions.
    pub fn state_handle(&self) -> Arc<Mutex<MockDeviceState>> {
        Arc::clone(&self.state)
    }

    fn generate_frame(&self) -> MeasurementFrame {
        let elapsed = self.started.elapsed().as_secs_f64();
        let mut frame = MeasurementFrame::default();
        for (channel, slot) in frame.channels.iter_mut().enumerate().take(MAX_CHANNELS) {
            let value = self.pattern.generate(channel, elapsed);
            *slot = RawChannelData {
                raw_value: (value * 100.0).round() as i32,
                value_info: 0,
                judge_bits: 0x02,
            };
        }
        frame
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockDeviceState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for MockDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl MeasurementDevice for MockDevice {
    fn open(&mut self, _config: &DeviceConfig) -> DeviceResult<()> {
        let mut state = self.lock();
        state.open_calls += 1;
        let status = state.connect_results.pop_front().unwrap_or(0);
        drop(state);

        if status != 0 {
            return Err(DeviceError::Connection { status });
        }
        self.open = true;
        Ok(())
    }

    fn close(&mut self) {
        if !self.open {
            return;
        }
        self.open = false;
        self.lock().close_calls += 1;
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn read_frame(&mut self) -> DeviceResult<MeasurementFrame> {
        if !self.open {
            return Err(DeviceError::Read { status: -1 });
        }
        let scripted = self.lock().scripted_reads.pop_front();
        match scripted {
            Some(ScriptedRead::Frame(frame)) => Ok(frame),
            Some(ScriptedRead::Fail(status)) => Err(DeviceError::Read { status }),
            None => Ok(self.generate_frame()),
        }
    }

    fn clear_storage(&mut self) -> DeviceResult<()> {
        self.lock().storage_clears += 1;
        Ok(())
    }

    fn start_storage(&mut self) -> DeviceResult<()> {
        self.lock().storage_active = true;
        Ok(())
    }

    fn stop_storage(&mut self) -> DeviceResult<()> {
        self.lock().storage_active = false;
        Ok(())
    }

    fn reset_group(&mut self, group: u16) -> DeviceResult<()> {
        self.lock().group_resets.push(group);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_close_counting() {
        let mut device = MockDevice::new();
        let state = device.state_handle();

        device.open(&DeviceConfig::default()).unwrap();
        assert!(device.is_open());

        // Close is idempotent; only the first close counts
        device.close();
        device.close();

        let state = state.lock().unwrap();
        assert_eq!(state.open_calls, 1);
        assert_eq!(state.close_calls, 1);
    }

    #[test]
    fn test_scripted_connect_failure() {
        let mut device = MockDevice::new();
        device
            .state_handle()
            .lock()
            .unwrap()
            .connect_results
            .push_back(0x80);

        let err = device.open(&DeviceConfig::default()).unwrap_err();
        assert_eq!(err, DeviceError::Connection { status: 0x80 });
        assert!(!device.is_open());

        // Queue drained; the next open succeeds
        device.open(&DeviceConfig::default()).unwrap();
        assert!(device.is_open());
    }

    #[test]
    fn test_scripted_reads_then_generation() {
        let mut device = MockDevice::new();
        {
            let state = device.state_handle();
            let mut state = state.lock().unwrap();
            state.scripted_reads.push_back(ScriptedRead::Frame(
                MeasurementFrame::from_channels(&[(1234, 0, 0x02)]),
            ));
            state.scripted_reads.push_back(ScriptedRead::Fail(0x10));
        }
        device.open(&DeviceConfig::default()).unwrap();

        let frame = device.read_frame().unwrap();
        assert_eq!(frame.channels[0].raw_value, 1234);

        let err = device.read_frame().unwrap_err();
        assert_eq!(err, DeviceError::Read { status: 0x10 });

        // Falls back to waveform generation with valid GO readings
        let frame = device.read_frame().unwrap();
        assert_eq!(frame.channels[0].value_info, 0);
        assert_eq!(frame.channels[0].judge_bits, 0x02);
    }

    #[test]
    fn test_read_when_closed_fails() {
        let mut device = MockDevice::new();
        assert!(device.read_frame().is_err());
    }

    #[test]
    fn test_constant_pattern_offsets_channels() {
        let mut device = MockDevice::new().with_pattern(MockDataPattern::Constant(10.0));
        device.open(&DeviceConfig::default()).unwrap();

        let frame = device.read_frame().unwrap();
        // Channel n reads base + n*5, scaled to raw hundredths
        assert_eq!(frame.channels[0].raw_value, 1000);
        assert_eq!(frame.channels[1].raw_value, 1500);
        assert_eq!(frame.channels[7].raw_value, 4500);
    }

    #[test]
    fn test_ramp_pattern_is_monotonic() {
        let mut device = MockDevice::new().with_pattern(MockDataPattern::Ramp {
            slope: 100.0,
            offset: 0.0,
        });
        device.open(&DeviceConfig::default()).unwrap();

        let first = device.read_frame().unwrap().channels[0].raw_value;
        std::thread::sleep(std::time::Duration::from_millis(20));
        let second = device.read_frame().unwrap().channels[0].raw_value;
        assert!(second > first);
    }

    #[test]
    fn test_storage_and_reset_bookkeeping() {
        let mut device = MockDevice::new();
        let state = device.state_handle();

        device.clear_storage().unwrap();
        device.start_storage().unwrap();
        assert!(state.lock().unwrap().storage_active);
        device.stop_storage().unwrap();
        device.reset_group(1).unwrap();

        let state = state.lock().unwrap();
        assert_eq!(state.storage_clears, 1);
        assert!(!state.storage_active);
        assert_eq!(state.group_resets, vec![1]);
    }
}
