//! Measurement-device trait for a unified device interface
//!
//! This module provides a common trait for all measurement-device
//! implementations, enabling both the real vendor-SDK device and a mock
//! device for testing and hardware-free runs.
//!
//! The trait mirrors the narrow capability surface the monitor consumes
//! from the vendor communication library: open/close, one-frame reads,
//! storage control, and group reset. Nothing else of the SDK is exposed.

use crate::config::DeviceConfig;
use crate::error::DeviceResult;
use crate::types::MAX_CHANNELS;

/// Raw per-channel contents of one measurement frame, before decoding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RawChannelData {
    /// Measurement value in hundredths of a micrometre
    pub raw_value: i32,
    /// Value-validity flag; non-zero means the value is not usable
    pub value_info: u8,
    /// Judgment bitmask (bit0 HI, bit1 GO, bit2 LO)
    pub judge_bits: u8,
}

/// One raw measurement frame covering every OUT channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MeasurementFrame {
    pub channels: [RawChannelData; MAX_CHANNELS],
}

impl MeasurementFrame {
    /// Build a frame from per-channel `(raw_value, value_info, judge_bits)`
    /// triples; channels beyond the slice stay zeroed.
    pub fn from_channels(channels: &[(i32, u8, u8)]) -> Self {
        let mut frame = Self::default();
        for (slot, &(raw_value, value_info, judge_bits)) in
            frame.channels.iter_mut().zip(channels.iter())
        {
            *slot = RawChannelData {
                raw_value,
                value_info,
                judge_bits,
            };
        }
        frame
    }
}

/// Unified interface for measurement devices.
///
/// Implementations must be `Send`: the device handle is owned by the
/// polling worker and moves onto its thread. All calls are blocking; only
/// `open` takes an explicit timeout (through the config). Callers rely on
/// consecutive-failure counting for read liveness.
pub trait MeasurementDevice: Send {
    /// Open the communication channel to the device.
    fn open(&mut self, config: &DeviceConfig) -> DeviceResult<()>;

    /// Close the communication channel. Must be safe to call when the
    /// device is already closed.
    fn close(&mut self);

    /// Whether the communication channel is currently open.
    fn is_open(&self) -> bool;

    /// Read one measurement frame covering all OUT channels.
    fn read_frame(&mut self) -> DeviceResult<MeasurementFrame>;

    /// Discard the device's internal storage buffer.
    fn clear_storage(&mut self) -> DeviceResult<()>;

    /// Start accumulating measurements in the device's internal storage.
    fn start_storage(&mut self) -> DeviceResult<()>;

    /// Stop accumulating measurements in the device's internal storage.
    fn stop_storage(&mut self) -> DeviceResult<()>;

    /// Execute a group reset on the device (group 1 = zero reset).
    fn reset_group(&mut self, group: u16) -> DeviceResult<()>;
}
