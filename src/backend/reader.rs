//! Measurement-frame decoding
//!
//! [`FrameDecoder`] turns the raw per-channel data of a measurement frame
//! into `(value, judgment)` pairs:
//!
//! - a non-zero value-info flag means the channel has no usable value;
//!   the output is the sentinel value with judgment `STANDBY`
//! - otherwise the raw integer is scaled by 1/100 into micrometres and
//!   the judgment bitmask is decoded with the fixed priority HI, LO, GO
//!
//! Decoding never advances any series on its own; a failed device read
//! surfaces as an error before decoding is reached, so callers observe
//! either a fully decoded frame or none at all.

use crate::backend::device::{MeasurementDevice, MeasurementFrame};
use crate::error::DeviceResult;
use crate::types::{ChannelReading, Judgment, RAW_VALUE_SCALE};

/// Decodes raw measurement frames into per-channel readings.
#[derive(Debug, Clone)]
pub struct FrameDecoder {
    channel_count: usize,
}

impl FrameDecoder {
    /// Create a decoder producing `channel_count` readings per frame.
    pub fn new(channel_count: usize) -> Self {
        Self {
            channel_count: channel_count.clamp(1, crate::types::MAX_CHANNELS),
        }
    }

    /// Number of channels decoded from each frame.
    pub fn channel_count(&self) -> usize {
        self.channel_count
    }

    /// Change the number of channels decoded from each frame.
    pub fn set_channel_count(&mut self, channel_count: usize) {
        self.channel_count = channel_count.clamp(1, crate::types::MAX_CHANNELS);
    }

    /// Read one frame from `device` and decode the configured channels.
    ///
    /// Fails when the underlying read fails; the caller must not advance
    /// any series in that case.
    pub fn read_frame(
        &self,
        device: &mut dyn MeasurementDevice,
    ) -> DeviceResult<Vec<ChannelReading>> {
        let frame = device.read_frame()?;
        Ok(self.decode(&frame))
    }

    /// Decode the configured channels of an already-read frame.
    pub fn decode(&self, frame: &MeasurementFrame) -> Vec<ChannelReading> {
        frame
            .channels
            .iter()
            .take(self.channel_count)
            .map(|raw| {
                if raw.value_info != 0 {
                    ChannelReading::standby()
                } else {
                    ChannelReading {
                        value: raw.raw_value as f64 / RAW_VALUE_SCALE,
                        judgment: Judgment::from_bits(raw.judge_bits),
                    }
                }
            })
            .collect()
    }
}
