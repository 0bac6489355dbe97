//! Rolling time-series storage
//!
//! [`RollingStore`] holds a bounded history of samples per channel and is
//! the shared boundary between the polling worker (sole writer, via
//! [`RollingStore::append`]) and the graph refresh path (reader, via
//! [`RollingStore::read`]). Reads return independent copies so the writer
//! can keep appending while a reader iterates its snapshot.
//!
//! Eviction is strict FIFO: once a channel's series reaches capacity, each
//! append drops the oldest sample. Clearing a series empties it without
//! removing the channel itself.

use crate::types::{ChannelId, Judgment, Sample};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::RwLock;

/// Snapshot copy of one channel's series.
///
/// The three sequences are parallel: index `i` of each describes the same
/// sample. An empty snapshot is returned for channels with no data.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SeriesSnapshot {
    pub timestamps: Vec<DateTime<Utc>>,
    pub values: Vec<f64>,
    pub judgments: Vec<Judgment>,
}

impl SeriesSnapshot {
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    /// Iterate samples reconstructed from the parallel sequences.
    pub fn iter(&self) -> impl Iterator<Item = Sample> + '_ {
        self.timestamps
            .iter()
            .zip(&self.values)
            .zip(&self.judgments)
            .map(|((&timestamp, &value), &judgment)| Sample {
                timestamp,
                value,
                judgment,
            })
    }
}

/// Bounded per-channel sample history with FIFO eviction.
pub struct RollingStore {
    capacity: usize,
    series: RwLock<HashMap<ChannelId, VecDeque<Sample>>>,
}

impl RollingStore {
    /// Create a store where each channel retains at most `capacity` samples.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            series: RwLock::new(HashMap::new()),
        }
    }

    /// Per-channel capacity in samples.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append a sample to a channel's series, creating the series lazily
    /// and evicting the oldest sample once capacity is exceeded.
    pub fn append(&self, channel: ChannelId, sample: Sample) {
        let mut series = self.series.write().unwrap_or_else(|e| e.into_inner());
        let channel_series = series
            .entry(channel)
            .or_insert_with(|| VecDeque::with_capacity(self.capacity));
        channel_series.push_back(sample);
        while channel_series.len() > self.capacity {
            channel_series.pop_front();
        }
    }

    /// Read an independent copy of a channel's series. Channels without
    /// data yield an empty snapshot.
    pub fn read(&self, channel: ChannelId) -> SeriesSnapshot {
        let series = self.series.read().unwrap_or_else(|e| e.into_inner());
        match series.get(&channel) {
            Some(samples) => {
                let mut snapshot = SeriesSnapshot {
                    timestamps: Vec::with_capacity(samples.len()),
                    values: Vec::with_capacity(samples.len()),
                    judgments: Vec::with_capacity(samples.len()),
                };
                for sample in samples {
                    snapshot.timestamps.push(sample.timestamp);
                    snapshot.values.push(sample.value);
                    snapshot.judgments.push(sample.judgment);
                }
                snapshot
            }
            None => SeriesSnapshot::default(),
        }
    }

    /// Timestamp of the earliest sample with a usable value, scanning in
    /// series (arrival) order. Used by the reference-time resolution.
    pub fn first_valid_timestamp(&self, channel: ChannelId) -> Option<DateTime<Utc>> {
        let series = self.series.read().unwrap_or_else(|e| e.into_inner());
        series
            .get(&channel)?
            .iter()
            .find(|sample| sample.is_valid())
            .map(|sample| sample.timestamp)
    }

    /// Number of samples currently stored for a channel.
    pub fn len(&self, channel: ChannelId) -> usize {
        let series = self.series.read().unwrap_or_else(|e| e.into_inner());
        series.get(&channel).map_or(0, VecDeque::len)
    }

    /// Empty one channel's series without removing the channel.
    pub fn clear(&self, channel: ChannelId) {
        let mut series = self.series.write().unwrap_or_else(|e| e.into_inner());
        if let Some(channel_series) = series.get_mut(&channel) {
            channel_series.clear();
        }
    }

    /// Empty every channel's series without removing any channel.
    pub fn clear_all(&self) {
        let mut series = self.series.write().unwrap_or_else(|e| e.into_inner());
        for channel_series in series.values_mut() {
            channel_series.clear();
        }
    }
}
