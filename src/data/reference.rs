//! Shared reference-time ("time zero") resolution
//!
//! All plotted series are normalized to elapsed seconds relative to a
//! single reference instant: the earliest valid-sample timestamp across
//! the currently selected channels. The reference is recomputed from
//! scratch on every selection change and every refresh cycle - never
//! patched incrementally - so deselecting the channel that originally set
//! it re-derives the reference from the remaining channels, or clears it
//! when none of them has a valid sample yet.

use crate::data::store::RollingStore;
use crate::types::ChannelId;
use chrono::{DateTime, Utc};

/// Recompute the shared reference time over `selected` channels.
///
/// Returns `None` when no selected channel has any valid sample.
pub fn resolve(selected: &[ChannelId], store: &RollingStore) -> Option<DateTime<Utc>> {
    selected
        .iter()
        .filter_map(|&channel| store.first_valid_timestamp(channel))
        .min()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Judgment, Sample, SENTINEL_VALUE};
    use chrono::TimeZone;

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn valid(secs: i64, value: f64) -> Sample {
        Sample::new(ts(secs), value, Judgment::Go)
    }

    #[test]
    fn test_minimum_across_selected_channels() {
        let store = RollingStore::new(100);
        store.append(1, valid(5, 1.0));
        store.append(2, valid(3, 2.0));

        assert_eq!(resolve(&[1, 2], &store), Some(ts(3)));
    }

    #[test]
    fn test_deselection_rederives_reference() {
        let store = RollingStore::new(100);
        store.append(1, valid(5, 1.0));
        store.append(2, valid(3, 2.0));

        // Channel 2 pins the reference while selected...
        assert_eq!(resolve(&[1, 2], &store), Some(ts(3)));
        // ...and releases it when deselected
        assert_eq!(resolve(&[1], &store), Some(ts(5)));
    }

    #[test]
    fn test_none_when_no_valid_samples() {
        let store = RollingStore::new(100);
        assert_eq!(resolve(&[1, 2], &store), None);

        store.append(1, Sample::new(ts(0), SENTINEL_VALUE, Judgment::Standby));
        assert_eq!(resolve(&[1], &store), None);
    }

    #[test]
    fn test_empty_selection() {
        let store = RollingStore::new(100);
        store.append(1, valid(0, 1.0));
        assert_eq!(resolve(&[], &store), None);
    }

    #[test]
    fn test_sentinel_prefix_skipped() {
        let store = RollingStore::new(100);
        store.append(1, Sample::new(ts(0), SENTINEL_VALUE, Judgment::Standby));
        store.append(1, valid(4, 1.0));
        store.append(2, valid(6, 2.0));

        // Channel 1's sentinel at t=0 must not pin the reference
        assert_eq!(resolve(&[1, 2], &store), Some(ts(4)));
    }
}
