//! Shared data storage between the polling backend and the UI
//!
//! - [`store`] - bounded per-channel rolling sample history
//! - [`reference`] - shared time-zero resolution over selected channels

pub mod reference;
pub mod store;

pub use store::{RollingStore, SeriesSnapshot};
