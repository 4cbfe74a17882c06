//! Usage event recording and cost/threshold accounting, layered on top of
//! `pilot-store`'s raw event table. Implements `pilot_queue::UsageRecorder`
//! so the queue worker can hand it a settled execution directly.

pub mod metering;
pub mod pricing;
pub mod thresholds;

pub use metering::{Metering, MeteredSummary};
pub use pricing::Pricing;
pub use thresholds::UsageThresholds;
