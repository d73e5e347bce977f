//! Shared segment configuration and mapping

pub mod config;
pub mod segment;

pub use config::{BackingType, SegmentConfig, SegmentInfo};
pub use segment::SharedSegment;
