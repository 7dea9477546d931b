//! Loop Detector - flags conversations stuck repeating themselves
//!
//! Three signals are scored against a bounded per-conversation history:
//! exact repeats, near-identical (word-overlap) repeats, and registered
//! substring or regex patterns.
//!
//! # Module Structure
//!
//! - `types`: LoopPattern, LoopDetection and configuration
//! - `similarity`: text flattening and Jaccard scoring
//! - `detector`: LoopDetector implementation

mod detector;
mod similarity;
mod types;


pub use detector::LoopDetector;
pub use types::{
    LoopAction, LoopDetection, LoopDetectionConfig, LoopPattern, LoopType, MatchType,
};
