//! Gateway - the facade composing every decision component
//!
//! Callers make two calls per request: `preflight_check` before contacting
//! a provider, then `record_completion` or `record_failure` afterwards.
//!
//! # Module Structure
//!
//! - `types`: PreflightOptions, PreflightResult, CompletionReport, FailureReport
//! - `core`: Gateway implementation

mod core;
mod types;


pub use self::core::Gateway;
pub use types::{CompletionReport, FailureReport, PreflightOptions, PreflightResult};
