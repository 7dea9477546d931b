//! Cost Estimation - predicted and actual request cost
//!
//! All amounts are in cents. Catalog prices are USD per 1M tokens and are
//! converted on the way out.
//!
//! # Module Structure
//!
//! - `estimator`: CostEstimator, CostEstimate, default pricing fallback

mod estimator;


pub use estimator::{
    CostEstimate, CostEstimator, CostPer1K, EstimatorConfig, DEFAULT_INPUT_COST_PER_MILLION,
    DEFAULT_MODEL, DEFAULT_OUTPUT_COST_PER_MILLION, DEFAULT_OUTPUT_TOKENS,
    KNOWN_MODEL_CONFIDENCE, UNKNOWN_MODEL_CONFIDENCE,
};
