//! Router - strategy-based model selection
//!
//! Picks a provider/model for a request from the registry's routable
//! models. Named routes carry a strategy and an optional fallback chain;
//! requests without a route use lowest-cost selection.
//!
//! # Module Structure
//!
//! - `types`: Route, RoutingStrategy, SelectionCriteria, RoutingDecision
//! - `router_impl`: ModelRouter implementation

mod router_impl;
mod types;

#[cfg(test)]
mod tests;

pub use router_impl::ModelRouter;
pub use types::{Route, RoutingDecision, RoutingStrategy, SelectionCriteria};
