//! Regent Server - standalone leader election node
//!
//! Loads configuration, initializes logging and runs a group of candidates
//! against an in-memory lock registry until shutdown.

pub mod metrics;
pub mod model;
pub mod node;
pub mod startup;
