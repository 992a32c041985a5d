//! HTTP API and command line front end for Flux Media.

pub mod api;
pub mod metrics;
pub mod state;
