//! Integration tests for Fyvio
//!
//! Drive the axum router in-process against simulated backend connections
//! and check the HTTP contract: status codes, headers, exact body bytes and
//! workload accounting.

#[path = "integration/stream_endpoint.rs"]
mod stream_endpoint;

#[path = "integration/load_balancing.rs"]
mod load_balancing;

#[path = "integration/local_library.rs"]
mod local_library;

#[path = "integration/range_properties.rs"]
mod range_properties;
