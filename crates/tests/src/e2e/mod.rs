//! End-to-end tests against real `liquidd` processes.
//!
//! Each test builds a fresh two-node regtest network in temporary directories, so nothing
//! outside the test's own datadirs is touched.
//!
//! # Running Tests
//!
//! ```bash
//! # liquidd must be on PATH, or set LIQUIDD to its location
//! cargo test --package tests --features e2e e2e
//! ```

pub mod fixtures;


pub use fixtures::TwoNodeNetwork;
