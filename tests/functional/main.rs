// Test code is allowed to panic on failure
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic
)]

//! Functional tests for the webhook server.
//!
//! These tests start the real TLS listener on a loopback port with a
//! self-signed certificate and drive it with an HTTPS client. No Kubernetes
//! cluster is required.
//!
//! ```bash
//! # Run all functional tests
//! cargo test --test functional
//!
//! # Run with verbose output
//! cargo test --test functional -- --nocapture
//! ```
//!
//! ## Test Categories
//!
//! - **Scenario tests**: admission verdicts end to end over TLS
//! - **Lifecycle tests**: start, graceful stop and forced stop
//! - **Timeout tests**: stalled request bodies and slow handlers

#[path = "../common/mod.rs"]
mod common;

mod scenario_tests;
mod timeout_tests;
