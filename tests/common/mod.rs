//! Shared test utilities for the schmux client
//!
//! This module provides common helpers for integration tests:
//! - An axum-served daemon backed by the in-memory mock registry
//! - Registry and spawn-form fixtures

pub mod fixtures;
