//! Shared utility functions for redis-key-analysis.
//!
//! This module provides common utilities used across multiple modules,
//! including the human-readable unit formatting used by the exporter.

pub mod humanize;

pub use humanize::{format_byte_size, format_count, humanize_bytes, humanize_count, PLACEHOLDER};
