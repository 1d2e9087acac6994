//! Foundation module - Core utilities and types
//!
//! This module provides fundamental utilities used throughout the pipeline:
//! - Math types and bounding shapes
//! - Fixed-capacity pool allocation
//! - Logging utilities

pub mod math;
pub mod memory;
pub mod logging;
