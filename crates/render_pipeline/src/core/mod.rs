//! Core pipeline configuration

pub mod config;

pub use config::PipelineConfig;
