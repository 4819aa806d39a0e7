#![deny(missing_docs)]

//! Core library for Condense, a provider-agnostic transcript summarization pipeline.

/// HTTP routing and REST handlers.
pub mod api;
/// Transcript sources and persistence sinks.
pub mod collaborators;
/// Environment-driven configuration management.
pub mod config;
/// Sentence embedding backends used by semantic chunking.
pub mod embedding;
/// Structured logging and tracing setup.
pub mod logging;
/// Pipeline metrics helpers.
pub mod metrics;
/// Document processing pipeline utilities.
pub mod processing;
/// Provider adapters, credentials, and retry.
pub mod summarization;
