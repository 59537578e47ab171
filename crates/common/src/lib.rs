//! MDL Common Library
//!
//! Shared code for the MDL model repository including:
//! - Database entities and repository
//! - Object storage abstraction (S3/MinIO, in-memory)
//! - Error types and handling
//! - Configuration management
//! - Authentication and authorization predicates
//! - Name resolution and artifact key derivation
//! - Upload, deletion and download-link services

pub mod auth;
pub mod config;
pub mod db;
pub mod errors;
pub mod metrics;
pub mod naming;
pub mod services;
pub mod storage;

// Re-export commonly used types
pub use config::AppConfig;
pub use db::{DbPool, Repository};
pub use errors::{AppError, Result};
pub use storage::ObjectStore;

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default object-store bucket for model artifacts
pub const DEFAULT_BUCKET: &str = "mdl";
