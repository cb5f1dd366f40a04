//! # StageSync Infrastructure
//!
//! Infrastructure implementations of core ports.
//!
//! This crate contains:
//! - SQLCipher-backed staging store, batch repository and production mirror
//! - The GraphQL mutation client (and its dry-run counterpart)
//! - A file-based change detector
//! - Configuration loading from the environment and JSON/TOML files
//!
//! ## Architecture
//! - Implements traits defined in `stagesync-core`
//! - Contains all "impure" code (SQL, HTTP, filesystem)

pub mod config;
pub mod database;
pub mod detect;
pub mod errors;
pub mod http;
pub mod remote;

// Re-export commonly used items
pub use database::*;
pub use detect::JsonFileDetector;
pub use errors::InfraError;
pub use http::{HttpClient, HttpClientBuilder};
pub use remote::{DryRunMutationClient, GraphqlMutationClient};
