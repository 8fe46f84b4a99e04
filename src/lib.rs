//! driftscan
//!
//! Scans live cloud resources and enriches them through Terraform provider
//! plugins into normalized attribute documents ready for drift comparison.
//!
//! # Module Structure
//!
//! - [`resource`] - Resource model, attribute store and factory
//! - [`cache`] - Memo cache shared by the backend repositories
//! - [`gcp`] - Google Cloud API client
//! - [`remote`] - Repositories, enumerators, remote library and scanner
//! - [`terraform`] - Provider plugin bridge
//! - [`config`] - Persistent user configuration

pub mod cache;
pub mod config;
pub mod gcp;
pub mod remote;
pub mod resource;
pub mod terraform;

/// Version injected at compile time via DRIFTSCAN_VERSION env var (set by CI/CD),
/// or "dev" for local builds.
pub const VERSION: &str = match option_env!("DRIFTSCAN_VERSION") {
    Some(v) => v,
    None => "dev",
};
