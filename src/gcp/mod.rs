//! GCP API interaction module
//!
//! Native client calls wrapped by the backend repositories.
//!
//! # Module Structure
//!
//! - [`auth`] - GCP authentication using Application Default Credentials
//! - [`client`] - Main GCP client and the [`client::ApiTransport`] seam
//! - [`http`] - HTTP calls, status classification and throttling retries

pub mod auth;
pub mod client;
pub mod http;

pub use client::{ApiTransport, Endpoints, GcpClient};
