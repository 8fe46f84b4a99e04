//! Remote scanning
//!
//! # Architecture
//!
//! - [`library`] - Enumerator and details fetcher registry
//! - [`scanner`] - Concurrent enumeration and enrichment
//! - [`alerts`] - Non-fatal degradations surfaced to the caller
//! - [`filter`] - Resource type filtering
//! - [`error`] - Backend and scan error taxonomy
//! - [`google`] - Google Cloud repositories and enumerators

pub mod alerts;
pub mod error;
pub mod filter;
pub mod google;
pub mod library;
pub mod scanner;

pub use alerts::{Alert, AlertPhase, Alerter, CollectingAlerter};
pub use error::{BackendError, FetchError, LibraryError, ResourceListingError, ScanError};
pub use filter::{Filter, TypeFilter};
pub use library::{DetailsFetcher, Enumerator, GenericDetailsFetcher, RemoteLibrary};
pub use scanner::{Cancellation, ScanFailure, ScanReport, Scanner, ScannerOptions};
