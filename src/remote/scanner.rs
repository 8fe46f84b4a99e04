//! Scanner
//!
//! Drives the remote library: enumerates every registered type
//! concurrently, then (in deep mode) enriches the listed resources, and
//! returns them sorted by `(type, id)`.

use super::alerts::{Alert, AlertPhase, Alerter};
use super::error::{FetchError, ResourceListingError, ScanError};
use super::filter::Filter;
use super::library::{DetailsFetcher, RemoteLibrary};
use crate::resource::{self, Resource};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Default number of resource types processed at once
pub const DEFAULT_PARALLELISM: usize = 10;

#[derive(Debug, Clone)]
pub struct ScannerOptions {
    /// Run the enrichment phase through the provider plugins
    pub deep: bool,
    pub parallelism: usize,
}

impl Default for ScannerOptions {
    fn default() -> Self {
        Self {
            deep: false,
            parallelism: DEFAULT_PARALLELISM,
        }
    }
}

/// Cooperative cancellation signal shared with the caller
#[derive(Debug, Clone, Default)]
pub struct Cancellation(Arc<AtomicBool>);

impl Cancellation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// A resource type that could not be fully scanned
#[derive(Debug, thiserror::Error)]
pub enum ScanFailure {
    #[error(transparent)]
    Listing(#[from] ResourceListingError),

    #[error("Unable to enrich {resource_type} {resource_id}: {source}")]
    Enrichment {
        resource_type: String,
        resource_id: String,
        source: FetchError,
    },
}

impl ScanFailure {
    pub fn resource_type(&self) -> &str {
        match self {
            ScanFailure::Listing(e) => &e.resource_type,
            ScanFailure::Enrichment { resource_type, .. } => resource_type,
        }
    }
}

/// Best-effort scan output
#[derive(Debug, Default)]
pub struct ScanReport {
    pub resources: Vec<Resource>,
    pub failures: Vec<ScanFailure>,
}

pub struct Scanner {
    library: Arc<RemoteLibrary>,
    alerter: Arc<dyn Alerter>,
    options: ScannerOptions,
    filter: Arc<dyn Filter>,
}

/// Enriched resources of one type plus the `(id, error)` of failed reads
type EnrichOutcome = (String, Vec<Resource>, Vec<(String, FetchError)>);

impl Scanner {
    pub fn new(
        library: Arc<RemoteLibrary>,
        alerter: Arc<dyn Alerter>,
        options: ScannerOptions,
        filter: Arc<dyn Filter>,
    ) -> Self {
        Self {
            library,
            alerter,
            options,
            filter,
        }
    }

    /// Run a full scan
    pub async fn resources(&self, cancel: &Cancellation) -> Result<ScanReport, ScanError> {
        let mut report = ScanReport::default();

        tracing::info!("Enumerating {} resource types", self.library.enumerators().len());
        let mut by_type = self.enumerate(cancel, &mut report).await?;

        if self.options.deep {
            tracing::info!("Enriching {} resource types", by_type.len());
            by_type = self.enrich(cancel, by_type, &mut report).await?;
        }

        let mut resources: Vec<Resource> = by_type.into_values().flatten().collect();
        resource::sort(&mut resources);
        report.resources = resources;

        tracing::info!(
            "Scan done: {} resources, {} failed types",
            report.resources.len(),
            report.failures.len()
        );
        Ok(report)
    }

    fn semaphore(&self) -> Arc<Semaphore> {
        Arc::new(Semaphore::new(self.options.parallelism.max(1)))
    }

    async fn enumerate(
        &self,
        cancel: &Cancellation,
        report: &mut ScanReport,
    ) -> Result<BTreeMap<String, Vec<Resource>>, ScanError> {
        let semaphore = self.semaphore();
        let mut tasks = JoinSet::new();

        for enumerator in self.library.enumerators() {
            let ty = enumerator.supported_type().to_string();
            if self.filter.is_type_ignored(&ty) {
                tracing::debug!("Skipping filtered type {}", ty);
                continue;
            }

            let enumerator = enumerator.clone();
            let semaphore = semaphore.clone();
            let cancel = cancel.clone();
            tasks.spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return (ty, None);
                };
                if cancel.is_cancelled() {
                    return (ty, None);
                }
                tracing::debug!("Enumerating {}", ty);
                let result = enumerator.enumerate().await;
                (ty, Some(result))
            });
        }

        let mut by_type = BTreeMap::new();
        while let Some(joined) = tasks.join_next().await {
            let (ty, outcome) = joined.map_err(|e| ScanError::Task(e.to_string()))?;
            match outcome {
                None => {}
                Some(Ok(resources)) => {
                    tracing::debug!("Enumerated {} {}", resources.len(), ty);
                    by_type.insert(ty, resources);
                }
                Some(Err(err)) if err.is_access_denied() => {
                    self.alerter.send_alert(
                        &ty,
                        Alert::new(&ty, AlertPhase::Enumeration, &err.source),
                    );
                    by_type.insert(ty, Vec::new());
                }
                Some(Err(err)) => {
                    tracing::warn!("{}", err);
                    report.failures.push(ScanFailure::Listing(err));
                }
            }
        }

        if cancel.is_cancelled() {
            return Err(ScanError::Cancelled);
        }
        Ok(by_type)
    }

    async fn enrich(
        &self,
        cancel: &Cancellation,
        mut by_type: BTreeMap<String, Vec<Resource>>,
        report: &mut ScanReport,
    ) -> Result<BTreeMap<String, Vec<Resource>>, ScanError> {
        let semaphore = self.semaphore();
        let mut tasks: JoinSet<EnrichOutcome> = JoinSet::new();

        let types: Vec<String> = by_type.keys().cloned().collect();
        for ty in types {
            let Some(fetcher) = self.library.details_fetcher(&ty) else {
                continue;
            };
            let Some(stubs) = by_type.remove(&ty) else {
                continue;
            };
            if stubs.is_empty() {
                by_type.insert(ty, stubs);
                continue;
            }

            let semaphore = semaphore.clone();
            let cancel = cancel.clone();
            let alerter = self.alerter.clone();
            tasks.spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return (ty, stubs, Vec::new());
                };
                if cancel.is_cancelled() {
                    return (ty, stubs, Vec::new());
                }
                enrich_type(ty, stubs, fetcher, alerter).await
            });
        }

        while let Some(joined) = tasks.join_next().await {
            let (ty, resources, errors) = joined.map_err(|e| ScanError::Task(e.to_string()))?;
            for (resource_id, source) in errors {
                tracing::warn!("Keeping listing data for {} {}: {}", ty, resource_id, source);
                report.failures.push(ScanFailure::Enrichment {
                    resource_type: ty.clone(),
                    resource_id,
                    source,
                });
            }
            by_type.insert(ty, resources);
        }

        if cancel.is_cancelled() {
            return Err(ScanError::Cancelled);
        }
        Ok(by_type)
    }
}

/// Enrich every stub of one type
///
/// A failed read keeps that resource's listing data and moves on to the
/// next one. Access denial raises one alert and a provider failure is
/// reported; both stop the type, leaving the rest of the stubs as listed.
async fn enrich_type(
    ty: String,
    stubs: Vec<Resource>,
    fetcher: Arc<dyn DetailsFetcher>,
    alerter: Arc<dyn Alerter>,
) -> EnrichOutcome {
    let mut enriched = Vec::with_capacity(stubs.len());
    let mut errors = Vec::new();
    let mut stubs = stubs.into_iter();

    while let Some(stub) = stubs.next() {
        let err = match fetcher.fetch(&stub).await {
            Ok(resource) => {
                enriched.push(resource);
                continue;
            }
            Err(err) => err,
        };

        let id = stub.id.clone();
        enriched.push(stub);
        if err.is_access_denied() {
            alerter.send_alert(&ty, Alert::new(&ty, AlertPhase::Enrichment, &err));
            enriched.extend(stubs);
            break;
        }
        let stops = err.stops_type();
        errors.push((id, err));
        if stops {
            enriched.extend(stubs);
            break;
        }
    }

    (ty, enriched, errors)
}
