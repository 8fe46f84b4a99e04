//! Alerts raised when a scan degrades instead of failing

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Mutex;

/// Scan phase an alert was raised in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum AlertPhase {
    Enumeration,
    Enrichment,
}

impl fmt::Display for AlertPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlertPhase::Enumeration => write!(f, "Enumeration"),
            AlertPhase::Enrichment => write!(f, "Enrichment"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Alert {
    pub resource_type: String,
    pub phase: AlertPhase,
    pub cause: String,
}

impl Alert {
    pub fn new(resource_type: &str, phase: AlertPhase, cause: impl fmt::Display) -> Self {
        Self {
            resource_type: resource_type.to_string(),
            phase,
            cause: cause.to_string(),
        }
    }

    pub fn message(&self) -> String {
        let action = match self.phase {
            AlertPhase::Enumeration => "Listing",
            AlertPhase::Enrichment => "Reading details of",
        };
        format!(
            "Ignoring {} from drift calculation: {} {} is forbidden: {}",
            self.resource_type, action, self.resource_type, self.cause
        )
    }
}

/// Receives alerts; must tolerate concurrent delivery from scan tasks
pub trait Alerter: Send + Sync {
    fn send_alert(&self, resource_type: &str, alert: Alert);
}

/// Alerter keeping every alert in memory, grouped by resource type
#[derive(Debug, Default)]
pub struct CollectingAlerter {
    alerts: Mutex<BTreeMap<String, Vec<Alert>>>,
}

impl CollectingAlerter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the alerts received so far
    pub fn retrieve(&self) -> BTreeMap<String, Vec<Alert>> {
        self.alerts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn count(&self) -> usize {
        self.retrieve().values().map(Vec::len).sum()
    }
}

impl Alerter for CollectingAlerter {
    fn send_alert(&self, resource_type: &str, alert: Alert) {
        tracing::warn!("{}", alert.message());
        self.alerts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .entry(resource_type.to_string())
            .or_default()
            .push(alert);
    }
}
