//! Dependency lock file
//!
//! Reads `.terraform.lock.hcl` documents with `hcl-rs`. Only `provider`
//! blocks are decoded; other blocks are skipped.

use hcl::{Block, Body, Expression};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

pub const DEFAULT_REGISTRY_HOST: &str = "registry.terraform.io";
pub const DEFAULT_NAMESPACE: &str = "hashicorp";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LockError {
    #[error("Missing required argument: provider {address} lock must contain a \"version\" argument")]
    MissingVersion { address: String },

    #[error("The selected version number for provider {address} must be written in normalized form: \"{canonical}\"")]
    NonCanonicalVersion { address: String, canonical: String },

    #[error("The selected version number for provider {address} is invalid: {version}")]
    InvalidVersion { address: String, version: String },

    #[error("the provider source address for this provider lock must be written as \"{canonical}\", the fully-qualified and normalized form")]
    NonCanonicalAddress { given: String, canonical: String },

    #[error("the provider source address for a provider lock must be a valid, fully-qualified address of the form \"hostname/namespace/type\": {given}")]
    InvalidAddress { given: String },

    #[error("This lockfile already declared a lock for provider {address}")]
    DuplicateLock { address: String },

    #[error("invalid lock file syntax: {message}")]
    Syntax { message: String },

    #[error("Failed to read lock file {path}: {message}")]
    Io { path: String, message: String },
}

/// Fully-qualified provider source address
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProviderAddress {
    pub hostname: String,
    pub namespace: String,
    pub ty: String,
}

impl ProviderAddress {
    pub fn new(hostname: &str, namespace: &str, ty: &str) -> Self {
        Self {
            hostname: hostname.to_lowercase(),
            namespace: namespace.to_lowercase(),
            ty: ty.to_lowercase(),
        }
    }

    /// Address of a provider published under the default registry namespace
    pub fn hashicorp(ty: &str) -> Self {
        Self::new(DEFAULT_REGISTRY_HOST, DEFAULT_NAMESPACE, ty)
    }
}

impl FromStr for ProviderAddress {
    type Err = LockError;

    /// Accepts `type`, `namespace/type` and `hostname/namespace/type`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || LockError::InvalidAddress {
            given: s.to_string(),
        };
        let parts: Vec<&str> = s.split('/').collect();

        let valid_part = |p: &str| {
            !p.is_empty()
                && p.chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        };
        let valid_host = |h: &str| {
            !h.is_empty()
                && h.chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | ':'))
        };

        match parts.as_slice() {
            [ty] if valid_part(ty) => Ok(Self::hashicorp(ty)),
            [ns, ty] if valid_part(ns) && valid_part(ty) => {
                Ok(Self::new(DEFAULT_REGISTRY_HOST, ns, ty))
            }
            [host, ns, ty] if valid_host(host) && valid_part(ns) && valid_part(ty) => {
                Ok(Self::new(host, ns, ty))
            }
            _ => Err(invalid()),
        }
    }
}

impl fmt::Display for ProviderAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.hostname, self.namespace, self.ty)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockedProvider {
    pub address: ProviderAddress,
    /// Canonical version; absent when the block's version was missing or invalid
    pub version: Option<String>,
    pub constraints: Option<String>,
    pub hashes: Vec<String>,
}

impl LockedProvider {
    /// Archive checksums (`zh:` prefixed, hex sha256)
    pub fn zip_hashes(&self) -> Vec<String> {
        self.hashes
            .iter()
            .filter_map(|h| h.strip_prefix("zh:"))
            .map(str::to_string)
            .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Locks {
    providers: BTreeMap<ProviderAddress, LockedProvider>,
}

impl Locks {
    /// Parse a lock document. Returns whatever could be read alongside
    /// every problem encountered, in document order.
    pub fn parse(src: &str) -> (Locks, Vec<LockError>) {
        let mut locks = Locks::default();
        let mut errors = Vec::new();

        match hcl::parse(src) {
            Ok(body) => decode_document(&mut locks, &mut errors, &body),
            Err(e) => errors.push(LockError::Syntax {
                message: e.to_string(),
            }),
        }

        (locks, errors)
    }

    pub fn load(path: &Path) -> (Locks, Vec<LockError>) {
        match std::fs::read_to_string(path) {
            Ok(src) => Self::parse(&src),
            Err(e) => (
                Locks::default(),
                vec![LockError::Io {
                    path: path.display().to_string(),
                    message: e.to_string(),
                }],
            ),
        }
    }

    pub fn provider(&self, address: &ProviderAddress) -> Option<&LockedProvider> {
        self.providers.get(address)
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

/// Validate a version string, returning its canonical form
/// (`MAJOR.MINOR.PATCH[-pre][+meta]`). Missing minor and patch numbers
/// default to zero and a leading `v` is accepted.
pub fn canonical_version(raw: &str) -> Option<String> {
    let body = raw.strip_prefix('v').unwrap_or(raw);
    let split = body.find(|c: char| c == '-' || c == '+').unwrap_or(body.len());
    let (core, extra) = body.split_at(split);

    let mut segments = core
        .split('.')
        .map(|part| {
            if part.is_empty() || !part.chars().all(|c| c.is_ascii_digit()) {
                return None;
            }
            part.parse::<u64>().ok()
        })
        .collect::<Option<Vec<_>>>()?;
    if segments.is_empty() || segments.len() > 3 {
        return None;
    }
    segments.resize(3, 0);

    let padded = format!("{}.{}.{}{}", segments[0], segments[1], segments[2], extra);
    semver::Version::parse(&padded).ok().map(|v| v.to_string())
}

fn decode_document(locks: &mut Locks, errors: &mut Vec<LockError>, body: &Body) {
    for block in body.blocks() {
        if block.identifier() != "provider" {
            tracing::debug!("Ignoring lock file block {}", block.identifier());
            continue;
        }
        let [label] = block.labels() else {
            errors.push(LockError::Syntax {
                message: "provider block requires exactly one label".to_string(),
            });
            continue;
        };
        decode_provider(locks, errors, label.as_str(), block);
    }
}

/// Text of an expression, for error messages
fn expression_text(expr: &Expression) -> String {
    match expr {
        Expression::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn decode_provider(
    locks: &mut Locks,
    errors: &mut Vec<LockError>,
    raw_address: &str,
    block: &Block,
) {
    let address = match raw_address.parse::<ProviderAddress>() {
        Ok(address) => address,
        Err(e) => {
            errors.push(e);
            return;
        }
    };
    let canonical_address = address.to_string();
    if canonical_address != raw_address {
        errors.push(LockError::NonCanonicalAddress {
            given: raw_address.to_string(),
            canonical: canonical_address,
        });
        return;
    }

    let attribute = |name: &str| {
        block
            .body()
            .attributes()
            .find(|attr| attr.key() == name)
            .map(|attr| attr.expr())
    };

    let version = match attribute("version") {
        Some(Expression::String(raw)) => match canonical_version(raw) {
            Some(canonical) if canonical == *raw => Some(canonical),
            Some(canonical) => {
                errors.push(LockError::NonCanonicalVersion {
                    address: canonical_address.clone(),
                    canonical: canonical.clone(),
                });
                Some(canonical)
            }
            None => {
                errors.push(LockError::InvalidVersion {
                    address: canonical_address.clone(),
                    version: raw.clone(),
                });
                None
            }
        },
        Some(other) => {
            errors.push(LockError::InvalidVersion {
                address: canonical_address.clone(),
                version: expression_text(other),
            });
            None
        }
        None => {
            errors.push(LockError::MissingVersion {
                address: canonical_address.clone(),
            });
            None
        }
    };

    let constraints = match attribute("constraints") {
        Some(Expression::String(s)) => Some(s.clone()),
        _ => None,
    };
    let hashes = match attribute("hashes") {
        Some(Expression::Array(items)) => items
            .iter()
            .filter_map(|item| match item {
                Expression::String(s) => Some(s.clone()),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    };

    if locks.providers.contains_key(&address) {
        errors.push(LockError::DuplicateLock {
            address: canonical_address,
        });
        return;
    }

    locks.providers.insert(
        address.clone(),
        LockedProvider {
            address,
            version,
            constraints,
            hashes,
        },
    );
}
