//! Manifest → registry.
//!
//! Every factory identifier is checked against the table before any entry
//! is constructed, so an unknown identifier leaves nothing half-built.
//! Entries are then resolved in document order and entry order.

use crate::error::{ManifestError, Result};
use crate::factory::FactoryTable;
use crate::metrics::ManifestMetrics;
use crate::registry::{DeviceRegistry, DuplicatePolicy, FailureMode};
use crate::types::Manifest;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    pub duplicates: DuplicatePolicy,
    pub failure: FailureMode,
}

/// An entry left out of the registry in lenient mode.
#[derive(Debug)]
pub struct SkippedEntry {
    pub factory: String,
    pub entry: String,
    pub error: ManifestError,
}

#[derive(Debug)]
pub struct Resolution {
    pub registry: DeviceRegistry,
    pub skipped: Vec<SkippedEntry>,
}

pub struct Resolver<'a> {
    table: &'a FactoryTable,
    config: ResolverConfig,
    metrics: Option<&'a ManifestMetrics>,
}

impl<'a> Resolver<'a> {
    pub fn new(table: &'a FactoryTable, config: ResolverConfig) -> Self {
        Self {
            table,
            config,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: &'a ManifestMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn config(&self) -> ResolverConfig {
        self.config
    }

    /// Build the registry. Entries skipped in lenient mode are logged and dropped.
    pub fn resolve(&self, manifest: &Manifest) -> Result<DeviceRegistry> {
        self.resolve_report(manifest).map(|r| r.registry)
    }

    pub fn resolve_report(&self, manifest: &Manifest) -> Result<Resolution> {
        self.check_factories(manifest)?;

        let mut registry = DeviceRegistry::new();
        let mut skipped = Vec::new();
        for (doc, section) in manifest.sections() {
            let def = self.table.get(&section.factory).ok_or_else(|| {
                ManifestError::UnknownFactoryKind {
                    factory: section.factory.clone(),
                    origin: doc.origin.clone(),
                }
            })?;
            debug!(
                factory = %section.factory,
                origin = %doc.origin,
                entries = section.entries.len(),
                "resolving section"
            );
            for (index, entry) in section.entries.iter().enumerate() {
                if let Some(m) = self.metrics {
                    m.entries_processed.inc();
                }
                let outcome = self
                    .table
                    .invoke(def, entry, index)
                    .and_then(|handle| registry.insert(handle, self.config.duplicates));
                match outcome {
                    Ok(_) => {}
                    Err(error)
                        if self.config.failure == FailureMode::Lenient
                            && !error.is_structural() =>
                    {
                        warn!(
                            factory = %section.factory,
                            entry = %entry.describe(index),
                            error = %error,
                            "skipping manifest entry"
                        );
                        if let Some(m) = self.metrics {
                            m.entries_skipped.inc();
                        }
                        skipped.push(SkippedEntry {
                            factory: section.factory.clone(),
                            entry: entry.describe(index),
                            error,
                        });
                    }
                    Err(error) => return Err(error),
                }
            }
        }

        registry.mark_loaded();
        if let Some(m) = self.metrics {
            m.devices_loaded.set(registry.len() as i64);
        }
        info!(
            devices = registry.len(),
            skipped = skipped.len(),
            "device manifest resolved"
        );
        Ok(Resolution { registry, skipped })
    }

    fn check_factories(&self, manifest: &Manifest) -> Result<()> {
        for (doc, section) in manifest.sections() {
            if !self.table.contains(&section.factory) {
                return Err(ManifestError::UnknownFactoryKind {
                    factory: section.factory.clone(),
                    origin: doc.origin.clone(),
                });
            }
        }
        Ok(())
    }
}

/// Resolve with the built-in factory table and default policies.
pub fn resolve(manifest: &Manifest) -> Result<DeviceRegistry> {
    let table = FactoryTable::builtin();
    Resolver::new(&table, ResolverConfig::default()).resolve(manifest)
}

/// Names and classes of a registry, for log lines and listings.
pub fn summarize(registry: &DeviceRegistry) -> Vec<(String, String)> {
    registry
        .iter()
        .map(|d| (d.name().to_string(), d.class().to_string()))
        .collect()
}
