//! device-registry: resolves YAML beamline device manifests into a registry of device handles

mod error;
pub use error::{ManifestError, Result};

mod types;
pub use types::*;

mod loader;
pub use loader::{load_manifest_dir, load_manifest_file, load_manifests, parse_manifest_str};

pub mod specs;

pub mod devices;
pub use devices::{Capability, Channel, Device, DeviceHandle, DeviceInfo, DeviceMeta};

mod factory;
pub use factory::{BuildFn, FactoryDef, FactoryTable, FieldSchema, ImplCatalog, Invocation, Role};

mod registry;
pub use registry::{DeviceRegistry, DuplicatePolicy, FailureMode};

mod resolver;
pub use resolver::{resolve, summarize, Resolution, Resolver, ResolverConfig, SkippedEntry};

mod metrics;
pub use metrics::{ManifestMetrics, MetricsHub};

pub mod plans;
