use prometheus::core::Collector;
use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};

#[derive(Clone)]
pub struct ManifestMetrics {
    pub entries_processed: IntCounter,
    pub entries_skipped: IntCounter,
    pub devices_loaded: IntGauge,
}

#[derive(Clone)]
pub struct MetricsHub {
    pub registry: Registry,
    pub manifest: ManifestMetrics,
}

fn register(registry: &Registry, collector: impl Collector + 'static) -> Result<(), String> {
    registry
        .register(Box::new(collector))
        .map_err(|e| format!("metrics registration error: {e}"))
}

impl MetricsHub {
    pub fn new() -> Result<Self, String> {
        let registry = Registry::new();
        let entries_processed = IntCounter::new(
            "bl_manifest_entries_processed",
            "Total manifest entries handed to a factory",
        )
        .map_err(|e| format!("metrics init error: {e}"))?;
        let entries_skipped = IntCounter::new(
            "bl_manifest_entries_skipped",
            "Manifest entries skipped in lenient mode",
        )
        .map_err(|e| format!("metrics init error: {e}"))?;
        let devices_loaded =
            IntGauge::new("bl_devices_loaded", "Number of devices in the registry")
                .map_err(|e| format!("metrics init error: {e}"))?;
        let manifest = ManifestMetrics {
            entries_processed,
            entries_skipped,
            devices_loaded,
        };
        register(&registry, manifest.entries_processed.clone())?;
        register(&registry, manifest.entries_skipped.clone())?;
        register(&registry, manifest.devices_loaded.clone())?;
        Ok(Self { registry, manifest })
    }

    pub fn encode_text(&self) -> String {
        let mut buf = Vec::new();
        let encoder = TextEncoder::new();
        if let Err(e) = encoder.encode(&self.registry.gather(), &mut buf) {
            return format!("error encoding metrics: {e}");
        }
        String::from_utf8(buf).unwrap_or_default()
    }
}
