use crate::devices::{Device, DeviceHandle};
use crate::error::{ManifestError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use time::OffsetDateTime;
use tracing::{debug, info, warn};

/// What happens when a name is registered twice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicatePolicy {
    /// Fail with `DuplicateName`.
    #[default]
    Reject,
    /// Replace the earlier handle, logging a warning.
    Overwrite,
}

/// Whether a bad entry aborts the whole load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureMode {
    #[default]
    Strict,
    /// Skip the entry, report it and keep going.
    Lenient,
}

/// Device handles keyed by name.
///
/// Iteration follows insertion order. An overwritten handle keeps the
/// position of the one it replaced.
#[derive(Debug, Default, Clone)]
pub struct DeviceRegistry {
    devices: Vec<DeviceHandle>,
    index: HashMap<String, usize>,
    loaded_at: Option<OffsetDateTime>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handle` under its name. Returns the replaced handle, if any.
    pub fn insert(
        &mut self,
        handle: DeviceHandle,
        policy: DuplicatePolicy,
    ) -> Result<Option<DeviceHandle>> {
        let name = handle.name().to_string();
        if let Some(&i) = self.index.get(&name) {
            return match policy {
                DuplicatePolicy::Reject => Err(ManifestError::DuplicateName { name }),
                DuplicatePolicy::Overwrite => {
                    warn!(device = %name, class = handle.class(), "overwriting earlier device");
                    Ok(Some(std::mem::replace(&mut self.devices[i], handle)))
                }
            };
        }
        debug!(device = %name, class = handle.class(), "registered device");
        self.index.insert(name, self.devices.len());
        self.devices.push(handle);
        Ok(None)
    }

    pub fn get(&self, name: &str) -> Option<&DeviceHandle> {
        self.index.get(name).map(|&i| &self.devices[i])
    }

    /// Look a device up and downcast it to its concrete type.
    pub fn get_as<T: Device>(&self, name: &str) -> Option<&T> {
        self.get(name)?.as_any().downcast_ref::<T>()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn by_label<'a>(&'a self, label: &'a str) -> impl Iterator<Item = &'a DeviceHandle> + 'a {
        self.devices
            .iter()
            .filter(move |d| d.labels().iter().any(|l| l == label))
    }

    /// Every label used by a registered device, sorted.
    pub fn labels(&self) -> BTreeSet<&str> {
        self.devices
            .iter()
            .flat_map(|d| d.labels().iter().map(String::as_str))
            .collect()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.devices.iter().map(|d| d.name())
    }

    pub fn iter(&self) -> impl Iterator<Item = &DeviceHandle> {
        self.devices.iter()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn loaded_at(&self) -> Option<OffsetDateTime> {
        self.loaded_at
    }

    pub(crate) fn mark_loaded(&mut self) {
        self.loaded_at = Some(OffsetDateTime::now_utc());
    }

    /// End of the registry's lifetime. Handles still shared elsewhere stay alive.
    pub fn close(self) {
        info!(devices = self.devices.len(), "closing device registry");
    }
}

impl<'a> IntoIterator for &'a DeviceRegistry {
    type Item = &'a DeviceHandle;
    type IntoIter = std::slice::Iter<'a, DeviceHandle>;

    fn into_iter(self) -> Self::IntoIter {
        self.devices.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::{DeviceMeta, EpicsMotor, EpicsSignal};
    use std::sync::Arc;

    fn motor(name: &str, prefix: &str, labels: &[&str]) -> DeviceHandle {
        Arc::new(EpicsMotor::new(DeviceMeta::new(
            name,
            prefix,
            labels.iter().map(|l| l.to_string()).collect(),
            "ophyd.EpicsMotor",
        )))
    }

    #[test]
    fn test_insert_and_lookup() {
        let mut reg = DeviceRegistry::new();
        assert!(reg.is_empty());
        reg.insert(motor("idc_m1", "12idc:m1", &["motor"]), DuplicatePolicy::Reject)
            .unwrap();
        assert_eq!(reg.len(), 1);
        assert!(reg.contains("idc_m1"));
        assert!(reg.get_as::<EpicsMotor>("idc_m1").is_some());
        assert!(reg.get_as::<EpicsSignal>("idc_m1").is_none());
        assert!(reg.get("idc_m2").is_none());
    }

    #[test]
    fn test_reject_duplicate() {
        let mut reg = DeviceRegistry::new();
        reg.insert(motor("beamstop", "a:", &[]), DuplicatePolicy::Reject)
            .unwrap();
        let err = reg
            .insert(motor("beamstop", "b:", &[]), DuplicatePolicy::Reject)
            .unwrap_err();
        assert!(matches!(err, ManifestError::DuplicateName { ref name } if name == "beamstop"));
        assert_eq!(reg.get("beamstop").unwrap().meta().prefix, "a:");
    }

    #[test]
    fn test_overwrite_keeps_position() {
        let mut reg = DeviceRegistry::new();
        reg.insert(motor("a", "1:", &[]), DuplicatePolicy::Reject).unwrap();
        reg.insert(motor("b", "2:", &[]), DuplicatePolicy::Reject).unwrap();
        let old = reg
            .insert(motor("a", "3:", &[]), DuplicatePolicy::Overwrite)
            .unwrap();
        assert_eq!(old.unwrap().meta().prefix, "1:");
        assert_eq!(reg.names().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(reg.get("a").unwrap().meta().prefix, "3:");
    }

    #[test]
    fn test_labels() {
        let mut reg = DeviceRegistry::new();
        reg.insert(motor("m1", "1:", &["motor", "baseline"]), DuplicatePolicy::Reject)
            .unwrap();
        reg.insert(motor("m2", "2:", &["motor"]), DuplicatePolicy::Reject)
            .unwrap();
        let motors: Vec<&str> = reg.by_label("motor").map(|d| d.name()).collect();
        assert_eq!(motors, vec!["m1", "m2"]);
        assert_eq!(reg.by_label("baseline").count(), 1);
        assert_eq!(reg.labels().into_iter().collect::<Vec<_>>(), vec!["baseline", "motor"]);
    }

    #[test]
    fn test_policy_names() {
        let p: DuplicatePolicy = serde_yaml::from_str("overwrite").unwrap();
        assert_eq!(p, DuplicatePolicy::Overwrite);
        let f: FailureMode = serde_yaml::from_str("lenient").unwrap();
        assert_eq!(f, FailureMode::Lenient);
        assert_eq!(FailureMode::default(), FailureMode::Strict);
    }
}
