//! Static table of device factories.
//!
//! Every factory identifier a manifest may use is registered here with its
//! capability, its field schema and a constructor. Site code may register
//! more factories, and more implementation classes for overrides, before
//! resolving.

use crate::devices::{
    AdPlugin, AreaDetector, Capability, DeviceHandle, DeviceMeta, Dg645, Dg645Variant,
    EpicsMotor, EpicsSignal, MotorBundle, PluginKind, PssShutter, Ptc10, ScalerCh, SocketDg645,
    Struck3820, PSS_SHUTTER_DEFAULT_DELAY_S, PTC10_DEFAULT_TOLERANCE,
    SOCKET_DG645_DEFAULT_ADDRESS,
};
use crate::error::{ManifestError, Result};
use crate::specs::{
    AreaDetectorRecord, CommonFields, MotorBundleRecord, ShutterRecord, SocketDelayGenRecord,
    TemperatureRecord,
};
use crate::types::EntryRecord;
use serde::de::DeserializeOwned;
use serde_yaml::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

/// Slot a class override may fill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Role {
    Motor,
    Scaler,
    Shutter,
    DelayGenerator,
    Cam,
    Plugin,
}

impl Role {
    pub const ALL: [Role; 6] = [
        Self::Motor,
        Self::Scaler,
        Self::Shutter,
        Self::DelayGenerator,
        Self::Cam,
        Self::Plugin,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Motor => "motor",
            Self::Scaler => "scaler",
            Self::Shutter => "shutter",
            Self::DelayGenerator => "delay generator",
            Self::Cam => "detector cam",
            Self::Plugin => "detector plugin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Implementation classes a `class_name` / `class` override may select, per role.
#[derive(Debug, Clone)]
pub struct ImplCatalog {
    classes: BTreeMap<Role, BTreeSet<String>>,
}

impl Default for ImplCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

impl ImplCatalog {
    pub fn empty() -> Self {
        Self {
            classes: BTreeMap::new(),
        }
    }

    pub fn builtin() -> Self {
        let mut c = Self::empty();
        c.allow(Role::Motor, "ophyd.EpicsMotor");
        for s in [
            "ophyd.scaler.ScalerCH",
            "apstools.devices.Struck3820",
            "id12_common.devices.ID12_Struck3820",
        ] {
            c.allow(Role::Scaler, s);
        }
        for s in [
            "apstools.devices.ApsPssShutter",
            "id12_common.devices.ID12_ApsPssShutter",
        ] {
            c.allow(Role::Shutter, s);
        }
        for s in ["apstools.devices.DG645Delay", "id12_common.devices.DG645Delay"] {
            c.allow(Role::DelayGenerator, s);
        }
        for s in [
            "ophyd.areadetector.cam.AreaDetectorCam",
            "ophyd.areadetector.cam.SimDetectorCam",
            "ophyd.areadetector.cam.PilatusDetectorCam",
            "apstools.devices.SimDetectorCam_V34",
            "id12_common.devices.CamUpdates_V34",
            "id12_common.devices.ID12_PilatusCam_V34",
        ] {
            c.allow(Role::Cam, s);
        }
        for kind in PluginKind::ALL {
            if kind != PluginKind::Cam {
                c.allow(Role::Plugin, kind.default_class());
            }
        }
        c.allow(Role::Plugin, "ophyd.areadetector.plugins.HDF5Plugin_V34");
        c.allow(Role::Plugin, "ophyd.areadetector.plugins.TIFFPlugin_V34");
        c
    }

    pub fn allow(&mut self, role: Role, class: impl Into<String>) {
        self.classes.entry(role).or_default().insert(class.into());
    }

    pub fn contains(&self, role: Role, class: &str) -> bool {
        self.classes
            .get(&role)
            .is_some_and(|set| set.contains(class))
    }

    pub fn classes(&self, role: Role) -> impl Iterator<Item = &str> {
        self.classes
            .get(&role)
            .into_iter()
            .flat_map(|set| set.iter().map(String::as_str))
    }
}

/// Field names a factory accepts. Anything else is rejected.
#[derive(Debug, Clone, Copy)]
pub struct FieldSchema {
    pub required: &'static [&'static str],
    pub optional: &'static [&'static str],
}

impl FieldSchema {
    pub fn check(&self, factory: &str, entry: &EntryRecord, index: usize) -> Result<()> {
        for &field in self.required {
            if matches!(entry.get(field), None | Some(Value::Null)) {
                return Err(ManifestError::MissingField {
                    factory: factory.to_string(),
                    entry: entry.describe(index),
                    field,
                });
            }
        }
        for field in entry.field_names() {
            let known = self.required.contains(&field.as_str())
                || self.optional.contains(&field.as_str());
            if !known {
                return Err(ManifestError::UnexpectedField {
                    factory: factory.to_string(),
                    entry: entry.describe(index),
                    field,
                });
            }
        }
        Ok(())
    }
}

pub type BuildFn = fn(&Invocation<'_>, &EntryRecord) -> Result<DeviceHandle>;

#[derive(Clone, Copy)]
pub struct FactoryDef {
    pub id: &'static str,
    pub capability: Capability,
    pub schema: FieldSchema,
    pub build: BuildFn,
}

impl fmt::Debug for FactoryDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FactoryDef")
            .field("id", &self.id)
            .field("capability", &self.capability)
            .field("schema", &self.schema)
            .finish_non_exhaustive()
    }
}

/// Context handed to a constructor for one entry.
pub struct Invocation<'a> {
    pub factory: &'a str,
    /// Entry label for diagnostics.
    pub entry: String,
    pub catalog: &'a ImplCatalog,
}

impl Invocation<'_> {
    pub fn decode<T: DeserializeOwned>(&self, rec: &EntryRecord) -> Result<T> {
        serde_yaml::from_value(Value::Mapping(rec.fields().clone()))
            .map_err(|e| self.invalid(e.to_string()))
    }

    pub fn invalid(&self, reason: impl Into<String>) -> ManifestError {
        ManifestError::InvalidField {
            factory: self.factory.to_string(),
            entry: self.entry.clone(),
            reason: reason.into(),
        }
    }

    /// The override if one was given and the catalogue knows it, else `default`.
    pub fn resolve_class(&self, role: Role, requested: Option<&str>, default: &str) -> Result<String> {
        match requested {
            None => Ok(default.to_string()),
            Some(class) if self.catalog.contains(role, class) => Ok(class.to_string()),
            Some(class) => Err(ManifestError::UnresolvableOverride {
                entry: self.entry.clone(),
                role: role.as_str(),
                class: class.to_string(),
            }),
        }
    }

    /// Validate the shared fields and turn them into handle metadata.
    pub fn meta(&self, common: CommonFields, class: String) -> Result<DeviceMeta> {
        if !is_identifier(&common.name) {
            return Err(self.invalid(format!(
                "name `{}` is not a valid identifier",
                common.name
            )));
        }
        Ok(DeviceMeta::new(common.name, common.prefix, common.labels, class))
    }
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    }
}

/// Registered factories, keyed by identifier.
#[derive(Debug, Clone)]
pub struct FactoryTable {
    defs: Vec<FactoryDef>,
    index: HashMap<&'static str, usize>,
    catalog: ImplCatalog,
}

impl Default for FactoryTable {
    fn default() -> Self {
        Self::builtin()
    }
}

impl FactoryTable {
    pub fn empty() -> Self {
        Self {
            defs: Vec::new(),
            index: HashMap::new(),
            catalog: ImplCatalog::builtin(),
        }
    }

    pub fn builtin() -> Self {
        let mut table = Self::empty();
        for def in BUILTIN {
            table.index.insert(def.id, table.defs.len());
            table.defs.push(*def);
        }
        table
    }

    pub fn register(&mut self, def: FactoryDef) -> Result<()> {
        if self.index.contains_key(def.id) {
            return Err(ManifestError::DuplicateFactory(def.id.to_string()));
        }
        tracing::debug!(factory = def.id, capability = %def.capability, "registered factory");
        self.index.insert(def.id, self.defs.len());
        self.defs.push(def);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&FactoryDef> {
        self.index.get(id).map(|&i| &self.defs[i])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// Factories in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &FactoryDef> {
        self.defs.iter()
    }

    pub fn catalog(&self) -> &ImplCatalog {
        &self.catalog
    }

    pub fn catalog_mut(&mut self) -> &mut ImplCatalog {
        &mut self.catalog
    }

    /// Check the entry against the factory's schema and construct it.
    pub fn invoke(&self, def: &FactoryDef, entry: &EntryRecord, index: usize) -> Result<DeviceHandle> {
        def.schema.check(def.id, entry, index)?;
        let inv = Invocation {
            factory: def.id,
            entry: entry.describe(index),
            catalog: &self.catalog,
        };
        (def.build)(&inv, entry)
    }
}

const SIMPLE: FieldSchema = FieldSchema {
    required: &["name", "prefix"],
    optional: &["labels", "class_name"],
};

static BUILTIN: &[FactoryDef] = &[
    FactoryDef {
        id: "ophyd.EpicsMotor",
        capability: Capability::SingleDevice,
        schema: SIMPLE,
        build: build_motor,
    },
    FactoryDef {
        id: "ophyd.EpicsSignal",
        capability: Capability::SingleDevice,
        schema: FieldSchema {
            required: &["name", "prefix"],
            optional: &["labels"],
        },
        build: build_signal,
    },
    FactoryDef {
        id: "ophyd.EpicsSignalRO",
        capability: Capability::SingleDevice,
        schema: FieldSchema {
            required: &["name", "prefix"],
            optional: &["labels"],
        },
        build: build_signal,
    },
    FactoryDef {
        id: "ophyd.scaler.ScalerCH",
        capability: Capability::SingleDevice,
        schema: SIMPLE,
        build: build_scaler,
    },
    FactoryDef {
        id: "apstools.devices.Struck3820",
        capability: Capability::SingleDevice,
        schema: SIMPLE,
        build: build_scaler,
    },
    FactoryDef {
        id: "id12_common.devices.ID12_Struck3820",
        capability: Capability::SingleDevice,
        schema: SIMPLE,
        build: build_scaler,
    },
    FactoryDef {
        id: "apstools.devices.ApsPssShutter",
        capability: Capability::SingleDevice,
        schema: SIMPLE,
        build: build_shutter,
    },
    FactoryDef {
        id: "id12_common.devices.ID12_ApsPssShutter",
        capability: Capability::SingleDevice,
        schema: FieldSchema {
            required: &["name", "prefix"],
            optional: &["labels", "class_name", "delay_s"],
        },
        build: build_shutter,
    },
    FactoryDef {
        id: "apstools.devices.DG645Delay",
        capability: Capability::SingleDevice,
        schema: SIMPLE,
        build: build_dg645,
    },
    FactoryDef {
        id: "id12_common.devices.DG645Delay",
        capability: Capability::SingleDevice,
        schema: SIMPLE,
        build: build_dg645,
    },
    FactoryDef {
        id: "id12_common.devices.SocketDG645DelayGen",
        capability: Capability::SingleDevice,
        schema: FieldSchema {
            required: &["name"],
            optional: &["labels", "prefix", "address"],
        },
        build: build_socket_dg645,
    },
    FactoryDef {
        id: "id12_common.devices.PTC10_12ID",
        capability: Capability::SingleDevice,
        schema: FieldSchema {
            required: &["name", "prefix"],
            optional: &["labels", "tolerance", "report_dmov_changes"],
        },
        build: build_ptc10,
    },
    FactoryDef {
        id: "apstools.devices.motor_factory.mb_creator",
        capability: Capability::DeviceGroup,
        schema: FieldSchema {
            required: &["name", "motors"],
            optional: &["prefix", "labels", "class_name"],
        },
        build: build_motor_bundle,
    },
    FactoryDef {
        id: "apstools.devices.ad_creator",
        capability: Capability::CompoundInstrument,
        schema: FieldSchema {
            required: &["name", "prefix", "plugins"],
            optional: &["labels", "class_name"],
        },
        build: build_area_detector,
    },
];

fn build_motor(inv: &Invocation<'_>, rec: &EntryRecord) -> Result<DeviceHandle> {
    let c: CommonFields = inv.decode(rec)?;
    let class = inv.resolve_class(Role::Motor, c.class_name.as_deref(), inv.factory)?;
    Ok(Arc::new(EpicsMotor::new(inv.meta(c, class)?)))
}

fn build_signal(inv: &Invocation<'_>, rec: &EntryRecord) -> Result<DeviceHandle> {
    let c: CommonFields = inv.decode(rec)?;
    let read_only = inv.factory.ends_with("RO");
    let meta = inv.meta(c, inv.factory.to_string())?;
    Ok(Arc::new(EpicsSignal::new(meta, read_only)))
}

fn build_scaler(inv: &Invocation<'_>, rec: &EntryRecord) -> Result<DeviceHandle> {
    let c: CommonFields = inv.decode(rec)?;
    let class = inv.resolve_class(Role::Scaler, c.class_name.as_deref(), inv.factory)?;
    let handle: DeviceHandle = match class.as_str() {
        "apstools.devices.Struck3820" => Arc::new(Struck3820::new(inv.meta(c, class)?, true)),
        "id12_common.devices.ID12_Struck3820" => {
            Arc::new(Struck3820::new(inv.meta(c, class)?, false))
        }
        _ => Arc::new(ScalerCh::new(inv.meta(c, class)?)),
    };
    Ok(handle)
}

fn build_shutter(inv: &Invocation<'_>, rec: &EntryRecord) -> Result<DeviceHandle> {
    let r: ShutterRecord = inv.decode(rec)?;
    let delay_s = r.delay_s.unwrap_or(PSS_SHUTTER_DEFAULT_DELAY_S);
    if !delay_s.is_finite() || delay_s < 0.0 {
        return Err(inv.invalid(format!("delay_s must be a non-negative number, got {delay_s}")));
    }
    let class = inv.resolve_class(Role::Shutter, r.common.class_name.as_deref(), inv.factory)?;
    Ok(Arc::new(PssShutter::new(inv.meta(r.common, class)?, delay_s)))
}

fn build_dg645(inv: &Invocation<'_>, rec: &EntryRecord) -> Result<DeviceHandle> {
    let c: CommonFields = inv.decode(rec)?;
    let class = inv.resolve_class(Role::DelayGenerator, c.class_name.as_deref(), inv.factory)?;
    let variant = if class.starts_with("id12_common.") {
        Dg645Variant::Id12
    } else {
        Dg645Variant::Aps
    };
    Ok(Arc::new(Dg645::new(inv.meta(c, class)?, variant)))
}

fn build_socket_dg645(inv: &Invocation<'_>, rec: &EntryRecord) -> Result<DeviceHandle> {
    let r: SocketDelayGenRecord = inv.decode(rec)?;
    let address = r
        .address
        .clone()
        .unwrap_or_else(|| SOCKET_DG645_DEFAULT_ADDRESS.to_string());
    let meta = inv.meta(r.common, inv.factory.to_string())?;
    let dev = SocketDg645::new(meta, &address).map_err(|e| inv.invalid(e))?;
    Ok(Arc::new(dev))
}

fn build_ptc10(inv: &Invocation<'_>, rec: &EntryRecord) -> Result<DeviceHandle> {
    let r: TemperatureRecord = inv.decode(rec)?;
    let tolerance = r.tolerance.unwrap_or(PTC10_DEFAULT_TOLERANCE);
    if !tolerance.is_finite() || tolerance <= 0.0 {
        return Err(inv.invalid(format!("tolerance must be positive, got {tolerance}")));
    }
    let meta = inv.meta(r.common, inv.factory.to_string())?;
    Ok(Arc::new(Ptc10::new(meta, tolerance, r.report_dmov_changes)))
}

fn generated_type_name(inv: &Invocation<'_>, requested: Option<String>, default: &str) -> Result<String> {
    match requested {
        Some(n) if is_identifier(&n) => Ok(n),
        Some(n) => Err(inv.invalid(format!("class_name `{n}` is not a valid type name"))),
        None => Ok(default.to_string()),
    }
}

fn build_motor_bundle(inv: &Invocation<'_>, rec: &EntryRecord) -> Result<DeviceHandle> {
    let r: MotorBundleRecord = inv.decode(rec)?;
    if r.motors.is_empty() {
        return Err(inv.invalid("motors must list at least one motor"));
    }
    let mut common = r.common;
    let type_name = generated_type_name(inv, common.class_name.take(), "MB")?;
    let motors: Vec<(&str, &str)> = r.motors.iter().collect();
    let meta = inv.meta(common, inv.factory.to_string())?;
    Ok(Arc::new(MotorBundle::new(meta, type_name, &motors)))
}

fn build_area_detector(inv: &Invocation<'_>, rec: &EntryRecord) -> Result<DeviceHandle> {
    let r: AreaDetectorRecord = inv.decode(rec)?;
    let mut common = r.common;
    let type_name = generated_type_name(inv, common.class_name.take(), "ADclass")?;

    let mut plugins: Vec<AdPlugin> = Vec::with_capacity(r.plugins.len());
    for item in r.plugins {
        if plugins.iter().any(|p| p.attr == item.name) {
            return Err(inv.invalid(format!("plugin `{}` listed twice", item.name)));
        }
        let opts = item.options;
        let parsed = PluginKind::parse(&item.name).map_err(|e| {
            inv.invalid(format!("plugin `{}` has a bad instance number: {e}", item.name))
        })?;
        let (class, suffix) = match parsed {
            Some((kind, number)) => {
                let role = if kind == PluginKind::Cam {
                    Role::Cam
                } else {
                    Role::Plugin
                };
                let class = inv.resolve_class(role, opts.class.as_deref(), kind.default_class())?;
                let suffix = opts.suffix.unwrap_or_else(|| kind.default_suffix(number));
                (class, suffix)
            }
            None => {
                let Some(requested) = opts.class.as_deref() else {
                    return Err(inv.invalid(format!(
                        "plugin `{}` is not a known kind; give it a `class`",
                        item.name
                    )));
                };
                let class = inv.resolve_class(Role::Plugin, Some(requested), requested)?;
                let suffix = opts.suffix.unwrap_or_else(|| format!("{}:", item.name));
                (class, suffix)
            }
        };
        let prefix = format!("{}{suffix}", common.prefix);
        if let Some(other) = plugins.iter().find(|p| p.prefix == prefix) {
            return Err(inv.invalid(format!(
                "plugins `{}` and `{}` share record prefix `{prefix}`",
                other.attr, item.name
            )));
        }
        plugins.push(AdPlugin {
            prefix,
            attr: item.name,
            kind: parsed.map(|(k, _)| k),
            class,
            read_path: opts.read_path,
            write_path: opts.write_path,
        });
    }
    let cams = plugins
        .iter()
        .filter(|p| p.kind == Some(PluginKind::Cam))
        .count();
    if cams != 1 {
        return Err(inv.invalid(format!(
            "an area detector needs exactly one `cam` plugin, found {cams}"
        )));
    }

    let meta = inv.meta(common, inv.factory.to_string())?;
    Ok(Arc::new(AreaDetector::new(meta, type_name, plugins)))
}
