//! Typed entry records, one shape per factory kind.
//!
//! An [`EntryRecord`](crate::EntryRecord) is decoded into one of these only
//! after the factory's field schema has accepted its field names, so decode
//! failures here are value/type errors.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Fields shared by every device entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
pub struct CommonFields {
    pub name: String,
    #[serde(default)]
    pub prefix: String,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
pub struct ShutterRecord {
    #[serde(flatten)]
    pub common: CommonFields,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay_s: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
pub struct SocketDelayGenRecord {
    #[serde(flatten)]
    pub common: CommonFields,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
pub struct TemperatureRecord {
    #[serde(flatten)]
    pub common: CommonFields,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tolerance: Option<f64>,
    #[serde(default)]
    pub report_dmov_changes: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
pub struct MotorBundleRecord {
    #[serde(flatten)]
    pub common: CommonFields,
    #[cfg_attr(feature = "schema", schemars(with = "BTreeMap<String, String>"))]
    pub motors: MotorMap,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
pub struct AreaDetectorRecord {
    #[serde(flatten)]
    pub common: CommonFields,
    #[cfg_attr(feature = "schema", schemars(with = "Vec<schema_shapes::PluginShape>"))]
    pub plugins: Vec<PluginItem>,
}

/// Attribute → channel suffix pairs of a motor bundle, in declaration order.
///
/// Accepts a mapping (`{x: m1, y: m2}`) or a sequence of single-pair
/// mappings (`[{x: m1}, {y: m2}]`).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(try_from = "MotorsRepr", into = "MotorsRepr")]
pub struct MotorMap(Vec<(String, String)>);

impl MotorMap {
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(a, s)| (a.as_str(), s.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum MotorsRepr {
    Map(serde_yaml::Mapping),
    List(Vec<serde_yaml::Mapping>),
}

impl TryFrom<MotorsRepr> for MotorMap {
    type Error = String;

    fn try_from(repr: MotorsRepr) -> Result<Self, Self::Error> {
        let mut out = Vec::new();
        let mut push = |k: serde_yaml::Value, v: serde_yaml::Value| -> Result<(), String> {
            let attr = k.as_str().ok_or("motor attribute must be a string")?;
            let suffix = match v {
                serde_yaml::Value::String(s) => s,
                serde_yaml::Value::Number(n) => n.to_string(),
                _ => return Err(format!("motor `{attr}`: suffix must be a string")),
            };
            if out.iter().any(|(a, _): &(String, String)| a == attr) {
                return Err(format!("motor `{attr}` listed twice"));
            }
            out.push((attr.to_string(), suffix));
            Ok(())
        };
        match repr {
            MotorsRepr::Map(map) => {
                for (k, v) in map {
                    push(k, v)?;
                }
            }
            MotorsRepr::List(items) => {
                for item in items {
                    if item.len() != 1 {
                        return Err("each motors item must hold exactly one attribute".into());
                    }
                    for (k, v) in item {
                        push(k, v)?;
                    }
                }
            }
        }
        Ok(Self(out))
    }
}

impl From<MotorMap> for MotorsRepr {
    fn from(m: MotorMap) -> Self {
        MotorsRepr::Map(
            m.0.into_iter()
                .map(|(a, s)| (a.into(), s.into()))
                .collect(),
        )
    }
}

/// One area-detector plugin declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "PluginRepr", into = "PluginRepr")]
pub struct PluginItem {
    pub name: String,
    pub options: PluginOptions,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
pub struct PluginOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suffix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub write_path: Option<String>,
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum PluginRepr {
    Bare(String),
    Configured(BTreeMap<String, Option<PluginOptions>>),
}

impl TryFrom<PluginRepr> for PluginItem {
    type Error = String;

    fn try_from(repr: PluginRepr) -> Result<Self, Self::Error> {
        match repr {
            PluginRepr::Bare(name) => Ok(Self {
                name,
                options: PluginOptions::default(),
            }),
            PluginRepr::Configured(map) => {
                if map.len() != 1 {
                    return Err("each plugins item must name exactly one plugin".into());
                }
                let (name, options) = map
                    .into_iter()
                    .next()
                    .ok_or("empty plugins item")?;
                Ok(Self {
                    name,
                    options: options.unwrap_or_default(),
                })
            }
        }
    }
}

impl From<PluginItem> for PluginRepr {
    fn from(p: PluginItem) -> Self {
        if p.options == PluginOptions::default() {
            PluginRepr::Bare(p.name)
        } else {
            PluginRepr::Configured(BTreeMap::from([(p.name, Some(p.options))]))
        }
    }
}

#[cfg(feature = "schema")]
mod schema_shapes {
    use super::PluginOptions;
    use std::collections::BTreeMap;

    /// Schema stand-in for a plugins item: a bare name or `{name: options}`.
    #[derive(schemars::JsonSchema)]
    #[serde(untagged)]
    #[allow(dead_code)]
    pub enum PluginShape {
        Bare(String),
        Configured(BTreeMap<String, PluginOptions>),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_motor_map_from_mapping_keeps_order() {
        let m: MotorMap = serde_yaml::from_str("{z: m9, x: m1, y: m2}").unwrap();
        let attrs: Vec<&str> = m.iter().map(|(a, _)| a).collect();
        assert_eq!(attrs, vec!["z", "x", "y"]);
    }

    #[test]
    fn test_motor_map_from_list() {
        let m: MotorMap = serde_yaml::from_str("[{x: m1}, {y: m2}]").unwrap();
        assert_eq!(m.iter().collect::<Vec<_>>(), vec![("x", "m1"), ("y", "m2")]);
    }

    #[test]
    fn test_motor_map_rejects_repeated_attribute() {
        let r: Result<MotorMap, _> = serde_yaml::from_str("[{x: m1}, {x: m2}]");
        assert!(r.is_err());
    }

    #[test]
    fn test_plugin_items() {
        let items: Vec<PluginItem> = serde_yaml::from_str(
            r#"
- cam:
    class: id12_common.devices.ID12_PilatusCam_V34
- image
- hdf1:
    write_path: /data/
"#,
        )
        .unwrap();
        assert_eq!(items.len(), 3);
        assert_eq!(
            items[0].options.class.as_deref(),
            Some("id12_common.devices.ID12_PilatusCam_V34")
        );
        assert_eq!(items[1].name, "image");
        assert_eq!(items[1].options, PluginOptions::default());
        assert_eq!(items[2].options.write_path.as_deref(), Some("/data/"));
    }

    #[test]
    fn test_plugin_with_unknown_option_fails() {
        let r: Result<Vec<PluginItem>, _> = serde_yaml::from_str("- hdf1: {colour: blue}");
        assert!(r.is_err());
    }

    #[test]
    fn test_shutter_record_defaults() {
        let r: ShutterRecord =
            serde_yaml::from_str("{name: shutter, prefix: 'PA:12ID:STA_C_'}").unwrap();
        assert_eq!(r.common.name, "shutter");
        assert!(r.common.labels.is_empty());
        assert_eq!(r.delay_s, None);
    }
}
