use crate::error::{ManifestError, Result};
use crate::types::{EntryRecord, Manifest, ManifestDocument, Section};
use serde::Deserialize;
use serde_yaml::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Parse manifest text. `origin` is only used in diagnostics.
pub fn parse_manifest_str(src: &str, origin: &str) -> Result<Manifest> {
    let mut manifest = Manifest::default();
    for (index, document) in serde_yaml::Deserializer::from_str(src).enumerate() {
        let value = Value::deserialize(document).map_err(|source| ManifestError::Parse {
            origin: origin.to_string(),
            source,
        })?;
        let map = match value {
            // a document holding only comments
            Value::Null => continue,
            Value::Mapping(map) => map,
            _ => {
                return Err(ManifestError::NotAMapping {
                    origin: origin.to_string(),
                    index,
                })
            }
        };

        let mut sections = Vec::with_capacity(map.len());
        for (key, val) in map {
            let Value::String(factory) = key else {
                return Err(ManifestError::NotAMapping {
                    origin: origin.to_string(),
                    index,
                });
            };
            let entries = parse_entries(&factory, val)?;
            sections.push(Section { factory, entries });
        }
        manifest.documents.push(ManifestDocument {
            origin: origin.to_string(),
            sections,
        });
    }
    Ok(manifest)
}

fn parse_entries(factory: &str, val: Value) -> Result<Vec<EntryRecord>> {
    match val {
        // every entry under the key commented out
        Value::Null => Ok(Vec::new()),
        Value::Sequence(items) => items
            .into_iter()
            .enumerate()
            .map(|(i, item)| match item {
                Value::Mapping(fields) => Ok(EntryRecord::new(fields)),
                _ => Err(ManifestError::InvalidField {
                    factory: factory.to_string(),
                    entry: format!("#{}", i + 1),
                    reason: "entry is not a mapping".into(),
                }),
            })
            .collect(),
        _ => Err(ManifestError::InvalidField {
            factory: factory.to_string(),
            entry: "(section)".into(),
            reason: "expected a sequence of entries".into(),
        }),
    }
}

pub fn load_manifest_file(path: impl AsRef<Path>) -> Result<Manifest> {
    let path = path.as_ref();
    let raw = fs::read_to_string(path).map_err(|source| ManifestError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let manifest = parse_manifest_str(&raw, &path.display().to_string())?;
    debug!(
        path = %path.display(),
        documents = manifest.documents.len(),
        entries = manifest.entry_count(),
        "loaded manifest file"
    );
    Ok(manifest)
}

/// Load every `*.yml` / `*.yaml` file of a directory, in sorted path order.
pub fn load_manifest_dir(dir: impl AsRef<Path>) -> Result<Manifest> {
    let dir = dir.as_ref();
    let io_err = |source| ManifestError::Io {
        path: dir.to_path_buf(),
        source,
    };
    let mut entries: Vec<PathBuf> = Vec::new();
    for entry in fs::read_dir(dir).map_err(io_err)? {
        let path = entry.map_err(io_err)?.path();
        if let Some(ext) = path.extension() {
            if ext == "yml" || ext == "yaml" {
                entries.push(path);
            }
        }
    }
    entries.sort();
    let mut manifest = Manifest::default();
    for p in entries {
        manifest.extend(load_manifest_file(&p)?);
    }
    Ok(manifest)
}

/// Load a mix of manifest files and directories, preserving argument order.
pub fn load_manifests<P: AsRef<Path>>(paths: &[P]) -> Result<Manifest> {
    let mut manifest = Manifest::default();
    for p in paths {
        let p = p.as_ref();
        if p.is_dir() {
            manifest.extend(load_manifest_dir(p)?);
        } else {
            manifest.extend(load_manifest_file(p)?);
        }
    }
    Ok(manifest)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TWO_DOCS: &str = r#"
# motors first
ophyd.EpicsMotor:
  - name: idc_m1
    prefix: "12idc:m1"
    labels: [motor]
  # - name: idc_m2
  #   prefix: "12idc:m2"
  - name: idc_m3
    prefix: "12idc:m3"
    labels: [motor, baseline]
---
ophyd.scaler.ScalerCH:
  - name: scaler1
    prefix: "12idc:scaler1"
    labels: [scalers, detectors]
apstools.devices.ApsPssShutter:
"#;

    #[test]
    fn test_documents_and_order_preserved() {
        let m = parse_manifest_str(TWO_DOCS, "inline").unwrap();
        assert_eq!(m.documents.len(), 2);
        let factories: Vec<&str> = m.sections().map(|(_, s)| s.factory.as_str()).collect();
        assert_eq!(
            factories,
            vec![
                "ophyd.EpicsMotor",
                "ophyd.scaler.ScalerCH",
                "apstools.devices.ApsPssShutter"
            ]
        );
        let names: Vec<&str> = m
            .sections()
            .flat_map(|(_, s)| s.entries.iter().filter_map(|e| e.name()))
            .collect();
        assert_eq!(names, vec!["idc_m1", "idc_m3", "scaler1"]);
        assert_eq!(m.entry_count(), 3);
    }

    #[test]
    fn test_round_trip_preserves_entries() {
        let m = parse_manifest_str(TWO_DOCS, "inline").unwrap();
        let text = m.to_yaml_string().unwrap();
        let again = parse_manifest_str(&text, "inline").unwrap();
        assert_eq!(m, again);
        let first = &again.documents[0].sections[0].entries[1];
        assert_eq!(first.field_names(), vec!["name", "prefix", "labels"]);
    }

    #[test]
    fn test_comment_only_document_is_empty() {
        let m = parse_manifest_str("# nothing here\n", "inline").unwrap();
        assert!(m.documents.is_empty());
        assert_eq!(m.entry_count(), 0);
    }

    #[test]
    fn test_rejects_non_mapping_document() {
        let err = parse_manifest_str("- just\n- a list\n", "inline").unwrap_err();
        assert!(matches!(err, ManifestError::NotAMapping { index: 0, .. }));
    }

    #[test]
    fn test_rejects_scalar_entry() {
        let err = parse_manifest_str("ophyd.EpicsMotor:\n  - m1\n", "inline").unwrap_err();
        match err {
            ManifestError::InvalidField { factory, entry, .. } => {
                assert_eq!(factory, "ophyd.EpicsMotor");
                assert_eq!(entry, "#1");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_yaml_syntax_error_is_parse_error() {
        let err = parse_manifest_str("ophyd.EpicsMotor: [\n", "bad.yml").unwrap_err();
        assert!(matches!(err, ManifestError::Parse { ref origin, .. } if origin == "bad.yml"));
    }

    #[test]
    fn test_dir_loads_sorted_yaml_only() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("20_scalers.yaml"),
            "ophyd.scaler.ScalerCH:\n  - {name: scaler1, prefix: 'x:'}\n",
        )
        .unwrap();
        fs::write(
            dir.path().join("10_motors.yml"),
            "ophyd.EpicsMotor:\n  - {name: m1, prefix: 'x:m1'}\n",
        )
        .unwrap();
        fs::write(dir.path().join("notes.txt"), "not yaml: [").unwrap();

        let m = load_manifest_dir(dir.path()).unwrap();
        let factories: Vec<&str> = m.sections().map(|(_, s)| s.factory.as_str()).collect();
        assert_eq!(factories, vec!["ophyd.EpicsMotor", "ophyd.scaler.ScalerCH"]);
        assert!(m.documents[0].origin.ends_with("10_motors.yml"));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = load_manifest_file("/definitely/not/here.yml").unwrap_err();
        assert!(matches!(err, ManifestError::Io { .. }));
    }

    #[test]
    fn test_sample_manifest_parses() {
        let src = include_str!("../../../configs/devices.yml");
        let m = parse_manifest_str(src, "configs/devices.yml").unwrap();
        assert!(m.entry_count() > 5);
    }
}
