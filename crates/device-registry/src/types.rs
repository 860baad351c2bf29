use crate::error::{ManifestError, Result};
use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};

/// One device declaration exactly as written in the manifest.
///
/// The record is kept untyped here so the parsed manifest can be
/// re-serialized without loss; the factory table decodes it into a typed
/// record before anything is constructed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryRecord(Mapping);

impl EntryRecord {
    pub fn new(fields: Mapping) -> Self {
        Self(fields)
    }

    pub fn fields(&self) -> &Mapping {
        &self.0
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn name(&self) -> Option<&str> {
        self.get("name").and_then(Value::as_str)
    }

    /// Field names in declaration order. Non-string keys are rendered as YAML.
    pub fn field_names(&self) -> Vec<String> {
        self.0
            .keys()
            .map(|k| match k {
                Value::String(s) => s.clone(),
                other => serde_yaml::to_string(other)
                    .map(|s| s.trim_end().to_string())
                    .unwrap_or_default(),
            })
            .collect()
    }

    /// Label used in diagnostics: the device name if present, else the
    /// position within its section.
    pub fn describe(&self, index: usize) -> String {
        match self.name() {
            Some(name) => format!("`{name}`"),
            None => format!("#{}", index + 1),
        }
    }
}

/// All entries declared under one factory identifier in one document.
#[derive(Debug, Clone, PartialEq)]
pub struct Section {
    pub factory: String,
    pub entries: Vec<EntryRecord>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ManifestDocument {
    /// Where the document came from (file path, or a caller-supplied tag).
    pub origin: String,
    pub sections: Vec<Section>,
}

impl ManifestDocument {
    pub fn to_value(&self) -> Value {
        let mut map = Mapping::new();
        for section in &self.sections {
            let entries = section
                .entries
                .iter()
                .map(|e| Value::Mapping(e.fields().clone()))
                .collect();
            map.insert(
                Value::String(section.factory.clone()),
                Value::Sequence(entries),
            );
        }
        Value::Mapping(map)
    }
}

/// An ordered sequence of manifest documents.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Manifest {
    pub documents: Vec<ManifestDocument>,
}

impl Manifest {
    pub fn extend(&mut self, other: Manifest) {
        self.documents.extend(other.documents);
    }

    /// Sections across all documents, in load order.
    pub fn sections(&self) -> impl Iterator<Item = (&ManifestDocument, &Section)> {
        self.documents
            .iter()
            .flat_map(|doc| doc.sections.iter().map(move |s| (doc, s)))
    }

    pub fn entry_count(&self) -> usize {
        self.sections().map(|(_, s)| s.entries.len()).sum()
    }

    /// Render back to YAML, one `---` separated document per source document.
    pub fn to_yaml_string(&self) -> Result<String> {
        let mut out = String::new();
        for (i, doc) in self.documents.iter().enumerate() {
            if i > 0 {
                out.push_str("---\n");
            }
            let text = serde_yaml::to_string(&doc.to_value()).map_err(ManifestError::Render)?;
            out.push_str(&text);
        }
        Ok(out)
    }
}
