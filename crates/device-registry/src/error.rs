use std::path::PathBuf;
use thiserror::Error;

pub type Result<T, E = ManifestError> = core::result::Result<T, E>;

/// Load-time failures of a device manifest. All of them stop startup in
/// strict mode.
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("unknown factory `{factory}` (in {origin})")]
    UnknownFactoryKind { factory: String, origin: String },
    #[error("entry {entry} under `{factory}` is missing required field `{field}`")]
    MissingField {
        factory: String,
        entry: String,
        field: &'static str,
    },
    #[error("entry {entry} under `{factory}` has unexpected field `{field}`")]
    UnexpectedField {
        factory: String,
        entry: String,
        field: String,
    },
    #[error("entry {entry} under `{factory}`: invalid field: {reason}")]
    InvalidField {
        factory: String,
        entry: String,
        reason: String,
    },
    #[error("entry {entry}: class override `{class}` for {role} does not name a known implementation")]
    UnresolvableOverride {
        entry: String,
        role: &'static str,
        class: String,
    },
    #[error("device name `{name}` is declared more than once")]
    DuplicateName { name: String },
    #[error("factory `{0}` is registered more than once")]
    DuplicateFactory(String),
    #[error("parsing yaml ({origin}): {source}")]
    Parse {
        origin: String,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("rendering yaml: {0}")]
    Render(#[source] serde_yaml::Error),
    #[error("manifest document {index} in {origin} is not a mapping of factory identifiers")]
    NotAMapping { origin: String, index: usize },
    #[error("reading manifest {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ManifestError {
    /// Errors that abort a load regardless of the failure mode.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            Self::DuplicateName { .. }
                | Self::DuplicateFactory(_)
                | Self::Parse { .. }
                | Self::Render(_)
                | Self::NotAMapping { .. }
                | Self::Io { .. }
        )
    }
}
