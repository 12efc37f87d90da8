use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use thiserror::Error;

/// File name of an authored package descriptor inside a package root.
pub const DESCRIPTOR_FILE: &str = "package.toml";

/// Per-package metadata, either authored by the package or synthesized.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PackageDescriptor {
    pub name: String,
    pub version: String,
    pub summary: String,
    /// Paths relative to the package root, sorted.
    pub files: Vec<String>,
    pub origin: DescriptorOrigin,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum DescriptorOrigin {
    Authored { path: PathBuf },
    Synthesized,
}

impl DescriptorOrigin {
    pub fn is_synthesized(&self) -> bool {
        matches!(self, DescriptorOrigin::Synthesized)
    }
}

impl PackageDescriptor {
    pub fn is_synthesized(&self) -> bool {
        self.origin.is_synthesized()
    }

    pub fn contains_file(&self, file: &str) -> bool {
        self.files.binary_search_by(|f| f.as_str().cmp(file)).is_ok()
    }
}

/// On-disk shape of an authored descriptor, before evaluation.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct RawDescriptor {
    /// Files to load before the fields are evaluated, relative to the descriptor.
    #[serde(default)]
    pub load: Vec<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    /// Glob patterns relative to the package root.
    #[serde(default)]
    pub files: Vec<String>,
    #[serde(default)]
    pub define: BTreeMap<String, String>,
}

#[derive(Debug, Error)]
pub enum DescriptorError {
    #[error("failed to read descriptor {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid descriptor {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("descriptor {} references undefined symbol `{symbol}`", .path.display())]
    UndefinedSymbol { path: PathBuf, symbol: String },
    #[error("descriptor {} has an invalid file pattern '{pattern}': {reason}", .path.display())]
    InvalidPattern {
        path: PathBuf,
        pattern: String,
        reason: String,
    },
    #[error("descriptor {} does not declare a {field}", .path.display())]
    MissingField { path: PathBuf, field: &'static str },
    #[error("file {} loaded by descriptor {} is not a table of string symbols: {reason}", .loaded.display(), .path.display())]
    InvalidSymbols {
        path: PathBuf,
        loaded: PathBuf,
        reason: String,
    },
    #[error("failed to list files of {}: {source}", .path.display())]
    Listing {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Evaluation(#[from] DescriptorEvaluationError),
}

/// A descriptor failed because a file it loads could not be found.
///
/// Kept apart from [`DescriptorError`]'s other variants: the descriptor's own
/// fields may be fine, the reference is what broke.
#[derive(Debug, Error)]
#[error(
    "There was a missing-file error while evaluating {}: could not load {}. \
     This is not an error in the descriptor's own fields. Does it try to load a relative path? \
     Referenced paths are resolved from the descriptor's directory ({}).",
    .descriptor.display(),
    .missing.display(),
    .working_dir.display()
)]
pub struct DescriptorEvaluationError {
    pub descriptor: PathBuf,
    pub missing: PathBuf,
    pub working_dir: PathBuf,
    #[source]
    pub cause: std::io::Error,
}
