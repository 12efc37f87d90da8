use crate::fingerprint::fingerprint_declaration;
use crate::lock::PackageSource;
use crate::normalize::normalize_groups;
use crate::types::Fingerprint;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Requirement used when a dependency names no version constraint.
pub const ANY_VERSION: &str = ">= 0";

#[derive(Debug, Error)]
pub enum DeclarationError {
    #[error("failed to read declaration file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse declaration: {0}")]
    ParseToml(#[from] toml::de::Error),
    #[error("dependency name must not be empty")]
    EmptyName,
    #[error("dependency '{0}' is declared more than once")]
    Duplicate(String),
    #[error("dependency '{0}' names both a git and a path source")]
    ConflictingSources(String),
}

/// On-disk shape of the declaration file.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct DeclarationFile {
    /// Default registry for dependencies without a git or path source.
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default, rename = "dependency")]
    pub dependencies: Vec<DependencyEntry>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct DependencyEntry {
    pub name: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub git: Option<String>,
    #[serde(default)]
    pub revision: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub groups: Vec<String>,
}

/// A single declared dependency, validated and with its source resolved.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Dependency {
    pub name: String,
    pub requirement: String,
    pub source: PackageSource,
    pub groups: Vec<String>,
}

/// The dependency declaration as read for one run.
///
/// Dependencies keep their declared order. The fingerprint covers the raw
/// text the declaration was parsed from.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Declaration {
    pub dependencies: Vec<Dependency>,
    pub fingerprint: Fingerprint,
}

impl Declaration {
    pub fn parse_str(text: &str) -> Result<Self, DeclarationError> {
        let file: DeclarationFile = toml::from_str(text)?;
        let mut seen = BTreeSet::new();
        let mut dependencies = Vec::with_capacity(file.dependencies.len());

        for entry in &file.dependencies {
            let name = entry.name.trim().to_owned();
            if name.is_empty() {
                return Err(DeclarationError::EmptyName);
            }
            if !seen.insert(name.clone()) {
                return Err(DeclarationError::Duplicate(name));
            }

            let source = match (&entry.git, &entry.path) {
                (Some(_), Some(_)) => return Err(DeclarationError::ConflictingSources(name)),
                (Some(uri), None) => PackageSource::Git {
                    uri: uri.trim().to_owned(),
                    revision: entry.revision.clone(),
                },
                (None, Some(path)) => PackageSource::Path {
                    path: path.trim().to_owned(),
                },
                (None, None) => PackageSource::Registry {
                    url: file.source.clone(),
                },
            };

            let requirement = entry
                .version
                .as_deref()
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .unwrap_or(ANY_VERSION)
                .to_owned();

            dependencies.push(Dependency {
                name,
                requirement,
                source,
                groups: normalize_groups(&entry.groups),
            });
        }

        Ok(Self {
            dependencies,
            fingerprint: fingerprint_declaration(text),
        })
    }

    pub fn read_from_file(path: impl AsRef<Path>) -> Result<Self, DeclarationError> {
        let content = fs::read_to_string(path)?;
        Self::parse_str(&content)
    }

    pub fn dependency(&self, name: &str) -> Option<&Dependency> {
        self.dependencies.iter().find(|d| d.name == name)
    }
}
