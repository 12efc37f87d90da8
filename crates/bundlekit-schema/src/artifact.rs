use crate::types::{Fingerprint, ToolVersion};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Tool name written into the artifact banner.
pub const GENERATOR_NAME: &str = "bundlekit";
const GENERATED_MARKER: &str = "# Generated by ";

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("artifact I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("artifact parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("artifact serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("artifact lists load path '{0}' more than once")]
    DuplicateEntry(String),
}

/// Version and fingerprint stamps recorded at generation time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ArtifactHeader {
    pub generator_version: ToolVersion,
    pub declaration_checksum: Fingerprint,
    pub lock_checksum: Fingerprint,
}

/// The two process-scoped values an activated artifact exports.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ArtifactEnvironment {
    pub install_root: PathBuf,
    pub search_path: Vec<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoadPathEntry {
    pub name: String,
    pub version: String,
    pub root: PathBuf,
    #[serde(default)]
    pub groups: Vec<String>,
}

/// The generated loader file.
///
/// Rendering is deterministic: no timestamps, load paths in the order
/// given (the generator sorts them by name). It is always rewritten whole.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EnvironmentArtifact {
    pub header: ArtifactHeader,
    pub environment: ArtifactEnvironment,
    #[serde(default, rename = "load_path")]
    pub load_paths: Vec<LoadPathEntry>,
}

impl EnvironmentArtifact {
    pub fn render(&self) -> Result<String, ArtifactError> {
        let body = toml::to_string(self)?;
        Ok(format!(
            "{GENERATED_MARKER}{GENERATOR_NAME} {}. Do not edit.\n\n{body}",
            self.header.generator_version
        ))
    }

    pub fn parse(content: &str) -> Result<Self, ArtifactError> {
        let artifact: EnvironmentArtifact = toml::from_str(content)?;
        let mut seen = BTreeSet::new();
        for entry in &artifact.load_paths {
            if !seen.insert(entry.name.as_str()) {
                return Err(ArtifactError::DuplicateEntry(entry.name.clone()));
            }
        }
        Ok(artifact)
    }

    pub fn read_from_file(path: impl AsRef<Path>) -> Result<Self, ArtifactError> {
        let content = fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn entry(&self, name: &str) -> Option<&LoadPathEntry> {
        self.load_paths.iter().find(|e| e.name == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.load_paths.iter().map(|e| e.name.as_str()).collect()
    }

    /// Hash of what the artifact exports: the environment and every load
    /// path, header excluded. Two artifacts with the same content checksum
    /// activate the same sandbox.
    pub fn content_checksum(&self) -> Fingerprint {
        let mut hasher = blake3::Hasher::new();
        hasher.update(
            format!("install_root:{}\n", self.environment.install_root.display()).as_bytes(),
        );
        for path in &self.environment.search_path {
            hasher.update(format!("search:{}\n", path.display()).as_bytes());
        }
        for entry in &self.load_paths {
            hasher.update(
                format!(
                    "entry:{}@{}:{}\n",
                    entry.name,
                    entry.version,
                    entry.root.display()
                )
                .as_bytes(),
            );
            for group in &entry.groups {
                hasher.update(format!("group:{group}\n").as_bytes());
            }
        }
        Fingerprint::new(hasher.finalize().to_hex().to_string())
    }
}

/// What freshness checks need to know about an artifact already on disk.
///
/// Artifacts from other tool releases may not parse as the current format
/// at all; their generator version is then sniffed from the banner line.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ArtifactStamp {
    pub generator_version: ToolVersion,
    pub declaration_checksum: Option<Fingerprint>,
    pub lock_checksum: Option<Fingerprint>,
    /// See [`EnvironmentArtifact::content_checksum`].
    pub content_checksum: Option<Fingerprint>,
}

impl ArtifactStamp {
    pub fn from_artifact(artifact: &EnvironmentArtifact) -> Self {
        Self {
            generator_version: artifact.header.generator_version.clone(),
            declaration_checksum: Some(artifact.header.declaration_checksum.clone()),
            lock_checksum: Some(artifact.header.lock_checksum.clone()),
            content_checksum: Some(artifact.content_checksum()),
        }
    }

    pub fn probe(content: &str) -> Self {
        match EnvironmentArtifact::parse(content) {
            Ok(artifact) => Self::from_artifact(&artifact),
            Err(_) => Self {
                generator_version: ToolVersion::new(
                    sniff_generator_version(content).unwrap_or_else(|| "unknown".to_owned()),
                ),
                declaration_checksum: None,
                lock_checksum: None,
                content_checksum: None,
            },
        }
    }
}

/// Read the version out of a `# Generated by <tool> <version>` banner.
///
/// Versions written by this tool come back bare; foreign ones keep the
/// tool name in front so diagnostics stay unambiguous.
pub fn sniff_generator_version(content: &str) -> Option<String> {
    let line = content
        .lines()
        .map(str::trim)
        .find_map(|l| l.strip_prefix(GENERATED_MARKER))?;
    let mut words = line.split_whitespace();
    let tool = words.next()?;
    let Some(version) = words.next() else {
        return Some(tool.to_owned());
    };
    let version = version.trim_end_matches('.');
    if tool == GENERATOR_NAME {
        Some(version.to_owned())
    } else {
        Some(format!("{tool} {version}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> EnvironmentArtifact {
        EnvironmentArtifact {
            header: ArtifactHeader {
                generator_version: ToolVersion::new("0.1.0"),
                declaration_checksum: Fingerprint::new("d".repeat(64)),
                lock_checksum: Fingerprint::new("l".repeat(64)),
            },
            environment: ArtifactEnvironment {
                install_root: PathBuf::from("/srv/app/.bundle/packages"),
                search_path: vec![PathBuf::from("/srv/app/.bundle/packages")],
            },
            load_paths: vec![
                LoadPathEntry {
                    name: "activesupport".to_owned(),
                    version: "2.3.5".to_owned(),
                    root: PathBuf::from("/srv/app/.bundle/packages/gems/activesupport-2.3.5"),
                    groups: vec!["default".to_owned()],
                },
                LoadPathEntry {
                    name: "rack".to_owned(),
                    version: "1.0.0".to_owned(),
                    root: PathBuf::from("/srv/app/.bundle/packages/gems/rack-1.0.0"),
                    groups: vec!["default".to_owned()],
                },
            ],
        }
    }

    #[test]
    fn render_parse_roundtrip() {
        let artifact = sample();
        let text = artifact.render().unwrap();
        assert!(text.starts_with("# Generated by bundlekit 0.1.0. Do not edit."));
        assert_eq!(EnvironmentArtifact::parse(&text).unwrap(), artifact);
    }

    #[test]
    fn render_is_deterministic() {
        assert_eq!(sample().render().unwrap(), sample().render().unwrap());
    }

    #[test]
    fn probe_reads_header_of_current_format() {
        let text = sample().render().unwrap();
        let stamp = ArtifactStamp::probe(&text);
        assert_eq!(stamp.generator_version, "0.1.0");
        assert_eq!(stamp.lock_checksum, Some(Fingerprint::new("l".repeat(64))));
    }

    #[test]
    fn content_checksum_tracks_environment_not_header() {
        let artifact = sample();
        let stamp = ArtifactStamp::probe(&artifact.render().unwrap());
        assert_eq!(stamp.content_checksum, Some(artifact.content_checksum()));

        let mut restamped = sample();
        restamped.header.generator_version = ToolVersion::new("0.2.0");
        assert_eq!(restamped.content_checksum(), artifact.content_checksum());

        let mut moved = sample();
        moved.environment.install_root = PathBuf::from("/srv/app/vendor/bundle");
        assert_ne!(moved.content_checksum(), artifact.content_checksum());
    }

    #[test]
    fn probe_sniffs_foreign_banner() {
        let stamp = ArtifactStamp::probe("# Generated by Bundler 0.8\nputs \"noo\"\n");
        assert_eq!(stamp.generator_version, "Bundler 0.8");
        assert!(stamp.declaration_checksum.is_none());
    }

    #[test]
    fn probe_sniffs_own_older_banner_with_broken_body() {
        let stamp = ArtifactStamp::probe("# Generated by bundlekit 0.0.9. Do not edit.\n[header\n");
        assert_eq!(stamp.generator_version, "0.0.9");
    }

    #[test]
    fn probe_without_banner_is_unknown() {
        let stamp = ArtifactStamp::probe("garbage");
        assert_eq!(stamp.generator_version, "unknown");
    }

    #[test]
    fn duplicate_entries_rejected() {
        let mut artifact = sample();
        artifact.load_paths[1].name = "activesupport".to_owned();
        let text = artifact.render().unwrap();
        assert!(matches!(
            EnvironmentArtifact::parse(&text),
            Err(ArtifactError::DuplicateEntry(_))
        ));
    }
}
